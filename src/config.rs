use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detector::DetectorConfig;

const CONFIG_FILE: &str = "harvest";
const ENV_PREFIX: &str = "HARVEST";

/// Runtime settings. Layered: defaults, then `harvest.toml`, then `HARVEST_*` env vars.
/// CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store_path: PathBuf,
    pub search_base: String,
    pub feed_selector: String,
    pub scroll_step: u64,
    pub poll_interval_ms: u64,
    pub quiet_period_ms: u64,
    pub max_cycles: Option<u64>,
    pub max_duration_secs: Option<u64>,
    pub headless: bool,
    pub lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            store_path: PathBuf::from("schools.json"),
            search_base: "https://www.google.com/maps/search/".to_string(),
            feed_selector: r#"div[role="feed"]"#.to_string(),
            scroll_step: 1000,
            poll_interval_ms: 200,
            quiet_period_ms: 5000,
            max_cycles: None,
            max_duration_secs: Some(900),
            headless: true,
            lang: "en-US".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read harvest settings")?
            .try_deserialize()
            .context("Invalid harvest settings")
    }

    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            step: self.scroll_step.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            max_cycles: self.max_cycles,
            max_duration: self.max_duration_secs.map(Duration::from_secs),
        }
    }
}
