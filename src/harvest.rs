use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{search_url, BrowserSession, PageFeed};
use crate::config::Settings;
use crate::detector::{LoadDetector, Outcome};
use crate::error::HarvestError;
use crate::parser;
use crate::store::{self, MergeOutcome, School};

pub struct RunSummary {
    pub outcome: Outcome,
    pub candidates: usize,
    pub merge: Option<MergeOutcome>,
}

/// Detector → Extractor → Merger for one query.
/// The browser is closed on every path; nothing is persisted unless loading and extraction succeed.
pub async fn run(query: &str, settings: &Settings, cancel: &CancellationToken) -> Result<RunSummary> {
    let url = search_url(&settings.search_base, query);
    let session = BrowserSession::launch(settings)
        .await
        .context("Failed to launch browser")?;

    let loaded = load_feed(&session, &url, settings, cancel).await;
    if let Err(e) = session.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }
    let (outcome, html) = loaded?;

    let (candidates, merge) = conclude(&html, &settings.store_path, cancel)?;
    Ok(RunSummary {
        outcome,
        candidates,
        merge,
    })
}

async fn load_feed(
    session: &BrowserSession,
    url: &str,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<(Outcome, String)> {
    let page = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(HarvestError::Cancelled.into()),
        page = session.open(url) => page?,
    };
    let mut feed = PageFeed::new(&page, &settings.feed_selector)?;

    let mut detector = LoadDetector::new(settings.detector()).with_progress(spinner()?);
    let outcome = detector
        .run(&mut feed, cancel)
        .await
        .context("Feed polling failed")?;
    debug!(phase = ?detector.phase(), "Detector stopped");
    if let Outcome::Cancelled(report) = outcome {
        info!(cycles = report.cycles, "Stopped while loading the feed");
        return Err(HarvestError::Cancelled.into());
    }

    let html = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(HarvestError::Cancelled.into()),
        html = feed.snapshot() => html?,
    };
    Ok((outcome, html))
}

/// Extract a loaded page and merge it, unless the run was cancelled in the meantime.
fn conclude(html: &str, store_path: &Path, cancel: &CancellationToken) -> Result<(usize, Option<MergeOutcome>)> {
    if cancel.is_cancelled() {
        info!("Stopped before saving");
        return Err(HarvestError::Cancelled.into());
    }
    let schools = parser::extract_schools(html);
    let candidates = schools.len();
    let merge = persist(store_path, schools)?;
    Ok((candidates, merge))
}

/// Extract from an already captured page and merge, unless `dry_run`.
pub fn from_snapshot(html: &str, store_path: &Path, dry_run: bool) -> Result<(Vec<School>, Option<MergeOutcome>)> {
    let schools = parser::extract_schools(html);
    if dry_run {
        return Ok((schools, None));
    }
    let merge = persist(store_path, schools.clone())?;
    Ok((schools, merge))
}

/// Merge candidates into the store. An empty batch leaves the store untouched.
pub fn persist(store_path: &Path, schools: Vec<School>) -> Result<Option<MergeOutcome>> {
    if schools.is_empty() {
        info!("No schools found");
        return Ok(None);
    }
    let outcome = store::merge_into(store_path, schools)
        .with_context(|| format!("Failed to update {}", store_path.display()))?;
    Ok(Some(outcome))
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

// ── Tests ──
