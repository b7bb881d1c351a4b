use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Run-level failures. Field and record level problems never reach this type.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed reading store {path}: {source}")]
    StoreRead { path: PathBuf, source: io::Error },
    #[error("failed writing store {path}: {source}")]
    StoreWrite { path: PathBuf, source: io::Error },
    #[error("store {path} is not a JSON array of schools: {source}")]
    StoreDecode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed encoding schools: {0}")]
    StoreEncode(#[from] serde_json::Error),
    #[error("store {0} is locked by another run (remove the .lock file if it is stale)")]
    StoreLocked(PathBuf),
    #[error("browser: {0}")]
    Browser(String),
    #[error("run cancelled before the feed finished loading")]
    Cancelled,
}

impl From<chromiumoxide::error::CdpError> for HarvestError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        HarvestError::Browser(err.to_string())
    }
}
