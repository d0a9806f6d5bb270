//! Run-level errors
//!
//! Everything here aborts the whole run. Per-entity problems never surface
//! as errors; they are recorded in the run's diagnostics instead.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::pairwise::PairwiseError;
use crate::source::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigGenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Metadata source error: {0}")]
    Source(#[from] SourceError),

    #[error(
        "More than one equipment found {selector}: {candidates:?}. Please add 'power_meter_id' \
         parameter to configuration to uniquely identify whole building power meter"
    )]
    AmbiguousPowerMeter {
        selector: String,
        candidates: Vec<String>,
    },

    #[error("Given device type is {device_type}. But unable to find corresponding pairwise criteria file {path}")]
    PairwiseFileNotFound { device_type: String, path: PathBuf },

    #[error("Invalid pairwise criteria file {path}: {source}")]
    Pairwise {
        path: PathBuf,
        #[source]
        source: PairwiseError,
    },

    #[error("Output directory {0} exists and is not a directory")]
    OutputNotDirectory(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigGenError>;
