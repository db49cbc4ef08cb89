// crates/airfeed-core/src/error.rs

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                source: err,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("dataset has no header row")]
    EmptyHeader,

    #[error("required field '{field}' is missing from the header")]
    MissingField { field: String },
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("filter task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to prepare {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace {} with {}: {source}", published.display(), candidate.display())]
    Replace {
        candidate: PathBuf,
        published: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Fetching,
    Filtering,
    Publishing,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Fetching => "fetching",
            CycleStage::Filtering => "filtering",
            CycleStage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Failure of a single refresh cycle, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("filter failed: {0}")]
    Filter(#[from] FilterError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl CycleError {
    pub fn stage(&self) -> CycleStage {
        match self {
            CycleError::Fetch(_) => CycleStage::Fetching,
            CycleError::Filter(_) => CycleStage::Filtering,
            CycleError::Publish(_) => CycleStage::Publishing,
        }
    }
}
