//! Download of the remote dataset into a staging file.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::error::FetchError;

const USER_AGENT: &str = concat!("airfeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes_written: u64,
}

impl FetchOutcome {
    pub fn megabytes(&self) -> f64 {
        self.bytes_written as f64 / (1024.0 * 1024.0)
    }
}

/// Where raw dataset bytes come from.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    fn describe(&self) -> String;

    /// Persist the full payload at `dest`. On error nothing is left at `dest`.
    async fn fetch_to(&self, dest: &Path) -> Result<FetchOutcome, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// `timeout` bounds connecting and each idle gap while reading, not the
    /// whole transfer.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|err| FetchError::from_reqwest(&url, err))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_to(&self, dest: &Path) -> Result<FetchOutcome, FetchError> {
        fetch(&self.client, &self.url, dest).await
    }
}

/// GET `url` and stream the body to `dest` chunk by chunk.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<FetchOutcome, FetchError> {
    info!(url, dest = %dest.display(), "starting download");

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| FetchError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| FetchError::from_reqwest(url, err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let result = stream_body(response, url, dest).await;
    if result.is_err() {
        discard_partial(dest).await;
    }
    result
}

async fn stream_body(
    response: reqwest::Response,
    url: &str,
    dest: &Path,
) -> Result<FetchOutcome, FetchError> {
    let write_err = |source| FetchError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let file = File::create(dest).await.map_err(write_err)?;
    let mut out = BufWriter::new(file);
    let mut bytes_written = 0u64;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| FetchError::from_reqwest(url, err))?;
        out.write_all(&chunk).await.map_err(write_err)?;
        bytes_written += chunk.len() as u64;
    }

    out.flush().await.map_err(write_err)?;
    out.get_ref().sync_all().await.map_err(write_err)?;

    let outcome = FetchOutcome { bytes_written };
    info!(
        url,
        path = %dest.display(),
        bytes = bytes_written,
        size_mb = %format_args!("{:.2}", outcome.megabytes()),
        "download completed"
    );
    Ok(outcome)
}

async fn discard_partial(dest: &Path) {
    match fs::remove_file(dest).await {
        Ok(()) => debug!(path = %dest.display(), "removed partial download"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %dest.display(), error = %err, "failed to remove partial download"),
    }
}
