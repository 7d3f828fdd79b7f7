//! NOAA open-data client.
//!
//! Downloads whole forecast files (HRRR GRIB2, SFBOFS NetCDF) from the NOAA
//! S3 buckets into the forecast cache. The pieces are kept separate so the
//! loaders can compose them and tests can swap the network out:
//!
//! - [`Transport`]: "fetch this URL into that file"; [`NoaaClient`] is the
//!   reqwest implementation.
//! - [`RetryPolicy`]: bounded attempts with a fixed delay, returning a typed
//!   [`Acquisition`] instead of erroring on the expected 404.
//! - [`UrlTemplate`] and the `*_candidates` functions: which model cycle to
//!   try, and where it lives.
//! - [`acquire`]: cache-then-network walk over candidates.

pub mod acquire;
pub mod cycles;
pub mod retry;
pub mod url;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Error;
use thiserror::Error as ThisError;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub use acquire::{acquire, AcquireRequest, Acquired};
pub use cycles::{current_candidates, wind_candidates, Candidate};
pub use retry::{Acquisition, RetryPolicy};
pub use url::UrlTemplate;

/// Failure classes the retry policy cares about.
#[derive(Debug, Clone, ThisError)]
pub enum FetchError {
    /// The object does not exist upstream. Retrying will not help.
    #[error("not found: {0}")]
    NotFound(String),
    /// Anything else: timeouts, resets, 5xx, local I/O.
    #[error("{0}")]
    Transient(String),
}

/// Fetches one URL into a local file.
///
/// Implementations must only create `dest` once the body is complete; the
/// cache treats any file at its deterministic path as a hit.
pub trait Transport: Send + Sync + 'static {
    /// Returns the number of bytes written.
    fn download(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, FetchError>> + Send;
}

/// NOAA S3 client with connection pooling and User-Agent header.
#[derive(Debug, Clone)]
pub struct NoaaClient {
    client: reqwest::Client,
}

impl NoaaClient {
    pub fn new(request_timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("forecast-feed/0.1 (sailing simulator data pipeline)")
            .pool_max_idle_per_host(4)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build NOAA HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

impl Transport for NoaaClient {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        debug!("GET {}", url);

        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP {} for {}", status, url)));
        }

        let tmp = part_path(dest);
        let written = write_body(&mut resp, &tmp).await;
        let written = finish_part(written, &tmp, dest).await?;
        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

/// Stream the response body into `tmp`.
async fn write_body(resp: &mut reqwest::Response, tmp: &Path) -> Result<u64, FetchError> {
    let io_err = |e: std::io::Error| FetchError::Transient(format!("write {}: {}", tmp.display(), e));

    let mut file = tokio::fs::File::create(tmp).await.map_err(io_err)?;
    let mut written: u64 = 0;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| FetchError::Transient(format!("body read failed: {}", e)))?
    {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

/// Move a completed `.part` file into place. On any failure, including the
/// write that produced `written`, the `.part` file is removed.
async fn finish_part(
    written: Result<u64, FetchError>,
    tmp: &Path,
    dest: &Path,
) -> Result<u64, FetchError> {
    let result = match written {
        Ok(n) => tokio::fs::rename(tmp, dest)
            .await
            .map(|_| n)
            .map_err(|e| FetchError::Transient(format!("rename {}: {}", tmp.display(), e))),
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}
