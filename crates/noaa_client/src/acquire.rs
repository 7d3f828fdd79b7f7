//! Cache-then-network acquisition over a candidate list.

use std::path::PathBuf;
use std::sync::Arc;

use common::{Error, Result};
use chrono::{DateTime, Utc};
use forecast_cache::{CacheManager, SourceKind};
use tracing::{debug, info, warn};

use crate::cycles::Candidate;
use crate::retry::{Acquisition, RetryPolicy};
use crate::url::UrlTemplate;
use crate::Transport;

/// What to look for.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    pub kind: SourceKind,
    pub candidates: &'a [Candidate],
    pub urls: &'a UrlTemplate,
    /// Only cache hits count; never touch the network.
    pub offline: bool,
}

/// A forecast file now present in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    pub candidate: Candidate,
    pub from_cache: bool,
}

/// Walk `candidates` best first and return the first one that is cached or
/// can be downloaded.
///
/// A cached candidate always wins over trying the network for it. A
/// not-found candidate is skipped without spending retries; one that
/// exhausts its retries is abandoned for the next.
pub async fn acquire<T: Transport>(
    cache: &Arc<CacheManager>,
    transport: &T,
    policy: &RetryPolicy,
    req: AcquireRequest<'_>,
) -> Result<Acquired> {
    let kind = req.kind;

    for candidate in req.candidates {
        let Candidate {
            cycle_time,
            forecast_hour,
        } = *candidate;
        let path = cache.cache_path(kind, cycle_time, forecast_hour);
        let filename = kind.filename(cycle_time, forecast_hour);

        if cache.is_cached(kind, cycle_time, forecast_hour) {
            record(cache, kind, cycle_time, forecast_hour, true).await;
            info!(
                "Cache hit: {} {} f{:02}",
                kind,
                cycle_time.format("%Y%m%d %Hz"),
                forecast_hour
            );
            return Ok(Acquired {
                path,
                candidate: *candidate,
                from_cache: true,
            });
        }

        if req.offline {
            continue;
        }

        let url = req.urls.render(cycle_time, forecast_hour);
        let label = format!("{} {}", kind, filename);
        match policy.run(&label, || transport.download(&url, &path)).await {
            Acquisition::Fetched(bytes) => {
                record(cache, kind, cycle_time, forecast_hour, false).await;
                info!(
                    "Fetched {} {} f{:02} ({} bytes)",
                    kind,
                    cycle_time.format("%Y%m%d %Hz"),
                    forecast_hour,
                    bytes
                );
                return Ok(Acquired {
                    path,
                    candidate: *candidate,
                    from_cache: false,
                });
            }
            Acquisition::NotFound => {
                debug!("{} not published, trying older cycle", url);
            }
            Acquisition::Exhausted(e) => {
                warn!("Giving up on {} after retries: {}", url, e);
            }
        }
    }

    Err(Error::NoData(format!(
        "no {} data among {} candidate cycles{}",
        kind,
        req.candidates.len(),
        if req.offline { " (offline mode)" } else { "" }
    )))
}

/// Update the cache index for a hit or a fresh download. The index is
/// rewritten with blocking I/O, so it runs off the async workers.
async fn record(
    cache: &Arc<CacheManager>,
    kind: SourceKind,
    cycle_time: DateTime<Utc>,
    forecast_hour: u32,
    hit: bool,
) {
    let cache = Arc::clone(cache);
    let filename = kind.filename(cycle_time, forecast_hour);
    let outcome = tokio::task::spawn_blocking(move || {
        // A hit may be present on disk but unknown to the index.
        if hit && cache.update_access_time(&kind.filename(cycle_time, forecast_hour)) {
            return Ok(());
        }
        cache.register_file(kind, cycle_time, forecast_hour).map(|_| ())
    })
    .await
    .map_err(|e| Error::Other(format!("cache index task failed: {}", e)))
    .and_then(|r| r);

    if let Err(e) = outcome {
        warn!("Could not register {} in the cache index: {}", filename, e);
    }
}
