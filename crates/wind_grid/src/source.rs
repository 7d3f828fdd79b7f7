//! Wind forecast-hour loader.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::config::PipelineConfig;
use common::{Error, Result};
use forecast_cache::{CacheManager, SourceKind};
use forecast_window::ForecastLoader;
use noaa_client::{acquire, wind_candidates, AcquireRequest, NoaaClient, RetryPolicy, Transport, UrlTemplate};
use tracing::info;

use crate::decoder::{Grib2Decoder, GridDecoder};
use crate::field::WindField;

/// Acquires one HRRR hour (cache first) and builds a [`WindField`].
pub struct RegularGridSource<T: Transport = NoaaClient> {
    cache: Arc<CacheManager>,
    transport: Arc<T>,
    policy: RetryPolicy,
    urls: UrlTemplate,
    decoder: Arc<dyn GridDecoder>,
    max_cycles_back: u32,
    max_forecast_hour: i64,
    offline: bool,
    now: fn() -> DateTime<Utc>,
}

impl<T: Transport> RegularGridSource<T> {
    pub fn new(
        cfg: &PipelineConfig,
        cache: Arc<CacheManager>,
        transport: Arc<T>,
        decoder: Arc<dyn GridDecoder>,
    ) -> Self {
        Self {
            cache,
            transport,
            policy: RetryPolicy::from_config(&cfg.retry),
            urls: UrlTemplate::new(&cfg.wind.base_url, &cfg.wind.url_template),
            decoder,
            max_cycles_back: cfg.wind.max_cycles_back,
            max_forecast_hour: cfg.wind.max_forecast_hour,
            offline: cfg.offline,
            now: Utc::now,
        }
    }

    /// Default GRIB2 decoder with the configured projection.
    pub fn from_config(cfg: &PipelineConfig, cache: Arc<CacheManager>, transport: Arc<T>) -> Self {
        let decoder = Arc::new(
            Grib2Decoder::new(&cfg.wind.projection).grid_relative(cfg.wind.grid_relative_winds),
        );
        Self::new(cfg, cache, transport, decoder)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the wall clock used for the cycle search.
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub async fn fetch_and_build(&self, target: DateTime<Utc>) -> Result<WindField> {
        let candidates = wind_candidates(
            (self.now)(),
            target,
            self.max_cycles_back,
            self.max_forecast_hour,
        );
        let acquired = acquire(
            &self.cache,
            self.transport.as_ref(),
            &self.policy,
            AcquireRequest {
                kind: SourceKind::Wind,
                candidates: &candidates,
                urls: &self.urls,
                offline: self.offline,
            },
        )
        .await?;

        let decoder = Arc::clone(&self.decoder);
        let candidate = acquired.candidate;
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let grid = decoder.decode(&acquired.path)?;
            let points = grid.len();
            let field = WindField::build(grid, candidate)?;
            info!(
                "Wind field {} f{:02} built: {} points in {:.1}s",
                candidate.cycle_time.format("%Y%m%d %Hz"),
                candidate.forecast_hour,
                points,
                started.elapsed().as_secs_f64()
            );
            Ok(field)
        })
        .await
        .map_err(|e| Error::Other(format!("wind build task failed: {}", e)))?
    }
}

impl<T: Transport> ForecastLoader for RegularGridSource<T> {
    type Field = WindField;

    async fn load(&self, target: DateTime<Utc>, _shared: Option<()>) -> Result<WindField> {
        self.fetch_and_build(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::synthetic_grid;
    use crate::grid::RegularGrid;
    use chrono::TimeZone;
    use forecast_window::ForecastField;
    use noaa_client::FetchError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OfflineTransport;

    impl Transport for OfflineTransport {
        async fn download(&self, url: &str, _dest: &Path) -> std::result::Result<u64, FetchError> {
            Err(FetchError::NotFound(url.to_string()))
        }
    }

    /// Ignores the file contents and returns the synthetic grid.
    #[derive(Default)]
    struct FakeDecoder {
        calls: AtomicUsize,
    }

    impl GridDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<RegularGrid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if std::fs::read(path)? == b"corrupt" {
                return Err(Error::Decode("bad payload".into()));
            }
            Ok(synthetic_grid())
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 30, 14, 20, 0).unwrap()
    }

    fn source(dir: &Path, decoder: Arc<FakeDecoder>) -> RegularGridSource<OfflineTransport> {
        let cache = Arc::new(CacheManager::open(dir).unwrap());
        RegularGridSource::new(&PipelineConfig::default(), cache, Arc::new(OfflineTransport), decoder)
            .with_policy(RetryPolicy::new(1, std::time::Duration::ZERO))
            .with_clock(fixed_now)
    }

    #[tokio::test]
    async fn test_builds_from_cached_file() {
        let tmp = tempfile::tempdir().unwrap();
        // 13z cycle, target 16z -> f03. The 14z cycle (f02) is not cached and 404s.
        std::fs::write(tmp.path().join("wind_20250130_13z_f03.grib2"), b"grib").unwrap();
        let decoder = Arc::new(FakeDecoder::default());
        let src = source(tmp.path(), Arc::clone(&decoder));

        let target = Utc.with_ymd_and_hms(2025, 1, 30, 16, 0, 0).unwrap();
        let field = src.load(target, None).await.unwrap();
        assert_eq!(field.forecast_hour(), 3);
        assert_eq!(field.valid_time(), target);
        assert_eq!(field.shape(), (12, 15));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_candidate_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(tmp.path(), Arc::new(FakeDecoder::default()));
        let target = Utc.with_ymd_and_hms(2025, 1, 30, 16, 0, 0).unwrap();
        let err = src.load(target, None).await.unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("wind_20250130_14z_f02.grib2"), b"corrupt").unwrap();
        let src = source(tmp.path(), Arc::new(FakeDecoder::default()));
        let target = Utc.with_ymd_and_hms(2025, 1, 30, 16, 0, 0).unwrap();
        let err = src.load(target, None).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
