//! Current forecast-hour loader.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::config::PipelineConfig;
use common::{Error, Result};
use forecast_cache::{CacheManager, SourceKind};
use forecast_window::ForecastLoader;
use noaa_client::{
    acquire, current_candidates, AcquireRequest, NoaaClient, RetryPolicy, Transport, UrlTemplate,
};
use tracing::{info, warn};

use crate::decoder::{MeshDecoder, NetcdfMeshDecoder};
use crate::field::CurrentField;
use crate::triangulation::SharedTriangulation;

/// Acquires one SFBOFS hour (cache first) and builds a [`CurrentField`],
/// triangulating only when no usable shared triangulation is supplied.
pub struct UnstructuredMeshSource<T: Transport = NoaaClient> {
    cache: Arc<CacheManager>,
    transport: Arc<T>,
    policy: RetryPolicy,
    urls: UrlTemplate,
    decoder: Arc<dyn MeshDecoder>,
    model_cycles: Vec<u32>,
    days_back: u32,
    max_forecast_hour: i64,
    offline: bool,
    now: fn() -> DateTime<Utc>,
}

impl<T: Transport> UnstructuredMeshSource<T> {
    pub fn new(
        cfg: &PipelineConfig,
        cache: Arc<CacheManager>,
        transport: Arc<T>,
        decoder: Arc<dyn MeshDecoder>,
    ) -> Self {
        Self {
            cache,
            transport,
            policy: RetryPolicy::from_config(&cfg.retry),
            urls: UrlTemplate::new(&cfg.current.base_url, &cfg.current.url_template),
            decoder,
            model_cycles: cfg.current.model_cycles.clone(),
            days_back: cfg.current.days_back,
            max_forecast_hour: cfg.current.max_forecast_hour,
            offline: cfg.offline,
            now: Utc::now,
        }
    }

    /// Default NetCDF decoder.
    pub fn from_config(cfg: &PipelineConfig, cache: Arc<CacheManager>, transport: Arc<T>) -> Self {
        Self::new(cfg, cache, transport, Arc::new(NetcdfMeshDecoder))
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

    pub async fn fetch_and_build(
        &self,
        target: DateTime<Utc>,
        shared: Option<Arc<SharedTriangulation>>,
    ) -> Result<CurrentField> {
        let candidates = current_candidates(
            (self.now)(),
            target,
            self.days_back,
            &self.model_cycles,
            self.max_forecast_hour,
        );
        let acquired = acquire(
            &self.cache,
            self.transport.as_ref(),
            &self.policy,
            AcquireRequest {
                kind: SourceKind::Current,
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
            let payload = decoder.decode(&acquired.path)?;
            payload.validate()?;
            if let Some(file_time) = payload.valid_time {
                if file_time != candidate.valid_time() {
                    warn!(
                        "Current file time {} differs from requested {}",
                        file_time,
                        candidate.valid_time()
                    );
                }
            }

            let tri = match shared {
                Some(tri) if tri.point_count() == payload.len() => {
                    info!("Reusing shared triangulation ({} points)", tri.point_count());
                    tri
                }
                Some(tri) => {
                    warn!(
                        "Shared triangulation has {} points but mesh has {}; building a private one",
                        tri.point_count(),
                        payload.len()
                    );
                    Arc::new(SharedTriangulation::build(&payload.lonc, &payload.latc)?)
                }
                None => {
                    info!(
                        "Building triangulation for {} elements (slow, one-time)",
                        payload.len()
                    );
                    Arc::new(SharedTriangulation::build(&payload.lonc, &payload.latc)?)
                }
            };

            let elements = payload.len();
            let field = CurrentField::build(payload, tri, candidate)?;
            info!(
                "Current field {} f{:03} built: {} elements in {:.1}s",
                candidate.cycle_time.format("%Y%m%d %Hz"),
                candidate.forecast_hour,
                elements,
                started.elapsed().as_secs_f64()
            );
            Ok(field)
        })
        .await
        .map_err(|e| Error::Other(format!("current build task failed: {}", e)))?
    }
}

impl<T: Transport> ForecastLoader for UnstructuredMeshSource<T> {
    type Field = CurrentField;

    async fn load(
        &self,
        target: DateTime<Utc>,
        shared: Option<Arc<SharedTriangulation>>,
    ) -> Result<CurrentField> {
        self.fetch_and_build(target, shared).await
    }
}
