//! Seams between the window manager and a concrete data source.

use std::future::Future;

use chrono::{DateTime, Utc};
use common::{Blend, GeoPoint, Result};

/// One fully built forecast hour. Immutable once constructed; the manager
/// shares it behind an `Arc` and reads it without holding any lock.
pub trait ForecastField: Send + Sync + 'static {
    type Sample: Blend + Clone + Send + 'static;
    /// Expensive artifact that later hours may reuse (e.g. a triangulation).
    type Shared: Clone + Send + Sync + 'static;

    fn valid_time(&self) -> DateTime<Utc>;

    /// Sample at a point (longitude in -180..180).
    fn sample(&self, lat: f64, lon: f64) -> Self::Sample;

    fn sample_batch(&self, points: &[GeoPoint]) -> Vec<Self::Sample> {
        points.iter().map(|p| self.sample(p.lat, p.lon)).collect()
    }

    /// The artifact to hand to subsequent loads, if this field produced one.
    fn shared(&self) -> Option<Self::Shared> {
        None
    }
}

/// Acquires and builds one forecast hour.
pub trait ForecastLoader: Send + Sync + 'static {
    type Field: ForecastField;

    fn load(
        &self,
        target: DateTime<Utc>,
        shared: Option<<Self::Field as ForecastField>::Shared>,
    ) -> impl Future<Output = Result<Self::Field>> + Send;
}
