//! Built current field: piecewise-linear interpolation over a shared mesh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{lon_to_360, CurrentSample, GeoPoint, Result};
use forecast_window::ForecastField;
use noaa_client::Candidate;

use crate::mesh::MeshPayload;
use crate::triangulation::SharedTriangulation;

/// Value returned outside the triangulated area.
pub const FILL_VALUE: f64 = 0.0;

/// One scalar component over a (possibly shared) triangulation.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    tri: Arc<SharedTriangulation>,
    values: Vec<f64>,
    fill: f64,
}

impl LinearInterpolator {
    pub fn new(tri: Arc<SharedTriangulation>, values: Vec<f64>) -> Self {
        Self {
            tri,
            values,
            fill: FILL_VALUE,
        }
    }

    /// Value at (lon in 0..360, lat). NaN anywhere in the result becomes
    /// the fill value.
    pub fn eval(&self, lon: f64, lat: f64) -> f64 {
        match self.tri.interpolate(&self.values, lon, lat) {
            Some(x) if x.is_finite() => x,
            _ => self.fill,
        }
    }
}

/// One immutable forecast hour of surface current.
#[derive(Debug)]
pub struct CurrentField {
    u: LinearInterpolator,
    v: LinearInterpolator,
    cycle_time: DateTime<Utc>,
    forecast_hour: u32,
}

impl CurrentField {
    /// `tri` must have been built from the same element centres as `payload`.
    pub fn build(
        payload: MeshPayload,
        tri: Arc<SharedTriangulation>,
        candidate: Candidate,
    ) -> Result<Self> {
        payload.validate()?;
        if tri.point_count() != payload.len() {
            return Err(common::Error::Triangulation(format!(
                "triangulation has {} points, mesh has {}",
                tri.point_count(),
                payload.len()
            )));
        }
        Ok(Self {
            u: LinearInterpolator::new(Arc::clone(&tri), payload.u),
            v: LinearInterpolator::new(tri, payload.v),
            cycle_time: candidate.cycle_time,
            forecast_hour: candidate.forecast_hour,
        })
    }

    pub fn cycle_time(&self) -> DateTime<Utc> {
        self.cycle_time
    }

    pub fn forecast_hour(&self) -> u32 {
        self.forecast_hour
    }

    pub fn triangulation(&self) -> &Arc<SharedTriangulation> {
        &self.u.tri
    }
}

impl ForecastField for CurrentField {
    type Sample = CurrentSample;
    type Shared = Arc<SharedTriangulation>;

    fn valid_time(&self) -> DateTime<Utc> {
        self.cycle_time + chrono::Duration::hours(self.forecast_hour as i64)
    }

    fn sample(&self, lat: f64, lon: f64) -> CurrentSample {
        let lon = lon_to_360(lon);
        CurrentSample::new(self.u.eval(lon, lat), self.v.eval(lon, lat))
    }

    fn sample_batch(&self, points: &[GeoPoint]) -> Vec<CurrentSample> {
        points
            .iter()
            .map(|p| {
                let lon = lon_to_360(p.lon);
                CurrentSample::new(self.u.eval(lon, p.lat), self.v.eval(lon, p.lat))
            })
            .collect()
    }

    fn shared(&self) -> Option<Arc<SharedTriangulation>> {
        Some(Arc::clone(&self.u.tri))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn u_of(lon: f64, lat: f64) -> f64 {
        0.4 + 2.0 * (lon - 237.5) - 1.5 * (lat - 37.8)
    }

    pub(crate) fn v_of(lon: f64, lat: f64) -> f64 {
        -0.2 + 0.5 * (lon - 237.5) + 3.0 * (lat - 37.8)
    }

    /// Jittered lattice of element centres over part of the bay, lon 0..360.
    pub(crate) fn synthetic_mesh() -> MeshPayload {
        let mut mesh = MeshPayload {
            lonc: Vec::new(),
            latc: Vec::new(),
            u: Vec::new(),
            v: Vec::new(),
            valid_time: None,
        };
        for i in 0..12 {
            for j in 0..10 {
                let jitter = ((i * 7 + j * 3) % 5) as f64 * 0.002;
                let lon = 237.40 + i as f64 * 0.02 + jitter;
                let lat = 37.70 + j as f64 * 0.02 - jitter;
                mesh.lonc.push(lon);
                mesh.latc.push(lat);
                mesh.u.push(u_of(lon, lat));
                mesh.v.push(v_of(lon, lat));
            }
        }
        mesh
    }

    pub(crate) fn candidate(fh: u32) -> Candidate {
        Candidate {
            cycle_time: Utc.with_ymd_and_hms(2025, 1, 30, 9, 0, 0).unwrap(),
            forecast_hour: fh,
        }
    }

    fn field() -> CurrentField {
        let mesh = synthetic_mesh();
        let tri = Arc::new(SharedTriangulation::build(&mesh.lonc, &mesh.latc).unwrap());
        CurrentField::build(mesh, tri, candidate(4)).unwrap()
    }

    #[test]
    fn test_linear_field_reproduced_inside_hull() {
        let f = field();
        let (lat, lon360) = (37.81, 237.53);
        let s = f.sample(lat, lon360 - 360.0);
        assert!((s.u_ms - u_of(lon360, lat)).abs() < 1e-9);
        assert!((s.v_ms - v_of(lon360, lat)).abs() < 1e-9);
    }

    #[test]
    fn test_outside_hull_returns_fill() {
        let f = field();
        let s = f.sample(36.0, -120.0);
        assert_eq!(s, CurrentSample::new(FILL_VALUE, FILL_VALUE));
    }

    #[test]
    fn test_nan_values_become_fill() {
        let mut mesh = synthetic_mesh();
        for x in mesh.u.iter_mut() {
            *x = f64::NAN;
        }
        let tri = Arc::new(SharedTriangulation::build(&mesh.lonc, &mesh.latc).unwrap());
        let f = CurrentField::build(mesh, tri, candidate(0)).unwrap();
        let s = f.sample(37.81, 237.53 - 360.0);
        assert_eq!(s.u_ms, FILL_VALUE);
        assert!((s.v_ms - v_of(237.53, 37.81)).abs() < 1e-9);
    }

    #[test]
    fn test_batch_matches_single_and_publishes_shared() {
        let f = field();
        let pts = vec![GeoPoint::new(37.75, -122.45), GeoPoint::new(37.85, -122.35), GeoPoint::new(0.0, 0.0)];
        let batch = f.sample_batch(&pts);
        for (p, b) in pts.iter().zip(batch.iter()) {
            assert_eq!(*b, f.sample(p.lat, p.lon));
        }
        let shared = f.shared().unwrap();
        assert!(Arc::ptr_eq(&shared, f.triangulation()));
    }

    #[test]
    fn test_valid_time() {
        let f = field();
        assert_eq!(f.valid_time(), Utc.with_ymd_and_hms(2025, 1, 30, 13, 0, 0).unwrap());
        assert_eq!(f.forecast_hour(), 4);
    }

    #[test]
    fn test_mismatched_triangulation_rejected() {
        let mesh = synthetic_mesh();
        let tri = Arc::new(SharedTriangulation::build(&[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0]).unwrap());
        let err = CurrentField::build(mesh, tri, candidate(0)).unwrap_err();
        assert!(matches!(err, common::Error::Triangulation(_)));
    }
}
