//! Physical-unit sample types shared by every field source.
//!
//! Each source keeps its native grid topology; only the samples it produces
//! are uniform. Temporal blending between two forecast hours is expressed
//! through [`Blend`].

use serde::{Deserialize, Serialize};

/// Meters-per-second to knots.
pub const MS_TO_KNOTS: f64 = 1.0 / 0.514444;

/// A geographic query point in degrees (longitude in -180..180).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Map a longitude onto the 0..360 convention used by NOAA model output.
pub fn lon_to_360(lon: f64) -> f64 {
    if lon < 0.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Interpolate between two bearings along the shorter arc.
///
/// The signed delta is wrapped into [-180, 180] before scaling, so 350° → 10°
/// at 0.5 lands on 0°, never 180°. Result is in [0, 360).
pub fn interpolate_direction(from_deg: f64, to_deg: f64, fraction: f64) -> f64 {
    let delta = (to_deg - from_deg + 180.0).rem_euclid(360.0) - 180.0;
    let out = (from_deg + delta * fraction).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if out >= 360.0 {
        0.0
    } else {
        out
    }
}

fn lerp(a: f64, b: f64, fraction: f64) -> f64 {
    a + (b - a) * fraction
}

/// Temporal blend between the sample valid at the earlier forecast hour
/// (`self`) and the later one, at `fraction` in [0, 1].
pub trait Blend: Sized {
    fn blend(&self, later: &Self, fraction: f64) -> Self;
}

// ── Wind ──────────────────────────────────────────────────────────────

/// Wind at a point: direction the wind blows FROM, speed in knots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub direction_deg: f64,
    pub speed_kts: f64,
}

impl WindSample {
    pub fn new(direction_deg: f64, speed_kts: f64) -> Self {
        Self {
            direction_deg,
            speed_kts,
        }
    }

    /// Build from east/north components in m/s.
    pub fn from_components(u_ms: f64, v_ms: f64) -> Self {
        let speed_kts = u_ms.hypot(v_ms) * MS_TO_KNOTS;
        // atan2(u, v) is the bearing the air moves toward; add 180 for "from".
        let direction_deg = (u_ms.atan2(v_ms).to_degrees() + 180.0).rem_euclid(360.0);
        Self {
            direction_deg: if direction_deg >= 360.0 {
                0.0
            } else {
                direction_deg
            },
            speed_kts,
        }
    }
}

impl Blend for WindSample {
    fn blend(&self, later: &Self, fraction: f64) -> Self {
        Self {
            direction_deg: interpolate_direction(self.direction_deg, later.direction_deg, fraction),
            speed_kts: lerp(self.speed_kts, later.speed_kts, fraction),
        }
    }
}

// ── Current ───────────────────────────────────────────────────────────

/// Surface water current as east/north components in m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentSample {
    pub u_ms: f64,
    pub v_ms: f64,
}

impl CurrentSample {
    pub fn new(u_ms: f64, v_ms: f64) -> Self {
        Self { u_ms, v_ms }
    }

    pub fn speed_kts(&self) -> f64 {
        self.u_ms.hypot(self.v_ms) * MS_TO_KNOTS
    }

    /// Bearing the water flows TOWARD, in [0, 360).
    pub fn direction_to_deg(&self) -> f64 {
        self.u_ms.atan2(self.v_ms).to_degrees().rem_euclid(360.0)
    }
}

impl Blend for CurrentSample {
    fn blend(&self, later: &Self, fraction: f64) -> Self {
        Self {
            u_ms: lerp(self.u_ms, later.u_ms, fraction),
            v_ms: lerp(self.v_ms, later.v_ms, fraction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_direction_takes_short_path_across_north() {
        let d = interpolate_direction(350.0, 10.0, 0.5);
        assert!(approx(d, 0.0), "expected 0, got {d}");
        let d = interpolate_direction(10.0, 350.0, 0.5);
        assert!(approx(d, 0.0), "expected 0, got {d}");
    }

    #[test]
    fn test_direction_endpoints() {
        assert!(approx(interpolate_direction(90.0, 180.0, 0.0), 90.0));
        assert!(approx(interpolate_direction(90.0, 180.0, 1.0), 180.0));
        assert!(approx(interpolate_direction(90.0, 180.0, 0.25), 112.5));
    }

    #[test]
    fn test_direction_result_stays_in_range() {
        for (a, b) in [(359.9, 0.1), (0.0, 359.0), (180.0, 0.0), (270.0, 90.0)] {
            for f in [0.0, 0.3, 0.5, 0.9, 1.0] {
                let d = interpolate_direction(a, b, f);
                assert!((0.0..360.0).contains(&d), "{a}->{b}@{f} gave {d}");
            }
        }
    }

    #[test]
    fn test_wind_from_components() {
        // Air moving south (v < 0) comes FROM the north.
        let w = WindSample::from_components(0.0, -0.514444);
        assert!(approx(w.direction_deg, 0.0), "got {}", w.direction_deg);
        assert!((w.speed_kts - 1.0).abs() < 1e-6);

        // Air moving east comes FROM the west.
        let w = WindSample::from_components(5.0, 0.0);
        assert!(approx(w.direction_deg, 270.0), "got {}", w.direction_deg);
    }

    #[test]
    fn test_wind_blend() {
        let a = WindSample::new(350.0, 10.0);
        let b = WindSample::new(10.0, 20.0);
        let m = a.blend(&b, 0.5);
        assert!(approx(m.direction_deg, 0.0));
        assert!(approx(m.speed_kts, 15.0));
    }

    #[test]
    fn test_current_blend_is_componentwise() {
        let a = CurrentSample::new(1.0, -1.0);
        let b = CurrentSample::new(3.0, 1.0);
        let m = a.blend(&b, 0.25);
        assert!(approx(m.u_ms, 1.5));
        assert!(approx(m.v_ms, -0.5));
    }

    #[test]
    fn test_current_direction_to() {
        let c = CurrentSample::new(1.0, 0.0);
        assert!(approx(c.direction_to_deg(), 90.0));
        assert!(approx(CurrentSample::new(0.0, -1.0).direction_to_deg(), 180.0));
    }

    #[test]
    fn test_lon_to_360() {
        assert!(approx(lon_to_360(-122.4), 237.6));
        assert!(approx(lon_to_360(12.0), 12.0));
    }
}
