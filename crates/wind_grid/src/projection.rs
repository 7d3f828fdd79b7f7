//! Lambert conformal conic projection on a sphere.

use common::config::LambertConfig;
use std::f64::consts::FRAC_PI_4;

#[derive(Debug, Clone)]
pub struct LambertConformal {
    n: f64,
    /// R * F
    rf: f64,
    rho0: f64,
    lov: f64,
    /// Projected position of grid point (0, 0).
    x0: f64,
    y0: f64,
    dx: f64,
    dy: f64,
}

fn wrap_pi(a: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    (a + std::f64::consts::PI).rem_euclid(tau) - std::f64::consts::PI
}

impl LambertConformal {
    pub fn new(cfg: &LambertConfig) -> Self {
        let phi1 = cfg.latin1.to_radians();
        let phi2 = cfg.latin2.to_radians();
        let t = |phi: f64| (FRAC_PI_4 + phi / 2.0).tan();

        let n = if (cfg.latin1 - cfg.latin2).abs() < 1e-9 {
            phi1.sin()
        } else {
            (phi1.cos() / phi2.cos()).ln() / (t(phi2) / t(phi1)).ln()
        };
        let rf = cfg.earth_radius * phi1.cos() * t(phi1).powf(n) / n;
        let rho0 = rf / t(phi1).powf(n);

        let mut proj = Self {
            n,
            rf,
            rho0,
            lov: cfg.lov.to_radians(),
            x0: 0.0,
            y0: 0.0,
            dx: cfg.dx,
            dy: cfg.dy,
        };
        let (x0, y0) = proj.forward(cfg.la1, cfg.lo1);
        proj.x0 = x0;
        proj.y0 = y0;
        proj
    }

    /// Degrees to projected meters. Longitude may use either convention.
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let rho = self.rf / (FRAC_PI_4 + lat.to_radians() / 2.0).tan().powf(self.n);
        let theta = self.n * wrap_pi(lon.to_radians() - self.lov);
        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }

    /// Projected meters to (lat, lon) with lon in 0..360.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let sign = self.n.signum();
        let dy = self.rho0 - y;
        let rho = sign * x.hypot(dy);
        let theta = (sign * x).atan2(sign * dy);
        let lat = 2.0 * (self.rf / rho).powf(1.0 / self.n).atan() - std::f64::consts::FRAC_PI_2;
        let lon = (self.lov + theta / self.n).to_degrees().rem_euclid(360.0);
        (lat.to_degrees(), lon)
    }

    /// Lat/lon (lon 0..360) of grid point (row, col).
    pub fn grid_point(&self, row: usize, col: usize) -> (f64, f64) {
        self.inverse(
            self.x0 + col as f64 * self.dx,
            self.y0 + row as f64 * self.dy,
        )
    }

    /// Rotate a grid-relative vector at longitude `lon` to true east/north.
    pub fn earth_relative(&self, lon: f64, u: f64, v: f64) -> (f64, f64) {
        let (sin, cos) = (self.n * wrap_pi(lon.to_radians() - self.lov)).sin_cos();
        (u * cos + v * sin, v * cos - u * sin)
    }

    /// [`Self::earth_relative`] over parallel arrays, in place.
    pub fn rotate_to_earth(&self, lons: &[f64], u: &mut [f64], v: &mut [f64]) {
        for ((&lon, u), v) in lons.iter().zip(u.iter_mut()).zip(v.iter_mut()) {
            (*u, *v) = self.earth_relative(lon, *u, *v);
        }
    }

    /// Row-major lat/lon arrays for a `rows x cols` grid.
    pub fn grid_latlons(&self, rows: usize, cols: usize) -> (Vec<f64>, Vec<f64>) {
        let mut lats = Vec::with_capacity(rows * cols);
        let mut lons = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let (lat, lon) = self.grid_point(r, c);
                lats.push(lat);
                lons.push(lon);
            }
        }
        (lats, lons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_grid_point_is_la1_lo1() {
        let cfg = LambertConfig::default();
        let proj = LambertConformal::new(&cfg);
        let (lat, lon) = proj.grid_point(0, 0);
        assert!((lat - cfg.la1).abs() < 1e-6, "lat {lat}");
        assert!((lon - cfg.lo1).abs() < 1e-6, "lon {lon}");
    }

    #[test]
    fn test_round_trip() {
        let proj = LambertConformal::new(&LambertConfig::default());
        for (lat, lon) in [(37.8, 237.6), (25.0, 280.0), (47.0, 250.0)] {
            let (x, y) = proj.forward(lat, lon);
            let (lat2, lon2) = proj.inverse(x, y);
            assert!((lat - lat2).abs() < 1e-9);
            assert!((lon - lon2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_hrrr_corners() {
        let proj = LambertConformal::new(&LambertConfig::default());
        // HRRR CONUS is 1059 rows x 1799 cols.
        let (lat, lon) = proj.grid_point(0, 1798);
        assert!((lat - 21.138).abs() < 0.05, "SE lat {lat}");
        assert!((lon - (360.0 - 72.28)).abs() < 0.05, "SE lon {lon}");
        let (lat, lon) = proj.grid_point(1058, 1798);
        assert!((lat - 47.842).abs() < 0.05, "NE lat {lat}");
        assert!((lon - (360.0 - 60.917)).abs() < 0.05, "NE lon {lon}");
    }

    #[test]
    fn test_negative_longitude_accepted() {
        let proj = LambertConformal::new(&LambertConfig::default());
        let a = proj.forward(37.8, -122.4);
        let b = proj.forward(37.8, 237.6);
        assert!((a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6);
    }

    #[test]
    fn test_no_rotation_on_orientation_meridian() {
        let proj = LambertConformal::new(&LambertConfig::default());
        let (u, v) = proj.earth_relative(262.5, 3.0, -4.0);
        assert!((u - 3.0).abs() < 1e-12 && (v + 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_grid_east_follows_grid_rows() {
        let proj = LambertConformal::new(&LambertConfig::default());
        // East and west edges rotate in opposite senses.
        for (row, col) in [(500, 1700), (800, 50)] {
            let (lat, lon) = proj.grid_point(row, col);
            let (lat2, lon2) = proj.grid_point(row, col + 1);
            let east = (lon2 - lon).to_radians() * lat.to_radians().cos();
            let north = (lat2 - lat).to_radians();
            let expected = north.atan2(east).to_degrees();

            let (u, v) = proj.earth_relative(lon, 1.0, 0.0);
            let got = v.atan2(u).to_degrees();
            assert!((got - expected).abs() < 0.05, "({row},{col}) {got} vs {expected}");
            assert!(expected.abs() > 10.0);
            assert!((u.hypot(v) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rotate_in_place() {
        let proj = LambertConformal::new(&LambertConfig::default());
        let lons = [262.5, 289.0];
        let mut u = [0.0, 0.0];
        let mut v = [5.0, 5.0];
        proj.rotate_to_earth(&lons, &mut u, &mut v);
        assert!(u[0].abs() < 1e-12 && (v[0] - 5.0).abs() < 1e-12);
        // Grid north leans east of true north on the east side.
        assert!(u[1] > 1.0);
        assert!((u[1].hypot(v[1]) - 5.0).abs() < 1e-9);
    }
}
