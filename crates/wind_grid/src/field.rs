//! Built wind field: spatial index plus bilinear interpolation.

use chrono::{DateTime, Duration, Utc};
use common::{lon_to_360, GeoPoint, Result, WindSample};
use forecast_window::ForecastField;
use noaa_client::Candidate;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::grid::RegularGrid;

type IndexedNode = GeomWithData<[f64; 2], usize>;

/// Steps allowed when walking from the nearest node to the enclosing cell.
const MAX_CELL_STEPS: usize = 4;

/// One immutable forecast hour of wind.
pub struct WindField {
    grid: RegularGrid,
    index: RTree<IndexedNode>,
    /// Longitude scale so index distances are roughly isotropic.
    lon_scale: f64,
    cycle_time: DateTime<Utc>,
    forecast_hour: u32,
}

impl std::fmt::Debug for WindField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindField")
            .field("rows", &self.grid.rows)
            .field("cols", &self.grid.cols)
            .field("cycle_time", &self.cycle_time)
            .field("forecast_hour", &self.forecast_hour)
            .finish()
    }
}

impl WindField {
    pub fn build(grid: RegularGrid, candidate: Candidate) -> Result<Self> {
        grid.validate()?;

        let mean_lat = grid.lats.iter().sum::<f64>() / grid.len() as f64;
        let lon_scale = mean_lat.to_radians().cos();
        let nodes: Vec<IndexedNode> = grid
            .lats
            .iter()
            .zip(grid.lons.iter())
            .enumerate()
            .map(|(i, (&lat, &lon))| GeomWithData::new([lat, lon * lon_scale], i))
            .collect();

        Ok(Self {
            index: RTree::bulk_load(nodes),
            grid,
            lon_scale,
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

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.grid.rows, self.grid.cols)
    }

    fn planar(&self, idx: usize) -> [f64; 2] {
        [self.grid.lats[idx], self.grid.lons[idx] * self.lon_scale]
    }

    /// Fractional (row, col) of a point, lon in 0..360.
    ///
    /// Starts at the nearest node's cell, solves the cell's local affine
    /// frame for the in-cell fraction, and steps to a neighbouring cell while
    /// the fraction falls outside [0, 1]. Points off the grid clamp to the edge.
    pub fn locate(&self, lat: f64, lon_360: f64) -> (f64, f64) {
        let g = &self.grid;
        let q = [lat, lon_360 * self.lon_scale];
        let nearest = self.index.nearest_neighbor(&q).map(|n| n.data).unwrap_or(0);

        let mut r0 = (nearest / g.cols).min(g.rows - 2);
        let mut c0 = (nearest % g.cols).min(g.cols - 2);
        let mut fy;
        let mut fx;

        let mut steps = 0;
        loop {
            let p00 = self.planar(g.idx(r0, c0));
            let p01 = self.planar(g.idx(r0, c0 + 1));
            let p10 = self.planar(g.idx(r0 + 1, c0));
            let ex = [p01[0] - p00[0], p01[1] - p00[1]];
            let ey = [p10[0] - p00[0], p10[1] - p00[1]];
            let d = [q[0] - p00[0], q[1] - p00[1]];

            let det = ex[0] * ey[1] - ey[0] * ex[1];
            if det.abs() < 1e-18 {
                fx = 0.0;
                fy = 0.0;
                break;
            }
            fx = (d[0] * ey[1] - ey[0] * d[1]) / det;
            fy = (ex[0] * d[1] - d[0] * ex[1]) / det;

            if steps == MAX_CELL_STEPS {
                break;
            }
            let mut moved = false;
            if fx < 0.0 && c0 > 0 {
                c0 -= 1;
                moved = true;
            } else if fx > 1.0 && c0 < g.cols - 2 {
                c0 += 1;
                moved = true;
            }
            if fy < 0.0 && r0 > 0 {
                r0 -= 1;
                moved = true;
            } else if fy > 1.0 && r0 < g.rows - 2 {
                r0 += 1;
                moved = true;
            }
            if !moved {
                break;
            }
            steps += 1;
        }

        (r0 as f64 + fy.clamp(0.0, 1.0), c0 as f64 + fx.clamp(0.0, 1.0))
    }

    fn bilinear(&self, values: &[f64], row: f64, col: f64) -> f64 {
        let g = &self.grid;
        let r0 = (row.floor().max(0.0) as usize).min(g.rows - 2);
        let c0 = (col.floor().max(0.0) as usize).min(g.cols - 2);
        let fr = (row - r0 as f64).clamp(0.0, 1.0);
        let fc = (col - c0 as f64).clamp(0.0, 1.0);

        let v00 = values[g.idx(r0, c0)];
        let v01 = values[g.idx(r0, c0 + 1)];
        let v10 = values[g.idx(r0 + 1, c0)];
        let v11 = values[g.idx(r0 + 1, c0 + 1)];
        v00 * (1.0 - fr) * (1.0 - fc) + v01 * (1.0 - fr) * fc + v10 * fr * (1.0 - fc) + v11 * fr * fc
    }

    /// Interpolated (u, v) in m/s; lon in either convention.
    pub fn components_at(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (row, col) = self.locate(lat, lon_to_360(lon));
        let u = self.bilinear(&self.grid.u, row, col);
        let v = self.bilinear(&self.grid.v, row, col);
        (
            if u.is_finite() { u } else { 0.0 },
            if v.is_finite() { v } else { 0.0 },
        )
    }
}

impl ForecastField for WindField {
    type Sample = WindSample;
    type Shared = ();

    fn valid_time(&self) -> DateTime<Utc> {
        self.cycle_time + Duration::hours(self.forecast_hour as i64)
    }

    fn sample(&self, lat: f64, lon: f64) -> WindSample {
        let (u, v) = self.components_at(lat, lon);
        WindSample::from_components(u, v)
    }

    fn sample_batch(&self, points: &[GeoPoint]) -> Vec<WindSample> {
        points.iter().map(|p| self.sample(p.lat, p.lon)).collect()
    }
}
