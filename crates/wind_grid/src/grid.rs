//! Decoded regular-grid payload.

use common::{Error, Result};

/// One forecast hour on a `rows x cols` grid, row-major.
///
/// Longitudes are in the 0..360 convention. `u`/`v` are the 10 m east and
/// north wind components in m/s.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularGrid {
    pub rows: usize,
    pub cols: usize,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

impl RegularGrid {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows < 2 || self.cols < 2 {
            return Err(Error::Decode(format!(
                "grid {}x{} is too small to interpolate",
                self.rows, self.cols
            )));
        }
        let n = self.len();
        for (name, arr) in [("lats", &self.lats), ("lons", &self.lons), ("u", &self.u), ("v", &self.v)] {
            if arr.len() != n {
                return Err(Error::Decode(format!(
                    "{} has {} values, expected {} ({}x{})",
                    name,
                    arr.len(),
                    n,
                    self.rows,
                    self.cols
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }
}
