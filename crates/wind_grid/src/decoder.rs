//! Payload decoding seam.

use std::path::Path;

use common::config::LambertConfig;
use common::Result;

use crate::grid::RegularGrid;
use crate::projection::LambertConformal;

/// Turns a cached forecast file into a [`RegularGrid`]. Runs on a blocking
/// thread.
pub trait GridDecoder: Send + Sync + 'static {
    fn decode(&self, path: &Path) -> Result<RegularGrid>;
}

/// HRRR GRIB2 decoder: 10 m U/V plus projected lat/lon for every point.
///
/// HRRR winds are relative to the grid axes; by default they are rotated to
/// true east/north so the rest of the pipeline sees meteorological vectors.
///
/// Needs the `grib` cargo feature (on by default); without it every decode
/// reports `Error::FeatureDisabled`.
#[derive(Debug, Clone)]
pub struct Grib2Decoder {
    projection: LambertConformal,
    grid_relative: bool,
}

impl Grib2Decoder {
    pub fn new(cfg: &LambertConfig) -> Self {
        Self {
            projection: LambertConformal::new(cfg),
            grid_relative: true,
        }
    }

    /// Whether decoded U/V need rotating from grid to earth axes.
    pub fn grid_relative(mut self, on: bool) -> Self {
        self.grid_relative = on;
        self
    }
}

impl GridDecoder for Grib2Decoder {
    #[cfg(feature = "grib")]
    fn decode(&self, path: &Path) -> Result<RegularGrid> {
        let mut grid = grib2::decode_wind10(path, &self.projection)?;
        if self.grid_relative {
            self.projection
                .rotate_to_earth(&grid.lons, &mut grid.u, &mut grid.v);
        }
        Ok(grid)
    }

    #[cfg(not(feature = "grib"))]
    fn decode(&self, path: &Path) -> Result<RegularGrid> {
        let _ = (&self.projection, self.grid_relative, path);
        Err(common::Error::FeatureDisabled("grib"))
    }
}

#[cfg(feature = "grib")]
mod grib2 {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;

    use common::{Error, Result};
    use grib::GridDefinitionTemplateValues;
    use tracing::debug;

    use crate::grid::RegularGrid;
    use crate::projection::LambertConformal;

    const DISCIPLINE_METEOROLOGICAL: u8 = 0;
    const CATEGORY_MOMENTUM: u8 = 2;
    const NUMBER_UGRD: u8 = 2;
    const NUMBER_VGRD: u8 = 3;
    const SURFACE_HEIGHT_ABOVE_GROUND: u8 = 103;
    /// i west to east, j south to north, rows consecutive.
    const SCAN_WE_SN: u8 = 0x40;

    fn decode_err(e: impl std::fmt::Display) -> Error {
        Error::Decode(e.to_string())
    }

    /// (ni, nj) of a Lambert conformal grid scanned in [`SCAN_WE_SN`] order.
    fn lambert_shape(grid_def: &grib::GridDefinition) -> Result<(usize, usize)> {
        let def = match GridDefinitionTemplateValues::try_from(grid_def).map_err(decode_err)? {
            GridDefinitionTemplateValues::Template30(def) => def,
            _ => {
                return Err(Error::Decode(format!(
                    "grid template 3.{} is not Lambert conformal",
                    grid_def.grid_tmpl_num()
                )))
            }
        };
        let grib::ScanningMode(mode) = def.scanning_mode;
        if mode != SCAN_WE_SN {
            return Err(Error::Decode(format!(
                "unsupported scanning mode {:#04x}",
                mode
            )));
        }
        Ok((def.ni as usize, def.nj as usize))
    }

    pub(super) fn decode_wind10(path: &Path, projection: &LambertConformal) -> Result<RegularGrid> {
        let reader = BufReader::new(File::open(path)?);
        let grib2 = grib::from_reader(reader).map_err(decode_err)?;

        let mut u: Option<(usize, usize, Vec<f64>)> = None;
        let mut v: Option<(usize, usize, Vec<f64>)> = None;

        for (_index, submessage) in grib2.iter() {
            if submessage.indicator().discipline != DISCIPLINE_METEOROLOGICAL {
                continue;
            }
            let prod = submessage.prod_def();
            if prod.parameter_category() != Some(CATEGORY_MOMENTUM) {
                continue;
            }
            let target = match prod.parameter_number() {
                Some(NUMBER_UGRD) if u.is_none() => &mut u,
                Some(NUMBER_VGRD) if v.is_none() => &mut v,
                _ => continue,
            };
            let Some((surface, _)) = prod.fixed_surfaces() else {
                continue;
            };
            let height =
                surface.scaled_value as f64 / 10f64.powi(surface.scale_factor as i32);
            if surface.surface_type != SURFACE_HEIGHT_ABOVE_GROUND || (height - 10.0).abs() > 1e-6 {
                continue;
            }

            let (ni, nj) = lambert_shape(submessage.grid_def())?;
            let values: Vec<f64> = grib::Grib2SubmessageDecoder::from(submessage)
                .map_err(decode_err)?
                .dispatch()
                .map_err(decode_err)?
                .map(|x| x as f64)
                .collect();
            debug!("GRIB2 10 m field: {}x{} ({} values)", nj, ni, values.len());
            // j is the row index, counted from the south edge.
            *target = Some((nj, ni, values));

            if u.is_some() && v.is_some() {
                break;
            }
        }

        let (rows, cols, u) = u.ok_or_else(|| Error::Decode("no 10 m UGRD message".into()))?;
        let (vrows, vcols, v) = v.ok_or_else(|| Error::Decode("no 10 m VGRD message".into()))?;
        if (rows, cols) != (vrows, vcols) {
            return Err(Error::Decode(format!(
                "U grid {}x{} differs from V grid {}x{}",
                rows, cols, vrows, vcols
            )));
        }

        let (lats, lons) = projection.grid_latlons(rows, cols);
        let grid = RegularGrid {
            rows,
            cols,
            lats,
            lons,
            u,
            v,
        };
        grid.validate()?;
        Ok(grid)
    }
}
