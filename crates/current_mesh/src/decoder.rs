//! Payload decoding seam.

use std::path::Path;

use common::Result;

use crate::mesh::MeshPayload;

/// Turns a cached mesh file into a [`MeshPayload`]. Runs on a blocking
/// thread.
pub trait MeshDecoder: Send + Sync + 'static {
    fn decode(&self, path: &Path) -> Result<MeshPayload>;
}

/// FVCOM-style NetCDF decoder (SFBOFS `fields` files).
///
/// Needs the `netcdf` cargo feature; without it every decode reports
/// `Error::FeatureDisabled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfMeshDecoder;

impl MeshDecoder for NetcdfMeshDecoder {
    #[cfg(feature = "netcdf")]
    fn decode(&self, path: &Path) -> Result<MeshPayload> {
        fvcom::decode_surface(path)
    }

    #[cfg(not(feature = "netcdf"))]
    fn decode(&self, _path: &Path) -> Result<MeshPayload> {
        Err(common::Error::FeatureDisabled("netcdf"))
    }
}

/// Modified Julian Day epoch used by FVCOM's `time` variable.
#[cfg_attr(not(feature = "netcdf"), allow(dead_code))]
fn mjd_to_utc(days: f64) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{Duration, TimeZone, Utc};

    if !days.is_finite() {
        return None;
    }
    let epoch = Utc.with_ymd_and_hms(1858, 11, 17, 0, 0, 0).single()?;
    let seconds = (days * 86_400.0).round() as i64;
    Some(epoch + Duration::seconds(seconds))
}

#[cfg(feature = "netcdf")]
mod fvcom {
    use std::path::Path;

    use common::{Error, Result};
    use tracing::debug;

    use crate::mesh::MeshPayload;

    /// Values at or above this magnitude are treated as fill.
    const FILL_THRESHOLD: f64 = 1.0e20;

    fn decode_err(e: impl std::fmt::Display) -> Error {
        Error::Decode(e.to_string())
    }

    fn read_all(file: &netcdf::File, name: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let var = file
            .variable(name)
            .ok_or_else(|| Error::Decode(format!("variable '{}' missing", name)))?;
        let dims = var.dimensions().iter().map(|d| d.len()).collect();
        let values: Vec<f64> = var.get_values(..).map_err(decode_err)?;
        Ok((values, dims))
    }

    /// First `nele` values: time 0, sigma layer 0 for a (time, siglay, nele)
    /// variable stored row-major.
    fn surface_layer(file: &netcdf::File, name: &str, nele: usize) -> Result<Vec<f64>> {
        let (values, dims) = read_all(file, name)?;
        if dims.last() != Some(&nele) || values.len() < nele {
            return Err(Error::Decode(format!(
                "variable '{}' has shape {:?}, expected trailing dimension {}",
                name, dims, nele
            )));
        }
        Ok(values
            .into_iter()
            .take(nele)
            .map(|x| if x.abs() >= FILL_THRESHOLD { f64::NAN } else { x })
            .collect())
    }

    pub(super) fn decode_surface(path: &Path) -> Result<MeshPayload> {
        let file = netcdf::open(path).map_err(decode_err)?;

        let (lonc, _) = read_all(&file, "lonc")?;
        let (latc, _) = read_all(&file, "latc")?;
        let nele = lonc.len();
        let u = surface_layer(&file, "u", nele)?;
        let v = surface_layer(&file, "v", nele)?;

        let valid_time = file
            .variable("time")
            .and_then(|var| var.get_values::<f64, _>(..).ok())
            .and_then(|t| t.first().copied())
            .and_then(super::mjd_to_utc);
        debug!("NetCDF mesh: {} elements, file time {:?}", nele, valid_time);

        let payload = MeshPayload {
            lonc,
            latc,
            u,
            v,
            valid_time,
        };
        payload.validate()?;
        Ok(payload)
    }
}
