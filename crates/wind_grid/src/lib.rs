//! Regular-grid wind source (HRRR 10 m wind).
//!
//! The grid is regular in its Lambert conformal index space but curved in
//! lat/lon, so lookups go through an R-tree to find the enclosing cell before
//! bilinear interpolation in (row, col).

pub mod decoder;
pub mod field;
pub mod grid;
pub mod projection;
pub mod source;

pub use decoder::{Grib2Decoder, GridDecoder};
pub use field::WindField;
pub use grid::RegularGrid;
pub use projection::LambertConformal;
pub use source::RegularGridSource;
