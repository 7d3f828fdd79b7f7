//! Unstructured-mesh current source (SFBOFS surface currents).
//!
//! Velocities live at triangle-element centres with no regular structure,
//! so interpolation runs over a Delaunay triangulation of those centres.
//! Building it is the expensive step; it is done once per session and the
//! resulting [`SharedTriangulation`] is handed to every later hour.

pub mod decoder;
pub mod field;
pub mod mesh;
pub mod source;
pub mod triangulation;

pub use decoder::{MeshDecoder, NetcdfMeshDecoder};
pub use field::{CurrentField, LinearInterpolator};
pub use mesh::MeshPayload;
pub use source::UnstructuredMeshSource;
pub use triangulation::SharedTriangulation;
