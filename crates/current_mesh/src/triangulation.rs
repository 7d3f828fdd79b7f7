//! Delaunay triangulation over element centres.

use std::time::Instant;

use common::{Error, Result};
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};
use tracing::info;

/// A triangulation vertex: (lon, lat) plus the element it came from.
#[derive(Debug, Clone, Copy)]
pub struct MeshNode {
    position: Point2<f64>,
    element: usize,
}

impl HasPosition for MeshNode {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// Built once, then shared read-only (`Arc`) by every hour in a session.
pub struct SharedTriangulation {
    tri: DelaunayTriangulation<MeshNode>,
    point_count: usize,
}

impl std::fmt::Debug for SharedTriangulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTriangulation")
            .field("point_count", &self.point_count)
            .field("triangles", &self.triangle_count())
            .finish()
    }
}

impl SharedTriangulation {
    /// Triangulate (lon, lat) element centres. Element `i` of any later
    /// value array is attached to point `i`.
    pub fn build(lons: &[f64], lats: &[f64]) -> Result<Self> {
        if lons.len() != lats.len() {
            return Err(Error::Triangulation(format!(
                "{} longitudes vs {} latitudes",
                lons.len(),
                lats.len()
            )));
        }
        let started = Instant::now();
        let nodes: Vec<MeshNode> = lons
            .iter()
            .zip(lats.iter())
            .enumerate()
            .filter(|(_, (x, y))| x.is_finite() && y.is_finite())
            .map(|(element, (&x, &y))| MeshNode {
                position: Point2::new(x, y),
                element,
            })
            .collect();

        let tri = DelaunayTriangulation::<MeshNode>::bulk_load(nodes)
            .map_err(|e| Error::Triangulation(format!("{:?}", e)))?;
        if tri.num_inner_faces() == 0 {
            return Err(Error::Triangulation(
                "element centres are collinear or too few".into(),
            ));
        }

        info!(
            "Triangulation complete in {:.1}s ({} points, {} triangles)",
            started.elapsed().as_secs_f64(),
            lons.len(),
            tri.num_inner_faces()
        );
        Ok(Self {
            tri,
            point_count: lons.len(),
        })
    }

    /// Number of input element centres this triangulation was built for.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn triangle_count(&self) -> usize {
        self.tri.num_inner_faces()
    }

    /// Piecewise-linear value at (lon, lat); `None` outside the hull.
    pub fn interpolate(&self, values: &[f64], lon: f64, lat: f64) -> Option<f64> {
        self.tri.barycentric().interpolate(
            |v| values.get(v.data().element).copied().unwrap_or(f64::NAN),
            Point2::new(lon, lat),
        )
    }
}
