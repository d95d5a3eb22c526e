use crate::error::{Result, SolidifyError};
use crate::fem::quad4::{self, ElementValues, NODES_PER_ELEMENT};
use glam::DVec2;

/// Slack on the reference square when deciding whether a point is inside
const LOCATE_TOLERANCE: f64 = 1e-10;

/// Unstructured mesh of bilinear quadrilaterals.
///
/// One scalar DOF per node; node index and DOF index coincide.
#[derive(Debug, Clone)]
pub struct QuadMesh {
    nodes: Vec<DVec2>,
    elements: Vec<[usize; NODES_PER_ELEMENT]>,
}

impl QuadMesh {
    /// Build from raw connectivity. Elements must be counterclockwise and
    /// reference existing nodes.
    pub fn new(nodes: Vec<DVec2>, elements: Vec<[usize; NODES_PER_ELEMENT]>) -> Result<Self> {
        let mesh = Self { nodes, elements };
        for e in 0..mesh.n_elements() {
            if mesh.elements[e].iter().any(|&n| n >= mesh.nodes.len()) {
                return Err(SolidifyError::Config(format!(
                    "element {e} references a node outside 0..{}",
                    mesh.nodes.len()
                )));
            }
            if ElementValues::reinit(&mesh.element_coords(e)).is_none() {
                return Err(SolidifyError::Config(format!(
                    "element {e} is degenerate or not counterclockwise"
                )));
            }
        }
        Ok(mesh)
    }

    /// Structured `nx` by `ny` grid over `[x0, x1] x [y0, y1]`.
    ///
    /// Nodes are numbered row by row from `(x0, y0)`.
    pub fn build_square(nx: usize, ny: usize, x0: f64, x1: f64, y0: f64, y1: f64) -> Self {
        let nx = nx.max(1);
        let ny = ny.max(1);
        let dx = (x1 - x0) / nx as f64;
        let dy = (y1 - y0) / ny as f64;

        let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                nodes.push(DVec2::new(x0 + i as f64 * dx, y0 + j as f64 * dy));
            }
        }

        let mut elements = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let n0 = j * (nx + 1) + i;
                elements.push([n0, n0 + 1, n0 + nx + 2, n0 + nx + 1]);
            }
        }

        Self { nodes, elements }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_dofs(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn nodes(&self) -> &[DVec2] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> DVec2 {
        self.nodes[index]
    }

    /// Global DOF indices of element `e`
    pub fn element(&self, e: usize) -> [usize; NODES_PER_ELEMENT] {
        self.elements[e]
    }

    pub fn element_coords(&self, e: usize) -> [DVec2; NODES_PER_ELEMENT] {
        self.elements[e].map(|n| self.nodes[n])
    }

    /// Gather nodal values of element `e` out of a global vector
    pub fn gather<T: Copy>(&self, e: usize, global: &[T]) -> [T; NODES_PER_ELEMENT] {
        self.elements[e].map(|n| global[n])
    }

    /// Element containing `p` and the reference coordinates of `p` inside it.
    pub fn locate(&self, p: DVec2) -> Option<(usize, DVec2)> {
        (0..self.n_elements()).find_map(|e| {
            let coords = self.element_coords(e);
            let (lo, hi) = coords
                .iter()
                .fold((coords[0], coords[0]), |(lo, hi), x| (lo.min(*x), hi.max(*x)));
            if p.cmplt(lo - DVec2::splat(LOCATE_TOLERANCE)).any()
                || p.cmpgt(hi + DVec2::splat(LOCATE_TOLERANCE)).any()
            {
                return None;
            }
            let xi = quad4::inverse_map(&coords, p)?;
            let limit = 1.0 + LOCATE_TOLERANCE;
            (xi.x.abs() <= limit && xi.y.abs() <= limit)
                .then(|| (e, xi.clamp(DVec2::splat(-1.0), DVec2::splat(1.0))))
        })
    }

    /// Like [`QuadMesh::locate`] but an error for points outside the mesh
    pub fn try_locate(&self, p: DVec2) -> Result<(usize, DVec2)> {
        self.locate(p)
            .ok_or(SolidifyError::PointOutsideMesh { x: p.x, y: p.y })
    }
}
