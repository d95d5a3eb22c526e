//! Bilinear quadrilateral element on the reference square `[-1, 1]^2`.
//!
//! Local node order is counterclockwise starting at `(-1, -1)`.

use glam::{DMat2, DVec2};

pub const NODES_PER_ELEMENT: usize = 4;

/// Reference coordinates of the four local nodes
pub const REFERENCE_NODES: [DVec2; NODES_PER_ELEMENT] = [
    DVec2::new(-1.0, -1.0),
    DVec2::new(1.0, -1.0),
    DVec2::new(1.0, 1.0),
    DVec2::new(-1.0, 1.0),
];

const GAUSS_COORD: f64 = 0.577_350_269_189_625_8; // 1/sqrt(3)

/// 2x2 Gauss rule; every weight is 1
pub const GAUSS_POINTS: [DVec2; 4] = [
    DVec2::new(-GAUSS_COORD, -GAUSS_COORD),
    DVec2::new(GAUSS_COORD, -GAUSS_COORD),
    DVec2::new(GAUSS_COORD, GAUSS_COORD),
    DVec2::new(-GAUSS_COORD, GAUSS_COORD),
];
pub const GAUSS_WEIGHT: f64 = 1.0;

pub fn shape_values(xi: DVec2) -> [f64; NODES_PER_ELEMENT] {
    let mut n = [0.0; NODES_PER_ELEMENT];
    for (a, node) in REFERENCE_NODES.iter().enumerate() {
        n[a] = 0.25 * (1.0 + node.x * xi.x) * (1.0 + node.y * xi.y);
    }
    n
}

/// Shape function gradients with respect to the reference coordinates
pub fn reference_gradients(xi: DVec2) -> [DVec2; NODES_PER_ELEMENT] {
    let mut g = [DVec2::ZERO; NODES_PER_ELEMENT];
    for (a, node) in REFERENCE_NODES.iter().enumerate() {
        g[a] = DVec2::new(
            0.25 * node.x * (1.0 + node.y * xi.y),
            0.25 * node.y * (1.0 + node.x * xi.x),
        );
    }
    g
}

/// Physical position of the reference point `xi`
pub fn map_point(coords: &[DVec2; NODES_PER_ELEMENT], xi: DVec2) -> DVec2 {
    shape_values(xi)
        .iter()
        .zip(coords)
        .fold(DVec2::ZERO, |acc, (n, x)| acc + *n * *x)
}

/// Jacobian `dx/dxi` with columns `dx/dxi` and `dx/deta`
pub fn jacobian(coords: &[DVec2; NODES_PER_ELEMENT], xi: DVec2) -> DMat2 {
    let grads = reference_gradients(xi);
    let mut col_xi = DVec2::ZERO;
    let mut col_eta = DVec2::ZERO;
    for (x, g) in coords.iter().zip(grads.iter()) {
        col_xi += *x * g.x;
        col_eta += *x * g.y;
    }
    DMat2::from_cols(col_xi, col_eta)
}

/// Shape values, physical gradients and position at one reference point.
#[derive(Debug, Clone, Copy)]
pub struct PointValues {
    pub xi: DVec2,
    pub position: DVec2,
    pub shape: [f64; NODES_PER_ELEMENT],
    pub gradients: [DVec2; NODES_PER_ELEMENT],
    pub det_jacobian: f64,
}

impl PointValues {
    /// Returns `None` when the element is degenerate or inverted at `xi`.
    pub fn at(coords: &[DVec2; NODES_PER_ELEMENT], xi: DVec2) -> Option<Self> {
        let j = jacobian(coords, xi);
        let det = j.determinant();
        if !(det > 0.0) {
            return None;
        }
        let inv_t = j.inverse().transpose();
        let mut gradients = reference_gradients(xi);
        for g in gradients.iter_mut() {
            *g = inv_t * *g;
        }
        Some(Self {
            xi,
            position: map_point(coords, xi),
            shape: shape_values(xi),
            gradients,
            det_jacobian: det,
        })
    }

    /// Interpolate nodal scalars
    pub fn value(&self, nodal: &[f64; NODES_PER_ELEMENT]) -> f64 {
        self.shape.iter().zip(nodal).map(|(n, v)| n * v).sum()
    }

    /// Gradient of the interpolated nodal scalars
    pub fn gradient(&self, nodal: &[f64; NODES_PER_ELEMENT]) -> DVec2 {
        self.gradients
            .iter()
            .zip(nodal)
            .fold(DVec2::ZERO, |acc, (g, v)| acc + *g * *v)
    }

    /// Interpolate nodal vectors
    pub fn vector(&self, nodal: &[DVec2; NODES_PER_ELEMENT]) -> DVec2 {
        self.shape
            .iter()
            .zip(nodal)
            .fold(DVec2::ZERO, |acc, (n, v)| acc + *n * *v)
    }
}

/// Quadrature values of one element: shape data plus `JxW` at each Gauss point.
#[derive(Debug, Clone)]
pub struct ElementValues {
    pub points: Vec<PointValues>,
    pub jxw: Vec<f64>,
}

impl ElementValues {
    pub fn reinit(coords: &[DVec2; NODES_PER_ELEMENT]) -> Option<Self> {
        let mut points = Vec::with_capacity(GAUSS_POINTS.len());
        let mut jxw = Vec::with_capacity(GAUSS_POINTS.len());
        for xi in GAUSS_POINTS {
            let pv = PointValues::at(coords, xi)?;
            jxw.push(pv.det_jacobian * GAUSS_WEIGHT);
            points.push(pv);
        }
        Some(Self { points, jxw })
    }

    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    pub fn area(&self) -> f64 {
        self.jxw.iter().sum()
    }
}

/// Gradient of each node's own shape function, evaluated at that node.
pub fn nodal_self_gradients(coords: &[DVec2; NODES_PER_ELEMENT]) -> Option<[DVec2; NODES_PER_ELEMENT]> {
    let mut out = [DVec2::ZERO; NODES_PER_ELEMENT];
    for (a, xi) in REFERENCE_NODES.iter().enumerate() {
        out[a] = PointValues::at(coords, *xi)?.gradients[a];
    }
    Some(out)
}

/// Newton inversion of the bilinear map. The result may lie outside the
/// reference square; callers decide how much slack to allow.
pub fn inverse_map(coords: &[DVec2; NODES_PER_ELEMENT], p: DVec2) -> Option<DVec2> {
    let mut xi = DVec2::ZERO;
    for _ in 0..25 {
        let residual = map_point(coords, xi) - p;
        let j = jacobian(coords, xi);
        if j.determinant().abs() < f64::EPSILON {
            return None;
        }
        let step = j.inverse() * residual;
        xi -= step;
        if step.length() < 1e-13 {
            return Some(xi);
        }
    }
    Some(xi).filter(|xi| (map_point(coords, *xi) - p).length() < 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_square() -> [DVec2; 4] {
        [
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.0, 1.0),
        ]
    }

    fn skewed() -> [DVec2; 4] {
        [
            DVec2::new(0.0, 0.0),
            DVec2::new(2.0, 0.2),
            DVec2::new(2.5, 1.8),
            DVec2::new(-0.3, 1.1),
        ]
    }

    #[test]
    fn test_partition_of_unity() {
        for xi in [DVec2::ZERO, DVec2::new(0.3, -0.7), DVec2::new(1.0, 1.0)] {
            let n = shape_values(xi);
            assert_abs_diff_eq!(n.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
            let g = reference_gradients(xi);
            let sum = g.iter().fold(DVec2::ZERO, |acc, v| acc + *v);
            assert_abs_diff_eq!(sum.length(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_kronecker_at_nodes() {
        for (a, xi) in REFERENCE_NODES.iter().enumerate() {
            let n = shape_values(*xi);
            for (b, value) in n.iter().enumerate() {
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(*value, expected, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_gauss_rule_integrates_area() {
        let values = ElementValues::reinit(&unit_square()).unwrap();
        assert_eq!(values.n_points(), 4);
        assert_abs_diff_eq!(values.area(), 1.0, epsilon = 1e-14);

        let reference = ElementValues::reinit(&REFERENCE_NODES).unwrap();
        assert_abs_diff_eq!(reference.area(), 4.0, epsilon = 1e-14);
    }

    #[test]
    fn test_gradient_of_linear_field_is_exact() {
        let coords = skewed();
        let nodal = coords.map(|x| 3.0 * x.x - 2.0 * x.y + 1.0);
        let values = ElementValues::reinit(&coords).unwrap();
        for pv in &values.points {
            let g = pv.gradient(&nodal);
            assert_abs_diff_eq!(g.x, 3.0, epsilon = 1e-12);
            assert_abs_diff_eq!(g.y, -2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(
                pv.value(&nodal),
                3.0 * pv.position.x - 2.0 * pv.position.y + 1.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_inverse_map_round_trip() {
        let coords = skewed();
        let xi = DVec2::new(0.25, -0.6);
        let p = map_point(&coords, xi);
        let back = inverse_map(&coords, p).unwrap();
        assert_abs_diff_eq!(back.x, xi.x, epsilon = 1e-10);
        assert_abs_diff_eq!(back.y, xi.y, epsilon = 1e-10);
    }

    #[test]
    fn test_inverted_element_is_rejected() {
        let mut coords = unit_square();
        coords.swap(1, 3);
        assert!(ElementValues::reinit(&coords).is_none());
    }

    #[test]
    fn test_nodal_self_gradients_on_reference_square() {
        let g = nodal_self_gradients(&REFERENCE_NODES).unwrap();
        // N_0 at (-1,-1) has gradient (-1/2, -1/2)
        assert_abs_diff_eq!(g[0].x, -0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(g[0].y, -0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(g[2].x, 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(g[2].y, 0.5, epsilon = 1e-14);
    }
}
