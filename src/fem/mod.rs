//! Minimal finite element kernel: QUAD4 meshes, quadrature, linear solvers.

pub mod linear_solver;
pub mod mesh;
pub mod quad4;

pub use linear_solver::{BiCgStabSolver, DenseLuSolver, LinearSolver};
pub use mesh::QuadMesh;
pub use quad4::{ElementValues, PointValues, NODES_PER_ELEMENT};
