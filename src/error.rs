//! Error type shared by every layer of the solidification core.

use thiserror::Error;

/// Errors raised by the thermodynamic evaluator, the energy system and the
/// collaborators it drives.
#[derive(Error, Debug)]
pub enum SolidifyError {
    /// Enthalpy or concentration is not a finite number, so no phase regime applies
    #[error("enthalpy {enthalpy} at concentration {concentration} matches no phase regime")]
    Domain { enthalpy: f64, concentration: f64 },

    /// Temperature passed to the inverse relation is not a finite number
    #[error("temperature {temperature} at concentration {concentration} matches no phase regime")]
    TemperatureDomain { temperature: f64, concentration: f64 },

    #[error("field `{0}` must be initialized before it is evaluated")]
    FieldNotInitialized(&'static str),

    #[error("the energy system has not been initialized")]
    NotInitialized,

    #[error("field `{name}` holds {found} nodal values but the mesh has {expected} nodes")]
    FieldSize {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("point ({x}, {y}) lies outside the mesh")]
    PointOutsideMesh { x: f64, y: f64 },

    #[error("linear solve did not converge after {iterations} iterations (residual {residual:.3e})")]
    LinearSolve { iterations: usize, residual: f64 },

    #[error("linear system of size {0} is singular")]
    SingularMatrix(usize),

    #[error("invalid material constants: {0}")]
    InvalidMaterial(String),

    #[error("simulation `{0}` can only run once")]
    AlreadyRan(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SolidifyError>;
