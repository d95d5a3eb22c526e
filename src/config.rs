// src/config.rs - Run configuration loaded from JSON

use crate::constants::{
    DEFAULT_GAMMA, DEFAULT_TIME_STEP, LINEAR_SOLVER_MAX_ITERATIONS, LINEAR_SOLVER_TOLERANCE,
};
use crate::error::{Result, SolidifyError};
use crate::fem::linear_solver::{BiCgStabSolver, DenseLuSolver, LinearSolver};
use crate::json_parser::JsonParser;
use crate::material::MaterialConstants;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Time integration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub dt: f64,
    /// Implicit weight of the generalized trapezoidal scheme, in `(0, 1]`
    pub gamma: f64,
    pub steps: usize,
    /// Solve `M hdot = F - (K + N) h` once at start-up instead of starting at rest
    pub consistent_initial_rate: bool,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_TIME_STEP,
            gamma: DEFAULT_GAMMA,
            steps: 10,
            consistent_initial_rate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverKind {
    DenseLu,
    BiCgStab,
}

impl LinearSolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinearSolverKind::DenseLu => "dense_lu",
            LinearSolverKind::BiCgStab => "bi_cg_stab",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverConfig {
    pub kind: LinearSolverKind,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            kind: LinearSolverKind::BiCgStab,
            tolerance: LINEAR_SOLVER_TOLERANCE,
            max_iterations: LINEAR_SOLVER_MAX_ITERATIONS,
        }
    }
}

impl LinearSolverConfig {
    /// Build the solver this section describes
    pub fn build(&self) -> Box<dyn LinearSolver> {
        match self.kind {
            LinearSolverKind::DenseLu => Box::new(DenseLuSolver),
            LinearSolverKind::BiCgStab => {
                Box::new(BiCgStabSolver::new(self.tolerance, self.max_iterations))
            }
        }
    }
}

/// Everything a run needs besides the mesh and the initial fields.
///
/// Every field has a default, so a config file only names what it changes:
///
/// ```
/// use solidify_fem::config::SimulationConfig;
///
/// let config = SimulationConfig::from_json_str(r#"{ "time": { "dt": 0.5 } }"#).unwrap();
/// assert_eq!(config.time.dt, 0.5);
/// assert_eq!(config.material.eutectic_temperature, 183.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub material: MaterialConstants,
    pub time: TimeConfig,
    pub linear_solver: LinearSolverConfig,
}

impl SimulationConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = JsonParser::load_json(path)?;
        let config: Self = JsonParser::decode(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json_str: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.material.validate()?;

        if !(self.time.dt.is_finite() && self.time.dt > 0.0) {
            return Err(SolidifyError::Config(format!(
                "time.dt must be positive, got {}",
                self.time.dt
            )));
        }
        if !(self.time.gamma > 0.0 && self.time.gamma <= 1.0) {
            return Err(SolidifyError::Config(format!(
                "time.gamma must lie in (0, 1], got {}",
                self.time.gamma
            )));
        }
        if !(self.linear_solver.tolerance > 0.0) || self.linear_solver.max_iterations == 0 {
            return Err(SolidifyError::Config(
                "linear_solver needs a positive tolerance and iteration cap".to_string(),
            ));
        }
        Ok(())
    }
}
