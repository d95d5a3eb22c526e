//! Transient volume-averaged energy equation in enthalpy form.
//!
//! The nodal enthalpy `h` is the only stored state; temperature, density and
//! the phase fractions are derived from it on demand.

pub mod assembler;

pub use assembler::{AssembledSystem, AssemblyInput, ElementMatrices, EnergyAssembler};

use crate::error::{Result, SolidifyError};
use crate::fem::quad4;
use crate::fem::LinearSolver;
use crate::fields::CoupledFields;
use crate::material::MaterialConstants;
use crate::thermo::{PhaseStateEvaluator, ThermodynamicState};
use glam::DVec2;
use nalgebra::DVector;
use std::sync::Arc;
use tracing::{debug, info};

/// How the enthalpy field is set at start-up
pub enum EnergyInitializer {
    /// Temperature of each node, converted through the inverse phase relation
    Temperature(Box<dyn Fn(DVec2) -> f64 + Send + Sync>),
    /// Enthalpy of each node, used as is
    Enthalpy(Box<dyn Fn(DVec2) -> f64 + Send + Sync>),
}

impl EnergyInitializer {
    pub fn temperature(f: impl Fn(DVec2) -> f64 + Send + Sync + 'static) -> Self {
        EnergyInitializer::Temperature(Box::new(f))
    }

    pub fn enthalpy(f: impl Fn(DVec2) -> f64 + Send + Sync + 'static) -> Self {
        EnergyInitializer::Enthalpy(Box::new(f))
    }

    pub fn uniform_temperature(temperature: f64) -> Self {
        Self::temperature(move |_| temperature)
    }
}

/// Time integration settings of the energy equation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyTimeScheme {
    pub gamma: f64,
    pub consistent_initial_rate: bool,
}

pub struct EnergySystem {
    assembler: EnergyAssembler,
    linear_solver: Box<dyn LinearSolver>,
    initializer: EnergyInitializer,
    scheme: EnergyTimeScheme,
    enthalpy: DVector<f64>,
    rate: DVector<f64>,
    previous_enthalpy: DVector<f64>,
    initialized: bool,
    time: f64,
    step_count: usize,
    last_system: Option<AssembledSystem>,
}

impl EnergySystem {
    pub fn new(
        material: Arc<MaterialConstants>,
        linear_solver: Box<dyn LinearSolver>,
        initializer: EnergyInitializer,
        scheme: EnergyTimeScheme,
    ) -> Self {
        Self {
            assembler: EnergyAssembler::new(material),
            linear_solver,
            initializer,
            scheme,
            enthalpy: DVector::zeros(0),
            rate: DVector::zeros(0),
            previous_enthalpy: DVector::zeros(0),
            initialized: false,
            time: 0.0,
            step_count: 0,
            last_system: None,
        }
    }

    pub fn evaluator(&self) -> &PhaseStateEvaluator {
        self.assembler.evaluator()
    }

    pub fn assembler(&self) -> &EnergyAssembler {
        &self.assembler
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Project the initial condition onto the nodes, then set the enthalpy rate.
    pub fn initialize(&mut self, fields: &CoupledFields) -> Result<()> {
        fields.ensure_initialized()?;
        let mesh = fields.mesh;
        let concentration = fields.concentration.values_on(mesh)?;
        let evaluator = self.assembler.evaluator();

        let mut enthalpy = DVector::zeros(mesh.n_dofs());
        for (i, p) in mesh.nodes().iter().enumerate() {
            enthalpy[i] = match &self.initializer {
                EnergyInitializer::Enthalpy(h) => h(*p),
                EnergyInitializer::Temperature(t) => {
                    evaluator.enthalpy_from_temperature(t(*p), concentration[i])?
                }
            };
        }

        self.rate = DVector::zeros(mesh.n_dofs());
        self.previous_enthalpy = enthalpy.clone();
        self.enthalpy = enthalpy;
        self.time = 0.0;
        self.step_count = 0;

        if self.scheme.consistent_initial_rate {
            // M hdot = F - (K + N) h, the system with no implicit weight
            let input = AssemblyInput {
                enthalpy: &self.enthalpy,
                rate: &self.rate,
                previous_enthalpy: &self.previous_enthalpy,
                dt: 0.0,
                implicit_weight: 0.0,
            };
            let system = self.assembler.assemble(fields, &input)?;
            self.rate = self.linear_solver.solve(&system.matrix, &system.residual)?;
            self.last_system = Some(system);
        }

        self.initialized = true;
        info!(
            nodes = mesh.n_dofs(),
            solver = self.linear_solver.name(),
            consistent_rate = self.scheme.consistent_initial_rate,
            "energy system initialized"
        );
        Ok(())
    }

    /// Advance the enthalpy by one step of length `dt`.
    pub fn solve(&mut self, fields: &CoupledFields, dt: f64) -> Result<()> {
        if !self.initialized {
            return Err(SolidifyError::NotInitialized);
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SolidifyError::Config(format!("time step must be positive, got {dt}")));
        }
        fields.ensure_initialized()?;

        let gamma = self.scheme.gamma;
        let input = AssemblyInput {
            enthalpy: &self.enthalpy,
            rate: &self.rate,
            previous_enthalpy: &self.previous_enthalpy,
            dt,
            implicit_weight: gamma * dt,
        };
        let system = self.assembler.assemble(fields, &input)?;
        let delta_rate = self.linear_solver.solve(&system.matrix, &system.residual)?;

        let new_rate = &self.rate + &delta_rate;
        let new_enthalpy =
            &self.enthalpy + (&self.rate * (1.0 - gamma) + &new_rate * gamma) * dt;

        self.previous_enthalpy = std::mem::replace(&mut self.enthalpy, new_enthalpy);
        self.rate = new_rate;
        self.last_system = Some(system);
        self.time += dt;
        self.step_count += 1;

        debug!(
            step = self.step_count,
            time = self.time,
            max_delta_rate = delta_rate.amax(),
            "energy step"
        );
        Ok(())
    }

    fn require_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SolidifyError::NotInitialized)
        }
    }

    fn check_mesh(&self, fields: &CoupledFields) -> Result<()> {
        let expected = fields.mesh.n_dofs();
        if self.enthalpy.len() != expected {
            return Err(SolidifyError::FieldSize {
                name: "enthalpy",
                expected,
                found: self.enthalpy.len(),
            });
        }
        Ok(())
    }

    pub fn enthalpy(&self) -> Result<&DVector<f64>> {
        self.require_initialized()?;
        Ok(&self.enthalpy)
    }

    pub fn enthalpy_rate(&self) -> Result<&DVector<f64>> {
        self.require_initialized()?;
        Ok(&self.rate)
    }

    /// Replace the nodal enthalpy, for restarts. The rate is reset to zero.
    pub fn set_enthalpy(&mut self, enthalpy: DVector<f64>) -> Result<()> {
        self.require_initialized()?;
        if enthalpy.len() != self.enthalpy.len() {
            return Err(SolidifyError::FieldSize {
                name: "enthalpy",
                expected: self.enthalpy.len(),
                found: enthalpy.len(),
            });
        }
        self.previous_enthalpy = enthalpy.clone();
        self.enthalpy = enthalpy;
        self.rate.fill(0.0);
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Global system of the most recent assembly
    pub fn last_system(&self) -> Option<&AssembledSystem> {
        self.last_system.as_ref()
    }

    /// Enthalpy interpolated at `p`
    pub fn point_enthalpy(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        self.require_initialized()?;
        self.check_mesh(fields)?;
        let (e, xi) = fields.mesh.try_locate(p)?;
        let nodal = fields.mesh.gather(e, self.enthalpy.as_slice());
        Ok(quad4::shape_values(xi).iter().zip(nodal).map(|(n, h)| n * h).sum())
    }

    /// Thermodynamic state at `p` from the interpolated enthalpy and concentration
    pub fn state_at(&self, fields: &CoupledFields, p: DVec2) -> Result<ThermodynamicState> {
        let h = self.point_enthalpy(fields, p)?;
        let c = fields.concentration.point_value(fields.mesh, p)?;
        self.evaluator().state(h, c)
    }

    pub fn temperature(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        Ok(self.state_at(fields, p)?.temperature)
    }

    pub fn density(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        Ok(self.state_at(fields, p)?.density)
    }

    pub fn epsilon(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        Ok(self.state_at(fields, p)?.epsilon)
    }

    pub fn fluid_concentration(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        Ok(self.state_at(fields, p)?.fluid_concentration)
    }

    pub fn liquid_mass_fraction(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        Ok(self.state_at(fields, p)?.liquid_mass_fraction)
    }

    pub fn specific_heat(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        let eps = self.state_at(fields, p)?.epsilon;
        Ok(self.evaluator().specific_heat(eps))
    }

    pub fn conductivity(&self, fields: &CoupledFields, p: DVec2) -> Result<f64> {
        let eps = self.state_at(fields, p)?.epsilon;
        Ok(self.evaluator().conductivity(eps))
    }

    /// Derived state at every node
    pub fn nodal_states(&self, fields: &CoupledFields) -> Result<Vec<ThermodynamicState>> {
        self.require_initialized()?;
        self.check_mesh(fields)?;
        let concentration = fields.concentration.values_on(fields.mesh)?;
        self.enthalpy
            .iter()
            .zip(concentration)
            .map(|(h, c)| self.evaluator().state(*h, *c))
            .collect()
    }

    /// Integral of `rho h` over the mesh
    pub fn total_energy(&self, fields: &CoupledFields) -> Result<f64> {
        let states = self.nodal_states(fields)?;
        let mesh = fields.mesh;
        let mut total = 0.0;
        for e in 0..mesh.n_elements() {
            let values = quad4::ElementValues::reinit(&mesh.element_coords(e))
                .ok_or_else(|| SolidifyError::Config(format!("element {e} is degenerate")))?;
            let rho_h = mesh.element(e).map(|i| states[i].density * states[i].enthalpy);
            for (pv, jxw) in values.points.iter().zip(&values.jxw) {
                total += pv.value(&rho_h) * jxw;
            }
        }
        Ok(total)
    }
}
