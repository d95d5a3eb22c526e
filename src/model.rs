// src/model.rs - Owning context of a coupled solidification run

use crate::config::SimulationConfig;
use crate::energy::{EnergyInitializer, EnergySystem, EnergyTimeScheme};
use crate::error::Result;
use crate::fem::QuadMesh;
use crate::fields::{CoupledFields, FieldSolver, NodalScalarField, NodalVectorField};
use crate::material::MaterialConstants;
use crate::thermo::{PhaseStateEvaluator, PhaseThresholds, ThermodynamicState};
use glam::DVec2;
use std::sync::Arc;
use tracing::info;

/// Holds the mesh, the material table and all three fields.
///
/// The sibling fields are handed to the energy system as a read-only
/// [`CoupledFields`] view, so no field ever holds a reference to another.
pub struct SolidificationModel {
    config: SimulationConfig,
    material: Arc<MaterialConstants>,
    mesh: QuadMesh,
    concentration: NodalScalarField,
    velocity: NodalVectorField,
    energy: EnergySystem,
}

impl SolidificationModel {
    pub fn new(
        config: SimulationConfig,
        mesh: QuadMesh,
        concentration: NodalScalarField,
        velocity: NodalVectorField,
        initializer: EnergyInitializer,
    ) -> Result<Self> {
        config.validate()?;
        let material = Arc::new(config.material.clone());
        let energy = EnergySystem::new(
            Arc::clone(&material),
            config.linear_solver.build(),
            initializer,
            EnergyTimeScheme {
                gamma: config.time.gamma,
                consistent_initial_rate: config.time.consistent_initial_rate,
            },
        );
        Ok(Self {
            config,
            material,
            mesh,
            concentration,
            velocity,
            energy,
        })
    }

    pub fn coupled(&self) -> CoupledFields<'_> {
        CoupledFields {
            mesh: &self.mesh,
            concentration: &self.concentration,
            velocity: &self.velocity,
        }
    }

    /// Initialize sibling fields that are not ready yet, then the energy system.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.velocity.is_initialized() {
            self.velocity.initialize(&self.mesh)?;
        }
        if !self.concentration.is_initialized() {
            self.concentration.initialize(&self.mesh)?;
        }
        let fields = CoupledFields {
            mesh: &self.mesh,
            concentration: &self.concentration,
            velocity: &self.velocity,
        };
        self.energy.initialize(&fields)?;
        info!(
            elements = self.mesh.n_elements(),
            nodes = self.mesh.n_nodes(),
            dt = self.config.time.dt,
            gamma = self.config.time.gamma,
            "solidification model initialized"
        );
        Ok(())
    }

    /// One step with the configured time step
    pub fn step(&mut self) -> Result<()> {
        self.step_by(self.config.time.dt)
    }

    /// Advance momentum and concentration, then the energy equation on top of them
    pub fn step_by(&mut self, dt: f64) -> Result<()> {
        self.velocity.solve(&self.mesh, dt)?;
        self.concentration.solve(&self.mesh, dt)?;
        let fields = CoupledFields {
            mesh: &self.mesh,
            concentration: &self.concentration,
            velocity: &self.velocity,
        };
        self.energy.solve(&fields, dt)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn material(&self) -> &Arc<MaterialConstants> {
        &self.material
    }

    pub fn mesh(&self) -> &QuadMesh {
        &self.mesh
    }

    pub fn energy(&self) -> &EnergySystem {
        &self.energy
    }

    pub fn energy_mut(&mut self) -> &mut EnergySystem {
        &mut self.energy
    }

    pub fn concentration(&self) -> &NodalScalarField {
        &self.concentration
    }

    pub fn velocity(&self) -> &NodalVectorField {
        &self.velocity
    }

    pub fn evaluator(&self) -> &PhaseStateEvaluator {
        self.energy.evaluator()
    }

    pub fn thresholds(&self, concentration: f64) -> PhaseThresholds {
        self.evaluator().thresholds(concentration)
    }

    pub fn time(&self) -> f64 {
        self.energy.time()
    }

    pub fn step_count(&self) -> usize {
        self.energy.step_count()
    }

    pub fn state_at(&self, p: DVec2) -> Result<ThermodynamicState> {
        self.energy.state_at(&self.coupled(), p)
    }

    pub fn temperature(&self, p: DVec2) -> Result<f64> {
        self.energy.temperature(&self.coupled(), p)
    }

    pub fn density(&self, p: DVec2) -> Result<f64> {
        self.energy.density(&self.coupled(), p)
    }

    pub fn epsilon(&self, p: DVec2) -> Result<f64> {
        self.energy.epsilon(&self.coupled(), p)
    }

    pub fn fluid_concentration(&self, p: DVec2) -> Result<f64> {
        self.energy.fluid_concentration(&self.coupled(), p)
    }

    pub fn liquid_mass_fraction(&self, p: DVec2) -> Result<f64> {
        self.energy.liquid_mass_fraction(&self.coupled(), p)
    }

    pub fn nodal_states(&self) -> Result<Vec<ThermodynamicState>> {
        self.energy.nodal_states(&self.coupled())
    }

    pub fn total_energy(&self) -> Result<f64> {
        self.energy.total_energy(&self.coupled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinearSolverKind;
    use crate::error::SolidifyError;
    use crate::fields::FieldKind;
    use crate::thermo::PhaseRegime;

    fn chilled_bar(config: SimulationConfig) -> SolidificationModel {
        let mesh = QuadMesh::build_square(4, 1, 0.0, 0.04, 0.0, 0.01);
        SolidificationModel::new(
            config,
            mesh,
            NodalScalarField::uniform(FieldKind::Concentration, 0.192),
            NodalVectorField::uniform(FieldKind::Momentum, DVec2::ZERO),
            EnergyInitializer::temperature(|p| if p.x < 0.005 { 150.0 } else { 287.0 }),
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_sets_up_siblings() {
        let mut model = chilled_bar(SimulationConfig::default());
        assert!(matches!(model.temperature(DVec2::ZERO), Err(SolidifyError::NotInitialized)));

        model.initialize().unwrap();
        assert!(model.velocity().is_initialized());
        assert!(model.concentration().is_initialized());

        let states = model.nodal_states().unwrap();
        assert_eq!(states[0].regime, PhaseRegime::Solid);
        assert_eq!(states[4].regime, PhaseRegime::Liquid);
    }

    #[test]
    fn test_chilled_end_cools_the_melt() {
        let mut config = SimulationConfig::default();
        config.time.dt = 1.0;
        config.time.gamma = 1.0;
        config.linear_solver.kind = LinearSolverKind::DenseLu;
        let mut model = chilled_bar(config);
        model.initialize().unwrap();

        let sample_point = DVec2::new(0.01, 0.005);
        let before = model.temperature(sample_point).unwrap();
        for _ in 0..5 {
            model.step().unwrap();
        }
        let after = model.temperature(sample_point).unwrap();
        println!("sample point temperature {before:.3} -> {after:.3}");
        assert_eq!(model.step_count(), 5);
        assert!(after < before);
    }
}
