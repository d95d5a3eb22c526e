/// Temperature reporting operation
/// Records nodal temperature statistics and the phase make-up of the mesh
/// every `report_frequency_percent` of the run.
use crate::error::Result;
use crate::sim::sim_op::SimOp;
use crate::sim::simulation::Simulation;
use crate::thermo::{PhaseRegime, ThermodynamicState};
use std::any::Any;
use tracing::info;

/// Nodal statistics at one reported step
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSnapshot {
    pub step: usize,
    pub time: f64,
    pub mean_temperature: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    /// Mean liquid mass fraction over all nodes
    pub mean_liquid_fraction: f64,
    pub liquid_nodes: usize,
    pub mushy_nodes: usize,
    pub eutectic_nodes: usize,
    pub solid_nodes: usize,
    pub total_energy: f64,
}

impl TemperatureSnapshot {
    pub fn from_states(step: usize, time: f64, states: &[ThermodynamicState], total_energy: f64) -> Self {
        let mut snapshot = TemperatureSnapshot {
            step,
            time,
            mean_temperature: 0.0,
            min_temperature: f64::INFINITY,
            max_temperature: f64::NEG_INFINITY,
            mean_liquid_fraction: 0.0,
            liquid_nodes: 0,
            mushy_nodes: 0,
            eutectic_nodes: 0,
            solid_nodes: 0,
            total_energy,
        };
        for state in states {
            snapshot.mean_temperature += state.temperature;
            snapshot.mean_liquid_fraction += state.liquid_mass_fraction;
            snapshot.min_temperature = snapshot.min_temperature.min(state.temperature);
            snapshot.max_temperature = snapshot.max_temperature.max(state.temperature);
            match state.regime {
                PhaseRegime::Liquid => snapshot.liquid_nodes += 1,
                PhaseRegime::Mushy => snapshot.mushy_nodes += 1,
                PhaseRegime::Eutectic => snapshot.eutectic_nodes += 1,
                PhaseRegime::Solid => snapshot.solid_nodes += 1,
            }
        }
        if !states.is_empty() {
            snapshot.mean_temperature /= states.len() as f64;
            snapshot.mean_liquid_fraction /= states.len() as f64;
        }
        snapshot
    }

    pub fn node_count(&self) -> usize {
        self.liquid_nodes + self.mushy_nodes + self.eutectic_nodes + self.solid_nodes
    }
}

pub struct TemperatureReportingOp {
    pub report_frequency_percent: f64,
    last_reported_step: Option<usize>,
    history: Vec<TemperatureSnapshot>,
}

impl Default for TemperatureReportingOp {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureReportingOp {
    pub fn new() -> Self {
        Self::with_frequency(10.0)
    }

    pub fn with_frequency(report_frequency_percent: f64) -> Self {
        Self {
            report_frequency_percent,
            last_reported_step: None,
            history: Vec::new(),
        }
    }

    /// Snapshots in the order they were taken; the first is the initial state
    pub fn history(&self) -> &[TemperatureSnapshot] {
        &self.history
    }

    fn should_report(&self, sim: &Simulation) -> bool {
        if sim.sim_steps == 0 || self.report_frequency_percent <= 0.0 {
            return false;
        }
        let milestone = |step: usize| {
            (step as f64 / sim.sim_steps as f64 * 100.0 / self.report_frequency_percent).floor() as i64
        };
        let last = self.last_reported_step.map_or(-1, milestone);
        milestone(sim.current_step()) > last
    }

    fn record(&mut self, sim: &Simulation) -> Result<&TemperatureSnapshot> {
        let states = sim.model.nodal_states()?;
        let snapshot = TemperatureSnapshot::from_states(
            sim.current_step(),
            sim.model.time(),
            &states,
            sim.model.total_energy()?,
        );
        self.last_reported_step = Some(snapshot.step);
        self.history.push(snapshot);
        Ok(&self.history[self.history.len() - 1])
    }
}

impl SimOp for TemperatureReportingOp {
    fn name(&self) -> &str {
        "TemperatureReporting"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn init_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        let snapshot = self.record(sim)?;
        info!(
            mean = %format!("{:.2}", snapshot.mean_temperature),
            min = %format!("{:.2}", snapshot.min_temperature),
            max = %format!("{:.2}", snapshot.max_temperature),
            liquid = snapshot.liquid_nodes,
            solid = snapshot.solid_nodes,
            "initial temperature report"
        );
        Ok(())
    }

    fn update_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        if !self.should_report(sim) {
            return Ok(());
        }
        let progress = sim.progress() * 100.0;
        let snapshot = self.record(sim)?;
        info!(
            step = snapshot.step,
            progress = %format!("{progress:.0}%"),
            time = snapshot.time,
            mean = %format!("{:.2}", snapshot.mean_temperature),
            min = %format!("{:.2}", snapshot.min_temperature),
            max = %format!("{:.2}", snapshot.max_temperature),
            liquid = snapshot.liquid_nodes,
            mushy = snapshot.mushy_nodes,
            eutectic = snapshot.eutectic_nodes,
            solid = snapshot.solid_nodes,
            "temperature report"
        );
        Ok(())
    }

    fn after_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        if self.last_reported_step != Some(sim.current_step()) {
            self.record(sim)?;
        }
        if let (Some(first), Some(last)) = (self.history.first(), self.history.last()) {
            info!(
                mean_change = %format!("{:+.3}", last.mean_temperature - first.mean_temperature),
                fraction_change = %format!("{:+.4}", last.mean_liquid_fraction - first.mean_liquid_fraction),
                reports = self.history.len(),
                "temperature reporting complete"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinearSolverKind, SimulationConfig};
    use crate::energy::EnergyInitializer;
    use crate::fem::QuadMesh;
    use crate::fields::{FieldKind, NodalScalarField, NodalVectorField};
    use crate::model::SolidificationModel;
    use crate::sim::{SimOpHandle, SimProps};
    use glam::DVec2;

    fn state(regime: PhaseRegime, temperature: f64, f: f64) -> ThermodynamicState {
        ThermodynamicState {
            regime,
            enthalpy: 0.0,
            concentration: 0.192,
            temperature,
            density: 10000.0,
            epsilon: f,
            fluid_concentration: 0.192,
            liquid_mass_fraction: f,
        }
    }

    #[test]
    fn test_snapshot_statistics() {
        let states = [
            state(PhaseRegime::Liquid, 290.0, 1.0),
            state(PhaseRegime::Mushy, 240.0, 0.5),
            state(PhaseRegime::Solid, 150.0, 0.0),
            state(PhaseRegime::Solid, 120.0, 0.0),
        ];
        let snapshot = TemperatureSnapshot::from_states(3, 1.5, &states, 42.0);
        assert_eq!(snapshot.mean_temperature, 200.0);
        assert_eq!(snapshot.min_temperature, 120.0);
        assert_eq!(snapshot.max_temperature, 290.0);
        assert_eq!(snapshot.mean_liquid_fraction, 0.375);
        assert_eq!(snapshot.solid_nodes, 2);
        assert_eq!(snapshot.eutectic_nodes, 0);
        assert_eq!(snapshot.node_count(), 4);
    }

    #[test]
    fn test_reports_at_milestones() {
        let mut config = SimulationConfig::default();
        config.time.dt = 1.0;
        config.linear_solver.kind = LinearSolverKind::DenseLu;
        let model = SolidificationModel::new(
            config,
            QuadMesh::build_square(2, 2, 0.0, 0.02, 0.0, 0.02),
            NodalScalarField::uniform(FieldKind::Concentration, 0.192),
            NodalVectorField::uniform(FieldKind::Momentum, DVec2::ZERO),
            EnergyInitializer::temperature(|p| if p.y < 0.005 { 150.0 } else { 287.0 }),
        )
        .unwrap();

        let mut sim = Simulation::new(SimProps {
            model,
            name: "milestones",
            ops: vec![SimOpHandle::new(Box::new(TemperatureReportingOp::with_frequency(25.0)))],
            sim_steps: Some(8),
        });
        sim.run().unwrap();

        let op = sim.find_op::<TemperatureReportingOp>().unwrap();
        let steps: Vec<usize> = op.history().iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 2, 4, 6, 8]);
        assert!(op.history().iter().all(|s| s.node_count() == 9));
    }
}
