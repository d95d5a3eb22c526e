use crate::error::Result;
use crate::sim::sim_op::SimOp;
use crate::sim::simulation::Simulation;
use std::any::Any;
use tracing::info;

/// Logs the simulated time and total enthalpy every `interval` steps.
pub struct ProgressReporterOp {
    pub interval: usize,
    pub report_energy: bool,
    reports: usize,
}

impl ProgressReporterOp {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            report_energy: true,
            reports: 0,
        }
    }

    pub fn without_energy(mut self) -> Self {
        self.report_energy = false;
        self
    }

    pub fn reports(&self) -> usize {
        self.reports
    }

    fn report(&mut self, sim: &Simulation, label: &str) -> Result<()> {
        let energy = if self.report_energy {
            Some(sim.model.total_energy()?)
        } else {
            None
        };
        info!(
            step = sim.current_step(),
            of = sim.sim_steps,
            time = %format!("{:.3}s", sim.model.time()),
            energy = ?energy,
            "{label}"
        );
        self.reports += 1;
        Ok(())
    }
}

impl SimOp for ProgressReporterOp {
    fn name(&self) -> &str {
        "ProgressReporter"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn init_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        self.report(sim, "starting solidification run")
    }

    fn update_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        if sim.current_step() % self.interval == 0 {
            self.report(sim, "progress")?;
        }
        Ok(())
    }

    fn after_sim(&mut self, sim: &mut Simulation) -> Result<()> {
        self.report(sim, "solidification run complete")
    }
}
