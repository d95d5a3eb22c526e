pub mod progress_reporter_op;
pub mod temperature_reporting_op;

pub use progress_reporter_op::ProgressReporterOp;
pub use temperature_reporting_op::{TemperatureReportingOp, TemperatureSnapshot};

use crate::error::Result;
use crate::sim::simulation::Simulation;
use std::any::Any;

/// Observer hooked into a [`Simulation`] run.
pub trait SimOp {
    /// The name of this operator (for identification and lookup)
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Called once before the first step
    fn init_sim(&mut self, _sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called after every completed step
    fn update_sim(&mut self, _sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called once after the last step
    fn after_sim(&mut self, _sim: &mut Simulation) -> Result<()> {
        Ok(())
    }
}

pub struct SimOpHandle {
    pub op: Box<dyn SimOp>,
}

impl SimOpHandle {
    pub fn new(op: Box<dyn SimOp>) -> Self {
        SimOpHandle { op }
    }
}
