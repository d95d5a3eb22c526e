pub mod sim_op;
pub mod simulation;

pub use sim_op::{ProgressReporterOp, SimOp, SimOpHandle, TemperatureReportingOp, TemperatureSnapshot};
pub use simulation::{OpTiming, SimProps, Simulation};
