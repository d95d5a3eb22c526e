use crate::error::{Result, SolidifyError};
use crate::model::SolidificationModel;
use crate::sim::sim_op::{SimOp, SimOpHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct OpTiming {
    pub op_name: String,
    pub init_time: Duration,
    pub total_update_time: Duration,
    pub update_call_count: u32,
    pub after_time: Duration,
}

impl OpTiming {
    pub fn new(op_name: String) -> Self {
        Self {
            op_name,
            init_time: Duration::ZERO,
            total_update_time: Duration::ZERO,
            update_call_count: 0,
            after_time: Duration::ZERO,
        }
    }

    pub fn avg_update_time(&self) -> Duration {
        if self.update_call_count > 0 {
            self.total_update_time / self.update_call_count
        } else {
            Duration::ZERO
        }
    }

    pub fn total_time(&self) -> Duration {
        self.init_time + self.total_update_time + self.after_time
    }
}

/// Drives a [`SolidificationModel`] through a fixed number of steps and lets
/// the registered ops observe it before, during and after the run.
pub struct Simulation {
    pub model: SolidificationModel,
    pub ops: Vec<Box<dyn SimOp>>,
    /// `None` until the run starts, then the number of completed steps
    pub step: Option<usize>,
    pub sim_steps: usize,
    pub name: String,
    pub op_timings: Vec<OpTiming>,
    pub solve_time: Duration,
}

pub struct SimProps {
    pub model: SolidificationModel,
    pub name: &'static str,
    pub ops: Vec<SimOpHandle>,
    /// Falls back to `time.steps` of the model configuration
    pub sim_steps: Option<usize>,
}

impl Simulation {
    pub fn new(props: SimProps) -> Simulation {
        let ops: Vec<Box<dyn SimOp>> = props.ops.into_iter().map(|handle| handle.op).collect();
        let op_timings = ops.iter().map(|op| OpTiming::new(op.name().to_string())).collect();
        let sim_steps = props.sim_steps.unwrap_or(props.model.config().time.steps);
        Simulation {
            model: props.model,
            ops,
            step: None,
            sim_steps,
            name: props.name.to_string(),
            op_timings,
            solve_time: Duration::ZERO,
        }
    }

    pub fn current_step(&self) -> usize {
        self.step.unwrap_or(0)
    }

    /// Fraction of the run completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.sim_steps == 0 {
            return 1.0;
        }
        (self.current_step() as f64 / self.sim_steps as f64).min(1.0)
    }

    /// First registered op of type `T`
    pub fn find_op<T: SimOp + 'static>(&self) -> Option<&T> {
        self.ops.iter().find_map(|op| op.as_any().downcast_ref::<T>())
    }

    /// Run a single step with custom operators (for testing)
    pub fn step_with_ops(&mut self, ops: &mut [&mut dyn SimOp]) -> Result<()> {
        if !self.model.energy().is_initialized() {
            self.model.initialize()?;
        }
        self.model.step()?;
        self.step = Some(self.current_step() + 1);
        for op in ops {
            op.update_sim(self)?;
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        if self.step.is_some() {
            return Err(SolidifyError::AlreadyRan(self.name.clone()));
        }
        if !self.model.energy().is_initialized() {
            self.model.initialize()?;
        }
        self.step = Some(0);
        info!(name = %self.name, steps = self.sim_steps, "simulation started");

        self.simulate_init()?;
        while self.current_step() < self.sim_steps {
            let start = Instant::now();
            self.model.step()?;
            self.solve_time += start.elapsed();
            self.step = Some(self.current_step() + 1);
            debug!(step = self.current_step(), time = self.model.time(), "step complete");

            self.simulate_step()?;
        }
        self.simulate_end()?;
        info!("{}", self.timing_report());
        Ok(())
    }

    fn simulate_init(&mut self) -> Result<()> {
        let mut ops = std::mem::take(&mut self.ops);
        let mut outcome = Ok(());
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            outcome = op.init_sim(self);
            self.op_timings[i].init_time = start.elapsed();
            if outcome.is_err() {
                break;
            }
        }
        self.ops = ops;
        outcome
    }

    fn simulate_end(&mut self) -> Result<()> {
        let mut ops = std::mem::take(&mut self.ops);
        let mut outcome = Ok(());
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            outcome = op.after_sim(self);
            self.op_timings[i].after_time = start.elapsed();
            if outcome.is_err() {
                break;
            }
        }
        self.ops = ops;
        outcome
    }

    fn simulate_step(&mut self) -> Result<()> {
        let mut ops = std::mem::take(&mut self.ops);
        let mut outcome = Ok(());
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            outcome = op.update_sim(self);
            self.op_timings[i].total_update_time += start.elapsed();
            self.op_timings[i].update_call_count += 1;
            if outcome.is_err() {
                break;
            }
        }
        self.ops = ops;
        outcome
    }

    pub fn timing_report(&self) -> String {
        let ops_time: Duration = self.op_timings.iter().map(OpTiming::total_time).sum();
        let total_time = ops_time + self.solve_time;

        let mut lines = vec![
            format!("=== {} timing report ===", self.name),
            format!("steps: {}  dt: {:.3e}s", self.sim_steps, self.model.config().time.dt),
            format!("energy solve: {:>8.2}ms", self.solve_time.as_secs_f64() * 1e3),
        ];
        for timing in &self.op_timings {
            let share = if total_time.is_zero() {
                0.0
            } else {
                timing.total_time().as_secs_f64() / total_time.as_secs_f64() * 100.0
            };
            lines.push(format!(
                "  {:<25} | total: {:>8.2}ms | avg/step: {:>8.3}ms | init: {:>6.2}ms | after: {:>6.2}ms | share: {:>5.1}%",
                timing.op_name,
                timing.total_time().as_secs_f64() * 1e3,
                timing.avg_update_time().as_secs_f64() * 1e3,
                timing.init_time.as_secs_f64() * 1e3,
                timing.after_time.as_secs_f64() * 1e3,
                share
            ));
        }
        if self.sim_steps > 0 {
            lines.push(format!(
                "total: {:.2}ms, {:.3}ms per step",
                total_time.as_secs_f64() * 1e3,
                total_time.as_secs_f64() * 1e3 / self.sim_steps as f64
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinearSolverKind, SimulationConfig};
    use crate::energy::EnergyInitializer;
    use crate::fem::QuadMesh;
    use crate::fields::{FieldKind, NodalScalarField, NodalVectorField};
    use glam::DVec2;
    use std::any::Any;

    fn small_model(steps: usize) -> SolidificationModel {
        let mut config = SimulationConfig::default();
        config.time.dt = 1.0;
        config.time.steps = steps;
        config.linear_solver.kind = LinearSolverKind::DenseLu;
        SolidificationModel::new(
            config,
            QuadMesh::build_square(3, 2, 0.0, 0.03, 0.0, 0.02),
            NodalScalarField::uniform(FieldKind::Concentration, 0.192),
            NodalVectorField::uniform(FieldKind::Momentum, DVec2::ZERO),
            EnergyInitializer::temperature(|p| if p.x < 0.01 { 160.0 } else { 280.0 }),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct CountingOp {
        inits: usize,
        updates: Vec<usize>,
        afters: usize,
    }

    impl SimOp for CountingOp {
        fn name(&self) -> &str {
            "Counting"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn init_sim(&mut self, _sim: &mut Simulation) -> Result<()> {
            self.inits += 1;
            Ok(())
        }

        fn update_sim(&mut self, sim: &mut Simulation) -> Result<()> {
            self.updates.push(sim.model.step_count());
            Ok(())
        }

        fn after_sim(&mut self, _sim: &mut Simulation) -> Result<()> {
            self.afters += 1;
            Ok(())
        }
    }

    #[test]
    fn creation() {
        let sim = Simulation::new(SimProps {
            model: small_model(7),
            name: "creation",
            ops: vec![SimOpHandle::new(Box::new(CountingOp::default()))],
            sim_steps: None,
        });
        assert_eq!(sim.sim_steps, 7);
        assert_eq!(sim.op_timings.len(), 1);
        assert_eq!(sim.op_timings[0].op_name, "Counting");
        assert_eq!(sim.current_step(), 0);
    }

    #[test]
    fn run_calls_every_hook() {
        let mut sim = Simulation::new(SimProps {
            model: small_model(10),
            name: "hooks",
            ops: vec![SimOpHandle::new(Box::new(CountingOp::default()))],
            sim_steps: Some(3),
        });
        sim.run().unwrap();

        let op = sim.find_op::<CountingOp>().unwrap();
        assert_eq!(op.inits, 1);
        assert_eq!(op.updates, vec![1, 2, 3]);
        assert_eq!(op.afters, 1);
        assert_eq!(sim.op_timings[0].update_call_count, 3);
        assert_eq!(sim.model.step_count(), 3);
        assert_eq!(sim.progress(), 1.0);
        assert!(sim.timing_report().contains("Counting"));
    }

    #[test]
    fn run_only_once() {
        let mut sim = Simulation::new(SimProps {
            model: small_model(1),
            name: "once",
            ops: vec![],
            sim_steps: None,
        });
        sim.run().unwrap();
        assert!(matches!(sim.run(), Err(SolidifyError::AlreadyRan(_))));
    }

    #[test]
    fn step_with_ops_advances_one_step() {
        let mut sim = Simulation::new(SimProps {
            model: small_model(5),
            name: "manual",
            ops: vec![],
            sim_steps: None,
        });
        let mut op = CountingOp::default();
        sim.step_with_ops(&mut [&mut op]).unwrap();
        sim.step_with_ops(&mut [&mut op]).unwrap();
        assert_eq!(op.updates, vec![1, 2]);
        assert_eq!(sim.current_step(), 2);
    }
}
