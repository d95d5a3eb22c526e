use colored::Colorize;
use glam::DVec2;
use solidify_fem::config::{LinearSolverKind, SimulationConfig};
use solidify_fem::energy::EnergyInitializer;
use solidify_fem::fem::QuadMesh;
use solidify_fem::fields::{FieldKind, NodalScalarField, NodalVectorField};
use solidify_fem::sim::{ProgressReporterOp, SimOpHandle, SimProps, Simulation, TemperatureReportingOp};
use solidify_fem::thermo::PhaseRegime;
use solidify_fem::{logging, Result, SolidificationModel};

const DOMAIN_SIZE: f64 = 0.1;
const CHILL_WIDTH: f64 = 0.02;
const CHILL_TEMPERATURE: f64 = 150.0;
const POUR_TEMPERATURE: f64 = 287.0;
const ALLOY_CONCENTRATION: f64 = 0.192;
/// Peak speed of the stirring vortex, m/s
const STIR_SPEED: f64 = 1e-4;

fn demo_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.time.dt = 1.0;
    config.time.steps = 50;
    config.linear_solver.kind = LinearSolverKind::BiCgStab;
    config
}

fn main() -> Result<()> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => demo_config(),
    };

    let center = DVec2::splat(DOMAIN_SIZE / 2.0);
    let model = SolidificationModel::new(
        config,
        QuadMesh::build_square(10, 10, 0.0, DOMAIN_SIZE, 0.0, DOMAIN_SIZE),
        NodalScalarField::uniform(FieldKind::Concentration, ALLOY_CONCENTRATION),
        NodalVectorField::new(FieldKind::Momentum, move |p, _t| {
            let r = p - center;
            r.perp() * (STIR_SPEED / (DOMAIN_SIZE / 2.0))
        }),
        EnergyInitializer::temperature(|p| {
            if p.x < CHILL_WIDTH {
                CHILL_TEMPERATURE
            } else {
                POUR_TEMPERATURE
            }
        }),
    )?;

    let mut sim = Simulation::new(SimProps {
        model,
        name: "chilled_mould",
        ops: vec![
            SimOpHandle::new(Box::new(ProgressReporterOp::new(10))),
            SimOpHandle::new(Box::new(TemperatureReportingOp::with_frequency(20.0))),
        ],
        sim_steps: None,
    });
    sim.run()?;

    let states = sim.model.nodal_states()?;
    let count = |regime: PhaseRegime| states.iter().filter(|s| s.regime == regime).count();
    let thresholds = sim.model.thresholds(ALLOY_CONCENTRATION);

    println!();
    println!("{}", "Solidification summary".bold());
    println!(
        "  liquidus {:.2}  solidus {:.2}  eutectic {:.2}",
        thresholds.liquidus_temperature,
        thresholds.solidus_temperature,
        sim.model.material().eutectic_temperature
    );
    println!("  time simulated: {:.1}s over {} steps", sim.model.time(), sim.model.step_count());
    println!("  {} {}", "liquid  ".red(), count(PhaseRegime::Liquid));
    println!("  {} {}", "mushy   ".yellow(), count(PhaseRegime::Mushy));
    println!("  {} {}", "eutectic".cyan(), count(PhaseRegime::Eutectic));
    println!("  {} {}", "solid   ".blue(), count(PhaseRegime::Solid));

    if let Some(op) = sim.find_op::<TemperatureReportingOp>() {
        for snapshot in op.history() {
            println!(
                "  step {:>3}  T mean {:>7.2}  min {:>7.2}  max {:>7.2}  f {:.3}",
                snapshot.step,
                snapshot.mean_temperature,
                snapshot.min_temperature,
                snapshot.max_temperature,
                snapshot.mean_liquid_fraction
            );
        }
    }
    Ok(())
}
