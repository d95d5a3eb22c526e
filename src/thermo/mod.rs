//! Phase-change thermodynamics of a binary alloy with a linear liquidus.
//!
//! Maps mixture enthalpy `h` and mixture concentration `C` to temperature,
//! density, liquid volume fraction, liquid concentration and liquid mass
//! fraction through four enthalpy regimes. States are derived on demand and
//! never cached.

pub mod stabilization;
pub mod temperature_solver;

pub use stabilization::{StabilizationCalculator, StabilizationState};
pub use temperature_solver::{NonlinearTemperatureSolver, TemperatureSolution};

use crate::error::{Result, SolidifyError};
use crate::material::MaterialConstants;
use crate::math_utils::{inverse_lerp, lerp, unit_fraction};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw lever rule `f = 1 - (T - T_liq) / ((1 - kp)(T - T_m))`.
///
/// Not clamped; the fixed-point iteration relies on the raw value. Exactly at
/// the melting temperature the rule is singular and 0 is returned.
pub fn lever_rule(material: &MaterialConstants, temperature: f64, concentration: f64) -> f64 {
    let t_liq = material.melting_temperature + material.liquidus_slope * concentration;
    let denominator = temperature - material.melting_temperature;
    if denominator == 0.0 {
        return 0.0;
    }
    1.0 - 1.0 / (1.0 - material.partition_coefficient) * (temperature - t_liq) / denominator
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseRegime {
    Liquid,
    /// Primary solidification along the liquidus
    Mushy,
    /// Isothermal eutectic plateau
    Eutectic,
    Solid,
}

impl PhaseRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseRegime::Liquid => "liquid",
            PhaseRegime::Mushy => "mushy",
            PhaseRegime::Eutectic => "eutectic",
            PhaseRegime::Solid => "solid",
        }
    }
}

impl fmt::Display for PhaseRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regime boundaries at one concentration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseThresholds {
    pub concentration: f64,
    pub liquidus_temperature: f64,
    pub solidus_temperature: f64,
    /// `h0 = (c_s - c_f) T_e + h_f`
    pub fluid_enthalpy_offset: f64,
    pub liquidus_enthalpy: f64,
    pub solidus_enthalpy: f64,
    /// Liquid mass fraction left when the mush reaches the eutectic temperature
    pub eutectic_fraction: f64,
    pub eutectic_enthalpy: f64,
}

impl PhaseThresholds {
    /// Lower enthalpy bound of the mushy regime.
    ///
    /// When the solidus lies above the eutectic temperature the plateau is
    /// empty and the mush ends at the solidus.
    pub fn mushy_lower_enthalpy(&self) -> f64 {
        self.eutectic_enthalpy.max(self.solidus_enthalpy)
    }

    pub fn regime(&self, enthalpy: f64) -> PhaseRegime {
        if enthalpy > self.liquidus_enthalpy {
            PhaseRegime::Liquid
        } else if enthalpy > self.mushy_lower_enthalpy() {
            PhaseRegime::Mushy
        } else if enthalpy > self.solidus_enthalpy {
            PhaseRegime::Eutectic
        } else {
            PhaseRegime::Solid
        }
    }

    /// True when liquidus and solidus coincide, so the mush is isothermal
    pub fn is_degenerate(&self) -> bool {
        self.liquidus_temperature - self.solidus_temperature <= f64::EPSILON * self.liquidus_temperature.abs()
    }
}

impl fmt::Display for PhaseThresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "C     = {:.6}", self.concentration)?;
        writeln!(f, "T_liq = {:.4}", self.liquidus_temperature)?;
        writeln!(f, "T_sol = {:.4}", self.solidus_temperature)?;
        writeln!(f, "h0    = {:.4}", self.fluid_enthalpy_offset)?;
        writeln!(f, "h_liq = {:.4}", self.liquidus_enthalpy)?;
        writeln!(f, "h_sol = {:.4}", self.solidus_enthalpy)?;
        writeln!(f, "f_e   = {:.6}", self.eutectic_fraction)?;
        write!(f, "h_e   = {:.4}", self.eutectic_enthalpy)
    }
}

/// Derived state at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermodynamicState {
    pub regime: PhaseRegime,
    pub enthalpy: f64,
    pub concentration: f64,
    pub temperature: f64,
    pub density: f64,
    /// Liquid volume fraction
    pub epsilon: f64,
    pub fluid_concentration: f64,
    pub liquid_mass_fraction: f64,
}

/// Pure map `(h, C) -> ThermodynamicState`.
///
/// Holds only the shared material table and the mushy-zone solver, so it is
/// cheap to clone and safe to share between threads.
#[derive(Debug, Clone)]
pub struct PhaseStateEvaluator {
    material: Arc<MaterialConstants>,
    temperature_solver: NonlinearTemperatureSolver,
}

impl PhaseStateEvaluator {
    pub fn new(material: Arc<MaterialConstants>) -> Self {
        let temperature_solver = NonlinearTemperatureSolver::from_material(&material);
        Self {
            material,
            temperature_solver,
        }
    }

    pub fn material(&self) -> &MaterialConstants {
        &self.material
    }

    pub fn shared_material(&self) -> Arc<MaterialConstants> {
        Arc::clone(&self.material)
    }

    pub fn temperature_solver(&self) -> &NonlinearTemperatureSolver {
        &self.temperature_solver
    }

    /// Concentration at which the liquidus meets the eutectic temperature
    pub fn eutectic_concentration(&self) -> f64 {
        let m = &self.material;
        (m.eutectic_temperature - m.melting_temperature) / m.liquidus_slope
    }

    fn check_concentration(&self, value: f64, concentration: f64, from_temperature: bool) -> Result<()> {
        let valid = value.is_finite()
            && concentration.is_finite()
            && (0.0..=self.eutectic_concentration()).contains(&concentration);
        if valid {
            Ok(())
        } else if from_temperature {
            Err(SolidifyError::TemperatureDomain {
                temperature: value,
                concentration,
            })
        } else {
            Err(SolidifyError::Domain {
                enthalpy: value,
                concentration,
            })
        }
    }

    pub fn liquidus_temperature(&self, concentration: f64) -> f64 {
        self.material.melting_temperature + self.material.liquidus_slope * concentration
    }

    pub fn solidus_temperature(&self, concentration: f64) -> f64 {
        let m = &self.material;
        (m.melting_temperature + m.liquidus_slope / m.partition_coefficient * concentration)
            .max(m.eutectic_temperature)
    }

    /// Lever rule clamped into `[0, 1]`
    pub fn liquid_fraction_at(&self, temperature: f64, concentration: f64) -> f64 {
        unit_fraction(lever_rule(&self.material, temperature, concentration))
    }

    pub fn thresholds(&self, concentration: f64) -> PhaseThresholds {
        let m = &self.material;
        let liquidus_temperature = self.liquidus_temperature(concentration);
        let solidus_temperature = self.solidus_temperature(concentration);
        let fluid_enthalpy_offset = m.fluid_enthalpy_offset();
        let eutectic_fraction = self.liquid_fraction_at(m.eutectic_temperature, concentration);
        PhaseThresholds {
            concentration,
            liquidus_temperature,
            solidus_temperature,
            fluid_enthalpy_offset,
            liquidus_enthalpy: m.specific_heat_fluid * liquidus_temperature + fluid_enthalpy_offset,
            solidus_enthalpy: m.specific_heat_solid * solidus_temperature,
            eutectic_fraction,
            eutectic_enthalpy: eutectic_fraction * m.latent_heat
                + m.specific_heat_solid * m.eutectic_temperature,
        }
    }

    pub fn regime(&self, enthalpy: f64, concentration: f64) -> Result<PhaseRegime> {
        self.check_concentration(enthalpy, concentration, false)?;
        Ok(self.thresholds(concentration).regime(enthalpy))
    }

    /// Full state, starting any mushy-zone iteration from an enthalpy-weighted guess.
    pub fn state(&self, enthalpy: f64, concentration: f64) -> Result<ThermodynamicState> {
        self.check_concentration(enthalpy, concentration, false)?;
        let thresholds = self.thresholds(concentration);
        let guess = lerp(
            thresholds.solidus_temperature,
            thresholds.liquidus_temperature,
            unit_fraction(inverse_lerp(
                thresholds.mushy_lower_enthalpy(),
                thresholds.liquidus_enthalpy,
                enthalpy,
            )),
        );
        Ok(self.evaluate(&thresholds, enthalpy, guess))
    }

    /// Full state with a caller supplied starting temperature for the mushy iteration
    pub fn state_with_guess(
        &self,
        enthalpy: f64,
        concentration: f64,
        temperature_guess: f64,
    ) -> Result<ThermodynamicState> {
        self.check_concentration(enthalpy, concentration, false)?;
        let thresholds = self.thresholds(concentration);
        Ok(self.evaluate(&thresholds, enthalpy, temperature_guess))
    }

    fn evaluate(&self, th: &PhaseThresholds, h: f64, guess: f64) -> ThermodynamicState {
        let m = &self.material;
        let c = th.concentration;
        let regime = th.regime(h);

        let (temperature, liquid_mass_fraction) = match regime {
            PhaseRegime::Liquid => ((h - th.fluid_enthalpy_offset) / m.specific_heat_fluid, 1.0),
            PhaseRegime::Mushy if th.is_degenerate() => (
                th.liquidus_temperature,
                unit_fraction(inverse_lerp(th.mushy_lower_enthalpy(), th.liquidus_enthalpy, h)),
            ),
            PhaseRegime::Mushy => {
                let t = self.mushy_temperature(th, h, guess);
                (t, self.liquid_fraction_at(t, c))
            }
            PhaseRegime::Eutectic => (
                m.eutectic_temperature,
                unit_fraction((h - th.solidus_enthalpy) / m.latent_heat),
            ),
            PhaseRegime::Solid => (h / m.specific_heat_solid, 0.0),
        };

        let (density, epsilon, fluid_concentration) = match regime {
            PhaseRegime::Liquid => (m.density_fluid, 1.0, c),
            PhaseRegime::Mushy => {
                let rho = m.mixture_density(liquid_mass_fraction);
                let fluid_concentration = if th.is_degenerate() {
                    c
                } else {
                    (temperature - m.melting_temperature) / m.liquidus_slope
                };
                (
                    rho,
                    unit_fraction(rho * liquid_mass_fraction / m.density_fluid),
                    fluid_concentration,
                )
            }
            PhaseRegime::Eutectic => {
                let rho = m.mixture_density(liquid_mass_fraction);
                (
                    rho,
                    unit_fraction((rho - m.density_solid) / (m.density_fluid - m.density_solid)),
                    (m.eutectic_temperature - m.melting_temperature) / m.liquidus_slope,
                )
            }
            PhaseRegime::Solid => (m.density_solid, 0.0, 0.0),
        };

        ThermodynamicState {
            regime,
            enthalpy: h,
            concentration: c,
            temperature,
            density,
            epsilon,
            fluid_concentration,
            liquid_mass_fraction,
        }
    }

    /// Fixed point first, bisection over `[T_sol, T_liq]` when it fails or
    /// settles on the root beyond the melting temperature.
    fn mushy_temperature(&self, th: &PhaseThresholds, h: f64, guess: f64) -> f64 {
        let c = th.concentration;
        let solution = self.temperature_solver.solve(&self.material, h, c, guess);
        let (lo, hi) = (th.solidus_temperature, th.liquidus_temperature);
        if solution.converged && solution.temperature >= lo && solution.temperature <= hi {
            return solution.temperature;
        }

        debug!(
            enthalpy = h,
            concentration = c,
            fixed_point = solution.temperature,
            "mushy fixed point left the liquidus bracket, bisecting"
        );
        let bisection = self
            .temperature_solver
            .bisect(lo, hi, |t| self.mushy_enthalpy(t, c) - h);
        if !bisection.converged {
            warn!(
                enthalpy = h,
                concentration = c,
                temperature = bisection.temperature,
                max_iterations = self.temperature_solver.max_iterations,
                "mushy temperature did not converge, keeping last estimate"
            );
        }
        bisection.temperature
    }

    /// `h(T) = f(T) ((c_f - c_s)(T - T_e) + h_f) + c_s T` along the liquidus
    fn mushy_enthalpy(&self, temperature: f64, concentration: f64) -> f64 {
        let m = &self.material;
        let f = self.liquid_fraction_at(temperature, concentration);
        f * ((m.specific_heat_fluid - m.specific_heat_solid)
            * (temperature - m.eutectic_temperature)
            + m.latent_heat)
            + m.specific_heat_solid * temperature
    }

    /// Inverse relation used to initialize enthalpy from temperature.
    ///
    /// Temperatures on the eutectic plateau map to its lower end `h_sol`.
    pub fn enthalpy_from_temperature(&self, temperature: f64, concentration: f64) -> Result<f64> {
        self.check_concentration(temperature, concentration, true)?;
        let m = &self.material;
        let t_liq = self.liquidus_temperature(concentration);
        let t_sol = self.solidus_temperature(concentration);

        let h = if temperature > t_liq {
            m.specific_heat_fluid * temperature + m.fluid_enthalpy_offset()
        } else if temperature > t_sol {
            self.mushy_enthalpy(temperature, concentration)
        } else {
            m.specific_heat_solid * temperature
        };
        Ok(h)
    }

    pub fn temperature(&self, enthalpy: f64, concentration: f64) -> Result<f64> {
        Ok(self.state(enthalpy, concentration)?.temperature)
    }

    pub fn density(&self, enthalpy: f64, concentration: f64) -> Result<f64> {
        Ok(self.state(enthalpy, concentration)?.density)
    }

    pub fn epsilon(&self, enthalpy: f64, concentration: f64) -> Result<f64> {
        Ok(self.state(enthalpy, concentration)?.epsilon)
    }

    pub fn fluid_concentration(&self, enthalpy: f64, concentration: f64) -> Result<f64> {
        Ok(self.state(enthalpy, concentration)?.fluid_concentration)
    }

    pub fn liquid_mass_fraction(&self, enthalpy: f64, concentration: f64) -> Result<f64> {
        Ok(self.state(enthalpy, concentration)?.liquid_mass_fraction)
    }

    /// Volume-averaged specific heat `eps c_f + (1 - eps) c_s`
    pub fn specific_heat(&self, epsilon: f64) -> f64 {
        epsilon * self.material.specific_heat_fluid + (1.0 - epsilon) * self.material.specific_heat_solid
    }

    /// Volume-averaged conductivity `eps k_f + (1 - eps) k_s`
    pub fn conductivity(&self, epsilon: f64) -> f64 {
        epsilon * self.material.conductivity_fluid + (1.0 - epsilon) * self.material.conductivity_solid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const C0: f64 = 0.192;

    fn evaluator() -> PhaseStateEvaluator {
        PhaseStateEvaluator::new(Arc::new(MaterialConstants::lead_tin()))
    }

    #[test]
    fn test_lead_tin_thresholds() {
        let th = evaluator().thresholds(C0);
        println!("{th}");
        assert_abs_diff_eq!(th.liquidus_temperature, 282.335, epsilon = 1e-3);
        assert_abs_diff_eq!(th.solidus_temperature, 183.0, epsilon = 1e-12);
        assert_abs_diff_eq!(th.fluid_enthalpy_offset, 34.4076, epsilon = 1e-9);
        assert_abs_diff_eq!(th.liquidus_enthalpy, 78.0848, epsilon = 1e-3);
        assert_abs_diff_eq!(th.solidus_enthalpy, 32.5557, epsilon = 1e-9);
        assert_abs_diff_eq!(th.eutectic_enthalpy, 32.5633, epsilon = 1e-3);
        assert!(th.solidus_enthalpy < th.eutectic_enthalpy);
        assert!(th.eutectic_enthalpy < th.liquidus_enthalpy);
    }

    #[test]
    fn test_regimes() {
        let ev = evaluator();
        assert_eq!(ev.regime(100.0, C0).unwrap(), PhaseRegime::Liquid);
        assert_eq!(ev.regime(50.0, C0).unwrap(), PhaseRegime::Mushy);
        assert_eq!(ev.regime(32.56, C0).unwrap(), PhaseRegime::Eutectic);
        assert_eq!(ev.regime(20.0, C0).unwrap(), PhaseRegime::Solid);
        // boundaries belong to the lower regime
        let th = ev.thresholds(C0);
        assert_eq!(th.regime(th.liquidus_enthalpy), PhaseRegime::Mushy);
        assert_eq!(th.regime(th.eutectic_enthalpy), PhaseRegime::Eutectic);
        assert_eq!(th.regime(th.solidus_enthalpy), PhaseRegime::Solid);
    }

    #[test]
    fn test_liquid_and_solid_states() {
        let ev = evaluator();
        let liquid = ev.state(100.0, C0).unwrap();
        assert_abs_diff_eq!(liquid.temperature, (100.0 - 34.4076) / 0.1547, epsilon = 1e-9);
        assert_eq!(liquid.epsilon, 1.0);
        assert_eq!(liquid.density, 10000.0);
        assert_eq!(liquid.fluid_concentration, C0);
        assert_eq!(liquid.liquid_mass_fraction, 1.0);

        let solid = ev.state(10.0, C0).unwrap();
        assert_abs_diff_eq!(solid.temperature, 10.0 / 0.1779, epsilon = 1e-12);
        assert_eq!(solid.epsilon, 0.0);
        assert_eq!(solid.density, 10800.0);
        assert_eq!(solid.fluid_concentration, 0.0);
        assert_eq!(solid.liquid_mass_fraction, 0.0);
    }

    #[test]
    fn test_eutectic_plateau() {
        let ev = evaluator();
        let th = ev.thresholds(C0);
        let h = 0.5 * (th.solidus_enthalpy + th.eutectic_enthalpy);
        let s = ev.state(h, C0).unwrap();
        assert_eq!(s.regime, PhaseRegime::Eutectic);
        assert_eq!(s.temperature, 183.0);
        assert_abs_diff_eq!(s.liquid_mass_fraction, (h - th.solidus_enthalpy) / 30.162, epsilon = 1e-15);
        assert_abs_diff_eq!(s.fluid_concentration, (183.0 - 327.0) / -232.63, epsilon = 1e-12);
        assert!(s.epsilon >= 0.0 && s.epsilon <= 1.0);
    }

    #[test]
    fn test_mushy_upper_range_uses_bracketed_root() {
        let ev = evaluator();
        for h in [45.0, 55.0, 60.0, 70.0, 78.0] {
            let s = ev.state(h, C0).unwrap();
            println!("h = {h}: T = {:.3}, f = {:.4}", s.temperature, s.liquid_mass_fraction);
            assert_eq!(s.regime, PhaseRegime::Mushy);
            assert!(s.temperature >= 183.0 && s.temperature <= 282.34);
            let back = ev.enthalpy_from_temperature(s.temperature, C0).unwrap();
            assert_abs_diff_eq!(back, h, epsilon = 0.05);
        }
    }

    #[test]
    fn test_domain_errors() {
        let ev = evaluator();
        assert!(matches!(ev.state(f64::NAN, C0), Err(SolidifyError::Domain { .. })));
        assert!(matches!(ev.state(f64::INFINITY, C0), Err(SolidifyError::Domain { .. })));
        assert!(matches!(ev.state(40.0, f64::NAN), Err(SolidifyError::Domain { .. })));
        assert!(matches!(ev.state(40.0, -0.1), Err(SolidifyError::Domain { .. })));
        assert!(matches!(ev.state(40.0, 0.9), Err(SolidifyError::Domain { .. })));
        assert!(matches!(
            ev.enthalpy_from_temperature(f64::NEG_INFINITY, C0),
            Err(SolidifyError::TemperatureDomain { .. })
        ));
    }

    #[test]
    fn test_pure_metal_melts_isothermally() {
        let ev = evaluator();
        let th = ev.thresholds(0.0);
        assert!(th.is_degenerate());
        let h = 0.5 * (th.solidus_enthalpy + th.liquidus_enthalpy);
        let s = ev.state(h, 0.0).unwrap();
        assert_eq!(s.regime, PhaseRegime::Mushy);
        assert_eq!(s.temperature, 327.0);
        assert_abs_diff_eq!(s.liquid_mass_fraction, 0.5, epsilon = 1e-12);
        assert_eq!(s.fluid_concentration, 0.0);
    }

    #[test]
    fn test_empty_eutectic_plateau() {
        // low tin content: the solidus lies above the eutectic temperature
        let ev = evaluator();
        let c = 0.05;
        let th = ev.thresholds(c);
        assert!(th.solidus_temperature > 183.0);
        assert!(th.eutectic_enthalpy < th.solidus_enthalpy);

        let just_above = ev.state(th.solidus_enthalpy + 1e-6, c).unwrap();
        assert_eq!(just_above.regime, PhaseRegime::Mushy);
        assert_abs_diff_eq!(just_above.temperature, th.solidus_temperature, epsilon = 1e-2);
        assert_abs_diff_eq!(just_above.liquid_mass_fraction, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_mixture_properties() {
        let ev = evaluator();
        assert_abs_diff_eq!(ev.specific_heat(0.0), 0.1779, epsilon = 1e-15);
        assert_abs_diff_eq!(ev.specific_heat(1.0), 0.1547, epsilon = 1e-15);
        assert_abs_diff_eq!(ev.conductivity(0.5), 0.5 * (3.97e-2 + 2.29e-2), epsilon = 1e-15);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn state_with_logs(ev: &PhaseStateEvaluator, h: f64) -> (ThermodynamicState, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let state = tracing::subscriber::with_default(subscriber, || ev.state(h, C0).unwrap());
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        (state, text)
    }

    #[test]
    fn test_recovered_mushy_solve_does_not_warn() {
        let ev = evaluator();
        let th = ev.thresholds(C0);

        // the fixed point wanders off from the default guess at this enthalpy
        let guess = lerp(
            th.solidus_temperature,
            th.liquidus_temperature,
            inverse_lerp(th.mushy_lower_enthalpy(), th.liquidus_enthalpy, 45.0),
        );
        let fixed_point = ev.temperature_solver().solve(ev.material(), 45.0, C0, guess);
        assert!(!fixed_point.converged);

        let (state, logs) = state_with_logs(&ev, 45.0);
        assert_eq!(state.regime, PhaseRegime::Mushy);
        assert_abs_diff_eq!(state.temperature, 223.76, epsilon = 0.05);
        assert!(logs.contains("bisecting"), "logs: {logs}");
        assert!(!logs.contains("WARN"), "logs: {logs}");
    }

    #[test]
    fn test_unresolved_mushy_solve_warns() {
        let mut material = MaterialConstants::lead_tin();
        material.temp_max_iter = 2;
        let ev = PhaseStateEvaluator::new(Arc::new(material));

        let (state, logs) = state_with_logs(&ev, 45.0);
        assert_eq!(state.regime, PhaseRegime::Mushy);
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("did not converge"), "logs: {logs}");
    }
}
