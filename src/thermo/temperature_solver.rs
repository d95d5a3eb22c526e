use crate::material::MaterialConstants;
use crate::math_utils::relative_change;
use crate::thermo::lever_rule;
use tracing::{debug, trace};

/// Bisection stops once the bracket is this fraction of the fixed-point tolerance
const BISECTION_REFINEMENT: f64 = 1e-3;

/// Outcome of a bounded temperature iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSolution {
    pub temperature: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Bounded iteration for the mushy-zone temperature.
///
/// The fixed point `T = (h - f(T) h0) / (f(T) c_f + (1 - f(T)) c_s)` is the
/// primary method. It never fails hard: when the cap is reached the last
/// estimate comes back with `converged == false` and the caller decides how
/// loudly to report it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonlinearTemperatureSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl NonlinearTemperatureSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    pub fn from_material(material: &MaterialConstants) -> Self {
        Self::new(material.temp_tolerance, material.temp_max_iter)
    }

    /// Fixed-point iteration from `guess`.
    pub fn solve(
        &self,
        material: &MaterialConstants,
        enthalpy: f64,
        concentration: f64,
        guess: f64,
    ) -> TemperatureSolution {
        let cf = material.specific_heat_fluid;
        let cs = material.specific_heat_solid;
        let h0 = material.fluid_enthalpy_offset();

        let mut temperature = guess;
        for iteration in 1..=self.max_iterations {
            let f = lever_rule(material, temperature, concentration);
            let next = (enthalpy - f * h0) / (f * cf + (1.0 - f) * cs);
            if !next.is_finite() {
                break;
            }
            let error = relative_change(next, temperature);
            trace!(iteration, temperature = next, error, "mushy temperature iteration");
            temperature = next;
            if error < self.tolerance {
                return TemperatureSolution {
                    temperature,
                    iterations: iteration,
                    converged: true,
                };
            }
        }

        debug!(
            enthalpy,
            concentration,
            temperature,
            max_iterations = self.max_iterations,
            "mushy temperature iteration did not converge, keeping last estimate"
        );
        TemperatureSolution {
            temperature,
            iterations: self.max_iterations,
            converged: false,
        }
    }

    /// Bisection of `residual(T) = 0` on `[lower, upper]`, where the residual
    /// is increasing in T. Bounded by the same iteration cap as [`Self::solve`].
    pub fn bisect(
        &self,
        lower: f64,
        upper: f64,
        residual: impl Fn(f64) -> f64,
    ) -> TemperatureSolution {
        let mut lo = lower;
        let mut hi = upper;
        for iteration in 1..=self.max_iterations {
            let mid = 0.5 * (lo + hi);
            if relative_change(hi, lo) < self.tolerance * BISECTION_REFINEMENT {
                return TemperatureSolution {
                    temperature: mid,
                    iterations: iteration,
                    converged: true,
                };
            }
            if residual(mid) > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        TemperatureSolution {
            temperature: 0.5 * (lo + hi),
            iterations: self.max_iterations,
            converged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermo::PhaseStateEvaluator;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    const C0: f64 = 0.192;

    #[test]
    fn test_fixed_point_lower_mush_from_far_guess() {
        let material = MaterialConstants::lead_tin();
        let solver = NonlinearTemperatureSolver::from_material(&material);

        for guess in [100.0, 183.0, 250.0, 400.0] {
            let solution = solver.solve(&material, 35.0, C0, guess);
            println!("guess {guess}: {:?}", solution);
            assert!(solution.converged);
            assert!(solution.iterations <= 100);
            assert_abs_diff_eq!(solution.temperature, 191.73, epsilon = 0.5);
        }
    }

    #[test]
    fn test_tight_tolerance_matches_inverse_relation() {
        let mut material = MaterialConstants::lead_tin();
        material.temp_tolerance = 1e-12;
        material.temp_max_iter = 500;
        let solver = NonlinearTemperatureSolver::from_material(&material);
        let evaluator = PhaseStateEvaluator::new(Arc::new(material.clone()));

        let solution = solver.solve(&material, 33.0, C0, 200.0);
        assert!(solution.converged);
        let back = evaluator
            .enthalpy_from_temperature(solution.temperature, C0)
            .unwrap();
        assert_abs_diff_eq!(back, 33.0, epsilon = 1e-8);
    }

    #[test]
    fn test_adversarial_seeds_terminate() {
        let material = MaterialConstants::lead_tin();
        let solver = NonlinearTemperatureSolver::new(1e-3, 100);

        for guess in [0.0, 1e-300, -50.0, 327.0, 1e6, 60.0] {
            let solution = solver.solve(&material, 60.0, C0, guess);
            assert!(solution.iterations <= 100);
            assert!(solution.temperature.is_finite() || !solution.converged);
        }
    }

    #[test]
    fn test_zero_guess_uses_absolute_error() {
        let material = MaterialConstants::lead_tin();
        let solver = NonlinearTemperatureSolver::new(1e-3, 1);
        // one iteration from zero: the relative error would divide by zero
        let solution = solver.solve(&material, 33.0, C0, 0.0);
        assert_eq!(solution.iterations, 1);
        assert!(!solution.converged);
        assert!(solution.temperature.is_finite());
    }

    #[test]
    fn test_bisection() {
        let solver = NonlinearTemperatureSolver::new(1e-6, 100);
        let solution = solver.bisect(0.0, 10.0, |t| t * t - 2.0);
        assert!(solution.converged);
        assert_abs_diff_eq!(solution.temperature, 2f64.sqrt(), epsilon = 1e-6);

        let capped = NonlinearTemperatureSolver::new(1e-6, 3).bisect(0.0, 10.0, |t| t - 1.0);
        assert!(!capped.converged);
        assert_eq!(capped.iterations, 3);
    }
}
