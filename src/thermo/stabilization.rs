use crate::constants::{KOZENY_CARMAN_FACTOR, SUPG_REYNOLDS_LIMIT};
use crate::fem::quad4::{self, NODES_PER_ELEMENT};
use crate::material::MaterialConstants;
use glam::DVec2;
use std::sync::Arc;

/// Stabilization data at one quadrature point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationState {
    pub element_length: f64,
    pub tau_supg: f64,
    pub tau_permeability: f64,
    /// `min(tau_supg, tau_permeability)`
    pub tau1: f64,
    pub alpha: f64,
}

/// SUPG and Kozeny-Carman stabilization terms for the energy equation.
#[derive(Debug, Clone)]
pub struct StabilizationCalculator {
    material: Arc<MaterialConstants>,
}

impl StabilizationCalculator {
    pub fn new(material: Arc<MaterialConstants>) -> Self {
        Self { material }
    }

    /// Streamline element length `2 / sum_a |v_a / |v_a| . grad N_a(x_a)|`.
    ///
    /// Nodes at rest are skipped. An element with no moving node, or a
    /// degenerate element, has length 0.
    pub fn element_length(
        &self,
        coords: &[DVec2; NODES_PER_ELEMENT],
        nodal_velocity: &[DVec2; NODES_PER_ELEMENT],
    ) -> f64 {
        let Some(gradients) = quad4::nodal_self_gradients(coords) else {
            return 0.0;
        };
        let sum: f64 = nodal_velocity
            .iter()
            .zip(gradients.iter())
            .filter(|(v, _)| v.length() != 0.0)
            .map(|(v, g)| v.normalize().dot(*g).abs())
            .sum();
        if sum == 0.0 { 0.0 } else { 2.0 / sum }
    }

    /// `tau_SUPG = f h / (2 |v|) z(Re)` with `Re = |v| h / (2 mu / rho)`.
    ///
    /// At rest, or on a zero-length element, the limit 0 is returned.
    pub fn tau_supg(&self, liquid_mass_fraction: f64, element_length: f64, speed: f64, density: f64) -> f64 {
        if speed == 0.0 || element_length == 0.0 {
            return 0.0;
        }
        let reynolds = speed * element_length / self.material.diffusive_viscosity(density);
        let z = if (0.0..=SUPG_REYNOLDS_LIMIT).contains(&reynolds) {
            reynolds / SUPG_REYNOLDS_LIMIT
        } else {
            1.0
        };
        liquid_mass_fraction * element_length / (2.0 * speed) * z
    }

    /// Kozeny-Carman permeability `K = d^2 / 180 eps^3 / (1 - eps)^2`
    pub fn permeability(&self, epsilon: f64) -> f64 {
        let d = self.material.dendrite_arm_spacing;
        if epsilon >= 1.0 {
            return f64::INFINITY;
        }
        d * d / KOZENY_CARMAN_FACTOR * epsilon.powi(3) / (1.0 - epsilon).powi(2)
    }

    /// `tau_K = K rho_f / (eps mu)`; 0 for fully solid, infinite for fully liquid
    pub fn tau_permeability(&self, epsilon: f64) -> f64 {
        if epsilon <= 0.0 {
            return 0.0;
        }
        if epsilon >= 1.0 {
            return f64::INFINITY;
        }
        self.permeability(epsilon) * self.material.density_fluid / (epsilon * self.material.viscosity)
    }

    pub fn tau1(&self, tau_supg: f64, tau_permeability: f64) -> f64 {
        tau_supg.min(tau_permeability)
    }

    /// Blend `dT/dh` along the enthalpy gradient, or the mixture inverse heat
    /// capacity where the enthalpy is flat.
    ///
    /// The directional slope is clamped to `[0, max_alpha]`.
    pub fn alpha(&self, grad_temperature: DVec2, grad_enthalpy: DVec2, liquid_mass_fraction: f64) -> f64 {
        let mag2 = grad_enthalpy.length_squared();
        if mag2 > 0.0 {
            (grad_temperature.dot(grad_enthalpy) / mag2).clamp(0.0, self.max_alpha())
        } else {
            let cf = self.material.specific_heat_fluid;
            let cs = self.material.specific_heat_solid;
            let f = liquid_mass_fraction;
            1.0 / (cs + cf * f - cs * f)
        }
    }

    /// Steepest `dT/dh` of any single phase, `1 / min(c_s, c_f)`
    pub fn max_alpha(&self) -> f64 {
        1.0 / self.material.specific_heat_solid.min(self.material.specific_heat_fluid)
    }

    /// All terms at one quadrature point
    #[allow(clippy::too_many_arguments)]
    pub fn state(
        &self,
        element_length: f64,
        velocity: DVec2,
        density: f64,
        epsilon: f64,
        liquid_mass_fraction: f64,
        grad_temperature: DVec2,
        grad_enthalpy: DVec2,
    ) -> StabilizationState {
        let tau_supg = self.tau_supg(liquid_mass_fraction, element_length, velocity.length(), density);
        let tau_permeability = self.tau_permeability(epsilon);
        StabilizationState {
            element_length,
            tau_supg,
            tau_permeability,
            tau1: self.tau1(tau_supg, tau_permeability),
            alpha: self.alpha(grad_temperature, grad_enthalpy, liquid_mass_fraction),
        }
    }
}
