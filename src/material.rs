// src/material.rs - Binary alloy constants for the solidification model

use crate::constants::*;
use crate::error::{Result, SolidifyError};
use serde::{Deserialize, Serialize};

/// Physical and numerical constants of a binary alloy with a linear liquidus.
///
/// Units are whatever the table is expressed in; the lead-tin default uses
/// kW, kJ, kg, m, s and degrees C. Built once, then shared read-only behind an
/// `Arc` by every component that evaluates thermodynamic states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConstants {
    pub conductivity_solid: f64,
    pub conductivity_fluid: f64,
    pub specific_heat_solid: f64,
    pub specific_heat_fluid: f64,
    pub latent_heat: f64,
    pub partition_coefficient: f64,
    pub density_solid: f64,
    pub density_fluid: f64,
    pub viscosity: f64,
    pub eutectic_temperature: f64,
    pub melting_temperature: f64,
    pub liquidus_slope: f64,
    pub dendrite_arm_spacing: f64,
    /// Iteration cap of the mushy-zone temperature solve
    pub temp_max_iter: usize,
    /// Relative tolerance of the mushy-zone temperature solve
    pub temp_tolerance: f64,
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self::lead_tin()
    }
}

impl MaterialConstants {
    /// Pb-Sn reference table
    pub fn lead_tin() -> Self {
        Self {
            conductivity_solid: CONDUCTIVITY_SOLID,
            conductivity_fluid: CONDUCTIVITY_FLUID,
            specific_heat_solid: SPECIFIC_HEAT_SOLID,
            specific_heat_fluid: SPECIFIC_HEAT_FLUID,
            latent_heat: LATENT_HEAT,
            partition_coefficient: PARTITION_COEFFICIENT,
            density_solid: DENSITY_SOLID,
            density_fluid: DENSITY_FLUID,
            viscosity: VISCOSITY,
            eutectic_temperature: EUTECTIC_TEMPERATURE,
            melting_temperature: MELTING_TEMPERATURE,
            liquidus_slope: LIQUIDUS_SLOPE,
            dendrite_arm_spacing: DENDRITE_ARM_SPACING,
            temp_max_iter: TEMPERATURE_MAX_ITERATIONS,
            temp_tolerance: TEMPERATURE_TOLERANCE,
        }
    }

    /// Reject tables the phase model cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("conductivity_solid", self.conductivity_solid),
            ("conductivity_fluid", self.conductivity_fluid),
            ("specific_heat_solid", self.specific_heat_solid),
            ("specific_heat_fluid", self.specific_heat_fluid),
            ("latent_heat", self.latent_heat),
            ("density_solid", self.density_solid),
            ("density_fluid", self.density_fluid),
            ("viscosity", self.viscosity),
            ("dendrite_arm_spacing", self.dendrite_arm_spacing),
            ("temp_tolerance", self.temp_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SolidifyError::InvalidMaterial(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }

        if !(self.partition_coefficient > 0.0 && self.partition_coefficient < 1.0) {
            return Err(SolidifyError::InvalidMaterial(format!(
                "partition_coefficient must lie in (0, 1), got {}",
                self.partition_coefficient
            )));
        }
        if !(self.liquidus_slope.is_finite() && self.liquidus_slope < 0.0) {
            return Err(SolidifyError::InvalidMaterial(format!(
                "liquidus_slope must be negative, got {}",
                self.liquidus_slope
            )));
        }
        if !(self.eutectic_temperature < self.melting_temperature) {
            return Err(SolidifyError::InvalidMaterial(format!(
                "eutectic temperature {} must lie below the melting temperature {}",
                self.eutectic_temperature, self.melting_temperature
            )));
        }
        if self.temp_max_iter == 0 {
            return Err(SolidifyError::InvalidMaterial(
                "temp_max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `h0 = (c_s - c_f) T_e + h_f`, the enthalpy offset of the fluid branch
    pub fn fluid_enthalpy_offset(&self) -> f64 {
        (self.specific_heat_solid - self.specific_heat_fluid) * self.eutectic_temperature
            + self.latent_heat
    }

    /// Liquid mixture density at a mass fraction of liquid `f`
    pub fn mixture_density(&self, f: f64) -> f64 {
        1.0 / (f / self.density_fluid + (1.0 - f) / self.density_solid)
    }

    /// `2 mu / rho`, the denominator of the element Reynolds number
    pub fn diffusive_viscosity(&self, density: f64) -> f64 {
        2.0 * self.viscosity / density
    }
}
