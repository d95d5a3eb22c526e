// Reference material table for the lead-tin (Pb-19.2wt%Sn) solidification case.
// Units: kW, kJ, kg, m, s, degrees C.

// Physical constants
pub const CONDUCTIVITY_SOLID: f64 = 3.97e-2; // k_s [kW/m/C]
pub const CONDUCTIVITY_FLUID: f64 = 2.29e-2; // k_f [kW/m/C]
pub const SPECIFIC_HEAT_SOLID: f64 = 0.1779; // c_s [kJ/kg/C]
pub const SPECIFIC_HEAT_FLUID: f64 = 0.1547; // c_f [kJ/kg/C]
pub const LATENT_HEAT: f64 = 30.162; // h_f [kJ/kg]
pub const PARTITION_COEFFICIENT: f64 = 0.31; // kappa_p
pub const DENSITY_SOLID: f64 = 10800.0; // rho_s [kg/m^3]
pub const DENSITY_FLUID: f64 = 10000.0; // rho_f [kg/m^3]
pub const VISCOSITY: f64 = 0.0023; // mu [kg/m/s]
pub const EUTECTIC_TEMPERATURE: f64 = 183.0; // T_e [C]
pub const MELTING_TEMPERATURE: f64 = 327.0; // T_m [C]
pub const LIQUIDUS_SLOPE: f64 = -232.63; // m_liq [C per unit mass fraction]
pub const DENDRITE_ARM_SPACING: f64 = 0.001; // d [m]

// Reference initial state of the lead-tin case
pub const INITIAL_CONCENTRATION: f64 = 0.192; // C_0 [mass fraction], 19.2 wt%
pub const INITIAL_TEMPERATURE: f64 = 287.0; // T_i [C]

// Numerical defaults
pub const DEFAULT_TIME_STEP: f64 = 0.01; // dt [s]
pub const DEFAULT_GAMMA: f64 = 0.5; // generalized-trapezoidal weight
pub const TEMPERATURE_MAX_ITERATIONS: usize = 100;
pub const TEMPERATURE_TOLERANCE: f64 = 0.001;
pub const LINEAR_SOLVER_MAX_ITERATIONS: usize = 1000;
pub const LINEAR_SOLVER_TOLERANCE: f64 = 1e-10;

/// Kozeny-Carman geometry factor for dendritic mush
pub const KOZENY_CARMAN_FACTOR: f64 = 180.0;

/// Upper end of the Reynolds range where the SUPG weight grows linearly
pub const SUPG_REYNOLDS_LIMIT: f64 = 3.0;
