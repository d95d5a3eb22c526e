pub mod config;
pub mod constants;
pub mod energy;
pub mod error;
pub mod fem;
pub mod fields;
pub mod json_parser;
pub mod logging;
pub mod material;
pub mod math_utils;
pub mod model;
pub mod sim;
pub mod thermo;

pub use config::SimulationConfig;
pub use error::{Result, SolidifyError};
pub use material::MaterialConstants;
pub use model::SolidificationModel;
