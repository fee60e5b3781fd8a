pub mod error;
pub mod types;
pub mod validation;

pub use error::{FitError, Result};
pub use types::*;
pub use validation::{validate_bounds, validate_constants, validate_fit_inputs, validate_samples};
