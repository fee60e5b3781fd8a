use thiserror::Error;

/// Result type for fitting operations
pub type Result<T> = std::result::Result<T, FitError>;

/// Errors raised while validating inputs, evaluating the model or running a solver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Malformed samples, bounds, constants or configuration. Always fatal.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A logarithm argument left the real domain or the model produced a non-finite voltage
    #[error("Domain error at sample {index}: {reason}")]
    DomainError { index: usize, reason: String },

    /// The underlying optimizer library failed internally
    #[error("Solver error: {0}")]
    Solver(String),
}

impl FitError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn domain(index: usize, reason: impl Into<String>) -> Self {
        Self::DomainError {
            index,
            reason: reason.into(),
        }
    }

    pub fn is_domain_error(&self) -> bool {
        matches!(self, Self::DomainError { .. })
    }
}
