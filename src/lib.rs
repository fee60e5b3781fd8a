//! Parameter identification for a semi-empirical PEM fuel cell stack model.
//!
//! A seven-parameter polarization curve (Nernst potential minus activation,
//! ohmic and concentration losses) is fitted to measured stack voltages by
//! differential evolution followed by bounded L-BFGS refinement.

pub mod core;
pub mod optimization;
pub mod optimizer;
pub mod simulation;

#[cfg(feature = "python")]
mod python;

pub use crate::core::*;
pub use optimization::{
    DifferentialEvolution, FitProgressCallback, GlobalOptimizer, IterationResult, LbfgsRefiner,
    LocalOptimizer, NoopCallback, OptimizationCallback, PolarizationProblem, Problem,
    SolverResult, DOMAIN_PENALTY,
};
pub use optimizer::{
    fit, FitConfig, FitResult, FitWarning, GlobalSearchConfig, LocalSearchConfig,
    PointRow, PolarizationFitter, PowerPoint, StageSummary,
};
pub use simulation::{
    check_domain, evaluate, evaluate_point, loss_breakdown, nernst_potential, LossBreakdown,
};
