mod differential;
mod lbfgs;
pub mod traits;

pub use differential::DifferentialEvolution;
pub use lbfgs::LbfgsRefiner;
pub use traits::{
    GlobalOptimizer, LocalOptimizer, NoopCallback, OptimizationCallback, Problem, SolverResult,
};
