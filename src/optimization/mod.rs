pub mod callback;
pub mod problem;
pub mod solvers;

pub use callback::{FitProgressCallback, IterationResult};
pub use problem::{PolarizationProblem, DOMAIN_PENALTY};
pub use solvers::{DifferentialEvolution, LbfgsRefiner};
pub use solvers::{
    GlobalOptimizer, LocalOptimizer, NoopCallback, OptimizationCallback, Problem, SolverResult,
};
