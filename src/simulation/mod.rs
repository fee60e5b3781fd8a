pub mod polarization;

pub use polarization::{
    check_domain, evaluate, evaluate_point, loss_breakdown, nernst_potential, LossBreakdown,
    CURRENT_EPSILON,
};
