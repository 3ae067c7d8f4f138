//! # Model-predictive control module
//!
//! Once per control cycle this module solves a short-horizon trajectory
//! optimisation over a kinematic bicycle model of the vehicle, and returns
//! the first steering/throttle pair of the optimal plan together with the
//! predicted trajectory for display.
//!
//! The problem is posed over a flattened decision vector holding the state
//! trajectory and the actuation sequence (see [`layout`]). The cost trades
//! off tracking error against actuator effort and actuator smoothness, with
//! smoothness weighted heavily so the ride stays comfortable. The
//! discretised dynamics are hard equality constraints rather than a
//! simulated rollout inside the cost, so the optimiser plans against the
//! model instead of around it.
//!
//! The solve itself sits behind the [`solver::NlpSolver`] trait. The rest of
//! the module only ever sees a [`solver::Solution`] with an explicit
//! convergence status.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod builder;
pub mod extract;
pub mod layout;
pub mod model;
pub mod params;
pub mod solver;
pub mod state;
pub mod types;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use builder::HorizonProblem;
pub use extract::{Actuation, PredictedTrajectory};
pub use layout::DecisionLayout;
pub use model::TrajectoryModel;
pub use params::Params;
pub use solver::{NlpSolver, ShootingSolver, SolveStatus, Solution, SolverOptions};
pub use state::*;
pub use types::{PathCoefficients, VehicleState};
