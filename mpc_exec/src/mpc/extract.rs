//! # Actuation extraction
//!
//! Maps a solved decision vector back into the first actuation command and
//! the predicted trajectory. Only the first actuation is ever applied, the
//! rest of the plan is discarded and re-solved next cycle (receding horizon).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use super::layout::DecisionLayout;
use super::solver::Solution;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The first actuation of the solved plan.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Actuation {
    /// Steering demand in radians, within the configured steering bound.
    pub steer_rad: f64,

    /// Steering demand normalised into [-1, +1] by the steering bound.
    pub steer_norm: f64,

    /// Throttle/brake demand in [-1, +1].
    pub throttle: f64,
}

/// The predicted (x, y) trajectory over the horizon, in the same vehicle
/// frame as the input state. Used purely for downstream display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictedTrajectory {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Extract the first actuation and the predicted trajectory from a solution.
///
/// The first actuation sits at index 0 of each actuation block. This is the
/// actuation planned between the pinned current state (step 0) and the first
/// free step (step 1), so the offset-by-one against the state blocks is
/// intentional.
///
/// Callers must check convergence before applying the result, this function
/// does not second-guess the solution it is given.
pub fn extract(
    solution: &Solution,
    layout: &DecisionLayout,
    max_steer_rad: f64,
) -> (Actuation, PredictedTrajectory) {
    let steer_rad = solution.vars[layout.delta_start];
    let throttle = solution.vars[layout.a_start];

    let actuation = Actuation {
        steer_rad,
        steer_norm: clamp(&(steer_rad / max_steer_rad), &-1.0, &1.0),
        throttle,
    };

    let trajectory = PredictedTrajectory {
        x: solution.vars[layout.x_start..layout.x_start + layout.n].to_vec(),
        y: solution.vars[layout.y_start..layout.y_start + layout.n].to_vec(),
    };

    (actuation, trajectory)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
