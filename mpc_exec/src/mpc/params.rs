//! MPC module parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the MPC controller.
///
/// These are the primary tuning levers of the controller. They are loaded
/// once at init from `mpc.toml`, validated, and never mutated at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Horizon length in steps. Must be at least 2: step 0 is pinned to the
    /// current state, so the first free decision is at step 1.
    pub n_steps: usize,

    /// Timestep between horizon steps
    ///
    /// Units: seconds
    pub dt_s: f64,

    /// Target cruise speed
    pub ref_speed: f64,

    /// Distance from the centre of gravity to the front axle, used in the
    /// turning-rate term of the kinematic bicycle model.
    ///
    /// Units: metres
    pub lf_m: f64,

    /// Steering bound, demand is limited to [-max_steer_rad, +max_steer_rad]
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Throttle/brake bound, demand is limited to
    /// [-max_throttle, +max_throttle]
    pub max_throttle: f64,

    /// Cross-track error cost weight
    pub w_cte: f64,

    /// Heading error cost weight
    pub w_epsi: f64,

    /// Speed error cost weight
    pub w_v: f64,

    /// Steering magnitude cost weight
    pub w_delta: f64,

    /// Acceleration magnitude cost weight
    pub w_a: f64,

    /// Steering rate-of-change cost weight. Dominates the magnitude weight
    /// by design so that ride smoothness wins over actuator effort.
    pub w_delta_rate: f64,

    /// Acceleration rate-of-change cost weight
    pub w_a_rate: f64,

    /// Number of horizon steps of actuation delay to compensate for. With a
    /// delay of `d` the dynamics at step `t` use the actuation planned at
    /// step `t - 1 - d`. Zero disables compensation.
    pub actuation_delay_steps: usize,

    /// Wall-clock budget for a single solve
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,

    /// Iteration limit for a single solve
    pub max_iterations: usize,

    /// Optimality tolerance. The solve is converged when the projected
    /// gradient infinity-norm drops below `opt_tolerance * (1 + cost)`.
    pub opt_tolerance: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by parameter validation.
///
/// These are fatal at init, a solve is never attempted with invalid
/// parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Horizon length must be at least 2, got {0}")]
    HorizonTooShort(usize),

    #[error("Timestep must be positive and finite, got {0}")]
    InvalidTimestep(f64),

    #[error("Reference speed must be finite, got {0}")]
    InvalidRefSpeed(f64),

    #[error("Front axle distance must be positive and finite, got {0}")]
    InvalidAxleDistance(f64),

    #[error("Actuator bound `{0}` must be positive and finite, got {1}")]
    InvalidActuatorBound(&'static str, f64),

    #[error("Cost weight `{0}` must be non-negative and finite, got {1}")]
    InvalidWeight(&'static str, f64),

    #[error("Actuation delay of {0} steps does not fit in a horizon of {1} steps")]
    DelayTooLong(usize, usize),

    #[error("Solve time budget must be positive and finite, got {0}")]
    InvalidSolveBudget(f64),

    #[error("Iteration limit must be at least 1")]
    InvalidIterationLimit,

    #[error("Optimality tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Validate the parameters.
    ///
    /// Called once when the module is initialised so that invalid
    /// configuration is fatal at startup, never at per-cycle solve time.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.n_steps < 2 {
            return Err(ParamsError::HorizonTooShort(self.n_steps));
        }
        if !(self.dt_s.is_finite() && self.dt_s > 0.0) {
            return Err(ParamsError::InvalidTimestep(self.dt_s));
        }
        if !self.ref_speed.is_finite() {
            return Err(ParamsError::InvalidRefSpeed(self.ref_speed));
        }
        if !(self.lf_m.is_finite() && self.lf_m > 0.0) {
            return Err(ParamsError::InvalidAxleDistance(self.lf_m));
        }

        let bounds = [
            ("max_steer_rad", self.max_steer_rad),
            ("max_throttle", self.max_throttle),
        ];
        for &(name, value) in bounds.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(ParamsError::InvalidActuatorBound(name, value));
            }
        }

        let weights = [
            ("w_cte", self.w_cte),
            ("w_epsi", self.w_epsi),
            ("w_v", self.w_v),
            ("w_delta", self.w_delta),
            ("w_a", self.w_a),
            ("w_delta_rate", self.w_delta_rate),
            ("w_a_rate", self.w_a_rate),
        ];
        for &(name, value) in weights.iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ParamsError::InvalidWeight(name, value));
            }
        }

        if self.actuation_delay_steps + 2 > self.n_steps {
            return Err(ParamsError::DelayTooLong(
                self.actuation_delay_steps,
                self.n_steps,
            ));
        }

        if !(self.max_solve_time_s.is_finite() && self.max_solve_time_s > 0.0) {
            return Err(ParamsError::InvalidSolveBudget(self.max_solve_time_s));
        }
        if self.max_iterations < 1 {
            return Err(ParamsError::InvalidIterationLimit);
        }
        if !(self.opt_tolerance.is_finite() && self.opt_tolerance > 0.0) {
            return Err(ParamsError::InvalidTolerance(self.opt_tolerance));
        }

        Ok(())
    }
}

impl Default for Params {
    /// Baseline tuning for the simulator vehicle.
    fn default() -> Self {
        Self {
            n_steps: 15,
            dt_s: 0.05,
            ref_speed: 50.0,
            lf_m: 2.67,
            max_steer_rad: 0.436332,
            max_throttle: 1.0,
            w_cte: 1.0,
            w_epsi: 1.0,
            w_v: 1.0,
            w_delta: 1.0,
            w_a: 1.0,
            w_delta_rate: 2000.0,
            w_a_rate: 100.0,
            actuation_delay_steps: 0,
            max_solve_time_s: 0.5,
            max_iterations: 4000,
            opt_tolerance: 1e-6,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
