//! Implementations for the MpcCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;
use std::time::Instant;

// Internal
use super::builder;
use super::extract::{self, Actuation, PredictedTrajectory};
use super::model::TrajectoryModel;
use super::params::{Params, ParamsError};
use super::solver::{NlpSolver, ShootingSolver, SolveError, SolveStatus, SolverOptions};
use super::types::{InputError, PathCoefficients, VehicleState};
use util::{module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// MPC control module state.
///
/// One `proc` call performs one full receding-horizon solve: build the
/// problem from the inputs, solve it, and extract the first actuation. No
/// data persists between cycles, there is no warm start. Concurrent solves
/// against the same instance are not supported, the caller invokes `proc`
/// once per control cycle sequentially.
#[derive(Default)]
pub struct MpcCtrl {
    params: Params,

    solver: ShootingSolver,
}

/// Input data for one solve.
pub struct InputData {
    /// Vehicle state in the vehicle-local frame.
    pub state: VehicleState,

    /// Fitted reference polynomial in the vehicle-local frame.
    pub coeffs: PathCoefficients,
}

/// Output of a successful solve.
#[derive(Debug, Clone)]
pub struct OutputData {
    /// First actuation of the plan, to be applied this cycle.
    pub actuation: Actuation,

    /// Predicted trajectory over the horizon, for display.
    pub trajectory: PredictedTrajectory,
}

/// Status report for MPC processing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// Achieved cost of the solve
    pub cost: f64,

    /// Solver termination status
    pub status: SolveStatus,

    /// Number of solver iterations
    pub iterations: usize,

    /// Wall-clock duration of the solve in seconds
    pub solve_time_s: f64,

    /// Largest absolute dynamics residual of the returned plan
    pub max_residual: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during processing of the module.
#[derive(Debug, thiserror::Error)]
pub enum MpcError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    /// The loaded parameters failed validation. Fatal at init, a solve is
    /// never run against invalid configuration.
    #[error("Invalid parameters: {0}")]
    InvalidParams(ParamsError),

    /// The per-cycle inputs were rejected before a problem was built.
    #[error("Invalid solve inputs: {0}")]
    InvalidInput(#[from] InputError),

    /// The solver terminated without reaching its optimality tolerance. The
    /// caller owns the fallback (hold the previous command, brake, or raise
    /// an alert), this module never fabricates a plausible-looking actuation
    /// from a failed solve.
    #[error("Solver did not converge: {0:?}")]
    SolveFailed(SolveStatus),

    /// The solver failed hard and produced no usable decision vector.
    #[error("Solver error: {0}")]
    SolverError(#[from] SolveError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for MpcCtrl {
    type InitData = &'static str;
    type InitError = MpcError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        // Load the parameters
        self.params = match params::load(init_data) {
            Ok(p) => p,
            Err(e) => return Err(MpcError::ParamLoadError(e)),
        };

        // Validate once, so parameter errors are fatal at startup and never
        // surface at per-cycle solve time
        self.params.validate().map_err(MpcError::InvalidParams)?;

        Ok(())
    }

    /// Run one receding-horizon solve.
    ///
    /// Returns either a valid actuation plus trajectory, or an explicit
    /// error. A non-converged solve is an error, the caller never silently
    /// receives stale or garbage values.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let solve_start = Instant::now();

        // Build the problem, rejecting malformed inputs before the solver
        // sees them
        let problem = builder::build(&self.params, &input_data.state, &input_data.coeffs)?;
        let model = TrajectoryModel::new(&self.params, &input_data.coeffs);

        let solution =
            self.solver
                .solve(&problem, &model, &SolverOptions::from_params(&self.params))?;

        if !solution.converged() {
            return Err(MpcError::SolveFailed(solution.status));
        }

        let (actuation, trajectory) = extract::extract(
            &solution,
            model.layout(),
            self.params.max_steer_rad,
        );

        let report = StatusReport {
            cost: solution.cost,
            status: solution.status,
            iterations: solution.iterations,
            solve_time_s: solve_start.elapsed().as_secs_f64(),
            max_residual: model.max_dynamics_residual(&solution.vars),
        };

        trace!(
            "mpc cycle: cost {:.4e}, steer {:.4} rad, throttle {:.3}",
            report.cost,
            actuation.steer_rad,
            actuation.throttle
        );

        Ok((
            OutputData {
                actuation,
                trajectory,
            },
            report,
        ))
    }
}

impl MpcCtrl {
    /// The validated parameters the module was initialised with.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Build an instance directly from parameters, bypassing the parameter
    /// file. Used by tests and benchmarks.
    pub fn with_params(params: Params) -> Result<Self, MpcError> {
        params.validate().map_err(MpcError::InvalidParams)?;
        Ok(Self {
            params,
            solver: ShootingSolver,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_proc_full_cycle() {
        let mut ctrl = MpcCtrl::with_params(Params::default()).unwrap();

        let input = InputData {
            state: VehicleState {
                x: 0.0,
                y: 0.0,
                psi: 0.0,
                v: 10.0,
                cte: 0.5,
                epsi: -0.05,
            },
            coeffs: PathCoefficients(vec![0.5, 0.05, -0.001, 0.0]),
        };

        let (output, report) = ctrl.proc(&input).unwrap();

        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(output.trajectory.x.len(), ctrl.params().n_steps);
        assert!(report.max_residual < 1e-9);
        assert!(output.actuation.steer_norm.abs() <= 1.0);
        assert!(output.actuation.throttle.abs() <= 1.0);
    }

    #[test]
    fn test_non_converged_solve_is_an_explicit_error() {
        // Starve the solver: one iteration against an unreachable tolerance
        // cannot converge on a non-trivial input. The failure must surface
        // as an error, never as a plausible-looking actuation.
        let mut params = Params::default();
        params.max_iterations = 1;
        params.opt_tolerance = 1e-12;
        let mut ctrl = MpcCtrl::with_params(params).unwrap();

        let input = InputData {
            state: VehicleState {
                x: 0.0,
                y: 0.0,
                psi: 0.0,
                v: 10.0,
                cte: 0.5,
                epsi: -0.05,
            },
            coeffs: PathCoefficients(vec![0.5, 0.05, -0.001, 0.0]),
        };

        assert!(matches!(
            ctrl.proc(&input),
            Err(MpcError::SolveFailed(SolveStatus::IterationLimit))
        ));
    }

    #[test]
    fn test_proc_rejects_bad_inputs() {
        let mut ctrl = MpcCtrl::with_params(Params::default()).unwrap();

        let input = InputData {
            state: VehicleState {
                x: 0.0,
                y: 0.0,
                psi: 0.0,
                v: f64::NAN,
                cte: 0.0,
                epsi: 0.0,
            },
            coeffs: PathCoefficients(vec![0.0; 4]),
        };

        assert!(matches!(
            ctrl.proc(&input),
            Err(MpcError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected_at_init() {
        let mut params = Params::default();
        params.n_steps = 1;
        assert!(matches!(
            MpcCtrl::with_params(params),
            Err(MpcError::InvalidParams(_))
        ));
    }
}
