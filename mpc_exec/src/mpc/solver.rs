//! # NLP solver interface and shooting backend
//!
//! The controller is solver-agnostic: anything implementing [`NlpSolver`]
//! can be used to solve the horizon problem, and tests exercise the rest of
//! the pipeline with a stub. Non-convergence is always surfaced as a
//! distinguishable [`SolveStatus`], never as a silently-returned stale
//! decision vector.
//!
//! The default backend, [`ShootingSolver`], exploits the structure of this
//! particular problem instead of reimplementing a general interior-point
//! method: the dynamics constraints are an explicit time recursion, so any
//! actuation sequence determines the full state trajectory by rollout. The
//! solver therefore optimises over the `2(n-1)` actuation variables only,
//! with a projected Levenberg-Marquardt iteration on the Gauss-Newton
//! structure of the cost. Derivatives are exact, computed with forward-mode
//! dual numbers. Solutions satisfy the dynamics constraints by construction
//! and the actuator bounds by projection.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, DualNum};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

// Internal
use super::builder::HorizonProblem;
use super::model::TrajectoryModel;
use super::params::Params;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Initial Levenberg-Marquardt damping factor.
const INITIAL_DAMPING: f64 = 1e-3;

/// Maximum damping growth attempts within one iteration before the solve is
/// declared stalled.
const MAX_DAMPING_ATTEMPTS: usize = 12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Options passed to a solve. These are configuration, not control flow.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Wall-clock budget for the solve
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,

    /// Iteration limit
    pub max_iterations: usize,

    /// Optimality tolerance on the projected gradient infinity-norm,
    /// relative to `1 + cost`.
    pub opt_tolerance: f64,
}

/// Result of one solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Whether and how the solve terminated
    pub status: SolveStatus,

    /// Achieved cost
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Full decision vector values
    pub vars: Vec<f64>,
}

/// A stateless constrained-NLP solver for horizon problems.
pub trait NlpSolver {
    /// Solve the given problem against the given model.
    ///
    /// Implementations must return a `Solution` whose `status` reflects
    /// whether the optimality tolerance was actually reached, and must
    /// respect the problem's variable bounds in the returned vector.
    fn solve(
        &self,
        problem: &HorizonProblem,
        model: &TrajectoryModel,
        options: &SolverOptions,
    ) -> Result<Solution, SolveError>;
}

/// The default single-shooting backend, see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShootingSolver;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    /// The optimality tolerance was reached
    Converged,

    /// The iteration limit was hit first
    IterationLimit,

    /// The wall-clock budget was exhausted first
    TimedOut,

    /// No descent step could be found, the iterate is stuck at a point
    /// which does not satisfy the optimality tolerance
    Stalled,
}

/// Hard solve failures. Unlike a non-converged [`SolveStatus`] these carry no
/// usable decision vector at all.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("Cost became non-finite at iteration {0}")]
    NonFiniteCost(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SolverOptions {
    /// Pull the solver options out of the module parameters.
    pub fn from_params(params: &Params) -> Self {
        Self {
            max_solve_time_s: params.max_solve_time_s,
            max_iterations: params.max_iterations,
            opt_tolerance: params.opt_tolerance,
        }
    }
}

impl Solution {
    /// True if the solver reached its optimality tolerance.
    pub fn converged(&self) -> bool {
        matches!(self.status, SolveStatus::Converged)
    }
}

impl NlpSolver for ShootingSolver {
    fn solve(
        &self,
        problem: &HorizonProblem,
        model: &TrajectoryModel,
        options: &SolverOptions,
    ) -> Result<Solution, SolveError> {
        let start_time = Instant::now();
        let l = problem.layout;
        let n_act = l.n - 1;
        let n_u = 2 * n_act;

        // The pinned initial state, taken from the problem's initial guess
        let mut initial_state = [0f64; 6];
        for (block, start) in l.state_starts().iter().enumerate() {
            initial_state[block] = problem.initial_guess[*start];
        }

        // Actuation bounds, pulled from the problem's variable bounds
        let mut lower = vec![0f64; n_u];
        let mut upper = vec![0f64; n_u];
        for k in 0..n_act {
            lower[k] = problem.var_lower[l.delta_start + k];
            upper[k] = problem.var_upper[l.delta_start + k];
            lower[n_act + k] = problem.var_lower[l.a_start + k];
            upper[n_act + k] = problem.var_upper[l.a_start + k];
        }

        // Start from the problem's initial guess (zero actuations), projected
        // onto the bounds
        let mut u = DVector::<f64>::zeros(n_u);
        for j in 0..n_u {
            u[j] = clamp(&u[j], &lower[j], &upper[j]);
        }

        let mut res = weighted_residuals(model, &initial_state, u.as_slice());
        let mut cost = res.norm_squared();
        if !cost.is_finite() {
            return Err(SolveError::NonFiniteCost(0));
        }

        let mut damping = INITIAL_DAMPING;
        let mut status = SolveStatus::IterationLimit;
        let mut iterations = 0;

        for iter in 0..options.max_iterations {
            iterations = iter + 1;

            if start_time.elapsed().as_secs_f64() > options.max_solve_time_s {
                status = SolveStatus::TimedOut;
                break;
            }

            let jac = residual_jacobian(model, &initial_state, &u, res.len());
            let grad = jac.transpose() * &res * 2.0;

            // Projected-gradient optimality measure: zero at a point where no
            // feasible descent direction exists
            let mut pg_inf = 0f64;
            for j in 0..n_u {
                let projected = clamp(&(u[j] - grad[j]), &lower[j], &upper[j]);
                pg_inf = pg_inf.max((projected - u[j]).abs());
            }
            if pg_inf <= options.opt_tolerance * (1.0 + cost) {
                status = SolveStatus::Converged;
                break;
            }

            let jtj = jac.transpose() * &jac;
            let jtr = jac.transpose() * &res;
            let rhs = jtr.map(|v| -v);

            // Levenberg-Marquardt step, projected onto the actuator bounds.
            // Damping grows until a descent step is found, shrinks on success.
            let mut descended = false;
            for _attempt in 0..MAX_DAMPING_ATTEMPTS {
                let mut normal = jtj.clone();
                for j in 0..n_u {
                    normal[(j, j)] += damping * (1.0 + jtj[(j, j)]);
                }

                let step = match normal.cholesky() {
                    Some(chol) => chol.solve(&rhs),
                    None => {
                        damping *= 10.0;
                        continue;
                    }
                };

                let mut u_new = &u + &step;
                for j in 0..n_u {
                    u_new[j] = clamp(&u_new[j], &lower[j], &upper[j]);
                }

                let res_new = weighted_residuals(model, &initial_state, u_new.as_slice());
                let cost_new = res_new.norm_squared();
                if !cost_new.is_finite() {
                    return Err(SolveError::NonFiniteCost(iterations));
                }

                if cost_new < cost {
                    u = u_new;
                    res = res_new;
                    cost = cost_new;
                    damping = (damping / 3.0).max(1e-12);
                    descended = true;
                    break;
                }

                damping *= 10.0;
            }

            trace!(
                "solve iter {}: cost {:.6e}, pg {:.3e}, damping {:.1e}",
                iterations,
                cost,
                pg_inf,
                damping
            );

            if !descended {
                status = SolveStatus::Stalled;
                break;
            }
        }

        let vars = rollout(model, &initial_state, u.as_slice());
        let final_cost = model.cost(&vars);

        debug!(
            "solve finished: status {:?}, cost {:.6e}, {} iterations, {:.1} ms",
            status,
            final_cost,
            iterations,
            start_time.elapsed().as_secs_f64() * 1e3
        );

        Ok(Solution {
            status,
            cost: final_cost,
            iterations,
            vars,
        })
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Assemble the full decision vector implied by an actuation sequence: the
/// state blocks are filled by rolling the model's dynamics forward from the
/// initial state, so the dynamics residuals of the result are zero by
/// construction.
///
/// `u` holds the steering block followed by the acceleration block.
fn rollout<T: DualNum<f64> + Copy + From<f64>>(
    model: &TrajectoryModel,
    initial_state: &[f64; 6],
    u: &[T],
) -> Vec<T> {
    let l = *model.layout();
    let n_act = l.n - 1;
    let mut vars = vec![T::zero(); l.n_vars];

    for k in 0..n_act {
        vars[l.delta_start + k] = u[k];
        vars[l.a_start + k] = u[n_act + k];
    }

    let mut state = [
        T::from(initial_state[0]),
        T::from(initial_state[1]),
        T::from(initial_state[2]),
        T::from(initial_state[3]),
        T::from(initial_state[4]),
        T::from(initial_state[5]),
    ];

    for t in 0..l.n {
        for (block, start) in l.state_starts().iter().enumerate() {
            vars[start + t] = state[block];
        }
        if t + 1 < l.n {
            let a_idx = model.actuation_index(t + 1);
            state = model.step(&state, vars[l.delta_start + a_idx], vars[l.a_start + a_idx]);
        }
    }

    vars
}

/// Weighted cost residuals of an actuation sequence after rollout.
fn weighted_residuals(
    model: &TrajectoryModel,
    initial_state: &[f64; 6],
    u: &[f64],
) -> DVector<f64> {
    let vars = rollout(model, initial_state, u);
    DVector::from_vec(model.cost_residuals(&vars))
}

/// Jacobian of the weighted residuals with respect to the actuations, one
/// forward-mode dual evaluation per column.
fn residual_jacobian(
    model: &TrajectoryModel,
    initial_state: &[f64; 6],
    u: &DVector<f64>,
    n_residuals: usize,
) -> DMatrix<f64> {
    let n_u = u.len();
    let mut jac = DMatrix::zeros(n_residuals, n_u);

    for j in 0..n_u {
        let mut u_dual: Vec<Dual64> = u.iter().map(|v| Dual64::from(*v)).collect();
        u_dual[j].eps = 1.0;

        let vars = rollout(model, initial_state, &u_dual);
        for (i, r) in model.cost_residuals(&vars).iter().enumerate() {
            jac[(i, j)] = r.eps;
        }
    }

    jac
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc::builder;
    use crate::mpc::types::{PathCoefficients, VehicleState};

    fn origin_state(v: f64) -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v,
            cte: 0.0,
            epsi: 0.0,
        }
    }

    fn solve(
        params: &Params,
        state: &VehicleState,
        coeffs: &PathCoefficients,
    ) -> Solution {
        let problem = builder::build(params, state, coeffs).unwrap();
        let model = TrajectoryModel::new(params, coeffs);
        ShootingSolver
            .solve(&problem, &model, &SolverOptions::from_params(params))
            .unwrap()
    }

    #[test]
    fn test_straight_path_at_speed_is_trivial() {
        let mut params = Params::default();
        params.ref_speed = 20.0;

        let coeffs = PathCoefficients(vec![0.0; 4]);
        let solution = solve(&params, &origin_state(20.0), &coeffs);

        // No tracking error and no speed error: zero actuation is optimal
        assert!(solution.converged());
        assert!(solution.cost < 1e-9);

        let l = solution.vars.len();
        let layout = *TrajectoryModel::new(&params, &coeffs).layout();
        assert_eq!(l, layout.n_vars);
        for k in 0..(layout.n - 1) {
            assert!(solution.vars[layout.delta_start + k].abs() < 1e-9);
            assert!(solution.vars[layout.a_start + k].abs() < 1e-9);
        }
    }

    #[test]
    fn test_speed_catch_up_accelerates() {
        let params = Params::default();

        let coeffs = PathCoefficients(vec![0.0; 4]);
        let solution = solve(&params, &origin_state(0.0), &coeffs);
        let layout = *TrajectoryModel::new(&params, &coeffs).layout();

        assert!(solution.converged(), "status {:?}", solution.status);

        // Far below the reference speed: early acceleration must be strongly
        // positive, steering stays at zero by symmetry
        assert!(
            solution.vars[layout.a_start] > 0.5,
            "a0 = {}",
            solution.vars[layout.a_start]
        );
        for k in 0..(layout.n - 1) {
            assert!(solution.vars[layout.delta_start + k].abs() < 1e-6);
        }
    }

    #[test]
    fn test_curvature_tracking_steers_into_turn() {
        let mut params = Params::default();
        params.ref_speed = 10.0;

        // Reference curving to the left (positive y)
        let coeffs = PathCoefficients(vec![0.0, 0.0, 0.05, 0.0]);
        let solution = solve(&params, &origin_state(10.0), &coeffs);
        let layout = *TrajectoryModel::new(&params, &coeffs).layout();

        assert!(solution.converged(), "status {:?}", solution.status);

        // In this model positive steering turns the heading negative, so a
        // left turn demands negative steering
        let delta_0 = solution.vars[layout.delta_start];
        assert!(delta_0 < 0.0, "delta_0 = {}", delta_0);
        assert!(delta_0.abs() > 1e-4, "delta_0 = {}", delta_0);

        // Dynamics are satisfied by rollout
        let model = TrajectoryModel::new(&params, &coeffs);
        assert!(model.max_dynamics_residual(&solution.vars) < 1e-9);
    }

    #[test]
    fn test_mid_corner_input_converges_with_default_options() {
        // A routine mid-corner solve: moderate speed, offset from the line,
        // gentle curvature. The optimality tolerance is only reached deep
        // into the damped tail of the iteration, so the default iteration
        // limit must leave room well beyond the point where the cost itself
        // has settled.
        let params = Params::default();
        let state = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
            cte: 0.5,
            epsi: -0.05,
        };

        let coeffs = PathCoefficients(vec![0.5, 0.05, -0.001, 0.0]);
        let solution = solve(&params, &state, &coeffs);

        assert!(
            solution.converged(),
            "status {:?} after {} iterations",
            solution.status,
            solution.iterations
        );
        assert!(solution.iterations <= params.max_iterations);
    }

    #[test]
    fn test_bounds_enforced_under_cost_pressure() {
        let mut params = Params::default();
        params.ref_speed = 100.0;

        // A hard left turn far from the reference: both actuators saturate
        let coeffs = PathCoefficients(vec![0.0, 1.0, 0.1, 0.0]);
        let problem = builder::build(&params, &origin_state(5.0), &coeffs).unwrap();
        let model = TrajectoryModel::new(&params, &coeffs);
        let solution = ShootingSolver
            .solve(&problem, &model, &SolverOptions::from_params(&params))
            .unwrap();

        let layout = *model.layout();
        for k in 0..(layout.n - 1) {
            let delta = solution.vars[layout.delta_start + k];
            let a = solution.vars[layout.a_start + k];
            assert!(delta >= -params.max_steer_rad && delta <= params.max_steer_rad);
            assert!(a >= -params.max_throttle && a <= params.max_throttle);
        }
    }

    #[test]
    fn test_initial_state_pinned_in_solution() {
        let params = Params::default();
        let state = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 7.0,
            cte: 0.6,
            epsi: -0.04,
        };

        let coeffs = PathCoefficients(vec![0.6, 0.04, 0.0, 0.0]);
        let solution = solve(&params, &state, &coeffs);
        let layout = *TrajectoryModel::new(&params, &coeffs).layout();

        let expected = state.as_array();
        for (block, start) in layout.state_starts().iter().enumerate() {
            assert!(
                (solution.vars[*start] - expected[block]).abs() < 1e-12,
                "block {}",
                block
            );
        }
    }

    #[test]
    fn test_exhausted_budget_reports_timeout() {
        let params = Params::default();
        let coeffs = PathCoefficients(vec![0.0, 0.2, 0.01, 0.0]);
        let problem = builder::build(&params, &origin_state(0.0), &coeffs).unwrap();
        let model = TrajectoryModel::new(&params, &coeffs);

        let options = SolverOptions {
            max_solve_time_s: 0.0,
            max_iterations: 100,
            opt_tolerance: 1e-12,
        };

        let solution = ShootingSolver.solve(&problem, &model, &options).unwrap();
        assert_eq!(solution.status, SolveStatus::TimedOut);
        assert!(!solution.converged());
    }
}
