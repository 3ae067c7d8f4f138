//! # Trajectory model
//!
//! Pure cost and constraint evaluator for the horizon optimisation. Given a
//! flattened decision vector the model produces a scalar cost and a vector of
//! constraint residuals encoding the discretised kinematic bicycle dynamics
//! plus the initial-condition pin. It has no dependency on any solver.
//!
//! Every evaluation function is generic over a [`num_dual::DualNum`] scalar
//! so that a solver can differentiate the model exactly with forward-mode
//! dual numbers rather than finite differences.
//!
//! The dynamics follow the forward-Euler discretisation of the kinematic
//! bicycle model, with the simulator's steering convention (positive steering
//! turns the heading negative):
//!
//! ```text
//! x'    = x + v cos(psi) dt
//! y'    = y + v sin(psi) dt
//! psi'  = psi - v/Lf delta dt
//! v'    = v + a dt
//! cte'  = (f(x) - y) + v sin(epsi) dt
//! epsi' = (psi - psides) - v/Lf delta dt
//! ```
//!
//! where `f` is the fitted reference polynomial and
//! `psides = psi - atan(f'(x))` is the desired heading.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use num_dual::DualNum;

// Internal
use super::layout::DecisionLayout;
use super::params::Params;
use super::types::PathCoefficients;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cost and constraint model over one horizon.
///
/// Holds the fitted path coefficients for this solve and the fixed tuning
/// constants copied out of [`Params`].
#[derive(Debug, Clone)]
pub struct TrajectoryModel {
    layout: DecisionLayout,
    coeffs: Vec<f64>,

    dt_s: f64,
    lf_m: f64,
    ref_speed: f64,

    w_cte: f64,
    w_epsi: f64,
    w_v: f64,
    w_delta: f64,
    w_a: f64,
    w_delta_rate: f64,
    w_a_rate: f64,

    actuation_delay_steps: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryModel {
    /// Build the model for one solve from validated parameters and path
    /// coefficients.
    pub fn new(params: &Params, coeffs: &PathCoefficients) -> Self {
        Self {
            layout: DecisionLayout::new(params.n_steps),
            coeffs: coeffs.0.clone(),
            dt_s: params.dt_s,
            lf_m: params.lf_m,
            ref_speed: params.ref_speed,
            w_cte: params.w_cte,
            w_epsi: params.w_epsi,
            w_v: params.w_v,
            w_delta: params.w_delta,
            w_a: params.w_a,
            w_delta_rate: params.w_delta_rate,
            w_a_rate: params.w_a_rate,
            actuation_delay_steps: params.actuation_delay_steps,
        }
    }

    /// The decision vector layout this model evaluates against.
    pub fn layout(&self) -> &DecisionLayout {
        &self.layout
    }

    /// Evaluate the reference polynomial at `x`.
    pub fn poly_at<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        let mut f = T::zero();
        for (i, c) in self.coeffs.iter().enumerate() {
            f = f + x.powi(i as i32) * *c;
        }
        f
    }

    /// Evaluate the derivative of the reference polynomial at `x`.
    pub fn poly_der_at<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        let mut f = T::zero();
        for (i, c) in self.coeffs.iter().enumerate().skip(1) {
            f = f + x.powi(i as i32 - 1) * (*c * i as f64);
        }
        f
    }

    /// One forward-Euler step of the kinematic bicycle model.
    ///
    /// `state` is in decision block order (x, y, psi, v, cte, epsi),
    /// `delta` and `a` are the actuations applied over the step.
    pub fn step<T: DualNum<f64> + Copy>(&self, state: &[T; 6], delta: T, a: T) -> [T; 6] {
        let [x0, y0, psi0, v0, _cte0, epsi0] = *state;

        let f0 = self.poly_at(x0);
        let psides0 = psi0 - self.poly_der_at(x0).atan();
        let turn_rate = v0 * delta * (self.dt_s / self.lf_m);

        [
            x0 + v0 * psi0.cos() * self.dt_s,
            y0 + v0 * psi0.sin() * self.dt_s,
            psi0 - turn_rate,
            v0 + a * self.dt_s,
            (f0 - y0) + v0 * epsi0.sin() * self.dt_s,
            (psi0 - psides0) - turn_rate,
        ]
    }

    /// Index into the actuation blocks for the dynamics between steps
    /// `t - 1` and `t`, accounting for the configured actuation delay.
    pub(crate) fn actuation_index(&self, t: usize) -> usize {
        (t - 1).saturating_sub(self.actuation_delay_steps)
    }

    /// Total cost of a candidate decision vector.
    ///
    /// Three weighted groups, in priority order: tracking error over the full
    /// horizon, actuator magnitude, and actuator rate-of-change between
    /// consecutive steps.
    pub fn cost<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> T {
        let l = &self.layout;
        let mut cost = T::zero();

        for t in 0..l.n {
            cost = cost
                + vars[l.cte_start + t].powi(2) * self.w_cte
                + vars[l.epsi_start + t].powi(2) * self.w_epsi
                + (vars[l.v_start + t] - self.ref_speed).powi(2) * self.w_v;
        }

        for t in 0..(l.n - 1) {
            cost = cost
                + vars[l.delta_start + t].powi(2) * self.w_delta
                + vars[l.a_start + t].powi(2) * self.w_a;
        }

        for t in 0..(l.n - 2) {
            let d_delta = vars[l.delta_start + t + 1] - vars[l.delta_start + t];
            let d_a = vars[l.a_start + t + 1] - vars[l.a_start + t];
            cost = cost + d_delta.powi(2) * self.w_delta_rate + d_a.powi(2) * self.w_a_rate;
        }

        cost
    }

    /// The cost expressed as a vector of weighted residuals, such that the
    /// cost equals the sum of squares of the entries.
    ///
    /// This decomposition is what lets a least-squares solver exploit the
    /// Gauss-Newton structure of the objective.
    pub fn cost_residuals<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> Vec<T> {
        let l = &self.layout;
        let mut res = Vec::with_capacity(3 * l.n + 2 * (l.n - 1) + 2 * (l.n - 2));

        let sw_cte = self.w_cte.sqrt();
        let sw_epsi = self.w_epsi.sqrt();
        let sw_v = self.w_v.sqrt();
        let sw_delta = self.w_delta.sqrt();
        let sw_a = self.w_a.sqrt();
        let sw_delta_rate = self.w_delta_rate.sqrt();
        let sw_a_rate = self.w_a_rate.sqrt();

        for t in 0..l.n {
            res.push(vars[l.cte_start + t] * sw_cte);
            res.push(vars[l.epsi_start + t] * sw_epsi);
            res.push((vars[l.v_start + t] - self.ref_speed) * sw_v);
        }

        for t in 0..(l.n - 1) {
            res.push(vars[l.delta_start + t] * sw_delta);
            res.push(vars[l.a_start + t] * sw_a);
        }

        for t in 0..(l.n - 2) {
            res.push((vars[l.delta_start + t + 1] - vars[l.delta_start + t]) * sw_delta_rate);
            res.push((vars[l.a_start + t + 1] - vars[l.a_start + t]) * sw_a_rate);
        }

        res
    }

    /// Constraint rows for a candidate decision vector.
    ///
    /// Row `block_start + 0` of each state block is the initial-condition
    /// pin: the row value is the decision variable itself, and the problem
    /// bounds pin it to the measured state. Rows `block_start + t` for
    /// `t = 1..n` are dynamics residuals, (actual value at `t`) minus
    /// (prediction from `t - 1`), which the solver must drive to zero.
    pub fn constraints<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> Vec<T> {
        let l = &self.layout;
        let mut g = vec![T::zero(); l.n_constraints];

        for start in l.state_starts().iter() {
            g[*start] = vars[*start];
        }

        for t in 1..l.n {
            let prev = [
                vars[l.x_start + t - 1],
                vars[l.y_start + t - 1],
                vars[l.psi_start + t - 1],
                vars[l.v_start + t - 1],
                vars[l.cte_start + t - 1],
                vars[l.epsi_start + t - 1],
            ];

            let a_idx = self.actuation_index(t);
            let pred = self.step(&prev, vars[l.delta_start + a_idx], vars[l.a_start + a_idx]);

            for (block, start) in l.state_starts().iter().enumerate() {
                g[start + t] = vars[start + t] - pred[block];
            }
        }

        g
    }

    /// Largest absolute dynamics residual of a candidate decision vector,
    /// ignoring the pin rows. Used for solution feasibility reporting.
    pub fn max_dynamics_residual(&self, vars: &[f64]) -> f64 {
        let g = self.constraints(vars);
        let mut max = 0f64;

        for start in self.layout.state_starts().iter() {
            for t in 1..self.layout.n {
                max = max.max(g[start + t].abs());
            }
        }

        max
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc::types::VehicleState;
    use num_dual::Dual64;

    fn test_params() -> Params {
        Params::default()
    }

    fn test_state() -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
            cte: 0.3,
            epsi: -0.05,
        }
    }

    /// Fill a decision vector by rolling the dynamics forward from the given
    /// state with the given constant actuations. The result satisfies the
    /// discretised update exactly.
    fn rollout_vars(model: &TrajectoryModel, state: &VehicleState, delta: f64, a: f64) -> Vec<f64> {
        let l = *model.layout();
        let mut vars = vec![0f64; l.n_vars];

        for k in 0..(l.n - 1) {
            vars[l.delta_start + k] = delta;
            vars[l.a_start + k] = a;
        }

        let mut s = state.as_array();
        for t in 0..l.n {
            for (block, start) in l.state_starts().iter().enumerate() {
                vars[start + t] = s[block];
            }
            if t + 1 < l.n {
                let a_idx = model.actuation_index(t + 1);
                s = model.step(&s, vars[l.delta_start + a_idx], vars[l.a_start + a_idx]);
            }
        }

        vars
    }

    #[test]
    fn test_dynamics_residuals_zero_on_rollout() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.5, 0.1, -0.02, 0.001]));

        let vars = rollout_vars(&model, &test_state(), 0.1, 0.4);
        let g = model.constraints(&vars);

        // Pin rows carry the decision variable value itself
        for start in model.layout().state_starts().iter() {
            assert_eq!(g[*start], vars[*start]);
        }

        // Dynamics rows are an algebraic identity on a rolled-out vector
        for start in model.layout().state_starts().iter() {
            for t in 1..model.layout().n {
                assert_eq!(g[start + t], 0.0, "row {} step {}", start, t);
            }
        }

        assert_eq!(model.max_dynamics_residual(&vars), 0.0);
    }

    #[test]
    fn test_residuals_zero_with_actuation_delay() {
        let mut params = test_params();
        params.actuation_delay_steps = 1;
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.0, 0.05, 0.0, 0.0]));

        let vars = rollout_vars(&model, &test_state(), -0.05, 0.2);
        assert_eq!(model.max_dynamics_residual(&vars), 0.0);
    }

    #[test]
    fn test_cost_increases_with_cte() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.0; 4]));
        let l = *model.layout();

        let mut vars = vec![0f64; l.n_vars];
        let base = model.cost(&vars);

        for t in 0..l.n {
            let mut bumped = vars.clone();
            bumped[l.cte_start + t] = 0.5;
            assert!(model.cost(&bumped) > base, "step {}", t);
        }

        // And the increase is monotonic in the magnitude
        vars[l.cte_start + 3] = 0.5;
        let c1 = model.cost(&vars);
        vars[l.cte_start + 3] = 1.0;
        let c2 = model.cost(&vars);
        assert!(c2 > c1);
    }

    #[test]
    fn test_steer_rate_dominates_steer_magnitude() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.0; 4]));
        let l = *model.layout();

        let base = model.cost(&vec![0f64; l.n_vars]);

        // A steering step change of 0.1 between two consecutive actuations
        let mut stepped = vec![0f64; l.n_vars];
        stepped[l.delta_start + 1] = 0.1;
        let rate_increase = model.cost(&stepped) - base;

        // The same magnitude held constant over the whole horizon
        let mut held = vec![0f64; l.n_vars];
        for k in 0..(l.n - 1) {
            held[l.delta_start + k] = 0.1;
        }
        let magnitude_increase = model.cost(&held) - base;

        // The 2000:1 weight ratio means the step change must cost far more
        // than the sustained deflection
        assert!(rate_increase > 10.0 * magnitude_increase);
    }

    #[test]
    fn test_cost_matches_residual_sum_of_squares() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.2, -0.1, 0.01, 0.0]));
        let l = *model.layout();

        // An arbitrary non-feasible decision vector
        let vars: Vec<f64> = (0..l.n_vars).map(|i| ((i * 7) % 11) as f64 * 0.1 - 0.5).collect();

        let cost = model.cost(&vars);
        let sum_sq: f64 = model.cost_residuals(&vars).iter().map(|r| r * r).sum();

        assert!((cost - sum_sq).abs() < 1e-9 * (1.0 + cost.abs()));
    }

    #[test]
    fn test_dual_gradient_matches_finite_difference() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![0.3, 0.2, -0.05, 0.002]));
        let l = *model.layout();

        let vars: Vec<f64> = (0..l.n_vars).map(|i| (i as f64 * 0.37).sin() * 0.2).collect();

        // Differentiate the cost with respect to a handful of variables
        for &i in [0, l.v_start + 2, l.cte_start + 1, l.delta_start, l.a_start + 3].iter() {
            let mut dual_vars: Vec<Dual64> = vars.iter().map(|v| Dual64::from(*v)).collect();
            dual_vars[i].eps = 1.0;
            let ad = model.cost(&dual_vars).eps;

            let h = 1e-6;
            let mut hi = vars.clone();
            hi[i] += h;
            let mut lo = vars.clone();
            lo[i] -= h;
            let fd = (model.cost(&hi) - model.cost(&lo)) / (2.0 * h);

            assert!((ad - fd).abs() < 1e-5 * (1.0 + fd.abs()), "var {}", i);
        }
    }

    #[test]
    fn test_poly_eval() {
        let params = test_params();
        let model = TrajectoryModel::new(&params, &PathCoefficients(vec![1.0, 2.0, 3.0]));

        // 1 + 2x + 3x^2 at x = 2 is 17, derivative 2 + 6x is 14
        assert_eq!(model.poly_at(2f64), 17.0);
        assert_eq!(model.poly_der_at(2f64), 14.0);
    }
}
