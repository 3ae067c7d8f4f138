//! # Horizon problem builder
//!
//! Assembles the full optimisation problem instance for one solve: the
//! decision vector layout, the initial guess, the per-variable bounds and the
//! per-constraint bounds. The builder validates its inputs first so that a
//! malformed state or coefficient set is rejected before the solver ever sees
//! a NaN.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use super::layout::DecisionLayout;
use super::params::Params;
use super::types::{InputError, PathCoefficients, VehicleState};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Bound used for state variables, effectively unbounded.
const STATE_BOUND: f64 = 1.0e19;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A fully populated optimisation problem instance.
///
/// Lives for exactly one solve and is discarded once the first actuation has
/// been extracted.
#[derive(Debug, Clone)]
pub struct HorizonProblem {
    /// Decision vector layout shared with the model and extractor.
    pub layout: DecisionLayout,

    /// Initial guess, zero except for the six initial-state slots.
    pub initial_guess: Vec<f64>,

    /// Per-variable lower bounds.
    pub var_lower: Vec<f64>,

    /// Per-variable upper bounds.
    pub var_upper: Vec<f64>,

    /// Per-constraint lower bounds.
    pub constr_lower: Vec<f64>,

    /// Per-constraint upper bounds.
    pub constr_upper: Vec<f64>,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the problem instance for the given state and path.
///
/// All dynamics rows are pinned to exactly zero. The six initial-state rows
/// are pinned to the measured state value on both bounds, which together with
/// the matching initial guess fixes step 0 of every state block.
pub fn build(
    params: &Params,
    state: &VehicleState,
    coeffs: &PathCoefficients,
) -> Result<HorizonProblem, InputError> {
    state.validate()?;
    coeffs.validate()?;

    let layout = DecisionLayout::new(params.n_steps);
    let state_array = state.as_array();

    // Initial guess: zero besides the initial state
    let mut initial_guess = vec![0f64; layout.n_vars];
    for (block, start) in layout.state_starts().iter().enumerate() {
        initial_guess[*start] = state_array[block];
    }

    // Variable bounds: states effectively unbounded, actuators limited
    let mut var_lower = vec![-STATE_BOUND; layout.n_vars];
    let mut var_upper = vec![STATE_BOUND; layout.n_vars];

    for i in layout.delta_start..layout.a_start {
        var_lower[i] = -params.max_steer_rad;
        var_upper[i] = params.max_steer_rad;
    }
    for i in layout.a_start..layout.n_vars {
        var_lower[i] = -params.max_throttle;
        var_upper[i] = params.max_throttle;
    }

    // Constraint bounds: zero everywhere besides the initial state rows
    let mut constr_lower = vec![0f64; layout.n_constraints];
    let mut constr_upper = vec![0f64; layout.n_constraints];

    for (block, start) in layout.state_starts().iter().enumerate() {
        constr_lower[*start] = state_array[block];
        constr_upper[*start] = state_array[block];
    }

    Ok(HorizonProblem {
        layout,
        initial_guess,
        var_lower,
        var_upper,
        constr_lower,
        constr_upper,
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_state() -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 12.0,
            cte: -0.4,
            epsi: 0.08,
        }
    }

    #[test]
    fn test_problem_shape_and_bounds() {
        let params = Params::default();
        let problem = build(
            &params,
            &test_state(),
            &PathCoefficients(vec![0.1, 0.0, 0.0, 0.0]),
        )
        .unwrap();

        let l = &problem.layout;
        assert_eq!(problem.initial_guess.len(), l.n_vars);
        assert_eq!(problem.var_lower.len(), l.n_vars);
        assert_eq!(problem.constr_lower.len(), l.n_constraints);

        // State variables are effectively unbounded
        for i in 0..l.delta_start {
            assert_eq!(problem.var_lower[i], -1.0e19);
            assert_eq!(problem.var_upper[i], 1.0e19);
        }

        // Steering slots carry the steering bound
        for i in l.delta_start..l.a_start {
            assert_eq!(problem.var_lower[i], -params.max_steer_rad);
            assert_eq!(problem.var_upper[i], params.max_steer_rad);
        }

        // Acceleration slots carry the throttle bound
        for i in l.a_start..l.n_vars {
            assert_eq!(problem.var_lower[i], -params.max_throttle);
            assert_eq!(problem.var_upper[i], params.max_throttle);
        }
    }

    #[test]
    fn test_initial_state_pin() {
        let params = Params::default();
        let state = test_state();
        let problem = build(&params, &state, &PathCoefficients(vec![0.0; 4])).unwrap();

        let l = &problem.layout;
        let expected = state.as_array();

        for (block, start) in l.state_starts().iter().enumerate() {
            // Guess carries the state, the rest of the block is zero
            assert_eq!(problem.initial_guess[*start], expected[block]);
            assert_eq!(problem.initial_guess[start + 1], 0.0);

            // Pin rows are equality constraints at the state value
            assert_eq!(problem.constr_lower[*start], expected[block]);
            assert_eq!(problem.constr_upper[*start], expected[block]);

            // Dynamics rows are pinned to exactly zero
            assert_eq!(problem.constr_lower[start + 1], 0.0);
            assert_eq!(problem.constr_upper[start + 1], 0.0);
        }
    }

    #[test]
    fn test_rejects_malformed_inputs() {
        let params = Params::default();
        let mut state = test_state();
        state.cte = f64::NAN;

        assert!(build(&params, &state, &PathCoefficients(vec![0.0; 4])).is_err());
        assert!(build(&params, &test_state(), &PathCoefficients(vec![])).is_err());
        assert!(build(&params, &test_state(), &PathCoefficients(vec![0.0; 3])).is_err());
    }
}
