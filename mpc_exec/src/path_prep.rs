//! # Path preparation module
//!
//! Turns a raw telemetry message into the inputs the MPC module needs: the
//! upcoming waypoints are rotated from the world frame into the vehicle
//! frame, a cubic polynomial is fitted through them by least squares, and the
//! initial tracking errors are evaluated at the vehicle origin.
//!
//! After the transform the vehicle sits at the origin of its own frame with
//! zero heading, so the solve always starts from x = y = psi = 0 and the
//! initial cross-track error is simply the polynomial's value at zero.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

// Internal
use crate::mpc::types::N_PATH_COEFFS;
use crate::mpc::{PathCoefficients, VehicleState};
use comms_if::telem::TelemMsg;
use util::maths::{poly_der_val, poly_val};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Order of the polynomial fitted through the waypoints, tied to the
/// coefficient count the solve boundary accepts.
pub const POLY_FIT_ORDER: usize = N_PATH_COEFFS - 1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The prepared solve inputs plus the reference line for display.
#[derive(Debug, Clone)]
pub struct PreparedPath {
    /// Fitted reference polynomial in the vehicle frame.
    pub coeffs: PathCoefficients,

    /// Vehicle state in the vehicle frame, with the initial tracking errors
    /// evaluated against the fitted curve.
    pub state: VehicleState,

    /// Reference line x positions in the vehicle frame (the transformed
    /// waypoints), for display.
    pub ref_x: Vec<f64>,

    /// Reference line y positions in the vehicle frame (the fitted curve
    /// sampled at `ref_x`), for display.
    pub ref_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while preparing the path.
#[derive(Debug, Error)]
pub enum PathPrepError {
    #[error("Need at least {0} waypoints to fit an order {1} polynomial, got {2}")]
    NotEnoughWaypoints(usize, usize, usize),

    #[error("The least-squares fit failed: {0}")]
    FitFailed(&'static str),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Prepare the MPC inputs from a telemetry message.
pub fn prepare(telem: &TelemMsg) -> Result<PreparedPath, PathPrepError> {
    let (way_x, way_y) = to_vehicle_frame(telem);

    let coeffs = fit_polynomial(&way_x, &way_y, POLY_FIT_ORDER)?;

    // At the origin of the vehicle frame the cross-track error is just the
    // fitted curve's offset, and the heading error is the negated tangent
    // angle of the curve
    let cte = poly_val(&0.0, &coeffs.0);
    let epsi = -poly_der_val(&0.0, &coeffs.0).atan();

    let state = VehicleState {
        x: 0.0,
        y: 0.0,
        psi: 0.0,
        v: telem.speed,
        cte,
        epsi,
    };

    let ref_y = way_x.iter().map(|x| poly_val(x, &coeffs.0)).collect();

    Ok(PreparedPath {
        coeffs,
        state,
        ref_x: way_x,
        ref_y,
    })
}

/// Rotate the telemetry waypoints from the world frame into the vehicle
/// frame, so that the vehicle sits at the origin with zero heading.
pub fn to_vehicle_frame(telem: &TelemMsg) -> (Vec<f64>, Vec<f64>) {
    let cos_npsi = (-telem.psi).cos();
    let sin_npsi = (-telem.psi).sin();

    let mut xs = Vec::with_capacity(telem.ptsx.len());
    let mut ys = Vec::with_capacity(telem.ptsy.len());

    for (wx, wy) in telem.ptsx.iter().zip(telem.ptsy.iter()) {
        let dx = wx - telem.x;
        let dy = wy - telem.y;

        xs.push(dx * cos_npsi - dy * sin_npsi);
        ys.push(dx * sin_npsi + dy * cos_npsi);
    }

    (xs, ys)
}

/// Fit a polynomial of the given order through the points by least squares.
///
/// Returns the coefficients ordered lowest degree first.
pub fn fit_polynomial(
    xs: &[f64],
    ys: &[f64],
    order: usize,
) -> Result<PathCoefficients, PathPrepError> {
    if xs.len() < order + 1 {
        return Err(PathPrepError::NotEnoughWaypoints(order + 1, order, xs.len()));
    }

    // Vandermonde matrix of the sample positions
    let a = DMatrix::from_fn(xs.len(), order + 1, |r, c| xs[r].powi(c as i32));
    let b = DVector::from_column_slice(ys);

    let solution = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(PathPrepError::FitFailed)?;

    Ok(PathCoefficients(solution.iter().cloned().collect()))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_transform() {
        // Vehicle at (1, 1) heading along +y, waypoint one unit further
        // along +y is one unit straight ahead in the vehicle frame
        let telem = TelemMsg {
            ptsx: vec![1.0, 0.0],
            ptsy: vec![2.0, 1.0],
            x: 1.0,
            y: 1.0,
            psi: std::f64::consts::FRAC_PI_2,
            speed: 5.0,
        };

        let (xs, ys) = to_vehicle_frame(&telem);

        assert!((xs[0] - 1.0).abs() < 1e-12);
        assert!(ys[0].abs() < 1e-12);

        // A waypoint to the world -x side is to the vehicle's left (+y)
        assert!(xs[1].abs() < 1e-12);
        assert!((ys[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_recovers_exact_cubic() {
        let xs: Vec<f64> = vec![-4.0, -2.0, 0.0, 1.5, 3.0, 5.0];
        let truth = [1.0, 2.0, -0.5, 0.1];
        let ys: Vec<f64> = xs.iter().map(|x| poly_val(x, &truth)).collect();

        let coeffs = fit_polynomial(&xs, &ys, 3).unwrap();

        assert_eq!(coeffs.0.len(), 4);
        for (c, t) in coeffs.0.iter().zip(truth.iter()) {
            assert!((c - t).abs() < 1e-8, "got {:?}", coeffs.0);
        }
    }

    #[test]
    fn test_fit_rejects_too_few_waypoints() {
        assert!(matches!(
            fit_polynomial(&[0.0, 1.0], &[0.0, 1.0], 3),
            Err(PathPrepError::NotEnoughWaypoints(4, 3, 2))
        ));
    }

    #[test]
    fn test_prepare_initial_errors() {
        // A straight reference line offset by 0.5 to the vehicle's left
        let telem = TelemMsg {
            ptsx: vec![0.0, 2.0, 4.0, 6.0, 8.0],
            ptsy: vec![0.5, 0.5, 0.5, 0.5, 0.5],
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            speed: 10.0,
        };

        let prepared = prepare(&telem).unwrap();

        assert!((prepared.state.cte - 0.5).abs() < 1e-8);
        assert!(prepared.state.epsi.abs() < 1e-8);
        assert_eq!(prepared.state.x, 0.0);
        assert_eq!(prepared.state.v, 10.0);

        // The display line follows the fitted curve
        assert_eq!(prepared.ref_x.len(), prepared.ref_y.len());
        for y in prepared.ref_y.iter() {
            assert!((y - 0.5).abs() < 1e-8);
        }
    }
}
