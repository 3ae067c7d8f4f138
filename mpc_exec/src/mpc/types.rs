//! Input types for a single solve
//!
//! Both types are immutable snapshots for exactly one optimisation. They are
//! built fresh each control cycle and discarded once the first actuation has
//! been extracted, nothing persists between cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of coefficients of the reference polynomial. The reference curve
/// is a fitted cubic, so a valid coefficient set has exactly four entries.
pub const N_PATH_COEFFS: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematic state of the vehicle at the instant of solving.
///
/// The state is expressed in the vehicle-local frame, so by convention
/// `x`, `y` and `psi` are all zero when the state comes straight from the
/// frame transform. The fields are kept so that the solve remains correct for
/// states produced elsewhere (tests, replay tooling).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VehicleState {
    /// Position along the vehicle x axis
    pub x: f64,

    /// Position along the vehicle y axis
    pub y: f64,

    /// Heading relative to the vehicle x axis
    ///
    /// Units: radians
    pub psi: f64,

    /// Speed
    pub v: f64,

    /// Cross-track error to the reference curve
    pub cte: f64,

    /// Heading error to the reference tangent
    ///
    /// Units: radians
    pub epsi: f64,
}

/// Coefficients of the fitted reference polynomial `y = f(x)` in the vehicle
/// frame, ordered lowest degree first.
#[derive(Debug, Clone, Serialize)]
pub struct PathCoefficients(pub Vec<f64>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by input validation, before any problem is built.
///
/// The point of this validation is to fail fast with a descriptive error
/// rather than let a NaN propagate into the optimiser.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Vehicle state field `{0}` is not finite ({1})")]
    NonFiniteState(&'static str, f64),

    #[error("The path coefficients are empty")]
    EmptyCoefficients,

    #[error("Expected {0} path coefficients for a cubic reference, got {1}")]
    WrongCoefficientCount(usize, usize),

    #[error("Path coefficient {0} is not finite ({1})")]
    NonFiniteCoefficient(usize, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleState {
    /// The state as an array in decision-vector block order.
    pub fn as_array(&self) -> [f64; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    /// Check that every field is finite.
    pub fn validate(&self) -> Result<(), InputError> {
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("psi", self.psi),
            ("v", self.v),
            ("cte", self.cte),
            ("epsi", self.epsi),
        ];

        for &(name, value) in fields.iter() {
            if !value.is_finite() {
                return Err(InputError::NonFiniteState(name, value));
            }
        }

        Ok(())
    }
}

impl PathCoefficients {
    /// Check the coefficients describe a finite cubic.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.0.is_empty() {
            return Err(InputError::EmptyCoefficients);
        }
        if self.0.len() != N_PATH_COEFFS {
            return Err(InputError::WrongCoefficientCount(
                N_PATH_COEFFS,
                self.0.len(),
            ));
        }

        for (i, c) in self.0.iter().enumerate() {
            if !c.is_finite() {
                return Err(InputError::NonFiniteCoefficient(i, *c));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
