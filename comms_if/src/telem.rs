//! # Telemetry and actuation messages
//!
//! These types fix the wire contract between the simulator/vehicle bridge and
//! the controller. A telemetry message carries the upcoming reference
//! waypoints in the world frame, the vehicle pose and the current speed. The
//! actuation response carries the normalised steering and throttle demands
//! plus two point sequences used purely for display: the predicted trajectory
//! (`mpc_x`/`mpc_y`) and the fitted reference line (`next_x`/`next_y`), both
//! in the vehicle frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Telemetry received from the vehicle once per control cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemMsg {
    /// Reference waypoint x positions in the world frame.
    pub ptsx: Vec<f64>,

    /// Reference waypoint y positions in the world frame.
    pub ptsy: Vec<f64>,

    /// Vehicle x position in the world frame.
    pub x: f64,

    /// Vehicle y position in the world frame.
    pub y: f64,

    /// Vehicle heading in the world frame.
    ///
    /// Units: radians
    pub psi: f64,

    /// Vehicle speed.
    pub speed: f64,
}

/// Actuation demands sent back to the vehicle in response to telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActuationMsg {
    /// Steering demand, normalised into [-1, +1].
    pub steering_angle: f64,

    /// Throttle (positive) or brake (negative) demand in [-1, +1].
    pub throttle: f64,

    /// Predicted trajectory x positions in the vehicle frame, for display.
    pub mpc_x: Vec<f64>,

    /// Predicted trajectory y positions in the vehicle frame, for display.
    pub mpc_y: Vec<f64>,

    /// Reference line x positions in the vehicle frame, for display.
    pub next_x: Vec<f64>,

    /// Reference line y positions in the vehicle frame, for display.
    pub next_y: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur when parsing a telemetry message.
#[derive(Debug, Error)]
pub enum TelemParseError {
    #[error("The message is not valid JSON: {0}")]
    NotJson(serde_json::Error),

    #[error("Waypoint arrays have mismatched lengths ({0} x values, {1} y values)")]
    WaypointLengthMismatch(usize, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl TelemMsg {
    /// Parse a telemetry message from its JSON wire representation.
    pub fn from_json(json: &str) -> Result<Self, TelemParseError> {
        let msg: TelemMsg = serde_json::from_str(json).map_err(TelemParseError::NotJson)?;

        if msg.ptsx.len() != msg.ptsy.len() {
            return Err(TelemParseError::WaypointLengthMismatch(
                msg.ptsx.len(),
                msg.ptsy.len(),
            ));
        }

        Ok(msg)
    }
}

impl ActuationMsg {
    /// Serialise the actuation message for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
