//! # Telemetry server
//!
//! Owns the REP socket the vehicle bridge talks to. Each control cycle the
//! bridge sends one telemetry message and blocks on the actuation reply, so
//! the request/reply pairing of the socket matches the lockstep nature of the
//! control loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{self, zmq, NetError, NetParams, SocketOptions},
    telem::{ActuationMsg, TelemMsg, TelemParseError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TelemServer {
    socket: zmq::Socket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TelemServerError {
    #[error("Socket error: {0}")]
    SocketError(NetError),

    #[error("Could not receive telemetry: {0}")]
    RecvError(zmq::Error),

    #[error("Received telemetry is not valid UTF-8")]
    NotUtf8,

    #[error("Could not parse the telemetry: {0}")]
    ParseError(TelemParseError),

    #[error("Could not send the actuation reply: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialise the actuation reply: {0}")]
    SerialiseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TelemServer {
    /// Create a new instance of the telemetry server, bound to the endpoint
    /// given in the network parameters.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TelemServerError> {
        let socket_options = SocketOptions {
            bind: true,
            linger: 1,
            // Don't block the control loop forever when the bridge is away
            recv_timeout: 100,
            send_timeout: 100,
        };

        let socket = net::make_socket(ctx, zmq::REP, socket_options, &params.telem_endpoint)
            .map_err(TelemServerError::SocketError)?;

        Ok(Self { socket })
    }

    /// Receive one telemetry message.
    ///
    /// Returns `Ok(None)` if no message arrived within the receive timeout.
    pub fn recv(&self) -> Result<Option<TelemMsg>, TelemServerError> {
        let msg = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(TelemServerError::NotUtf8),
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(TelemServerError::RecvError(e)),
        };

        TelemMsg::from_json(&msg)
            .map(Some)
            .map_err(TelemServerError::ParseError)
    }

    /// Send the actuation reply for the last received telemetry.
    pub fn send(&self, actuation: &ActuationMsg) -> Result<(), TelemServerError> {
        let json = actuation
            .to_json()
            .map_err(TelemServerError::SerialiseError)?;

        self.socket
            .send(&json, 0)
            .map_err(TelemServerError::SendError)
    }
}
