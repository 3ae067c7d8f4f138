//! # Network Module
//!
//! This module provides networking abstractions over ZMQ, the networking
//! library chosen for the software. The controller exposes a single REP
//! socket: the bridge sends one telemetry message per control cycle and waits
//! for the actuation reply.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use serde::Deserialize;
use zmq::{Context, Socket, SocketType};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| NetError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetParams {
    /// Endpoint the telemetry server binds to, e.g. `tcp://*:4567`.
    pub telem_endpoint: String,
}

/// Options which can be set on a socket before binding or connecting.
///
/// The options correspond to those found in the
/// [`zmq_setsockopt`](http://api.zeromq.org/2-1:zmq-setsockopt) documentation.
pub struct SocketOptions {
    /// Indicates if the socket should bind itself to the endpoint. Servers
    /// should have this value set as `true`, clients should have it set as
    /// `false`.
    pub bind: bool,

    /// `ZMQ_LINGER`: Set linger period for socket shutdown
    pub linger: i32,

    /// `ZMQ_RCVTIMEO`: Maximum time before a recv operation returns with `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`: Maximum time before a send operation returns with `EAGAIN`
    pub send_timeout: i32,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            bind: false,
            linger: 1,
            recv_timeout: -1,
            send_timeout: -1,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error setting socket option {0}: {1}")]
    SocketOptionError(String, zmq::Error),

    #[error("Could not bind the socket to {0}: {1}")]
    BindError(String, zmq::Error),

    #[error("Could not connect the socket to {0}: {1}")]
    ConnectError(String, zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create a socket of the given type, apply the options, and bind or connect
/// it to the endpoint.
pub fn make_socket(
    ctx: &Context,
    socket_type: SocketType,
    options: SocketOptions,
    endpoint: &str,
) -> Result<Socket, NetError> {
    let socket = ctx
        .socket(socket_type)
        .map_err(NetError::CreateSocketError)?;

    set_sockopts!(
        socket,
        (set_linger, options.linger),
        (set_rcvtimeo, options.recv_timeout),
        (set_sndtimeo, options.send_timeout)
    );

    if options.bind {
        socket
            .bind(endpoint)
            .map_err(|e| NetError::BindError(endpoint.into(), e))?;
        debug!("{:?} socket bound to {}", socket_type, endpoint);
    } else {
        socket
            .connect(endpoint)
            .map_err(|e| NetError::ConnectError(endpoint.into(), e))?;
        debug!("{:?} socket connected to {}", socket_type, endpoint);
    }

    Ok(socket)
}
