//! Main MPC controller executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and modules
//!     - Main loop:
//!         - Receive one telemetry message from the vehicle bridge
//!         - Prepare the path: frame transform, polynomial fit, tracking
//!           errors
//!         - MPC processing: one receding-horizon solve
//!         - Reply with the first actuation and the display trajectories
//!
//! On a failed solve the loop replies with the previous actuation (zero on
//! startup) rather than a fabricated value, and logs the failure. The solve
//! failure is never hidden inside a plausible-looking reply.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use mpc_lib::{
    mpc::{InputData, MpcCtrl},
    path_prep,
    telem_server::{TelemServer, TelemServerError},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use comms_if::{net::zmq, net::NetParams, telem::ActuationMsg};
use log::{debug, info, warn};

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl
        .init("mpc.toml")
        .wrap_err("Failed to initialise MpcCtrl")?;

    info!(
        "MpcCtrl initialised: horizon {} steps at {} s",
        mpc_ctrl.params().n_steps,
        mpc_ctrl.params().dt_s
    );

    let ctx = zmq::Context::new();
    let telem_server =
        TelemServer::new(&ctx, &net_params).wrap_err("Failed to start the telemetry server")?;

    info!("Telemetry server listening on {}", net_params.telem_endpoint);

    // ---- MAIN LOOP ----

    // The fallback actuation held from the last successful solve
    let mut held = ActuationMsg::default();

    loop {
        // Get the next telemetry message. The REP socket must send exactly
        // one reply per received request, so parse failures still get a
        // (fallback) reply.
        let telem = match telem_server.recv() {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e @ TelemServerError::ParseError(_)) | Err(e @ TelemServerError::NotUtf8) => {
                warn!("Rejected telemetry: {}", e);
                telem_server.send(&held)?;
                continue;
            }
            Err(e) => return Err(e).wrap_err("Telemetry receive failed"),
        };

        // Prepare the path and run the solve
        let reply = match path_prep::prepare(&telem) {
            Ok(prepared) => {
                let input = InputData {
                    state: prepared.state,
                    coeffs: prepared.coeffs.clone(),
                };

                match mpc_ctrl.proc(&input) {
                    Ok((output, report)) => {
                        debug!(
                            "solve ok: cost {:.4e}, {} iters, {:.1} ms, residual {:.2e}",
                            report.cost,
                            report.iterations,
                            report.solve_time_s * 1e3,
                            report.max_residual
                        );

                        ActuationMsg {
                            steering_angle: output.actuation.steer_norm,
                            throttle: output.actuation.throttle,
                            mpc_x: output.trajectory.x,
                            mpc_y: output.trajectory.y,
                            next_x: prepared.ref_x,
                            next_y: prepared.ref_y,
                        }
                    }
                    Err(e) => {
                        // Explicit failure: hold the previous command rather
                        // than fabricate a fresh one
                        warn!("Solve failed, holding previous actuation: {}", e);
                        held.clone()
                    }
                }
            }
            Err(e) => {
                warn!("Path preparation failed, holding previous actuation: {}", e);
                held.clone()
            }
        };

        telem_server.send(&reply)?;
        held = reply;
    }
}
