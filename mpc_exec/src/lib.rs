//! # MPC controller library
//!
//! Control modules for the MPC path-tracking executable. The executable glue
//! lives in `main.rs`, everything testable lives here.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod mpc;
pub mod path_prep;
pub mod telem_server;
