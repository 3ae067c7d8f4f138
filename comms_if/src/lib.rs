//! # Communications interface crate.
//!
//! Provides the common communications interfaces for the software: the
//! telemetry/actuation wire contract and the network layer which carries it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry and actuation message definitions
pub mod telem;

/// Network module
pub mod net;
