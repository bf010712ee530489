//! Offload functions from a device to the edge clusters of the continuum.
//!
//! A [`DeviceRuntime`] authenticates against the frontend, registers the
//! scheduling requirements of the application, finds out which edge cluster
//! serves it and runs functions there. Connectivity losses are recovered
//! from transparently by walking the session back through its states.

pub mod config;
mod error;
pub mod factory;
pub mod runtime;
pub mod state_machine;

pub use error::Error;
pub use runtime::{CallResult, DeviceRuntime};
