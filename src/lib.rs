//! Show-control hub
//!
//! Routes OSC-style commands to device drivers by address prefix, runs timed
//! fades and tracks per-driver telemetry.

pub mod api;
pub mod command;
pub mod config;
pub mod device_state;
pub mod drivers;
pub mod fade;
pub mod hub;
pub mod ingress;
pub mod router;
pub mod signal;
pub mod stats;

pub use command::Command;
pub use config::AppConfig;
pub use hub::Hub;
