//! Process wiring for the `sift-server` binary.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`reporter`] - Periodic counter logging.
//! - [`telemetry`] - `tracing-subscriber` setup and optional OpenTelemetry
//!   export.

pub mod config;
pub mod reporter;
pub mod telemetry;
