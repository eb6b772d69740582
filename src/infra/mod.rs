//! Runtime bootstrap: telemetry and process-level errors.

pub mod error;
pub mod telemetry;
