//! Compand infrastructure: telemetry transport and UI-side consumers

pub mod telemetry;

pub use telemetry::*;
