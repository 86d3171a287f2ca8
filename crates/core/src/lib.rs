//! Compand core: dynamic-range effect instance, engine and telemetry types

pub mod domain;

pub use domain::*;
