//! Telemetry delivery from the audio thread to visualizers

pub mod monitor;
pub mod publisher;

pub use monitor::{HistorySnapshot, TelemetryMonitor};
pub use publisher::{Subscription, TelemetryError, TelemetryPublisher};
