//! Host-facing audio types and errors
//!
//! These describe what the host hands to the effect instance: a channel
//! layout, a sample rate, and per-channel sample buffers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when the host breaks an instance precondition
#[derive(Debug, Error, PartialEq)]
pub enum InstanceError {
    /// The offline path only supports stereo
    #[error("Unsupported channel layout: {0:?} (expected stereo)")]
    UnsupportedChannelLayout(ChannelLayout),

    /// Sample rate must be finite and positive
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// A realtime processor needs at least one channel
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),
}

pub type Result<T> = std::result::Result<T, InstanceError>;

/// Channel layout announced by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Surround(u16),
}

impl ChannelLayout {
    pub fn count(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Surround(n) => *n as usize,
        }
    }

    pub fn from_count(count: usize) -> Self {
        match count {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            n => ChannelLayout::Surround(n.min(u16::MAX as usize) as u16),
        }
    }
}

/// Check a host-supplied sample rate
pub fn validate_sample_rate(sample_rate: f64) -> Result<f64> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(InstanceError::InvalidSampleRate(sample_rate))
    }
}
