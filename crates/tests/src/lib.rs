//! Shared signal generators for the Compand integration tests

/// `duration_ms` of a unit-amplitude sine
pub fn generate_sine_wave(frequency: f32, sample_rate: u32, duration_ms: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_ms / 1000.0) as usize;
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| phase.sin())
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Scale every sample by a linear gain
pub fn scaled(samples: &[f32], gain: f32) -> Vec<f32> {
    samples.iter().map(|s| s * gain).collect()
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
