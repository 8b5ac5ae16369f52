//! Deterministic block-sized test signals.
//!
//! Used by the tests, benches and demo to feed the engine without audio
//! file I/O.

use std::f32::consts::PI;

/// A sine at an exact FFT bin: `cycles` periods across `len` samples.
///
/// A forward transform of this block has all its energy in bins `cycles`
/// and `len - cycles`.
pub fn bin_sine(len: usize, cycles: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * cycles as f32 * i as f32 / len as f32).sin())
        .collect()
}

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `len` - Number of samples
/// * `amplitude` - Amplitude (0.0 to 1.0)
pub fn sine(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Reproducible white noise in `[-amplitude, amplitude]`.
pub fn white_noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    // 64-bit LCG (Knuth's MMIX constants)
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let normalized = ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0;
            amplitude * normalized
        })
        .collect()
}

/// Unit impulse at `position`, zero elsewhere.
pub fn impulse(len: usize, position: usize) -> Vec<f32> {
    let mut samples = vec![0.0; len];
    if let Some(sample) = samples.get_mut(position) {
        *sample = 1.0;
    }
    samples
}
