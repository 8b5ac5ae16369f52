//! Uniform parameter struct for the FFT shader.
//!
//! Must match the WGSL `FftParams` definition exactly, including alignment.

use crate::bridge::Direction;

/// Per-dispatch FFT parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FftParams {
    pub n: u32,
    pub stage: u32,
    /// Sign of the twiddle exponent.
    pub direction: f32,
    pub log2_n: u32,
}

impl FftParams {
    pub fn new(fft_size: usize, stage: u32, direction: Direction) -> Self {
        Self {
            n: fft_size as u32,
            stage,
            direction: match direction {
                Direction::Forward => -1.0,
                Direction::Inverse => 1.0,
            },
            log2_n: fft_size.trailing_zeros(),
        }
    }
}
