//! Per-block bridge between host sample vectors and the compute device.
//!
//! One call marshals the input vector into the complex scratch, runs a
//! blocking write / transform / read on the device and marshals the result
//! into the output vector. If any device step fails the whole output
//! region is zeroed and the buffer set is left as it was.

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::buffers::TransformBufferSet;
use crate::device::{ComputeDevice, SubmissionError};

/// Transform direction; decides which block vector is the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Time-domain samples in, interleaved complex spectrum out.
    #[default]
    Forward,
    /// Interleaved complex spectrum in, time-domain samples out (scaled by `1/L`).
    Inverse,
}

impl Direction {
    /// Transform length implied by the host's vector sizes.
    ///
    /// Forward transforms follow the time-domain block size; inverse
    /// transforms follow half the spectral vector (one complex point per
    /// two scalars).
    pub fn required_length(self, time_len: usize, freq_len: usize) -> usize {
        match self {
            Direction::Forward => time_len,
            Direction::Inverse => freq_len / 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Inverse => "inverse",
        }
    }
}

/// Host-owned sample vectors for one callback.
#[derive(Debug)]
pub struct BlockBuffers<'a> {
    /// Time-domain samples.
    pub time: &'a mut [f32],
    /// Interleaved real/imaginary spectrum.
    pub freq: &'a mut [f32],
}

impl<'a> BlockBuffers<'a> {
    pub fn new(time: &'a mut [f32], freq: &'a mut [f32]) -> Self {
        Self { time, freq }
    }

    pub fn output_mut(&mut self, direction: Direction) -> &mut [f32] {
        match direction {
            Direction::Forward => &mut *self.freq,
            Direction::Inverse => &mut *self.time,
        }
    }

    /// Zero the output vector for `direction`.
    pub fn silence(&mut self, direction: Direction) {
        self.output_mut(direction).fill(0.0);
    }
}

/// Run one block through the device.
///
/// On error the output vector has been zeroed and `set` is unchanged apart
/// from its scratch contents.
pub fn process_block<D: ComputeDevice>(
    direction: Direction,
    device: &D,
    set: &mut TransformBufferSet<D>,
    mut block: BlockBuffers<'_>,
) -> Result<(), SubmissionError> {
    let result = run(direction, device, set, &mut block);
    if result.is_err() {
        block.silence(direction);
    }
    result
}

fn run<D: ComputeDevice>(
    direction: Direction,
    device: &D,
    set: &mut TransformBufferSet<D>,
    block: &mut BlockBuffers<'_>,
) -> Result<(), SubmissionError> {
    let scale = set.inverse_scale();
    let (scratch, buffer, plan) = set.parts_mut();

    match direction {
        Direction::Forward => load_real(scratch, &*block.time),
        Direction::Inverse => load_complex(scratch, &*block.freq),
    }

    device.write(buffer, scratch)?;
    device.execute(plan, buffer, direction)?;
    device.read(buffer, scratch)?;

    match direction {
        Direction::Forward => store_complex(scratch, &mut *block.freq),
        Direction::Inverse => store_real(scratch, &mut *block.time, scale),
    }
    Ok(())
}

/// Real samples into the real parts; everything past the input is zeroed.
fn load_real(scratch: &mut [Complex32], input: &[f32]) {
    let n = input.len().min(scratch.len());
    for (dst, &sample) in scratch[..n].iter_mut().zip(&input[..n]) {
        *dst = Complex32::new(sample, 0.0);
    }
    scratch[n..].fill(Complex32::default());
}

fn load_complex(scratch: &mut [Complex32], input: &[f32]) {
    let points = (input.len() / 2).min(scratch.len());
    bytemuck::cast_slice_mut::<Complex32, f32>(&mut scratch[..points])
        .copy_from_slice(&input[..points * 2]);
    scratch[points..].fill(Complex32::default());
}

fn store_complex(scratch: &[Complex32], output: &mut [f32]) {
    let points = (output.len() / 2).min(scratch.len());
    output[..points * 2].copy_from_slice(bytemuck::cast_slice(&scratch[..points]));
    output[points * 2..].fill(0.0);
}

fn store_real(scratch: &[Complex32], output: &mut [f32], scale: f32) {
    let n = output.len().min(scratch.len());
    for (dst, value) in output[..n].iter_mut().zip(&scratch[..n]) {
        *dst = value.re * scale;
    }
    output[n..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferError;
    use crate::device::{DeviceClass, DeviceInfo, DeviceProvider, HostDevice, HostProvider};
    use crate::diagnostics::Diagnostics;

    fn host_device() -> HostDevice {
        HostProvider::new()
            .acquire(DeviceClass::Cpu, &Diagnostics::silent())
            .unwrap()
    }

    #[test]
    fn test_required_length() {
        assert_eq!(Direction::Forward.required_length(512, 2048), 512);
        assert_eq!(Direction::Inverse.required_length(512, 2048), 1024);
    }

    #[test]
    fn test_forward_impulse_is_flat() {
        let device = host_device();
        let mut set = TransformBufferSet::build(&device, 64).unwrap();

        let mut time = vec![0.0f32; 64];
        time[0] = 1.0;
        let mut freq = vec![f32::NAN; 128];
        process_block(
            Direction::Forward,
            &device,
            &mut set,
            BlockBuffers::new(&mut time, &mut freq),
        )
        .unwrap();

        for bin in freq.chunks(2) {
            assert!((bin[0] - 1.0).abs() < 1e-5, "re = {}", bin[0]);
            assert!(bin[1].abs() < 1e-5, "im = {}", bin[1]);
        }
    }

    #[test]
    fn test_forward_zero_pads_short_input() {
        let device = host_device();
        let mut set = TransformBufferSet::build(&device, 16).unwrap();
        set.scratch_mut().fill(Complex32::new(9.0, 9.0));

        // DC of four ones padded to sixteen points
        let mut time = vec![1.0f32; 4];
        let mut freq = vec![0.0f32; 32];
        process_block(
            Direction::Forward,
            &device,
            &mut set,
            BlockBuffers::new(&mut time, &mut freq),
        )
        .unwrap();

        assert!((freq[0] - 4.0).abs() < 1e-5);
        assert!(freq[1].abs() < 1e-5);
    }

    #[test]
    fn test_short_output_tail_is_zeroed() {
        let device = host_device();
        let mut set = TransformBufferSet::build(&device, 8).unwrap();

        let mut time = vec![1.0f32; 16];
        let mut freq = vec![5.0f32; 20];
        process_block(
            Direction::Forward,
            &device,
            &mut set,
            BlockBuffers::new(&mut time, &mut freq),
        )
        .unwrap();

        assert!((freq[0] - 8.0).abs() < 1e-5);
        assert!(freq[16..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_inverse_scales_by_length() {
        let device = host_device();
        let mut set = TransformBufferSet::build(&device, 8).unwrap();

        // Flat unit spectrum is an impulse of height 1 after 1/L scaling
        let mut freq: Vec<f32> = (0..8).flat_map(|_| [1.0f32, 0.0]).collect();
        let mut time = vec![0.0f32; 8];
        process_block(
            Direction::Inverse,
            &device,
            &mut set,
            BlockBuffers::new(&mut time, &mut freq),
        )
        .unwrap();

        assert!((time[0] - 1.0).abs() < 1e-5);
        assert!(time[1..].iter().all(|v| v.abs() < 1e-5));
    }

    struct BrokenDevice {
        info: DeviceInfo,
        inner: HostDevice,
    }

    impl ComputeDevice for BrokenDevice {
        type Buffer = <HostDevice as ComputeDevice>::Buffer;
        type Plan = <HostDevice as ComputeDevice>::Plan;

        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn create_buffer(&self, len: usize) -> Result<Self::Buffer, BufferError> {
            self.inner.create_buffer(len)
        }

        fn create_plan(&self, len: usize) -> Result<Self::Plan, BufferError> {
            self.inner.create_plan(len)
        }

        fn write(
            &self,
            buffer: &mut Self::Buffer,
            host: &[Complex32],
        ) -> Result<(), SubmissionError> {
            self.inner.write(buffer, host)
        }

        fn execute(
            &self,
            _plan: &mut Self::Plan,
            _buffer: &mut Self::Buffer,
            _direction: Direction,
        ) -> Result<(), SubmissionError> {
            Err(SubmissionError::Compute("device lost".to_string()))
        }

        fn read(
            &self,
            buffer: &Self::Buffer,
            host: &mut [Complex32],
        ) -> Result<(), SubmissionError> {
            self.inner.read(buffer, host)
        }
    }

    #[test]
    fn test_failure_zeroes_output() {
        let device = BrokenDevice {
            info: host_device().info().clone(),
            inner: host_device(),
        };
        let mut set = TransformBufferSet::build(&device, 8).unwrap();

        let mut time = vec![1.0f32; 8];
        let mut freq = vec![3.0f32; 16];
        let result = process_block(
            Direction::Forward,
            &device,
            &mut set,
            BlockBuffers::new(&mut time, &mut freq),
        );

        assert!(matches!(result, Err(SubmissionError::Compute(_))));
        assert!(freq.iter().all(|&v| v == 0.0));
        assert!(time.iter().all(|&v| v == 1.0));
        assert_eq!(set.len(), 8);
    }
}
