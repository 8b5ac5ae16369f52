//! Integration tests for the wgpu backend.
//!
//! Every test skips when no adapter is available.

mod common;

use common::{assert_all_zero, max_abs_diff};
use streamfft::gpu::GpuProvider;
use streamfft::synth::{bin_sine, impulse, white_noise};
use streamfft::{
    process_block, BlockBuffers, BlockStatus, ComputeDevice, DeviceClass, DeviceProvider,
    Diagnostics, Direction, GpuDevice, HostProvider, StreamFftBuilder, TransformBufferSet,
};

async fn create_gpu_device() -> Option<GpuDevice> {
    GpuProvider::new()
        .acquire_async(DeviceClass::Default, &Diagnostics::silent())
        .await
        .ok()
}

fn host_device() -> streamfft::HostDevice {
    HostProvider::new()
        .acquire(DeviceClass::Cpu, &Diagnostics::silent())
        .unwrap()
}

/// Transform one L-point block on `device` and return the output vector.
fn transform<D: ComputeDevice>(
    device: &D,
    direction: Direction,
    len: usize,
    input: &[f32],
) -> Vec<f32> {
    let mut set = TransformBufferSet::build(device, len).unwrap();
    let mut time = vec![0.0f32; len];
    let mut freq = vec![0.0f32; len * 2];
    match direction {
        Direction::Forward => time.copy_from_slice(input),
        Direction::Inverse => freq.copy_from_slice(input),
    }
    process_block(
        direction,
        device,
        &mut set,
        BlockBuffers::new(&mut time, &mut freq),
    )
    .unwrap();
    set.destroy();
    match direction {
        Direction::Forward => freq,
        Direction::Inverse => time,
    }
}

#[tokio::test]
async fn test_gpu_impulse_flat_spectrum() {
    if let Some(device) = create_gpu_device().await {
        let freq = transform(&device, Direction::Forward, 4096, &impulse(4096, 0));
        for (bin, pair) in freq.chunks(2).enumerate() {
            let magnitude = (pair[0] * pair[0] + pair[1] * pair[1]).sqrt();
            assert!((magnitude - 1.0).abs() < 1e-3, "bin {} magnitude {}", bin, magnitude);
            assert!(pair[1].abs() < 1e-3, "bin {} phase not zero", bin);
        }
    }
}

#[tokio::test]
async fn test_gpu_matches_host() {
    if let Some(gpu) = create_gpu_device().await {
        let host = host_device();
        for len in [2usize, 64, 1024, 8192] {
            let input = white_noise(len, 1.0, len as u64);
            let expected = transform(&host, Direction::Forward, len, &input);
            let actual = transform(&gpu, Direction::Forward, len, &input);

            let scale = (len as f32).sqrt();
            let error = max_abs_diff(&expected, &actual) / scale;
            assert!(error < 5e-3, "{}-point relative error {}", len, error);
        }
    }
}

#[tokio::test]
async fn test_gpu_sine_peak() {
    if let Some(device) = create_gpu_device().await {
        let freq = transform(&device, Direction::Forward, 512, &bin_sine(512, 17, 1.0));
        let magnitudes: Vec<f32> = freq
            .chunks(2)
            .map(|pair| (pair[0] * pair[0] + pair[1] * pair[1]).sqrt())
            .collect();
        let peak = magnitudes[..256]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 17);
        assert!((magnitudes[17] - 256.0).abs() < 0.5);
    }
}

#[tokio::test]
async fn test_gpu_roundtrip() {
    if let Some(device) = create_gpu_device().await {
        let input = white_noise(2048, 0.5, 99);
        let freq = transform(&device, Direction::Forward, 2048, &input);
        let output = transform(&device, Direction::Inverse, 2048, &freq);
        let error = max_abs_diff(&input, &output);
        assert!(error < 2e-3, "round trip error {}", error);
    }
}

#[tokio::test]
async fn test_gpu_resize_preserves_scratch() {
    if let Some(device) = create_gpu_device().await {
        let mut set = TransformBufferSet::build(&device, 256).unwrap();
        set.scratch_mut()[3] = streamfft::Complex32::new(4.0, 5.0);
        let set = set.resize(&device, 1024).unwrap();
        assert_eq!(set.scratch()[3], streamfft::Complex32::new(4.0, 5.0));
        assert_eq!(set.capacity(), 1024);
        set.destroy();
    }
}

#[tokio::test]
async fn test_gpu_plan_rejects_non_power_of_two() {
    if let Some(device) = create_gpu_device().await {
        assert!(device.create_plan(1000).is_err());
        assert!(device.create_plan(1024).is_ok());
    }
}

#[tokio::test]
async fn test_gpu_plan_runs_only_once_bound() {
    if let Some(device) = create_gpu_device().await {
        let mut buffer = device.create_buffer(64).unwrap();
        let mut plan = device.create_plan(64).unwrap();
        assert!(!plan.is_bound());
        assert!(device
            .execute(&mut plan, &mut buffer, Direction::Forward)
            .is_err());

        device.bind(&mut plan, &buffer).unwrap();
        assert!(plan.is_bound());
        let input = vec![streamfft::Complex32::new(1.0, 0.0); 64];
        device.write(&mut buffer, &input).unwrap();
        // Repeated blocks reuse the same binding
        for direction in [Direction::Forward, Direction::Inverse] {
            device.execute(&mut plan, &mut buffer, direction).unwrap();
        }
        let mut output = vec![streamfft::Complex32::default(); 64];
        device.read(&buffer, &mut output).unwrap();
        // Unscaled inverse of the forward transform: 64 times the input
        for point in &output {
            assert!((point.re - 64.0).abs() < 1e-2 && point.im.abs() < 1e-2);
        }

        let small = device.create_buffer(32).unwrap();
        assert!(device.bind(&mut plan, &small).is_err());
    }
}

#[test]
fn test_gpu_engine_or_silence() {
    let (mut engine, control) = StreamFftBuilder::new()
        .size(4096)
        .device(DeviceClass::Gpu)
        .build(GpuProvider::new())
        .unwrap();

    let ready = engine.on_block_boundary();
    assert_eq!(ready, control.status().ready);

    let mut time = impulse(4096, 0);
    let mut freq = vec![5.0f32; 8192];
    let status = engine.process(&mut time, &mut freq);
    if ready {
        assert_eq!(status, BlockStatus::Processed);
        assert!((freq[0] - 1.0).abs() < 1e-3);
    } else {
        // No GPU on this machine: the block must come out silent
        assert_eq!(status, BlockStatus::NoDevice);
        assert_all_zero(&freq);
    }
}
