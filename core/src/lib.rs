//! StreamFFT Core
//!
//! Power-of-two FFT on fixed-size real-time audio blocks, offloaded to a
//! compute device.
//!
//! # Features
//!
//! - GPU transform via wgpu compute shaders (Metal on macOS, Vulkan on Linux)
//! - RustFFT host backend for machines without a usable adapter
//! - Device and size changes queued from any thread, applied between blocks
//! - Zeroed output instead of stalls when a device operation fails

pub mod bridge;
pub mod buffers;
pub mod config;
pub mod control;
pub mod device;
pub mod diagnostics;
pub mod engine;
pub mod gpu;
pub mod synth;

// Re-export commonly used types
pub use bridge::{process_block, BlockBuffers, Direction};
pub use buffers::{coerce_pow2, BufferError, SharedBuffer, TransformBufferSet};
pub use config::{ConfigError, EngineConfig};
pub use control::{ControlError, ControlHandle, EngineStatus};
pub use device::{
    ComputeDevice, DeviceClass, DeviceError, DeviceInfo, DeviceProvider, DeviceSession,
    HostDevice, HostProvider, SubmissionError,
};
pub use diagnostics::{Diagnostics, Severity};
pub use engine::{BlockStatus, StreamFft, StreamFftBuilder};
pub use gpu::{GpuDevice, GpuProvider};
pub use num_complex::Complex32;
