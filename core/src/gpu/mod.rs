//! wgpu compute backend.
//!
//! Runs the transform as WGSL compute shaders on whatever adapter wgpu
//! finds for the requested device class.

pub mod compute;
pub mod context;

pub use compute::{GpuBuffer, GpuPlan};
pub use context::{GpuDevice, GpuProvider};
