//! wgpu compute resources for the radix-2 transform.

mod buffers;
mod params;
mod pipelines;
mod plan;

pub use buffers::GpuBuffer;
pub use params::FftParams;
pub use plan::GpuPlan;

pub(crate) use buffers::COMPLEX_BYTES;
pub(crate) use pipelines::FftKernels;
