//! Device-side storage for transform data.

use num_complex::Complex32;
use wgpu::{Buffer, BufferUsages, Device};

use crate::buffers::BufferError;

pub(crate) const COMPLEX_BYTES: u64 = std::mem::size_of::<Complex32>() as u64;

/// Storage buffer the shader transforms in place, plus the mappable
/// staging buffer results are read back through.
pub struct GpuBuffer {
    pub(crate) storage: Buffer,
    pub(crate) staging: Buffer,
    len: usize,
}

impl GpuBuffer {
    pub(crate) fn new(device: &Device, len: usize) -> Result<Self, BufferError> {
        let size = len as u64 * COMPLEX_BYTES;
        let limits = device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if size == 0 || size > max {
            return Err(BufferError::AllocationFailed(format!(
                "{} bytes is outside the device's 1..={} byte buffer range",
                size, max
            )));
        }

        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fft_storage"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fft_staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            storage,
            staging,
            len,
        })
    }

    /// Capacity in complex points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.staging.destroy();
        self.storage.destroy();
    }
}
