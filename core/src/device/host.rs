//! Host compute device backed by RustFFT.
//!
//! Serves the `Default`, `Cpu` and `All` device classes on machines without
//! a usable GPU and acts as the numerical reference for the GPU backend.
//! "Device" buffers are plain host allocations.

use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use super::{ComputeDevice, DeviceClass, DeviceError, DeviceInfo, DeviceProvider, SubmissionError};
use crate::bridge::Direction;
use crate::buffers::BufferError;
use crate::diagnostics::Diagnostics;

const COMPLEX_BYTES: u64 = std::mem::size_of::<Complex32>() as u64;

/// Provider for [`HostDevice`]s.
#[derive(Debug, Clone, Default)]
pub struct HostProvider {
    memory_limit: Option<u64>,
}

impl HostProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse single allocations larger than `bytes`.
    pub fn with_memory_limit(bytes: u64) -> Self {
        Self {
            memory_limit: Some(bytes),
        }
    }
}

impl DeviceProvider for HostProvider {
    type Device = HostDevice;

    fn acquire(
        &mut self,
        class: DeviceClass,
        _diagnostics: &Diagnostics,
    ) -> Result<HostDevice, DeviceError> {
        match class {
            DeviceClass::Default | DeviceClass::Cpu | DeviceClass::All => {
                Ok(HostDevice::new(self.memory_limit))
            }
            DeviceClass::Gpu | DeviceClass::Accelerator => Err(DeviceError::Unavailable(class)),
        }
    }
}

/// In-process compute device.
pub struct HostDevice {
    info: DeviceInfo,
    memory_limit: u64,
}

/// Host-side storage standing in for device memory.
pub struct HostBuffer {
    data: Vec<Complex32>,
}

impl HostBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Forward and inverse RustFFT plans for one length, with their scratch.
pub struct HostPlan {
    len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl HostPlan {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl HostDevice {
    fn new(memory_limit: Option<u64>) -> Self {
        let memory_limit = memory_limit.unwrap_or(isize::MAX as u64);
        Self {
            info: DeviceInfo {
                name: "RustFFT host".to_string(),
                backend: "host".to_string(),
                kind: "cpu".to_string(),
                memory_bytes: memory_limit,
            },
            memory_limit,
        }
    }

    fn alloc(&self, len: usize) -> Result<Vec<Complex32>, String> {
        let bytes = len as u64 * COMPLEX_BYTES;
        if bytes > self.memory_limit {
            return Err(format!(
                "{} bytes exceeds the device limit of {} bytes",
                bytes, self.memory_limit
            ));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| e.to_string())?;
        data.resize(len, Complex32::default());
        Ok(data)
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;
    type Plan = HostPlan;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, len: usize) -> Result<HostBuffer, BufferError> {
        Ok(HostBuffer {
            data: self.alloc(len).map_err(BufferError::AllocationFailed)?,
        })
    }

    fn create_plan(&self, len: usize) -> Result<HostPlan, BufferError> {
        if !len.is_power_of_two() {
            return Err(BufferError::PlanFailed(format!(
                "transform length must be a power of 2, got {}",
                len
            )));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let scratch = self
            .alloc(scratch_len)
            .map_err(|e| BufferError::PlanFailed(format!("plan scratch: {}", e)))?;

        Ok(HostPlan {
            len,
            forward,
            inverse,
            scratch,
        })
    }

    fn write(&self, buffer: &mut HostBuffer, host: &[Complex32]) -> Result<(), SubmissionError> {
        let capacity = buffer.len();
        let dst = buffer.data.get_mut(..host.len()).ok_or_else(|| {
            SubmissionError::Write(format!(
                "{} points do not fit a buffer of {}",
                host.len(),
                capacity
            ))
        })?;
        dst.copy_from_slice(host);
        Ok(())
    }

    fn execute(
        &self,
        plan: &mut HostPlan,
        buffer: &mut HostBuffer,
        direction: Direction,
    ) -> Result<(), SubmissionError> {
        let len = plan.len;
        let capacity = buffer.len();
        let data = buffer.data.get_mut(..len).ok_or_else(|| {
            SubmissionError::Compute(format!(
                "plan of {} points exceeds a buffer of {}",
                len, capacity
            ))
        })?;
        let fft = match direction {
            Direction::Forward => &plan.forward,
            Direction::Inverse => &plan.inverse,
        };
        fft.process_with_scratch(data, &mut plan.scratch);
        Ok(())
    }

    fn read(&self, buffer: &HostBuffer, host: &mut [Complex32]) -> Result<(), SubmissionError> {
        let src = buffer.data.get(..host.len()).ok_or_else(|| {
            SubmissionError::Read(format!(
                "{} points requested from a buffer of {}",
                host.len(),
                buffer.len()
            ))
        })?;
        host.copy_from_slice(src);
        Ok(())
    }
}
