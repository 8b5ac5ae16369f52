//! GPU device sessions on wgpu.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_complex::Complex32;
use wgpu::{Adapter, Device, DeviceType, Instance, Queue};

use super::compute::{FftKernels, GpuBuffer, GpuPlan, COMPLEX_BYTES};
use crate::bridge::Direction;
use crate::buffers::BufferError;
use crate::device::{
    ComputeDevice, DeviceClass, DeviceError, DeviceInfo, DeviceProvider, SubmissionError,
};
use crate::diagnostics::Diagnostics;

/// Acquires wgpu devices by class.
///
/// `Gpu` asks for a high-performance hardware adapter, `Cpu` for the
/// software fallback adapter and `Accelerator` for an adapter of unknown
/// type. `Default` and `All` accept whatever adapter the instance offers.
pub struct GpuProvider {
    instance: Instance,
}

impl Default for GpuProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuProvider {
    /// Prefers Metal on macOS, falls back to other backends.
    pub fn new() -> Self {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        });
        Self { instance }
    }

    pub async fn acquire_async(
        &self,
        class: DeviceClass,
        diagnostics: &Diagnostics,
    ) -> Result<GpuDevice, DeviceError> {
        let adapter = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: match class {
                    DeviceClass::Cpu => wgpu::PowerPreference::LowPower,
                    _ => wgpu::PowerPreference::HighPerformance,
                },
                force_fallback_adapter: class == DeviceClass::Cpu,
                compatible_surface: None,
            })
            .await
            .map_err(|_| DeviceError::Unavailable(class))?;

        let info = adapter.get_info();
        if !class_accepts(class, info.device_type) {
            log::debug!(
                "Adapter '{}' ({:?}) does not match class {}",
                info.name,
                info.device_type,
                class
            );
            return Err(DeviceError::Unavailable(class));
        }

        GpuDevice::open(adapter, diagnostics).await
    }
}

impl DeviceProvider for GpuProvider {
    type Device = GpuDevice;

    fn acquire(
        &mut self,
        class: DeviceClass,
        diagnostics: &Diagnostics,
    ) -> Result<GpuDevice, DeviceError> {
        pollster::block_on(self.acquire_async(class, diagnostics))
    }
}

/// `Accelerator` is a class of its own here: it matches adapters of type
/// `Other` rather than falling back to `Default`.
fn class_accepts(class: DeviceClass, device_type: DeviceType) -> bool {
    match class {
        DeviceClass::Default | DeviceClass::All => true,
        DeviceClass::Cpu => device_type == DeviceType::Cpu,
        DeviceClass::Gpu => matches!(
            device_type,
            DeviceType::DiscreteGpu | DeviceType::IntegratedGpu | DeviceType::VirtualGpu
        ),
        DeviceClass::Accelerator => device_type == DeviceType::Other,
    }
}

/// A wgpu device and its queue, with the FFT kernels compiled for it.
///
/// Validation and out-of-memory errors raised by wgpu outside a call are
/// reported to the diagnostics sink and turn the next operation into an
/// error.
pub struct GpuDevice {
    info: DeviceInfo,
    kernels: FftKernels,
    device: Device,
    queue: Queue,
    fault: Arc<AtomicBool>,
}

impl GpuDevice {
    async fn open(adapter: Adapter, diagnostics: &Diagnostics) -> Result<Self, DeviceError> {
        let adapter_info = adapter.get_info();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("streamfft"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await
            .map_err(|e| DeviceError::ContextFailed(e.to_string()))?;

        let fault = Arc::new(AtomicBool::new(false));
        let flag = fault.clone();
        let sink = diagnostics.clone();
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            flag.store(true, Ordering::Release);
            sink.error(&format!("GPU error: {}", error));
        }));

        let kernels = FftKernels::new(&device);

        Ok(Self {
            info: DeviceInfo {
                name: adapter_info.name.clone(),
                backend: format!("{:?}", adapter_info.backend).to_lowercase(),
                kind: format!("{:?}", adapter_info.device_type).to_lowercase(),
                memory_bytes: limits.max_buffer_size,
            },
            kernels,
            device,
            queue,
            fault,
        })
    }

    fn wait(&self) -> Result<(), String> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn guarded<T, E>(
        &self,
        op: impl FnOnce() -> Result<T, E>,
        faulted: impl FnOnce() -> E,
    ) -> Result<T, E> {
        guarded(&self.fault, op, faulted)
    }
}

/// Run `op` and fail if `fault` was raised while it ran. A fault left over
/// from before the call is discarded.
fn guarded<T, E>(
    fault: &AtomicBool,
    op: impl FnOnce() -> Result<T, E>,
    faulted: impl FnOnce() -> E,
) -> Result<T, E> {
    fault.store(false, Ordering::Release);
    let value = op()?;
    if fault.swap(false, Ordering::AcqRel) {
        return Err(faulted());
    }
    Ok(value)
}

impl ComputeDevice for GpuDevice {
    type Buffer = GpuBuffer;
    type Plan = GpuPlan;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, len: usize) -> Result<GpuBuffer, BufferError> {
        self.guarded(
            || GpuBuffer::new(&self.device, len),
            || BufferError::AllocationFailed(format!("device rejected {} points", len)),
        )
    }

    fn create_plan(&self, len: usize) -> Result<GpuPlan, BufferError> {
        self.guarded(
            || GpuPlan::new(&self.device, len),
            || BufferError::PlanFailed(format!("device rejected a {}-point plan", len)),
        )
    }

    fn bind(&self, plan: &mut GpuPlan, buffer: &GpuBuffer) -> Result<(), BufferError> {
        if plan.len() > buffer.len() {
            return Err(BufferError::PlanFailed(format!(
                "plan of {} points exceeds a buffer of {}",
                plan.len(),
                buffer.len()
            )));
        }
        let len = plan.len();
        self.guarded(
            || {
                plan.bind(&self.device, &self.kernels, buffer);
                Ok(())
            },
            || BufferError::PlanFailed(format!("device rejected binding a {}-point plan", len)),
        )
    }

    fn write(&self, buffer: &mut GpuBuffer, host: &[Complex32]) -> Result<(), SubmissionError> {
        if host.len() > buffer.len() {
            return Err(SubmissionError::Write(format!(
                "{} points do not fit a buffer of {}",
                host.len(),
                buffer.len()
            )));
        }
        self.guarded(
            || {
                self.queue
                    .write_buffer(&buffer.storage, 0, bytemuck::cast_slice(host));
                self.queue.submit(std::iter::empty());
                self.wait().map_err(SubmissionError::Write)
            },
            || SubmissionError::Write("device reported an error".to_string()),
        )
    }

    fn execute(
        &self,
        plan: &mut GpuPlan,
        buffer: &mut GpuBuffer,
        direction: Direction,
    ) -> Result<(), SubmissionError> {
        if plan.len() > buffer.len() {
            return Err(SubmissionError::Compute(format!(
                "plan of {} points exceeds a buffer of {}",
                plan.len(),
                buffer.len()
            )));
        }
        self.guarded(
            || {
                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("fft_encoder"),
                        });
                if !plan.encode(&self.kernels, &mut encoder, direction) {
                    return Err(SubmissionError::Compute(
                        "plan is not bound to a buffer".to_string(),
                    ));
                }
                self.queue.submit(Some(encoder.finish()));
                self.wait().map_err(SubmissionError::Compute)
            },
            || SubmissionError::Compute("device reported an error".to_string()),
        )
    }

    fn read(&self, buffer: &GpuBuffer, host: &mut [Complex32]) -> Result<(), SubmissionError> {
        if host.len() > buffer.len() {
            return Err(SubmissionError::Read(format!(
                "{} points requested from a buffer of {}",
                host.len(),
                buffer.len()
            )));
        }
        if host.is_empty() {
            return Ok(());
        }
        self.guarded(
            || -> Result<(), SubmissionError> {
                let size = host.len() as u64 * COMPLEX_BYTES;
                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("fft_readback_encoder"),
                        });
                encoder.copy_buffer_to_buffer(&buffer.storage, 0, &buffer.staging, 0, size);
                self.queue.submit(Some(encoder.finish()));

                let slice = buffer.staging.slice(..size);
                let (tx, rx) = std::sync::mpsc::channel();
                slice.map_async(wgpu::MapMode::Read, move |r| {
                    let _ = tx.send(r);
                });
                self.wait().map_err(SubmissionError::Read)?;

                rx.recv()
                    .map_err(|e| SubmissionError::Read(e.to_string()))?
                    .map_err(|e| SubmissionError::Read(format!("{:?}", e)))?;

                let data = slice.get_mapped_range();
                host.copy_from_slice(bytemuck::cast_slice(&data));
                drop(data);
                buffer.staging.unmap();
                Ok(())
            },
            || SubmissionError::Read("device reported an error".to_string()),
        )
    }
}
