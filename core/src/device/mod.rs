//! Compute device selection and the backend seam.
//!
//! A [`DeviceProvider`] turns a [`DeviceClass`] request into a
//! [`ComputeDevice`]: an object owning a context and an in-order queue that
//! can allocate device buffers, compile transform plans and run blocking
//! write / execute / read submissions. Two backends ship with the crate:
//! the wgpu backend in [`crate::gpu`] and the rustfft host backend in
//! [`host`].

pub mod host;

use std::fmt;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::bridge::Direction;
use crate::buffers::BufferError;
use crate::diagnostics::Diagnostics;

pub use host::{HostDevice, HostProvider};

/// Coarse category of compute device used to pick among available devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Default,
    Cpu,
    Gpu,
    Accelerator,
    All,
}

impl DeviceClass {
    /// Map a host-side enum index (0..=4) to a device class.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(DeviceClass::Default),
            1 => Some(DeviceClass::Cpu),
            2 => Some(DeviceClass::Gpu),
            3 => Some(DeviceClass::Accelerator),
            4 => Some(DeviceClass::All),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            DeviceClass::Default => 0,
            DeviceClass::Cpu => 1,
            DeviceClass::Gpu => 2,
            DeviceClass::Accelerator => 3,
            DeviceClass::All => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceClass::Default => "default",
            DeviceClass::Cpu => "cpu",
            DeviceClass::Gpu => "gpu",
            DeviceClass::Accelerator => "accelerator",
            DeviceClass::All => "all",
        }
    }

    pub fn all() -> &'static [DeviceClass] {
        &[
            DeviceClass::Default,
            DeviceClass::Cpu,
            DeviceClass::Gpu,
            DeviceClass::Accelerator,
            DeviceClass::All,
        ]
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of an acquired device, for diagnostics and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: String,
    pub kind: String,
    /// Largest allocation the device reports it can address, in bytes.
    /// Informational only; not enforced as a hard limit by the engine.
    pub memory_bytes: u64,
}

/// Errors raised while acquiring a device session.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No compute device available for class '{0}'")]
    Unavailable(DeviceClass),
    #[error("Failed to create compute context: {0}")]
    ContextFailed(String),
}

/// A device queue operation failed while processing a block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Device write failed: {0}")]
    Write(String),
    #[error("Transform execution failed: {0}")]
    Compute(String),
    #[error("Device read failed: {0}")]
    Read(String),
}

/// A device with its context and in-order command queue.
///
/// Every submission method blocks until the device has finished the
/// operation. Dropping the device releases context and queue together.
pub trait ComputeDevice: Send {
    /// Device-side storage for `len` complex points.
    type Buffer: Send;
    /// Transform plan compiled for one length.
    type Plan: Send;

    fn info(&self) -> &DeviceInfo;

    fn create_buffer(&self, len: usize) -> Result<Self::Buffer, BufferError>;

    fn create_plan(&self, len: usize) -> Result<Self::Plan, BufferError>;

    /// Attach `plan` to the buffer it will transform. Called whenever a
    /// plan or buffer is replaced, before the pair is executed.
    fn bind(&self, _plan: &mut Self::Plan, _buffer: &Self::Buffer) -> Result<(), BufferError> {
        Ok(())
    }

    /// Copy `host` into the first `host.len()` points of `buffer`.
    fn write(&self, buffer: &mut Self::Buffer, host: &[Complex32]) -> Result<(), SubmissionError>;

    /// Transform the first `plan` length points of `buffer` in place.
    fn execute(
        &self,
        plan: &mut Self::Plan,
        buffer: &mut Self::Buffer,
        direction: Direction,
    ) -> Result<(), SubmissionError>;

    /// Copy the first `host.len()` points of `buffer` back into `host`.
    fn read(&self, buffer: &Self::Buffer, host: &mut [Complex32]) -> Result<(), SubmissionError>;
}

/// Source of compute devices.
pub trait DeviceProvider: Send {
    type Device: ComputeDevice;

    /// Acquire one device matching `class`. Errors raised by the device
    /// after creation are reported through `diagnostics`.
    fn acquire(
        &mut self,
        class: DeviceClass,
        diagnostics: &Diagnostics,
    ) -> Result<Self::Device, DeviceError>;
}

/// An acquired device together with the class it was requested for.
///
/// Context and queue live inside the device object, so a session is either
/// complete or absent; there is no partially torn down state.
pub struct DeviceSession<D: ComputeDevice> {
    class: DeviceClass,
    device: D,
}

impl<D: ComputeDevice> DeviceSession<D> {
    pub fn acquire<P>(
        provider: &mut P,
        class: DeviceClass,
        diagnostics: &Diagnostics,
    ) -> Result<Self, DeviceError>
    where
        P: DeviceProvider<Device = D>,
    {
        let device = provider.acquire(class, diagnostics)?;
        let info = device.info();
        log::info!(
            "Acquired {} device '{}' ({}, {} backend, {} bytes addressable)",
            class,
            info.name,
            info.kind,
            info.backend,
            info.memory_bytes
        );
        Ok(Self { class, device })
    }

    /// Release queue and context. Buffer sets built on this session must
    /// already be destroyed.
    pub fn release(self) {
        log::debug!(
            "Releasing {} device '{}'",
            self.class,
            self.device.info().name
        );
        drop(self.device);
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }
}
