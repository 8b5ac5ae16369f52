//! Control path: configuration requests and published engine status.
//!
//! The configuration thread owns a [`ControlHandle`] and pushes immutable
//! [`ConfigRequest`]s into a lock-free single-producer queue. The engine
//! drains the queue once per block boundary into a [`PendingChange`], so a
//! request made while a block is in flight is never observed before the
//! next boundary. Status flows the other way through atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;

use crate::bridge::Direction;
use crate::buffers::{coerce_pow2, MAX_TRANSFORM_LENGTH};
use crate::device::DeviceClass;
use crate::diagnostics::Diagnostics;

/// Who asked for a transform length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthOrigin {
    /// Explicit size setting.
    User,
    /// Derived from the host's block vector sizes.
    Host,
}

/// A coerced transform length request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthRequest {
    pub length: u32,
    pub origin: LengthOrigin,
}

/// One configuration request from the control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRequest {
    Device(DeviceClass),
    Length(LengthRequest),
}

/// Device and length changes waiting for the next block boundary.
///
/// At most one change of each kind is outstanding; a later request of the
/// same kind replaces the earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingChange {
    pub device: Option<DeviceClass>,
    pub length: Option<LengthRequest>,
}

impl PendingChange {
    pub fn push(&mut self, request: ConfigRequest) {
        match request {
            ConfigRequest::Device(class) => self.device = Some(class),
            ConfigRequest::Length(length) => self.length = Some(length),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.device.is_none() && self.length.is_none()
    }

    /// Collapse everything currently queued into one change.
    pub fn drain(requests: &mut Consumer<ConfigRequest>) -> Self {
        let mut pending = Self::default();
        while let Ok(request) = requests.pop() {
            pending.push(request);
        }
        pending
    }
}

/// Errors returned to the configuration thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Configuration queue is full; request dropped")]
    QueueFull,
    #[error("Transform length {0} exceeds the largest supported power of two")]
    LengthOutOfRange(u64),
}

/// Snapshot of the engine state readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub direction: Direction,
    /// Current transform length L.
    pub length: u32,
    pub device: DeviceClass,
    pub ready: bool,
    /// Length reported back to the host by an inverse engine.
    pub reported_size: Option<u32>,
    /// Blocks silenced by device submission failures.
    pub silenced_blocks: u64,
}

impl EngineStatus {
    /// Interleaved frequency-domain vector length that holds all L points.
    pub fn required_freq_len(&self) -> usize {
        self.length as usize * 2
    }
}

/// Status shared between the engine and its control handle.
#[derive(Debug)]
pub(crate) struct SharedStatus {
    direction: Direction,
    length: AtomicU32,
    device: AtomicU8,
    ready: AtomicBool,
    reported_size: AtomicU32,
    silenced_blocks: AtomicU64,
}

impl SharedStatus {
    pub(crate) fn new(direction: Direction, length: u32, device: DeviceClass) -> Self {
        Self {
            direction,
            length: AtomicU32::new(length),
            device: AtomicU8::new(device.index()),
            ready: AtomicBool::new(false),
            reported_size: AtomicU32::new(0),
            silenced_blocks: AtomicU64::new(0),
        }
    }

    pub(crate) fn publish(&self, length: u32, device: DeviceClass, ready: bool) {
        self.length.store(length, Ordering::Relaxed);
        self.device.store(device.index(), Ordering::Relaxed);
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) fn report_size(&self, length: u32) {
        self.reported_size.store(length, Ordering::Relaxed);
    }

    pub(crate) fn count_silenced(&self) {
        self.silenced_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStatus {
        let device = DeviceClass::from_index(self.device.load(Ordering::Relaxed) as i64)
            .unwrap_or_default();
        let reported = self.reported_size.load(Ordering::Relaxed);
        EngineStatus {
            direction: self.direction,
            length: self.length.load(Ordering::Relaxed),
            device,
            ready: self.ready.load(Ordering::Acquire),
            reported_size: (reported != 0).then_some(reported),
            silenced_blocks: self.silenced_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Configuration-thread side of an engine.
pub struct ControlHandle {
    requests: Producer<ConfigRequest>,
    diagnostics: Diagnostics,
    status: Arc<SharedStatus>,
}

impl ControlHandle {
    pub(crate) fn channel(
        capacity: usize,
        diagnostics: Diagnostics,
        status: Arc<SharedStatus>,
    ) -> (Self, Consumer<ConfigRequest>) {
        let (requests, consumer) = RingBuffer::new(capacity);
        (
            Self {
                requests,
                diagnostics,
                status,
            },
            consumer,
        )
    }

    /// Request a device class; applied at the next block boundary.
    pub fn configure_device(&mut self, class: DeviceClass) -> Result<(), ControlError> {
        self.send(ConfigRequest::Device(class))
    }

    /// Request a device class by host enum index (0..=4). Unknown indices
    /// fall back to [`DeviceClass::Default`].
    pub fn configure_device_index(&mut self, index: i64) -> Result<(), ControlError> {
        let class = DeviceClass::from_index(index).unwrap_or_else(|| {
            self.diagnostics.error(&format!(
                "Unknown device type {}; using the default device",
                index
            ));
            DeviceClass::Default
        });
        self.configure_device(class)
    }

    /// Request a transform length, coerced up to a power of two.
    pub fn configure_size(&mut self, requested: u32) -> Result<(), ControlError> {
        let length = self.coerce(requested as u64)?;
        self.send(ConfigRequest::Length(LengthRequest {
            length,
            origin: LengthOrigin::User,
        }))
    }

    /// Derive the transform length from the host's vector sizes and request
    /// it. Returns the coerced length.
    pub fn negotiate_block(&mut self, time_len: usize, freq_len: usize) -> Result<u32, ControlError> {
        let direction = self.status.direction;
        let required = direction.required_length(time_len, freq_len) as u64;
        let length = self.coerce(required)?;
        self.send(ConfigRequest::Length(LengthRequest {
            length,
            origin: LengthOrigin::Host,
        }))?;
        Ok(length)
    }

    pub fn status(&self) -> EngineStatus {
        self.status.snapshot()
    }

    fn coerce(&self, requested: u64) -> Result<u32, ControlError> {
        let length = u32::try_from(requested)
            .ok()
            .and_then(coerce_pow2)
            .ok_or_else(|| {
                self.diagnostics.error(&format!(
                    "Transform length {} is above the maximum of {}",
                    requested, MAX_TRANSFORM_LENGTH
                ));
                ControlError::LengthOutOfRange(requested)
            })?;
        if length as u64 != requested {
            self.diagnostics
                .notice(&format!("setting to the next power of two: {}", length));
        }
        Ok(length)
    }

    fn send(&mut self, request: ConfigRequest) -> Result<(), ControlError> {
        self.requests.push(request).map_err(|_| {
            log::warn!("Dropping {:?}: configuration queue is full", request);
            ControlError::QueueFull
        })
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("status", &self.status.snapshot())
            .finish()
    }
}
