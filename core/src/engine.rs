//! The streaming transform engine.
//!
//! [`StreamFft`] owns the device session and buffer set and is driven by the
//! audio thread: [`StreamFft::on_block_boundary`] applies queued
//! configuration, [`StreamFft::process`] transforms one block. The matching
//! [`ControlHandle`] is handed to the configuration thread.

use std::sync::Arc;

use rtrb::Consumer;

use crate::bridge::{process_block, BlockBuffers, Direction};
use crate::buffers::{BufferError, TransformBufferSet};
use crate::config::{ConfigError, EngineConfig};
use crate::control::{
    ConfigRequest, ControlHandle, EngineStatus, LengthOrigin, LengthRequest, PendingChange,
    SharedStatus,
};
use crate::device::{DeviceClass, DeviceProvider, DeviceSession};
use crate::diagnostics::Diagnostics;

/// Outcome of one [`StreamFft::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// The block went through the device.
    Processed,
    /// A device submission failed; the output was zeroed.
    Silenced,
    /// No valid device; the output was zeroed.
    NoDevice,
}

/// Builder for [`StreamFft`].
#[derive(Debug, Clone)]
pub struct StreamFftBuilder {
    config: EngineConfig,
    diagnostics: Diagnostics,
}

impl Default for StreamFftBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFftBuilder {
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::silent(),
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.config.direction = direction;
        self
    }

    /// Initial transform length; coerced up to a power of two.
    pub fn size(mut self, size: u32) -> Self {
        self.config.size = size;
        self
    }

    /// Device class requested at the first block boundary.
    pub fn device(mut self, class: DeviceClass) -> Self {
        self.config.device = class;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Create the engine and its control handle on top of `provider`.
    ///
    /// No device is acquired here; the configured device is requested for
    /// the first block boundary.
    pub fn build<P: DeviceProvider>(
        self,
        provider: P,
    ) -> Result<(StreamFft<P>, ControlHandle), ConfigError> {
        let Self {
            mut config,
            diagnostics,
        } = self;
        let requested = config.size;
        config.validate()?;
        if config.size != requested {
            diagnostics.notice(&format!("setting to the next power of two: {}", config.size));
        }

        let status = Arc::new(SharedStatus::new(
            config.direction,
            config.size,
            config.device,
        ));
        let (mut control, requests) =
            ControlHandle::channel(config.queue_capacity, diagnostics.clone(), status.clone());
        control
            .configure_device(config.device)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        log::info!(
            "Created {} engine: {} points, {} device requested",
            config.direction.name(),
            config.size,
            config.device
        );

        let engine = StreamFft {
            provider,
            direction: config.direction,
            diagnostics,
            requests,
            class: config.device,
            length: config.size as usize,
            set: None,
            session: None,
            status,
        };
        Ok((engine, control))
    }
}

/// Streaming power-of-two FFT on a compute device.
pub struct StreamFft<P: DeviceProvider> {
    provider: P,
    direction: Direction,
    diagnostics: Diagnostics,
    requests: Consumer<ConfigRequest>,
    class: DeviceClass,
    length: usize,
    set: Option<TransformBufferSet<P::Device>>,
    session: Option<DeviceSession<P::Device>>,
    status: Arc<SharedStatus>,
}

impl<P: DeviceProvider> StreamFft<P> {
    /// Apply configuration requested since the previous boundary.
    ///
    /// Must be called between blocks, never concurrently with
    /// [`process`](Self::process). Returns whether a device is ready.
    pub fn on_block_boundary(&mut self) -> bool {
        let pending = PendingChange::drain(&mut self.requests);
        if !pending.is_empty() {
            self.apply(pending);
        }
        self.is_ready()
    }

    /// Transform one block. Forward engines read `time` and write `freq`;
    /// inverse engines read `freq` and write `time`.
    ///
    /// Never fails: without a ready device, or when a device submission
    /// fails, the output vector is zeroed.
    pub fn process(&mut self, time: &mut [f32], freq: &mut [f32]) -> BlockStatus {
        let mut block = BlockBuffers::new(time, freq);
        let (Some(session), Some(set)) = (&self.session, &mut self.set) else {
            block.silence(self.direction);
            return BlockStatus::NoDevice;
        };

        match process_block(self.direction, session.device(), set, block) {
            Ok(()) => BlockStatus::Processed,
            Err(e) => {
                self.status.count_silenced();
                log::warn!("Silenced block: {}", e);
                BlockStatus::Silenced
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status.snapshot()
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some() && self.set.is_some()
    }

    /// Current transform length L.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Most recently requested device class.
    pub fn device_class(&self) -> DeviceClass {
        self.class
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The device session, if one is installed.
    pub fn session(&self) -> Option<&DeviceSession<P::Device>> {
        self.session.as_ref()
    }

    /// The buffer set, if one is built.
    pub fn buffer_set(&self) -> Option<&TransformBufferSet<P::Device>> {
        self.set.as_ref()
    }

    /// Destroy the buffer set, then release the session.
    pub fn shutdown(&mut self) {
        if self.session.is_some() || self.set.is_some() {
            log::info!("Shutting down {} engine", self.direction.name());
        }
        self.teardown();
        self.publish();
    }

    fn apply(&mut self, pending: PendingChange) {
        if let Some(request) = pending.length {
            self.record_length(request);
        }

        match pending.device {
            Some(class) if !(self.is_ready() && class == self.class) => self.change_device(class),
            Some(class) => {
                log::debug!("Already running on a {} device", class);
                self.fit_length();
            }
            None => self.fit_length(),
        }
        self.publish();
    }

    fn record_length(&mut self, request: LengthRequest) {
        self.length = request.length as usize;
        if request.origin == LengthOrigin::Host && self.direction == Direction::Inverse {
            log::info!("Reporting buffer size {} back to the host", request.length);
            self.status.report_size(request.length);
        }
    }

    fn change_device(&mut self, class: DeviceClass) {
        self.class = class;
        let acquired = DeviceSession::acquire(&mut self.provider, class, &self.diagnostics);
        self.teardown();

        let session = match acquired {
            Ok(session) => session,
            Err(e) => {
                self.diagnostics
                    .error(&format!("Could not acquire a {} device: {}", class, e));
                return;
            }
        };

        match TransformBufferSet::build(session.device(), self.length) {
            Ok(set) => {
                self.set = Some(set);
                self.session = Some(session);
            }
            Err(e) => {
                session.release();
                self.diagnostics.error(&format!(
                    "Could not build {}-point buffers on the {} device: {}",
                    self.length, class, e
                ));
            }
        }
    }

    /// Bring an existing buffer set to the current length.
    fn fit_length(&mut self) {
        let length = self.length;
        let result = match (&self.session, self.set.take()) {
            (Some(session), Some(set)) => Self::refit(session, set, length),
            (session, set) => {
                self.set = set;
                if session.is_none() {
                    log::debug!("No device; length {} kept for the next build", length);
                }
                return;
            }
        };

        match result {
            Ok(set) => self.set = Some(set),
            Err(e) => {
                self.teardown();
                self.diagnostics.error(&format!(
                    "Could not resize buffers to {} points: {}",
                    length, e
                ));
            }
        }
    }

    fn refit(
        session: &DeviceSession<P::Device>,
        mut set: TransformBufferSet<P::Device>,
        length: usize,
    ) -> Result<TransformBufferSet<P::Device>, BufferError> {
        if length > set.capacity() {
            return set.resize(session.device(), length);
        }
        match set.set_logical_length(session.device(), length) {
            Ok(()) => Ok(set),
            Err(e) => {
                set.destroy();
                Err(e)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(set) = self.set.take() {
            set.destroy();
        }
        if let Some(session) = self.session.take() {
            session.release();
        }
    }

    fn publish(&self) {
        let length = u32::try_from(self.length).unwrap_or(u32::MAX);
        self.status.publish(length, self.class, self.is_ready());
    }
}

impl<P: DeviceProvider> Drop for StreamFft<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
