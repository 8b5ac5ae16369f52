//! Shared test tooling: a host provider that counts live resources and can
//! be told to fail.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use streamfft::device::host::{HostBuffer, HostPlan};
use streamfft::{
    BufferError, Complex32, ComputeDevice, DeviceClass, DeviceError, DeviceInfo, DeviceProvider,
    Diagnostics, Direction, HostDevice, HostProvider, Severity, SubmissionError,
};

/// Live-resource counters and fault switches shared with a [`CountingProvider`].
#[derive(Debug, Default)]
pub struct Counters {
    pub live_devices: AtomicIsize,
    pub live_buffers: AtomicIsize,
    pub live_plans: AtomicIsize,
    pub buffers_created: AtomicUsize,
    pub plans_created: AtomicUsize,
    pub acquisitions: AtomicUsize,
    /// Number of upcoming `execute` calls that fail.
    pub failing_submissions: AtomicUsize,
    /// Fail the next `create_buffer`.
    pub fail_next_buffer: AtomicBool,
}

impl Counters {
    pub fn live(&self) -> (isize, isize, isize) {
        (
            self.live_devices.load(Ordering::SeqCst),
            self.live_buffers.load(Ordering::SeqCst),
            self.live_plans.load(Ordering::SeqCst),
        )
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn fail_submissions(&self, count: usize) {
        self.failing_submissions.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_buffer(&self) {
        self.fail_next_buffer.store(true, Ordering::SeqCst);
    }
}

/// Wraps [`HostProvider`] and tracks every device, buffer and plan it hands out.
#[derive(Debug, Default)]
pub struct CountingProvider {
    inner: HostProvider,
    pub counters: Arc<Counters>,
}

impl CountingProvider {
    pub fn new() -> (Self, Arc<Counters>) {
        let provider = Self::default();
        let counters = provider.counters.clone();
        (provider, counters)
    }
}

impl DeviceProvider for CountingProvider {
    type Device = CountingDevice;

    fn acquire(
        &mut self,
        class: DeviceClass,
        diagnostics: &Diagnostics,
    ) -> Result<CountingDevice, DeviceError> {
        let inner = self.inner.acquire(class, diagnostics)?;
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.counters.live_devices.fetch_add(1, Ordering::SeqCst);
        Ok(CountingDevice {
            inner,
            counters: self.counters.clone(),
        })
    }
}

pub struct CountingDevice {
    inner: HostDevice,
    counters: Arc<Counters>,
}

impl Drop for CountingDevice {
    fn drop(&mut self) {
        self.counters.live_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct CountingBuffer {
    inner: HostBuffer,
    counters: Arc<Counters>,
}

impl Drop for CountingBuffer {
    fn drop(&mut self) {
        self.counters.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct CountingPlan {
    inner: HostPlan,
    counters: Arc<Counters>,
}

impl Drop for CountingPlan {
    fn drop(&mut self) {
        self.counters.live_plans.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ComputeDevice for CountingDevice {
    type Buffer = CountingBuffer;
    type Plan = CountingPlan;

    fn info(&self) -> &DeviceInfo {
        self.inner.info()
    }

    fn create_buffer(&self, len: usize) -> Result<CountingBuffer, BufferError> {
        if self.counters.fail_next_buffer.swap(false, Ordering::SeqCst) {
            return Err(BufferError::AllocationFailed("injected".to_string()));
        }
        let inner = self.inner.create_buffer(len)?;
        self.counters.buffers_created.fetch_add(1, Ordering::SeqCst);
        self.counters.live_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(CountingBuffer {
            inner,
            counters: self.counters.clone(),
        })
    }

    fn create_plan(&self, len: usize) -> Result<CountingPlan, BufferError> {
        let inner = self.inner.create_plan(len)?;
        self.counters.plans_created.fetch_add(1, Ordering::SeqCst);
        self.counters.live_plans.fetch_add(1, Ordering::SeqCst);
        Ok(CountingPlan {
            inner,
            counters: self.counters.clone(),
        })
    }

    fn write(
        &self,
        buffer: &mut CountingBuffer,
        host: &[Complex32],
    ) -> Result<(), SubmissionError> {
        self.inner.write(&mut buffer.inner, host)
    }

    fn execute(
        &self,
        plan: &mut CountingPlan,
        buffer: &mut CountingBuffer,
        direction: Direction,
    ) -> Result<(), SubmissionError> {
        let failing = self.counters.failing_submissions.load(Ordering::SeqCst);
        if failing > 0 {
            self.counters
                .failing_submissions
                .store(failing - 1, Ordering::SeqCst);
            return Err(SubmissionError::Compute("injected".to_string()));
        }
        self.inner.execute(&mut plan.inner, &mut buffer.inner, direction)
    }

    fn read(&self, buffer: &CountingBuffer, host: &mut [Complex32]) -> Result<(), SubmissionError> {
        self.inner.read(&buffer.inner, host)
    }
}

/// Diagnostics that record every message.
pub fn recording_diagnostics() -> (Diagnostics, Arc<Mutex<Vec<(Severity, String)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let diagnostics = Diagnostics::new(move |severity, message| {
        captured
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    });
    (diagnostics, seen)
}

pub fn assert_all_zero(values: &[f32]) {
    assert!(
        values.iter().all(|&v| v == 0.0),
        "expected silence, found {:?}",
        values.iter().find(|&&v| v != 0.0)
    );
}

pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max)
}
