//! Transform buffer set: host scratch, device buffer and compiled plan.
//!
//! The host scratch and the device buffer form one [`SharedBuffer`]. The
//! device side is always released before the host allocation it mirrors.
//! Allocation tracks the largest length requested so far; shrinking only
//! changes the logical length (and the plan compiled for it).

use num_complex::Complex32;

use crate::device::ComputeDevice;

/// Largest transform length representable as a `u32` power of two.
pub const MAX_TRANSFORM_LENGTH: u32 = 1 << 31;

/// Errors that can occur while building or resizing a buffer set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("Failed to allocate transform buffer: {0}")]
    AllocationFailed(String),
    #[error("Failed to compile transform plan: {0}")]
    PlanFailed(String),
}

/// Smallest power of two greater than or equal to `x`.
///
/// `0` coerces to `1`. Returns `None` only for inputs above
/// [`MAX_TRANSFORM_LENGTH`].
pub fn coerce_pow2(x: u32) -> Option<u32> {
    x.checked_next_power_of_two()
}

/// A host allocation and the device buffer bound to it.
pub struct SharedBuffer<B> {
    // Field order is drop order: the device view goes first.
    device: B,
    host: Vec<Complex32>,
}

impl<B> SharedBuffer<B> {
    pub fn capacity(&self) -> usize {
        self.host.len()
    }
}

/// Host scratch, device buffer and plan for one transform length.
pub struct TransformBufferSet<D: ComputeDevice> {
    plan: D::Plan,
    shared: SharedBuffer<D::Buffer>,
    length: usize,
    inverse_scale: f32,
}

impl<D: ComputeDevice> TransformBufferSet<D> {
    /// Allocate the scratch, compile the plan and create the device buffer
    /// for `length` points. Nothing acquired by a failed attempt survives.
    pub fn build(device: &D, length: usize) -> Result<Self, BufferError> {
        check_length(length)?;

        let host = alloc_host(Vec::new(), length)?;
        let mut plan = device.create_plan(length)?;
        let device_buffer = device.create_buffer(length)?;
        device.bind(&mut plan, &device_buffer)?;

        log::debug!(
            "Built {}-point buffer set on '{}'",
            length,
            device.info().name
        );

        Ok(Self {
            plan,
            shared: SharedBuffer {
                device: device_buffer,
                host,
            },
            length,
            inverse_scale: inverse_scale(length),
        })
    }

    /// Rebuild plan and device buffer for `new_length`, growing the host
    /// scratch in place. The first `min(old, new)` scratch points survive.
    ///
    /// On failure every resource of the set is released.
    pub fn resize(self, device: &D, new_length: usize) -> Result<Self, BufferError> {
        check_length(new_length)?;

        let Self { plan, shared, .. } = self;
        let SharedBuffer {
            device: device_buffer,
            host,
        } = shared;
        drop(plan);
        drop(device_buffer);

        let old_length = host.len();
        let host = alloc_host(host, new_length)?;
        let mut plan = device.create_plan(new_length)?;
        let device_buffer = device.create_buffer(new_length)?;
        device.bind(&mut plan, &device_buffer)?;

        log::debug!(
            "Resized buffer set from {} to {} points on '{}'",
            old_length,
            new_length,
            device.info().name
        );

        Ok(Self {
            plan,
            shared: SharedBuffer {
                device: device_buffer,
                host,
            },
            length: new_length,
            inverse_scale: inverse_scale(new_length),
        })
    }

    /// Address only the first `length` points of the existing allocation.
    ///
    /// No buffer is reallocated; the plan is recompiled when the length
    /// actually changes.
    pub fn set_logical_length(&mut self, device: &D, length: usize) -> Result<(), BufferError> {
        check_length(length)?;
        if length > self.capacity() {
            return Err(BufferError::AllocationFailed(format!(
                "{} points exceed the allocated {}",
                length,
                self.capacity()
            )));
        }
        if length != self.length {
            let mut plan = device.create_plan(length)?;
            device.bind(&mut plan, &self.shared.device)?;
            self.plan = plan;
            self.length = length;
            self.inverse_scale = inverse_scale(length);
            log::debug!(
                "Buffer set now addresses {} of {} points",
                length,
                self.capacity()
            );
        }
        Ok(())
    }

    /// Release plan, device buffer and host scratch, in that order.
    pub fn destroy(self) {
        let Self {
            plan,
            shared,
            length,
            ..
        } = self;
        let SharedBuffer {
            device: device_buffer,
            host,
        } = shared;
        drop(plan);
        drop(device_buffer);
        drop(host);
        log::debug!("Destroyed {}-point buffer set", length);
    }

    /// Logical transform length.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Allocated length of the scratch and device buffer.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// `1 / L`, the inverse transform normalization.
    pub fn inverse_scale(&self) -> f32 {
        self.inverse_scale
    }

    /// Logical region of the host scratch.
    pub fn scratch(&self) -> &[Complex32] {
        &self.shared.host[..self.length]
    }

    pub fn scratch_mut(&mut self) -> &mut [Complex32] {
        &mut self.shared.host[..self.length]
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Complex32], &mut D::Buffer, &mut D::Plan) {
        (
            &mut self.shared.host[..self.length],
            &mut self.shared.device,
            &mut self.plan,
        )
    }
}

fn check_length(length: usize) -> Result<(), BufferError> {
    if length == 0 || !length.is_power_of_two() || length > MAX_TRANSFORM_LENGTH as usize {
        return Err(BufferError::PlanFailed(format!(
            "transform length must be a power of 2 up to {}, got {}",
            MAX_TRANSFORM_LENGTH, length
        )));
    }
    Ok(())
}

fn alloc_host(mut host: Vec<Complex32>, length: usize) -> Result<Vec<Complex32>, BufferError> {
    if length > host.len() {
        host.try_reserve_exact(length - host.len())
            .map_err(|e| BufferError::AllocationFailed(e.to_string()))?;
    }
    host.resize(length, Complex32::default());
    Ok(host)
}

fn inverse_scale(length: usize) -> f32 {
    (1.0 / length as f64) as f32
}
