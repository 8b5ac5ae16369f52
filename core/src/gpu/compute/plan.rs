//! Compiled transform plan: per-stage uniforms and pass encoding.

use wgpu::util::DeviceExt;
use wgpu::{BindGroup, Buffer, CommandEncoder, Device};

use super::buffers::GpuBuffer;
use super::params::FftParams;
use super::pipelines::FftKernels;
use crate::bridge::Direction;
use crate::buffers::BufferError;

const WORKGROUP_SIZE: u32 = 256;

/// Transform plan for one power-of-two length.
///
/// Holds one uniform block per butterfly stage and direction, written once
/// at creation so a block needs no uniform uploads. Bind groups are built
/// when the plan is bound to its buffer and reused for every block.
pub struct GpuPlan {
    len: usize,
    forward: Vec<Buffer>,
    inverse: Vec<Buffer>,
    bound: Option<BoundStages>,
}

struct BoundStages {
    forward: Vec<BindGroup>,
    inverse: Vec<BindGroup>,
}

impl GpuPlan {
    pub(crate) fn new(device: &Device, len: usize) -> Result<Self, BufferError> {
        if len == 0 || !len.is_power_of_two() || len > u32::MAX as usize {
            return Err(BufferError::PlanFailed(format!(
                "FFT size must be a power of 2, got {}",
                len
            )));
        }

        let max_groups = device.limits().max_compute_workgroups_per_dimension;
        if workgroups(len) > max_groups {
            return Err(BufferError::PlanFailed(format!(
                "{} points need {} workgroups, device allows {}",
                len,
                workgroups(len),
                max_groups
            )));
        }

        let stages = len.trailing_zeros();
        Ok(Self {
            len,
            forward: stage_uniforms(device, len, stages, Direction::Forward),
            inverse: stage_uniforms(device, len, stages, Direction::Inverse),
            bound: None,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Build the per-stage bind groups for `buffer`, replacing any earlier
    /// binding.
    pub(crate) fn bind(&mut self, device: &Device, kernels: &FftKernels, buffer: &GpuBuffer) {
        let bind = |uniforms: &[Buffer]| -> Vec<BindGroup> {
            uniforms
                .iter()
                .map(|params| create_bind_group(device, kernels, buffer, params))
                .collect()
        };
        self.bound = Some(BoundStages {
            forward: bind(&self.forward),
            inverse: bind(&self.inverse),
        });
    }

    /// Record the bit-reversal pass and every butterfly stage on the bound
    /// buffer. Returns `false` when the plan was never bound.
    pub(crate) fn encode(
        &self,
        kernels: &FftKernels,
        encoder: &mut CommandEncoder,
        direction: Direction,
    ) -> bool {
        let Some(bound) = &self.bound else {
            return false;
        };
        let bind_groups = match direction {
            Direction::Forward => &bound.forward,
            Direction::Inverse => &bound.inverse,
        };
        // A single point is its own transform.
        let Some(first) = bind_groups.first() else {
            return true;
        };

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("bit_reverse_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernels.bit_reverse);
            pass.set_bind_group(0, first, &[]);
            pass.dispatch_workgroups(workgroups(self.len), 1, 1);
        }

        // Separate passes so each stage sees the previous stage's writes.
        for bind_group in bind_groups {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("butterfly_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernels.butterfly);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups(self.len / 2), 1, 1);
        }
        true
    }
}

impl Drop for GpuPlan {
    fn drop(&mut self) {
        self.bound = None;
        for uniform in self.forward.iter().chain(&self.inverse) {
            uniform.destroy();
        }
    }
}

fn stage_uniforms(device: &Device, len: usize, stages: u32, direction: Direction) -> Vec<Buffer> {
    (0..stages)
        .map(|stage| {
            let params = FftParams::new(len, stage, direction);
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fft_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        })
        .collect()
}

fn create_bind_group(
    device: &Device,
    kernels: &FftKernels,
    buffer: &GpuBuffer,
    params: &Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("fft_bind_group"),
        layout: &kernels.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.storage.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: params.as_entire_binding(),
            },
        ],
    })
}

fn workgroups(elements: usize) -> u32 {
    (elements as u32).div_ceil(WORKGROUP_SIZE).max(1)
}
