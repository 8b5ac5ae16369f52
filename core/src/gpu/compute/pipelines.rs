//! Compute pipeline creation for the FFT shader.

use wgpu::{BindGroupLayout, ComputePipeline, Device, ShaderModule};

/// Bind group layout and pipelines shared by every plan on a device.
pub struct FftKernels {
    pub layout: BindGroupLayout,
    pub bit_reverse: ComputePipeline,
    pub butterfly: ComputePipeline,
}

impl FftKernels {
    pub fn new(device: &Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fft_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/fft.wgsl").into()),
        });
        let layout = Self::create_layout(device);

        Self {
            bit_reverse: Self::create_pipeline(device, &shader, &layout, "bit_reverse"),
            butterfly: Self::create_pipeline(device, &shader, &layout, "butterfly"),
            layout,
        }
    }

    /// Complex data (read/write storage) and the stage parameters.
    fn create_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fft_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    fn create_pipeline(
        device: &Device,
        shader: &ShaderModule,
        layout: &BindGroupLayout,
        entry_point: &str,
    ) -> ComputePipeline {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_pipeline_layout", entry_point)),
            bind_group_layouts: &[layout],
            immediate_size: 0,
        });

        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{}_pipeline", entry_point)),
            layout: Some(&pipeline_layout),
            module: shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}
