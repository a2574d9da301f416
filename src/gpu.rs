//! wgpu backend for the frame-shading program.

use std::num::NonZeroU32;
use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use bytemuck::Zeroable;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::backend::{FrameUniforms, ShadeUniform, ShadingBackend};
use crate::error::PipelineError;
use crate::frame_source::SourceFrame;

pub const FRAME_SHADING_WGSL: &str = include_str!("../shaders/wgsl/frame_shading.wgsl");

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

struct SourceTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    bind_group: wgpu::BindGroup,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    source: SourceTexture,
    target: RenderTarget,
    last_uniform: Option<ShadeUniform>,
    max_texture_dimension: u32,
}

impl GpuBackend {
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_program(width, height, "edgecam-frame-shading", FRAME_SHADING_WGSL).await
    }

    /// Build the backend around an arbitrary WGSL program exposing `vs_main`
    /// and `fs_main` over the `ShadeUniform` bindings.
    pub async fn with_program(
        width: u32,
        height: u32,
        label: &str,
        wgsl_source: &str,
    ) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(PipelineError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            width,
            height,
            "creating GPU shading backend"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("edgecam-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;
        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        check_texture_size("viewport", width, height, max_texture_dimension)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgecam-shading-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<ShadeUniform>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        // Compile and link under a validation scope so a bad program surfaces
        // as an init error instead of an uncaptured-error panic.
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl_source.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgecam-shading-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(PipelineError::ShaderCompile {
                label: label.to_owned(),
                message: error.to_string(),
            }
            .into());
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edgecam-source-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("edgecam-shade-uniform"),
            contents: bytemuck::bytes_of(&ShadeUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let placeholder = SourceFrame::solid(1, 1, [0, 0, 0, 255])?;
        let source = create_source_texture(
            &device,
            &bind_group_layout,
            &sampler,
            &uniform_buffer,
            placeholder.width,
            placeholder.height,
        );
        write_source(&queue, &source.texture, &placeholder)?;

        let target = create_render_target(&device, width, height)?;

        Ok(Self {
            device,
            queue,
            width,
            height,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            source,
            target,
            last_uniform: None,
            max_texture_dimension,
        })
    }
}

impl ShadingBackend for GpuBackend {
    fn label(&self) -> &'static str {
        "gpu"
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn upload_source(&mut self, frame: &SourceFrame) -> Result<()> {
        check_texture_size(
            "source frame",
            frame.width,
            frame.height,
            self.max_texture_dimension,
        )?;
        if frame.width != self.source.width || frame.height != self.source.height {
            debug!(
                width = frame.width,
                height = frame.height,
                "reallocating source texture"
            );
            self.source = create_source_texture(
                &self.device,
                &self.bind_group_layout,
                &self.sampler,
                &self.uniform_buffer,
                frame.width,
                frame.height,
            );
        }
        write_source(&self.queue, &self.source.texture, frame)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        check_texture_size("viewport", width, height, self.max_texture_dimension)?;
        self.target = create_render_target(&self.device, width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<()> {
        let uniform = ShadeUniform::from(uniforms);
        if self.last_uniform != Some(uniform) {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
            self.last_uniform = Some(uniform);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edgecam-render-encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("edgecam-render-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.source.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_color_buffer(&mut self) -> Result<Vec<u8>> {
        let target = &self.target;
        let padded_bytes_per_row = NonZeroU32::new(target.padded_bytes_per_row)
            .ok_or_else(|| anyhow!("invalid padded row size {}", target.padded_bytes_per_row))?;
        let rows_per_image = NonZeroU32::new(self.height)
            .ok_or_else(|| anyhow!("invalid render height {}", self.height))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edgecam-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &target.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row.get()),
                    rows_per_image: Some(rows_per_image.get()),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = target.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let unpadded = target.unpadded_bytes_per_row as usize;
        let mapped = buffer_slice.get_mapped_range();
        let mut frame = vec![0_u8; unpadded * self.height as usize];
        for (row_index, chunk) in mapped
            .chunks(target.padded_bytes_per_row as usize)
            .take(self.height as usize)
            .enumerate()
        {
            let dst_start = row_index * unpadded;
            frame[dst_start..dst_start + unpadded].copy_from_slice(&chunk[..unpadded]);
        }

        drop(mapped);
        target.readback_buffer.unmap();
        Ok(frame)
    }
}

fn create_render_target(device: &wgpu::Device, width: u32, height: u32) -> Result<RenderTarget> {
    if width == 0 || height == 0 {
        return Err(anyhow!(
            "viewport dimensions must be non-zero, got {}x{}",
            width,
            height
        ));
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("edgecam-render-target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let unpadded_bytes_per_row = width
        .checked_mul(4)
        .ok_or_else(|| anyhow!("frame width overflow when computing row bytes"))?;
    let padded_bytes_per_row = align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("edgecam-readback-buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    Ok(RenderTarget {
        texture,
        view,
        readback_buffer,
        unpadded_bytes_per_row,
        padded_bytes_per_row,
    })
}

fn create_source_texture(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    uniform_buffer: &wgpu::Buffer,
    width: u32,
    height: u32,
) -> SourceTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("edgecam-source-texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("edgecam-shading-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniform_buffer.as_entire_binding(),
            },
        ],
    });

    SourceTexture {
        texture,
        width,
        height,
        bind_group,
    }
}

fn write_source(queue: &wgpu::Queue, texture: &wgpu::Texture, frame: &SourceFrame) -> Result<()> {
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.rgba.len() != expected {
        return Err(anyhow!(
            "source frame {}x{} needs {} RGBA bytes, got {}",
            frame.width,
            frame.height,
            expected,
            frame.rgba.len()
        ));
    }
    let bytes_per_row = NonZeroU32::new(frame.width.saturating_mul(4))
        .ok_or_else(|| anyhow!("source frame has invalid width {}", frame.width))?;
    let rows_per_image = NonZeroU32::new(frame.height)
        .ok_or_else(|| anyhow!("source frame has invalid height {}", frame.height))?;

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &frame.rgba,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row.get()),
            rows_per_image: Some(rows_per_image.get()),
        },
        wgpu::Extent3d {
            width: frame.width,
            height: frame.height,
            depth_or_array_layers: 1,
        },
    );
    Ok(())
}

/// Reject texture sizes the device cannot allocate.
fn check_texture_size(kind: &str, width: u32, height: u32, max_dimension: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!(
            "{} dimensions must be non-zero, got {}x{}",
            kind,
            width,
            height
        ));
    }
    if width > max_dimension || height > max_dimension {
        return Err(anyhow!(
            "{} {}x{} exceeds the device texture limit of {}",
            kind,
            width,
            height,
            max_dimension
        ));
    }
    Ok(())
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
