use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use crate::frame_source::SourceFrame;
use crate::shader_mode::ShaderMode;
use crate::transform::{self, TexMatrix};

/// Per-frame inputs to the active kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub mode: ShaderMode,
    /// Source transform with the vertical-flip correction already applied.
    pub tex_matrix: TexMatrix,
    /// `(1 / source_width, 1 / source_height)`.
    pub texel_size: [f32; 2],
}

/// Matches `ShadeUniform` in frame_shading.wgsl. 80 bytes, 16-byte aligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct ShadeUniform {
    pub tex_matrix: [[f32; 4]; 4],
    pub texel_size: [f32; 2],
    pub mode: u32,
    pub _pad0: u32,
}

impl From<&FrameUniforms> for ShadeUniform {
    fn from(uniforms: &FrameUniforms) -> Self {
        Self {
            tex_matrix: transform::to_columns(&uniforms.tex_matrix),
            texel_size: uniforms.texel_size,
            mode: uniforms.mode.as_u32(),
            _pad0: 0,
        }
    }
}

/// Rendering backend behind the shading pipeline. All calls happen on the
/// thread that owns the pipeline.
pub trait ShadingBackend {
    fn label(&self) -> &'static str;

    fn is_gpu(&self) -> bool;

    /// Replace the sampled source texture with `frame`.
    fn upload_source(&mut self, frame: &SourceFrame) -> Result<()>;

    /// Reallocate the color buffer for a new viewport size.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Run the kernel over a full-viewport quad.
    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<()>;

    /// Tightly packed RGBA8 color buffer, row 0 at the bottom of the viewport.
    fn read_color_buffer(&mut self) -> Result<Vec<u8>>;
}
