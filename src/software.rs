//! CPU rendition of the frame-shading program.
//!
//! Rasterizes the full-viewport quad one fragment at a time with the same
//! texture-coordinate math, clamp-to-edge bilinear sampling and kernels as the
//! WGSL program. Deterministic, so it backs tests and GPU-less hosts.

use anyhow::{bail, Result};

use crate::backend::{FrameUniforms, ShadingBackend};
use crate::frame_source::SourceFrame;
use crate::kernels::{self, Neighborhood, Rgba};
use crate::shader_mode::ShaderMode;
use crate::transform;

pub struct SoftwareBackend {
    width: u32,
    height: u32,
    source: SourceFrame,
    color: Vec<u8>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let color = color_buffer(width, height)?;
        Ok(Self {
            width,
            height,
            source: SourceFrame::solid(1, 1, [0, 0, 0, 255])?,
            color,
        })
    }

    fn fragment(&self, x: u32, row: u32, uniforms: &FrameUniforms) -> [u8; 4] {
        let uv = [
            (x as f32 + 0.5) / self.width as f32,
            (row as f32 + 0.5) / self.height as f32,
        ];
        let [s, t] = transform::apply(&uniforms.tex_matrix, uv);

        let neighborhood = if uniforms.mode == ShaderMode::Edge {
            let [tx, ty] = uniforms.texel_size;
            let mut samples = [[[0.0_f32; 4]; 3]; 3];
            for (dy, sample_row) in samples.iter_mut().enumerate() {
                for (dx, sample) in sample_row.iter_mut().enumerate() {
                    let offset_s = (dx as f32 - 1.0) * tx;
                    let offset_t = (dy as f32 - 1.0) * ty;
                    *sample = sample_bilinear(&self.source, s + offset_s, t + offset_t);
                }
            }
            Neighborhood(samples)
        } else {
            Neighborhood::uniform(sample_bilinear(&self.source, s, t))
        };

        kernels::quantize(kernels::shade(uniforms.mode, &neighborhood))
    }
}

impl ShadingBackend for SoftwareBackend {
    fn label(&self) -> &'static str {
        "software"
    }

    fn is_gpu(&self) -> bool {
        false
    }

    fn upload_source(&mut self, frame: &SourceFrame) -> Result<()> {
        self.source.clone_from(frame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.color = color_buffer(width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<()> {
        let mut color = std::mem::take(&mut self.color);
        let row_bytes = self.width as usize * 4;

        for (row, line) in color.chunks_exact_mut(row_bytes).enumerate() {
            for (x, pixel) in line.chunks_exact_mut(4).enumerate() {
                pixel.copy_from_slice(&self.fragment(x as u32, row as u32, uniforms));
            }
        }

        self.color = color;
        Ok(())
    }

    fn read_color_buffer(&mut self) -> Result<Vec<u8>> {
        Ok(self.color.clone())
    }
}

fn color_buffer(width: u32, height: u32) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        bail!("viewport dimensions must be non-zero, got {}x{}", width, height);
    }
    let Some(len) = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
    else {
        bail!("viewport {}x{} overflows", width, height);
    };
    Ok(vec![0; len])
}

fn texel(frame: &SourceFrame, x: i64, y: i64) -> Rgba {
    let x = x.clamp(0, i64::from(frame.width) - 1) as usize;
    let y = y.clamp(0, i64::from(frame.height) - 1) as usize;
    let index = (y * frame.width as usize + x) * 4;
    let px = &frame.rgba[index..index + 4];
    [
        kernels::from_unorm8(px[0]),
        kernels::from_unorm8(px[1]),
        kernels::from_unorm8(px[2]),
        kernels::from_unorm8(px[3]),
    ]
}

/// Linear filtering with clamp-to-edge addressing. `t = 0` is the first row
/// of the source buffer.
fn sample_bilinear(frame: &SourceFrame, s: f32, t: f32) -> Rgba {
    // Beyond one texel outside the frame every tap is the edge texel.
    let x = (s * frame.width as f32 - 0.5).clamp(-1.0, frame.width as f32);
    let y = (t * frame.height as f32 - 0.5).clamp(-1.0, frame.height as f32);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i64, y0 as i64);

    let c00 = texel(frame, ix, iy);
    let c10 = texel(frame, ix + 1, iy);
    let c01 = texel(frame, ix, iy + 1);
    let c11 = texel(frame, ix + 1, iy + 1);

    std::array::from_fn(|i| {
        let top = c00[i] + (c10[i] - c00[i]) * fx;
        let bottom = c01[i] + (c11[i] - c01[i]) * fx;
        top + (bottom - top) * fy
    })
}
