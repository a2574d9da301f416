//! CPU reference for the per-pixel kernels in `shaders/wgsl/frame_shading.wgsl`.
//!
//! The software backend runs these directly; the WGSL mirrors the same
//! operation order so both backends agree after 8-bit quantization.

use crate::shader_mode::ShaderMode;

pub type Rgba = [f32; 4];

/// Rec. 601 luma weights.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

pub fn luminance(color: Rgba) -> f32 {
    color[0] * LUMA_WEIGHTS[0] + color[1] * LUMA_WEIGHTS[1] + color[2] * LUMA_WEIGHTS[2]
}

/// 3×3 samples around the shaded pixel, indexed `[dy][dx]` where index 0 is
/// the `-texel` offset and index 2 the `+texel` offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighborhood(pub [[Rgba; 3]; 3]);

impl Neighborhood {
    pub fn uniform(color: Rgba) -> Self {
        Self([[color; 3]; 3])
    }

    pub fn center(&self) -> Rgba {
        self.0[1][1]
    }

    fn lumas(&self) -> [[f32; 3]; 3] {
        self.0.map(|row| row.map(luminance))
    }
}

/// Sobel gradients `(gx, gy)` over a luma neighborhood.
pub fn sobel(l: [[f32; 3]; 3]) -> (f32, f32) {
    let (l00, l10, l20) = (l[0][0], l[0][1], l[0][2]);
    let (l01, l21) = (l[1][0], l[1][2]);
    let (l02, l12, l22) = (l[2][0], l[2][1], l[2][2]);

    let gx = -l00 - 2.0 * l01 - l02 + l20 + 2.0 * l21 + l22;
    let gy = -l00 - 2.0 * l10 - l20 + l02 + 2.0 * l12 + l22;
    (gx, gy)
}

/// Edge strength `clamp(|(gx, gy)|, 0, 1)`.
pub fn edge_magnitude(l: [[f32; 3]; 3]) -> f32 {
    let (gx, gy) = sobel(l);
    (gx * gx + gy * gy).sqrt().clamp(0.0, 1.0)
}

pub fn shade(mode: ShaderMode, neighborhood: &Neighborhood) -> Rgba {
    let center = neighborhood.center();
    match mode {
        ShaderMode::Raw => center,
        ShaderMode::Edge => {
            let g = edge_magnitude(neighborhood.lumas());
            [g, g, g, 1.0]
        }
        ShaderMode::Grayscale => {
            let l = luminance(center);
            [l, l, l, center[3]]
        }
        ShaderMode::Invert => invert(center),
    }
}

pub fn invert(color: Rgba) -> Rgba {
    [1.0 - color[0], 1.0 - color[1], 1.0 - color[2], color[3]]
}

/// Float → 8-bit unorm, as the render target stores it.
pub fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn from_unorm8(value: u8) -> f32 {
    f32::from(value) / 255.0
}

pub fn quantize(color: Rgba) -> [u8; 4] {
    color.map(to_unorm8)
}
