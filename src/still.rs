//! Edge map of a single packed frame, without a render backend.

use std::io::Cursor;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbImage};

use crate::kernels::{edge_magnitude, from_unorm8, to_unorm8};

/// Run Sobel over the luma plane of `packed` and encode white-on-black edges
/// as an RGB PNG.
pub fn edge_png_from_nv21(packed: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let luma_len = width
        .checked_mul(height)
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))?;
    let expected = luma_len
        .checked_add(luma_len / 2)
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))?;
    if luma_len == 0 || packed.len() != expected {
        bail!(
            "packed {}x{} frame must be {} bytes, got {}",
            width,
            height,
            expected,
            packed.len()
        );
    }
    let edges = luma_edges(&packed[..luma_len], width, height);

    let image_width = u32::try_from(width).context("width does not fit in u32")?;
    let image_height = u32::try_from(height).context("height does not fit in u32")?;
    let rgb: Vec<u8> = edges.iter().flat_map(|&value| [value; 3]).collect();
    let image = RgbImage::from_raw(image_width, image_height, rgb)
        .ok_or_else(|| anyhow!("edge buffer does not match {}x{}", width, height))?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode edge map as PNG")?;
    Ok(png)
}

/// Per-pixel edge strength of a top-down luma plane, clamped at borders.
pub fn luma_edges(luma: &[u8], width: usize, height: usize) -> Vec<u8> {
    let at = |x: isize, y: isize| -> f32 {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        from_unorm8(luma[y * width + x])
    };

    let mut edges = Vec::with_capacity(width * height);
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut l = [[0.0f32; 3]; 3];
            for (dy, row) in l.iter_mut().enumerate() {
                for (dx, value) in row.iter_mut().enumerate() {
                    *value = at(x + dx as isize - 1, y + dy as isize - 1);
                }
            }
            edges.push(to_unorm8(edge_magnitude(l)));
        }
    }
    edges
}
