//! Readback of the rendered color buffer into a self-contained PNG.

use std::io::Cursor;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbaImage};

/// One encoded capture, delivered whole to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
}

/// Reverse row order of a tightly packed RGBA8 buffer.
pub fn flip_rows(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let row_bytes = width as usize * 4;
    if rgba.len() != row_bytes * height as usize {
        bail!(
            "color buffer for {}x{} must be {} bytes, got {}",
            width,
            height,
            row_bytes * height as usize,
            rgba.len()
        );
    }

    let mut flipped = Vec::with_capacity(rgba.len());
    for row in rgba.chunks_exact(row_bytes).rev() {
        flipped.extend_from_slice(row);
    }
    Ok(flipped)
}

/// Encode a top-down RGBA8 buffer as PNG.
pub fn encode_png(rgba: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("RGBA buffer does not match {}x{}", width, height))?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode capture as PNG")?;
    Ok(png)
}

/// Flip a bottom-left-origin color buffer upright and encode it.
pub fn encode_color_buffer(bottom_up: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let upright = flip_rows(bottom_up, width, height)?;
    encode_png(upright, width, height)
}
