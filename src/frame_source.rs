//! Streamed frames feeding the shading pipeline.
//!
//! Producers publish into a single-slot [`LatestFrameSlot`]; the render thread
//! takes whatever is newest at the start of a tick. Unconsumed frames are
//! overwritten and never block the producer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use image::ImageReader;

use crate::transform::{self, TexMatrix};

/// One RGBA8 frame from the video source, rows top-down, plus the
/// crop/rotation transform the producer attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub transform: TexMatrix,
}

impl SourceFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("source frame dimensions must be non-zero, got {}x{}", width, height);
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| anyhow!("source frame {}x{} overflows", width, height))?;
        if rgba.len() != expected {
            bail!(
                "source frame {}x{} needs {} RGBA bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            );
        }

        Ok(Self {
            width,
            height,
            rgba,
            transform: transform::identity(),
        })
    }

    /// Frame filled with one RGBA color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Result<Self> {
        let pixels = (width as usize) * (height as usize);
        Self::new(width, height, color.repeat(pixels))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = ImageReader::open(path)
            .with_context(|| format!("failed opening {}", path.display()))?
            .decode()
            .with_context(|| format!("failed decoding {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn with_transform(mut self, transform: TexMatrix) -> Self {
        self.transform = transform;
        self
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

/// Anything the render thread can pull frames from.
pub trait FrameSource: Send {
    /// Newest frame not yet consumed, or `None` to keep showing the previous one.
    fn acquire_latest(&mut self) -> Result<Option<SourceFrame>>;
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<SourceFrame>,
    published: u64,
    dropped: u64,
}

/// Single-slot "latest frame wins" mailbox shared by one producer and the
/// render thread.
#[derive(Debug, Clone, Default)]
pub struct LatestFrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending frame. Returns `true` when an unconsumed frame was
    /// dropped to make room.
    pub fn publish(&self, frame: SourceFrame) -> Result<bool> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        let dropped = state.frame.replace(frame).is_some();
        state.published += 1;
        if dropped {
            state.dropped += 1;
        }
        Ok(dropped)
    }

    pub fn take_latest(&self) -> Result<Option<SourceFrame>> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        Ok(state.frame.take())
    }

    /// `(published, dropped)` counters.
    pub fn counters(&self) -> Result<(u64, u64)> {
        let state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("frame slot lock poisoned"))?;
        Ok((state.published, state.dropped))
    }
}

impl FrameSource for LatestFrameSlot {
    fn acquire_latest(&mut self) -> Result<Option<SourceFrame>> {
        self.take_latest()
    }
}

/// Source that yields one fixed frame on its first acquire and nothing after.
#[derive(Debug)]
pub struct StillFrameSource {
    frame: Option<SourceFrame>,
}

impl StillFrameSource {
    pub fn new(frame: SourceFrame) -> Self {
        Self { frame: Some(frame) }
    }
}

impl FrameSource for StillFrameSource {
    fn acquire_latest(&mut self) -> Result<Option<SourceFrame>> {
        Ok(self.frame.take())
    }
}
