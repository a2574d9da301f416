//! Frame shading pipeline.
//!
//! State machine: `Uninitialized → Ready → Rendering ⟲`, with `release`
//! returning to `Uninitialized`. The pipeline and its backend belong to one
//! thread; other threads talk to it only through [`PipelineHandle`], whose
//! every signal is a single atomic.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::backend::{FrameUniforms, ShadingBackend};
use crate::capture::{self, CapturedImage};
use crate::config::{BackendPreference, PipelineConfig};
use crate::error::{find_pipeline_error, PipelineError};
use crate::fps::FpsMeter;
use crate::frame_source::FrameSource;
use crate::gpu::GpuBackend;
use crate::shader_mode::{AtomicShaderMode, ShaderMode};
use crate::software::SoftwareBackend;
use crate::stats::PipelineStats;
use crate::transform::{self, TexMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Rendering,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Rendering => "rendering",
        }
    }
}

/// Viewport and per-frame source transform seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSurfaceState {
    pub width: u32,
    pub height: u32,
    /// Transform attached to the most recent source frame.
    pub source_transform: TexMatrix,
    pub source_width: u32,
    pub source_height: u32,
}

impl RenderSurfaceState {
    fn uniforms(&self, mode: ShaderMode) -> FrameUniforms {
        FrameUniforms {
            mode,
            tex_matrix: transform::texture_transform(&self.source_transform),
            texel_size: [
                1.0 / self.source_width as f32,
                1.0 / self.source_height as f32,
            ],
        }
    }
}

#[derive(Debug)]
struct SharedControls {
    mode: AtomicShaderMode,
    capture_requested: AtomicBool,
    fps: AtomicU32,
    last_capture_ms: AtomicI64,
}

/// Cross-thread view of a pipeline: mode selection, capture requests and
/// telemetry.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    shared: Arc<SharedControls>,
}

impl PipelineHandle {
    pub fn new(initial_mode: ShaderMode) -> Self {
        Self {
            shared: Arc::new(SharedControls {
                mode: AtomicShaderMode::new(initial_mode),
                capture_requested: AtomicBool::new(false),
                fps: AtomicU32::new(0),
                last_capture_ms: AtomicI64::new(0),
            }),
        }
    }

    /// Last mode set; applied from the next rendered frame.
    pub fn current_mode(&self) -> ShaderMode {
        self.shared.mode.load()
    }

    pub fn set_mode(&self, mode: ShaderMode) {
        self.shared.mode.store(mode);
    }

    pub fn cycle_mode(&self) -> ShaderMode {
        self.shared.mode.cycle()
    }

    /// Ask for the next rendered frame to be captured. Requests made before
    /// that frame renders collapse into one capture.
    pub fn request_capture(&self) {
        self.shared.capture_requested.store(true, Ordering::Release);
    }

    pub fn capture_pending(&self) -> bool {
        self.shared.capture_requested.load(Ordering::Acquire)
    }

    pub fn fps(&self) -> u32 {
        self.shared.fps.load(Ordering::Relaxed)
    }

    /// UNIX milliseconds of the last delivered capture, 0 if none.
    pub fn last_capture_ms(&self) -> i64 {
        self.shared.last_capture_ms.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats::new(self.fps(), self.current_mode(), self.last_capture_ms())
    }

    fn take_capture_request(&self) -> bool {
        self.shared.capture_requested.swap(false, Ordering::AcqRel)
    }

    fn publish_fps(&self, fps: u32) {
        self.shared.fps.store(fps, Ordering::Relaxed);
    }

    fn publish_capture(&self, timestamp_ms: i64) {
        self.shared
            .last_capture_ms
            .store(timestamp_ms, Ordering::Relaxed);
    }
}

/// Outcome of one render tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub mode: ShaderMode,
    /// A new source frame was uploaded this tick.
    pub source_updated: bool,
    pub capture: Option<CapturedImage>,
}

pub struct FrameShadingPipeline {
    state: PipelineState,
    backend: Option<Box<dyn ShadingBackend>>,
    surface: RenderSurfaceState,
    handle: PipelineHandle,
    fps: FpsMeter,
    frames_rendered: u64,
}

impl FrameShadingPipeline {
    /// Initialize the backend chosen by `config.backend`. Adapter and shader
    /// failures are fatal; `auto` falls back to software only when no adapter
    /// exists.
    pub async fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let viewport = config.viewport;

        let backend: Box<dyn ShadingBackend> = match config.backend {
            BackendPreference::Software => {
                Box::new(SoftwareBackend::new(viewport.width, viewport.height)?)
            }
            BackendPreference::Gpu => Box::new(
                GpuBackend::new(viewport.width, viewport.height)
                    .await
                    .context("failed to initialize GPU shading backend")?,
            ),
            BackendPreference::Auto => {
                match GpuBackend::new(viewport.width, viewport.height).await {
                    Ok(gpu) => Box::new(gpu),
                    Err(error)
                        if find_pipeline_error(&error) == Some(&PipelineError::NoAdapter) =>
                    {
                        warn!("no GPU adapter found, using software shading backend");
                        Box::new(SoftwareBackend::new(viewport.width, viewport.height)?)
                    }
                    Err(error) => {
                        return Err(error.context("failed to initialize GPU shading backend"))
                    }
                }
            }
        };

        Ok(Self::with_backend(config, backend))
    }

    pub fn new_software(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let backend = SoftwareBackend::new(config.viewport.width, config.viewport.height)?;
        Ok(Self::with_backend(config, Box::new(backend)))
    }

    pub fn with_backend(config: &PipelineConfig, backend: Box<dyn ShadingBackend>) -> Self {
        info!(
            backend = backend.label(),
            width = config.viewport.width,
            height = config.viewport.height,
            mode = %config.initial_mode,
            "frame shading pipeline ready"
        );

        Self {
            state: PipelineState::Ready,
            backend: Some(backend),
            surface: RenderSurfaceState {
                width: config.viewport.width,
                height: config.viewport.height,
                source_transform: transform::identity(),
                source_width: config.source.width,
                source_height: config.source.height,
            },
            handle: PipelineHandle::new(config.initial_mode),
            fps: FpsMeter::new(),
            frames_rendered: 0,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn surface(&self) -> &RenderSurfaceState {
        &self.surface
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_gpu_backend(&self) -> bool {
        self.backend.as_ref().is_some_and(|backend| backend.is_gpu())
    }

    pub fn current_mode(&self) -> ShaderMode {
        self.handle.current_mode()
    }

    pub fn cycle_mode(&self) -> ShaderMode {
        self.handle.cycle_mode()
    }

    pub fn request_capture(&self) {
        self.handle.request_capture();
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let state = self.state;
        let backend = self.backend.as_mut().ok_or(PipelineError::InvalidState {
            operation: "resize",
            state: state.as_str(),
        })?;
        backend
            .resize(width, height)
            .with_context(|| format!("failed to resize viewport to {}x{}", width, height))?;
        self.surface.width = width;
        self.surface.height = height;
        debug!(width, height, "viewport resized");
        Ok(())
    }

    /// Render one tick: pull the newest source frame, shade it with the
    /// current mode and service at most one pending capture.
    pub fn render_frame(&mut self, source: &mut dyn FrameSource) -> Result<RenderedFrame> {
        let state = self.state;
        let backend = self.backend.as_mut().ok_or(PipelineError::InvalidState {
            operation: "render",
            state: state.as_str(),
        })?;
        let mode = self.handle.current_mode();

        let source_updated = match source.acquire_latest() {
            Ok(Some(frame)) => match backend.upload_source(&frame) {
                Ok(()) => {
                    self.surface.source_transform = frame.transform;
                    self.surface.source_width = frame.width;
                    self.surface.source_height = frame.height;
                    true
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "skipping source frame upload");
                    false
                }
            },
            Ok(None) => false,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed to acquire source frame");
                false
            }
        };

        let drawn = backend.draw(&self.surface.uniforms(mode));
        let capture_requested = self.handle.take_capture_request();
        drawn.context("failed to draw frame")?;

        self.state = PipelineState::Rendering;
        self.frames_rendered += 1;
        if let Some(fps) = self.fps.tick(Instant::now()) {
            self.handle.publish_fps(fps);
        }

        let capture = if capture_requested {
            match self.capture() {
                Ok(image) => {
                    self.handle.publish_capture(image.timestamp_ms);
                    debug!(bytes = image.png.len(), "frame captured");
                    Some(image)
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "capture failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(RenderedFrame {
            mode,
            source_updated,
            capture,
        })
    }

    /// Release every backend resource. Releasing an already released
    /// pipeline is a no-op.
    pub fn release(&mut self) {
        if self.backend.take().is_some() {
            info!(frames = self.frames_rendered, "frame shading pipeline released");
        } else {
            debug!("release called on uninitialized pipeline");
        }
        self.state = PipelineState::Uninitialized;
    }

    fn capture(&mut self) -> Result<CapturedImage> {
        let (width, height) = (self.surface.width, self.surface.height);
        let backend = self
            .backend
            .as_mut()
            .ok_or(PipelineError::InvalidState {
                operation: "capture",
                state: self.state.as_str(),
            })?;
        let color = backend
            .read_color_buffer()
            .context("failed to read back color buffer")?;
        let png = capture::encode_color_buffer(&color, width, height)?;

        Ok(CapturedImage {
            png,
            width,
            height,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::frame_source::{LatestFrameSlot, SourceFrame, StillFrameSource};

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.viewport.width = 8;
        config.viewport.height = 6;
        config.source.width = 8;
        config.source.height = 6;
        config.backend = BackendPreference::Software;
        config
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn acquire_latest(&mut self) -> Result<Option<SourceFrame>> {
            bail!("camera went away")
        }
    }

    struct BrokenReadback(SoftwareBackend);

    impl ShadingBackend for BrokenReadback {
        fn label(&self) -> &'static str {
            "broken-readback"
        }
        fn is_gpu(&self) -> bool {
            false
        }
        fn upload_source(&mut self, frame: &SourceFrame) -> Result<()> {
            self.0.upload_source(frame)
        }
        fn resize(&mut self, width: u32, height: u32) -> Result<()> {
            self.0.resize(width, height)
        }
        fn draw(&mut self, uniforms: &FrameUniforms) -> Result<()> {
            self.0.draw(uniforms)
        }
        fn read_color_buffer(&mut self) -> Result<Vec<u8>> {
            bail!("device lost during readback")
        }
    }

    #[test]
    fn new_pipeline_is_ready_with_initial_mode() {
        let mut config = small_config();
        config.initial_mode = ShaderMode::Grayscale;
        let pipeline = FrameShadingPipeline::new_software(&config).expect("pipeline");

        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.current_mode(), ShaderMode::Grayscale);
        assert!(!pipeline.is_gpu_backend());
    }

    #[test]
    fn rendering_moves_to_rendering_state() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let mut source = LatestFrameSlot::new();

        let frame = pipeline.render_frame(&mut source).expect("render");

        assert_eq!(pipeline.state(), PipelineState::Rendering);
        assert!(!frame.source_updated);
        assert!(frame.capture.is_none());
    }

    #[test]
    fn source_failure_does_not_stop_rendering() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let mut source = FailingSource;

        for _ in 0..3 {
            let frame = pipeline.render_frame(&mut source).expect("render must survive");
            assert!(!frame.source_updated);
        }
        assert_eq!(pipeline.frames_rendered(), 3);
    }

    #[test]
    fn failed_capture_still_clears_request() {
        let config = small_config();
        let backend = BrokenReadback(SoftwareBackend::new(8, 6).expect("backend"));
        let mut pipeline = FrameShadingPipeline::with_backend(&config, Box::new(backend));
        let handle = pipeline.handle();
        let mut source = LatestFrameSlot::new();

        handle.request_capture();
        let frame = pipeline.render_frame(&mut source).expect("render");

        assert!(frame.capture.is_none());
        assert!(!handle.capture_pending());
        assert_eq!(handle.last_capture_ms(), 0);
    }

    #[test]
    fn mode_change_applies_to_next_frame() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let handle = pipeline.handle();
        let mut source = StillFrameSource::new(
            SourceFrame::solid(8, 6, [10, 20, 30, 255]).expect("frame"),
        );

        assert_eq!(pipeline.render_frame(&mut source).expect("render").mode, ShaderMode::Edge);
        handle.cycle_mode();
        assert_eq!(
            pipeline.render_frame(&mut source).expect("render").mode,
            ShaderMode::Grayscale
        );
    }

    #[test]
    fn released_pipeline_refuses_to_render() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let mut source = LatestFrameSlot::new();
        pipeline.render_frame(&mut source).expect("render");

        pipeline.release();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        let error = pipeline
            .render_frame(&mut source)
            .expect_err("render after release must fail");
        assert!(matches!(
            find_pipeline_error(&error),
            Some(PipelineError::InvalidState { .. })
        ));

        pipeline.release();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn release_from_ready_state() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        pipeline.release();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(!pipeline.is_gpu_backend());
    }

    #[test]
    fn texel_size_follows_latest_source() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let mut source =
            StillFrameSource::new(SourceFrame::solid(4, 2, [0, 0, 0, 255]).expect("frame"));

        pipeline.render_frame(&mut source).expect("render");

        let uniforms = pipeline.surface().uniforms(ShaderMode::Edge);
        assert_eq!(uniforms.texel_size, [0.25, 0.5]);
    }

    #[test]
    fn resize_updates_capture_dimensions() {
        let mut pipeline = FrameShadingPipeline::new_software(&small_config()).expect("pipeline");
        let mut source = LatestFrameSlot::new();
        pipeline.resize(3, 2).expect("resize");

        pipeline.request_capture();
        let capture = pipeline
            .render_frame(&mut source)
            .expect("render")
            .capture
            .expect("capture");

        assert_eq!((capture.width, capture.height), (3, 2));
        assert!(pipeline.resize(0, 2).is_err());
    }
}
