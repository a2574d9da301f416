//! Dedicated render thread.
//!
//! The pipeline is built on the thread that drives it, so backend resources
//! never cross threads. Callers keep a [`PipelineHandle`] for control and a
//! receiver for captured images.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use crate::capture::CapturedImage;
use crate::config::PipelineConfig;
use crate::error::{find_pipeline_error, PipelineError};
use crate::frame_source::FrameSource;
use crate::pipeline::{FrameShadingPipeline, PipelineHandle};

pub struct RenderThread {
    handle: PipelineHandle,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<u64>>>,
}

impl RenderThread {
    /// Start rendering `source` at `config.refresh_hz`. Returns once the
    /// pipeline is ready, or with the initialization error if it never got
    /// there.
    pub fn spawn(
        config: PipelineConfig,
        source: Box<dyn FrameSource>,
        captures: Sender<CapturedImage>,
    ) -> Result<Self> {
        Self::spawn_with(config, source, captures, |config: &PipelineConfig| {
            pollster::block_on(FrameShadingPipeline::new(config))
        })
    }

    /// Like [`RenderThread::spawn`], with the pipeline built by `build` on the
    /// render thread.
    pub fn spawn_with<F>(
        config: PipelineConfig,
        mut source: Box<dyn FrameSource>,
        captures: Sender<CapturedImage>,
        build: F,
    ) -> Result<Self>
    where
        F: FnOnce(&PipelineConfig) -> Result<FrameShadingPipeline> + Send + 'static,
    {
        config.validate()?;
        let (ready_tx, ready_rx) = mpsc::channel::<Result<PipelineHandle>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let worker = thread::Builder::new()
            .name("edgecam-render".to_owned())
            .spawn(move || -> Result<u64> {
                let mut pipeline = match build(&config) {
                    Ok(pipeline) => pipeline,
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return Ok(0);
                    }
                };
                if ready_tx.send(Ok(pipeline.handle())).is_err() {
                    pipeline.release();
                    return Ok(0);
                }

                let result = run_loop(&mut pipeline, source.as_mut(), &captures, &config, &stop_flag);
                pipeline.release();
                result
            })
            .context("failed to spawn render thread")?;

        let ready = ready_rx
            .recv()
            .map_err(|_| anyhow!("render thread exited before reporting readiness"));
        match ready {
            Ok(Ok(handle)) => Ok(Self {
                handle,
                stop,
                worker: Some(worker),
            }),
            Ok(Err(error)) | Err(error) => {
                let _ = worker.join();
                Err(error.context("render thread failed to initialize"))
            }
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop the loop, join the thread and release the pipeline. Returns the
    /// number of frames rendered.
    pub fn stop(mut self) -> Result<u64> {
        self.stop.store(true, Ordering::Release);
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("render thread already stopped"))?;
        match worker.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("render thread panicked")),
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_loop(
    pipeline: &mut FrameShadingPipeline,
    source: &mut dyn FrameSource,
    captures: &Sender<CapturedImage>,
    config: &PipelineConfig,
    stop: &AtomicBool,
) -> Result<u64> {
    let interval = config.refresh_interval();
    let mut next_tick = Instant::now();
    let mut frames = 0u64;
    let mut skipped = 0u64;
    let mut receiver_gone = false;

    info!(refresh_hz = config.refresh_hz, "render loop started");
    while !stop.load(Ordering::Acquire) {
        match pipeline.render_frame(source) {
            Ok(rendered) => {
                frames += 1;
                if let Some(image) = rendered.capture {
                    if captures.send(image).is_err() && !receiver_gone {
                        warn!("capture receiver dropped, discarding captures");
                        receiver_gone = true;
                    }
                }
            }
            Err(error) => {
                if matches!(
                    find_pipeline_error(&error),
                    Some(PipelineError::InvalidState { .. })
                ) {
                    return Err(error);
                }
                skipped += 1;
                warn!(error = %format!("{error:#}"), skipped, "skipping frame");
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }
    debug!(frames, skipped, "render loop stopped");
    Ok(frames)
}
