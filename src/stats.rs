use anyhow::{Context, Result};
use serde::Serialize;

use crate::shader_mode::ShaderMode;

/// Point-in-time telemetry for a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub fps: u32,
    /// Display label of the active mode.
    pub mode: String,
    /// UNIX milliseconds of the last delivered capture, 0 if none.
    pub timestamp: i64,
}

impl PipelineStats {
    pub fn new(fps: u32, mode: ShaderMode, timestamp: i64) -> Self {
        Self {
            fps,
            mode: mode.label().to_owned(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize pipeline stats")
    }
}
