use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::shader_mode::ShaderMode;

const MAX_REFRESH_HZ: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    fn validate(&self, field: &str) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "{} must be non-zero, got {}x{}",
                field,
                self.width,
                self.height
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when an adapter exists, software otherwise.
    #[default]
    Auto,
    Gpu,
    Software,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Size of the display surface and of every capture.
    pub viewport: Resolution,
    /// Buffer size requested from the frame producer.
    pub source: Resolution,
    pub initial_mode: ShaderMode,
    pub backend: BackendPreference,
    /// Render-thread tick rate.
    pub refresh_hz: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            viewport: Resolution::HD,
            source: Resolution::HD,
            initial_mode: ShaderMode::Edge,
            backend: BackendPreference::Auto,
            refresh_hz: 60,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.viewport.validate("viewport")?;
        self.source.validate("source")?;
        if self.refresh_hz == 0 || self.refresh_hz > MAX_REFRESH_HZ {
            bail!(
                "refresh_hz must be in 1..={}, got {}",
                MAX_REFRESH_HZ,
                self.refresh_hz
            );
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }

    pub fn from_yaml_str(contents: &str, origin: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents).map_err(|error| {
            let location = error
                .location()
                .map(|location| format!("line {}, column {}", location.line(), location.column()))
                .unwrap_or_else(|| "unknown location".to_owned());
            anyhow!(
                "failed to parse yaml in {} at {}: {}",
                origin,
                location,
                error
            )
        })?;
        config
            .validate()
            .with_context(|| format!("invalid pipeline config {}", origin))?;
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    PipelineConfig::from_yaml_str(&contents, &path.display().to_string())
}
