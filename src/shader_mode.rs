use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Per-pixel kernel applied by the shading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderMode {
    Raw,
    #[default]
    Edge,
    Grayscale,
    Invert,
}

impl ShaderMode {
    pub const ALL: [ShaderMode; 4] = [Self::Raw, Self::Edge, Self::Grayscale, Self::Invert];

    /// Next mode in the circular order RAW → EDGE → GRAYSCALE → INVERT → RAW.
    pub fn cycle(self) -> Self {
        match self {
            Self::Raw => Self::Edge,
            Self::Edge => Self::Grayscale,
            Self::Grayscale => Self::Invert,
            Self::Invert => Self::Raw,
        }
    }

    /// Human-facing label used in telemetry.
    pub fn label(self) -> &'static str {
        match self {
            Self::Raw => "Raw",
            Self::Edge => "Edge",
            Self::Grayscale => "Grayscale",
            Self::Invert => "Invert",
        }
    }

    /// Value of the `mode` field in the shading uniform.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Raw => 0,
            Self::Edge => 1,
            Self::Grayscale => 2,
            Self::Invert => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Raw,
            1 => Self::Edge,
            2 => Self::Grayscale,
            _ => Self::Invert,
        }
    }
}

impl fmt::Display for ShaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShaderMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "edge" => Ok(Self::Edge),
            "grayscale" | "gray" => Ok(Self::Grayscale),
            "invert" => Ok(Self::Invert),
            other => Err(format!(
                "unknown shader mode '{other}' (expected raw, edge, grayscale or invert)"
            )),
        }
    }
}

/// Lock-free cell for the active mode, written by any thread and read by the
/// render thread once per frame.
#[derive(Debug)]
pub struct AtomicShaderMode(AtomicU8);

impl AtomicShaderMode {
    pub fn new(mode: ShaderMode) -> Self {
        Self(AtomicU8::new(mode.as_u32() as u8))
    }

    pub fn load(&self) -> ShaderMode {
        ShaderMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, mode: ShaderMode) {
        self.0.store(mode.as_u32() as u8, Ordering::Release);
    }

    /// Advance to the next mode and return it. Concurrent cycles each advance
    /// exactly one step.
    pub fn cycle(&self) -> ShaderMode {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = ShaderMode::from_u8(current).cycle();
            match self.0.compare_exchange_weak(
                current,
                next.as_u32() as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}
