use std::fmt::{Display, Formatter};

use anyhow::Error;

/// Failures that callers may want to tell apart from generic context errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No GPU adapter could be acquired for the requested backend.
    NoAdapter,
    /// Shader module or render pipeline failed validation.
    ShaderCompile { label: String, message: String },
    /// Operation not valid in the pipeline's current state.
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no suitable GPU adapter found"),
            Self::ShaderCompile { label, message } => {
                write!(f, "shader program '{label}' failed to build: {message}")
            }
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while pipeline is {state}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    /// True for errors that prevent the pipeline from ever reaching `Ready`.
    pub fn is_fatal_at_init(&self) -> bool {
        matches!(self, Self::NoAdapter | Self::ShaderCompile { .. })
    }
}

pub fn find_pipeline_error(error: &Error) -> Option<&PipelineError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
}
