//! Edgecam pixel pipeline.
//!
//! Two independent paths over camera frames:
//!   - [`yuv_packer`] repacks a strided planar YUV 4:2:0 frame into NV21.
//!   - [`pipeline`] shades a streamed source frame with one of the
//!     [`shader_mode::ShaderMode`] kernels and reads back PNG captures on request.

pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod fps;
pub mod frame_source;
pub mod gpu;
pub mod kernels;
pub mod pipeline;
pub mod plane;
pub mod render_thread;
pub mod shader_mode;
pub mod software;
pub mod stats;
pub mod still;
pub mod transform;
pub mod yuv_packer;
