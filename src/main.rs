use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use edgecam::config::{load_config, BackendPreference, PipelineConfig, Resolution};
use edgecam::frame_source::{SourceFrame, StillFrameSource};
use edgecam::pipeline::FrameShadingPipeline;
use edgecam::plane::PlaneDescriptor;
use edgecam::shader_mode::ShaderMode;
use edgecam::still::edge_png_from_nv21;
use edgecam::yuv_packer::{pack, PlanarYuvFrame};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("EDGECAM_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "edgecam")]
#[command(about = "Camera frame packing and edge shading")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a pipeline config and report which backend would run.
    Check { config: Option<PathBuf> },
    /// Repack raw Y, U and V plane dumps into one NV21 buffer.
    Pack {
        #[arg(long)]
        width: usize,
        #[arg(long)]
        height: usize,
        #[arg(long)]
        y: PathBuf,
        #[arg(long)]
        u: PathBuf,
        #[arg(long)]
        v: PathBuf,
        /// Defaults to the frame width.
        #[arg(long)]
        y_row_stride: Option<usize>,
        /// Defaults to half the frame width times the chroma pixel stride.
        #[arg(long)]
        uv_row_stride: Option<usize>,
        #[arg(long, default_value_t = 1)]
        uv_pixel_stride: usize,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Write the Sobel edge map of an NV21 file as PNG.
    Edges {
        input: PathBuf,
        #[arg(long)]
        width: usize,
        #[arg(long)]
        height: usize,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Shade an image through the frame pipeline and capture the result.
    Render {
        image: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        mode: Option<ShaderMode>,
        #[arg(long, default_value_t = 1)]
        frames: u32,
        #[arg(long)]
        software: bool,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => run_check(config.as_deref()),
        Commands::Pack {
            width,
            height,
            y,
            u,
            v,
            y_row_stride,
            uv_row_stride,
            uv_pixel_stride,
            output,
        } => {
            let uv_row_stride = match uv_row_stride {
                Some(stride) => stride,
                None => (width / 2)
                    .checked_mul(uv_pixel_stride)
                    .ok_or_else(|| anyhow!("default chroma row stride overflows"))?,
            };
            let layout = PlaneLayout {
                y_row_stride: y_row_stride.unwrap_or(width),
                uv_row_stride,
                uv_pixel_stride,
            };
            run_pack(
                width,
                height,
                [y.as_path(), u.as_path(), v.as_path()],
                layout,
                &output,
            )
        }
        Commands::Edges {
            input,
            width,
            height,
            output,
        } => run_edges(&input, width, height, &output),
        Commands::Render {
            image,
            config,
            mode,
            frames,
            software,
            output,
        } => run_render(&image, config.as_deref(), mode, frames, software, &output),
    }
}

fn config_or_default(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_check(config_path: Option<&Path>) -> Result<()> {
    let config = config_or_default(config_path)?;
    let mut pipeline = pollster::block_on(FrameShadingPipeline::new(&config))?;

    println!(
        "OK: viewport {}x{}, source {}x{}, {} Hz, initial mode {}",
        config.viewport.width,
        config.viewport.height,
        config.source.width,
        config.source.height,
        config.refresh_hz,
        config.initial_mode
    );
    println!(
        "Backend: {}",
        if pipeline.is_gpu_backend() {
            "gpu"
        } else {
            "software"
        }
    );
    pipeline.release();
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct PlaneLayout {
    y_row_stride: usize,
    uv_row_stride: usize,
    uv_pixel_stride: usize,
}

fn read_plane(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read plane {}", path.display()))
}

fn run_pack(
    width: usize,
    height: usize,
    [y_path, u_path, v_path]: [&Path; 3],
    layout: PlaneLayout,
    output: &Path,
) -> Result<()> {
    let expected_luma = layout
        .y_row_stride
        .checked_mul(height.saturating_sub(1))
        .and_then(|rows| rows.checked_add(width))
        .ok_or_else(|| anyhow!("luma row stride {} overflows", layout.y_row_stride))?;

    let y = read_plane(y_path)?;
    let u = read_plane(u_path)?;
    let v = read_plane(v_path)?;

    let frame = PlanarYuvFrame::new(
        width,
        height,
        PlaneDescriptor::new(&y, layout.y_row_stride, 1),
        PlaneDescriptor::new(&u, layout.uv_row_stride, layout.uv_pixel_stride),
        PlaneDescriptor::new(&v, layout.uv_row_stride, layout.uv_pixel_stride),
    )?;
    let packed = pack(&frame);

    if y.len() < expected_luma {
        warn!(
            bytes = y.len(),
            expected = expected_luma,
            "luma plane is short, trailing samples were padded"
        );
    }

    fs::write(output, packed.as_bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), packed.len());
    Ok(())
}

fn run_edges(input: &Path, width: usize, height: usize, output: &Path) -> Result<()> {
    let packed = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let png = edge_png_from_nv21(&packed, width, height)?;
    fs::write(output, &png).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_render(
    image: &Path,
    config_path: Option<&Path>,
    mode: Option<ShaderMode>,
    frames: u32,
    software: bool,
    output: &Path,
) -> Result<()> {
    let frame = SourceFrame::open(image)?;
    let mut config = config_or_default(config_path)?;
    if config_path.is_none() {
        let size = Resolution {
            width: frame.width,
            height: frame.height,
        };
        config.viewport = size;
        config.source = size;
    }
    if let Some(mode) = mode {
        config.initial_mode = mode;
    }
    if software {
        config.backend = BackendPreference::Software;
    }

    let mut pipeline = pollster::block_on(FrameShadingPipeline::new(&config))?;
    let mut source = StillFrameSource::new(frame);

    for _ in 1..frames.max(1) {
        pipeline.render_frame(&mut source)?;
    }
    pipeline.request_capture();
    let rendered = pipeline.render_frame(&mut source)?;
    pipeline.release();

    let capture = rendered
        .capture
        .context("capture was requested but no image was produced")?;
    fs::write(output, &capture.png)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(mode = %rendered.mode, width = capture.width, height = capture.height, "capture written");
    println!("Wrote {}", output.display());
    Ok(())
}
