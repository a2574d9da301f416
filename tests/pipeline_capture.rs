use edgecam::config::{BackendPreference, PipelineConfig, Resolution};
use edgecam::frame_source::{LatestFrameSlot, SourceFrame, StillFrameSource};
use edgecam::pipeline::{FrameShadingPipeline, PipelineState};
use edgecam::shader_mode::ShaderMode;
use edgecam::transform;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 3;

fn config(mode: ShaderMode) -> PipelineConfig {
    let size = Resolution {
        width: WIDTH,
        height: HEIGHT,
    };
    PipelineConfig {
        viewport: size,
        source: size,
        initial_mode: mode,
        backend: BackendPreference::Software,
        refresh_hz: 60,
    }
}

/// Every pixel distinct so orientation mistakes show up.
fn gradient_source() -> SourceFrame {
    let mut rgba = Vec::new();
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            rgba.extend_from_slice(&[(x * 60) as u8, (y * 100) as u8, 40, 255]);
        }
    }
    SourceFrame::new(WIDTH, HEIGHT, rgba).expect("source frame")
}

fn capture_rgba(mode: ShaderMode, source: SourceFrame) -> Vec<u8> {
    let mut pipeline = FrameShadingPipeline::new_software(&config(mode)).expect("pipeline");
    let mut source = StillFrameSource::new(source);

    pipeline.request_capture();
    let rendered = pipeline.render_frame(&mut source).expect("render");
    let capture = rendered.capture.expect("capture requested");
    assert_eq!((capture.width, capture.height), (WIDTH, HEIGHT));

    image::load_from_memory(&capture.png)
        .expect("png decodes")
        .to_rgba8()
        .into_raw()
}

#[test]
fn raw_capture_is_upright_copy_of_source() {
    let source = gradient_source();
    assert_eq!(capture_rgba(ShaderMode::Raw, source.clone()), source.rgba);
}

#[test]
fn source_transform_is_applied_before_sampling() {
    // Horizontal mirror: s' = 1 - s.
    let mirror = transform::from_column_major([
        -1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        1.0, 0.0, 0.0, 1.0,
    ]);
    let source = gradient_source();
    let captured = capture_rgba(ShaderMode::Raw, source.clone().with_transform(mirror));

    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            let got = &captured[(y * WIDTH as usize + x) * 4..][..4];
            let mirrored_x = WIDTH as usize - 1 - x;
            let want = &source.rgba[(y * WIDTH as usize + mirrored_x) * 4..][..4];
            assert_eq!(got, want, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn invert_capture_complements_color_and_keeps_alpha() {
    let source = SourceFrame::solid(WIDTH, HEIGHT, [10, 100, 250, 200]).expect("source");
    let captured = capture_rgba(ShaderMode::Invert, source);

    for pixel in captured.chunks_exact(4) {
        assert_eq!(pixel, [245, 155, 5, 200]);
    }
}

#[test]
fn grayscale_capture_uses_rec601_weights() {
    let source = SourceFrame::solid(WIDTH, HEIGHT, [255, 0, 0, 255]).expect("source");
    let captured = capture_rgba(ShaderMode::Grayscale, source);

    // 0.299 * 255 = 76.2
    for pixel in captured.chunks_exact(4) {
        assert_eq!(pixel, [76, 76, 76, 255]);
    }
}

#[test]
fn edge_capture_of_uniform_source_is_opaque_black() {
    let source = SourceFrame::solid(WIDTH, HEIGHT, [90, 140, 30, 255]).expect("source");
    let captured = capture_rgba(ShaderMode::Edge, source);

    for pixel in captured.chunks_exact(4) {
        assert_eq!(pixel, [0, 0, 0, 255]);
    }
}

#[test]
fn edge_capture_highlights_vertical_boundary() {
    let mut rgba = Vec::new();
    for _ in 0..HEIGHT {
        for x in 0..WIDTH {
            let value = if x < WIDTH / 2 { 0 } else { 255 };
            rgba.extend_from_slice(&[value, value, value, 255]);
        }
    }
    let source = SourceFrame::new(WIDTH, HEIGHT, rgba).expect("source");
    let captured = capture_rgba(ShaderMode::Edge, source);

    for row in captured.chunks_exact(WIDTH as usize * 4) {
        let lumas: Vec<u8> = row.chunks_exact(4).map(|pixel| pixel[0]).collect();
        assert_eq!(lumas, [0, 255, 255, 0]);
    }
}

#[test]
fn repeated_requests_before_a_frame_yield_one_capture() {
    let mut pipeline =
        FrameShadingPipeline::new_software(&config(ShaderMode::Edge)).expect("pipeline");
    let handle = pipeline.handle();
    let mut source = LatestFrameSlot::new();

    handle.request_capture();
    handle.request_capture();
    assert!(handle.capture_pending());

    let first = pipeline.render_frame(&mut source).expect("render");
    let second = pipeline.render_frame(&mut source).expect("render");

    assert!(first.capture.is_some());
    assert!(second.capture.is_none());
    assert!(!handle.capture_pending());
    assert!(handle.last_capture_ms() > 0);
}

#[test]
fn mode_cycle_visits_every_kernel_in_order() {
    let mut pipeline =
        FrameShadingPipeline::new_software(&config(ShaderMode::Raw)).expect("pipeline");
    let handle = pipeline.handle();
    let mut source = StillFrameSource::new(gradient_source());

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(pipeline.render_frame(&mut source).expect("render").mode);
        handle.cycle_mode();
    }

    assert_eq!(
        seen,
        [
            ShaderMode::Raw,
            ShaderMode::Edge,
            ShaderMode::Grayscale,
            ShaderMode::Invert,
            ShaderMode::Raw
        ]
    );
    assert_eq!(pipeline.state(), PipelineState::Rendering);
}

#[test]
fn latest_published_frame_wins() {
    let mut pipeline =
        FrameShadingPipeline::new_software(&config(ShaderMode::Raw)).expect("pipeline");
    let slot = LatestFrameSlot::new();
    slot.publish(SourceFrame::solid(WIDTH, HEIGHT, [255, 0, 0, 255]).expect("red"))
        .expect("publish");
    slot.publish(SourceFrame::solid(WIDTH, HEIGHT, [0, 0, 255, 255]).expect("blue"))
        .expect("publish");

    pipeline.request_capture();
    let mut source = slot.clone();
    let rendered = pipeline.render_frame(&mut source).expect("render");
    assert!(rendered.source_updated);

    let png = rendered.capture.expect("capture").png;
    let decoded = image::load_from_memory(&png).expect("decode").to_rgba8();
    assert!(decoded.pixels().all(|pixel| pixel.0 == [0, 0, 255, 255]));

    let (published, dropped) = slot.counters().expect("counters");
    assert_eq!((published, dropped), (2, 1));
}

#[test]
fn stats_report_label_and_capture_time() {
    let mut pipeline =
        FrameShadingPipeline::new_software(&config(ShaderMode::Invert)).expect("pipeline");
    let handle = pipeline.handle();
    let mut source = LatestFrameSlot::new();

    handle.request_capture();
    let capture = pipeline
        .render_frame(&mut source)
        .expect("render")
        .capture
        .expect("capture");

    let stats = handle.stats();
    assert_eq!(stats.mode, "Invert");
    assert_eq!(stats.timestamp, capture.timestamp_ms);
    assert!(stats.to_json().expect("json").contains("\"mode\":\"Invert\""));
}
