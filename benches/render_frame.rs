//! Pixel pipeline benchmarks: NV21 packing and a software-shaded EDGE frame.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edgecam::config::{BackendPreference, PipelineConfig, Resolution};
use edgecam::frame_source::{SourceFrame, StillFrameSource};
use edgecam::pipeline::FrameShadingPipeline;
use edgecam::plane::PlaneDescriptor;
use edgecam::shader_mode::ShaderMode;
use edgecam::yuv_packer::{pack, PlanarYuvFrame};

fn bench_pack(c: &mut Criterion) {
    let (width, height) = (1280, 720);
    let row_stride = 1344;
    let luma = vec![128u8; row_stride * height];
    let chroma = vec![64u8; row_stride * height / 2];

    let mut group = c.benchmark_group("pack");
    group.bench_function("i420_720p_padded", |b| {
        b.iter(|| {
            let frame = PlanarYuvFrame::new(
                width,
                height,
                PlaneDescriptor::new(&luma, row_stride, 1),
                PlaneDescriptor::new(&chroma, row_stride / 2, 1),
                PlaneDescriptor::new(&chroma, row_stride / 2, 1),
            )
            .expect("frame");
            black_box(pack(&frame))
        });
    });
    group.bench_function("semi_planar_720p", |b| {
        b.iter(|| {
            let frame = PlanarYuvFrame::new(
                width,
                height,
                PlaneDescriptor::new(&luma, row_stride, 1),
                PlaneDescriptor::new(&chroma, row_stride, 2),
                PlaneDescriptor::new(&chroma[1..], row_stride, 2),
            )
            .expect("frame");
            black_box(pack(&frame))
        });
    });
    group.finish();
}

fn bench_software_edge(c: &mut Criterion) {
    let size = Resolution {
        width: 320,
        height: 240,
    };
    let config = PipelineConfig {
        viewport: size,
        source: size,
        initial_mode: ShaderMode::Edge,
        backend: BackendPreference::Software,
        refresh_hz: 30,
    };
    let frame = SourceFrame::solid(size.width, size.height, [120, 80, 40, 255]).expect("frame");
    let mut pipeline = FrameShadingPipeline::new_software(&config).expect("create pipeline");

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(20);
    group.bench_function("software_edge_240p", |b| {
        b.iter(|| {
            let mut source = StillFrameSource::new(frame.clone());
            black_box(pipeline.render_frame(&mut source).expect("render"))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_pack, bench_software_edge);
criterion_main!(benches);
