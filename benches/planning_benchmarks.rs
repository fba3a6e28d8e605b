//! Benchmarks for the CPU-only planning and encoding stages.
//!
//! Run with: cargo bench

use std::hint::black_box;

use clipcast::{
    Orientation, PixelSize, RenderPlan, TimeRange,
    animated_image::{AnimatedImageWriter, DelaySchedule, sample_timestamps},
    frame_rate::estimate_from_timestamps,
    transcode::Retimer,
};
use criterion::Criterion;
use image::{Rgba, RgbaImage};

fn benchmark_render_plan(criterion: &mut Criterion) {
    let orientations = [
        Orientation::UP,
        Orientation::from_clockwise_degrees(90.0, false),
        Orientation::from_clockwise_degrees(270.0, true),
    ];

    criterion.bench_function("render plan (4K into 1080p box)", |bencher| {
        bencher.iter(|| {
            for orientation in orientations {
                black_box(RenderPlan::compute(
                    black_box(PixelSize::new(3840, 2160)),
                    orientation,
                    (1920, 1080),
                ));
            }
        });
    });
}

fn benchmark_frame_rate_estimate(criterion: &mut Criterion) {
    let timestamps: Vec<f64> = (0..90).map(|index| index as f64 / 59.94).collect();

    criterion.bench_function("estimate frame rate (90 timestamps)", |bencher| {
        bencher.iter(|| estimate_from_timestamps(black_box(&timestamps)));
    });
}

fn benchmark_retimer(criterion: &mut Criterion) {
    let timestamps: Vec<f64> = (0..3600).map(|index| index as f64 / 60.0).collect();

    criterion.bench_function("retime one minute of 60 fps to 30 fps", |bencher| {
        bencher.iter(|| {
            let mut retimer = Retimer::new(30);
            for &timestamp in &timestamps {
                black_box(retimer.admit(timestamp));
            }
            retimer.frames_written()
        });
    });
}

fn benchmark_gif_sampling(criterion: &mut Criterion) {
    criterion.bench_function("sample grid and delays (60s at 15 fps)", |bencher| {
        bencher.iter(|| {
            let timestamps = sample_timestamps(black_box(TimeRange::new(0.0, 60.0)), 15);
            let total: u32 = DelaySchedule::new(15)
                .take(timestamps.len())
                .map(|delay| delay.centiseconds as u32)
                .sum();
            black_box(total)
        });
    });
}

fn benchmark_gif_encoding(criterion: &mut Criterion) {
    let size = PixelSize::new(320, 180);
    let frames: Vec<RgbaImage> = (0..10u8)
        .map(|index| {
            RgbaImage::from_fn(size.width, size.height, |x, y| {
                Rgba([(x as u8).wrapping_add(index * 20), y as u8, index * 25, 255])
            })
        })
        .collect();

    let mut group = criterion.benchmark_group("gif");
    group.sample_size(10);
    group.bench_function("encode 10 frames at 320x180", |bencher| {
        bencher.iter(|| {
            let mut writer = AnimatedImageWriter::new(Vec::new(), size, true).unwrap();
            for (frame, delay) in frames.iter().zip(DelaySchedule::new(15)) {
                writer.write_frame(frame.clone(), delay).unwrap();
            }
            black_box(writer.finish().unwrap().len())
        });
    });
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_render_plan,
    benchmark_frame_rate_estimate,
    benchmark_retimer,
    benchmark_gif_sampling,
    benchmark_gif_encoding,
);
criterion::criterion_main!(benches);
