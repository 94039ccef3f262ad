use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use image_dataset::transforms::vision::Pipeline;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Benchmarks for the augmentation pipelines.
///
/// This measures:
/// 1. The validation pipeline (resize + normalize) per output size
/// 2. The full training pipeline per output size, with a fixed RNG so every
///    run draws the same branches
///
/// To run these, use:
/// ```bash
/// cargo bench --bench pipeline_bench
/// ```

/// Output side lengths swept by every benchmark.
const SIZES: [u32; 3] = [128, 256, 512];

/// Synthetic 640x480 frame with a gradient and a dark border, roughly what
/// a downscaled radiograph looks like.
fn make_frame() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| {
        if x < 40 || x >= 600 || y < 20 || y >= 460 {
            Rgb([0, 0, 0])
        } else {
            let v = ((x + y) % 256) as u8;
            Rgb([v, v, v])
        }
    })
}

fn bench_valid(c: &mut Criterion) {
    let mut group = c.benchmark_group("Valid Pipeline");
    let frame = make_frame();
    group.throughput(Throughput::Elements(1));

    for &size in &SIZES {
        let pipeline = Pipeline::valid(size).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut rng = StdRng::seed_from_u64(0);
            b.iter(|| {
                let out = pipeline.apply_with_rng(frame.clone(), &mut rng).unwrap();
                black_box(out)
            })
        });
    }
    group.finish();
}

fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("Train Pipeline");
    let frame = make_frame();
    group.throughput(Throughput::Elements(1));
    group.sample_size(20);

    for &size in &SIZES {
        let pipeline = Pipeline::train(size).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut rng = StdRng::seed_from_u64(42);
            b.iter(|| {
                let out = pipeline.apply_with_rng(frame.clone(), &mut rng).unwrap();
                black_box(out)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_valid, bench_train);
criterion_main!(benches);
