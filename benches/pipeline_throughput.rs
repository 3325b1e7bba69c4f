//! Benchmarks for queue and pipeline throughput
//!
//! Run with: cargo bench

use closable_pipeline::pipeline::stages::Identity;
use closable_pipeline::pipeline::{ClosableQueue, PipelineBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::thread;

fn bench_queue_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_round_trip");

    for capacity in [0usize, 16, 1024].iter() {
        let items = 10_000u64;
        group.throughput(Throughput::Elements(items));
        group.bench_with_input(
            BenchmarkId::new("put_consume", capacity),
            capacity,
            |b, &capacity| {
                b.iter(|| {
                    let queue = if capacity == 0 {
                        ClosableQueue::unbounded()
                    } else {
                        ClosableQueue::bounded(capacity)
                    };
                    let consumer = {
                        let queue = queue.clone();
                        thread::spawn(move || queue.consume().fold(0u64, |acc, x| acc + x))
                    };
                    for i in 0..items {
                        queue.put(black_box(i)).unwrap();
                    }
                    queue.close().unwrap();
                    queue.join().unwrap();
                    black_box(consumer.join().unwrap())
                });
            },
        );
    }

    group.finish();
}

fn bench_pipeline_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_depth");
    group.sample_size(20);

    for stages in [1usize, 3, 8].iter() {
        let items = 5_000u64;
        group.throughput(Throughput::Elements(items));
        group.bench_with_input(BenchmarkId::new("identity", stages), stages, |b, &stages| {
            b.iter(|| {
                let mut pipeline = (0..stages)
                    .fold(PipelineBuilder::<u64>::new().capacity(64), |builder, idx| {
                        builder.stage(format!("s{}", idx), Identity)
                    })
                    .build()
                    .unwrap();
                for i in 0..items {
                    pipeline.submit(black_box(i)).unwrap();
                }
                black_box(pipeline.run_to_completion().unwrap().count())
            });
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    group.sample_size(20);

    for workers in [1usize, 2, 4].iter() {
        let items = 2_000u64;
        group.throughput(Throughput::Elements(items));
        group.bench_with_input(BenchmarkId::new("workers", workers), workers, |b, &workers| {
            b.iter(|| {
                let mut pipeline = PipelineBuilder::<u64>::new()
                    .map("square", |x| x.wrapping_mul(x))
                    .shared_stage(
                        "spread",
                        workers,
                        closable_pipeline::pipeline::map(|x: u64| x.rotate_left(7)),
                    )
                    .build()
                    .unwrap();
                for i in 0..items {
                    pipeline.submit(i).unwrap();
                }
                black_box(pipeline.run_to_completion().unwrap().count())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_round_trip,
    bench_pipeline_depth,
    bench_fan_out,
);

criterion_main!(benches);
