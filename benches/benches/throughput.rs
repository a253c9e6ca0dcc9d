//! Throughput benchmarks for the result queue and the pipe/framing path.
//!
//! Run with: `cargo bench --package tickpipe-bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use tickpipe_bench::{blocks, fixture_tick, run_pipeline, stream_bytes};
use tickpipe_lib::{
    AsyncOperation, BoundedBytePipe, Compression, PipeConfig, QueueConfig, ReaderConfig,
    ResultQueue,
};

const TICKS: usize = 50_000;

fn queue_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_queue");
    group.throughput(Throughput::Elements(TICKS as u64));

    group.bench_function("fill_then_drain", |b| {
        b.iter(|| {
            let queue = ResultQueue::new();
            for i in 0..TICKS {
                queue.set_result(fixture_tick(i));
            }
            queue.set_end();
            let mut n = 0;
            while let Ok(Some(tick)) = queue.next(None) {
                black_box(tick);
                n += 1;
            }
            n
        });
    });

    for initial in [16, QueueConfig::DEFAULT_SLOTS] {
        group.bench_with_input(
            BenchmarkId::new("concurrent", initial),
            &initial,
            |b, &initial| {
                let config = QueueConfig {
                    initial_capacity: initial,
                    grow_increment: initial,
                };
                b.iter(|| {
                    let Ok(queue) = ResultQueue::with_config(&config) else {
                        return 0;
                    };
                    let queue = Arc::new(queue);
                    let operation = AsyncOperation::from_queue(Arc::clone(&queue));
                    let producer = thread::spawn(move || {
                        operation.begin(None);
                        for i in 0..TICKS {
                            operation.push(i);
                        }
                        operation.finish();
                    });
                    let mut sum = 0usize;
                    while let Ok(Some(i)) = queue.next(None) {
                        sum = sum.wrapping_add(i);
                    }
                    let _ = producer.join();
                    sum
                });
            },
        );
    }

    group.finish();
}

fn pipe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("byte_pipe");
    let payload = vec![7u8; 4 * 1024 * 1024];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for chunk in [512usize, 16 * 1024] {
        group.bench_with_input(BenchmarkId::new("write_read", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let Ok(pipe) = BoundedBytePipe::with_config(&PipeConfig::default()) else {
                    return 0;
                };
                let writer = pipe.clone();
                let data = payload.clone();
                let producer = thread::spawn(move || {
                    for piece in data.chunks(chunk) {
                        if writer.write(piece).is_err() {
                            break;
                        }
                    }
                    writer.close_write();
                });
                let mut buf = vec![0u8; chunk];
                let mut total = 0;
                while let Ok(n) = pipe.read_some(&mut buf, None) {
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                let _ = producer.join();
                total
            });
        });
    }

    group.finish();
}

fn framing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    group.sample_size(20);
    group.throughput(Throughput::Elements(TICKS as u64));

    for compression in [Compression::None, Compression::Deflate] {
        let Ok(bytes) = stream_bytes(TICKS, compression) else {
            continue;
        };
        group.bench_with_input(
            BenchmarkId::new("stream", compression),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let chunks = bytes.chunks(4096).map(<[u8]>::to_vec).collect();
                    run_pipeline(
                        chunks,
                        ReaderConfig::stream(compression),
                        &PipeConfig::default(),
                    )
                    .map(|s| s.dispatched)
                    .unwrap_or_default()
                });
            },
        );
    }

    if let Ok(lzma) = blocks(TICKS / 10, Compression::Lzma) {
        group.throughput(Throughput::Elements((TICKS / 10) as u64));
        group.bench_with_input(BenchmarkId::new("block", "lzma"), &lzma, |b, lzma| {
            b.iter(|| {
                run_pipeline(
                    lzma.clone(),
                    ReaderConfig::block(Compression::Lzma),
                    &PipeConfig::default(),
                )
                .map(|s| s.dispatched)
                .unwrap_or_default()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, queue_benchmark, pipe_benchmark, framing_benchmark);
criterion_main!(benches);
