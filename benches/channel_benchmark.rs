//! Benchmarks for shared-memory channel operations.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use shm_worker::{Array, Channel, SharedMemoryManager};

/// Element counts per payload.
const PAYLOAD_LENS: [usize; 3] = [3, 1024, 64 * 1024];

fn bench_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_put_get");
    let manager = SharedMemoryManager::start();

    for len in PAYLOAD_LENS {
        let payload = Array::from_vec([len], (0..len as i32).collect()).unwrap();
        let mut channel: Channel<Array<i32>> =
            Channel::create_from_example(&manager, &payload, 8).unwrap();

        group.throughput(Throughput::Bytes((len * 4) as u64));
        group.bench_with_input(BenchmarkId::new("single", len), &len, |b, _| {
            b.iter(|| {
                channel.put(black_box(&payload)).unwrap();
                black_box(channel.get_all().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_drain_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_drain");
    let manager = SharedMemoryManager::start();

    for capacity in [8, 64] {
        let payload = Array::<f32>::zeros([1, 256]);
        let mut channel: Channel<Array<f32>> =
            Channel::create_from_example(&manager, &payload, capacity).unwrap();

        // Fill, then keep only the newest: the worker loop's access pattern.
        group.bench_with_input(
            BenchmarkId::new("latest_of", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    for _ in 0..capacity {
                        channel.put(&payload).unwrap();
                    }
                    black_box(channel.get_k(1).unwrap())
                });
            },
        );
    }

    group.finish();
}

fn bench_put_full(c: &mut Criterion) {
    let manager = SharedMemoryManager::start();
    let payload = Array::<u8>::zeros([16]);
    let mut channel: Channel<Array<u8>> =
        Channel::create_from_example(&manager, &payload, 1).unwrap();
    channel.put(&payload).unwrap();

    c.bench_function("channel_put_full", |b| {
        b.iter(|| black_box(channel.put(black_box(&payload)).is_err()));
    });
}

criterion_group!(benches, bench_put_get, bench_drain_full, bench_put_full);
criterion_main!(benches);
