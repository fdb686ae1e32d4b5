use bytebufferpool::bufferpool::ByteBufferPool;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::io::Write;
use std::sync::Arc;
use std::thread;

const PAYLOAD: &[u8] = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";

fn pool_with_file_tier(memory_blocks: usize, file_blocks: usize) -> (tempfile::TempDir, ByteBufferPool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = ByteBufferPool::new(
        memory_blocks * 1024,
        file_blocks * 2048,
        dir.path().join("bench.dat"),
    )
    .expect("pool");
    (dir, pool)
}

/// Acquire then release from the requested tier, the common case.
fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release");
    let (_dir, pool) = pool_with_file_tier(64, 64);

    group.bench_function("memory_tier", |b| {
        b.iter(|| {
            let buf = pool.acquire_memory_buffer().unwrap();
            black_box(buf.len());
            pool.release(buf);
        })
    });

    group.bench_function("file_tier", |b| {
        b.iter(|| {
            let buf = pool.acquire_file_buffer().unwrap();
            black_box(buf.len());
            pool.release(buf);
        })
    });

    group.bench_function("memory_tier_with_write", |b| {
        b.iter(|| {
            let mut buf = pool.acquire_memory_buffer().unwrap();
            buf.write_all(black_box(PAYLOAD)).unwrap();
            buf.flip();
            pool.release(buf);
        })
    });

    group.finish();
}

/// Exhausted pools: cross-tier fallback and overflow allocation.
fn bench_exhausted_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("exhausted");

    let (_dir, fallback_pool) = pool_with_file_tier(0, 16);
    group.bench_function("fallback_to_file_tier", |b| {
        b.iter(|| {
            let buf = fallback_pool.acquire_memory_buffer().unwrap();
            pool_release(&fallback_pool, buf);
        })
    });

    let overflow_pool = ByteBufferPool::new(0, 0, "unused.dat").expect("pool");
    group.bench_function("overflow", |b| {
        b.iter(|| {
            let buf = overflow_pool.acquire_memory_buffer().unwrap();
            pool_release(&overflow_pool, buf);
        })
    });

    group.finish();
}

fn pool_release(pool: &ByteBufferPool, buf: bytebufferpool::block::Buffer) {
    black_box(buf.is_overflow());
    pool.release(buf);
}

/// Several threads hammering one pool in blocking mode.
fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    const OPS_PER_THREAD: usize = 1_000;

    for threads in [1usize, 2, 4, 8] {
        let pool = Arc::new(ByteBufferPool::new(4 * 1024, 0, "unused.dat").expect("pool"));
        pool.set_blocking_mode(true);

        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..OPS_PER_THREAD {
                                let buf = pool.acquire_memory_buffer().unwrap();
                                black_box(buf.as_slice()[0]);
                                pool.release(buf);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_exhausted_paths,
    bench_contention
);
criterion_main!(benches);
