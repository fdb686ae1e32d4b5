use bytebufferpool::block::{Buffer, FILE_BLOCK_SIZE, MEMORY_BLOCK_SIZE, Tier};
use bytebufferpool::bufferpool::ByteBufferPool;
use bytebufferpool::config::PoolConfig;
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Integration tests driving the pool from many threads at once.
/// Both tiers are populated so fallback, overflow and waiting all get exercised.

fn identity(buf: &Buffer) -> Option<(Tier, usize)> {
    buf.block().map(|b| (b.tier(), b.index()))
}

#[test]
fn test_no_two_holders_share_a_block() {
    let dir = tempdir().unwrap();
    let pool = Arc::new(ByteBufferPool::new(8 * 1024, 4 * 2048, dir.path().join("pool.dat")).unwrap());
    let held: Arc<Mutex<HashSet<(Tier, usize)>>> = Arc::new(Mutex::new(HashSet::new()));
    let aliased = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..8)
        .map(|seed| {
            let pool = Arc::clone(&pool);
            let held = Arc::clone(&held);
            let aliased = Arc::clone(&aliased);
            thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(seed);
                for _ in 0..2_000 {
                    let buf = if rng.bool() {
                        pool.acquire_memory_buffer()
                    } else {
                        pool.acquire_file_buffer()
                    }
                    .unwrap();

                    let id = identity(&buf);
                    if let Some(id) = id {
                        if !held.lock().unwrap().insert(id) {
                            aliased.store(true, Ordering::SeqCst);
                        }
                    }
                    if rng.u8(..4) == 0 {
                        thread::yield_now();
                    }
                    if let Some(id) = id {
                        held.lock().unwrap().remove(&id);
                    }
                    pool.release(buf);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    assert!(!aliased.load(Ordering::SeqCst), "a block was lent to two holders at once");
    assert_eq!(pool.free_memory_blocks(), 8);
    assert_eq!(pool.free_file_blocks(), 4);
}

#[test]
fn test_block_contents_are_private_to_holder() {
    let pool = Arc::new(ByteBufferPool::new(4 * 1024, 0, "unused.dat").unwrap());
    pool.set_blocking_mode(true);

    let workers: Vec<_> = (0u8..6)
        .map(|tag| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..500 {
                    let mut buf = pool.acquire_memory_buffer().unwrap();
                    buf.as_mut_slice().fill(tag);
                    thread::yield_now();
                    assert!(buf.as_slice().iter().all(|b| *b == tag));
                    pool.release(buf);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(pool.stats().overflows, 0);
    assert_eq!(pool.free_memory_blocks(), 4);
}

#[test]
fn test_overflow_never_reenters_pool() {
    let pool = ByteBufferPool::new(3 * 1024, 0, "unused.dat").unwrap();

    let mut pooled: Vec<Buffer> = (0..3).map(|_| pool.acquire_memory_buffer().unwrap()).collect();
    let mut overflow = pool.acquire_memory_buffer().unwrap();
    assert!(overflow.is_overflow());
    overflow.write_all(b"OVERFLOW-TAG").unwrap();
    pool.release(overflow);

    for buf in pooled.drain(..) {
        pool.release(buf);
    }

    // Draining the whole tier again must only see the three carved blocks.
    let again: Vec<Buffer> = (0..3).map(|_| pool.acquire_memory_buffer().unwrap()).collect();
    for buf in &again {
        assert!(buf.is_pooled());
        assert_ne!(&buf.as_slice()[..12], b"OVERFLOW-TAG");
    }
    assert!(pool.acquire_memory_buffer().unwrap().is_overflow());
}

#[test]
fn test_blocking_acquire_wakes_within_bound() {
    let dir = tempdir().unwrap();
    let pool = Arc::new(ByteBufferPool::new(1024, 2048, dir.path().join("pool.dat")).unwrap());
    pool.set_blocking_mode(true);

    let mem = pool.acquire_memory_buffer().unwrap();
    let file = pool.acquire_memory_buffer().unwrap();
    assert_eq!(file.len(), FILE_BLOCK_SIZE);

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let buf = pool.acquire_memory_buffer();
            (buf.map(|b| b.len()), Instant::now())
        })
    };

    thread::sleep(Duration::from_millis(50));
    let released_at = Instant::now();
    pool.release(mem);

    let (len, woke_at) = waiter.join().unwrap();
    assert_eq!(len, Some(MEMORY_BLOCK_SIZE));
    assert!(woke_at.duration_since(released_at) < Duration::from_secs(2));
    pool.release(file);
}

#[test]
fn test_waiter_only_watches_requested_tier() {
    let dir = tempdir().unwrap();
    let pool = Arc::new(ByteBufferPool::new(1024, 2048, dir.path().join("pool.dat")).unwrap());
    pool.set_blocking_mode(true);

    let mem = pool.acquire_memory_buffer().unwrap();
    let file = pool.acquire_file_buffer().unwrap();

    // Releasing a file block does not satisfy a wait on the memory tier.
    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire_memory_buffer_timeout(Duration::from_millis(200)))
    };
    while pool.stats().waits == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    pool.release(file);
    assert!(waiter.join().unwrap().is_none());
    assert_eq!(pool.free_file_blocks(), 1);

    pool.release(mem);
}

#[test]
fn test_many_waiters_all_served() {
    let pool = Arc::new(ByteBufferPool::new(2 * 1024, 0, "unused.dat").unwrap());
    pool.set_blocking_mode(true);
    let held: Vec<Buffer> = (0..2).map(|_| pool.acquire_memory_buffer().unwrap()).collect();

    let waiters: Vec<_> = (0..6)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let buf = pool.acquire_memory_buffer().unwrap();
                thread::sleep(Duration::from_millis(5));
                pool.release(buf);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    for buf in held {
        pool.release(buf);
    }
    for w in waiters {
        w.join().unwrap();
    }
    assert_eq!(pool.free_memory_blocks(), 2);
    assert_eq!(pool.stats().overflows, 0);
}

#[test]
fn test_interrupt_releases_all_waiters() {
    let pool = Arc::new(ByteBufferPool::new(0, 0, "unused.dat").unwrap());
    pool.set_blocking_mode(true);

    let waiters: Vec<_> = (0..4)
        .map(|i| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                if i % 2 == 0 {
                    pool.acquire_memory_buffer().is_none()
                } else {
                    pool.acquire_file_buffer().is_none()
                }
            })
        })
        .collect();

    // Step 1: wait until all four calls have found both tiers empty
    while pool.stats().waits < 4 {
        thread::yield_now();
    }

    // Step 2: one interrupt cancels every one of them, parked or not
    pool.interrupt_waiters();
    for w in waiters {
        assert!(w.join().unwrap());
    }
    assert_eq!(pool.stats().cancelled_waits, 4);
}

#[test]
fn test_configured_pool_with_sync_on_drop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("synced.dat");
    let config = PoolConfig::new()
        .memory_capacity(1024)
        .file_capacity(3 * 2048)
        .backing_file(&path)
        .sync_on_drop(true);

    {
        let pool = ByteBufferPool::from_config(&config).unwrap();
        let mut buf = pool.acquire_file_buffer().unwrap();
        buf.write_all(b"persisted block").unwrap();
        pool.release(buf);
    }

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 3 * 2048);
    assert_eq!(&bytes[..15], b"persisted block");
}

#[test]
fn test_blocking_toggle_while_running() {
    let pool = Arc::new(ByteBufferPool::new(1024, 0, "unused.dat").unwrap());
    let held = pool.acquire_memory_buffer().unwrap();

    assert!(pool.acquire_memory_buffer().unwrap().is_overflow());

    pool.set_blocking_mode(true);
    assert!(pool.acquire_memory_buffer_timeout(Duration::from_millis(10)).is_none());

    pool.set_blocking_mode(false);
    assert!(pool.acquire_memory_buffer().unwrap().is_overflow());

    pool.release(held);
    let stats = pool.stats();
    assert_eq!(stats.overflows, 2);
    assert_eq!(stats.waits, 1);
    assert_eq!(stats.releases, 1);
}
