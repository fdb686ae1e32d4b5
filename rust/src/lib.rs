//! # ByteBufferPool - Pre-allocated Scratch Buffers in Two Tiers
//!
//! A fixed-block buffer pool that hands out reusable byte buffers without
//! allocating per request. Blocks come from two backing regions carved once
//! at construction:
//!
//! - **Memory tier**: 1024-byte blocks from an anonymous memory mapping
//! - **File tier**: 2048-byte blocks from a read-write mapping of a backing file
//!
//! ## Features
//!
//! - **Two Independent Free Lists**: each tier has its own lock, so the tiers never contend
//! - **Cross-Tier Fallback**: an empty tier borrows from the other one
//! - **Overflow or Wait**: when both tiers are empty, either hand out a throwaway heap
//!   buffer or block until a block is released, selected at runtime
//! - **FIFO Reuse**: blocks are lent in the order they were released
//! - **Thread Safety**: `ByteBufferPool` is `Send + Sync`
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::io::Write;
//! use bytebufferpool::bufferpool::ByteBufferPool;
//!
//! // 2 memory blocks, no file tier.
//! let pool = ByteBufferPool::new(2048, 0, "unused.dat").unwrap();
//!
//! let mut a = pool.acquire_memory_buffer().unwrap();
//! let b = pool.acquire_memory_buffer().unwrap();
//! assert_eq!(a.len(), 1024);
//! a.write_all(b"request scratch").unwrap();
//!
//! // Both tiers are now empty: a non-pooled overflow buffer comes back.
//! let c = pool.acquire_memory_buffer().unwrap();
//! assert!(c.is_overflow());
//!
//! pool.release(a);
//! pool.release(b);
//! pool.release(c); // dropped, never pooled
//! assert_eq!(pool.free_memory_blocks(), 2);
//! ```
//!
//! ## File Tier and Fallback
//!
//! The returned buffer's size depends on which tier served it, not on which
//! tier was asked for:
//!
//! ```rust
//! use bytebufferpool::block::{Tier, FILE_BLOCK_SIZE};
//! use bytebufferpool::bufferpool::ByteBufferPool;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let pool = ByteBufferPool::new(0, 4096, dir.path().join("blocks.dat")).unwrap();
//!
//! let buf = pool.acquire_memory_buffer().unwrap();
//! assert_eq!(buf.tier(), Some(Tier::File));
//! assert_eq!(buf.len(), FILE_BLOCK_SIZE);
//! pool.release(buf);
//! pool.flush().unwrap();
//! ```
//!
//! ## Blocking Mode
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//! use bytebufferpool::bufferpool::ByteBufferPool;
//!
//! let pool = Arc::new(ByteBufferPool::new(1024, 0, "unused.dat").unwrap());
//! pool.set_blocking_mode(true);
//! let held = pool.acquire_memory_buffer().unwrap();
//!
//! let waiter = {
//!     let pool = Arc::clone(&pool);
//!     thread::spawn(move || pool.acquire_memory_buffer().map(|b| b.len()))
//! };
//! thread::sleep(Duration::from_millis(10));
//! pool.release(held);
//! assert_eq!(waiter.join().unwrap(), Some(1024));
//! ```
//!
//! A blocked acquire returns `None` if [`bufferpool::ByteBufferPool::interrupt_waiters`]
//! is called or, for the `_timeout` variants, when the timeout passes.
//!
//! ## Caller Contract
//!
//! `release` takes the buffer by value, so a buffer cannot be released twice
//! or used after release. A pooled buffer that is dropped instead of released
//! is lost to the pool. Writes to the file tier reach the disk when the OS
//! writes the mapping back or when `flush` is called.
//!
//! ## Performance Analysis
//!
//! ```bash
//! # Run a concurrent workload and print a report
//! cargo run --bin benchmark_runner
//!
//! # Run criterion benchmarks
//! cargo bench
//! ```

pub mod block;
pub mod bufferpool;
pub mod config;
pub mod freelist;
pub mod region;
