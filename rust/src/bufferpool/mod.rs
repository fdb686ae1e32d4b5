use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::block::{Backing, Block, Buffer, FILE_BLOCK_SIZE, MEMORY_BLOCK_SIZE, Tier};
use crate::config::PoolConfig;
use crate::freelist::FreeList;
use crate::region::{self, Region};

// Pool ids let release() recognise blocks carved by some other pool.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unable to set up backing file {}: {source}", path.display())]
    BackingFile { path: PathBuf, source: io::Error },
    #[error("unable to map memory region: {source}")]
    MemoryRegion { source: io::Error },
    #[error("unable to flush backing file: {source}")]
    Flush { source: io::Error },
    #[error("invalid pool configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("unable to read config file {}: {source}", path.display())]
    ConfigFile { path: PathBuf, source: io::Error },
}

// How long the blocking branch of acquire may wait.
#[derive(Clone, Copy)]
enum Wait {
    Forever,
    For(Duration),
}

#[derive(Default)]
struct Counters {
    primary_hits: AtomicU64,
    fallbacks: AtomicU64,
    waits: AtomicU64,
    cancelled_waits: AtomicU64,
    overflows: AtomicU64,
    releases: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time view of a pool's counters and free lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Acquires served from the requested tier without waiting.
    pub primary_hits: u64,
    /// Acquires served from the other tier.
    pub fallbacks: u64,
    /// Acquires that went into the blocking wait.
    pub waits: u64,
    /// Blocking waits that ended without a buffer (interrupted or timed out).
    pub cancelled_waits: u64,
    /// Overflow buffers handed out.
    pub overflows: u64,
    /// Releases that put a block back on a free list.
    pub releases: u64,
    /// Releases that were dropped (overflow or foreign buffers).
    pub discarded: u64,
    pub free_memory_blocks: usize,
    pub free_file_blocks: usize,
}

/// A fixed-block buffer pool with a memory tier and a memory-mapped file tier.
///
/// The memory tier lends 1024-byte blocks carved from an anonymous mapping;
/// the file tier lends 2048-byte blocks carved from a mapping of the backing
/// file. Each tier has its own free list and lock.
///
/// When the requested tier is empty the other tier is tried, so the returned
/// buffer may be either size. When both are empty the pool either waits for
/// a release on the requested tier (blocking mode) or hands out a fresh
/// 1024-byte overflow buffer that is dropped when released.
///
/// The pool is `Send + Sync`; share it between threads with an `Arc`.
pub struct ByteBufferPool {
    id: u64,
    memory: FreeList<Block>,
    file: FreeList<Block>,
    memory_region: Option<Arc<Region>>,
    file_region: Option<Arc<Region>>,
    backing_file: Option<PathBuf>,
    blocking: AtomicBool,
    sync_on_drop: bool,
    counters: Counters,
}

impl ByteBufferPool {
    /// Builds a pool with `memory_capacity` bytes of memory-tier blocks and
    /// `file_capacity` bytes of file-tier blocks mapped from `backing_file`.
    ///
    /// The file is only touched when `file_capacity > 0`.
    pub fn new(
        memory_capacity: usize,
        file_capacity: usize,
        backing_file: impl AsRef<Path>,
    ) -> Result<Self, PoolError> {
        let config = PoolConfig::new()
            .memory_capacity(memory_capacity)
            .file_capacity(file_capacity)
            .backing_file(backing_file.as_ref());
        Self::from_config(&config)
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        let memory_region = if config.memory_capacity > 0 {
            Region::anonymous(id, config.memory_capacity)
                .map_err(|source| PoolError::MemoryRegion { source })?
                .map(Arc::new)
        } else {
            None
        };

        let (file_region, backing_file) = if config.file_capacity > 0 {
            let path = config.backing_file.clone();
            let region = Region::file(id, config.file_capacity, &path)
                .map_err(|source| PoolError::BackingFile {
                    path: path.clone(),
                    source,
                })?
                .map(Arc::new);
            (region, Some(path))
        } else {
            (None, None)
        };

        let memory = Self::free_list_for(&memory_region);
        let file = Self::free_list_for(&file_region);

        debug!(
            pool = id,
            memory_blocks = memory.len(),
            file_blocks = file.len(),
            backing_file = ?backing_file,
            blocking = config.blocking_mode,
            "buffer pool initialized"
        );

        Ok(ByteBufferPool {
            id,
            memory,
            file,
            memory_region,
            file_region,
            backing_file,
            blocking: AtomicBool::new(config.blocking_mode),
            sync_on_drop: config.sync_on_drop,
            counters: Counters::default(),
        })
    }

    fn free_list_for(region: &Option<Arc<Region>>) -> FreeList<Block> {
        match region {
            Some(region) => FreeList::from_items(region::carve(Arc::clone(region))),
            None => FreeList::new(),
        }
    }

    fn free_list(&self, tier: Tier) -> &FreeList<Block> {
        match tier {
            Tier::Memory => &self.memory,
            Tier::File => &self.file,
        }
    }

    /// Lends a buffer, preferring the memory tier.
    ///
    /// Returns `None` only if the pool is in blocking mode and the wait was
    /// interrupted by [`ByteBufferPool::interrupt_waiters`].
    pub fn acquire_memory_buffer(&self) -> Option<Buffer> {
        self.acquire(Tier::Memory, Wait::Forever)
    }

    /// Lends a buffer, preferring the file tier.
    pub fn acquire_file_buffer(&self) -> Option<Buffer> {
        self.acquire(Tier::File, Wait::Forever)
    }

    /// Like [`ByteBufferPool::acquire_memory_buffer`], but a blocking wait
    /// gives up after `timeout`. Outside blocking mode the timeout is unused.
    pub fn acquire_memory_buffer_timeout(&self, timeout: Duration) -> Option<Buffer> {
        self.acquire(Tier::Memory, Wait::For(timeout))
    }

    pub fn acquire_file_buffer_timeout(&self, timeout: Duration) -> Option<Buffer> {
        self.acquire(Tier::File, Wait::For(timeout))
    }

    fn acquire(&self, primary: Tier, wait: Wait) -> Option<Buffer> {
        // Read before the first pop so an interrupt issued at any point during
        // this call cancels the wait below.
        let since = self.free_list(primary).epoch();

        if let Some(block) = self.free_list(primary).try_pop() {
            Counters::bump(&self.counters.primary_hits);
            trace!(pool = self.id, tier = ?primary, index = block.index(), "lent block");
            return Some(Buffer::pooled(block));
        }

        let secondary = primary.other();
        if let Some(block) = self.free_list(secondary).try_pop() {
            Counters::bump(&self.counters.fallbacks);
            debug!(
                pool = self.id,
                requested = ?primary,
                served = ?secondary,
                index = block.index(),
                "requested tier empty, lent block from other tier"
            );
            return Some(Buffer::pooled(block));
        }

        if !self.is_blocking_mode() {
            Counters::bump(&self.counters.overflows);
            debug!(pool = self.id, requested = ?primary, "both tiers empty, lent overflow buffer");
            return Some(Buffer::overflow());
        }

        Counters::bump(&self.counters.waits);
        trace!(pool = self.id, tier = ?primary, "both tiers empty, waiting for release");
        let list = self.free_list(primary);
        let block = match wait {
            Wait::Forever => list.blocking_pop(since),
            Wait::For(timeout) => list.blocking_pop_timeout(timeout, since),
        };
        match block {
            Some(block) => {
                trace!(pool = self.id, tier = ?primary, index = block.index(), "lent block after wait");
                Some(Buffer::pooled(block))
            }
            None => {
                Counters::bump(&self.counters.cancelled_waits);
                debug!(pool = self.id, tier = ?primary, "wait for block ended without a buffer");
                None
            }
        }
    }

    /// Returns a buffer to the pool.
    ///
    /// Pooled blocks go back on the free list matching their size, at the
    /// tail. Overflow buffers and blocks carved by another pool are dropped.
    /// The cursor of the next buffer lent from the block starts fresh; the
    /// bytes are not erased.
    pub fn release(&self, buffer: Buffer) {
        let block = match buffer.into_backing() {
            Backing::Pooled(block) => block,
            Backing::Overflow(_) => {
                Counters::bump(&self.counters.discarded);
                trace!(pool = self.id, "dropped overflow buffer");
                return;
            }
        };

        if block.pool_id() != self.id {
            Counters::bump(&self.counters.discarded);
            debug!(
                pool = self.id,
                owner = block.pool_id(),
                "dropped block released to a pool that did not carve it"
            );
            return;
        }

        let index = block.index();
        match block.len() {
            MEMORY_BLOCK_SIZE => self.memory.push(block),
            FILE_BLOCK_SIZE => self.file.push(block),
            len => {
                Counters::bump(&self.counters.discarded);
                debug!(pool = self.id, len, "dropped block of unrecognized size");
                return;
            }
        }
        Counters::bump(&self.counters.releases);
        trace!(pool = self.id, index, "block returned");
    }

    pub fn set_blocking_mode(&self, enabled: bool) {
        self.blocking.store(enabled, Ordering::SeqCst);
    }

    pub fn is_blocking_mode(&self) -> bool {
        self.blocking.load(Ordering::SeqCst)
    }

    /// Cancels every acquire call already in progress that ends up waiting
    /// for a block, on either tier, whether it is parked yet or not. Each of
    /// them returns `None`. Calls that start afterwards are unaffected.
    /// Returns how many parked waiters were woken.
    pub fn interrupt_waiters(&self) -> usize {
        let woken = self.memory.interrupt() + self.file.interrupt();
        debug!(pool = self.id, woken, "interrupted waiters");
        woken
    }

    /// Flushes the file tier's mapping to disk. A no-op without a file tier.
    pub fn flush(&self) -> Result<(), PoolError> {
        match &self.file_region {
            Some(region) => region.flush().map_err(|source| PoolError::Flush { source }),
            None => Ok(()),
        }
    }

    /// Starts flushing the file tier's mapping without waiting for it to finish.
    pub fn flush_async(&self) -> Result<(), PoolError> {
        match &self.file_region {
            Some(region) => region
                .flush_async()
                .map_err(|source| PoolError::Flush { source }),
            None => Ok(()),
        }
    }

    pub fn memory_block_count(&self) -> usize {
        self.memory_region.as_ref().map_or(0, |r| r.block_count())
    }

    pub fn file_block_count(&self) -> usize {
        self.file_region.as_ref().map_or(0, |r| r.block_count())
    }

    pub fn free_memory_blocks(&self) -> usize {
        self.memory.len()
    }

    pub fn free_file_blocks(&self) -> usize {
        self.file.len()
    }

    pub fn backing_file(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            primary_hits: c.primary_hits.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
            waits: c.waits.load(Ordering::Relaxed),
            cancelled_waits: c.cancelled_waits.load(Ordering::Relaxed),
            overflows: c.overflows.load(Ordering::Relaxed),
            releases: c.releases.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            free_memory_blocks: self.memory.len(),
            free_file_blocks: self.file.len(),
        }
    }
}

impl Drop for ByteBufferPool {
    fn drop(&mut self) {
        if self.sync_on_drop
            && let Err(e) = self.flush()
        {
            warn!(pool = self.id, error = %e, "flush on drop failed");
        }
    }
}
