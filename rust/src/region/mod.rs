//! Backing Regions and the carving of a region into blocks.
//!
//! Each tier owns at most one region: an anonymous mapping for
//! [`Tier::Memory`] and a read-write file mapping for [`Tier::File`]. A
//! region is sized to an exact multiple of its tier's block size, mapped
//! once, and never resized. Blocks hold an `Arc` to their region, so the
//! mapping stays valid for as long as any block of it is alive.

use memmap2::{MmapMut, MmapOptions};
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::block::{Block, Tier};

pub struct Region {
    map: MmapMut,
    // start of `map`, captured once so blocks can be handed out through `&self`.
    base: *mut u8,
    len: usize,
    tier: Tier,
    pool_id: u64,
    path: Option<PathBuf>,
}

// SAFETY: the mapping is created once and not moved or resized until Drop.
// Blocks carved from it cover disjoint byte ranges and each range is owned by
// exactly one `Block`, so no two threads reach the same bytes through a region.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

// Number of whole blocks of `tier` that fit in `capacity` bytes.
pub fn block_count(capacity: usize, tier: Tier) -> usize {
    capacity / tier.block_size()
}

// `capacity` rounded down to a multiple of the tier's block size.
pub fn floored_len(capacity: usize, tier: Tier) -> usize {
    block_count(capacity, tier) * tier.block_size()
}

impl Region {
    /// Maps an anonymous region for the memory tier.
    ///
    /// Returns `Ok(None)` when `capacity` holds no whole block.
    pub fn anonymous(pool_id: u64, capacity: usize) -> io::Result<Option<Region>> {
        let len = floored_len(capacity, Tier::Memory);
        if len == 0 {
            return Ok(None);
        }
        let map = MmapMut::map_anon(len)?;
        Ok(Some(Region::from_map(map, Tier::Memory, pool_id, None)))
    }

    /// Creates (or reuses) the file at `path`, sets its length to the floored
    /// capacity and maps it read-write.
    ///
    /// The file is always created and sized, even when `capacity` holds no
    /// whole block; in that case nothing is mapped and `Ok(None)` is returned.
    /// The file handle is closed before returning; the mapping outlives it.
    pub fn file(pool_id: u64, capacity: usize, path: &Path) -> io::Result<Option<Region>> {
        let len = floored_len(capacity, Tier::File);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(len as u64)?;
        if len == 0 {
            return Ok(None);
        }
        // SAFETY: the file was just sized to `len`. Concurrent external
        // truncation of the backing file is outside what the pool supports.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        Ok(Some(Region::from_map(
            map,
            Tier::File,
            pool_id,
            Some(path.to_path_buf()),
        )))
    }

    fn from_map(mut map: MmapMut, tier: Tier, pool_id: u64, path: Option<PathBuf>) -> Region {
        let base = map.as_mut_ptr();
        let len = map.len();
        Region {
            map,
            base,
            len,
            tier,
            pool_id,
            path,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn block_count(&self) -> usize {
        self.len / self.tier.block_size()
    }

    // Start address of block `index`. Callers guarantee `index < block_count()`.
    pub(crate) fn block_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.block_count());
        // SAFETY: index is in bounds, so the offset stays inside the mapping.
        unsafe { self.base.add(index * self.tier.block_size()) }
    }

    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }

    pub fn flush_async(&self) -> io::Result<()> {
        self.map.flush_async()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("tier", &self.tier)
            .field("len", &self.len)
            .field("pool_id", &self.pool_id)
            .field("path", &self.path)
            .finish()
    }
}

/// Walks the region start to end in block-size strides, producing one block
/// per stride in address order. Block `i` covers `[i*size, (i+1)*size)`.
pub fn carve(region: Arc<Region>) -> Vec<Block> {
    let count = region.block_count();
    debug!(
        tier = ?region.tier(),
        blocks = count,
        bytes = region.len(),
        "carved backing region"
    );
    (0..count)
        .map(|index| Block::new(Arc::clone(&region), index))
        .collect()
}
