use std::io;
use std::sync::Arc;

use crate::region::Region;

pub const MEMORY_BLOCK_SIZE: usize = 1024;
pub const FILE_BLOCK_SIZE: usize = 2048;

// A Tier is one of the two buffer families, each with its own block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Memory,
    File,
}

impl Tier {
    pub const fn block_size(self) -> usize {
        match self {
            Tier::Memory => MEMORY_BLOCK_SIZE,
            Tier::File => FILE_BLOCK_SIZE,
        }
    }

    // The tier a request falls back to when this one is empty.
    pub const fn other(self) -> Tier {
        match self {
            Tier::Memory => Tier::File,
            Tier::File => Tier::Memory,
        }
    }
}

// A Block is a fixed-size, non-overlapping view into one backing region.
// Blocks are only created by carving, once per index, and are never cloned.
#[derive(Debug)]
pub struct Block {
    region: Arc<Region>,
    index: usize,
}

impl Block {
    pub(crate) fn new(region: Arc<Region>, index: usize) -> Self {
        Block { region, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tier(&self) -> Tier {
        self.region.tier()
    }

    pub fn len(&self) -> usize {
        self.tier().block_size()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    // byte offset of this block within its region.
    pub fn offset(&self) -> usize {
        self.index * self.len()
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.region.pool_id()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the range lies inside the region, which `self.region` keeps
        // mapped, and no other Block covers it.
        unsafe { std::slice::from_raw_parts(self.region.block_ptr(self.index), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes this the only live view.
        unsafe { std::slice::from_raw_parts_mut(self.region.block_ptr(self.index), self.len()) }
    }
}

/// Where the bytes of a [`Buffer`] live.
#[derive(Debug)]
pub enum Backing {
    /// A block carved from one of the pool's regions.
    Pooled(Block),
    /// A heap buffer handed out when the pool was exhausted. Never pooled.
    Overflow(Box<[u8]>),
}

/// A buffer lent out by [`ByteBufferPool`](crate::bufferpool::ByteBufferPool).
///
/// The buffer has a read/write cursor: bytes between `position` and `limit`
/// are what [`io::Write`] fills and [`io::Read`] drains. A freshly acquired
/// buffer has `position == 0` and `limit == len()`.
///
/// Callers must not assume the length matches the tier they asked for:
/// cross-tier fallback and overflow can hand back either block size.
#[derive(Debug)]
pub struct Buffer {
    backing: Backing,
    position: usize,
    limit: usize,
}

impl Buffer {
    pub(crate) fn pooled(block: Block) -> Self {
        let limit = block.len();
        Buffer {
            backing: Backing::Pooled(block),
            position: 0,
            limit,
        }
    }

    pub(crate) fn overflow() -> Self {
        Buffer {
            backing: Backing::Overflow(vec![0u8; MEMORY_BLOCK_SIZE].into_boxed_slice()),
            position: 0,
            limit: MEMORY_BLOCK_SIZE,
        }
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    pub(crate) fn into_backing(self) -> Backing {
        self.backing
    }

    pub fn block(&self) -> Option<&Block> {
        match &self.backing {
            Backing::Pooled(block) => Some(block),
            Backing::Overflow(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Pooled(block) => block.len(),
            Backing::Overflow(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // None for overflow buffers.
    pub fn tier(&self) -> Option<Tier> {
        match &self.backing {
            Backing::Pooled(block) => Some(block.tier()),
            Backing::Overflow(_) => None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.backing, Backing::Pooled(_))
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self.backing, Backing::Overflow(_))
    }

    // The whole block, regardless of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Pooled(block) => block.as_slice(),
            Backing::Overflow(data) => &data[..],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Pooled(block) => block.as_mut_slice(),
            Backing::Overflow(data) => &mut data[..],
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// # Panics
    ///
    /// Panics if `position` is past the current limit.
    pub fn set_position(&mut self, position: usize) {
        assert!(
            position <= self.limit,
            "position {position} past limit {}",
            self.limit
        );
        self.position = position;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Sets the limit, pulling the position back if it lies beyond it.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is past the end of the buffer.
    pub fn set_limit(&mut self, limit: usize) {
        assert!(
            limit <= self.len(),
            "limit {limit} past buffer length {}",
            self.len()
        );
        self.limit = limit;
        self.position = self.position.min(limit);
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    // Resets the cursor to cover the whole buffer. Contents are left as-is.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.len();
    }

    // Switches from writing to reading what was written.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        let start = self.position;
        self.as_mut_slice()[start..start + n].copy_from_slice(&buf[..n]);
        self.position += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        let start = self.position;
        buf[..n].copy_from_slice(&self.as_slice()[start..start + n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_tier_sizes() {
        assert_eq!(Tier::Memory.block_size(), 1024);
        assert_eq!(Tier::File.block_size(), 2048);
        assert_eq!(Tier::Memory.other(), Tier::File);
        assert_eq!(Tier::File.other(), Tier::Memory);
    }

    #[test]
    fn test_overflow_buffer() {
        let buf = Buffer::overflow();
        assert!(buf.is_overflow());
        assert!(!buf.is_pooled());
        assert_eq!(buf.tier(), None);
        assert_eq!(buf.len(), MEMORY_BLOCK_SIZE);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), MEMORY_BLOCK_SIZE);
        assert!(buf.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_write_flip_read() {
        let mut buf = Buffer::overflow();
        buf.write_all(b"hello pool").unwrap();
        assert_eq!(buf.position(), 10);
        buf.flip();
        assert_eq!(buf.limit(), 10);
        let mut out = String::new();
        buf.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello pool");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_write_stops_at_limit() {
        let mut buf = Buffer::overflow();
        buf.set_limit(4);
        assert_eq!(buf.write(b"abcdef").unwrap(), 4);
        assert_eq!(buf.write(b"g").unwrap(), 0);
        assert!(buf.write_all(b"h").is_err());
        assert_eq!(&buf.as_slice()[..5], b"abcd\0");
    }

    #[test]
    fn test_clear_keeps_contents() {
        let mut buf = Buffer::overflow();
        buf.write_all(b"xyz").unwrap();
        buf.set_limit(2);
        assert_eq!(buf.position(), 2);
        buf.clear();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), buf.len());
        assert_eq!(&buf.as_slice()[..3], b"xyz");
    }

    #[test]
    #[should_panic(expected = "past limit")]
    fn test_position_past_limit_panics() {
        let mut buf = Buffer::overflow();
        buf.set_limit(8);
        buf.set_position(9);
    }
}
