//! Bounds-checked arena and the address types that index into it.
//!
//! Addresses are absolute (`base + offset`), so a pointer handed out by the
//! heap looks like a real embedded address. Every translation from address
//! to bytes or to a block goes through [`Arena`], which rejects anything
//! outside `[base, base + len)` instead of computing a garbage index.

use std::fmt;

use crate::error::PoisonError;

/// An address inside (or claimed to be inside) an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
    /// Wrap a raw address.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw address.
    pub const fn addr(self) -> usize {
        self.0
    }

    /// Address `n` bytes higher.
    ///
    /// # Panics
    ///
    /// Panics if the address overflows.
    pub fn add(self, n: usize) -> Self {
        match self.checked_add(n) {
            Some(ptr) => ptr,
            None => panic!("address {self} + {n} overflows"),
        }
    }

    /// Address `n` bytes lower.
    ///
    /// # Panics
    ///
    /// Panics if the address underflows.
    pub fn sub(self, n: usize) -> Self {
        match self.checked_sub(n) {
            Some(ptr) => ptr,
            None => panic!("address {self} - {n} underflows"),
        }
    }

    /// Checked [`add`](Self::add).
    pub fn checked_add(self, n: usize) -> Option<Self> {
        self.0.checked_add(n).map(Self)
    }

    /// Checked [`sub`](Self::sub).
    pub fn checked_sub(self, n: usize) -> Option<Self> {
        self.0.checked_sub(n).map(Self)
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Index of a fixed-size block within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(u16);

impl BlockIndex {
    /// The list-head block. Never handed out.
    pub const HEAD: BlockIndex = BlockIndex(0);

    /// Largest block number a 15-bit successor word can hold.
    pub const MAX: usize = 0x7FFF;

    /// Create a block index.
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// The index as a `usize`, for table lookups.
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contiguous byte region split into equal-size blocks.
pub struct Arena {
    base: usize,
    block_size: usize,
    bytes: Box<[u8]>,
}

impl Arena {
    /// Create a zeroed arena of `block_count` blocks of `block_size` bytes
    /// starting at address `base`.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero, if `block_count` exceeds
    /// [`BlockIndex::MAX`] + 1, or if the address range overflows.
    pub fn new(base: usize, block_size: usize, block_count: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        assert!(
            block_count <= BlockIndex::MAX + 1,
            "{block_count} blocks do not fit a 15-bit block number"
        );
        let len = block_size
            .checked_mul(block_count)
            .filter(|len| base.checked_add(*len).is_some())
            .unwrap_or_else(|| panic!("arena at 0x{base:x} overflows the address space"));

        Self {
            base,
            block_size,
            bytes: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// First address of the arena.
    pub fn base(&self) -> HeapPtr {
        HeapPtr(self.base)
    }

    /// Size of one block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.bytes.len() / self.block_size
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the arena holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `[addr, addr + len)` lies entirely inside the arena.
    pub fn contains(&self, addr: HeapPtr, len: usize) -> bool {
        self.offset(addr, len).is_ok()
    }

    fn offset(&self, addr: HeapPtr, len: usize) -> Result<usize, PoisonError> {
        let out = PoisonError::OutOfArena { addr, len };
        let start = addr.0.checked_sub(self.base).ok_or_else(|| out.clone())?;
        let end = start.checked_add(len).ok_or_else(|| out.clone())?;
        if end > self.bytes.len() {
            return Err(out);
        }
        Ok(start)
    }

    /// Borrow `len` bytes at `addr`.
    pub fn bytes(&self, addr: HeapPtr, len: usize) -> Result<&[u8], PoisonError> {
        let start = self.offset(addr, len)?;
        Ok(&self.bytes[start..start + len])
    }

    /// Mutably borrow `len` bytes at `addr`.
    pub fn bytes_mut(&mut self, addr: HeapPtr, len: usize) -> Result<&mut [u8], PoisonError> {
        let start = self.offset(addr, len)?;
        Ok(&mut self.bytes[start..start + len])
    }

    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy_within(&mut self, src: HeapPtr, dst: HeapPtr, len: usize) -> Result<(), PoisonError> {
        let from = self.offset(src, len)?;
        let to = self.offset(dst, len)?;
        self.bytes.copy_within(from..from + len, to);
        Ok(())
    }

    /// Block containing `addr`, by truncated division of its offset.
    pub fn block_index(&self, addr: HeapPtr) -> Result<BlockIndex, PoisonError> {
        let offset = self.offset(addr, 1)?;
        // block_count() <= BlockIndex::MAX + 1, checked in `new`
        Ok(BlockIndex((offset / self.block_size) as u16))
    }

    /// First address of `block`.
    pub fn block_start(&self, block: BlockIndex) -> HeapPtr {
        HeapPtr(self.base + block.get() * self.block_size)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.base())
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count())
            .finish()
    }
}
