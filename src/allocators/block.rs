//! First-fit block heap.
//!
//! The arena is split into fixed-size blocks chained in address order.
//! Each block has a link entry (`next`, `prev`, free flag) kept in a table
//! beside the arena, so payloads start exactly at a block boundary.
//!
//! ```text
//! block:  0      1 ............ k ........... n-1
//!         HEAD   first chunk    next chunk    terminal (next = 0)
//! ```
//!
//! Free chunks are always coalesced with free neighbours, so a free chunk
//! is never followed by another free chunk.

use crate::util::size::kb;

use super::arena::{Arena, BlockIndex, HeapPtr};
use super::raw::{RawHeap, Successor};

/// Geometry of a [`BlockHeap`].
#[derive(Debug, Clone)]
pub struct BlockHeapConfig {
    /// Address of the first arena byte (default: 0x3FFE_8000)
    pub base: usize,

    /// Size of one block (default: 8 bytes)
    pub block_size: usize,

    /// Total arena size, rounded down to whole blocks (default: 8 KB)
    pub arena_size: usize,
}

impl Default for BlockHeapConfig {
    fn default() -> Self {
        Self {
            base: 0x3FFE_8000,
            block_size: 8,
            arena_size: kb(8),
        }
    }
}

impl BlockHeapConfig {
    /// Builder pattern: set the base address.
    pub fn with_base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    /// Builder pattern: set the block size.
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Builder pattern: set the arena size.
    pub fn with_arena_size(mut self, size: usize) -> Self {
        self.arena_size = size;
        self
    }

    /// Number of blocks this geometry yields.
    pub fn block_count(&self) -> usize {
        self.arena_size / self.block_size.max(1)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    next: u16,
    prev: u16,
    free: bool,
}

/// Reference [`RawHeap`] implementation.
pub struct BlockHeap {
    arena: Arena,
    links: Vec<Link>,
    initialized: bool,
}

impl BlockHeap {
    /// Create and initialize a heap.
    pub fn new(config: BlockHeapConfig) -> Self {
        let mut heap = Self::uninit(config);
        heap.init();
        heap
    }

    /// Create a heap whose arena exists but whose block chain is not set
    /// up yet. Call [`init`](Self::init) before allocating.
    ///
    /// # Panics
    ///
    /// Panics if the geometry yields fewer than 3 blocks.
    pub fn uninit(config: BlockHeapConfig) -> Self {
        let count = config.block_count();
        assert!(count >= 3, "block heap needs at least 3 blocks, got {count}");

        Self {
            arena: Arena::new(config.base, config.block_size, count),
            links: vec![Link::default(); count],
            initialized: false,
        }
    }

    /// (Re)initialize: one free chunk spanning everything between the head
    /// and the terminal block. Previous contents are discarded.
    pub fn init(&mut self) {
        let last = self.last();
        self.links.fill(Link::default());
        self.links[0] = Link { next: 1, prev: 0, free: false };
        self.links[1] = Link { next: last as u16, prev: 0, free: true };
        self.links[last] = Link { next: 0, prev: 1, free: false };

        let (base, len) = (self.arena.base(), self.arena.len());
        if let Ok(bytes) = self.arena.bytes_mut(base, len) {
            bytes.fill(0);
        }
        self.initialized = true;
        log::debug!(
            "block heap at {} initialized: {} blocks of {} bytes",
            base,
            self.links.len(),
            self.arena.block_size()
        );
    }

    /// Number of blocks currently on the free list.
    pub fn free_blocks(&self) -> usize {
        self.chunks().filter(|&c| self.links[c].free).map(|c| self.span(c)).sum()
    }

    /// Number of blocks currently handed out.
    pub fn used_blocks(&self) -> usize {
        self.chunks().filter(|&c| !self.links[c].free).map(|c| self.span(c)).sum()
    }

    fn last(&self) -> usize {
        self.links.len() - 1
    }

    fn chunks(&self) -> impl Iterator<Item = usize> + '_ {
        let first = self.links[0].next as usize;
        std::iter::successors(Some(first), move |&c| Some(self.links[c].next as usize))
            .take_while(move |&c| c != 0 && self.links[c].next != 0)
    }

    fn span(&self, c: usize) -> usize {
        self.links[c].next as usize - c
    }

    fn blocks_for(&self, size: usize) -> usize {
        let block_size = self.arena.block_size();
        size / block_size + usize::from(size % block_size != 0)
    }

    /// Chunk index of a live allocation starting at `ptr`.
    fn chunk_of(&self, ptr: HeapPtr) -> Option<usize> {
        let block = self.arena.block_index(ptr).ok()?;
        let c = block.get();
        if self.arena.block_start(block) != ptr {
            return None;
        }
        (self.is_chunk(c) && !self.links[c].free).then_some(c)
    }

    fn is_chunk(&self, c: usize) -> bool {
        c != 0 && c < self.last() && self.chunks().any(|chunk| chunk == c)
    }

    /// Cut `c` down to `need` blocks, leaving the rest as a free chunk.
    fn split(&mut self, c: usize, need: usize) {
        if self.span(c) <= need {
            return;
        }
        let rest = c + need;
        let next = self.links[c].next;
        self.links[rest] = Link { next, prev: c as u16, free: true };
        self.links[next as usize].prev = rest as u16;
        self.links[c].next = rest as u16;
    }

    /// Merge the chunk following `c` into `c`.
    fn absorb_next(&mut self, c: usize) {
        let next = self.links[c].next as usize;
        let after = self.links[next].next;
        self.links[c].next = after;
        self.links[after as usize].prev = c as u16;
    }

    fn shrink(&mut self, c: usize, need: usize) {
        self.split(c, need);
        let rest = self.links[c].next as usize;
        if self.links[rest].free {
            let after = self.links[rest].next as usize;
            if self.links[after].free {
                self.absorb_next(rest);
            }
        }
    }

    fn ptr_of(&self, c: usize) -> HeapPtr {
        self.arena.block_start(BlockIndex::new(c as u16))
    }
}

impl RawHeap for BlockHeap {
    fn malloc(&mut self, size: usize) -> Option<HeapPtr> {
        if size == 0 || !self.initialized {
            return None;
        }
        let need = self.blocks_for(size);
        let found = self
            .chunks()
            .find(|&c| self.links[c].free && self.span(c) >= need)?;

        self.split(found, need);
        self.links[found].free = false;
        log::trace!("malloc({size}) -> block {found} ({need} blocks)");
        Some(self.ptr_of(found))
    }

    fn realloc(&mut self, ptr: Option<HeapPtr>, size: usize) -> Option<HeapPtr> {
        let Some(ptr) = ptr else {
            return self.malloc(size);
        };
        if size == 0 {
            self.free(Some(ptr));
            return None;
        }
        let Some(c) = self.chunk_of(ptr) else {
            log::warn!("realloc of {ptr}, which is not a live allocation");
            return None;
        };

        let need = self.blocks_for(size);
        let have = self.span(c);
        if need <= have {
            self.shrink(c, need);
            return Some(ptr);
        }

        let next = self.links[c].next as usize;
        if self.links[next].free && have + self.span(next) >= need {
            self.absorb_next(c);
            self.shrink(c, need);
            return Some(ptr);
        }

        let moved = self.malloc(size)?;
        let len = have * self.arena.block_size();
        if let Err(err) = self.arena.copy_within(ptr, moved, len) {
            log::error!("realloc could not move {ptr} to {moved}: {err}");
            self.free(Some(moved));
            return None;
        }
        self.free(Some(ptr));
        log::trace!("realloc({size}) moved {ptr} -> {moved}");
        Some(moved)
    }

    fn free(&mut self, ptr: Option<HeapPtr>) {
        let Some(ptr) = ptr else {
            return;
        };
        let Some(c) = self.chunk_of(ptr) else {
            log::warn!("free of {ptr}, which is not a live allocation");
            return;
        };

        self.links[c].free = true;
        let next = self.links[c].next as usize;
        if self.links[next].free {
            self.absorb_next(c);
        }
        let prev = self.links[c].prev as usize;
        if prev != 0 && self.links[prev].free {
            self.absorb_next(prev);
        }
        log::trace!("free({ptr}) block {c}");
    }

    fn successor(&self, block: BlockIndex) -> Successor {
        let link = self.links[block.get()];
        Successor {
            next: BlockIndex::new(link.next),
            free: link.free,
        }
    }

    fn starts_chunk(&self, block: BlockIndex) -> bool {
        self.initialized && self.is_chunk(block.get())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn arena(&self) -> &Arena {
        &self.arena
    }

    fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }
}
