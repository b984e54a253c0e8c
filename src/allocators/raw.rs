//! Contract of the raw block allocator that poisoning wraps.

use super::arena::{Arena, BlockIndex, HeapPtr};

/// Successor word of a block: the next block in address order plus the
/// block's own free-list flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Successor {
    /// Next block in the chain. `BlockIndex::HEAD` marks the terminal block.
    pub next: BlockIndex,
    /// Whether this block is on the free list.
    pub free: bool,
}

/// A block-based heap allocator living in an [`Arena`].
///
/// Implementations own free-list management, splitting and coalescing.
/// The poisoning layer only calls the primitives below and reads the block
/// chain; it never sets the free flag itself.
///
/// Block 0 is the list head: `successor(HEAD).next` is the first real
/// block, and the chain ends at the block whose own `next` is `HEAD`.
pub trait RawHeap {
    /// Allocate `size` bytes. `None` when exhausted or `size == 0`.
    fn malloc(&mut self, size: usize) -> Option<HeapPtr>;

    /// Resize the allocation at `ptr`, possibly relocating it.
    ///
    /// `None` as input behaves like `malloc`; a zero `size` frees `ptr`
    /// and returns `None`. On failure the original allocation is kept.
    fn realloc(&mut self, ptr: Option<HeapPtr>, size: usize) -> Option<HeapPtr>;

    /// Return an allocation to the free pool. `None` is a no-op.
    fn free(&mut self, ptr: Option<HeapPtr>);

    /// Successor word of `block`.
    fn successor(&self, block: BlockIndex) -> Successor;

    /// Whether `block` heads a chunk of the chain, free or in use.
    ///
    /// Blocks absorbed into a larger chunk carry stale successor words;
    /// this is `false` for them.
    fn starts_chunk(&self, block: BlockIndex) -> bool;

    /// Whether the heap has been set up.
    fn is_initialized(&self) -> bool;

    /// The backing arena.
    fn arena(&self) -> &Arena;

    /// The backing arena, mutably.
    fn arena_mut(&mut self) -> &mut Arena;

    /// Address `malloc` would return for an allocation starting at `block`.
    fn payload_start(&self, block: BlockIndex) -> HeapPtr {
        self.arena().block_start(block)
    }
}
