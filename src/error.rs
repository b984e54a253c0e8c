//! Error types for poisoned-heap operations.

use std::error::Error;
use std::fmt;

use crate::allocators::arena::{BlockIndex, HeapPtr};
use crate::poison::GuardSide;

/// Errors surfaced by [`PoisonHeap`](crate::PoisonHeap) operations.
///
/// Allocation exhaustion is not an error: it shows up as `None` from the
/// allocate operations, exactly like the raw heap reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoisonError {
    /// The raw heap has not been initialized yet.
    NotInitialized,
    /// An address range falls (partly) outside the arena.
    OutOfArena {
        /// First address of the range.
        addr: HeapPtr,
        /// Length of the range in bytes.
        len: usize,
    },
    /// A block-level check was requested for a block on the free list.
    FreeBlock {
        /// The offending block.
        block: BlockIndex,
    },
    /// The block index derived from an unpoisoned pointer does not start
    /// at that pointer. Guard math and the raw heap's block size disagree.
    Misaligned {
        /// The unpoisoned address.
        addr: HeapPtr,
        /// The block the address falls into.
        block: BlockIndex,
    },
    /// The block chain does not advance (corrupt successor word).
    BrokenChain {
        /// Block whose successor points backwards.
        block: BlockIndex,
    },
    /// Guard bytes were damaged and the configured policy refuses to
    /// hand the region back to the raw heap.
    Corrupted {
        /// User-visible address of the damaged allocation.
        addr: HeapPtr,
        /// Which guard failed first.
        side: GuardSide,
    },
}

impl fmt::Display for PoisonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "heap is not initialized"),
            Self::OutOfArena { addr, len } => {
                write!(f, "range {addr} (+{len} bytes) lies outside the arena")
            }
            Self::FreeBlock { block } => write!(f, "block {block} is on the free list"),
            Self::Misaligned { addr, block } => write!(
                f,
                "address {addr} does not start the payload of block {block}"
            ),
            Self::BrokenChain { block } => {
                write!(f, "block chain does not advance past block {block}")
            }
            Self::Corrupted { addr, side } => {
                write!(f, "guard {side} allocation {addr} is damaged")
            }
        }
    }
}

impl Error for PoisonError {}
