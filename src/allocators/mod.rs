//! The raw block allocator the poisoning layer wraps.
//!
//! [`raw::RawHeap`] is the contract; [`block::BlockHeap`] is the reference
//! implementation used by tests and benches.

pub mod arena;
pub mod block;
pub mod raw;
