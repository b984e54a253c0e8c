//! Synchronization primitives.
//!
//! Provides the critical section the poisoned heap runs every operation in.

pub(crate) mod critical;
