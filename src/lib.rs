//! # guardheap
//!
//! Guard-byte poisoning and heap auditing for block-based embedded
//! allocators.
//!
//! ## Features
//!
//! - Sentinel guards before and after every payload, plus a length header
//! - Guard checks on every resize and release, near the point of overrun
//! - Whole-heap audit under one critical section
//! - Configurable reaction to damage: observe, refuse, or panic
//! - Diagnostic side channel with byte dumps (`log` by default)
//! - A reference first-fit block heap to wrap
//!
//! ## Quick Start
//!
//! ```rust
//! use guardheap::{BlockHeap, BlockHeapConfig, PoisonConfig, PoisonHeap};
//!
//! let heap = PoisonHeap::new(BlockHeap::new(BlockHeapConfig::default()), PoisonConfig::default());
//!
//! let p = heap.allocate(32).unwrap();
//! let p = heap.resize(Some(p), 64).unwrap().unwrap();
//! assert_eq!(heap.audit_heap(), Ok(true));
//! heap.release(Some(p)).unwrap();
//! ```

pub mod allocators;
pub mod api;
pub mod diagnostics;
pub mod error;
pub mod poison;

mod debug;
mod sync;
mod util;

// Re-export public API at crate root for convenience
pub use api::config::{PoisonConfig, ViolationPolicy};
pub use api::heap::PoisonHeap;
pub use api::stats::PoisonStats;
pub use error::PoisonError;

// Raw heap contract and reference implementation
pub use allocators::arena::{Arena, BlockIndex, HeapPtr};
pub use allocators::block::{BlockHeap, BlockHeapConfig};
pub use allocators::raw::{RawHeap, Successor};

// Guard protocol
pub use poison::{AuditReport, BlockCheck, GuardCodec, GuardSide, HeaderWidth};

// Diagnostics
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink, LogSink};
