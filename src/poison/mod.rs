//! The guard-byte protocol.
//!
//! A poisoned allocation is laid out, low to high address, as:
//!
//! ```text
//! +--------+--------------+-------------------+-------------+
//! | length | guard before |      payload      | guard after |
//! +--------+--------------+-------------------+-------------+
//! ^ raw pointer           ^ user pointer                    ^ raw + length
//! ```
//!
//! `length` is the padded size of the whole region, and is the only state
//! used to find the trailing guard again.

pub mod audit;
pub mod codec;
pub mod verifier;
pub mod writer;

use std::fmt;

use crate::allocators::arena::{BlockIndex, HeapPtr};
use crate::diagnostics::{DiagnosticCode, GH001, GH002};

pub use audit::AuditReport;
pub use codec::{GuardCodec, HeaderWidth};
pub use verifier::PoisonVerifier;

/// Which guard of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardSide {
    /// The guard between the length header and the payload.
    Before,
    /// The guard ending at the tail of the padded region.
    After,
}

impl GuardSide {
    /// Diagnostic code reported when this guard is damaged.
    pub fn code(self) -> DiagnosticCode {
        match self {
            GuardSide::Before => GH001,
            GuardSide::After => GH002,
        }
    }
}

impl fmt::Display for GuardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardSide::Before => "before",
            GuardSide::After => "after",
        })
    }
}

/// Outcome of checking one in-use block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCheck {
    /// Both guards hold the sentinel.
    Intact,
    /// The first guard found damaged. The other one may not have been read.
    Damaged(GuardSide),
}

impl BlockCheck {
    /// Whether both guards are intact.
    pub fn is_intact(self) -> bool {
        self == BlockCheck::Intact
    }
}

/// A poisoned pointer mapped back to its raw region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inverted {
    /// Start of the padded region, as the raw heap knows it.
    pub raw: HeapPtr,
    /// Block owning the region.
    pub block: BlockIndex,
    /// Guard state found while inverting.
    pub check: BlockCheck,
}
