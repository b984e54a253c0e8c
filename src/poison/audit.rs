//! Whole-heap poison audit.

use crate::allocators::arena::BlockIndex;
use crate::allocators::raw::RawHeap;
use crate::diagnostics::{Diagnostic, GH104, GH201};
use crate::error::PoisonError;

use super::verifier::PoisonVerifier;
use super::{BlockCheck, GuardSide};

/// What an audit walk found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// In-use blocks whose guards were read.
    pub blocks_checked: usize,
    /// First damaged block, where the walk stopped.
    pub offender: Option<(BlockIndex, GuardSide)>,
}

impl AuditReport {
    /// Whether every checked block was intact.
    pub fn is_clean(&self) -> bool {
        self.offender.is_none()
    }
}

/// Walk the block chain from the head and check every in-use block.
///
/// The caller must hold the heap's critical section for the whole call.
/// Stops at the first damaged block; blocks after it are not examined.
pub fn check_all<H: RawHeap + ?Sized>(
    verifier: &PoisonVerifier<'_>,
    heap: &H,
) -> Result<AuditReport, PoisonError> {
    if !heap.is_initialized() {
        verifier.report(Diagnostic::error(GH201, "poison audit on an uninitialized heap"));
        return Err(PoisonError::NotInitialized);
    }

    let block_count = heap.arena().block_count();
    let mut report = AuditReport::default();
    let mut cur = heap.successor(BlockIndex::HEAD).next;

    while cur != BlockIndex::HEAD {
        if cur.get() >= block_count {
            return Err(broken_chain(verifier, cur));
        }
        let succ = heap.successor(cur);
        if succ.next == BlockIndex::HEAD {
            break;
        }
        if succ.next <= cur {
            return Err(broken_chain(verifier, cur));
        }

        if !succ.free {
            report.blocks_checked += 1;
            if let BlockCheck::Damaged(side) = verifier.check_block(heap, cur)? {
                report.offender = Some((cur, side));
                break;
            }
        }
        cur = succ.next;
    }

    log::debug!(
        "poison audit checked {} blocks: {}",
        report.blocks_checked,
        if report.is_clean() { "clean" } else { "damaged" }
    );
    Ok(report)
}

fn broken_chain(verifier: &PoisonVerifier<'_>, block: BlockIndex) -> PoisonError {
    verifier.report(Diagnostic::error(
        GH104,
        format!("block chain does not advance past block {block}"),
    ));
    PoisonError::BrokenChain { block }
}
