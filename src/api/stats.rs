//! Poisoned-heap statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::size::format_bytes;

/// Snapshot of poisoned-heap activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoisonStats {
    /// Successful allocations (plain and zeroed).
    pub allocations: u64,

    /// Allocation requests that yielded nothing.
    pub failed_allocations: u64,

    /// Resize calls forwarded to the raw heap.
    pub resizes: u64,

    /// Pointers handed back to the raw heap.
    pub releases: u64,

    /// Damaged guards found, inline or by audit.
    pub violations: u64,

    /// Completed audits.
    pub audits: u64,

    /// Payload bytes requested by successful allocations.
    pub bytes_requested: u64,
}

impl PoisonStats {
    /// Allocations not yet released.
    pub fn active_allocations(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }
}

impl std::fmt::Display for PoisonStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Poisoned Heap Statistics:")?;
        writeln!(f, "  Allocations:  {}", self.allocations)?;
        writeln!(f, "  Failed:       {}", self.failed_allocations)?;
        writeln!(f, "  Resizes:      {}", self.resizes)?;
        writeln!(f, "  Releases:     {}", self.releases)?;
        writeln!(f, "  Active:       {}", self.active_allocations())?;
        writeln!(f, "  Requested:    {}", format_bytes(self.bytes_requested))?;
        writeln!(f, "  Audits:       {}", self.audits)?;
        writeln!(f, "  Violations:   {}", self.violations)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    allocations: AtomicU64,
    failed_allocations: AtomicU64,
    resizes: AtomicU64,
    releases: AtomicU64,
    violations: AtomicU64,
    audits: AtomicU64,
    bytes_requested: AtomicU64,
}

impl StatsCounters {
    pub fn record_alloc(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_requested.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit(&self) {
        self.audits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoisonStats {
        PoisonStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            audits: self.audits.load(Ordering::Relaxed),
            bytes_requested: self.bytes_requested.load(Ordering::Relaxed),
        }
    }
}
