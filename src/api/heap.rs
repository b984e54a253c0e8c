//! The poisoned heap: guard-wrapped allocate, resize, release and audit.

use std::sync::Arc;

use crate::allocators::arena::HeapPtr;
use crate::allocators::raw::RawHeap;
use crate::api::config::{PoisonConfig, ViolationPolicy};
use crate::api::stats::{PoisonStats, StatsCounters};
use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink, GH102, GH301};
use crate::error::PoisonError;
use crate::poison::audit::{self, AuditReport};
use crate::poison::codec::GuardCodec;
use crate::poison::verifier::PoisonVerifier;
use crate::poison::writer::stamp;
use crate::poison::{BlockCheck, Inverted};
use crate::sync::critical::CriticalSection;

/// A raw block heap with guard bytes around every allocation.
///
/// Every operation runs inside one critical section over the raw heap, so
/// guard checks done by `resize` and `release` are atomic with the raw
/// mutation that follows them, and an audit sees a frozen block chain.
///
/// # Example
///
/// ```rust
/// use guardheap::{BlockHeap, BlockHeapConfig, PoisonConfig, PoisonHeap};
///
/// let heap = PoisonHeap::new(BlockHeap::new(BlockHeapConfig::default()), PoisonConfig::default());
///
/// let p = heap.allocate(10).unwrap();
/// heap.write(p, b"0123456789").unwrap();
/// assert_eq!(heap.audit_heap(), Ok(true));
///
/// // One byte past the payload lands in the trailing guard.
/// heap.write(p.add(10), &[0xff]).unwrap();
/// assert_eq!(heap.audit_heap(), Ok(false));
/// ```
pub struct PoisonHeap<H: RawHeap> {
    codec: GuardCodec,
    policy: ViolationPolicy,
    heap: CriticalSection<H>,
    sink: Arc<dyn DiagnosticSink>,
    stats: StatsCounters,
}

impl<H: RawHeap> PoisonHeap<H> {
    /// Wrap `heap`, reporting through the `log` crate.
    pub fn new(heap: H, config: PoisonConfig) -> Self {
        Self::with_sink(heap, config, Arc::new(LogSink))
    }

    /// Wrap `heap`, reporting to a custom sink.
    pub fn with_sink(heap: H, config: PoisonConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            codec: GuardCodec::new(&config),
            policy: config.policy,
            heap: CriticalSection::new(heap),
            sink,
            stats: StatsCounters::default(),
        }
    }

    /// Guard geometry in use.
    pub fn codec(&self) -> &GuardCodec {
        &self.codec
    }

    /// Violation policy in use.
    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    /// Allocate `size` payload bytes surrounded by guards.
    ///
    /// `None` when the raw heap is exhausted, the padded size overflows,
    /// or `size` is zero and the raw heap hands out nothing for it.
    pub fn allocate(&self, size: usize) -> Option<HeapPtr> {
        let Some(padded) = self.padded(size) else {
            self.stats.record_failed();
            return None;
        };

        let mut heap = self.heap.enter("poison_malloc");
        let raw = heap.malloc(padded);
        self.finish_alloc(&mut *heap, raw, padded, size)
    }

    /// Allocate `count * item_size` zeroed payload bytes.
    ///
    /// An overflowing product is an allocation failure, never a smaller
    /// allocation.
    pub fn allocate_zeroed(&self, count: usize, item_size: usize) -> Option<HeapPtr> {
        let Some(size) = count.checked_mul(item_size) else {
            self.sink.emit(&Diagnostic::warning(
                GH301,
                format!("zeroed request of {count} x {item_size} bytes overflows"),
            ));
            self.stats.record_failed();
            return None;
        };
        let Some(padded) = self.padded(size) else {
            self.stats.record_failed();
            return None;
        };

        let mut heap = self.heap.enter("poison_calloc");
        let raw = heap.malloc(padded);
        if let Some(raw) = raw {
            // Header and guards are stamped over the zeroes afterwards.
            if let Err(err) = heap.arena_mut().bytes_mut(raw, padded).map(|b| b.fill(0)) {
                self.report_foreign_region(&err);
                heap.free(Some(raw));
                self.stats.record_failed();
                return None;
            }
        }
        self.finish_alloc(&mut *heap, raw, padded, size)
    }

    /// Resize the allocation at `ptr` to `new_size` payload bytes.
    ///
    /// The old guards are checked first. The region may move; guards are
    /// stamped fresh at the new boundaries either way. `None` as input
    /// allocates; zero `new_size` releases and yields `Ok(None)`. On
    /// exhaustion the result is `Ok(None)` and `ptr` stays valid.
    pub fn resize(
        &self,
        ptr: Option<HeapPtr>,
        new_size: usize,
    ) -> Result<Option<HeapPtr>, PoisonError> {
        let mut heap = self.heap.enter("poison_realloc");
        let inverted = self.verifier().invert(&*heap, ptr)?;
        let raw = self.screen(inverted)?;

        let Some(padded) = self.padded(new_size) else {
            self.stats.record_failed();
            return Ok(None);
        };

        let moved = heap.realloc(raw, padded);
        let user = match stamp(&self.codec, heap.arena_mut(), moved, padded) {
            Ok(user) => user,
            Err(err) => {
                self.report_foreign_region(&err);
                return Err(err);
            }
        };

        match (raw, user) {
            (Some(_), Some(_)) => self.stats.record_resize(),
            (None, Some(_)) => self.stats.record_alloc(new_size),
            (Some(_), None) if new_size == 0 => self.stats.record_release(),
            (_, None) if new_size > 0 => self.stats.record_failed(),
            _ => {}
        }
        Ok(user)
    }

    /// Check the guards of `ptr` and hand it back to the raw heap.
    ///
    /// `None` is a no-op. Pointers that do not map to a live block are
    /// rejected and never forwarded.
    pub fn release(&self, ptr: Option<HeapPtr>) -> Result<(), PoisonError> {
        let mut heap = self.heap.enter("poison_free");
        let inverted = self.verifier().invert(&*heap, ptr)?;
        let raw = self.screen(inverted)?;

        if raw.is_some() {
            self.stats.record_release();
        }
        heap.free(raw);
        Ok(())
    }

    /// Check every live allocation. `Ok(false)` at the first damaged one.
    ///
    /// An uninitialized raw heap is `Err(NotInitialized)`, which is not
    /// the same as a failed audit.
    pub fn audit_heap(&self) -> Result<bool, PoisonError> {
        self.audit_report().map(|report| report.is_clean())
    }

    /// Like [`audit_heap`](Self::audit_heap), with details.
    pub fn audit_report(&self) -> Result<AuditReport, PoisonError> {
        let heap = self.heap.enter("poison_check");
        let report = audit::check_all(&self.verifier(), &*heap)?;

        self.stats.record_audit();
        if !report.is_clean() {
            self.stats.record_violation();
        }
        Ok(report)
    }

    /// Check the guards of one allocation without touching it.
    pub fn check(&self, ptr: HeapPtr) -> Result<bool, PoisonError> {
        let heap = self.heap.enter("poison_check_ptr");
        let inverted = self.invert_live(&*heap, ptr)?;

        let intact = inverted.check.is_intact();
        if !intact {
            self.stats.record_violation();
        }
        Ok(intact)
    }

    /// Payload size recorded for the allocation at `ptr`.
    pub fn usable_size(&self, ptr: HeapPtr) -> Result<usize, PoisonError> {
        let heap = self.heap.enter("poison_usable_size");
        let inverted = self.invert_live(&*heap, ptr)?;
        if let BlockCheck::Damaged(side) = inverted.check {
            self.stats.record_violation();
            return Err(PoisonError::Corrupted { addr: ptr, side });
        }

        let padded = self.codec.read_header(heap.arena(), inverted.raw)?;
        Ok(self.codec.payload_size(padded).unwrap_or(0))
    }

    /// Copy `len` bytes starting at `ptr`.
    ///
    /// Bounds are checked against the arena, not the allocation: reading
    /// guard bytes is allowed.
    pub fn read(&self, ptr: HeapPtr, len: usize) -> Result<Vec<u8>, PoisonError> {
        let heap = self.heap.enter("poison_read");
        heap.arena().bytes(ptr, len).map(<[u8]>::to_vec)
    }

    /// Write `data` starting at `ptr`.
    ///
    /// Bounds are checked against the arena, not the allocation: writing
    /// past the payload damages guards exactly as a real overrun would.
    pub fn write(&self, ptr: HeapPtr, data: &[u8]) -> Result<(), PoisonError> {
        let mut heap = self.heap.enter("poison_write");
        heap.arena_mut()
            .bytes_mut(ptr, data.len())?
            .copy_from_slice(data);
        Ok(())
    }

    /// Run `f` on the raw heap inside the critical section.
    pub fn with_raw<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let mut heap = self.heap.enter("raw_access");
        f(&mut *heap)
    }

    /// Get current statistics.
    pub fn stats(&self) -> PoisonStats {
        self.stats.snapshot()
    }

    /// Tear down the poisoning layer and return the raw heap.
    pub fn into_inner(self) -> H {
        self.heap.into_inner()
    }

    fn verifier(&self) -> PoisonVerifier<'_> {
        PoisonVerifier::new(&self.codec, self.sink.as_ref())
    }

    fn padded(&self, size: usize) -> Option<usize> {
        let padded = self.codec.padded_size(size);
        if padded.is_none() {
            self.sink.emit(&Diagnostic::warning(
                GH301,
                format!("request of {size} bytes does not fit with guards and header"),
            ));
        }
        padded
    }

    fn finish_alloc(
        &self,
        heap: &mut H,
        raw: Option<HeapPtr>,
        padded: usize,
        size: usize,
    ) -> Option<HeapPtr> {
        match stamp(&self.codec, heap.arena_mut(), raw, padded) {
            Ok(Some(user)) => {
                self.stats.record_alloc(size);
                Some(user)
            }
            Ok(None) => {
                if size > 0 {
                    self.stats.record_failed();
                }
                None
            }
            Err(err) => {
                self.report_foreign_region(&err);
                heap.free(raw);
                self.stats.record_failed();
                None
            }
        }
    }

    fn report_foreign_region(&self, err: &PoisonError) {
        self.sink.emit(&Diagnostic::error(
            GH102,
            format!("raw heap returned a region outside its arena: {err}"),
        ));
    }

    fn invert_live(&self, heap: &H, ptr: HeapPtr) -> Result<Inverted, PoisonError> {
        self.verifier()
            .invert(heap, Some(ptr))?
            .ok_or(PoisonError::OutOfArena { addr: ptr, len: 1 })
    }

    /// Apply the violation policy to an inverted pointer.
    fn screen(&self, inverted: Option<Inverted>) -> Result<Option<HeapPtr>, PoisonError> {
        let Some(inverted) = inverted else {
            return Ok(None);
        };

        if let BlockCheck::Damaged(side) = inverted.check {
            self.stats.record_violation();
            let addr = inverted.raw.add(self.codec.user_offset());
            match self.policy {
                ViolationPolicy::Observe => self.sink.emit(
                    &Diagnostic::note(side.code(), "continuing despite damaged guard").at(addr),
                ),
                ViolationPolicy::Refuse => return Err(PoisonError::Corrupted { addr, side }),
                ViolationPolicy::Panic => panic!("guard {side} allocation {addr} is damaged"),
            }
        }
        Ok(Some(inverted.raw))
    }
}
