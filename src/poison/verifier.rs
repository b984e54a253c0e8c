//! Checking guards of live allocations.

use crate::allocators::arena::{Arena, BlockIndex, HeapPtr};
use crate::allocators::raw::RawHeap;
use crate::debug::backtrace;
use crate::diagnostics::{Diagnostic, DiagnosticSink, GH001, GH101, GH102, GH103};
use crate::error::PoisonError;
use crate::util::dump::hex_dump;

use super::codec::GuardCodec;
use super::{BlockCheck, GuardSide, Inverted};

/// Reads guards back and reports what it finds to a diagnostic sink.
///
/// Checking is observational: a damaged guard is reported and returned,
/// never escalated here. What to do about it is the caller's decision.
pub struct PoisonVerifier<'a> {
    codec: &'a GuardCodec,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> PoisonVerifier<'a> {
    /// Create a verifier reporting to `sink`.
    pub fn new(codec: &'a GuardCodec, sink: &'a dyn DiagnosticSink) -> Self {
        Self { codec, sink }
    }

    pub(crate) fn report(&self, diag: Diagnostic) {
        self.sink.emit(&diag);
    }

    /// Whether all `len` bytes at `addr` hold the sentinel.
    ///
    /// On mismatch the whole region is dumped, labelled with `side`.
    pub fn check_region(
        &self,
        arena: &Arena,
        addr: HeapPtr,
        len: usize,
        side: GuardSide,
    ) -> Result<bool, PoisonError> {
        let bytes = arena.bytes(addr, len)?;
        if bytes.iter().all(|&b| b == self.codec.sentinel()) {
            return Ok(true);
        }

        self.report(
            Diagnostic::error(side.code(), format!("no poison {side} block"))
                .at(addr)
                .with_dump(hex_dump(bytes))
                .with_note(backtrace::capture()),
        );
        Ok(false)
    }

    /// Check both guards of the in-use block `block`.
    ///
    /// Calling this on a free block is misuse, reported as `GH101` and
    /// returned as [`PoisonError::FreeBlock`], never as damage. Stops at
    /// the first damaged guard.
    pub fn check_block<H: RawHeap + ?Sized>(
        &self,
        heap: &H,
        block: BlockIndex,
    ) -> Result<BlockCheck, PoisonError> {
        let arena = heap.arena();
        if heap.successor(block).free {
            self.report(
                Diagnostic::warning(GH101, format!("poison check called for free block {block}"))
                    .at(arena.block_start(block)),
            );
            return Err(PoisonError::FreeBlock { block });
        }

        let start = heap.payload_start(block);
        let (header, before, after) = (
            self.codec.header_size(),
            self.codec.guard_before(),
            self.codec.guard_after(),
        );
        if !arena.contains(start, self.codec.user_offset()) {
            return Err(PoisonError::OutOfArena {
                addr: start,
                len: self.codec.user_offset(),
            });
        }

        if !self.check_region(arena, start.add(header), before, GuardSide::Before)? {
            return Ok(BlockCheck::Damaged(GuardSide::Before));
        }

        let len = self.codec.read_header(arena, start)?;
        if len < self.codec.overhead() || !arena.contains(start, len) {
            let found = arena.bytes(start, header)?;
            self.report(
                Diagnostic::error(GH001, format!("length header claims {len} bytes"))
                    .at(start)
                    .with_dump(hex_dump(found))
                    .with_note(backtrace::capture()),
            );
            return Ok(BlockCheck::Damaged(GuardSide::Before));
        }

        if !self.check_region(arena, start.add(len - after), after, GuardSide::After)? {
            return Ok(BlockCheck::Damaged(GuardSide::After));
        }

        Ok(BlockCheck::Intact)
    }

    /// Map a poisoned pointer back to its raw region, checking the owning
    /// block on the way.
    ///
    /// `None` maps to `None` without touching the heap. The check result
    /// travels back in [`Inverted::check`]; it never changes the raw
    /// pointer.
    pub fn invert<H: RawHeap + ?Sized>(
        &self,
        heap: &H,
        user: Option<HeapPtr>,
    ) -> Result<Option<Inverted>, PoisonError> {
        let Some(user) = user else {
            return Ok(None);
        };
        let arena = heap.arena();

        let raw = user
            .checked_sub(self.codec.user_offset())
            .filter(|raw| arena.contains(*raw, 1));
        let Some(raw) = raw else {
            self.report(Diagnostic::warning(GH102, "pointer lies outside the arena").at(user));
            return Err(PoisonError::OutOfArena { addr: user, len: 1 });
        };

        // Truncated division, as the raw heap does it.
        let block = arena.block_index(raw)?;
        if heap.payload_start(block) != raw {
            self.report(
                Diagnostic::error(
                    GH103,
                    format!(
                        "unpoisoned pointer does not start block {block} (payload at {})",
                        heap.payload_start(block)
                    ),
                )
                .at(raw),
            );
            return Err(PoisonError::Misaligned { addr: raw, block });
        }
        if !heap.starts_chunk(block) {
            self.report(
                Diagnostic::error(
                    GH103,
                    format!("unpoisoned pointer falls on block {block}, which heads no chunk"),
                )
                .at(raw),
            );
            return Err(PoisonError::Misaligned { addr: raw, block });
        }

        let check = self.check_block(heap, block)?;
        Ok(Some(Inverted { raw, block, check }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::block::{BlockHeap, BlockHeapConfig};
    use crate::api::config::PoisonConfig;
    use crate::diagnostics::{CollectingSink, GH002};
    use crate::poison::writer::stamp;

    struct Fixture {
        heap: BlockHeap,
        codec: GuardCodec,
        sink: CollectingSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                heap: BlockHeap::new(BlockHeapConfig::default().with_base(0x4000)),
                codec: GuardCodec::new(&PoisonConfig::default()),
                sink: CollectingSink::new(),
            }
        }

        fn alloc(&mut self, size: usize) -> HeapPtr {
            let padded = self.codec.padded_size(size).unwrap();
            let raw = self.heap.malloc(padded);
            stamp(&self.codec, self.heap.arena_mut(), raw, padded)
                .unwrap()
                .unwrap()
        }

        fn poke(&mut self, addr: HeapPtr, byte: u8) {
            self.heap.arena_mut().bytes_mut(addr, 1).unwrap()[0] = byte;
        }

        fn invert(&self, user: HeapPtr) -> Result<Option<Inverted>, PoisonError> {
            PoisonVerifier::new(&self.codec, &self.sink).invert(&self.heap, Some(user))
        }
    }

    #[test]
    fn test_fresh_allocation_is_intact() {
        let mut fx = Fixture::new();
        let p = fx.alloc(10);

        let inverted = fx.invert(p).unwrap().unwrap();
        assert_eq!(inverted.raw, p.sub(6));
        assert_eq!(inverted.check, BlockCheck::Intact);

        // Checking does not disturb anything.
        assert!(fx.invert(p).unwrap().unwrap().check.is_intact());
        assert!(fx.sink.is_empty());
    }

    #[test]
    fn test_overrun_reports_after() {
        let mut fx = Fixture::new();
        let p = fx.alloc(10);
        fx.poke(p.add(10), 0xff);

        let inverted = fx.invert(p).unwrap().unwrap();
        assert_eq!(inverted.check, BlockCheck::Damaged(GuardSide::After));

        let diags = fx.sink.take();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, GH002);
        assert_eq!(diags[0].address, Some(p.add(10)));
        assert_eq!(diags[0].dump.as_deref(), Some(" 0xff 0xa5 0xa5 0xa5"));
    }

    #[test]
    fn test_underrun_reports_before_and_stops() {
        let mut fx = Fixture::new();
        let p = fx.alloc(10);
        fx.poke(p.sub(1), 0x00);
        fx.poke(p.add(10), 0x00);

        let inverted = fx.invert(p).unwrap().unwrap();
        assert_eq!(inverted.check, BlockCheck::Damaged(GuardSide::Before));
        let diags = fx.sink.take();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, GH001);
    }

    #[test]
    fn test_damaged_header_is_reported() {
        let mut fx = Fixture::new();
        let p = fx.alloc(10);
        fx.poke(p.sub(6), 0x01);

        let inverted = fx.invert(p).unwrap().unwrap();
        assert_eq!(inverted.check, BlockCheck::Damaged(GuardSide::Before));
        assert_eq!(fx.sink.take()[0].code, GH001);
    }

    #[test]
    fn test_free_block_is_misuse() {
        let mut fx = Fixture::new();
        let p = fx.alloc(10);
        fx.heap.free(Some(p.sub(6)));

        assert!(matches!(fx.invert(p), Err(PoisonError::FreeBlock { .. })));
        assert_eq!(fx.sink.take()[0].code, GH101);
    }

    #[test]
    fn test_pointer_outside_arena() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.invert(HeapPtr::new(0x10)),
            Err(PoisonError::OutOfArena { .. })
        ));
        assert_eq!(fx.sink.take()[0].code, GH102);
    }

    #[test]
    fn test_pointer_inside_payload_is_misaligned() {
        let mut fx = Fixture::new();
        let p = fx.alloc(32);
        assert!(matches!(
            fx.invert(p.add(3)),
            Err(PoisonError::Misaligned { .. })
        ));
        assert_eq!(fx.sink.take()[0].code, GH103);
    }

    #[test]
    fn test_interior_block_is_misaligned() {
        let mut fx = Fixture::new();
        let p = fx.alloc(64);

        // Block boundaries inside the live allocation and inside the
        // trailing free chunk.
        for user in [p.add(24), p.add(320)] {
            assert!(matches!(
                fx.invert(user),
                Err(PoisonError::Misaligned { .. })
            ));
            let diags = fx.sink.take();
            assert_eq!(diags.len(), 1);
            assert_eq!(diags[0].code, GH103);
        }
    }

    #[test]
    fn test_null_inverts_to_null() {
        let fx = Fixture::new();
        let verifier = PoisonVerifier::new(&fx.codec, &fx.sink);
        assert_eq!(verifier.invert(&fx.heap, None), Ok(None));
    }
}
