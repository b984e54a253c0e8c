//! Integration tests for guardheap.

use std::sync::Arc;
use std::thread;

use guardheap::diagnostics::{GH001, GH002, GH103, GH201};
use guardheap::{
    BlockHeap, BlockHeapConfig, CollectingSink, DiagnosticKind, GuardCodec, GuardSide,
    HeaderWidth, HeapPtr, PoisonConfig, PoisonError, PoisonHeap, RawHeap, ViolationPolicy,
};
use proptest::prelude::*;

fn heap() -> (PoisonHeap<BlockHeap>, Arc<CollectingSink>) {
    heap_with(PoisonConfig::default())
}

fn heap_with(config: PoisonConfig) -> (PoisonHeap<BlockHeap>, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let heap = PoisonHeap::with_sink(
        BlockHeap::new(BlockHeapConfig::default()),
        config,
        sink.clone(),
    );
    (heap, sink)
}

#[test]
fn test_scenario_overrun_by_one() {
    let (heap, sink) = heap();

    let p = heap.allocate(10).unwrap();
    heap.write(p, &[0x42; 10]).unwrap();
    assert_eq!(heap.check(p), Ok(true));
    assert!(sink.is_empty());

    heap.write(p.add(10), &[0xFF]).unwrap();
    assert_eq!(heap.check(p), Ok(false));

    let diags = sink.take();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, GH002);
    assert!(diags[0].message.contains("after"));
}

#[test]
fn test_checking_is_idempotent() {
    let (heap, sink) = heap();
    let p = heap.allocate(24).unwrap();
    let before = heap.read(p.sub(6), 34).unwrap();

    for _ in 0..5 {
        assert_eq!(heap.check(p), Ok(true));
    }
    assert_eq!(heap.read(p.sub(6), 34).unwrap(), before);
    assert!(sink.is_empty());
}

#[test]
fn test_every_guard_byte_is_watched() {
    let codec = GuardCodec::new(&PoisonConfig::default());

    for offset in 1..=codec.guard_before() {
        let (heap, sink) = heap();
        let p = heap.allocate(16).unwrap();
        heap.write(p.sub(offset), &[0x00]).unwrap();
        assert_eq!(heap.check(p), Ok(false), "before guard byte -{offset}");
        assert_eq!(sink.take()[0].code, GH001);
    }

    for offset in 0..codec.guard_after() {
        let (heap, sink) = heap();
        let p = heap.allocate(16).unwrap();
        heap.write(p.add(16 + offset), &[0x00]).unwrap();
        assert_eq!(heap.check(p), Ok(false), "after guard byte +{offset}");
        assert_eq!(sink.take()[0].code, GH002);
    }
}

#[test]
fn test_payload_writes_are_never_flagged() {
    let (heap, sink) = heap();
    let p = heap.allocate(13).unwrap();
    heap.write(p, &[0x00; 13]).unwrap();
    heap.write(p, &[0xFF; 13]).unwrap();

    assert_eq!(heap.check(p), Ok(true));
    heap.release(Some(p)).unwrap();
    assert!(sink.is_empty());
}

#[test]
fn test_audit_empty_heap() {
    let (heap, _) = heap();
    assert_eq!(heap.audit_heap(), Ok(true));
}

#[test]
fn test_audit_stops_at_first_offender() {
    let (heap, sink) = heap();

    let a = heap.allocate(8).unwrap();
    let b = heap.allocate(8).unwrap();
    let c = heap.allocate(8).unwrap();
    let _d = heap.allocate(8).unwrap();
    heap.write(b.add(8), &[0x00]).unwrap();
    heap.write(c.sub(1), &[0x00]).unwrap();

    let report = heap.audit_report().unwrap();
    assert_eq!(report.blocks_checked, 2);
    let (block, side) = report.offender.unwrap();
    assert_eq!(side, GuardSide::After);
    assert_eq!(block, heap.with_raw(|raw| raw.arena().block_index(b.sub(6))).unwrap());

    // c was never examined.
    let diags = sink.take();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, GH002);

    assert_eq!(heap.check(a), Ok(true));
    assert_eq!(heap.audit_heap(), Ok(false));
}

#[test]
fn test_audit_uninitialized_heap() {
    let sink = Arc::new(CollectingSink::new());
    let heap = PoisonHeap::with_sink(
        BlockHeap::uninit(BlockHeapConfig::default()),
        PoisonConfig::default(),
        sink.clone(),
    );

    assert_eq!(heap.audit_heap(), Err(PoisonError::NotInitialized));
    assert_eq!(sink.take()[0].code, GH201);

    heap.with_raw(BlockHeap::init);
    assert_eq!(heap.audit_heap(), Ok(true));
}

#[test]
fn test_resize_preserves_payload_and_restamps() {
    let (heap, sink) = heap();

    let p = heap.allocate(10).unwrap();
    // Pin the neighbour so growing has to move.
    let _pin = heap.allocate(4).unwrap();
    heap.write(p, b"poisonous!").unwrap();

    let q = heap.resize(Some(p), 100).unwrap().unwrap();
    assert_ne!(q, p);
    assert_eq!(heap.read(q, 10).unwrap(), b"poisonous!");
    assert_eq!(heap.usable_size(q), Ok(100));
    assert_eq!(heap.check(q), Ok(true));

    let r = heap.resize(Some(q), 4).unwrap().unwrap();
    assert_eq!(heap.read(r, 4).unwrap(), b"pois");
    assert_eq!(heap.check(r), Ok(true));
    assert_eq!(heap.audit_heap(), Ok(true));
    assert!(sink.is_empty());
}

#[test]
fn test_release_with_damaged_guard_still_frees() {
    let (heap, sink) = heap();

    let intact = heap.allocate(8).unwrap();
    heap.release(Some(intact)).unwrap();
    assert!(sink.is_empty());

    let damaged = heap.allocate(8).unwrap();
    heap.write(damaged.add(9), &[0x11]).unwrap();
    heap.release(Some(damaged)).unwrap();

    let diags = sink.take();
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0].code, GH002);
    assert_eq!((diags[1].kind, diags[1].address), (DiagnosticKind::Note, Some(damaged)));
    assert_eq!(heap.with_raw(|raw| raw.used_blocks()), 0);
    assert_eq!(heap.stats().violations, 1);
}

#[test]
fn test_zeroed_allocation_clears_stale_bytes() {
    let (heap, _) = heap();

    let dirty = heap.allocate(16).unwrap();
    heap.write(dirty, &[0x77; 16]).unwrap();
    heap.release(Some(dirty)).unwrap();

    let p = heap.allocate_zeroed(4, 4).unwrap();
    assert_eq!(p, dirty);
    assert_eq!(heap.read(p, 16).unwrap(), vec![0u8; 16]);
    assert_eq!(heap.usable_size(p), Ok(16));
    assert_eq!(heap.check(p), Ok(true));
}

#[test]
fn test_exhaustion_yields_none() {
    let (heap, _) = heap();
    assert_eq!(heap.allocate(9000), None);
    assert_eq!(heap.allocate_zeroed(100, 100), None);
    assert_eq!(heap.stats().failed_allocations, 2);
}

#[test]
fn test_wide_header_and_custom_sentinel() {
    let config = PoisonConfig::default()
        .with_header(HeaderWidth::U32)
        .with_guards(8, 2)
        .with_sentinel(0x5A);
    let (heap, _) = heap_with(config);

    let p = heap.allocate(5).unwrap();
    assert_eq!(heap.read(p.sub(8), 8).unwrap(), vec![0x5A; 8]);
    assert_eq!(heap.read(p.add(5), 2).unwrap(), vec![0x5A; 2]);
    assert_eq!(heap.usable_size(p), Ok(5));
}

#[test]
fn test_concurrent_use_with_audits() {
    let heap = Arc::new(heap().0);

    let workers: Vec<_> = (0..4u8)
        .map(|id| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || {
                for round in 0..200usize {
                    let size = 1 + (round * 7 + id as usize) % 48;
                    let Some(p) = heap.allocate(size) else {
                        continue;
                    };
                    heap.write(p, &vec![id; size]).unwrap();
                    assert_eq!(heap.check(p), Ok(true));
                    heap.release(Some(p)).unwrap();
                }
            })
        })
        .collect();

    let auditor = {
        let heap = Arc::clone(&heap);
        thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(heap.audit_heap(), Ok(true));
            }
        })
    };

    for worker in workers {
        worker.join().unwrap();
    }
    auditor.join().unwrap();

    assert_eq!(heap.audit_heap(), Ok(true));
    assert_eq!(heap.stats().active_allocations(), 0);
}

#[test]
fn test_refuse_policy_on_resize_and_release() {
    let (heap, sink) = heap_with(PoisonConfig::default().with_policy(ViolationPolicy::Refuse));

    let p = heap.allocate(16).unwrap();
    heap.write(p, b"refuse me please").unwrap();
    heap.write(p.add(16), &[0x00]).unwrap();
    let used = heap.with_raw(|raw| raw.used_blocks());

    let refused = PoisonError::Corrupted { addr: p, side: GuardSide::After };
    assert_eq!(heap.resize(Some(p), 200), Err(refused.clone()));
    assert_eq!(heap.resize(Some(p), 0), Err(refused.clone()));
    assert_eq!(heap.release(Some(p)), Err(refused));

    assert_eq!(heap.with_raw(|raw| raw.used_blocks()), used);
    assert_eq!(heap.read(p, 16).unwrap(), b"refuse me please");
    let diags = sink.take();
    assert_eq!(diags.len(), 3);
    assert!(diags.iter().all(|d| d.code == GH002));
    assert_eq!(heap.stats().violations, 3);
}

#[test]
fn test_interior_block_pointer_is_misuse() {
    let (heap, sink) = heap();

    let p = heap.allocate(64).unwrap();
    let used = heap.with_raw(|raw| raw.used_blocks());

    // p + 24 lands on a block boundary inside p, p + 320 inside the free chunk.
    for bad in [p.add(24), p.add(320)] {
        assert!(matches!(heap.release(Some(bad)), Err(PoisonError::Misaligned { .. })));
        assert!(matches!(heap.resize(Some(bad), 4), Err(PoisonError::Misaligned { .. })));
        assert!(matches!(heap.check(bad), Err(PoisonError::Misaligned { .. })));
    }

    let diags = sink.take();
    assert_eq!(diags.len(), 6);
    assert!(diags.iter().all(|d| d.code == GH103));
    assert_eq!(heap.with_raw(|raw| raw.used_blocks()), used);
    assert_eq!(heap.stats().violations, 0);
    assert_eq!(heap.check(p), Ok(true));
}

#[test]
fn test_null_pointer_operations() {
    let (heap, sink) = heap();
    assert_eq!(heap.release(None), Ok(()));
    assert_eq!(heap.resize(None, 0), Ok(None));
    assert!(heap.resize(None, 8).unwrap().is_some());
    assert!(sink.is_empty());
    assert!(heap.check(HeapPtr::new(0)).is_err());
}

proptest! {
    #[test]
    fn prop_padded_size(size in 1usize..60_000) {
        let codec = GuardCodec::new(&PoisonConfig::default());
        let padded = codec.padded_size(size).unwrap();
        prop_assert!(padded > size);
        prop_assert_eq!(
            padded,
            codec.header_size() + codec.guard_before() + codec.guard_after() + size
        );
    }

    #[test]
    fn prop_resize_keeps_common_prefix(old in 1usize..300, new in 1usize..600, fill in any::<u8>()) {
        let (heap, sink) = heap();
        let p = heap.allocate(old).unwrap();
        heap.write(p, &vec![fill; old]).unwrap();

        let q = heap.resize(Some(p), new).unwrap().unwrap();
        let keep = old.min(new);
        prop_assert_eq!(heap.read(q, keep).unwrap(), vec![fill; keep]);
        prop_assert_eq!(heap.check(q), Ok(true));
        prop_assert_eq!(heap.usable_size(q), Ok(new));
        prop_assert!(sink.is_empty());
    }
}
