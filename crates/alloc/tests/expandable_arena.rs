//! Integration tests for the expandable arena

use core::alloc::Layout;

use nebula_alloc::allocator::{
    Allocator, ExpandableArena, HeapAllocator, StatisticsProvider, TrackedAllocator,
};
use nebula_alloc::{ArenaConfig, ErrorKind};
use pretty_assertions::assert_eq;

fn bytes(arena: &ExpandableArena<'_>, offset: usize, len: usize) -> Vec<u8> {
    let ptr = arena.ptr_at(offset).expect("offset outside the arena");
    unsafe { core::slice::from_raw_parts(ptr.as_ptr(), len).to_vec() }
}

#[test]
fn test_single_growth_covers_request() {
    let heap = HeapAllocator::new();

    for (capacity, request) in [(10, 40), (16, 1), (64, 65), (1, 1000)] {
        let arena = ExpandableArena::new(capacity, &heap).expect("Failed to create arena");
        unsafe {
            arena
                .allocate(Layout::from_size_align(capacity, 1).unwrap())
                .expect("Filling allocation failed");
            arena
                .allocate(Layout::from_size_align(request, 1).unwrap())
                .expect("Growing allocation failed");
        }

        assert_eq!(arena.generation(), 1, "capacity {capacity}, request {request}");
        assert!(arena.capacity() >= (capacity * 2 + 1).max(capacity + request));
        assert_eq!(arena.len(), capacity + request);
    }
}

#[test]
fn test_exact_growth_sizes() {
    let heap = HeapAllocator::new();

    let arena = ExpandableArena::new(10, &heap).unwrap();
    unsafe { arena.allocate(Layout::new::<[u8; 40]>()).unwrap() };
    assert_eq!(arena.capacity(), 50);

    let arena = ExpandableArena::new(16, &heap).unwrap();
    unsafe {
        arena.allocate(Layout::new::<[u8; 16]>()).unwrap();
        arena.allocate(Layout::new::<u8>()).unwrap();
    }
    assert_eq!(arena.capacity(), 33);
}

#[test]
fn test_over_aligned_requests_grow_once() {
    let heap = HeapAllocator::new();

    for align in [64, 4096] {
        let arena = ExpandableArena::new(10, &heap).unwrap();
        let wide = Layout::from_size_align(1, align).unwrap();
        unsafe {
            arena.allocate(Layout::new::<[u8; 10]>()).unwrap();
            let block = arena.allocate(wide).expect("Aligned allocation failed");
            assert_eq!(block.cast::<u8>().as_ptr() as usize % align, 0);
        }
        assert_eq!(arena.generation(), 1, "align {align}");
    }
}

#[test]
fn test_over_aligned_relocation_grows_once() {
    let heap = HeapAllocator::new();
    let arena = ExpandableArena::new(16, &heap).unwrap();
    let old = Layout::new::<[u8; 8]>();
    let new = Layout::from_size_align(32, 4096).unwrap();

    unsafe {
        let block = arena.allocate(old).unwrap();
        block.cast::<u8>().as_ptr().write_bytes(0x5E, 8);
        arena.allocate(old).unwrap();

        let moved = arena.reallocate(block.cast(), old, new).unwrap();
        assert_eq!(moved.cast::<u8>().as_ptr() as usize % 4096, 0);
        assert_eq!(
            core::slice::from_raw_parts(moved.cast::<u8>().as_ptr(), 8),
            &[0x5E; 8]
        );
    }
    assert_eq!(arena.generation(), 1);
}

#[test]
fn test_contents_preserved_across_repeated_growth() {
    let heap = HeapAllocator::new();
    let arena = ExpandableArena::new(4, &heap).unwrap();
    let mut offsets = Vec::new();

    for round in 0..8u8 {
        let layout = Layout::from_size_align(16, 4).unwrap();
        let block = unsafe { arena.allocate(layout).expect("Allocation failed") };
        unsafe { block.cast::<u8>().as_ptr().write_bytes(round, 16) };
        offsets.push(arena.offset_of(block.cast()).expect("block outside arena"));
    }

    assert!(arena.generation() >= 2);
    for (round, offset) in offsets.into_iter().enumerate() {
        assert_eq!(bytes(&arena, offset, 16), vec![round as u8; 16]);
    }
}

#[test]
fn test_realloc_grows_buffer_and_keeps_data() {
    let heap = HeapAllocator::new();
    let arena = ExpandableArena::new(8, &heap).unwrap();
    let old = Layout::new::<[u8; 8]>();
    let new = Layout::new::<[u8; 100]>();

    unsafe {
        let block = arena.allocate(old).unwrap();
        block.cast::<u8>().as_ptr().write_bytes(0x6D, 8);

        let grown = arena.reallocate(block.cast(), old, new).unwrap();
        assert_eq!(arena.offset_of(grown.cast()), Some(0));
        assert_eq!(arena.len(), 100);
        assert_eq!(arena.generation(), 1);
    }
    assert_eq!(bytes(&arena, 0, 8), vec![0x6D; 8]);
}

#[test]
fn test_failed_growth_reports_upstream_error() {
    let tracked = TrackedAllocator::with_budget(HeapAllocator::new(), 32);
    let arena = ExpandableArena::with_config(ArenaConfig::debug(16), &tracked).unwrap();

    unsafe {
        arena.allocate(Layout::new::<[u8; 12]>()).unwrap();
        let err = arena.allocate(Layout::new::<[u8; 64]>()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFail);
    }

    assert_eq!(arena.capacity(), 16);
    assert_eq!(arena.len(), 12);
    assert_eq!(arena.generation(), 0);
    assert_eq!(arena.statistics().failed_allocations, 1);

    // still serves what fits
    unsafe { arena.allocate(Layout::new::<[u8; 4]>()).unwrap() };
    assert_eq!(arena.available(), 0);
}

#[test]
fn test_destroy_after_growth_returns_everything() {
    let tracked = TrackedAllocator::new(HeapAllocator::new());
    let mut arena = ExpandableArena::new(8, &tracked).unwrap();
    unsafe { arena.allocate(Layout::new::<[u8; 256]>()).unwrap() };

    arena.destroy();
    arena.destroy();
    assert!(!tracked.has_leaks());
    assert_eq!(arena.capacity(), 0);
}
