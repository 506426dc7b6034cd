//! Integration tests for the page allocator

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

use nebula_alloc::allocator::{
    Allocator, Arena, HeapAllocator, MemoryUsage, PageAllocator, TrackedAllocator,
};
use nebula_alloc::{AllocResult, ErrorKind, PageConfig};
use pretty_assertions::assert_eq;

fn bytes(ptr: NonNull<u8>, len: usize) -> Vec<u8> {
    unsafe { core::slice::from_raw_parts(ptr.as_ptr(), len).to_vec() }
}

/// Heap upstream that logs the size of every deallocation, in order
#[derive(Default)]
struct RecordingAllocator {
    inner: HeapAllocator,
    released: RefCell<Vec<usize>>,
}

// SAFETY: every call is forwarded to the heap unchanged
unsafe impl Allocator for RecordingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        unsafe { self.inner.allocate(layout) }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        unsafe { self.inner.reallocate(ptr, old_layout, new_layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.released.borrow_mut().push(layout.size());
        unsafe { self.inner.deallocate(ptr, layout) };
    }
}

#[test]
fn test_page_chain_scenario() {
    let heap = HeapAllocator::new();
    let mut pages = PageAllocator::new(100, &heap).expect("Failed to create page allocator");
    let bytes98 = Layout::array::<u8>(98).unwrap();

    unsafe {
        pages.allocate(bytes98).expect("First allocation failed");
        assert_eq!(pages.arena_count(), 1);

        pages.allocate(bytes98).expect("Second allocation failed");
        assert_eq!(pages.arena_count(), 2);

        pages
            .allocate(Layout::array::<u8>(103).unwrap())
            .expect("Oversized allocation failed");
        assert_eq!(pages.arena_count(), 3);
    }
    assert_eq!(pages.page_capacities(), vec![100, 100, 103]);

    pages.destroy();
    assert_eq!(pages.arena_count(), 0);
}

#[test]
fn test_addresses_survive_new_pages() {
    let heap = HeapAllocator::new();
    let pages = PageAllocator::new(64, &heap).unwrap();
    let layout = Layout::from_size_align(24, 8).unwrap();
    let mut blocks = Vec::new();

    for round in 0..20u8 {
        let block = unsafe { pages.allocate(layout).expect("Allocation failed") };
        unsafe { block.cast::<u8>().as_ptr().write_bytes(round, 24) };
        blocks.push(block.cast::<u8>());
    }

    assert!(pages.arena_count() > 1);
    for (round, block) in blocks.into_iter().enumerate() {
        assert!(pages.contains(block));
        assert_eq!(bytes(block, 24), vec![round as u8; 24]);
    }
}

#[test]
fn test_exceeding_capacity_adds_exactly_one_page() {
    let heap = HeapAllocator::new();
    let pages = PageAllocator::new(128, &heap).unwrap();

    unsafe {
        let first = pages.allocate(Layout::new::<[u8; 100]>()).unwrap();
        first.cast::<u8>().as_ptr().write_bytes(0x41, 100);

        pages.allocate(Layout::new::<[u8; 129]>()).unwrap();
        assert_eq!(pages.arena_count(), 2);
        assert_eq!(bytes(first.cast(), 100), vec![0x41; 100]);
    }
}

#[test]
fn test_realloc_copies_min_of_sizes() {
    let heap = HeapAllocator::new();
    let pages = PageAllocator::new(256, &heap).unwrap();
    let big = Layout::new::<[u8; 32]>();
    let small = Layout::new::<[u8; 8]>();

    unsafe {
        let block = pages.allocate(big).unwrap();
        for i in 0..32 {
            block.cast::<u8>().as_ptr().add(i).write(i as u8);
        }

        let shrunk = pages.reallocate(block.cast(), big, small).unwrap();
        assert_eq!(bytes(shrunk.cast(), 8), (0..8).collect::<Vec<u8>>());

        let grown = pages.reallocate(shrunk.cast(), small, big).unwrap();
        assert_eq!(bytes(grown.cast(), 8), (0..8).collect::<Vec<u8>>());
    }
    assert_eq!(pages.used_memory(), 72);
}

#[test]
fn test_list_grows_past_initial_capacity() {
    let tracked = TrackedAllocator::new(HeapAllocator::new());
    {
        let pages = PageAllocator::with_config(PageConfig::debug(16), &tracked).unwrap();
        for _ in 0..10 {
            unsafe { pages.allocate(Layout::new::<[u8; 16]>()).unwrap() };
        }
        assert_eq!(pages.arena_count(), 10);
        assert_eq!(pages.total_memory(), Some(160));
    }
    assert!(!tracked.has_leaks());
}

#[test]
fn test_failed_construction_unwinds() {
    let list_bytes = core::mem::size_of::<Arena<'static>>();

    // the list fits in the budget, the first page does not
    let tracked = TrackedAllocator::with_budget(HeapAllocator::new(), list_bytes + 10);
    let err = PageAllocator::new(64, &tracked).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AllocationFail);
    assert_eq!(tracked.allocation_count(), 1);
    assert_eq!(tracked.failed_allocations(), 1);
    assert!(!tracked.has_leaks());
}

#[test]
fn test_destroy_returns_pages_and_list() {
    let tracked = TrackedAllocator::new(HeapAllocator::new());
    let mut pages = PageAllocator::new(32, &tracked).unwrap();
    unsafe {
        pages.allocate(Layout::new::<[u8; 30]>()).unwrap();
        pages.allocate(Layout::new::<[u8; 30]>()).unwrap();
        pages.allocate(Layout::new::<[u8; 300]>()).unwrap();
    }
    assert!(tracked.has_leaks());

    pages.destroy();
    assert!(!tracked.has_leaks());
    assert!(!pages.is_live());

    let err = unsafe { pages.allocate(Layout::new::<u8>()) }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_destroy_releases_newest_page_first() {
    let upstream = RecordingAllocator::default();
    let mut pages = PageAllocator::new(100, &upstream).unwrap();
    unsafe {
        pages.allocate(Layout::new::<[u8; 200]>()).unwrap();
        pages.allocate(Layout::new::<[u8; 300]>()).unwrap();
    }
    assert_eq!(pages.page_capacities(), vec![100, 200, 300]);
    assert!(upstream.released.borrow().is_empty());

    pages.destroy();

    let list_bytes = 3 * core::mem::size_of::<Arena<'static>>();
    assert_eq!(*upstream.released.borrow(), vec![300, 200, 100, list_bytes]);

    pages.destroy();
    assert_eq!(upstream.released.borrow().len(), 4);
}
