//! Tracked allocator implementation
//!
//! Wraps another allocator, counting what flows through it and optionally
//! enforcing a byte budget. Used as an instrumented upstream: leak checks
//! after `destroy`, and failure injection for the unwind paths of arena and
//! page-allocator construction.
//!
//! ## Invariants
//!
//! - Every successful allocation is recorded in the stats
//! - Failed calls only bump the failure counter
//! - A request that would take live bytes above the budget fails with
//!   `OutOfMemory` without reaching the inner allocator

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use super::{
    AllocResult, Allocator, AllocatorStats, CellStats, MemoryUsage, StatisticsProvider,
};
use crate::error::AllocError;

/// A wrapper allocator that tracks memory usage statistics
#[derive(Debug)]
pub struct TrackedAllocator<A> {
    inner: A,
    stats: CellStats,
    budget: Cell<Option<usize>>,
}

impl<A> TrackedAllocator<A> {
    /// Wraps `allocator` without a budget
    pub fn new(allocator: A) -> Self {
        Self {
            inner: allocator,
            stats: CellStats::new(),
            budget: Cell::new(None),
        }
    }

    /// Wraps `allocator`, refusing to hold more than `max_bytes` live bytes
    pub fn with_budget(allocator: A, max_bytes: usize) -> Self {
        let tracked = Self::new(allocator);
        tracked.budget.set(Some(max_bytes));
        tracked
    }

    /// Changes the byte budget; `None` removes it
    pub fn set_budget(&self, max_bytes: Option<usize>) {
        self.budget.set(max_bytes);
    }

    /// Current byte budget
    pub fn budget(&self) -> Option<usize> {
        self.budget.get()
    }

    /// Gets a reference to the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Consumes the tracker and returns the underlying allocator
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Bytes currently allocated through this wrapper
    pub fn allocated_bytes(&self) -> usize {
        self.stats.snapshot().allocated_bytes
    }

    /// Peak bytes allocated
    pub fn peak_allocated_bytes(&self) -> usize {
        self.stats.snapshot().peak_allocated_bytes
    }

    /// Total number of allocations performed
    pub fn allocation_count(&self) -> usize {
        self.stats.snapshot().allocation_count
    }

    /// Total number of deallocations performed
    pub fn deallocation_count(&self) -> usize {
        self.stats.snapshot().deallocation_count
    }

    /// Number of failed allocations and reallocations
    pub fn failed_allocations(&self) -> usize {
        self.stats.snapshot().failed_allocations
    }

    /// Whether any allocation is still outstanding
    pub fn has_leaks(&self) -> bool {
        let stats = self.stats.snapshot();
        stats.allocation_count > stats.deallocation_count || stats.allocated_bytes > 0
    }

    fn check_budget(&self, release: usize, layout: Layout) -> AllocResult<()> {
        let Some(limit) = self.budget.get() else {
            return Ok(());
        };
        let live = self.allocated_bytes().saturating_sub(release);
        match live.checked_add(layout.size()) {
            Some(total) if total <= limit => Ok(()),
            _ => {
                self.stats.record_failure();
                Err(AllocError::out_of_memory_with_layout(layout))
            }
        }
    }
}

// SAFETY: every call is forwarded to the inner allocator with the same
// contract; the wrapper only adds bookkeeping and early refusals
unsafe impl<A: Allocator> Allocator for TrackedAllocator<A> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        self.check_budget(0, layout)?;

        // SAFETY: same contract as A::allocate
        match unsafe { self.inner.allocate(layout) } {
            Ok(ptr) => {
                self.stats.record_allocation(layout.size());
                Ok(ptr)
            }
            Err(err) => {
                self.stats.record_failure();
                Err(err)
            }
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        self.check_budget(old_layout.size(), new_layout)?;

        // SAFETY: same contract as A::reallocate; failure leaves ptr valid
        match unsafe { self.inner.reallocate(ptr, old_layout, new_layout) } {
            Ok(new_ptr) => {
                let moved = new_ptr.cast::<u8>() != ptr;
                self.stats
                    .record_reallocation(old_layout.size(), new_layout.size(), moved);
                Ok(new_ptr)
            }
            Err(err) => {
                self.stats.record_failure();
                Err(err)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: ptr was allocated by self.inner with layout (caller contract)
        unsafe { self.inner.deallocate(ptr, layout) };
        self.stats.record_deallocation(layout.size());
    }
}

impl<A> StatisticsProvider for TrackedAllocator<A> {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl<A> MemoryUsage for TrackedAllocator<A> {
    fn used_memory(&self) -> usize {
        self.allocated_bytes()
    }

    fn available_memory(&self) -> Option<usize> {
        self.budget
            .get()
            .map(|limit| limit.saturating_sub(self.allocated_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::HeapAllocator;
    use crate::error::ErrorKind;

    #[test]
    fn counts_allocations_and_leaks() {
        let tracked = TrackedAllocator::new(HeapAllocator::new());
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let a = tracked.allocate(layout).unwrap();
            let b = tracked.allocate(layout).unwrap();
            assert_eq!(tracked.allocated_bytes(), 128);
            assert!(tracked.has_leaks());

            tracked.deallocate(a.cast(), layout);
            tracked.deallocate(b.cast(), layout);
        }

        assert_eq!(tracked.allocation_count(), 2);
        assert_eq!(tracked.deallocation_count(), 2);
        assert_eq!(tracked.peak_allocated_bytes(), 128);
        assert!(!tracked.has_leaks());
    }

    #[test]
    fn budget_refuses_without_touching_inner() {
        let tracked = TrackedAllocator::with_budget(HeapAllocator::new(), 100);
        let small = Layout::from_size_align(60, 1).unwrap();

        unsafe {
            let a = tracked.allocate(small).unwrap();
            let err = tracked.allocate(small).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AllocationFail);
            assert_eq!(tracked.failed_allocations(), 1);
            assert_eq!(tracked.allocation_count(), 1);

            // growing within the budget accounts for the released old size
            let grown = Layout::from_size_align(100, 1).unwrap();
            let b = tracked.reallocate(a.cast(), small, grown).unwrap();
            assert_eq!(tracked.allocated_bytes(), 100);
            assert_eq!(tracked.available_memory(), Some(0));

            tracked.deallocate(b.cast(), grown);
        }
        assert!(!tracked.has_leaks());
    }

    #[test]
    fn budget_can_be_lifted() {
        let tracked = TrackedAllocator::with_budget(HeapAllocator::new(), 0);
        let layout = Layout::from_size_align(8, 8).unwrap();

        assert!(unsafe { tracked.allocate(layout) }.is_err());
        tracked.set_budget(None);
        assert_eq!(tracked.budget(), None);

        unsafe {
            let ptr = tracked.allocate(layout).unwrap();
            tracked.deallocate(ptr.cast(), layout);
        }
        tracked.reset_statistics();
        assert_eq!(tracked.statistics(), AllocatorStats::new());
    }
}
