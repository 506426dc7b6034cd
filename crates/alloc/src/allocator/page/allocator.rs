//! Page allocator: a chain of fixed arenas
//!
//! # Safety
//!
//! Blocks live in the arenas' buffers, never in the list storage, so growing
//! the list moves arena *handles* but no block. Every address the allocator
//! hands out stays valid until `destroy`.
//!
//! ## Invariants
//!
//! - While live, the list holds at least one arena; the last is current
//! - Arenas are only appended, never reordered or removed before `destroy`
//! - Reallocation always allocates and copies; the old block is not freed
//! - Deallocation zeroes the block and reclaims nothing

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::{debug, error, trace};

use super::list::ArenaList;
use crate::allocator::arena::Attempt;
use crate::allocator::{
    AllocResult, Allocator, AllocatorStats, Arena, CellStats, MemoryUsage, StatisticsProvider,
};
use crate::config::{ArenaConfig, PageConfig};
use crate::error::AllocError;
use crate::utils::{checked_add, is_aligned, zero_bytes};

/// Allocator that appends a new arena when the current one is exhausted
///
/// Unlike [`ExpandableArena`](crate::allocator::ExpandableArena), growth never
/// moves existing blocks.
///
/// # Examples
/// ```rust
/// use core::alloc::Layout;
/// use nebula_alloc::prelude::*;
///
/// let heap = HeapAllocator::new();
/// let pages = PageAllocator::new(100, &heap)?;
///
/// unsafe {
///     pages.allocate(Layout::array::<u8>(98).unwrap())?;
///     pages.allocate(Layout::array::<u8>(98).unwrap())?;
///     pages.allocate(Layout::array::<u8>(103).unwrap())?;
/// }
/// assert_eq!(pages.page_capacities(), vec![100, 100, 103]);
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct PageAllocator<'a> {
    arenas: RefCell<ArenaList<'a>>,
    default_page_size: usize,
    upstream: &'a dyn Allocator,
    track_stats: bool,
    stats: CellStats,
}

impl<'a> PageAllocator<'a> {
    /// Creates a page allocator whose first arena holds `default_page_size` bytes
    pub fn new(default_page_size: usize, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(
            PageConfig {
                default_page_size,
                ..PageConfig::default()
            },
            upstream,
        )
    }

    /// Creates a page allocator with custom configuration
    ///
    /// Any failure releases what was already obtained from `upstream`.
    pub fn with_config(config: PageConfig, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        config.validate()?;

        let mut arenas = ArenaList::with_capacity(config.initial_list_capacity, upstream)?;
        let first = Arena::with_config(Self::page_config(config.default_page_size), upstream)?;
        arenas
            .push(first)
            .map_err(|_| AllocError::invalid_state("arena list has no free slot"))?;

        #[cfg(feature = "logging")]
        debug!(
            default_page_size = config.default_page_size,
            list_capacity = config.initial_list_capacity,
            "page allocator created"
        );

        Ok(Self {
            arenas: RefCell::new(arenas),
            default_page_size: config.default_page_size,
            upstream,
            track_stats: config.track_stats,
            stats: CellStats::new(),
        })
    }

    fn page_config(capacity: usize) -> ArenaConfig {
        ArenaConfig {
            capacity,
            track_stats: false,
        }
    }

    /// Minimum size of every page
    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// The upstream allocator pages come from
    pub fn upstream(&self) -> &'a dyn Allocator {
        self.upstream
    }

    /// Number of arenas in the chain (0 once destroyed)
    pub fn arena_count(&self) -> usize {
        self.with_arenas(ArenaList::len).unwrap_or(0)
    }

    /// Capacity of every arena, in creation order
    pub fn page_capacities(&self) -> Vec<usize> {
        self.with_arenas(|arenas| arenas.as_slice().iter().map(Arena::capacity).collect())
            .unwrap_or_default()
    }

    /// Whether `ptr` lies in the used part of any arena
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.with_arenas(|arenas| arenas.as_slice().iter().any(|arena| arena.contains(ptr)))
            .unwrap_or(false)
    }

    /// Whether the allocator still owns its arenas
    pub fn is_live(&self) -> bool {
        self.arena_count() > 0
    }

    fn with_arenas<R>(&self, f: impl FnOnce(&ArenaList<'a>) -> R) -> Option<R> {
        self.arenas.try_borrow().ok().map(|arenas| f(&arenas))
    }

    #[inline]
    fn record(&self, f: impl FnOnce(&CellStats)) {
        if self.track_stats {
            f(&self.stats);
        }
    }

    /// Serves `layout` from the current page or a new one, without recording stats
    fn allocate_block(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let mut arenas = self
            .arenas
            .try_borrow_mut()
            .map_err(|_| AllocError::invalid_state("page allocator is already in use"))?;
        let current = arenas
            .last()
            .ok_or_else(|| AllocError::destroyed("page allocator"))?;

        match current.attempt_allocate(layout)? {
            Attempt::Done(block) => Ok(block),
            Attempt::Short { .. } => self.allocate_in_new_page(&mut arenas, layout),
        }
    }

    /// Appends an arena large enough for `layout` and allocates from it
    fn allocate_in_new_page(
        &self,
        arenas: &mut ArenaList<'a>,
        layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // Room for the worst-case alignment padding of the new buffer
        let fit = checked_add(layout.size(), layout.align() - 1, "page size")?;
        let page_size = fit.max(self.default_page_size);

        let grown = arenas.reserve_one().and_then(|()| {
            Arena::with_config(Self::page_config(page_size), self.upstream)
        });
        let arena = match grown {
            Ok(arena) => arena,
            Err(err) => {
                self.record(CellStats::record_failure);

                #[cfg(feature = "logging")]
                error!(page_size, code = err.code(), "page allocator could not add a page");

                return Err(err);
            }
        };
        arenas
            .push(arena)
            .map_err(|_| AllocError::invalid_state("arena list has no free slot"))?;
        self.record(CellStats::record_page);

        #[cfg(feature = "logging")]
        debug!(page_size, pages = arenas.len(), "page allocator added a page");

        let current = arenas
            .last()
            .ok_or_else(|| AllocError::invalid_state("arena list is empty"))?;
        match current.attempt_allocate(layout)? {
            Attempt::Done(block) => Ok(block),
            Attempt::Short { .. } => Err(AllocError::arena_exhausted(
                layout.size(),
                current.available(),
            )),
        }
    }

    /// Drops every arena in reverse creation order and frees the list storage
    ///
    /// Afterwards the allocator has no arenas and every operation fails with
    /// `InvalidState`. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        let arenas = self.arenas.get_mut();
        if arenas.capacity() == 0 {
            return;
        }

        #[cfg(feature = "logging")]
        let pages = arenas.len();

        arenas.release();

        #[cfg(feature = "logging")]
        debug!(pages, "page allocator destroyed");
    }
}

impl Drop for PageAllocator<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl core::fmt::Debug for PageAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageAllocator")
            .field("default_page_size", &self.default_page_size)
            .field("pages", &self.page_capacities())
            .finish_non_exhaustive()
    }
}

// SAFETY:
// - blocks come from fixed arenas whose buffers never move while live
// - a failed call leaves the arena list valid and every block untouched
unsafe impl Allocator for PageAllocator<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let block = self.allocate_block(layout)?;
        self.record(|s| s.record_allocation(layout.size()));

        #[cfg(feature = "logging")]
        trace!(size = layout.size(), align = layout.align(), "page allocate");

        Ok(block)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout.size() == new_layout.size()
            && is_aligned(ptr.as_ptr() as usize, new_layout.align())
        {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        let block = self.allocate_block(new_layout)?;
        // SAFETY:
        // - ptr is valid for old_layout.size() bytes (caller contract)
        // - block is a fresh block, disjoint from ptr
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                block.cast::<u8>().as_ptr(),
                old_layout.size().min(new_layout.size()),
            );
        }
        self.record(|s| s.record_reallocation(old_layout.size(), new_layout.size(), true));

        #[cfg(feature = "logging")]
        trace!(old = old_layout.size(), new = new_layout.size(), "page reallocate");

        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Zero only; the bytes stay in their arena until destroy
        // SAFETY: ptr is valid for layout.size() bytes (caller contract)
        unsafe { zero_bytes(ptr.as_ptr(), layout.size()) };
        self.record(|s| s.record_deallocation(layout.size()));
    }
}

impl MemoryUsage for PageAllocator<'_> {
    fn used_memory(&self) -> usize {
        self.with_arenas(|arenas| arenas.as_slice().iter().map(Arena::len).sum())
            .unwrap_or(0)
    }

    /// Room left in the current page
    fn available_memory(&self) -> Option<usize> {
        self.with_arenas(|arenas| arenas.last().map_or(0, Arena::available))
    }

    fn total_memory(&self) -> Option<usize> {
        self.with_arenas(|arenas| arenas.as_slice().iter().map(Arena::capacity).sum())
    }
}

impl StatisticsProvider for PageAllocator<'_> {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }

    fn statistics_enabled(&self) -> bool {
        self.track_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{HeapAllocator, TrackedAllocator};
    use crate::error::ErrorKind;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 1).unwrap()
    }

    #[test]
    fn appends_page_on_exhaustion() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(64, &heap).unwrap();

        unsafe {
            pages.allocate(layout(60)).unwrap();
            assert_eq!(pages.arena_count(), 1);
            pages.allocate(layout(8)).unwrap();
        }
        assert_eq!(pages.page_capacities(), vec![64, 64]);
    }

    #[test]
    fn oversized_request_gets_its_own_page() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(32, &heap).unwrap();

        unsafe { pages.allocate(layout(500)).unwrap() };
        assert_eq!(pages.page_capacities(), vec![32, 500]);
    }

    #[test]
    fn over_aligned_request_fits_new_page() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(16, &heap).unwrap();

        let block = unsafe { pages.allocate(Layout::from_size_align(64, 64).unwrap()) }.unwrap();
        assert_eq!(block.cast::<u8>().as_ptr() as usize % 64, 0);
        assert_eq!(pages.page_capacities(), vec![16, 127]);
    }

    #[test]
    fn reallocate_copies_and_keeps_original() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(64, &heap).unwrap();

        unsafe {
            let block = pages.allocate(layout(8)).unwrap();
            block.cast::<u8>().as_ptr().write_bytes(0x2B, 8);

            let grown = pages.reallocate(block.cast(), layout(8), layout(16)).unwrap();
            assert_ne!(grown.cast::<u8>(), block.cast::<u8>());
            let copied = core::slice::from_raw_parts(grown.cast::<u8>().as_ptr(), 8);
            assert_eq!(copied, &[0x2B; 8]);
            let original = core::slice::from_raw_parts(block.cast::<u8>().as_ptr(), 8);
            assert_eq!(original, &[0x2B; 8]);
        }
        assert_eq!(pages.used_memory(), 24);
    }

    #[test]
    fn reallocate_is_counted_once() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::with_config(PageConfig::debug(64), &heap).unwrap();

        unsafe {
            let block = pages.allocate(layout(8)).unwrap();
            pages.reallocate(block.cast(), layout(8), layout(16)).unwrap();
        }

        let stats = pages.statistics();
        assert_eq!(stats.allocation_count, 1);
        assert_eq!(stats.reallocation_count, 1);
        assert_eq!(stats.relocation_count, 1);
        assert_eq!(stats.allocated_bytes, 16);
        assert_eq!(stats.total_bytes_allocated, 16);
    }

    #[test]
    fn same_size_reallocate_is_identity() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(64, &heap).unwrap();

        unsafe {
            let block = pages.allocate(layout(8)).unwrap();
            let same = pages.reallocate(block.cast(), layout(8), layout(8)).unwrap();
            assert_eq!(same.cast::<u8>(), block.cast::<u8>());
        }
        assert_eq!(pages.used_memory(), 8);
    }

    #[test]
    fn deallocate_zeroes_without_reclaiming() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(64, &heap).unwrap();

        unsafe {
            let block = pages.allocate(layout(8)).unwrap();
            block.cast::<u8>().as_ptr().write_bytes(0xFF, 8);
            pages.deallocate(block.cast(), layout(8));

            let bytes = core::slice::from_raw_parts(block.cast::<u8>().as_ptr(), 8);
            assert_eq!(bytes, &[0; 8]);
        }
        assert_eq!(pages.used_memory(), 8);
    }

    #[test]
    fn failed_page_leaves_allocator_usable() {
        let tracked = TrackedAllocator::new(HeapAllocator::new());
        let pages = PageAllocator::new(32, &tracked).unwrap();
        unsafe { pages.allocate(layout(30)).unwrap() };

        tracked.set_budget(Some(tracked.allocated_bytes()));
        let err = unsafe { pages.allocate(layout(16)) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFail);
        assert_eq!(pages.arena_count(), 1);

        // the current page still serves what fits
        unsafe { pages.allocate(layout(2)).unwrap() };

        tracked.set_budget(None);
        unsafe { pages.allocate(layout(16)).unwrap() };
        assert_eq!(pages.arena_count(), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let heap = HeapAllocator::new();
        let err = PageAllocator::new(0, &heap).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn destroy_is_idempotent_and_final() {
        let tracked = TrackedAllocator::new(HeapAllocator::new());
        let mut pages = PageAllocator::with_config(PageConfig::debug(16), &tracked).unwrap();
        unsafe {
            pages.allocate(layout(10)).unwrap();
            pages.allocate(layout(10)).unwrap();
            pages.allocate(layout(40)).unwrap();
        }
        assert_eq!(pages.statistics().pages_added, 2);

        pages.destroy();
        pages.destroy();

        assert!(!tracked.has_leaks());
        assert!(!pages.is_live());
        assert_eq!(pages.arena_count(), 0);
        let err = unsafe { pages.allocate(layout(1)) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn memory_usage_spans_pages() {
        let heap = HeapAllocator::new();
        let pages = PageAllocator::new(10, &heap).unwrap();
        unsafe {
            pages.allocate(layout(6)).unwrap();
            pages.allocate(layout(6)).unwrap();
        }

        let usage = pages.memory_usage();
        assert_eq!(usage.used, 12);
        assert_eq!(usage.available, Some(4));
        assert_eq!(usage.total, Some(20));
    }
}
