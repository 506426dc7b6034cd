//! Fixed-capacity bump arena
//!
//! # Safety
//!
//! The arena owns one buffer obtained from its upstream allocator and hands
//! out disjoint slices of it by advancing an offset:
//!
//! ```text
//! [base]--[pad][block 1][pad][block 2]--------[base + len]-----[base + capacity]
//!         <------------- used ------------->   <--- available --->
//! ```
//!
//! ## Invariants
//!
//! - `0 <= len <= capacity`
//! - `data` is `Some` iff the arena is live; a destroyed arena has
//!   `capacity == len == 0`
//! - Only the top block (`offset + size == len`) is reclaimed in place
//! - Bytes handed back (deallocate, shrink, marker release) are zeroed
//!
//! Bookkeeping lives in `Cell`s, so an arena is `!Sync`.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

use super::{ArenaMarker, ArenaScope};
use crate::allocator::{
    AllocResult, Allocator, AllocatorStats, CellStats, MemoryUsage, Resettable,
    StatisticsProvider,
};
use crate::config::ArenaConfig;
use crate::error::AllocError;
use crate::utils::{checked_add, is_aligned, padding_for, zero_bytes};

/// Outcome of an allocation attempt against the current buffer
#[derive(Debug, Clone, Copy)]
pub(crate) enum Attempt {
    /// The request was served
    Done(NonNull<[u8]>),
    /// The buffer is too small; `needed` more bytes serve the request
    /// wherever the buffer lands after growing
    Short { needed: usize },
}

/// Source of process-unique arena identities
static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(0);

/// Bytes that serve `layout` at any bump position: `size + align - 1`
#[inline]
fn worst_case(layout: Layout, operation: &str) -> AllocResult<usize> {
    checked_add(layout.size(), layout.align() - 1, operation)
}

/// Fixed-capacity bump allocator backed by an upstream allocator
///
/// Allocation bumps an offset. Deallocating or shrinking the most recent
/// block retracts it; anything else only zeroes the bytes.
///
/// # Examples
/// ```rust
/// use core::alloc::Layout;
/// use nebula_alloc::prelude::*;
///
/// let heap = HeapAllocator::new();
/// let arena = Arena::new(100, &heap)?;
///
/// let layout = Layout::array::<u32>(4).unwrap();
/// let block = unsafe { arena.allocate(layout)? };
/// assert!(arena.len() >= 16);
///
/// // the top block grows in place
/// let grown = unsafe {
///     arena.reallocate(block.cast(), layout, Layout::array::<u32>(8).unwrap())?
/// };
/// assert_eq!(grown.cast::<u8>(), block.cast::<u8>());
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct Arena<'a> {
    data: Cell<Option<NonNull<u8>>>,
    capacity: Cell<usize>,
    len: Cell<usize>,
    /// Process-unique identity checked by markers
    id: u64,
    /// Bumped by `reset`; markers from an earlier epoch are stale
    epoch: Cell<u32>,
    upstream: &'a dyn Allocator,
    track_stats: bool,
    stats: CellStats,
}

impl<'a> Arena<'a> {
    /// Creates an arena of `capacity` bytes taken from `upstream`
    pub fn new(capacity: usize, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(
            ArenaConfig {
                capacity,
                ..ArenaConfig::default()
            },
            upstream,
        )
    }

    /// Creates an arena with custom configuration
    pub fn with_config(config: ArenaConfig, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        let layout = Self::buffer_layout(config.capacity)?;
        // SAFETY: layout is valid; the buffer is released in destroy
        let data = unsafe { upstream.allocate(layout)? }.cast::<u8>();

        #[cfg(feature = "logging")]
        debug!(capacity = config.capacity, "arena created");

        Ok(Self {
            data: Cell::new(Some(data)),
            capacity: Cell::new(config.capacity),
            len: Cell::new(0),
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            epoch: Cell::new(0),
            upstream,
            track_stats: config.track_stats,
            stats: CellStats::new(),
        })
    }

    /// Creates a small (4KB) arena
    pub fn small(upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(ArenaConfig::small(), upstream)
    }

    /// Creates a medium (256KB) arena
    pub fn medium(upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(ArenaConfig::medium(), upstream)
    }

    /// Creates a large (4MB) arena
    pub fn large(upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(ArenaConfig::large(), upstream)
    }

    #[inline]
    pub(crate) fn buffer_layout(capacity: usize) -> AllocResult<Layout> {
        Ok(Layout::from_size_align(capacity, 1)?)
    }

    /// Total capacity in bytes (0 once destroyed)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Bytes consumed so far, padding included
    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    /// Bytes left before the arena is exhausted
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Whether nothing is allocated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the arena still owns its buffer
    #[inline]
    pub fn is_live(&self) -> bool {
        self.data.get().is_some()
    }

    /// The upstream allocator the buffer came from
    pub fn upstream(&self) -> &'a dyn Allocator {
        self.upstream
    }

    /// Whether `ptr` points into the used part of the buffer
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.offset_of(ptr).is_some_and(|offset| offset < self.len())
    }

    /// Offset of `ptr` from the buffer start, if it lies within `[0, len]`
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let base = self.data.get()?.as_ptr() as usize;
        let offset = (ptr.as_ptr() as usize).checked_sub(base)?;
        (offset <= self.len()).then_some(offset)
    }

    /// Pointer at `offset` in the current buffer, if `offset <= len`
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        let base = self.data.get()?;
        // SAFETY: offset <= len <= capacity stays within (or one past) the buffer
        (offset <= self.len()).then(|| unsafe { base.add(offset) })
    }

    #[inline]
    fn live_base(&self) -> AllocResult<NonNull<u8>> {
        self.data.get().ok_or_else(|| AllocError::destroyed("arena"))
    }

    #[inline]
    fn record(&self, f: impl FnOnce(&CellStats)) {
        if self.track_stats {
            f(&self.stats);
        }
    }

    pub(crate) fn record_growth(&self) {
        self.record(CellStats::record_growth);
    }

    pub(crate) fn record_failure(&self) {
        self.record(CellStats::record_failure);
    }

    // ------------------------------------------------------------------------
    // Core bump logic, shared with the expandable arena
    // ------------------------------------------------------------------------

    /// Bump `layout` off the current buffer, or report how much is missing
    pub(crate) fn attempt_allocate(&self, layout: Layout) -> AllocResult<Attempt> {
        let base = self.live_base()?;
        let len = self.len();
        let padding = padding_for(base.as_ptr() as usize + len, layout.align());
        let needed = checked_add(padding, layout.size(), "arena allocate")?;

        if needed > self.available() {
            return Ok(Attempt::Short {
                needed: worst_case(layout, "arena allocate")?,
            });
        }

        // SAFETY: len + padding + size <= capacity
        let ptr = unsafe { base.add(len + padding) };
        self.len.set(len + needed);
        self.record(|s| s.record_allocation(layout.size()));

        #[cfg(feature = "logging")]
        trace!(size = layout.size(), align = layout.align(), padding, "arena allocate");

        Ok(Attempt::Done(NonNull::slice_from_raw_parts(ptr, layout.size())))
    }

    /// Resize the block at `ptr` within the current buffer
    ///
    /// # Safety
    /// `ptr` must be a live block of this arena allocated with `old_layout`.
    pub(crate) unsafe fn attempt_reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<Attempt> {
        let base = self.live_base()?;
        let len = self.len();
        let (old, new) = (old_layout.size(), new_layout.size());
        let offset = self
            .offset_of(ptr)
            .filter(|offset| offset + old <= len)
            .ok_or_else(|| AllocError::invalid_state("block does not belong to this arena"))?;

        if is_aligned(ptr.as_ptr() as usize, new_layout.align()) {
            if new == old {
                return Ok(Attempt::Done(NonNull::slice_from_raw_parts(ptr, new)));
            }

            let is_top = offset + old == len;
            if new < old {
                // SAFETY: [ptr + new, ptr + old) lies inside the block
                unsafe { zero_bytes(ptr.as_ptr().add(new), old - new) };
                if is_top {
                    self.len.set(len - (old - new));
                }
                self.record(|s| s.record_reallocation(old, new, false));

                #[cfg(feature = "logging")]
                trace!(old, new, is_top, "arena shrink in place");

                return Ok(Attempt::Done(NonNull::slice_from_raw_parts(ptr, new)));
            }

            if is_top {
                let extra = new - old;
                if extra > self.available() {
                    // A moved buffer may leave the block misaligned and force a relocation
                    let needed = if new_layout.align() == 1 {
                        extra
                    } else {
                        worst_case(new_layout, "arena reallocate")?
                    };
                    return Ok(Attempt::Short { needed });
                }
                self.len.set(len + extra);
                self.record(|s| s.record_reallocation(old, new, false));

                #[cfg(feature = "logging")]
                trace!(old, new, "arena grow in place");

                return Ok(Attempt::Done(NonNull::slice_from_raw_parts(ptr, new)));
            }
        }

        // Relocate to the bump position; the old block stays where it is
        let padding = padding_for(base.as_ptr() as usize + len, new_layout.align());
        let needed = checked_add(padding, new, "arena reallocate")?;
        if needed > self.available() {
            return Ok(Attempt::Short {
                needed: worst_case(new_layout, "arena reallocate")?,
            });
        }

        // SAFETY: len + padding + new <= capacity
        let dest = unsafe { base.add(len + padding) };
        // SAFETY:
        // - source block ends at or before base + len (checked above)
        // - destination starts at or after base + len, so the ranges are disjoint
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), dest.as_ptr(), old.min(new));
        }
        self.len.set(len + needed);
        self.record(|s| s.record_reallocation(old, new, true));

        #[cfg(feature = "logging")]
        trace!(old, new, padding, "arena relocate");

        Ok(Attempt::Done(NonNull::slice_from_raw_parts(dest, new)))
    }

    /// Zero the block at `ptr` and retract it if it is the top block
    ///
    /// # Safety
    /// `ptr` must be a live block of this arena of `layout.size()` bytes.
    pub(crate) unsafe fn release_block(&self, ptr: NonNull<u8>, layout: Layout) {
        let len = self.len();
        let Some(offset) = self
            .offset_of(ptr)
            .filter(|offset| offset + layout.size() <= len)
        else {
            #[cfg(feature = "logging")]
            tracing::warn!(size = layout.size(), "deallocate of a block outside the arena ignored");
            return;
        };

        // SAFETY: [ptr, ptr + size) lies inside the used region
        unsafe { zero_bytes(ptr.as_ptr(), layout.size()) };
        if offset + layout.size() == len {
            self.len.set(offset);
        }
        self.record(|s| s.record_deallocation(layout.size()));

        #[cfg(feature = "logging")]
        trace!(size = layout.size(), top = (offset + layout.size() == len), "arena deallocate");
    }

    /// Replace the buffer with one of `new_capacity` bytes via upstream reallocate
    ///
    /// Every pointer into the old buffer is invalid afterwards; offsets are
    /// preserved. On failure nothing changes.
    pub(crate) fn grow_buffer(&self, new_capacity: usize) -> AllocResult<()> {
        let data = self.live_base()?;
        let old_layout = Self::buffer_layout(self.capacity())?;
        let new_layout = Self::buffer_layout(new_capacity)?;

        // SAFETY: data was obtained from upstream with old_layout
        let new_data = unsafe { self.upstream.reallocate(data, old_layout, new_layout)? };

        self.data.set(Some(new_data.cast()));
        self.capacity.set(new_capacity);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------------

    /// Saves the current bump position
    pub fn mark(&self) -> ArenaMarker {
        ArenaMarker {
            offset: self.len(),
            arena_id: self.id,
            epoch: self.epoch.get(),
        }
    }

    /// Retracts the arena to `marker`, zeroing everything allocated after it
    ///
    /// # Safety
    /// Pointers to blocks allocated after the marker become invalid.
    ///
    /// # Errors
    /// Fails with an `InvalidArgument`-kind error when the marker comes from
    /// another arena, predates a reset, or lies beyond the current position.
    pub unsafe fn release(&self, marker: ArenaMarker) -> AllocResult<()> {
        let base = self.live_base()?;
        if marker.arena_id != self.id {
            return Err(AllocError::invalid_state("marker from a different arena"));
        }
        if marker.epoch != self.epoch.get() {
            return Err(AllocError::invalid_state("stale marker: arena was reset"));
        }
        let len = self.len();
        if marker.offset > len {
            return Err(AllocError::invalid_state("marker is in the future"));
        }

        // SAFETY: [offset, len) lies inside the buffer
        unsafe { zero_bytes(base.as_ptr().add(marker.offset), len - marker.offset) };
        self.len.set(marker.offset);
        self.record(|s| s.record_release(len - marker.offset));

        #[cfg(feature = "logging")]
        trace!(released = len - marker.offset, "arena release to marker");

        Ok(())
    }

    /// Creates a scope that releases back to the current position when dropped
    pub fn scope(&self) -> ArenaScope<'_, 'a> {
        ArenaScope::new(self)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns the buffer to the upstream allocator
    ///
    /// Afterwards the arena is empty: capacity 0, length 0, not live, and
    /// every operation fails with `InvalidState`. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };
        let capacity = self.capacity.replace(0);
        self.len.set(0);

        if let Ok(layout) = Self::buffer_layout(capacity) {
            // SAFETY: data was obtained from upstream with this layout
            unsafe { self.upstream.deallocate(data, layout) };
        }

        #[cfg(feature = "logging")]
        debug!(capacity, "arena destroyed");
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl core::fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

// SAFETY:
// - blocks are carved from the owned buffer at increasing offsets, so live
//   blocks never overlap
// - failed calls return before touching len or any block
unsafe impl Allocator for Arena<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        match self.attempt_allocate(layout)? {
            Attempt::Done(block) => Ok(block),
            Attempt::Short { .. } => {
                self.record_failure();
                Err(AllocError::arena_exhausted(layout.size(), self.available()))
            }
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: ptr is a live block of this arena (caller contract)
        match unsafe { self.attempt_reallocate(ptr, old_layout, new_layout)? } {
            Attempt::Done(block) => Ok(block),
            Attempt::Short { .. } => {
                self.record_failure();
                Err(AllocError::arena_exhausted(new_layout.size(), self.available()))
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: ptr is a live block of this arena (caller contract)
        unsafe { self.release_block(ptr, layout) };
    }
}

impl MemoryUsage for Arena<'_> {
    fn used_memory(&self) -> usize {
        self.len()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }
}

impl Resettable for Arena<'_> {
    unsafe fn reset(&self) {
        let Some(base) = self.data.get() else {
            return;
        };
        let len = self.len.replace(0);
        // SAFETY: [0, len) is the used part of the buffer
        unsafe { zero_bytes(base.as_ptr(), len) };
        self.epoch.set(self.epoch.get().wrapping_add(1));
        self.record(|s| s.record_release(len));
    }

    fn can_reset(&self) -> bool {
        self.is_live()
    }
}

impl StatisticsProvider for Arena<'_> {
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
