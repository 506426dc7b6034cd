//! Expandable arena allocator
//!
//! Same bump semantics as [`Arena`], but an allocate or reallocate that would
//! run out of room first grows the buffer through the upstream allocator's
//! `reallocate`, to `max(capacity * 2 + 1, capacity + needed)` bytes.
//!
//! # Address instability
//!
//! Growth may move the buffer. Every pointer previously handed out becomes
//! invalid the moment a growth happens, although the bytes at each *offset*
//! are preserved. Callers that need to hold on to data across allocations
//! should keep offsets ([`offset_of`](ExpandableArena::offset_of) /
//! [`ptr_at`](ExpandableArena::ptr_at)) and check
//! [`generation`](ExpandableArena::generation), or use
//! [`PageAllocator`](super::PageAllocator), which never moves blocks.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::{debug, error};

use super::arena::Attempt;
use super::{
    AllocResult, Allocator, AllocatorStats, Arena, ArenaMarker, MemoryUsage, Resettable,
    StatisticsProvider,
};
use crate::config::ArenaConfig;
use crate::error::AllocError;
use crate::utils::grown_capacity;

/// Bump allocator that grows its buffer instead of failing
///
/// # Examples
/// ```rust
/// use core::alloc::Layout;
/// use nebula_alloc::prelude::*;
///
/// let heap = HeapAllocator::new();
/// let arena = ExpandableArena::new(8, &heap)?;
///
/// let block = unsafe { arena.allocate(Layout::new::<[u8; 64]>())? };
/// let offset = arena.offset_of(block.cast()).unwrap();
/// assert_eq!(arena.generation(), 1);
/// assert!(arena.capacity() >= 8 + 64);
///
/// // survives further growth by offset, not by pointer
/// unsafe { arena.allocate(Layout::new::<[u8; 512]>())? };
/// assert!(arena.ptr_at(offset).is_some());
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct ExpandableArena<'a> {
    arena: Arena<'a>,
    generation: Cell<u64>,
}

impl<'a> ExpandableArena<'a> {
    /// Creates an expandable arena with an initial buffer of `capacity` bytes
    pub fn new(capacity: usize, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Self::with_config(
            ArenaConfig {
                capacity,
                ..ArenaConfig::default()
            },
            upstream,
        )
    }

    /// Creates an expandable arena with custom configuration
    pub fn with_config(config: ArenaConfig, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        Ok(Self {
            arena: Arena::with_config(config, upstream)?,
            generation: Cell::new(0),
        })
    }

    /// Current buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Bytes consumed so far, padding included
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Bytes left before the next growth
    pub fn available(&self) -> usize {
        self.arena.available()
    }

    /// Whether nothing is allocated
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Whether the arena still owns its buffer
    pub fn is_live(&self) -> bool {
        self.arena.is_live()
    }

    /// Number of times the buffer has grown (and possibly moved)
    ///
    /// Pointers obtained before the generation changed are dangling.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Whether `ptr` points into the used part of the *current* buffer
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.arena.contains(ptr)
    }

    /// Offset of `ptr` in the current buffer; stable across growth
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.arena.offset_of(ptr)
    }

    /// Pointer at `offset` in the current buffer
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        self.arena.ptr_at(offset)
    }

    /// The upstream allocator growth goes through
    pub fn upstream(&self) -> &'a dyn Allocator {
        self.arena.upstream()
    }

    /// Saves the current bump position; markers stay valid across growth
    pub fn mark(&self) -> ArenaMarker {
        self.arena.mark()
    }

    /// Retracts to `marker`, zeroing everything allocated after it
    ///
    /// # Safety
    /// Pointers to blocks allocated after the marker become invalid.
    pub unsafe fn release(&self, marker: ArenaMarker) -> AllocResult<()> {
        // SAFETY: forwarded contract
        unsafe { self.arena.release(marker) }
    }

    /// Grows ahead of time so that at least `additional` bytes are available
    ///
    /// Takes `&mut self`: no block can be borrowed from the arena while its
    /// buffer moves.
    pub fn reserve(&mut self, additional: usize) -> AllocResult<()> {
        if self.available() >= additional {
            return Ok(());
        }
        self.grow(additional)
    }

    fn grow(&self, needed: usize) -> AllocResult<()> {
        let old_capacity = self.capacity();
        let new_capacity = grown_capacity(old_capacity, needed)?;

        if let Err(err) = self.arena.grow_buffer(new_capacity) {
            self.arena.record_failure();

            #[cfg(feature = "logging")]
            error!(old_capacity, new_capacity, code = err.code(), "expandable arena growth failed");

            return Err(err);
        }

        self.generation.set(self.generation.get() + 1);
        self.arena.record_growth();

        #[cfg(feature = "logging")]
        debug!(
            old_capacity,
            new_capacity,
            generation = self.generation.get(),
            "expandable arena grew"
        );

        Ok(())
    }

    /// Returns the buffer to the upstream allocator; idempotent
    pub fn destroy(&mut self) {
        self.arena.destroy();
    }
}

impl core::fmt::Debug for ExpandableArena<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExpandableArena")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("generation", &self.generation())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

// SAFETY: blocks come from the inner arena; growth goes through the upstream
// reallocate, which preserves every byte up to the old capacity
unsafe impl Allocator for ExpandableArena<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        loop {
            match self.arena.attempt_allocate(layout)? {
                Attempt::Done(block) => return Ok(block),
                Attempt::Short { needed } => self.grow(needed)?,
            }
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        let offset = self
            .arena
            .offset_of(ptr)
            .ok_or_else(|| AllocError::invalid_state("block does not belong to this arena"))?;

        loop {
            // Re-derive the block from its offset: a growth may have moved it
            let ptr = self
                .arena
                .ptr_at(offset)
                .ok_or_else(|| AllocError::invalid_state("block does not belong to this arena"))?;

            // SAFETY: ptr is the caller's block, relocated with the buffer if it moved
            match unsafe { self.arena.attempt_reallocate(ptr, old_layout, new_layout)? } {
                Attempt::Done(block) => return Ok(block),
                Attempt::Short { needed } => self.grow(needed)?,
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: ptr is a live block of this arena (caller contract)
        unsafe { self.arena.release_block(ptr, layout) };
    }
}

impl MemoryUsage for ExpandableArena<'_> {
    fn used_memory(&self) -> usize {
        self.len()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }
}

impl Resettable for ExpandableArena<'_> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded contract
        unsafe { self.arena.reset() };
    }

    fn can_reset(&self) -> bool {
        self.arena.can_reset()
    }
}

impl StatisticsProvider for ExpandableArena<'_> {
    fn statistics(&self) -> AllocatorStats {
        self.arena.statistics()
    }

    fn reset_statistics(&self) {
        self.arena.reset_statistics();
    }

    fn statistics_enabled(&self) -> bool {
        self.arena.statistics_enabled()
    }
}
