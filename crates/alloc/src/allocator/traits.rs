//! Allocator traits
//!
//! The system is built around one capability trait and a handful of
//! optional extras:
//! - [`Allocator`]: allocate, reallocate and deallocate. Object safe, so
//!   allocators compose through `&dyn Allocator` upstreams.
//! - [`TypedAllocator`]: typed helpers, blanket-implemented for every
//!   allocator (including `dyn Allocator`).
//! - [`MemoryUsage`], [`Resettable`], [`StatisticsProvider`]: introspection
//!   and bulk reclamation.
//!
//! # Safety
//!
//! [`Allocator`] is an `unsafe trait`: implementors promise that returned
//! pointers are valid for `layout.size()` bytes, aligned to `layout.align()`,
//! and do not overlap any other live block from the same allocator.

use core::alloc::Layout;
use core::ptr::NonNull;

use super::AllocatorStats;
use crate::error::{AllocError, AllocResult};

/// Memory allocation capability
///
/// Every method takes `&self`; implementors keep their bookkeeping in
/// `Cell`/`RefCell` and are therefore not `Sync`.
///
/// # Safety Requirements
///
/// Implementors must ensure that:
/// - Returned pointers are valid for the requested size and aligned
/// - A failed call leaves the allocator and every live block untouched
/// - `reallocate` preserves the first `min(old, new)` bytes
pub unsafe trait Allocator {
    /// Allocates `layout.size()` bytes aligned to `layout.align()`
    ///
    /// # Safety
    /// - Memory content is unspecified and must be initialized before use
    ///
    /// # Errors
    /// - Returns error if memory cannot be provided; state is unchanged
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Resizes the block at `ptr`, possibly moving it
    ///
    /// Returns a block holding the first `min(old, new)` bytes of the
    /// original. A request whose size and alignment are unchanged returns
    /// `ptr` itself.
    ///
    /// The default implementation allocates, copies and deallocates.
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `old_layout`
    /// - On success, `ptr` must only be used again if it equals the result
    ///
    /// # Errors
    /// - Returns error if the new block cannot be provided; the original
    ///   block stays intact
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout == new_layout {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        // SAFETY: new_layout is a valid Layout; failure leaves ptr intact
        let new_ptr = unsafe { self.allocate(new_layout)? };

        // SAFETY:
        // - ptr is valid for reads of old_layout.size() bytes (caller contract)
        // - new_ptr is a distinct, freshly allocated block of new_layout.size()
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.cast::<u8>().as_ptr(),
                old_layout.size().min(new_layout.size()),
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }

    /// Releases the block at `ptr`
    ///
    /// What "release" means is allocator specific: the heap frees, arenas
    /// zero the bytes and only reclaim the top block.
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `layout`
    /// - After this call `ptr` must not be used
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Type-safe allocation helpers
///
/// Blanket-implemented for every [`Allocator`], so any allocator gets the
/// typed API for free.
pub trait TypedAllocator: Allocator {
    /// Allocates uninitialized memory for one `T`
    ///
    /// # Safety
    /// The memory is uninitialized. Deallocate with [`dealloc_typed`](Self::dealloc_typed).
    #[inline]
    unsafe fn alloc_typed<T>(&self) -> AllocResult<NonNull<T>> {
        // SAFETY: Layout::new::<T>() is always valid
        let ptr = unsafe { self.allocate(Layout::new::<T>())? };
        Ok(ptr.cast::<T>())
    }

    /// Allocates memory for one `T` and moves `value` into it
    ///
    /// # Safety
    /// Deallocate with [`dealloc_typed`](Self::dealloc_typed). The value is
    /// not dropped by the allocator.
    ///
    /// # Examples
    /// ```rust
    /// use nebula_alloc::prelude::*;
    ///
    /// let heap = HeapAllocator::new();
    /// let arena = Arena::new(64, &heap)?;
    /// let ptr = unsafe { arena.alloc_init(0xC0FFEE_u32)? };
    /// assert_eq!(unsafe { *ptr.as_ptr() }, 0xC0FFEE);
    /// # Ok::<(), nebula_alloc::AllocError>(())
    /// ```
    #[inline]
    unsafe fn alloc_init<T>(&self, value: T) -> AllocResult<NonNull<T>> {
        // SAFETY: alloc_typed returns valid, aligned storage for T
        let ptr = unsafe { self.alloc_typed::<T>()? };
        // SAFETY: ptr is valid for writes and aligned for T
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocates uninitialized memory for `count` values of `T`
    ///
    /// # Safety
    /// Elements must be initialized before being read. Deallocate with
    /// [`dealloc_array`](Self::dealloc_array) and the same `count`.
    #[inline]
    unsafe fn alloc_array<T>(&self, count: usize) -> AllocResult<NonNull<T>> {
        if count == 0 {
            return Ok(NonNull::dangling());
        }
        let layout =
            Layout::array::<T>(count).map_err(|_| AllocError::size_overflow("array layout"))?;
        // SAFETY: layout is valid and non-empty
        let ptr = unsafe { self.allocate(layout)? };
        Ok(ptr.cast::<T>())
    }

    /// Releases memory from [`alloc_typed`](Self::alloc_typed) or
    /// [`alloc_init`](Self::alloc_init)
    ///
    /// # Safety
    /// - `ptr` must come from this allocator's `alloc_typed::<T>`
    /// - Drop glue of `T` is the caller's responsibility
    #[inline]
    unsafe fn dealloc_typed<T>(&self, ptr: NonNull<T>) {
        // SAFETY: layout matches the allocation (caller contract)
        unsafe { self.deallocate(ptr.cast(), Layout::new::<T>()) }
    }

    /// Releases memory from [`alloc_array`](Self::alloc_array)
    ///
    /// # Safety
    /// `ptr` and `count` must match the original `alloc_array::<T>` call.
    #[inline]
    unsafe fn dealloc_array<T>(&self, ptr: NonNull<T>, count: usize) {
        if count == 0 {
            return;
        }
        if let Ok(layout) = Layout::array::<T>(count) {
            // SAFETY: layout matches the allocation (caller contract)
            unsafe { self.deallocate(ptr.cast(), layout) }
        }
    }
}

impl<A: Allocator + ?Sized> TypedAllocator for A {}

// SAFETY: forwards every call to the referenced allocator, contracts unchanged
unsafe impl<T: Allocator + ?Sized> Allocator for &T {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::allocate
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::reallocate
        unsafe { (**self).reallocate(ptr, old_layout, new_layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: same contract as T::deallocate
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

// ============================================================================
// Introspection
// ============================================================================

/// Memory usage tracking
pub trait MemoryUsage {
    /// Bytes currently in use (including alignment padding)
    fn used_memory(&self) -> usize;

    /// Bytes still available without growing, if bounded
    fn available_memory(&self) -> Option<usize>;

    /// Total capacity in bytes, if bounded
    fn total_memory(&self) -> Option<usize> {
        self.available_memory()
            .map(|available| self.used_memory() + available)
    }

    /// Usage as a percentage (0.0 to 100.0)
    fn memory_usage_percent(&self) -> Option<f32> {
        self.total_memory().map(|total| {
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }

    /// Snapshot of the values above
    fn memory_usage(&self) -> BasicMemoryUsage {
        BasicMemoryUsage {
            used: self.used_memory(),
            available: self.available_memory(),
            total: self.total_memory(),
            usage_percent: self.memory_usage_percent(),
        }
    }
}

/// Basic memory usage information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicMemoryUsage {
    /// Currently used memory in bytes
    pub used: usize,
    /// Available memory in bytes (None if unbounded)
    pub available: Option<usize>,
    /// Total memory capacity in bytes (None if unbounded)
    pub total: Option<usize>,
    /// Memory usage as percentage (None if unbounded)
    pub usage_percent: Option<f32>,
}

impl core::fmt::Display for BasicMemoryUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "used: {} bytes", self.used)?;
        if let Some(total) = self.total {
            write!(f, ", total: {total} bytes")?;
        }
        if let Some(percent) = self.usage_percent {
            write!(f, " ({percent:.1}%)")?;
        }
        Ok(())
    }
}

/// Allocators that can discard every allocation at once
pub trait Resettable {
    /// Retracts the allocator to its freshly created state
    ///
    /// # Safety
    /// - All pointers allocated before reset become invalid immediately
    /// - Caller must ensure no live references into the allocator exist
    unsafe fn reset(&self);

    /// Check if this allocator can be reset right now
    fn can_reset(&self) -> bool {
        true
    }
}

/// Allocators that collect statistics
pub trait StatisticsProvider {
    /// Get current statistics
    fn statistics(&self) -> AllocatorStats;

    /// Reset statistics
    fn reset_statistics(&self);

    /// Check if statistics collection is enabled
    fn statistics_enabled(&self) -> bool {
        true
    }
}
