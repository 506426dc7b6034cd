//! Heap allocator
//!
//! Adapter over the platform allocator (`std::alloc::System`). This is the
//! usual upstream for arenas and page allocators.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use super::{AllocResult, Allocator, MemoryUsage};
use crate::error::AllocError;

/// Wrapper for the platform's default allocator
///
/// Stateless. Zero-sized requests get a well-aligned dangling pointer and are
/// never passed to the platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

/// Shared heap allocator for use as a `'static` upstream
pub static HEAP: HeapAllocator = HeapAllocator::new();

impl HeapAllocator {
    /// Creates a new heap allocator
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        HeapAllocator
    }

    #[inline]
    fn dangling(align: usize) -> NonNull<[u8]> {
        // SAFETY: align is a non-zero power of two, so the address is non-null
        let ptr = unsafe { NonNull::new_unchecked(core::ptr::without_provenance_mut(align)) };
        NonNull::slice_from_raw_parts(ptr, 0)
    }
}

// SAFETY: System returns distinct, suitably aligned blocks or null
unsafe impl Allocator for HeapAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(Self::dangling(layout.align()));
        }

        // SAFETY: layout has non-zero size
        let ptr = unsafe { System.alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
            None => Err(AllocError::out_of_memory_with_layout(layout)),
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout == new_layout {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        // Use system realloc when alignment is unchanged and neither side is empty
        if old_layout.align() == new_layout.align()
            && old_layout.size() > 0
            && new_layout.size() > 0
        {
            // SAFETY:
            // - ptr came from System with old_layout (caller contract)
            // - new size is non-zero and Layout-valid with the same alignment
            let new_ptr = unsafe { System.realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
            return match NonNull::new(new_ptr) {
                Some(new_ptr) => Ok(NonNull::slice_from_raw_parts(new_ptr, new_layout.size())),
                None => Err(AllocError::out_of_memory_with_layout(new_layout)),
            };
        }

        // Fall back to allocate + copy + deallocate
        // SAFETY: new_layout is valid; on failure ptr is untouched
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let copy_size = old_layout.size().min(new_layout.size());
        // SAFETY: both blocks are valid for copy_size bytes and distinct
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), copy_size);
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // SAFETY: ptr came from System with this layout (caller contract)
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
    }
}

// The heap does not track its own allocations
impl MemoryUsage for HeapAllocator {
    fn used_memory(&self) -> usize {
        0
    }

    fn available_memory(&self) -> Option<usize> {
        None
    }
}
