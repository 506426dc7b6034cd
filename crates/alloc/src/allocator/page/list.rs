//! Upstream-backed growable list of arenas
//!
//! The page allocator keeps its arenas in storage obtained from the same
//! upstream allocator that backs the arenas themselves, growing it to
//! `capacity * 2 + 1` slots through the upstream's `reallocate`.
//!
//! ## Invariants
//!
//! - Slots `[0, len)` hold initialized arenas, in creation order
//! - A failed growth leaves the list exactly as it was
//! - Dropping the list drops the arenas last-to-first, then frees the storage

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, Arena, TypedAllocator};
use crate::error::AllocError;

pub(crate) struct ArenaList<'a> {
    ptr: NonNull<Arena<'a>>,
    len: usize,
    capacity: usize,
    upstream: &'a dyn Allocator,
}

impl<'a> ArenaList<'a> {
    /// Reserves storage for `capacity` arenas from `upstream`
    pub(crate) fn with_capacity(capacity: usize, upstream: &'a dyn Allocator) -> AllocResult<Self> {
        // SAFETY: the storage is released in `release` with the same count
        let ptr = unsafe { upstream.alloc_array::<Arena<'a>>(capacity)? };
        Ok(Self {
            ptr,
            len: 0,
            capacity,
            upstream,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn as_slice(&self) -> &[Arena<'a>] {
        // SAFETY: slots [0, len) are initialized
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn last(&self) -> Option<&Arena<'a>> {
        self.as_slice().last()
    }

    /// Makes room for one more arena
    pub(crate) fn reserve_one(&mut self) -> AllocResult<()> {
        if self.len < self.capacity {
            return Ok(());
        }

        let new_capacity = self
            .capacity
            .checked_mul(2)
            .and_then(|c| c.checked_add(1))
            .ok_or_else(|| AllocError::size_overflow("arena list growth"))?;
        let old_layout = Layout::array::<Arena<'a>>(self.capacity)?;
        let new_layout = Layout::array::<Arena<'a>>(new_capacity)?;

        // SAFETY:
        // - ptr was obtained from upstream with old_layout
        // - arenas are plain values; moving their bytes moves them, their buffers stay put
        let new_ptr = unsafe {
            self.upstream
                .reallocate(self.ptr.cast(), old_layout, new_layout)?
        };

        self.ptr = new_ptr.cast();
        self.capacity = new_capacity;
        Ok(())
    }

    /// Appends `arena`; requires a prior successful `reserve_one`
    pub(crate) fn push(&mut self, arena: Arena<'a>) -> Result<(), Arena<'a>> {
        if self.len == self.capacity {
            return Err(arena);
        }
        // SAFETY: slot `len` is within capacity and uninitialized
        unsafe { self.ptr.as_ptr().add(self.len).write(arena) };
        self.len += 1;
        Ok(())
    }

    /// Drops every arena in reverse creation order and frees the storage
    ///
    /// Leaves an empty list without storage; calling it again is a no-op.
    pub(crate) fn release(&mut self) {
        while self.len > 0 {
            self.len -= 1;
            // SAFETY: slot `len` was initialized and is now outside [0, len)
            unsafe { core::ptr::drop_in_place(self.ptr.as_ptr().add(self.len)) };
        }

        if self.capacity > 0 {
            // SAFETY: storage came from upstream.alloc_array with this capacity
            unsafe { self.upstream.dealloc_array(self.ptr, self.capacity) };
            self.capacity = 0;
            self.ptr = NonNull::dangling();
        }
    }
}

impl Drop for ArenaList<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
