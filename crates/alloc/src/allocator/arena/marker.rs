//! Markers and RAII scopes for LIFO retraction

use super::Arena;

/// Saved bump position of an [`Arena`]
///
/// Releasing to a marker discards everything allocated after it. A marker is
/// only accepted by the arena that produced it, and only until that arena is
/// reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMarker {
    pub(crate) offset: usize,
    pub(crate) arena_id: u64,
    pub(crate) epoch: u32,
}

impl ArenaMarker {
    /// Bump offset the marker retracts to
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// RAII guard that releases an arena back to where it was created
///
/// Blocks allocated through the arena while the scope is alive are zeroed and
/// reclaimed when it drops.
pub struct ArenaScope<'s, 'a> {
    arena: &'s Arena<'a>,
    marker: ArenaMarker,
}

impl<'s, 'a> ArenaScope<'s, 'a> {
    pub(super) fn new(arena: &'s Arena<'a>) -> Self {
        Self {
            marker: arena.mark(),
            arena,
        }
    }

    /// Gets the underlying arena
    pub fn arena(&self) -> &'s Arena<'a> {
        self.arena
    }

    /// The marker this scope releases to
    pub fn marker(&self) -> ArenaMarker {
        self.marker
    }
}

impl Drop for ArenaScope<'_, '_> {
    fn drop(&mut self) {
        // Errors can't be propagated from drop; a reset arena simply keeps its state
        // SAFETY: blocks from inside the scope must not outlive it (scope contract)
        let _ = unsafe { self.arena.release(self.marker) };
    }
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;

    use crate::allocator::{Allocator, Arena, HeapAllocator};
    use crate::error::ErrorKind;

    #[test]
    fn scope_restores_position() {
        let heap = HeapAllocator::new();
        let arena = Arena::new(128, &heap).unwrap();
        unsafe { arena.allocate(Layout::new::<u64>()).unwrap() };
        let before = arena.len();

        {
            let scope = arena.scope();
            unsafe {
                let block = scope.arena().allocate(Layout::new::<[u8; 32]>()).unwrap();
                block.cast::<u8>().as_ptr().write_bytes(0xFF, 32);
            }
            assert!(arena.len() > before);
            assert_eq!(scope.marker().offset(), before);
        }

        assert_eq!(arena.len(), before);
    }

    #[test]
    fn release_zeroes_released_range() {
        let heap = HeapAllocator::new();
        let arena = Arena::new(64, &heap).unwrap();
        let marker = arena.mark();

        unsafe {
            let block = arena.allocate(Layout::new::<[u8; 16]>()).unwrap();
            block.cast::<u8>().as_ptr().write_bytes(0xAB, 16);
            arena.release(marker).unwrap();
            let bytes = core::slice::from_raw_parts(block.cast::<u8>().as_ptr(), 16);
            assert_eq!(bytes, &[0; 16]);
        }
        assert!(arena.is_empty());
    }

    #[test]
    fn future_and_foreign_markers_are_rejected() {
        let heap = HeapAllocator::new();
        let arena = Arena::new(64, &heap).unwrap();
        let other = Arena::new(64, &heap).unwrap();

        unsafe { arena.allocate(Layout::new::<u32>()).unwrap() };
        let future = arena.mark();
        unsafe { arena.release(crate::allocator::ArenaMarker { offset: 0, ..future }).unwrap() };

        let err = unsafe { arena.release(future) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = unsafe { other.release(arena.mark()) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_arenas_reject_each_others_markers() {
        let heap = HeapAllocator::new();
        let first = Arena::new(0, &heap).unwrap();
        let second = Arena::new(0, &heap).unwrap();

        let err = unsafe { second.release(first.mark()) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(unsafe { first.release(first.mark()) }.is_ok());
    }

    #[test]
    fn marker_is_rejected_by_arena_reusing_the_buffer() {
        let heap = HeapAllocator::new();
        let mut old = Arena::new(64, &heap).unwrap();
        unsafe { old.allocate(Layout::new::<u64>()).unwrap() };
        let stale = old.mark();
        old.destroy();

        // The platform allocator may hand the same buffer to the next arena
        let fresh = Arena::new(64, &heap).unwrap();
        unsafe { fresh.allocate(Layout::new::<[u8; 16]>()).unwrap() };

        let err = unsafe { fresh.release(stale) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fresh.len(), 16);
    }
}
