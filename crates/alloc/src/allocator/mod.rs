//! Allocators
//!
//! One capability trait ([`Allocator`]) and its implementations:
//! - [`HeapAllocator`]: the platform allocator, the usual upstream
//! - [`Arena`]: fixed buffer, bump offset, LIFO reclamation
//! - [`ExpandableArena`]: an arena that grows (and may move) its buffer
//! - [`PageAllocator`]: a chain of arenas, addresses never move
//! - [`TrackedAllocator`]: counting and budgeting wrapper for any allocator

// Core allocator types
mod expandable;
mod heap;
mod stats;
mod tracked;
mod traits;

// Allocator implementations
pub mod arena;
pub mod page;

// Re-exports for convenience
pub use crate::error::{AllocError, AllocResult};
pub use arena::{Arena, ArenaMarker, ArenaScope};
pub use expandable::ExpandableArena;
pub use heap::{HEAP, HeapAllocator};
pub use page::PageAllocator;
pub use stats::{AllocatorStats, CellStats};
pub use tracked::TrackedAllocator;
pub use traits::{
    Allocator, BasicMemoryUsage, MemoryUsage, Resettable, StatisticsProvider, TypedAllocator,
};
