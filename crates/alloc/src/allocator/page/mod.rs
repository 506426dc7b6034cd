//! Page allocator
//!
//! Chains fixed arenas so that running out of room never relocates a block.

mod allocator;
mod list;

pub use allocator::PageAllocator;
