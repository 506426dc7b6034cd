//! Fixed-capacity arena allocator
//!
//! A single buffer, a bump offset and LIFO-aware reallocate/deallocate.
//! Markers and scopes retract the arena in bulk.

mod allocator;
mod marker;

pub use allocator::Arena;
pub(crate) use allocator::Attempt;
pub use marker::{ArenaMarker, ArenaScope};
