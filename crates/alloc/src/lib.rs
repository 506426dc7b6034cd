//! # nebula-alloc
//!
//! Composable, capability-based allocators for the Nebula ecosystem.
//!
//! Everything is built around one object-safe trait, [`Allocator`], with
//! `allocate`, `reallocate` and `deallocate`. Concrete strategies borrow an
//! *upstream* `&dyn Allocator` for their own storage and expose themselves
//! through the same trait, so they stack:
//!
//! - [`HeapAllocator`]: the platform allocator
//! - [`Arena`]: one fixed buffer, bump allocation, LIFO reclamation
//! - [`ExpandableArena`]: grows its buffer through the upstream; addresses
//!   may move on growth
//! - [`PageAllocator`]: chains fixed arenas; addresses never move
//!
//! ## Quick Start
//!
//! ```rust
//! use core::alloc::Layout;
//! use nebula_alloc::prelude::*;
//!
//! let heap = HeapAllocator::new();
//! let pages = PageAllocator::new(4096, &heap)?;
//!
//! // Arenas can sit on top of any allocator, including a page allocator
//! let scratch = Arena::new(256, &pages)?;
//! let value = unsafe { scratch.alloc_init(42_u64)? };
//! assert_eq!(unsafe { *value.as_ptr() }, 42);
//! # Ok::<(), nebula_alloc::AllocError>(())
//! ```
//!
//! ## Concurrency
//!
//! All allocators are single-threaded: bookkeeping lives in `Cell`s, so they
//! are `!Sync` and cannot be shared across threads by accident. Wrap one in
//! your own mutex if you need sharing.
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// Explicit lifetimes are clearer in arena code even when elidable
#![allow(clippy::elidable_lifetime_names)]
// Precision loss in usize -> f32/f64 casts is acceptable for usage percentages
#![allow(clippy::cast_precision_loss)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod config;
pub mod utils;

pub use crate::allocator::{
    Allocator, Arena, ExpandableArena, HeapAllocator, PageAllocator, TrackedAllocator,
};
pub use crate::config::{ArenaConfig, PageConfig};
pub use crate::error::{AllocError, AllocResult, ErrorKind};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error types
    pub use crate::error::{AllocError, AllocResult, ErrorKind, OrAbort};

    // Allocator traits
    pub use crate::allocator::{
        Allocator, MemoryUsage, Resettable, StatisticsProvider, TypedAllocator,
    };

    // Allocator types
    pub use crate::allocator::{
        Arena, ArenaMarker, ArenaScope, ExpandableArena, HeapAllocator, PageAllocator,
        TrackedAllocator,
    };

    // Configuration
    pub use crate::config::{ArenaConfig, PageConfig};
}
