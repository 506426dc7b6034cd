//! Allocator configuration
//!
//! Plain structs with presets. Nothing is read from the environment.

use crate::error::{AllocError, AllocResult};

/// Configuration for fixed and expandable arenas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Initial buffer size in bytes
    pub capacity: usize,
    /// Enable statistics tracking
    pub track_stats: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: 64 * 1024,
            track_stats: cfg!(debug_assertions),
        }
    }
}

impl ArenaConfig {
    /// 4KB arena
    #[must_use]
    pub fn small() -> Self {
        Self {
            capacity: 4 * 1024,
            ..Self::default()
        }
    }

    /// 256KB arena
    #[must_use]
    pub fn medium() -> Self {
        Self {
            capacity: 256 * 1024,
            ..Self::default()
        }
    }

    /// 4MB arena
    #[must_use]
    pub fn large() -> Self {
        Self {
            capacity: 4 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Debug configuration - statistics on
    #[must_use]
    pub fn debug(capacity: usize) -> Self {
        Self {
            capacity,
            track_stats: true,
        }
    }

    /// Production configuration - no bookkeeping beyond the bump offset
    #[must_use]
    pub fn production(capacity: usize) -> Self {
        Self {
            capacity,
            track_stats: false,
        }
    }
}

/// Configuration for the page allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    /// Minimum size of every arena the allocator creates
    pub default_page_size: usize,
    /// Arena slots reserved in the list up front
    pub initial_list_capacity: usize,
    /// Enable statistics tracking
    pub track_stats: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_page_size: 64 * 1024,
            initial_list_capacity: 1,
            track_stats: cfg!(debug_assertions),
        }
    }
}

impl PageConfig {
    /// Debug configuration - statistics on
    #[must_use]
    pub fn debug(default_page_size: usize) -> Self {
        Self {
            default_page_size,
            initial_list_capacity: 1,
            track_stats: true,
        }
    }

    /// Production configuration - room for a few pages, no statistics
    #[must_use]
    pub fn production(default_page_size: usize) -> Self {
        Self {
            default_page_size,
            initial_list_capacity: 8,
            track_stats: false,
        }
    }

    /// Rejects values the page allocator cannot work with
    pub fn validate(&self) -> AllocResult<()> {
        if self.default_page_size == 0 {
            return Err(AllocError::invalid_layout("page size cannot be zero"));
        }
        if self.initial_list_capacity == 0 {
            return Err(AllocError::invalid_layout(
                "arena list capacity cannot be zero",
            ));
        }
        Ok(())
    }
}
