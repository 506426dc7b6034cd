//! Standalone error types for nebula-alloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Every variant
//! maps onto one [`ErrorKind`], the coarse taxonomy callers branch on.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

/// Result type for allocator operations
pub type AllocResult<T> = Result<T, AllocError>;

// ============================================================================
// Error Kinds
// ============================================================================

/// Coarse error category shared by every allocator in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The upstream allocator (or an arena) could not provide memory
    AllocationFail,
    /// Malformed request, destroyed allocator or foreign marker
    InvalidArgument,
    /// Reserved for collaborators doing file I/O; never raised by the allocators
    FileIo,
    /// Reserved for collaborators; never raised by the allocators
    Misc,
}

impl ErrorKind {
    /// Stable name of the kind
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllocationFail => "ALLOCATION_FAIL",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FileIo => "FILE_IO",
            Self::Misc => "MISC_ERROR",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// Allocator errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AllocError {
    // --- Allocation Errors ---
    /// The upstream allocator returned nothing
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    OutOfMemory { size: usize, align: usize },

    /// A fixed arena has no room for the request
    #[error("Arena exhausted: requested {requested} bytes, available {available}")]
    ArenaExhausted { requested: usize, available: usize },

    // --- Argument Errors ---
    /// Size arithmetic overflowed
    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    /// The request cannot be expressed as a layout
    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    /// Destroyed allocator, foreign block or unusable marker
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    // --- Collaborator Errors ---
    /// File I/O failure in a collaborator
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Anything else a collaborator reports
    #[error("{message}")]
    Other { message: String },
}

impl AllocError {
    /// Coarse category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfMemory { .. } | Self::ArenaExhausted { .. } => ErrorKind::AllocationFail,
            Self::SizeOverflow { .. } | Self::InvalidLayout { .. } | Self::InvalidState { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Io { .. } => ErrorKind::FileIo,
            Self::Other { .. } => ErrorKind::Misc,
        }
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "ALLOC:OUT_OF_MEMORY",
            Self::ArenaExhausted { .. } => "ALLOC:ARENA_EXHAUSTED",
            Self::SizeOverflow { .. } => "ALLOC:OVERFLOW",
            Self::InvalidLayout { .. } => "ALLOC:LAYOUT",
            Self::InvalidState { .. } => "ALLOC:STATE",
            Self::Io { .. } => "ALLOC:IO",
            Self::Other { .. } => "ALLOC:MISC",
        }
    }

    /// Whether the request could succeed later without changing it
    ///
    /// Only capacity failures qualify. Nothing in this crate retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::AllocationFail
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create out of memory error (upstream returned nothing)
    pub fn out_of_memory(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, align, "upstream allocation failed");

        Self::OutOfMemory { size, align }
    }

    /// Create out of memory error from layout
    pub fn out_of_memory_with_layout(layout: Layout) -> Self {
        Self::out_of_memory(layout.size(), layout.align())
    }

    /// Create arena exhausted error
    pub fn arena_exhausted(requested: usize, available: usize) -> Self {
        Self::ArenaExhausted {
            requested,
            available,
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create invalid state error
    pub fn invalid_state(reason: &str) -> Self {
        Self::InvalidState {
            reason: reason.to_string(),
        }
    }

    /// Error returned by every operation on a destroyed allocator
    pub fn destroyed(allocator: &str) -> Self {
        Self::InvalidState {
            reason: format!("{allocator} has been destroyed"),
        }
    }

    /// Create I/O error (collaborators only)
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create miscellaneous error (collaborators only)
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<core::alloc::LayoutError> for AllocError {
    fn from(_: core::alloc::LayoutError) -> Self {
        Self::invalid_layout("size overflows isize when rounded up to alignment")
    }
}

// ============================================================================
// Abort helper
// ============================================================================

/// Opt-in "abort if error" boundary helper
///
/// Allocators never abort on their own. Callers that treat allocation failure
/// as fatal can convert a result at the boundary instead of threading it
/// further.
///
/// ```no_run
/// use nebula_alloc::allocator::{Arena, HeapAllocator};
/// use nebula_alloc::error::OrAbort;
///
/// let heap = HeapAllocator::new();
/// let arena = Arena::new(1024, &heap).or_abort();
/// assert_eq!(arena.capacity(), 1024);
/// ```
pub trait OrAbort<T> {
    /// Returns the value, or reports the error on stderr and aborts the process
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for AllocResult<T> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                #[cfg(feature = "logging")]
                error!(code = err.code(), kind = %err.kind(), "aborting: {err}");

                eprintln!("{err}");
                std::process::abort()
            }
        }
    }
}
