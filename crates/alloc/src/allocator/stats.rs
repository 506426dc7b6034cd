//! Allocator statistics
//!
//! [`AllocatorStats`] is the plain snapshot handed out by
//! [`StatisticsProvider`](super::StatisticsProvider). [`CellStats`] holds the
//! live counters inside an allocator; it uses `Cell`s, so the owning
//! allocator stays single-threaded.

use core::cell::Cell;

/// Statistics for memory allocators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Bytes currently handed out
    pub allocated_bytes: usize,
    /// Peak of `allocated_bytes`
    pub peak_allocated_bytes: usize,
    /// Successful allocations
    pub allocation_count: usize,
    /// Deallocations
    pub deallocation_count: usize,
    /// Successful reallocations
    pub reallocation_count: usize,
    /// Reallocations that had to move the block
    pub relocation_count: usize,
    /// Failed allocations and reallocations
    pub failed_allocations: usize,
    /// Cumulative bytes allocated
    pub total_bytes_allocated: usize,
    /// Cumulative bytes deallocated
    pub total_bytes_deallocated: usize,
    /// Buffer growths (expandable arena)
    pub growth_count: usize,
    /// Arenas appended after creation (page allocator)
    pub pages_added: usize,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocated_bytes: 0,
            peak_allocated_bytes: 0,
            allocation_count: 0,
            deallocation_count: 0,
            reallocation_count: 0,
            relocation_count: 0,
            failed_allocations: 0,
            total_bytes_allocated: 0,
            total_bytes_deallocated: 0,
            growth_count: 0,
            pages_added: 0,
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Calculate the average allocation size
    #[must_use]
    pub fn average_allocation_size(&self) -> Option<f64> {
        if self.allocation_count > 0 {
            Some(self.total_bytes_allocated as f64 / self.allocation_count as f64)
        } else {
            None
        }
    }

    /// Share of allocation attempts that succeeded (0.0 to 1.0)
    #[must_use]
    pub fn allocation_efficiency(&self) -> f64 {
        let total_attempts = self.allocation_count + self.failed_allocations;
        if total_attempts > 0 {
            self.allocation_count as f64 / total_attempts as f64
        } else {
            1.0
        }
    }

    /// Check if there are any active allocations
    #[must_use]
    pub fn has_active_allocations(&self) -> bool {
        self.allocation_count > self.deallocation_count
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator Statistics:")?;
        writeln!(f, "  Current allocated: {} bytes", self.allocated_bytes)?;
        writeln!(f, "  Peak allocated: {} bytes", self.peak_allocated_bytes)?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Deallocations: {}", self.deallocation_count)?;
        writeln!(
            f,
            "  Reallocations: {} ({} relocated)",
            self.reallocation_count, self.relocation_count
        )?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;
        if self.growth_count > 0 {
            writeln!(f, "  Growths: {}", self.growth_count)?;
        }
        if self.pages_added > 0 {
            writeln!(f, "  Pages added: {}", self.pages_added)?;
        }
        if let Some(avg) = self.average_allocation_size() {
            writeln!(f, "  Average allocation size: {avg:.2} bytes")?;
        }
        Ok(())
    }
}

/// Single-threaded live counters backing an allocator's statistics
#[derive(Debug, Default)]
pub struct CellStats {
    inner: Cell<AllocatorStats>,
}

impl CellStats {
    /// Creates zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Cell::new(AllocatorStats::new()),
        }
    }

    #[inline]
    fn update(&self, f: impl FnOnce(&mut AllocatorStats)) {
        let mut stats = self.inner.get();
        f(&mut stats);
        self.inner.set(stats);
    }

    /// Record a successful allocation of `size` bytes
    pub fn record_allocation(&self, size: usize) {
        self.update(|s| {
            s.allocation_count += 1;
            s.total_bytes_allocated = s.total_bytes_allocated.saturating_add(size);
            s.allocated_bytes = s.allocated_bytes.saturating_add(size);
            s.peak_allocated_bytes = s.peak_allocated_bytes.max(s.allocated_bytes);
        });
    }

    /// Record a deallocation of `size` bytes
    pub fn record_deallocation(&self, size: usize) {
        self.update(|s| {
            s.deallocation_count += 1;
            s.total_bytes_deallocated = s.total_bytes_deallocated.saturating_add(size);
            s.allocated_bytes = s.allocated_bytes.saturating_sub(size);
        });
    }

    /// Record a successful reallocation; `moved` when the block changed address
    pub fn record_reallocation(&self, old_size: usize, new_size: usize, moved: bool) {
        self.update(|s| {
            s.reallocation_count += 1;
            if moved {
                s.relocation_count += 1;
            }
            if new_size > old_size {
                let diff = new_size - old_size;
                s.allocated_bytes = s.allocated_bytes.saturating_add(diff);
                s.total_bytes_allocated = s.total_bytes_allocated.saturating_add(diff);
            } else {
                let diff = old_size - new_size;
                s.allocated_bytes = s.allocated_bytes.saturating_sub(diff);
                s.total_bytes_deallocated = s.total_bytes_deallocated.saturating_add(diff);
            }
            s.peak_allocated_bytes = s.peak_allocated_bytes.max(s.allocated_bytes);
        });
    }

    /// Record a failed allocation or reallocation
    pub fn record_failure(&self) {
        self.update(|s| s.failed_allocations += 1);
    }

    /// Record a buffer growth
    pub fn record_growth(&self) {
        self.update(|s| s.growth_count += 1);
    }

    /// Record an appended page
    pub fn record_page(&self) {
        self.update(|s| s.pages_added += 1);
    }

    /// Record `size` bytes released in bulk (marker release, reset)
    pub fn record_release(&self, size: usize) {
        self.update(|s| {
            s.total_bytes_deallocated = s.total_bytes_deallocated.saturating_add(size);
            s.allocated_bytes = s.allocated_bytes.saturating_sub(size);
        });
    }

    /// Get a snapshot of the current statistics
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        self.inner.get()
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.inner.set(AllocatorStats::new());
    }
}
