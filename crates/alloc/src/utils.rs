//! Alignment and overflow-checked arithmetic helpers

use crate::error::{AllocError, AllocResult};

/// Bytes needed to bring `addr` up to the next multiple of `align`
///
/// `align` must be a power of two. Computed as `-addr & (align - 1)`, which is
/// zero when `addr` is already aligned.
#[inline]
#[must_use]
pub const fn padding_for(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    addr.wrapping_neg() & (align - 1)
}

/// Whether `addr` is a multiple of `align` (a power of two)
#[inline]
#[must_use]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

/// Rounds `value` up to the next multiple of `align`, failing on overflow
#[inline]
pub fn align_up(value: usize, align: usize) -> AllocResult<usize> {
    value
        .checked_add(padding_for(value, align))
        .ok_or_else(|| AllocError::size_overflow("align_up"))
}

/// `a + b`, reporting `operation` on overflow
#[inline]
pub fn checked_add(a: usize, b: usize, operation: &str) -> AllocResult<usize> {
    a.checked_add(b)
        .ok_or_else(|| AllocError::size_overflow(operation))
}

/// Capacity an expandable buffer grows to when `needed` more bytes are required
///
/// Doubles (plus one, so a zero capacity still grows) or jumps straight to the
/// exact requirement, whichever is larger.
#[inline]
pub fn grown_capacity(capacity: usize, needed: usize) -> AllocResult<usize> {
    let doubled = capacity
        .checked_mul(2)
        .and_then(|c| c.checked_add(1))
        .ok_or_else(|| AllocError::size_overflow("capacity doubling"))?;
    let exact = checked_add(capacity, needed, "capacity growth")?;
    Ok(doubled.max(exact))
}

/// Overwrites `len` bytes at `ptr` with zero
///
/// # Safety
/// `ptr` must be valid for writes of `len` bytes.
#[inline]
pub(crate) unsafe fn zero_bytes(ptr: *mut u8, len: usize) {
    if len > 0 {
        // SAFETY: caller guarantees [ptr, ptr + len) is writable
        unsafe { core::ptr::write_bytes(ptr, 0, len) };
    }
}
