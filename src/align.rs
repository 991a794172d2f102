//! Alignment rules for direct (`O_DIRECT`) transfers.
//!
//! Direct I/O needs the transfer length to be a multiple of the device's
//! logical block size and the buffer address to be suitably aligned. Buffers
//! are allocated page-aligned, which satisfies every block size in practice.

/// Logical block size that direct transfer lengths must be a multiple of.
pub const DIRECT_IO_ALIGNMENT: usize = 512;

/// Largest byte count a single Linux `read`/`write` call transfers
/// (`MAX_RW_COUNT`). Larger requests come back short.
pub const MAX_SINGLE_IO: usize = 0x7fff_f000;

/// Returns the page size of the system (typically 4096).
pub fn page_size() -> usize {
    // SAFETY: _SC_PAGESIZE is always valid on Linux.
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    debug_assert!(ps > 0, "sysconf(_SC_PAGESIZE) returned {ps}");
    ps as usize
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
///
/// ```
/// use p2pbench::align::align_up;
/// assert_eq!(align_up(4095, 4096), 4096);
/// assert_eq!(align_up(4096, 4096), 4096);
/// ```
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (value + alignment - 1) & !(alignment - 1)
}

/// Check if `value` is a multiple of `alignment` (a power of two).
#[inline]
pub fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (value & (alignment - 1)) == 0
}

/// Check if a pointer address is aligned to `alignment`.
#[inline]
pub fn is_aligned_ptr(ptr: *const u8, alignment: usize) -> bool {
    is_aligned(ptr as usize, alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(8192, 4096), 8192);
        assert_eq!(align_up(513, DIRECT_IO_ALIGNMENT), 1024);
    }

    #[test]
    fn test_default_transfer_size_is_block_aligned() {
        // 500M u32 words: not page aligned, but a whole number of 512 B blocks.
        let size = 2_000_000_000;
        assert!(is_aligned(size, DIRECT_IO_ALIGNMENT));
        assert!(!is_aligned(size, 4096));
        assert!(size <= MAX_SINGLE_IO);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(4096, DIRECT_IO_ALIGNMENT));
        assert!(!is_aligned(4000, DIRECT_IO_ALIGNMENT));
        assert!(is_aligned(0, 4096));
    }

    #[test]
    fn test_is_aligned_ptr() {
        assert!(is_aligned_ptr(0x2000 as *const u8, 4096));
        assert!(!is_aligned_ptr(0x2001 as *const u8, 4096));
    }

    #[test]
    fn test_page_size() {
        let ps = page_size();
        assert!(ps.is_power_of_two());
        assert!(ps >= 4096);
        assert!(is_aligned(ps, DIRECT_IO_ALIGNMENT));
    }
}
