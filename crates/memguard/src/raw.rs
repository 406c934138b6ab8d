//! The allocation primitive a [`MemGuard`](crate::MemGuard) audits.
//!
//! The guard never allocates user memory itself: every entry point forwards to a
//! [`RawAllocator`] and records the result. [`LibcAllocator`] is the `malloc` family and what
//! C callers get through the exported ABI.

/// A malloc-style allocator.
///
/// # Safety
///
/// Implementations must behave like the C allocation functions: returned pointers are
/// either null (failure) or unique until passed back to `reallocate`/`release`, and
/// `allocate_zeroed` returns zero-filled memory.
pub unsafe trait RawAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> *mut u8;

    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    unsafe fn release(&self, ptr: *mut u8);
}

/// `malloc`, `calloc`, `realloc` and `free` from the platform C library.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcAllocator;

unsafe impl RawAllocator for LibcAllocator {
    #[inline]
    fn allocate(&self, size: usize) -> *mut u8 {
        unsafe { libc::malloc(size) as *mut u8 }
    }

    #[inline]
    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        unsafe { libc::calloc(count, size) as *mut u8 }
    }

    #[inline]
    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { libc::realloc(ptr as *mut libc::c_void, size) as *mut u8 }
    }

    #[inline]
    unsafe fn release(&self, ptr: *mut u8) {
        unsafe { libc::free(ptr as *mut libc::c_void) }
    }
}

unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    fn allocate(&self, size: usize) -> *mut u8 {
        (**self).allocate(size)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        (**self).allocate_zeroed(count, size)
    }

    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { (**self).reallocate(ptr, size) }
    }

    unsafe fn release(&self, ptr: *mut u8) {
        unsafe { (**self).release(ptr) }
    }
}
