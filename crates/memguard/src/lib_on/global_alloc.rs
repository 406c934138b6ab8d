use super::reentrancy::is_suppressed;
use std::alloc::{GlobalAlloc, Layout, System};

/// Global allocator that records every Rust heap allocation in the [`global`](super::global)
/// ledger.
///
/// Allocations carry no call-site origin. Releases are never refused: the pointer always comes
/// from the Rust runtime, so its record is dropped silently and the block goes back to
/// [`System`]. Leaks still show up in [`MemGuard::report`](super::MemGuard::report).
///
/// ```rust,ignore
/// #[global_allocator]
/// static GLOBAL: memguard::MemGuardAlloc = memguard::MemGuardAlloc;
///
/// fn main() {
///     memguard::global().initialize(memguard::Options::from_env());
///     // ...
///     memguard::global().report();
/// }
/// ```
pub struct MemGuardAlloc;

unsafe impl GlobalAlloc for MemGuardAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        track(ptr, layout.size(), None);
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        track(ptr, layout.size(), None);
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        forget(ptr);

        unsafe {
            System.dealloc(ptr, layout);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let was_static = forget(ptr);
        let resized = unsafe { System.realloc(ptr, layout, new_size) };

        if resized.is_null() {
            // The old block is still live
            track(ptr, layout.size(), was_static);
        } else {
            track(resized, new_size, was_static);
        }
        resized
    }
}

#[inline]
fn track(ptr: *mut u8, size: usize, is_static_time: Option<bool>) {
    if ptr.is_null() || is_suppressed() {
        return;
    }
    let guard = super::global();
    let is_static_time = is_static_time.unwrap_or_else(|| guard.is_static_time());
    guard.track(ptr as usize, None, size, is_static_time);
}

/// Drops the record for `ptr`, returning its static-time classification.
#[inline]
fn forget(ptr: *mut u8) -> Option<bool> {
    if ptr.is_null() || is_suppressed() {
        return None;
    }
    super::global().untrack(ptr as usize)
}
