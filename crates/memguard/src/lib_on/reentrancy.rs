use std::cell::Cell;

thread_local! {
    static SUPPRESS_DEPTH: Cell<u32> = const { Cell::new(0) };
    static THREAD_MARK: u8 = const { 0 };
}

/// Marks the current thread as running memguard's own bookkeeping.
///
/// While at least one guard is alive on a thread, [`MemGuardAlloc`](super::MemGuardAlloc)
/// neither records nor forgets on that thread. The ledger and the frame tracker hold one for
/// every locked region and every stack capture, so the global allocator never deadlocks on
/// their own hash map growth. Sinks and tracing always run outside a guard. Nothing allocated
/// outside a guard may be freed inside one.
pub struct Suppressed {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Suppressed {
    #[inline]
    pub fn enter() -> Self {
        let _ = SUPPRESS_DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for Suppressed {
    #[inline]
    fn drop(&mut self) {
        let _ = SUPPRESS_DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// True while the current thread is inside memguard's bookkeeping. A thread whose locals
/// are already torn down counts as suppressed.
#[inline]
pub fn is_suppressed() -> bool {
    SUPPRESS_DEPTH
        .try_with(|depth| depth.get() > 0)
        .unwrap_or(true)
}

/// A non-zero value unique to the current thread while it is alive.
#[inline]
pub fn thread_token() -> usize {
    THREAD_MARK
        .try_with(|mark| mark as *const u8 as usize)
        .unwrap_or(usize::MAX)
}
