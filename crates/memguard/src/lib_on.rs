use crate::config::Options;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::origin::Origin;
use crate::raw::{LibcAllocator, RawAllocator};
use crate::sink::{LogSink, SinkSlot};

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

mod frames;
mod global_alloc;
mod ledger;
mod reentrancy;
mod report;
mod stack;

pub use frames::FrameTracker;
pub use global_alloc::MemGuardAlloc;
pub use ledger::{AllocationRecord, Ledger, LedgerEntry, LedgerSnapshot};
pub use stack::StackCapture;

use reentrancy::Suppressed;

/// A ledger change requested by a sink while this thread delivers a report.
enum Deferred {
    Track {
        address: usize,
        origin: Option<Origin>,
        size: usize,
        is_static_time: bool,
    },
    Release {
        address: usize,
        origin: Option<Origin>,
    },
    Forget {
        address: usize,
    },
}

/// Auditing front end for one allocator.
///
/// Every allocate call is forwarded to the underlying [`RawAllocator`] and the result is
/// recorded in the [`Ledger`]. Release calls only reach the allocator when the ledger knows
/// the pointer: releasing anything else produces an invalid-release diagnostic and leaves the
/// allocator untouched.
///
/// Allocations made before [`MemGuard::initialize`] count as static-time. Reports only count
/// those, since they are expected to outlive explicit teardown.
///
/// A sink may call back into its guard. Allocate and release calls it makes while a report is
/// being delivered are applied once that report returns; queries made there answer as if the
/// ledger were empty.
///
/// # Examples
///
/// ```rust
/// use memguard::{MemGuard, Options};
///
/// let guard = MemGuard::new();
/// guard.initialize(Options::default());
///
/// let kept = guard.allocate(40).unwrap();
/// let freed = guard.allocate(8).unwrap();
/// unsafe { guard.release(freed.as_ptr()) };
///
/// assert!(guard.is_owned(kept.as_ptr()));
/// // [MemGuard] Memory Leak at 0x... of size 40
/// guard.report();
/// assert!(!guard.is_owned(kept.as_ptr()));
/// ```
pub struct MemGuard<A: RawAllocator = LibcAllocator> {
    raw: A,
    ledger: Ledger,
    frames: FrameTracker,
    sink: Arc<SinkSlot>,
    static_time: AtomicBool,
    deferred: Mutex<Vec<Deferred>>,
    has_deferred: AtomicBool,
}

static GLOBAL: OnceLock<MemGuard> = OnceLock::new();

/// The process-wide guard used by the C ABI and by [`MemGuardAlloc`]. Created on first use.
pub fn global() -> &'static MemGuard {
    GLOBAL.get_or_init(|| {
        let _quiet = Suppressed::enter();
        MemGuard::new()
    })
}

impl MemGuard<LibcAllocator> {
    /// A guard over the C library allocator.
    pub fn new() -> Self {
        Self::with_allocator(LibcAllocator)
    }
}

impl Default for MemGuard<LibcAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> MemGuard<A> {
    pub fn with_allocator(raw: A) -> Self {
        let sink = Arc::new(SinkSlot::new());
        Self {
            raw,
            ledger: Ledger::new(Arc::clone(&sink)),
            frames: FrameTracker::new(),
            sink,
            static_time: AtomicBool::new(true),
            deferred: Mutex::new(Vec::new()),
            has_deferred: AtomicBool::new(false),
        }
    }

    /// Ends the static-time phase and applies `options`.
    ///
    /// Returns `true` for the call that ended the phase. Later calls only re-apply options.
    pub fn initialize(&self, options: Options) -> bool {
        self.ledger
            .enable_stack_capture(options.stack_traces_enabled());
        self.ledger.set_redactor(options.redactor());
        let transitioned = self.static_time.swap(false, Ordering::AcqRel);

        tracing::debug!(
            stack_traces = options.stack_traces_enabled(),
            static_allocations = self.ledger.static_len(),
            first = transitioned,
            "memguard initialized"
        );
        transitioned
    }

    pub fn is_static_time(&self) -> bool {
        self.static_time.load(Ordering::Acquire)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn frames(&self) -> &FrameTracker {
        &self.frames
    }

    pub fn allocator(&self) -> &A {
        &self.raw
    }

    pub(crate) fn track(
        &self,
        address: usize,
        origin: Option<Origin>,
        size: usize,
        is_static_time: bool,
    ) {
        if self.ledger.is_reporting_here() {
            self.defer(Deferred::Track {
                address,
                origin,
                size,
                is_static_time,
            });
            return;
        }
        self.frames.observe_alloc(address, size, origin.as_ref());
        self.ledger.add(address, origin, size, is_static_time);
    }

    /// Drops the record for `address` without a diagnostic, returning its static-time
    /// classification.
    pub(crate) fn untrack(&self, address: usize) -> Option<bool> {
        if self.ledger.is_reporting_here() {
            self.defer(Deferred::Forget { address });
            return None;
        }
        self.frames.observe_release(address);
        self.ledger
            .forget(address)
            .map(|record| record.is_static_time)
    }

    fn defer(&self, change: Deferred) {
        let _quiet = Suppressed::enter();
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
        self.has_deferred.store(true, Ordering::Release);
    }

    /// Applies the changes sinks requested during a report, in request order.
    fn settle(&self) {
        if !self.has_deferred.load(Ordering::Acquire) || self.ledger.is_reporting_here() {
            return;
        }
        let pending = {
            let _quiet = Suppressed::enter();
            let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
            self.has_deferred.store(false, Ordering::Release);
            std::mem::take(&mut *deferred)
        };

        for change in pending {
            match change {
                Deferred::Track {
                    address,
                    origin,
                    size,
                    is_static_time,
                } => {
                    self.frames.observe_alloc(address, size, origin.as_ref());
                    self.ledger.add(address, origin, size, is_static_time);
                }
                Deferred::Release { address, origin } => {
                    if self.ledger.take(address, origin.as_ref()).is_some() {
                        self.frames.observe_release(address);
                        unsafe { self.raw.release(address as *mut u8) }
                    }
                }
                Deferred::Forget { address } => {
                    self.frames.observe_release(address);
                    self.ledger.forget(address);
                }
            }
        }
    }

    /// Allocates `size` bytes, recording the caller as origin. `None` when the allocator
    /// fails.
    #[track_caller]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_at(size, Some(Origin::caller()))
    }

    pub fn allocate_at(&self, size: usize, origin: Option<Origin>) -> Option<NonNull<u8>> {
        self.settle();
        let ptr = NonNull::new(self.raw.allocate(size))?;
        self.track(ptr.as_ptr() as usize, origin, size, self.is_static_time());
        Some(ptr)
    }

    /// Allocates `count * size` zeroed bytes, recording the caller as origin.
    #[track_caller]
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.allocate_zeroed_at(count, size, Some(Origin::caller()))
    }

    pub fn allocate_zeroed_at(
        &self,
        count: usize,
        size: usize,
        origin: Option<Origin>,
    ) -> Option<NonNull<u8>> {
        self.settle();
        let ptr = NonNull::new(self.raw.allocate_zeroed(count, size))?;
        self.track(
            ptr.as_ptr() as usize,
            origin,
            count.saturating_mul(size),
            self.is_static_time(),
        );
        Some(ptr)
    }

    /// Resizes `ptr`, recording the caller as origin.
    ///
    /// # Safety
    ///
    /// See [`MemGuard::reallocate_at`].
    #[track_caller]
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        unsafe { self.reallocate_at(ptr, size, Some(Origin::caller())) }
    }

    /// Resizes `ptr` to `size` bytes.
    ///
    /// The old record is removed first; an untracked `ptr` is reported as an invalid release
    /// but the call still goes through. The new record keeps the old record's static-time
    /// classification. When the allocator fails for a non-zero size the old block is still
    /// live and its record is put back. A null `ptr` behaves like [`MemGuard::allocate_at`].
    ///
    /// Called from a sink while a report is being delivered, a non-null `ptr` is left as it is
    /// and `None` is returned.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this guard's allocator, and nothing
    /// may access the old block after the call.
    pub unsafe fn reallocate_at(
        &self,
        ptr: *mut u8,
        size: usize,
        origin: Option<Origin>,
    ) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.allocate_at(size, origin);
        }

        if self.ledger.is_reporting_here() {
            return None;
        }
        self.settle();

        let address = ptr as usize;
        let previous = self.ledger.take(address, origin.as_ref());
        let window_entry = self.frames.withdraw(address);

        let Some(resized) = NonNull::new(unsafe { self.raw.reallocate(ptr, size) }) else {
            if size != 0 {
                if let Some(entry) = window_entry {
                    self.frames.reinstate(address, entry);
                }
                if let Some(record) = previous {
                    self.ledger.restore(address, record);
                }
            }
            return None;
        };

        let is_static_time = previous
            .as_ref()
            .map_or_else(|| self.is_static_time(), |record| record.is_static_time);
        drop(previous);
        self.track(resized.as_ptr() as usize, origin, size, is_static_time);
        Some(resized)
    }

    /// Releases `ptr`, recording the caller as origin of any diagnostic.
    ///
    /// # Safety
    ///
    /// See [`MemGuard::release_at`].
    #[track_caller]
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { self.release_at(ptr, Some(Origin::caller())) }
    }

    /// Releases `ptr` if the ledger knows it.
    ///
    /// Null is a no-op. An untracked pointer, including one that was already released, is
    /// reported as an invalid release and never reaches the allocator. Called from a sink
    /// while a report is being delivered, the release happens once the report returns.
    ///
    /// # Safety
    ///
    /// Nothing may access the block after a successful release.
    pub unsafe fn release_at(&self, ptr: *mut u8, origin: Option<Origin>) {
        if ptr.is_null() {
            return;
        }

        let address = ptr as usize;
        if self.ledger.is_reporting_here() {
            self.defer(Deferred::Release { address, origin });
            return;
        }
        self.settle();

        if self.ledger.take(address, origin.as_ref()).is_none() {
            return;
        }
        self.frames.observe_release(address);

        unsafe { self.raw.release(ptr) }
    }

    /// Size recorded for `ptr`, `0` when untracked.
    pub fn query_size(&self, ptr: *const u8) -> usize {
        self.ledger.size(ptr as usize)
    }

    pub fn is_owned(&self, ptr: *const u8) -> bool {
        self.ledger.is_owned(ptr as usize)
    }

    /// Reports every runtime allocation still live as a leak, counts the static-time ones,
    /// then forgets the runtime allocations. See [`Ledger::report`].
    pub fn report(&self) {
        self.ledger.report();
        self.settle();
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn sink(&self) -> &SinkSlot {
        &self.sink
    }

    pub fn set_log_sink(&self, sink: impl LogSink + 'static) {
        self.sink.set(sink);
        tracing::trace!("memguard log sink replaced");
    }

    pub fn reset_log_sink(&self) {
        self.sink.reset();
        tracing::trace!("memguard log sink reset");
    }

    pub fn emit(&self, message: &str) {
        self.sink.emit(message);
    }

    /// Opens a capture window. Nested windows are refused and reported.
    pub fn begin_frame(&self) -> Result<(), FrameError> {
        self.frames.begin().inspect_err(|e| self.frame_misuse(*e))?;
        tracing::trace!("memguard frame opened");
        Ok(())
    }

    /// Closes the capture window and returns the allocations made inside it that are still
    /// live. Closing without an open window is refused and reported.
    pub fn end_frame(&self) -> Result<Frame, FrameError> {
        let frame = self.frames.end().inspect_err(|e| self.frame_misuse(*e))?;
        tracing::trace!(outstanding = frame.len(), "memguard frame closed");
        Ok(frame)
    }

    fn frame_misuse(&self, error: FrameError) {
        self.emit(&format!("Frame misuse: {error}"));
    }
}
