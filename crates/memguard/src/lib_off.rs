use crate::config::Options;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::origin::Origin;
use crate::raw::{LibcAllocator, RawAllocator};
use crate::redact::PathRedactor;
use crate::sink::{LogSink, SinkSlot};

use serde::Serialize;
use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: usize,
    pub origin: Option<Origin>,
    pub stack_trace: Option<String>,
    pub is_static_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub address: usize,
    pub size: usize,
    pub origin: Option<Origin>,
    pub stack_trace: Option<String>,
    pub is_static_time: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub runtime: Vec<LedgerEntry>,
    pub static_time: Vec<LedgerEntry>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        0
    }

    pub fn is_empty(&self) -> bool {
        true
    }

    pub fn runtime_bytes(&self) -> usize {
        0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Default)]
pub struct Ledger;

impl Ledger {
    pub fn new(_sink: Arc<SinkSlot>) -> Self {
        Self
    }

    pub fn enable_stack_capture(&self, _enabled: bool) {}

    pub fn stack_capture_enabled(&self) -> bool {
        false
    }

    pub fn set_redactor(&self, _redactor: PathRedactor) {}

    pub fn redactor(&self) -> Arc<PathRedactor> {
        Arc::new(PathRedactor::disabled())
    }

    pub fn add(
        &self,
        _address: usize,
        _origin: Option<Origin>,
        _size: usize,
        _is_static_time: bool,
    ) -> bool {
        false
    }

    pub fn remove(&self, _address: usize, _origin: Option<&Origin>) -> bool {
        false
    }

    pub fn take(&self, _address: usize, _origin: Option<&Origin>) -> Option<AllocationRecord> {
        None
    }

    pub fn forget(&self, _address: usize) -> Option<AllocationRecord> {
        None
    }

    pub fn size(&self, _address: usize) -> usize {
        0
    }

    pub fn is_owned(&self, _address: usize) -> bool {
        false
    }

    pub fn record(&self, _address: usize) -> Option<AllocationRecord> {
        None
    }

    pub fn report(&self) {}

    pub fn reset(&self) {}

    pub fn len(&self) -> usize {
        0
    }

    pub fn is_empty(&self) -> bool {
        true
    }

    pub fn runtime_len(&self) -> usize {
        0
    }

    pub fn static_len(&self) -> usize {
        0
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::default()
    }
}

#[derive(Debug, Default)]
pub struct FrameTracker;

impl FrameTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn is_open(&self) -> bool {
        false
    }

    pub fn begin(&self) -> Result<(), FrameError> {
        Ok(())
    }

    pub fn end(&self) -> Result<Frame, FrameError> {
        Ok(Frame::default())
    }

    pub fn observe_alloc(&self, _address: usize, _size: usize, _origin: Option<&Origin>) {}

    pub fn observe_release(&self, _address: usize) {}
}

#[derive(Debug, Default)]
pub struct StackCapture;

impl StackCapture {
    pub const fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn set_enabled(&self, _enabled: bool) {}

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn capture_formatted(&self) -> String {
        String::new()
    }
}

pub struct MemGuard<A: RawAllocator = LibcAllocator> {
    raw: A,
    ledger: Ledger,
    frames: FrameTracker,
    sink: Arc<SinkSlot>,
}

static GLOBAL: OnceLock<MemGuard> = OnceLock::new();

pub fn global() -> &'static MemGuard {
    GLOBAL.get_or_init(MemGuard::new)
}

impl MemGuard<LibcAllocator> {
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
        }
    }

    pub fn initialize(&self, _options: Options) -> bool {
        false
    }

    pub fn is_static_time(&self) -> bool {
        false
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

    #[inline]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        NonNull::new(self.raw.allocate(size))
    }

    #[inline]
    pub fn allocate_at(&self, size: usize, _origin: Option<Origin>) -> Option<NonNull<u8>> {
        self.allocate(size)
    }

    #[inline]
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        NonNull::new(self.raw.allocate_zeroed(count, size))
    }

    #[inline]
    pub fn allocate_zeroed_at(
        &self,
        count: usize,
        size: usize,
        _origin: Option<Origin>,
    ) -> Option<NonNull<u8>> {
        self.allocate_zeroed(count, size)
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this guard's allocator.
    #[inline]
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { self.raw.reallocate(ptr, size) })
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this guard's allocator.
    #[inline]
    pub unsafe fn reallocate_at(
        &self,
        ptr: *mut u8,
        size: usize,
        _origin: Option<Origin>,
    ) -> Option<NonNull<u8>> {
        unsafe { self.reallocate(ptr, size) }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this guard's allocator.
    #[inline]
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { self.raw.release(ptr) }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this guard's allocator.
    #[inline]
    pub unsafe fn release_at(&self, ptr: *mut u8, _origin: Option<Origin>) {
        unsafe { self.release(ptr) }
    }

    pub fn query_size(&self, _ptr: *const u8) -> usize {
        0
    }

    pub fn is_owned(&self, _ptr: *const u8) -> bool {
        false
    }

    pub fn report(&self) {}

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::default()
    }

    pub fn sink(&self) -> &SinkSlot {
        &self.sink
    }

    pub fn set_log_sink(&self, sink: impl LogSink + 'static) {
        self.sink.set(sink);
    }

    pub fn reset_log_sink(&self) {
        self.sink.reset();
    }

    pub fn emit(&self, message: &str) {
        self.sink.emit(message);
    }

    pub fn begin_frame(&self) -> Result<(), FrameError> {
        Ok(())
    }

    pub fn end_frame(&self) -> Result<Frame, FrameError> {
        Ok(Frame::default())
    }
}

pub struct MemGuardAlloc;

unsafe impl GlobalAlloc for MemGuardAlloc {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { System.alloc(layout) }
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        unsafe { System.alloc_zeroed(layout) }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}
