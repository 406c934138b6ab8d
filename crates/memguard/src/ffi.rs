//! C ABI over the [`global`](crate::global) guard, exported by the `cdylib` build.
//!
//! ```c
//! #define MG_MALLOC(n) memguard_malloc_ex((n), __FILE__, __LINE__)
//! #define MG_FREE(p)   memguard_free_ex((p), __FILE__, __LINE__)
//!
//! int main(void) {
//!     memguard_init(false);
//!     char *buf = MG_MALLOC(64);
//!     MG_FREE(buf);
//!     memguard_report();
//! }
//! ```
//!
//! Every pointer handed out by `memguard_malloc`, `memguard_calloc`, `memguard_realloc` and
//! `memguard_frame_to_string` must go back through `memguard_free`. Frames returned by
//! `memguard_end_frame` are plain heap nodes owned by the caller and are released with
//! `memguard_frame_destroy` or `memguard_frame_destroy_all`.

use crate::frame::{Frame, FrameNode, TrackedText};
use crate::origin::Origin;
use crate::sink::LogSink;
use crate::{global, Options};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

/// Receives one NUL-terminated diagnostic message. The pointer is only valid during the call.
pub type MemGuardLogCallback = extern "C" fn(message: *const c_char);

struct CallbackSink(MemGuardLogCallback);

impl LogSink for CallbackSink {
    fn log(&self, message: &str) {
        let text = CString::new(message).unwrap_or_else(|e| {
            let mut bytes = e.into_vec();
            bytes.retain(|b| *b != 0);
            CString::new(bytes).unwrap_or_default()
        });
        (self.0)(text.as_ptr());
    }
}

/// One captured allocation in a frame chain.
#[repr(C)]
#[derive(Debug)]
pub struct MemGuardFrame {
    pub size: usize,
    pub next: *mut MemGuardFrame,
    /// Null when the allocation had no recorded origin.
    pub file: *const c_char,
    pub line: c_int,
}

impl MemGuardFrame {
    fn into_chain(frame: Frame) -> *mut MemGuardFrame {
        let mut head = ptr::null_mut();
        let nodes: Vec<FrameNode> = frame.into_iter().collect();
        for node in nodes.into_iter().rev() {
            let (file, line) = match node.origin {
                Some(origin) => (
                    CString::new(origin.file).map_or(ptr::null_mut(), CString::into_raw),
                    c_int::try_from(origin.line).unwrap_or(c_int::MAX),
                ),
                None => (ptr::null_mut(), 0),
            };
            head = Box::into_raw(Box::new(MemGuardFrame {
                size: node.size,
                next: head,
                file,
                line,
            }));
        }
        head
    }

    /// # Safety
    ///
    /// `node` must be null or the head of a live chain from [`memguard_end_frame`].
    unsafe fn read_chain(mut node: *const MemGuardFrame) -> Frame {
        let mut nodes = Vec::new();
        while let Some(current) = unsafe { node.as_ref() } {
            nodes.push(FrameNode {
                size: current.size,
                origin: unsafe { Origin::from_c(current.file, current.line) },
            });
            node = current.next;
        }
        Frame::from_nodes(nodes)
    }
}

fn raw<T>(allocated: Option<ptr::NonNull<u8>>) -> *mut T {
    allocated.map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

/// Ends the static-time phase. Stack capture is on when `capture_stack_traces` is true or
/// `MEMGUARD_STACK_TRACES` asks for it. Returns true for the call that ended the phase.
#[no_mangle]
pub extern "C" fn memguard_init(capture_stack_traces: bool) -> bool {
    let options = Options::from_env();
    let enabled = capture_stack_traces || options.stack_traces_enabled();
    global().initialize(options.capture_stack_traces(enabled))
}

#[no_mangle]
pub extern "C" fn memguard_malloc(size: usize) -> *mut c_void {
    raw(global().allocate_at(size, None))
}

/// # Safety
///
/// `file` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memguard_malloc_ex(
    size: usize,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    raw(global().allocate_at(size, unsafe { Origin::from_c(file, line) }))
}

#[no_mangle]
pub extern "C" fn memguard_calloc(count: usize, size: usize) -> *mut c_void {
    raw(global().allocate_zeroed_at(count, size, None))
}

/// # Safety
///
/// `file` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memguard_calloc_ex(
    count: usize,
    size: usize,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    raw(global().allocate_zeroed_at(count, size, unsafe { Origin::from_c(file, line) }))
}

/// # Safety
///
/// `ptr` must be null or a live pointer from this library.
#[no_mangle]
pub unsafe extern "C" fn memguard_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    raw(unsafe { global().reallocate_at(ptr.cast(), size, None) })
}

/// # Safety
///
/// `ptr` must be null or a live pointer from this library. `file` must be null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memguard_realloc_ex(
    ptr: *mut c_void,
    size: usize,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    let origin = unsafe { Origin::from_c(file, line) };
    raw(unsafe { global().reallocate_at(ptr.cast(), size, origin) })
}

/// Releases `ptr`. Pointers this library did not hand out are reported and left alone.
///
/// # Safety
///
/// Nothing may access the block after it is released.
#[no_mangle]
pub unsafe extern "C" fn memguard_free(ptr: *mut c_void) {
    unsafe { global().release_at(ptr.cast(), None) }
}

/// # Safety
///
/// See [`memguard_free`]. `file` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memguard_free_ex(ptr: *mut c_void, file: *const c_char, line: c_int) {
    let origin = unsafe { Origin::from_c(file, line) };
    unsafe { global().release_at(ptr.cast(), origin) }
}

#[no_mangle]
pub extern "C" fn memguard_get_size(ptr: *const c_void) -> usize {
    global().query_size(ptr.cast())
}

#[no_mangle]
pub extern "C" fn memguard_is_owned(ptr: *const c_void) -> bool {
    global().is_owned(ptr.cast())
}

#[no_mangle]
pub extern "C" fn memguard_report() {
    global().report();
}

/// Routes diagnostics to `callback`. Null restores the console sink.
#[no_mangle]
pub extern "C" fn memguard_set_log_callback(callback: Option<MemGuardLogCallback>) {
    match callback {
        Some(callback) => global().set_log_sink(CallbackSink(callback)),
        None => global().reset_log_sink(),
    }
}

#[no_mangle]
pub extern "C" fn memguard_reset_log_callback() {
    global().reset_log_sink();
}

/// Sends `message` to the active sink. Null is ignored.
///
/// # Safety
///
/// `message` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memguard_log_message(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    global().emit(&message);
}

/// Opens a frame window. Returns false, after reporting, when one is already open.
#[no_mangle]
pub extern "C" fn memguard_begin_frame() -> bool {
    global().begin_frame().is_ok()
}

/// Closes the frame window and returns its outstanding allocations, oldest first. Null when
/// nothing is outstanding or no window was open.
#[no_mangle]
pub extern "C" fn memguard_end_frame() -> *mut MemGuardFrame {
    match global().end_frame() {
        Ok(frame) => MemGuardFrame::into_chain(frame),
        Err(_) => ptr::null_mut(),
    }
}

/// Renders the chain starting at `frame` into a tracked string. Release it with
/// [`memguard_free`].
///
/// # Safety
///
/// `frame` must be null or the head of a live chain from [`memguard_end_frame`].
#[no_mangle]
pub unsafe extern "C" fn memguard_frame_to_string(frame: *const MemGuardFrame) -> *mut c_char {
    let frame = unsafe { MemGuardFrame::read_chain(frame) };
    global()
        .frame_to_text(&frame)
        .map_or(ptr::null_mut(), TrackedText::into_raw)
}

/// Releases one node and returns the next one.
///
/// # Safety
///
/// `frame` must be null or a live node from [`memguard_end_frame`]. The node must not be
/// used afterwards.
#[no_mangle]
pub unsafe extern "C" fn memguard_frame_destroy(frame: *mut MemGuardFrame) -> *mut MemGuardFrame {
    if frame.is_null() {
        return ptr::null_mut();
    }
    let node = unsafe { Box::from_raw(frame) };
    if !node.file.is_null() {
        drop(unsafe { CString::from_raw(node.file as *mut c_char) });
    }
    node.next
}

/// Releases every node of the chain starting at `frame`.
///
/// # Safety
///
/// `frame` must be null or the head of a live chain from [`memguard_end_frame`].
#[no_mangle]
pub unsafe extern "C" fn memguard_frame_destroy_all(mut frame: *mut MemGuardFrame) {
    while !frame.is_null() {
        frame = unsafe { memguard_frame_destroy(frame) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_keeps_order_and_origin() {
        let frame = Frame::from_nodes(vec![
            FrameNode {
                size: 40,
                origin: Some(Origin::new("/src/a.c", 11)),
            },
            FrameNode {
                size: 8,
                origin: None,
            },
        ]);

        let head = MemGuardFrame::into_chain(frame.clone());
        let copy = unsafe { MemGuardFrame::read_chain(head) };
        assert_eq!(copy, frame);

        unsafe {
            assert_eq!((*head).size, 40);
            assert_eq!((*head).line, 11);
            let second = (*head).next;
            assert!((*second).file.is_null());
            assert!((*second).next.is_null());
            memguard_frame_destroy_all(head);
        }
    }

    #[test]
    fn test_empty_frame_is_null() {
        assert!(MemGuardFrame::into_chain(Frame::default()).is_null());
        assert!(unsafe { MemGuardFrame::read_chain(ptr::null()) }.is_empty());
    }

    #[test]
    fn test_destroy_returns_next() {
        let frame = Frame::from_nodes(vec![
            FrameNode {
                size: 1,
                origin: None,
            },
            FrameNode {
                size: 2,
                origin: None,
            },
        ]);
        let head = MemGuardFrame::into_chain(frame);
        let next = unsafe { memguard_frame_destroy(head) };
        assert_eq!(unsafe { (*next).size }, 2);
        assert!(unsafe { memguard_frame_destroy(next) }.is_null());
        assert!(unsafe { memguard_frame_destroy(ptr::null_mut()) }.is_null());
    }
}
