//! Frames: owned snapshots of the allocations made inside a capture window.
//!
//! [`MemGuard::begin_frame`](crate::MemGuard::begin_frame) opens a window and
//! [`MemGuard::end_frame`](crate::MemGuard::end_frame) returns a [`Frame`] with one
//! [`FrameNode`] per allocation made inside the window that was still outstanding when it
//! closed. The frame is a plain owned value, independent of the ledger.

use crate::origin::Origin;
use crate::raw::RawAllocator;
use crate::MemGuard;
use serde::Serialize;
use std::ffi::c_char;
use std::fmt::{self, Write as _};
use std::ops::Deref;
use std::ptr::NonNull;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameNode {
    pub size: usize,
    pub origin: Option<Origin>,
}

impl fmt::Display for FrameNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MemGuardFrame")?;
        writeln!(f, "Size: {} (0x{:04x})", self.size, self.size)?;
        match &self.origin {
            Some(origin) => {
                writeln!(f, "File: {}", origin.file)?;
                writeln!(f, "Line: {}", origin.line)
            }
            None => {
                writeln!(f, "File: <unknown>")?;
                writeln!(f, "Line: 0")
            }
        }
    }
}

/// Allocations captured by one frame window, in allocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    nodes: Vec<FrameNode>,
}

impl Frame {
    pub(crate) fn from_nodes(nodes: Vec<FrameNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[FrameNode] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameNode> {
        self.nodes.iter()
    }

    /// Detaches one node from the frame.
    pub fn remove(&mut self, index: usize) -> Option<FrameNode> {
        (index < self.nodes.len()).then(|| self.nodes.remove(index))
    }

    /// Total bytes still outstanding across the frame.
    pub fn total_size(&self) -> usize {
        self.nodes.iter().map(|node| node.size).sum()
    }

    /// Every node rendered as a block, each block followed by a blank line.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for node in &self.nodes {
            // Writing into a String cannot fail
            let _ = writeln!(text, "{node}");
        }
        text
    }
}

impl IntoIterator for Frame {
    type Item = FrameNode;
    type IntoIter = std::vec::IntoIter<FrameNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = &'a FrameNode;
    type IntoIter = std::slice::Iter<'a, FrameNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// NUL-terminated text living in a buffer allocated through a [`MemGuard`].
///
/// The buffer is tracked like any other allocation and released through the same guard on
/// drop, or handed over to a C caller with [`TrackedText::into_raw`].
pub struct TrackedText<'g, A: RawAllocator> {
    guard: &'g MemGuard<A>,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'g, A: RawAllocator> TrackedText<'g, A> {
    /// Copies `text` into a fresh buffer from `guard`. `None` when the allocation fails.
    #[track_caller]
    pub fn new(guard: &'g MemGuard<A>, text: &str) -> Option<Self> {
        let len = text.len();
        let ptr = guard.allocate_at(len + 1, Some(Origin::caller()))?;
        unsafe {
            ptr.as_ptr().copy_from_nonoverlapping(text.as_ptr(), len);
            ptr.as_ptr().add(len).write(0);
        }
        Some(Self { guard, ptr, len })
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: the buffer holds `len` bytes copied from a `&str`
        unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(self.ptr.as_ptr(), self.len))
        }
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.ptr.as_ptr() as *const c_char
    }

    /// Gives up ownership. The caller must release the pointer through the same guard.
    pub fn into_raw(self) -> *mut c_char {
        let ptr = self.ptr.as_ptr() as *mut c_char;
        std::mem::forget(self);
        ptr
    }
}

impl<A: RawAllocator> Deref for TrackedText<'_, A> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<A: RawAllocator> fmt::Debug for TrackedText<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<A: RawAllocator> fmt::Display for TrackedText<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<A: RawAllocator> Drop for TrackedText<'_, A> {
    fn drop(&mut self) {
        // SAFETY: the buffer came from this guard and nothing borrows it past `self`
        unsafe { self.guard.release(self.ptr.as_ptr()) };
    }
}

impl<A: RawAllocator> MemGuard<A> {
    /// Renders `frame` into a tracked text buffer (see [`Frame::render`] for the layout).
    #[track_caller]
    pub fn frame_to_text(&self, frame: &Frame) -> Option<TrackedText<'_, A>> {
        TrackedText::new(self, &frame.render())
    }

    /// Releases a single node detached from a frame.
    pub fn destroy_frame(&self, node: FrameNode) {
        drop(node);
    }

    /// Releases a whole frame.
    pub fn destroy_frame_chain(&self, frame: Frame) {
        drop(frame);
    }
}
