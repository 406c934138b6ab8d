use super::reentrancy::Suppressed;
use crate::error::FrameError;
use crate::frame::{Frame, FrameNode};
use crate::origin::Origin;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Window {
    outstanding: HashMap<usize, (u64, FrameNode)>,
    next_sequence: u64,
}

/// Tracks the allocations made while a frame window is open.
///
/// One window per guard, shared by all threads. Allocations made before the window opened
/// never show up in it, even when they are released inside it.
#[derive(Default)]
pub struct FrameTracker {
    open: AtomicBool,
    window: Mutex<Option<Window>>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Window>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn begin(&self) -> Result<(), FrameError> {
        let _quiet = Suppressed::enter();
        let mut window = self.lock();
        if window.is_some() {
            return Err(FrameError::AlreadyOpen);
        }
        *window = Some(Window::default());
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    pub fn end(&self) -> Result<Frame, FrameError> {
        let _quiet = Suppressed::enter();
        let mut window = self.lock();
        let closed = window.take().ok_or(FrameError::NotOpen)?;
        self.open.store(false, Ordering::Release);

        let mut nodes: Vec<(u64, FrameNode)> = closed.outstanding.into_values().collect();
        nodes.sort_by_key(|(sequence, _)| *sequence);
        Ok(Frame::from_nodes(
            nodes.into_iter().map(|(_, node)| node).collect(),
        ))
    }

    pub fn observe_alloc(&self, address: usize, size: usize, origin: Option<&Origin>) {
        if !self.is_open() {
            return;
        }
        let _quiet = Suppressed::enter();
        if let Some(window) = self.lock().as_mut() {
            let sequence = window.next_sequence;
            window.next_sequence += 1;
            let node = FrameNode {
                size,
                origin: origin.cloned(),
            };
            window.outstanding.insert(address, (sequence, node));
        }
    }

    pub fn observe_release(&self, address: usize) {
        self.withdraw(address);
    }

    /// Removes `address` from the open window, returning its entry so a failed resize can put
    /// it back in its original place.
    pub(crate) fn withdraw(&self, address: usize) -> Option<(u64, FrameNode)> {
        if !self.is_open() {
            return None;
        }
        let _quiet = Suppressed::enter();
        self.lock()
            .as_mut()
            .and_then(|window| window.outstanding.remove(&address))
    }

    pub(crate) fn reinstate(&self, address: usize, entry: (u64, FrameNode)) {
        let _quiet = Suppressed::enter();
        if let Some(window) = self.lock().as_mut() {
            window.outstanding.insert(address, entry);
        }
    }
}
