//! Delivery of diagnostic messages.
//!
//! Every leak, invalid release and frame misuse ends up as a single message handed to the
//! active [`LogSink`]. The default [`ConsoleSink`] prints to stdout. Sinks can be swapped at
//! any time through [`SinkSlot`] without touching the ledger.

use arc_swap::ArcSwap;
use colored::*;
use crossbeam_channel::Sender;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

struct Delivering;

impl Delivering {
    /// `None` when this thread is already inside a sink.
    fn enter() -> Option<Self> {
        let nested = DELIVERING
            .try_with(|flag| flag.replace(true))
            .unwrap_or(true);
        (!nested).then_some(Delivering)
    }
}

impl Drop for Delivering {
    fn drop(&mut self) {
        let _ = DELIVERING.try_with(|flag| flag.set(false));
    }
}

/// Receives formatted diagnostic messages.
///
/// Sinks run while the ledger lock is held during [`report`](crate::MemGuard::report), so
/// slow sinks stall every thread that allocates through the same guard.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Prints `[MemGuard] <message>` to stdout. Colors are disabled when `NO_COLOR` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn log(&self, message: &str) {
        if std::env::var("NO_COLOR").is_err() {
            println!("{} {}", "[MemGuard]".blue().bold(), message);
        } else {
            println!("[MemGuard] {}", message);
        }
    }
}

/// Forwards every message into a channel, for hosts that drain diagnostics elsewhere.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl LogSink for ChannelSink {
    fn log(&self, message: &str) {
        // A dropped receiver means nobody is listening anymore
        let _ = self.tx.send(message.to_string());
    }
}

/// Emits every message as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::warn!(target: "memguard", "{}", message);
    }
}

/// Holds the active sink. Replacing or resetting it is lock-free and visible to every thread.
pub struct SinkSlot {
    current: ArcSwap<Box<dyn LogSink>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::with_sink(ConsoleSink)
    }

    pub fn with_sink(sink: impl LogSink + 'static) -> Self {
        let sink: Box<dyn LogSink> = Box::new(sink);
        Self {
            current: ArcSwap::from_pointee(sink),
        }
    }

    pub fn set(&self, sink: impl LogSink + 'static) {
        self.set_boxed(Box::new(sink));
    }

    pub fn set_boxed(&self, sink: Box<dyn LogSink>) {
        self.current.store(Arc::new(sink));
    }

    /// Restores the built-in [`ConsoleSink`].
    pub fn reset(&self) {
        self.set(ConsoleSink);
    }

    /// Delivers `message` to the active sink.
    ///
    /// Messages raised while a sink is already running on this thread (say, a sink that
    /// releases a bogus pointer) go to [`TracingSink`] instead, so a sink never re-enters itself.
    pub fn emit(&self, message: &str) {
        match Delivering::enter() {
            Some(_delivering) => self.current.load().log(message),
            None => TracingSink.log(message),
        }
    }
}

impl Default for SinkSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot").finish_non_exhaustive()
    }
}
