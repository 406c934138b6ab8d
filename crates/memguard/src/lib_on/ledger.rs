//! The allocation ledger: every live allocation, keyed by address.
//!
//! Records live in one of two partitions. Allocations made before
//! [`MemGuard::initialize`](crate::MemGuard::initialize) go to the static-time partition and
//! are only counted by reports, never itemized or cleared. Everything else is runtime.
//!
//! All operations take one exclusive lock for their whole duration. Apart from report delivery
//! they also run inside [`Suppressed`], and nothing that may have been allocated outside memguard is dropped while
//! the lock is held, so a global allocator that feeds this ledger can free such memory
//! without re-entering the lock.
//!
//! [`Ledger::report`] keeps the lock while the sink runs. A sink that calls back into the same
//! ledger from that thread gets neutral answers (`0`, `false`, `None`, empty) instead of a
//! deadlock; [`MemGuard`](crate::MemGuard) defers its own allocate and release calls made
//! there until the report is over.

use super::reentrancy::{thread_token, Suppressed};
use super::stack::StackCapture;
use crate::origin::Origin;
use crate::redact::PathRedactor;
use crate::sink::SinkSlot;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Metadata kept for one live allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: usize,
    pub origin: Option<Origin>,
    pub stack_trace: Option<String>,
    pub is_static_time: bool,
    pub(crate) sequence: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Partitions {
    pub(crate) runtime: HashMap<usize, AllocationRecord>,
    pub(crate) static_time: HashMap<usize, AllocationRecord>,
    next_sequence: u64,
}

impl Partitions {
    fn get(&self, address: usize) -> Option<&AllocationRecord> {
        self.runtime
            .get(&address)
            .or_else(|| self.static_time.get(&address))
    }

    fn take(&mut self, address: usize) -> Option<AllocationRecord> {
        self.runtime
            .remove(&address)
            .or_else(|| self.static_time.remove(&address))
    }
}

/// One entry of a [`LedgerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub address: usize,
    pub size: usize,
    pub origin: Option<Origin>,
    pub stack_trace: Option<String>,
    pub is_static_time: bool,
}

/// Point-in-time copy of every live record, in allocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub runtime: Vec<LedgerEntry>,
    pub static_time: Vec<LedgerEntry>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.runtime.len() + self.static_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn runtime_bytes(&self) -> usize {
        self.runtime.iter().map(|e| e.size).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub struct Ledger {
    partitions: Mutex<Partitions>,
    stacks: StackCapture,
    redactor: ArcSwap<PathRedactor>,
    sink: Arc<SinkSlot>,
    reporter: AtomicUsize,
}

impl Ledger {
    pub fn new(sink: Arc<SinkSlot>) -> Self {
        Self {
            partitions: Mutex::new(Partitions::default()),
            stacks: StackCapture::new(false),
            redactor: ArcSwap::from_pointee(PathRedactor::home()),
            sink,
            reporter: AtomicUsize::new(0),
        }
    }

    /// `None` when this thread is the one delivering a report, which already holds the lock.
    // A sink that panicked mid-report must not take the whole ledger down with it
    pub(crate) fn lock(&self) -> Option<MutexGuard<'_, Partitions>> {
        if self.is_reporting_here() {
            return None;
        }
        Some(
            self.partitions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// True while the current thread is inside [`Ledger::report`] on this ledger.
    pub(crate) fn is_reporting_here(&self) -> bool {
        self.reporter.load(Ordering::Acquire) == thread_token()
    }

    pub(crate) fn mark_reporting(&self) -> ReportingMark<'_> {
        self.reporter.store(thread_token(), Ordering::Release);
        ReportingMark(&self.reporter)
    }

    pub(crate) fn sink(&self) -> &SinkSlot {
        &self.sink
    }

    pub fn enable_stack_capture(&self, enabled: bool) {
        self.stacks.set_enabled(enabled);
    }

    pub fn stack_capture_enabled(&self) -> bool {
        self.stacks.is_enabled()
    }

    pub fn set_redactor(&self, redactor: PathRedactor) {
        self.redactor.store(Arc::new(redactor));
    }

    pub fn redactor(&self) -> Arc<PathRedactor> {
        self.redactor.load_full()
    }

    /// Records `address` in the partition picked by `is_static_time`, replacing any record
    /// the address already had. Returns `false` without recording anything for a null
    /// address or when called from a sink during [`Ledger::report`].
    pub fn add(
        &self,
        address: usize,
        origin: Option<Origin>,
        size: usize,
        is_static_time: bool,
    ) -> bool {
        if address == 0 || self.is_reporting_here() {
            return false;
        }

        let stack_trace = {
            let _quiet = Suppressed::enter();
            let trace = self.stacks.capture_formatted();
            (!trace.is_empty()).then_some(trace)
        };

        let displaced = {
            let _quiet = Suppressed::enter();
            let Some(mut partitions) = self.lock() else {
                return false;
            };
            let sequence = partitions.next_sequence;
            partitions.next_sequence += 1;

            let record = AllocationRecord {
                size,
                origin,
                stack_trace,
                is_static_time,
                sequence,
            };

            let p = &mut *partitions;
            let (target, other) = if is_static_time {
                (&mut p.static_time, &mut p.runtime)
            } else {
                (&mut p.runtime, &mut p.static_time)
            };
            (other.remove(&address), target.insert(address, record))
        };
        drop(displaced);

        true
    }

    /// Puts back a record taken by a reallocate that failed, keeping its stack trace and its
    /// place in allocation order.
    pub(crate) fn restore(&self, address: usize, record: AllocationRecord) {
        if self.is_reporting_here() {
            return;
        }
        let displaced = {
            let _quiet = Suppressed::enter();
            let Some(mut partitions) = self.lock() else {
                return;
            };
            let target = if record.is_static_time {
                &mut partitions.static_time
            } else {
                &mut partitions.runtime
            };
            target.insert(address, record)
        };
        drop(displaced);
    }

    /// Removes the record for `address`. See [`Ledger::take`].
    pub fn remove(&self, address: usize, origin: Option<&Origin>) -> bool {
        self.take(address, origin).is_some()
    }

    /// Removes and returns the record for `address`, looking in the runtime partition first.
    ///
    /// When neither partition knows the address an invalid-release diagnostic goes to the
    /// sink and `None` comes back. Callers must not hand the pointer to the real allocator
    /// in that case. A double release looks exactly like a bogus pointer here.
    pub fn take(&self, address: usize, origin: Option<&Origin>) -> Option<AllocationRecord> {
        if self.is_reporting_here() {
            return None;
        }

        let taken = {
            let _quiet = Suppressed::enter();
            self.lock().and_then(|mut partitions| partitions.take(address))
        };

        if taken.is_none() {
            let message = {
                let _quiet = Suppressed::enter();
                self.invalid_release_message(address, origin)
            };
            self.sink.emit(&message);
        }

        taken
    }

    /// Removes the record for `address` without reporting a miss.
    pub fn forget(&self, address: usize) -> Option<AllocationRecord> {
        let _quiet = Suppressed::enter();
        self.lock().and_then(|mut partitions| partitions.take(address))
    }

    /// Size of the tracked allocation, `0` when untracked.
    pub fn size(&self, address: usize) -> usize {
        let _quiet = Suppressed::enter();
        self.lock()
            .and_then(|partitions| partitions.get(address).map(|record| record.size))
            .unwrap_or(0)
    }

    pub fn is_owned(&self, address: usize) -> bool {
        let _quiet = Suppressed::enter();
        self.lock()
            .is_some_and(|partitions| partitions.get(address).is_some())
    }

    pub fn record(&self, address: usize) -> Option<AllocationRecord> {
        let _quiet = Suppressed::enter();
        self.lock()
            .and_then(|partitions| partitions.get(address).cloned())
    }

    /// Drops every runtime record. Static-time records stay.
    pub fn reset(&self) {
        let cleared = {
            let _quiet = Suppressed::enter();
            self.lock()
                .map(|mut partitions| std::mem::take(&mut partitions.runtime))
        };
        drop(cleared);
    }

    pub fn len(&self) -> usize {
        let _quiet = Suppressed::enter();
        self.lock().map_or(0, |partitions| {
            partitions.runtime.len() + partitions.static_time.len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn runtime_len(&self) -> usize {
        let _quiet = Suppressed::enter();
        self.lock().map_or(0, |partitions| partitions.runtime.len())
    }

    pub fn static_len(&self) -> usize {
        let _quiet = Suppressed::enter();
        self.lock()
            .map_or(0, |partitions| partitions.static_time.len())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let _quiet = Suppressed::enter();
        self.lock()
            .map(|partitions| LedgerSnapshot {
                runtime: entries(&partitions.runtime),
                static_time: entries(&partitions.static_time),
            })
            .unwrap_or_default()
    }

    fn invalid_release_message(&self, address: usize, origin: Option<&Origin>) -> String {
        let redactor = self.redactor.load();
        let mut message = format!(
            "Invalid release: tried to free a pointer which MemGuard did not allocate ({:#x})",
            address
        );

        if let Some(origin) = origin {
            let _ = write!(
                message,
                "\nAttempted at file: {} at line: {}",
                redactor.redact(&origin.file),
                origin.line
            );
        }

        let stack = self.stacks.capture_formatted();
        if !stack.is_empty() {
            let _ = write!(message, "\n\tStack Trace:\n{}\n", redactor.redact(&stack));
        }

        message
    }
}

/// Clears the reporting marker when a report ends, including by a panicking sink.
pub(crate) struct ReportingMark<'a>(&'a AtomicUsize);

impl Drop for ReportingMark<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Records sorted by insertion order.
pub(crate) fn ordered(map: &HashMap<usize, AllocationRecord>) -> Vec<(usize, &AllocationRecord)> {
    let mut records: Vec<_> = map.iter().map(|(addr, record)| (*addr, record)).collect();
    records.sort_by_key(|(_, record)| record.sequence);
    records
}

fn entries(map: &HashMap<usize, AllocationRecord>) -> Vec<LedgerEntry> {
    ordered(map)
        .into_iter()
        .map(|(address, record)| LedgerEntry {
            address,
            size: record.size,
            origin: record.origin.clone(),
            stack_trace: record.stack_trace.clone(),
            is_static_time: record.is_static_time,
        })
        .collect()
}
