use super::ledger::{ordered, AllocationRecord, Ledger};
use super::reentrancy::Suppressed;
use crate::redact::PathRedactor;
use std::fmt::Write as _;

impl Ledger {
    /// Emits one message per runtime record, then a count of the static-time records, then
    /// clears the runtime partition.
    ///
    /// The lock is held while messages are delivered, so every other thread touching this
    /// ledger waits for the sink. Calls the sink makes back into this ledger see it as empty
    /// and a nested report returns at once.
    pub fn report(&self) {
        let redactor = self.redactor();
        let Some(mut partitions) = self.lock() else {
            return;
        };
        let _reporting = self.mark_reporting();

        let leaks = ordered(&partitions.runtime);
        let leaked_bytes: usize = leaks.iter().map(|(_, record)| record.size).sum();
        let leak_count = leaks.len();
        for (address, record) in leaks {
            self.sink().emit(&format_leak(address, record, &redactor));
        }

        let statics = partitions.static_time.len();
        if statics > 0 {
            self.sink().emit(&format_static_summary(statics));
        }

        let cleared = {
            let _quiet = Suppressed::enter();
            std::mem::take(&mut partitions.runtime)
        };
        drop(_reporting);
        drop(partitions);
        drop(cleared);

        tracing::debug!(
            leaks = leak_count,
            leaked_bytes,
            static_allocations = statics,
            "memguard report"
        );
    }
}

pub(crate) fn format_leak(address: usize, record: &AllocationRecord, redactor: &PathRedactor) -> String {
    let mut message = format!("Memory Leak at {:#x} of size {}", address, record.size);

    if let Some(origin) = &record.origin {
        let _ = write!(
            message,
            "\nCreated at file: {} at line: {}",
            redactor.redact(&origin.file),
            origin.line
        );
    }

    if let Some(stack) = record.stack_trace.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(message, "\n\tStack Trace:\n{}\n", redactor.redact(stack));
    }

    message
}

pub(crate) fn format_static_summary(count: usize) -> String {
    format!(
        "Has {} static allocation{} not yet released",
        count,
        if count != 1 { "s" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;
    use crate::sink::{ChannelSink, SinkSlot};
    use crossbeam_channel::unbounded;
    use std::sync::Arc;

    fn record(size: usize, origin: Option<Origin>, stack: Option<&str>) -> AllocationRecord {
        AllocationRecord {
            size,
            origin,
            stack_trace: stack.map(str::to_string),
            is_static_time: false,
            sequence: 0,
        }
    }

    #[test]
    fn test_format_leak_redacts_origin_and_stack() {
        let redactor = PathRedactor::new("/home/u");
        let message = format_leak(
            0xbeef,
            &record(
                40,
                Some(Origin::new("/home/u/src/a.c", 11)),
                Some("\t\t0| main\t\t/home/u/src/a.c, 11\n"),
            ),
            &redactor,
        );
        assert_eq!(
            message,
            "Memory Leak at 0xbeef of size 40\n\
             Created at file: /src/a.c at line: 11\n\
             \tStack Trace:\n\t\t0| main\t\t/src/a.c, 11\n\n"
        );
    }

    #[test]
    fn test_format_leak_without_origin() {
        let message = format_leak(0x10, &record(8, None, None), &PathRedactor::disabled());
        assert_eq!(message, "Memory Leak at 0x10 of size 8");
    }

    #[test]
    fn test_static_summary_plural() {
        assert_eq!(format_static_summary(1), "Has 1 static allocation not yet released");
        assert_eq!(format_static_summary(3), "Has 3 static allocations not yet released");
    }

    #[test]
    fn test_report_itemizes_runtime_and_counts_static() {
        let (tx, rx) = unbounded();
        let ledger = Ledger::new(Arc::new(SinkSlot::with_sink(ChannelSink::new(tx))));
        ledger.set_redactor(PathRedactor::disabled());
        ledger.add(0x100, Some(Origin::new("f", 10)), 8, false);
        ledger.add(0x200, Some(Origin::new("f", 11)), 40, false);
        ledger.add(0x300, None, 16, true);
        ledger.add(0x400, None, 16, true);

        ledger.report();
        let messages: Vec<String> = rx.try_iter().collect();
        assert_eq!(
            messages,
            vec![
                "Memory Leak at 0x100 of size 8\nCreated at file: f at line: 10",
                "Memory Leak at 0x200 of size 40\nCreated at file: f at line: 11",
                "Has 2 static allocations not yet released",
            ]
        );
        assert_eq!(ledger.runtime_len(), 0);
        assert_eq!(ledger.static_len(), 2);
    }

    #[test]
    fn test_sink_sees_ledger_as_empty_during_report() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let slot = Arc::new(SinkSlot::new());
        let ledger = Arc::new(Ledger::new(Arc::clone(&slot)));
        ledger.set_redactor(PathRedactor::disabled());
        ledger.add(0x100, None, 8, false);

        let inner = Arc::downgrade(&ledger);
        let log = Arc::clone(&seen);
        slot.set(move |message: &str| {
            if let Some(ledger) = inner.upgrade() {
                ledger.report();
                let answers = (
                    ledger.size(0x100),
                    ledger.is_owned(0x100),
                    ledger.add(0x200, None, 4, false),
                    ledger.take(0x100, None).is_some(),
                    ledger.len(),
                );
                log.lock().unwrap().push((message.to_string(), answers));
            }
        });

        ledger.report();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Memory Leak at 0x100 of size 8");
        assert_eq!(seen[0].1, (0, false, false, false, 0));
        assert!(ledger.is_empty());
        assert!(!ledger.is_reporting_here());
        slot.reset();
    }

    #[test]
    fn test_empty_report_is_silent() {
        let (tx, rx) = unbounded();
        let ledger = Ledger::new(Arc::new(SinkSlot::with_sink(ChannelSink::new(tx))));
        ledger.report();
        assert!(rx.try_recv().is_err());
    }
}
