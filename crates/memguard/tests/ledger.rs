#![cfg(not(feature = "memguard-off"))]

use crossbeam_channel::{unbounded, Receiver};
use memguard::{ChannelSink, MemGuard, Options, Origin};
use std::sync::Arc;

fn guard(options: Options) -> (MemGuard, Receiver<String>) {
    let (tx, rx) = unbounded();
    let guard = MemGuard::new();
    guard.set_log_sink(ChannelSink::new(tx));
    guard.initialize(options);
    (guard, rx)
}

#[test]
fn test_leak_scenario_reports_only_unreleased_block() {
    let (guard, rx) = guard(Options::default().base_path("/home/u"));

    let a = guard.allocate_at(8, Some(Origin::new("/home/u/src/a.c", 10))).unwrap();
    let b = guard.allocate_at(40, Some(Origin::new("/home/u/src/a.c", 11))).unwrap();
    unsafe { guard.release(a.as_ptr()) };
    guard.report();

    let messages: Vec<String> = rx.try_iter().collect();
    assert_eq!(
        messages,
        vec![format!(
            "Memory Leak at {:#x} of size 40\nCreated at file: /src/a.c at line: 11",
            b.as_ptr() as usize
        )]
    );
    assert!(!guard.is_owned(b.as_ptr()));
    assert_eq!(guard.query_size(b.as_ptr()), 0);

    // the runtime partition was cleared, so a second report is silent
    guard.report();
    assert!(rx.try_recv().is_err());
    unsafe { libc::free(b.as_ptr().cast()) };
}

#[test]
fn test_dead_pointer_is_reported_once_and_never_freed() {
    let (guard, rx) = guard(Options::default().no_base_path());

    let bogus = 0xDEAD as *mut u8;
    unsafe { guard.release_at(bogus, Some(Origin::new("main.c", 9))) };
    assert!(!guard.is_owned(bogus));

    let messages: Vec<String> = rx.try_iter().collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        "Invalid release: tried to free a pointer which MemGuard did not allocate (0xdead)\n\
         Attempted at file: main.c at line: 9"
    );
}

#[test]
fn test_redaction_applies_to_invalid_release() {
    let (guard, rx) = guard(Options::default().base_path("/home/u"));
    unsafe { guard.release_at(0x10 as *mut u8, Some(Origin::new("/home/u/lib/b.c", 4))) };
    let message = rx.try_recv().unwrap();
    assert!(message.ends_with("Attempted at file: /lib/b.c at line: 4"));
}

#[test]
fn test_query_size_follows_latest_size() {
    let (guard, rx) = guard(Options::default());
    let ptr = guard.allocate(8).unwrap();
    assert_eq!(guard.query_size(ptr.as_ptr()), 8);
    let ptr = unsafe { guard.reallocate(ptr.as_ptr(), 24) }.unwrap();
    assert_eq!(guard.query_size(ptr.as_ptr()), 24);
    let ptr = unsafe { guard.reallocate(ptr.as_ptr(), 4) }.unwrap();
    assert_eq!(guard.query_size(ptr.as_ptr()), 4);
    unsafe { guard.release(ptr.as_ptr()) };
    assert_eq!(guard.query_size(ptr.as_ptr()), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_reallocate_untracked_reports_and_proceeds() {
    let (guard, rx) = guard(Options::default().no_base_path());
    let foreign = unsafe { libc::malloc(16) } as *mut u8;
    let moved = unsafe { guard.reallocate(foreign, 32) }.unwrap();

    assert!(rx.try_recv().unwrap().starts_with("Invalid release"));
    assert_eq!(guard.query_size(moved.as_ptr()), 32);
    unsafe { guard.release(moved.as_ptr()) };
    assert!(guard.ledger().is_empty());
}

#[test]
fn test_report_never_removes_static_records() {
    let (tx, rx) = unbounded();
    let guard = MemGuard::new();
    guard.set_log_sink(ChannelSink::new(tx));
    let early: Vec<_> = (0..3).map(|_| guard.allocate(4).unwrap()).collect();
    guard.initialize(Options::default());

    for _ in 0..3 {
        guard.report();
    }
    let messages: Vec<String> = rx.try_iter().collect();
    assert_eq!(messages, vec!["Has 3 static allocations not yet released"; 3]);
    assert_eq!(guard.ledger().static_len(), 3);

    for ptr in early {
        unsafe { guard.release(ptr.as_ptr()) };
    }
    guard.report();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_concurrent_allocations_are_all_recorded() {
    let (guard, rx) = guard(Options::default());
    let guard = Arc::new(guard);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let guard = Arc::clone(&guard);
            std::thread::spawn(move || {
                (0..500)
                    .map(|i| {
                        let size = t * 500 + i + 1;
                        (guard.allocate(size).unwrap().as_ptr() as usize, size)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let blocks: Vec<(usize, usize)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(guard.ledger().len(), 4000);
    for (address, size) in &blocks {
        assert_eq!(guard.query_size(*address as *const u8), *size);
    }
    assert_eq!(guard.snapshot().runtime_bytes(), (1..=4000).sum::<usize>());

    std::thread::scope(|scope| {
        for chunk in blocks.chunks(1000) {
            let guard = &guard;
            scope.spawn(move || {
                for (address, _) in chunk {
                    unsafe { guard.release(*address as *mut u8) };
                }
            });
        }
    });
    assert!(guard.ledger().is_empty());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_snapshot_json() {
    let (guard, _rx) = guard(Options::default());
    let ptr = guard.allocate_at(12, Some(Origin::new("a.c", 1))).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&guard.snapshot().to_json().unwrap()).unwrap();
    assert_eq!(json["runtime"][0]["size"], 12);
    assert_eq!(json["runtime"][0]["origin"]["line"], 1);
    assert_eq!(json["static_time"].as_array().unwrap().len(), 0);

    unsafe { guard.release(ptr.as_ptr()) };
}

#[test]
fn test_stack_traces_are_attached_when_enabled() {
    let (guard, rx) = guard(Options::default().capture_stack_traces(true).no_base_path());
    let ptr = guard.allocate(8).unwrap();
    let record = guard.ledger().record(ptr.as_ptr() as usize).unwrap();
    assert!(record.stack_trace.is_some());

    guard.report();
    let message = rx.try_recv().unwrap();
    assert!(message.contains("\n\tStack Trace:\n\t\t"));
    unsafe { libc::free(ptr.as_ptr().cast()) };
}

#[test]
fn test_frames_track_outstanding_allocations() {
    let (guard, _rx) = guard(Options::default());

    guard.begin_frame().unwrap();
    let first = guard.allocate(40).unwrap();
    let second = guard.allocate(8).unwrap();
    let third = guard.allocate(2).unwrap();
    unsafe { guard.release(second.as_ptr()) };
    let frame = guard.end_frame().unwrap();

    let sizes: Vec<usize> = frame.iter().map(|node| node.size).collect();
    assert_eq!(sizes, vec![40, 2]);
    assert!(frame.nodes()[0]
        .origin
        .as_ref()
        .is_some_and(|o| o.file.ends_with("ledger.rs")));

    unsafe {
        guard.release(first.as_ptr());
        guard.release(third.as_ptr());
    }
    // the frame is an owned copy
    assert_eq!(frame.len(), 2);
}
