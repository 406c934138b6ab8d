#[cfg(test)]
pub mod tests {
    use std::process::{Command, Output};

    fn run_example(example: &str, features: Option<&str>) -> Output {
        let mut args = vec!["run", "-p", "test-memguard", "--example", example];
        if let Some(features) = features {
            args.extend(["--features", features]);
        }

        let output = Command::new("cargo")
            .args(&args)
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully.\n\nstderr:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    fn assert_contains_all(stdout: &str, all_expected: &[&str]) {
        for expected in all_expected {
            assert!(
                stdout.contains(expected),
                "Expected:\n{expected}\n\nGot:\n{stdout}",
            );
        }
    }

    // cargo run -p test-memguard --example basic
    #[test]
    fn test_basic_output() {
        let output = run_example("basic", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "tracked: 2",
                "[MemGuard] Memory Leak at 0x",
                "of size 40",
                "Created at file: ",
                "basic.rs at line: ",
                "after report: 0",
            ],
        );
        assert!(!stdout.contains("of size 8\n"), "Got:\n{stdout}");
        assert_eq!(stdout.matches("Memory Leak").count(), 1);
    }

    // cargo run -p test-memguard --example basic --features memguard-off
    #[test]
    fn test_basic_output_disabled() {
        let output = run_example("basic", Some("memguard-off"));
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(&stdout, &["tracked: 0", "after report: 0"]);
        assert!(!stdout.contains("[MemGuard]"), "Got:\n{stdout}");
    }

    // cargo run -p test-memguard --example invalid_release
    #[test]
    fn test_invalid_release_output() {
        let output = run_example("invalid_release", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "Invalid release: tried to free a pointer which MemGuard did not allocate (0xdead)",
                "Attempted at file: ",
                "owned: false",
            ],
        );
        // 0xDEAD plus the double release
        assert_eq!(stdout.matches("Invalid release").count(), 2);
        assert!(!stdout.contains("Memory Leak"), "Got:\n{stdout}");
    }

    // cargo run -p test-memguard --example static_time
    #[test]
    fn test_static_time_output() {
        let output = run_example("static_time", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "static phase: true",
                "static phase: false",
                "of size 24",
                "Has 2 static allocations not yet released",
                "static records: 2",
                "static records: 0",
            ],
        );
        assert_eq!(stdout.matches("Memory Leak").count(), 1);
        assert_eq!(stdout.matches("Has 2 static allocations").count(), 2);
    }

    // cargo run -p test-memguard --example multithread_alloc
    #[test]
    fn test_multithread_alloc_output() {
        let output = run_example("multithread_alloc", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(&stdout, &["records: 8000", "records after release: 0"]);
        assert!(!stdout.contains("[MemGuard]"), "Got:\n{stdout}");
    }

    // cargo run -p test-memguard --example frames
    #[test]
    fn test_frames_output() {
        let output = run_example("frames", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "outstanding: 1",
                "MemGuardFrame\nSize: 40 (0x0028)\nFile: ",
                "frames.rs\nLine: ",
                "[MemGuard] Frame misuse: end_frame called without an open frame",
            ],
        );
        assert!(!stdout.contains("Size: 8 "), "Got:\n{stdout}");
        assert!(!stdout.contains("Memory Leak"), "Got:\n{stdout}");
    }

    // cargo run -p test-memguard --example tracing_sink
    #[test]
    fn test_tracing_sink_output() {
        let output = run_example("tracing_sink", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "WARN memguard: Memory Leak at 0x",
                "of size 72",
                "memguard report",
                "[MemGuard] back on the console",
            ],
        );
    }

    // cargo run -p test-memguard --example global_alloc
    #[test]
    fn test_global_alloc_output() {
        let output = run_example("global_alloc", None);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_contains_all(
            &stdout,
            &[
                "leaked 4096 bytes, owned: true",
                "of size 4096",
                "owned after report: false",
            ],
        );
        assert!(!stdout.contains("Invalid release"), "Got:\n{stdout}");
    }
}
