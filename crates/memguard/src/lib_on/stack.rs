use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

/// Optional call-stack capture for allocation records and invalid-release diagnostics.
#[derive(Debug, Default)]
pub struct StackCapture {
    enabled: AtomicBool,
}

impl StackCapture {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The current call stack, one line per frame, or an empty string when disabled.
    ///
    /// Lines look like `\t\t<index>| <symbol>\t\t<file>, <line>`. Indices count down to 0
    /// for the outermost frame. Symbol and location are left out when they cannot be
    /// resolved. Frames inside the capture machinery itself are skipped.
    pub fn capture_formatted(&self) -> String {
        if !self.is_enabled() {
            return String::new();
        }

        let trace = backtrace::Backtrace::new();
        let frames: Vec<_> = trace
            .frames()
            .iter()
            .skip_while(|frame| {
                frame.symbols().first().and_then(|s| s.name()).is_some_and(|name| {
                    let name = name.to_string();
                    name.contains("backtrace::") || name.contains("StackCapture")
                })
            })
            .collect();

        let mut out = String::new();
        let count = frames.len();
        for (i, frame) in frames.into_iter().enumerate() {
            let _ = write!(out, "\t\t{}| ", count - 1 - i);

            if let Some(symbol) = frame.symbols().first() {
                if let Some(name) = symbol.name() {
                    let _ = write!(out, "{name}\t\t");
                }
                if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                    let _ = write!(out, "{}, {}", file.display(), line);
                }
            }

            out.push('\n');
        }
        out
    }
}
