//! Options applied by [`MemGuard::initialize`](crate::MemGuard::initialize).

use crate::redact::PathRedactor;

/// Environment variable that turns on stack capture (`1` or `true`).
pub const STACK_TRACES_ENV: &str = "MEMGUARD_STACK_TRACES";

/// Environment variable that overrides the redacted base path. Empty disables redaction.
pub const BASE_PATH_ENV: &str = "MEMGUARD_BASE_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum BasePath {
    /// The user's home directory, looked up at initialization.
    #[default]
    Home,
    Custom(String),
    Disabled,
}

/// Configuration for [`MemGuard::initialize`](crate::MemGuard::initialize).
///
/// # Examples
///
/// ```rust
/// use memguard::{MemGuard, Options};
///
/// let guard = MemGuard::new();
/// guard.initialize(
///     Options::default()
///         .capture_stack_traces(true)
///         .base_path("/home/ci"),
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    capture_stack_traces: bool,
    base_path: BasePath,
}

impl Options {
    /// Defaults overlaid with [`STACK_TRACES_ENV`] and [`BASE_PATH_ENV`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(value) = lookup(STACK_TRACES_ENV) {
            options.capture_stack_traces = value.eq_ignore_ascii_case("true") || value == "1";
        }

        if let Some(value) = lookup(BASE_PATH_ENV) {
            options.base_path = if value.is_empty() {
                BasePath::Disabled
            } else {
                BasePath::Custom(value)
            };
        }

        options
    }

    /// Capture the call stack for every recorded allocation and invalid release.
    ///
    /// Default: `false`
    pub fn capture_stack_traces(mut self, enabled: bool) -> Self {
        self.capture_stack_traces = enabled;
        self
    }

    /// Prefix stripped from file paths and stack traces before they reach the sink.
    ///
    /// Default: the user's home directory.
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = BasePath::Custom(path.into());
        self
    }

    /// Emit file paths unmodified.
    pub fn no_base_path(mut self) -> Self {
        self.base_path = BasePath::Disabled;
        self
    }

    pub fn stack_traces_enabled(&self) -> bool {
        self.capture_stack_traces
    }

    pub fn redactor(&self) -> PathRedactor {
        match &self.base_path {
            BasePath::Home => PathRedactor::home(),
            BasePath::Custom(path) => PathRedactor::new(path.clone()),
            BasePath::Disabled => PathRedactor::disabled(),
        }
    }
}
