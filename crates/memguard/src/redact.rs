use std::borrow::Cow;

/// Strips a base path (usually the user's home directory) from diagnostic text so reports
/// shared with others don't expose the local filesystem layout.
///
/// Redaction is plain substring removal: every occurrence of the base path goes, wherever
/// it appears in the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRedactor {
    base: Option<String>,
}

impl PathRedactor {
    /// A redactor for `base`. Empty bases and the filesystem root redact nothing.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let usable = !base.is_empty() && base != "/" && base != "\\";
        Self {
            base: usable.then_some(base),
        }
    }

    pub fn disabled() -> Self {
        Self { base: None }
    }

    /// The current user's home directory (`HOME`, then `USERPROFILE`; reversed on Windows).
    pub fn home() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                const LOOKUP: [&str; 2] = ["USERPROFILE", "HOME"];
            } else {
                const LOOKUP: [&str; 2] = ["HOME", "USERPROFILE"];
            }
        }

        LOOKUP
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.base {
            Some(base) if text.contains(base.as_str()) => Cow::Owned(text.replace(base.as_str(), "")),
            _ => Cow::Borrowed(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_prefix() {
        let redactor = PathRedactor::new("/home/u");
        assert_eq!(redactor.redact("/home/u/src/a.c"), "/src/a.c");
        assert_eq!(redactor.redact("/opt/lib/b.c"), "/opt/lib/b.c");
    }

    #[test]
    fn test_redacts_every_occurrence_in_stack_text() {
        let redactor = PathRedactor::new("/home/u");
        let stack = "\t\t1| main\t\t/home/u/src/main.c, 10\n\t\t0| start\t\t/home/u/src/crt.c, 2\n";
        assert_eq!(
            redactor.redact(stack),
            "\t\t1| main\t\t/src/main.c, 10\n\t\t0| start\t\t/src/crt.c, 2\n"
        );
    }

    #[test]
    fn test_root_and_empty_base_redact_nothing() {
        for base in ["", "/"] {
            let redactor = PathRedactor::new(base);
            assert!(redactor.base().is_none());
            assert!(matches!(redactor.redact("/opt/lib/b.c"), Cow::Borrowed(_)));
        }
    }
}
