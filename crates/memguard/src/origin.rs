use serde::{Deserialize, Serialize};
use std::ffi::{c_char, c_int, CStr};
use std::fmt;
use std::panic::Location;

/// Source location of an allocate or release call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub file: String,
    pub line: u32,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location of the caller. Functions that forward this need `#[track_caller]` too,
    /// otherwise the location points at the forwarding function.
    #[track_caller]
    #[inline]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }

    /// Builds an origin from a C `(file, line)` pair.
    ///
    /// Returns `None` for a null `file`, which is how C callers say "no origin". Negative
    /// line numbers are clamped to 0.
    ///
    /// # Safety
    ///
    /// `file` must be null or point to a NUL-terminated string valid for the duration of
    /// the call.
    pub unsafe fn from_c(file: *const c_char, line: c_int) -> Option<Self> {
        if file.is_null() {
            return None;
        }
        let file = unsafe { CStr::from_ptr(file) }.to_string_lossy().into_owned();
        Some(Self::new(file, line.max(0) as u32))
    }
}

impl From<&Location<'_>> for Origin {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_caller_points_at_call_site() {
        let origin = Origin::caller();
        assert!(origin.file.ends_with("origin.rs"));
        assert_eq!(origin.line, line!() - 2);
    }

    #[test]
    fn test_from_c() {
        let file = CString::new("main.c").unwrap();
        let origin = unsafe { Origin::from_c(file.as_ptr(), 42) }.unwrap();
        assert_eq!(origin, Origin::new("main.c", 42));

        assert!(unsafe { Origin::from_c(std::ptr::null(), 42) }.is_none());
        let clamped = unsafe { Origin::from_c(file.as_ptr(), -3) }.unwrap();
        assert_eq!(clamped.line, 0);
    }
}
