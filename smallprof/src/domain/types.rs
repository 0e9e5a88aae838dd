//! Domain types providing compile-time safety and self-documentation
//!
//! The plain-data identifiers shared with interrupt-context code live in
//! `smallprof-common` and are re-exported here. This module adds the
//! owned, heap-backed types that only exist on the sampler side.

use std::fmt;
use std::sync::Arc;

pub use smallprof_common::{CaptureOutcome, Frame, MethodId, ThreadHandle, ThreadTag};

/// Resolved method label (validated, non-empty)
///
/// Typically `class.method(signature)`. Cheap to clone: labels are shared
/// between the resolution cache, pending traces and call tree nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodLabel(Arc<str>);

impl MethodLabel {
    /// Create a new label (panics if empty)
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        let label = label.into();
        assert!(!label.is_empty(), "Method label cannot be empty");
        Self(label)
    }

    /// Create a label, returning `None` for empty input
    pub fn try_new(label: impl Into<Arc<str>>) -> Option<Self> {
        let label = label.into();
        if label.is_empty() {
            None
        } else {
            Some(Self(label))
        }
    }

    /// Get the label as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MethodLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodLabel {
    fn from(s: &str) -> Self {
        MethodLabel::new(s)
    }
}

impl From<String> for MethodLabel {
    fn from(s: String) -> Self {
        MethodLabel::new(s)
    }
}

/// Human-readable thread name as reported at thread start
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadName(String);

impl ThreadName {
    /// Name used when the host reports an empty name
    pub const UNNAMED: &'static str = "<unnamed>";

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self(Self::UNNAMED.to_string())
        } else {
            Self(name)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
