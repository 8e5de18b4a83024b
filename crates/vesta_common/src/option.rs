//! Compilation directives passed verbatim to a backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single compilation directive, such as an optimization level, an
/// include path, or a preprocessor define.
///
/// The option renders as `prefix` immediately followed by `value`
/// (`-O` + `3` becomes `-O3`). The category is a human-readable label and
/// never reaches the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileOption {
    /// Descriptive label, e.g. `"opt lv"` or `"min range"`.
    pub category: String,
    /// Flag prefix, e.g. `"-O"` or `"-D_MIN_VALUE_RANGE="`.
    pub prefix: String,
    /// Flag value appended to the prefix.
    #[serde(default)]
    pub value: String,
}

impl CompileOption {
    /// Creates an option from its three parts.
    pub fn new(
        category: impl Into<String>,
        prefix: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            prefix: prefix.into(),
            value: value.into(),
        }
    }

    /// Position-independent code, required when the artifact is loaded
    /// by a remote peer.
    pub fn pic() -> Self {
        Self::new("pic", "-f", "PIC")
    }

    /// The argument handed to the toolchain.
    pub fn render(&self) -> String {
        format!("{}{}", self.prefix, self.value)
    }
}

impl fmt::Display for CompileOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.render(), self.category)
    }
}
