//! Cleanup of the final report before it is rendered.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Lines opening with `::` or `:::` are directive syntax that breaks rendering.
static DIRECTIVE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*:{2,}.*$").unwrap());

/// A sanitized report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sanitized {
    pub text: String,
    /// True if any line was blanked
    pub changed: bool,
}

/// Blank out directive lines.
///
/// `^\s*` can also consume blank lines directly above a directive, so those
/// collapse into the removed line.
pub fn sanitize_report(raw: &str) -> Sanitized {
    let text = DIRECTIVE_LINE.replace_all(raw, "").into_owned();
    let changed = text != raw;
    if changed {
        tracing::warn!("Applied sanitization to agent output to prevent rendering errors");
    }
    Sanitized { text, changed }
}
