//! Line lexer for resolution tracer output.
//!
//! Accepts both the port-first form emitted by `trace/1` style tracers:
//!
//! ```text
//!     call(3): lists:member(_4650,[bellini,cellini]) @ <dynamic>:0
//! ```
//!
//! and the classic debugger form:
//!
//! ```text
//!    Call: (13) dia(_5)
//! ```
//!
//! Lines that match neither form are skipped.

use regex::Regex;
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::LazyLock;

use super::types::{Port, TraceEvent};

/// Matches: `<port>[(<n>)]: [(<n>) ]<goal>[ @ <location>]`
static TRACE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?i:(call|exit|fail|redo))(?:\((\d+)\))?:\s*(?:\((\d+)\)\s+)?(.+?)(?:\s+@\s+(.*?))?\s*$",
    )
    .expect("Invalid regex")
});

/// Lex a single line. `line` is the 1-based line number recorded on the event.
pub fn lex_line(text: &str, line: usize) -> Option<TraceEvent> {
    let cap = TRACE_LINE_RE.captures(text)?;
    let port = Port::parse(cap.get(1)?.as_str())?;
    let goal = cap.get(4)?.as_str().trim();
    if goal.is_empty() {
        return None;
    }

    let mut event = TraceEvent::new(port, goal, line);
    if let Some(id) = cap
        .get(2)
        .or_else(|| cap.get(3))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        event = event.with_choice_id(id);
    }
    if let Some(location) = cap.get(5).map(|m| m.as_str().trim()) {
        if !location.is_empty() {
            event = event.with_location(location);
        }
    }
    Some(event)
}

/// Lazy event stream over trace text.
///
/// A clone continues from the same position. Call [`TraceLexer::new`] on the
/// same text to replay it from the start.
#[derive(Debug, Clone)]
pub struct TraceLexer<'a> {
    lines: Enumerate<Lines<'a>>,
}

impl<'a> TraceLexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    /// Collect every event of a trace.
    pub fn tokenize(text: &'a str) -> Vec<TraceEvent> {
        Self::new(text).collect()
    }
}

impl Iterator for TraceLexer<'_> {
    type Item = TraceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        for (idx, raw) in self.lines.by_ref() {
            if raw.trim().is_empty() {
                continue;
            }
            match lex_line(raw, idx + 1) {
                Some(event) => return Some(event),
                None => tracing::trace!(line = idx + 1, "skipping unparseable trace line"),
            }
        }
        None
    }
}
