#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Stateful physical-line classifier.
//!
//! Every line is exactly one of [`LineKind`]. Triple-quoted literals are
//! tracked across lines: the line that opens one, every line inside it, and
//! the line that closes it are all [`LineKind::DocumentationLiteral`]. Any
//! triple-quoted literal counts, including ones used as ordinary string
//! values, so multi-line string constants are excluded from code counts too.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::config::AnalyzerSettings;

/// Classification of a single physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// Empty or whitespace-only.
    Blank,
    /// First non-whitespace token is the comment marker.
    Comment,
    /// Part of a triple-quoted literal.
    DocumentationLiteral,
    /// Everything else.
    Code,
}

impl Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineKind::Blank => write!(f, "blank"),
            LineKind::Comment => write!(f, "comment"),
            LineKind::DocumentationLiteral => write!(f, "documentation-literal"),
            LineKind::Code => write!(f, "code"),
        }
    }
}

/// Triple-quote delimiter styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    /// `"""`
    Double,
    /// `'''`
    Single,
}

impl Delimiter {
    /// The literal text of the delimiter.
    fn text(self) -> &'static str {
        match self {
            Delimiter::Double => "\"\"\"",
            Delimiter::Single => "'''",
        }
    }
}

/// Returns true if the byte at `idx` is preceded by an odd number of
/// backslashes.
fn is_escaped(bytes: &[u8], idx: usize) -> bool {
    bytes[..idx]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count()
        % 2
        == 1
}

/// Finds the next unescaped occurrence of `delim` at or after `from`.
fn find_unescaped(line: &str, delim: Delimiter, from: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut start = from;
    while let Some(rel) = line.get(start..)?.find(delim.text()) {
        let idx = start + rel;
        if !is_escaped(bytes, idx) {
            return Some(idx);
        }
        start = idx + 1;
    }
    None
}

/// Line classifier carrying the open-literal state between lines.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    /// Line-level comment marker, e.g. `#`.
    comment_marker: String,
    /// Whether triple-quoted literals are tracked at all.
    track_literals: bool,
    /// Delimiter of the currently open literal.
    open:           Option<Delimiter>,
}

impl LineClassifier {
    /// A classifier that tracks triple-quoted literals.
    pub fn new(comment_marker: impl Into<String>) -> Self {
        Self {
            comment_marker: comment_marker.into(),
            track_literals: true,
            open:           None,
        }
    }

    /// A classifier that never enters literal state; triple-quoted lines are
    /// then classified as code.
    pub fn without_literals(comment_marker: impl Into<String>) -> Self {
        Self {
            track_literals: false,
            ..Self::new(comment_marker)
        }
    }

    /// Whether a triple-quoted literal is open after the last line fed.
    pub fn in_literal(&self) -> bool {
        self.open.is_some()
    }

    /// Walks the delimiters on `line`, updating the open-literal state.
    /// Returns true if at least one delimiter was seen.
    fn scan_delimiters(&mut self, line: &str) -> bool {
        let mut seen = false;
        let mut pos = 0;
        loop {
            match self.open {
                Some(delim) => match find_unescaped(line, delim, pos) {
                    Some(idx) => {
                        seen = true;
                        self.open = None;
                        pos = idx + 3;
                    }
                    None => break,
                },
                None => {
                    let double = find_unescaped(line, Delimiter::Double, pos);
                    let single = find_unescaped(line, Delimiter::Single, pos);
                    let next = match (double, single) {
                        (Some(d), Some(s)) if s < d => Some((Delimiter::Single, s)),
                        (Some(d), _) => Some((Delimiter::Double, d)),
                        (None, Some(s)) => Some((Delimiter::Single, s)),
                        (None, None) => None,
                    };
                    match next {
                        Some((delim, idx)) => {
                            seen = true;
                            self.open = Some(delim);
                            pos = idx + 3;
                        }
                        None => break,
                    }
                }
            }
        }
        seen
    }

    /// Classifies the next physical line.
    pub fn classify(&mut self, line: &str) -> LineKind {
        let trimmed = line.trim();

        if self.track_literals && self.open.is_some() {
            self.scan_delimiters(trimmed);
            return LineKind::DocumentationLiteral;
        }

        if trimmed.is_empty() {
            return LineKind::Blank;
        }

        if trimmed.starts_with(self.comment_marker.as_str()) {
            return LineKind::Comment;
        }

        if self.track_literals && self.scan_delimiters(trimmed) {
            return LineKind::DocumentationLiteral;
        }

        LineKind::Code
    }
}

/// Classifies every line of `source`. Lines are split on `\n`; a trailing
/// `\r` is treated as whitespace.
pub fn classify_lines(source: &str, settings: &AnalyzerSettings) -> Vec<LineKind> {
    let mut classifier = if settings.exclude_documentation {
        LineClassifier::new(settings.comment_marker.as_str())
    } else {
        LineClassifier::without_literals(settings.comment_marker.as_str())
    };
    source
        .split('\n')
        .map(|line| classifier.classify(line))
        .collect()
}

/// Number of lines that count as code under `settings`.
pub fn count_code_lines(source: &str, settings: &AnalyzerSettings) -> usize {
    classify_lines(source, settings)
        .into_iter()
        .filter(|kind| match kind {
            LineKind::Code => true,
            LineKind::Blank => !settings.exclude_blank_lines,
            LineKind::Comment => !settings.exclude_comments,
            LineKind::DocumentationLiteral => !settings.exclude_documentation,
        })
        .count()
}
