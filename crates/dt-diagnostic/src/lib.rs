//! # dt-tools diagnostics
//!
//! Positioned diagnostics shared by the dt-tools crates. A [`Diagnostic`] has one or more primary
//! ranges, optional linked ranges ("defined here"), an optional [`Suggestion`] made of text edits
//! and, for validation results, the [`StandardTypeIssue`] it reports.

use std::{borrow::Cow, cell::RefCell};

pub use issue::StandardTypeIssue;
use text_range::TextRange;

mod issue;
pub mod text_range;

// TODO: https://doc.rust-lang.org/nightly/nightly-rustc/rustc_error_messages/enum.DiagMessage.html
pub type DiagnosticMessage = Cow<'static, str>;

/// Just like the [MultiSpan from rustc & clippy][1]
///
/// [1]: https://doc.rust-lang.org/nightly/nightly-rustc/rustc_error_messages/struct.MultiSpan.html
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MultiSpan {
    pub primary_spans: Vec<TextRange>,
    pub span_labels: Vec<SpanLabel>,
}

impl From<TextRange> for MultiSpan {
    fn from(value: TextRange) -> Self {
        Self {
            primary_spans: vec![value],
            span_labels: Vec::new(),
        }
    }
}

impl From<Vec<TextRange>> for MultiSpan {
    fn from(primary_spans: Vec<TextRange>) -> Self {
        Self {
            primary_spans,
            span_labels: Vec::new(),
        }
    }
}

impl MultiSpan {
    /// Returns the first primary span.
    #[must_use]
    pub fn primary(&self) -> Option<TextRange> {
        self.primary_spans.first().copied()
    }
}

/// A linked location, e.g. a previous definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpanLabel {
    pub span: TextRange,
    pub msg: DiagnosticMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Severity {
    Hint,
    Info,
    Warn,
    Error,
}

/// Extra rendering hints for editors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiagnosticTag {
    /// Faded out, e.g. a disabled node or an ignored property
    Unnecessary,
    /// Struck through
    Deprecated,
}

/// A single replacement in the source text.
///
/// An empty [`range`](Self::range) inserts, an empty [`new_text`](Self::new_text) deletes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextEdit {
    pub range: TextRange,
    pub new_text: String,
}

impl TextEdit {
    #[must_use]
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            range: TextRange::empty(offset),
            new_text: text.into(),
        }
    }

    #[must_use]
    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: text.into(),
        }
    }

    #[must_use]
    pub fn delete(range: TextRange) -> Self {
        Self {
            range,
            new_text: String::new(),
        }
    }

    /// Applies non-overlapping `edits` to `src`.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_diagnostic::{TextEdit, text_range::TextRange};
    ///
    /// let src = "serial { reg = <0x4600 0x100>; };";
    /// let edits = [TextEdit::insert(6, "@4600")];
    /// assert_eq!(TextEdit::apply(src, &edits), "serial@4600 { reg = <0x4600 0x100>; };");
    /// ```
    #[must_use]
    pub fn apply(src: &str, edits: &[TextEdit]) -> String {
        let mut edits: Vec<&TextEdit> = edits.iter().collect();
        edits.sort_by_key(|edit| std::cmp::Reverse(edit.range));
        let mut out = src.to_owned();
        for edit in edits {
            out.replace_range(edit.range.byte_range(), &edit.new_text);
        }
        out
    }
}

/// A mechanical fix for a diagnostic. All edits are applied together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Suggestion {
    pub msg: DiagnosticMessage,
    pub edits: Vec<TextEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    pub span: MultiSpan,
    pub msg: DiagnosticMessage,
    pub severity: Severity,
    /// The validation issue kind, `None` for diagnostics outside the type checker
    pub issue: Option<StandardTypeIssue>,
    /// Parameters substituted into the issue's message template
    pub params: Vec<String>,
    pub tags: Vec<DiagnosticTag>,
    pub suggestion: Option<Suggestion>,
}
impl Diagnostic {
    pub fn new(primary_span: TextRange, msg: DiagnosticMessage, severity: Severity) -> Self {
        Self {
            span: MultiSpan::from(primary_span),
            msg,
            severity,
            issue: None,
            params: Vec::new(),
            tags: Vec::new(),
            suggestion: None,
        }
    }

    /// Creates a diagnostic for a [`StandardTypeIssue`] with the issue's default severity and a
    /// message rendered from `params`.
    pub fn issue(
        issue: StandardTypeIssue,
        span: impl Into<MultiSpan>,
        params: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        let tags = match issue {
            StandardTypeIssue::Deprecated => vec![DiagnosticTag::Deprecated],
            StandardTypeIssue::NodeDisabled | StandardTypeIssue::IgnoredProperty => {
                vec![DiagnosticTag::Unnecessary]
            }
            _ => Vec::new(),
        };
        Self {
            span: span.into(),
            msg: Cow::Owned(issue.render(&params)),
            severity: issue.default_severity(),
            issue: Some(issue),
            params,
            tags,
            suggestion: None,
        }
    }

    /// Adds a linked location.
    #[must_use]
    pub fn with_label(mut self, span: TextRange, msg: impl Into<DiagnosticMessage>) -> Self {
        self.span.span_labels.push(SpanLabel {
            span,
            msg: msg.into(),
        });
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_suggestion(
        mut self,
        msg: impl Into<DiagnosticMessage>,
        edits: Vec<TextEdit>,
    ) -> Self {
        self.suggestion = Some(Suggestion {
            msg: msg.into(),
            edits,
        });
        self
    }

    /// Returns the linked locations.
    pub fn linked(&self) -> impl Iterator<Item = TextRange> + '_ {
        self.span.span_labels.iter().map(|label| label.span)
    }
}

pub trait DiagnosticCollector {
    fn emit(&self, diag: Diagnostic);
}

impl DiagnosticCollector for RefCell<Vec<Diagnostic>> {
    fn emit(&self, diag: Diagnostic) {
        self.borrow_mut().push(diag);
    }
}
impl DiagnosticCollector for std::sync::Mutex<&mut Vec<Diagnostic>> {
    fn emit(&self, diag: Diagnostic) {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(diag);
    }
}
impl DiagnosticCollector for std::sync::Mutex<Vec<Diagnostic>> {
    fn emit(&self, diag: Diagnostic) {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(diag);
    }
}

#[cfg(feature = "parking_lot")]
impl DiagnosticCollector for parking_lot::Mutex<&mut Vec<Diagnostic>> {
    fn emit(&self, diag: Diagnostic) {
        self.lock().push(diag);
    }
}
#[cfg(feature = "parking_lot")]
impl DiagnosticCollector for parking_lot::Mutex<Vec<Diagnostic>> {
    fn emit(&self, diag: Diagnostic) {
        self.lock().push(diag);
    }
}
