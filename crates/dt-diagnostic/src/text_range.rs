use std::fmt::{Debug, Display};
use std::ops::Range;

/// A location in source code
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextRange {
    /// The beginning byte offset of the span (inclusive)
    pub start: usize,
    /// The ending byte offset of the span (exclusive)
    pub end: usize,
}
impl Display for TextRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl TextRange {
    /// Creates a new `TextRange`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> TextRange {
        TextRange { start, end }
    }

    /// Creates an empty `TextRange` at `offset`, used as an insertion point.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_diagnostic::text_range::TextRange;
    ///
    /// let point = TextRange::empty(5);
    /// assert!(point.is_empty());
    /// assert_eq!(point.start, 5);
    /// ```
    #[must_use]
    pub const fn empty(offset: usize) -> TextRange {
        TextRange {
            start: offset,
            end: offset,
        }
    }

    /// Returns the length of the span.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_diagnostic::text_range::TextRange;
    ///
    /// let span = TextRange { start: 4, end: 7 };
    /// assert_eq!(span.length(), 3);
    /// ```
    #[inline]
    #[must_use]
    pub const fn length(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Offsets the span by the specified amount
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: usize) -> Self {
        TextRange {
            start: self.start + offset,
            end: self.end + offset,
        }
    }

    /// Returns the text as referenced from `source`.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_diagnostic::text_range::TextRange;
    ///
    /// let source = "reg = <0x4600 0x100>;";
    ///
    /// let span = TextRange { start: 7, end: 13 };
    /// assert_eq!(span.text(source), Some("0x4600"));
    ///
    /// // Out of bounds
    /// let span = TextRange { start: 30, end: 31 };
    /// assert_eq!(span.text(source), None);
    /// ```
    #[inline]
    #[must_use]
    pub fn text<'i>(&self, source: &'i str) -> Option<&'i str> {
        source.get(self.start..self.end)
    }

    /// Returns the byte offset range in a [`Range`].
    #[inline]
    #[must_use]
    pub const fn byte_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns whether `other` lies completely within `self`.
    #[must_use]
    pub const fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns a `TextRange` that would enclose both `self` and `end`.
    ///
    /// Note that this can also be used to extend the span "backwards":
    /// `start.to(end)` and `end.to(start)` return the same `TextRange`.
    ///
    /// ```text
    ///     ____             ___
    ///     self lorem ipsum end
    ///     ^^^^^^^^^^^^^^^^^^^^
    /// ```
    #[must_use]
    pub fn to(self, end: TextRange) -> TextRange {
        TextRange::new(self.start.min(end.start), self.end.max(end.end))
    }

    /// Returns the smallest `TextRange` enclosing every range in `ranges`.
    ///
    /// Returns `None` for an empty iterator.
    ///
    /// ```
    /// use dt_diagnostic::text_range::TextRange;
    ///
    /// let ranges = [TextRange::new(8, 10), TextRange::new(2, 4), TextRange::new(5, 6)];
    /// assert_eq!(TextRange::cover(ranges), Some(TextRange::new(2, 10)));
    /// assert_eq!(TextRange::cover([]), None);
    /// ```
    pub fn cover(ranges: impl IntoIterator<Item = TextRange>) -> Option<TextRange> {
        ranges.into_iter().reduce(TextRange::to)
    }
}

impl From<Range<usize>> for TextRange {
    #[inline]
    fn from(value: Range<usize>) -> Self {
        Self {
            start: value.start,
            end: value.end,
        }
    }
}
impl From<TextRange> for Range<usize> {
    #[inline]
    fn from(value: TextRange) -> Self {
        value.start..value.end
    }
}
