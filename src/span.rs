//! Source spans. Every parse-tree node carries one (§6 input contract); diagnostics carry
//! a primary span plus zero-or-more secondary spans (§6 diagnostic format).

use std::fmt;
use std::rc::Rc;

/// A source file identity, shared (via `Rc`) across every span into that file so spans stay
/// cheap to copy.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileId(pub Rc<str>);

impl fmt::Debug for FileId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A byte-offset range within a single file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Span {
  pub start: u32,
  pub end: u32,
}

impl Span {
  #[must_use] pub fn new(start: u32, end: u32) -> Self { Self { start, end } }

  /// The smallest span containing both `self` and `other`.
  #[must_use] pub fn merge(self, other: Span) -> Span {
    Span { start: self.start.min(other.start), end: self.end.max(other.end) }
  }
}

/// A span tagged with the file it came from, matching the teacher's `FileSpan`
/// (`(file, start_offset, end_offset)` per §6).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FileSpan {
  pub file: FileId,
  pub span: Span,
}

impl FileSpan {
  #[must_use] pub fn new(file: FileId, start: u32, end: u32) -> Self {
    Self { file, span: Span::new(start, end) }
  }
}

/// A secondary span carrying an explanatory label, used by multi-span diagnostics.
#[derive(Clone, Debug)]
pub struct LabeledSpan {
  pub span: FileSpan,
  pub label: String,
}

/// Wraps a value together with the span it was parsed or derived from. Mirrors the teacher's
/// `Spanned<T>` used throughout `types/entity.rs`.
#[derive(Clone, Debug)]
pub struct Spanned<T> {
  pub span: FileSpan,
  pub k: T,
}

impl<T> Spanned<T> {
  #[must_use] pub fn new(span: FileSpan, k: T) -> Self { Self { span, k } }
}
