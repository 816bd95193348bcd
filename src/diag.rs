//! Diagnostics: stable codes, severities, and the accumulating bag every pass reports into.
//!
//! Per §6/§7 of the spec this document implements: diagnostics are plain data, never
//! exceptions. Each pass is handed a `&mut DiagnosticBag` and a `&Config` explicitly (Design
//! Notes: "pass an explicit diagnostic sink and configuration record; never rely on
//! process-global singletons").

use std::fmt;
use crate::span::{FileSpan, LabeledSpan};

/// Severity of a diagnostic. Maps directly to driver exit codes per §7:
/// `0` = clean, `1` = warnings only, `2` = error present.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
  Warning,
  Error,
}

macro_rules! make_codes {
  {$($(#[$attr:meta])* $variant:ident = $code:literal,)*} => {
    /// A stable diagnostic code. Codes are never renumbered; removing one is a breaking
    /// change (§6).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    #[allow(clippy::upper_case_acronyms)]
    pub enum Code { $($(#[$attr])* $variant),* }

    impl Code {
      /// The stable `CEXXXX`/`CWXXXX` string, e.g. `"CE1002"`.
      #[must_use] pub fn as_str(self) -> &'static str {
        match self { $(Code::$variant => $code),* }
      }

      #[must_use] pub fn severity(self) -> Severity {
        if self.as_str().starts_with("CW") { Severity::Warning } else { Severity::Error }
      }
    }

    impl fmt::Display for Code {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
    }
  }
}

make_codes! {
  // CE0xxx: internal (constant evaluation, declaration collection) — C1.
  /// Two top-level declarations share a qualified name without disambiguating by arity.
  DuplicateSymbol = "CE0001",
  /// A constant's defining expression refers to itself, directly or transitively.
  CircularConstant = "CE0002",
  /// An expression used in constant position falls outside the fixed constant grammar of §4.1.
  NonConstExpression = "CE0003",
  /// A struct/enum is recursive without an intervening `Own<T>` indirection.
  InfiniteSizeType = "CE0004",

  // CE1xxx: scope and move — C2.
  /// A variable is used before its `let`.
  UndefinedVariable = "CE1001",
  /// A variable is used after it was moved.
  UseAfterMove = "CE1002",
  /// `:=` was used on a name that was never `let`-declared.
  RebindWithoutDeclare = "CE1003",
  /// A variable is used after `destroy()`.
  UseAfterDestroy = "CE1004",

  // CE2xxx: type, array bounds, struct/enum, Result handling — C7 (and C3's inference limit).
  /// Two types required to unify do not.
  TypeMismatch = "CE2001",
  /// A `match` does not cover every variant and has no wildcard arm.
  NonExhaustiveMatch = "CE2002",
  /// A fixed-array literal/type has a length mismatch against its declared bound.
  ArrayLengthMismatch = "CE2003",
  /// `Result<T, E>` syntax was nested inside another `Result`/return-type wrapping.
  DoubleWrappedResult = "CE2005",
  /// A type parameter could not be inferred because it only occurs in a non-top-level
  /// syntactic position (§4.3).
  UninferrableTypeParameter = "CE2101",
  /// A dynamic array, `HashMap` (as key), or other forbidden container appears where the
  /// grammar disallows it (enum-variant payload, `HashMap` key).
  ForbiddenContainerPosition = "CE2201",
  /// A reference type was used in a position requiring storage (a `let` binding holding a
  /// long-lived reference).
  ReferenceEscapesStorage = "CE2202",
  /// Arithmetic between operands of different types, or a numeric conversion attempted
  /// without an explicit `as`-cast.
  OperandTypeMismatch = "CE2301",
  /// Assigning/binding a `Result<T, E>` directly to a variable of type `T`.
  UnwrappedResultAssignment = "CE2501",
  /// `.realise(default)` was called with zero or more-than-one argument, or with an argument
  /// whose type does not match `T`.
  RealiseArityMismatch = "CE2502",
  /// The `??` operator's error type does not equal the enclosing function's declared error
  /// type exactly (the one sanctioned exception being `Maybe::None -> Err(StdError.Error)`).
  ErrorTypeMismatch = "CE2503",

  // CE24xx: borrow checking — C8. (Carved out of the CE2xxx range per §6's allocation table.)
  /// Two borrows of the same variable conflict (shared-vs-exclusive, or exclusive-vs-anything).
  BorrowConflict = "CE2401",
  /// A write was attempted through a `&peek` (shared) reference.
  WriteThroughShared = "CE2402",

  // CE3xxx: unit management, library format.
  /// A cross-unit reference names a declaration that is not `public`.
  VisibilityViolation = "CE3001",
  /// A qualified name does not resolve to any known unit/declaration.
  UnresolvedPath = "CE3002",

  // CE4xxx: perks and constraints — C4/C7.
  /// A type argument does not satisfy one of the perk bounds its parameter declares.
  UnsatisfiedConstraint = "CE4001",
  /// A perk method was invoked on a type with no matching `impl` and no synthetic
  /// implementation.
  NoPerkImplementation = "CE4002",
  /// `??` was used inside an extension method body (Open Question #3: documented limitation,
  /// surfaced explicitly rather than silently rejected). Extensions are perk-adjacent sugar,
  /// so this lives alongside the other perk-constraint codes rather than a range of its own.
  PropagationInExtension = "CE4003",

  // CWxxxx: warnings, never fatal.
  /// An expression statement produced a `Result<T, E>` that was never consumed.
  UnusedResult = "CW0001",
  /// `??` appears inside the program's entry point.
  PropagationFromEntry = "CW0002",
}

/// A single diagnostic: a stable code, severity, primary span, optional secondary spans with
/// labels, and free-form explanatory text (§6).
#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub code: Code,
  pub severity: Severity,
  pub primary: FileSpan,
  pub secondary: Vec<LabeledSpan>,
  pub message: String,
}

impl Diagnostic {
  #[must_use] pub fn new(code: Code, primary: FileSpan, message: impl Into<String>) -> Self {
    Self { code, severity: code.severity(), primary, secondary: Vec::new(), message: message.into() }
  }

  #[must_use] pub fn with_secondary(mut self, span: FileSpan, label: impl Into<String>) -> Self {
    self.secondary.push(LabeledSpan { span, label: label.into() });
    self
  }

  #[must_use] pub fn is_fatal(&self) -> bool { self.severity == Severity::Error }
}

/// The accumulating diagnostic sink threaded explicitly through every pass. Passes never
/// halt on their own; the driver (`crate::pipeline`) reads `has_errors()` between passes
/// to decide whether to continue (§7 propagation policy).
#[derive(Default, Debug)]
pub struct DiagnosticBag {
  diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, d: Diagnostic) { self.diagnostics.push(d); }

  pub fn error(&mut self, code: Code, primary: FileSpan, message: impl Into<String>) {
    debug_assert_eq!(code.severity(), Severity::Error);
    self.push(Diagnostic::new(code, primary, message));
  }

  pub fn warn(&mut self, code: Code, primary: FileSpan, message: impl Into<String>) {
    debug_assert_eq!(code.severity(), Severity::Warning);
    self.push(Diagnostic::new(code, primary, message));
  }

  #[must_use] pub fn has_errors(&self) -> bool {
    self.diagnostics.iter().any(Diagnostic::is_fatal)
  }

  #[must_use] pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }

  /// The driver's exit-code mapping from §7: `0` clean, `1` warnings only, `2` error present.
  #[must_use] pub fn exit_code(&self) -> u8 {
    if self.has_errors() { 2 } else if self.diagnostics.is_empty() { 0 } else { 1 }
  }

  /// Append another bag's diagnostics, preserving order (§5's order-stability guarantee:
  /// passes run in a deterministic sequence, so concatenation is itself deterministic).
  pub fn extend(&mut self, other: DiagnosticBag) { self.diagnostics.extend(other.diagnostics); }
}

/// Render a diagnostic with a source snippet and a caret, the reference renderer an external
/// driver may reuse or replace (§7 "user-visible failure").
#[must_use]
pub fn render(d: &Diagnostic, source: &str) -> String {
  let mut out = String::new();
  let sev = match d.severity { Severity::Error => "error", Severity::Warning => "warning" };
  out.push_str(&format!("{sev}[{}]: {}\n", d.code, d.message));
  let start = d.primary.span.start as usize;
  let end = d.primary.span.end as usize;
  let line_start = source[..start.min(source.len())].rfind('\n').map_or(0, |i| i + 1);
  let line_end = source[start.min(source.len())..].find('\n').map_or(source.len(), |i| start + i);
  let line = &source[line_start..line_end.max(line_start)];
  let col = start - line_start;
  out.push_str(&format!("  --> {}:{}\n", d.primary.file.0, col + 1));
  out.push_str(&format!("  | {line}\n"));
  let underline_len = end.saturating_sub(start).max(1);
  out.push_str(&format!("  | {}{}\n", " ".repeat(col), "^".repeat(underline_len)));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileId;
  use std::rc::Rc;

  fn span() -> FileSpan { FileSpan::new(FileId(Rc::from("main.sushi")), 0, 1) }

  #[test]
  fn exit_code_reflects_worst_severity() {
    let mut bag = DiagnosticBag::new();
    assert_eq!(bag.exit_code(), 0);
    bag.warn(Code::UnusedResult, span(), "unused");
    assert_eq!(bag.exit_code(), 1);
    bag.error(Code::UseAfterMove, span(), "moved");
    assert_eq!(bag.exit_code(), 2);
  }

  #[test]
  fn codes_are_stable_strings() {
    assert_eq!(Code::BorrowConflict.as_str(), "CE2401");
    assert_eq!(Code::BorrowConflict.severity(), Severity::Error);
    assert_eq!(Code::UnusedResult.severity(), Severity::Warning);
  }
}
