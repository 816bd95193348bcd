//! String interning for identifiers.
//!
//! The teacher (`mmcc`) pulls `Symbol`/`Interner`/`init_dense_symbol_map` from a sibling
//! `mm0_util` crate that isn't part of this workspace; the same API shape is reproduced here
//! as an in-crate module instead of faked as a path dependency.

use std::fmt;
use hashbrown::HashMap;

/// An interned identifier. Cheap to copy and compare; the backing bytes live in the
/// [`Interner`]'s arena for the lifetime of the compilation job.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Symbol({})", self.0) }
}

impl Symbol {
  /// The underscore/"ignore this binding" symbol. Always index 0 so every interner agrees
  /// on it without a lookup.
  pub const UNDER: Symbol = Symbol(0);
  /// The name of the standard error type every bare `T` return type implicitly wraps into
  /// (§4.7: "if a function declares return `T`, its true return type is `Result<T, StdError>`").
  /// Reserved at a fixed index so C1 can build `Result<T, StdError>` without needing mutable
  /// interner access (`collect::collect` only ever borrows the interner immutably).
  pub const STD_ERROR: Symbol = Symbol(1);
  /// A synthetic "owning unit" for [`Symbol::STD_ERROR`]'s qualified name, distinct from any
  /// real unit name so it can never collide with a user declaration.
  pub const STD_UNIT: Symbol = Symbol(2);

  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  /// Reconstruct a `Symbol` from an index previously returned by [`Symbol::into_usize`].
  /// Used by callers that need to scan an [`Interner`]'s existing table without a mutable
  /// reference (interning would assign a fresh index rather than find an existing one).
  #[must_use] pub fn from_usize(i: usize) -> Symbol { Symbol(i as u32) }
}

/// Owns the backing storage for every interned string and maps strings to [`Symbol`]s.
pub struct Interner {
  map: HashMap<Box<str>, Symbol>,
  strings: Vec<Box<str>>,
}

impl Default for Interner {
  fn default() -> Self {
    let mut this = Self { map: HashMap::new(), strings: Vec::new() };
    let u = this.intern_fresh("_");
    debug_assert_eq!(u, Symbol::UNDER);
    let e = this.intern_fresh("StdError");
    debug_assert_eq!(e, Symbol::STD_ERROR);
    let s = this.intern_fresh("<std>");
    debug_assert_eq!(s, Symbol::STD_UNIT);
    this
  }
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn intern_fresh(&mut self, s: &str) -> Symbol {
    let sym = Symbol(self.strings.len() as u32);
    self.map.insert(s.into(), sym);
    self.strings.push(s.into());
    sym
  }

  /// Intern `s`, returning the existing symbol if already interned.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym; }
    self.intern_fresh(s)
  }

  /// Resolve a symbol back to its string. Panics if `sym` was not produced by this interner.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str {
    self.strings[sym.into_usize()]
  }

  #[must_use] pub fn len(&self) -> usize { self.strings.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.strings.is_empty() }
}

/// Build a dense `Symbol -> T` lookup table out of a list of `(Symbol, T)` pairs, for use by
/// generated `from_symbol` methods (see [`crate::types::entity`]'s `make_prims!`).
#[must_use]
pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let max = pairs.iter().map(|(s, _)| s.into_usize()).max().unwrap_or(0);
  let mut v = vec![None; max + 1];
  for &(s, t) in pairs { v[s.into_usize()] = Some(t); }
  v.into_boxed_slice()
}
