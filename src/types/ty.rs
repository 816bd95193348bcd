//! Resolved types (§3 "Types").
//!
//! `Ty` is used both before and after monomorphization: [`Ty::Param`] placeholders appear
//! inside a generic template's body and are only required to be gone by the time C4 hands a
//! monomorphized copy to C5 (§3 invariant: "a type parameter has meaning only inside the
//! declaration that introduces it; outside, it must be resolved to a concrete type by C4").

use std::fmt;
use smallvec::SmallVec;
use crate::symbol::Symbol;
use crate::types::QName;

/// The fixed set of primitive scalar types (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Prim {
  I8, I16, I32, I64,
  U8, U16, U32, U64,
  F32, F64,
  Bool,
  Str,
  /// `~`, the unit type.
  Unit,
}

impl Prim {
  #[must_use] pub fn is_integer(self) -> bool {
    matches!(self, Prim::I8|Prim::I16|Prim::I32|Prim::I64|Prim::U8|Prim::U16|Prim::U32|Prim::U64)
  }
  #[must_use] pub fn is_signed(self) -> bool {
    matches!(self, Prim::I8|Prim::I16|Prim::I32|Prim::I64)
  }
  #[must_use] pub fn is_float(self) -> bool { matches!(self, Prim::F32|Prim::F64) }

  /// Canonical rendering used both in diagnostics and in C4's mangling scheme.
  #[must_use] pub fn canonical_name(self) -> &'static str {
    match self {
      Prim::I8 => "i8", Prim::I16 => "i16", Prim::I32 => "i32", Prim::I64 => "i64",
      Prim::U8 => "u8", Prim::U16 => "u16", Prim::U32 => "u32", Prim::U64 => "u64",
      Prim::F32 => "f32", Prim::F64 => "f64",
      Prim::Bool => "bool", Prim::Str => "string", Prim::Unit => "unit",
    }
  }
}

/// Borrow mode for reference types (§3, §4.8): `peek` (shared) or `poke` (exclusive).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BorrowMode { Peek, Poke }

impl BorrowMode {
  #[must_use] pub fn as_str(self) -> &'static str {
    match self { BorrowMode::Peek => "peek", BorrowMode::Poke => "poke" }
  }
}

/// The built-in generics the spec names explicitly: `Result<T, E>`, `Maybe<T>`, `List<T>`,
/// `HashMap<K, V>`, `Iterator<T>`, `Own<T>`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Builtin {
  Result(Box<Ty>, Box<Ty>),
  Maybe(Box<Ty>),
  List(Box<Ty>),
  HashMap(Box<Ty>, Box<Ty>),
  Iterator(Box<Ty>),
  Own(Box<Ty>),
}

impl Builtin {
  #[must_use] pub fn template_name(&self) -> &'static str {
    match self {
      Builtin::Result(..) => "Result",
      Builtin::Maybe(..) => "Maybe",
      Builtin::List(..) => "List",
      Builtin::HashMap(..) => "HashMap",
      Builtin::Iterator(..) => "Iterator",
      Builtin::Own(..) => "Own",
    }
  }

  #[must_use] pub fn type_args(&self) -> SmallVec<[&Ty; 2]> {
    match self {
      Builtin::Result(a, b) | Builtin::HashMap(a, b) => smallvec::smallvec![&**a, &**b],
      Builtin::Maybe(a) | Builtin::List(a) | Builtin::Iterator(a) | Builtin::Own(a) =>
        smallvec::smallvec![&**a],
    }
  }
}

/// A resolved type, per §3's data model.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Ty {
  Primitive(Prim),
  /// `T[N]`: element type plus a compile-time length.
  FixedArray(Box<Ty>, u64),
  /// `T[]`: element type only.
  DynArray(Box<Ty>),
  /// `&peek T` / `&poke T`. Only legal in parameter position (§3 invariant).
  Ref(BorrowMode, Box<Ty>),
  /// A user-defined struct or enum, identified by fully-qualified name plus type arguments.
  /// Before C4, `args` may itself contain [`Ty::Param`]s; after C4 it is empty (the name is
  /// already the mangled concrete name).
  Nominal(QName, Vec<Ty>),
  Builtin(Builtin),
  /// A type parameter, meaningful only inside the declaration introducing it (§3).
  Param(Symbol),
}

impl Ty {
  #[must_use] pub const UNIT: Ty = Ty::Primitive(Prim::Unit);

  /// Per §3: may this type be passed/stored by value without an owning move — i.e. is it
  /// trivially copyable? Primitives and `string` copy; everything else (dynamic arrays,
  /// `List`, `HashMap`, `Own`, and any composite containing one of these) moves.
  #[must_use] pub fn is_copy(&self, structs_containing_move_only: impl Fn(&QName) -> bool) -> bool {
    match self {
      Ty::Primitive(_) => true,
      Ty::Ref(..) => true,
      Ty::FixedArray(elem, _) => elem.is_copy(structs_containing_move_only),
      Ty::DynArray(_) => false,
      Ty::Builtin(Builtin::List(_) | Builtin::HashMap(..) | Builtin::Own(_)) => false,
      Ty::Builtin(Builtin::Result(a, b)) =>
        a.is_copy(&structs_containing_move_only) && b.is_copy(&structs_containing_move_only),
      Ty::Builtin(Builtin::Maybe(a) | Builtin::Iterator(a)) => a.is_copy(structs_containing_move_only),
      Ty::Nominal(name, _) => !structs_containing_move_only(name),
      Ty::Param(_) => false,
    }
  }

  /// Whether this type may legally appear as an enum-variant payload element or as a
  /// `HashMap` key (§3 invariant: dynamic arrays may not; fixed arrays may).
  #[must_use] pub fn allowed_in_payload_or_key(&self) -> bool {
    !matches!(self, Ty::DynArray(_))
  }

  #[must_use] pub fn is_result(&self) -> bool { matches!(self, Ty::Builtin(Builtin::Result(..))) }
  #[must_use] pub fn is_maybe(&self) -> bool { matches!(self, Ty::Builtin(Builtin::Maybe(_))) }

  /// Recursively substitute every [`Ty::Param`] named in `subst`, used by C4's monomorphizer
  /// and by C3's call-site instantiation recording.
  #[must_use] pub fn substitute(&self, subst: &hashbrown::HashMap<Symbol, Ty>) -> Ty {
    match self {
      Ty::Param(p) => subst.get(p).cloned().unwrap_or_else(|| self.clone()),
      Ty::Primitive(_) => self.clone(),
      Ty::FixedArray(t, n) => Ty::FixedArray(Box::new(t.substitute(subst)), *n),
      Ty::DynArray(t) => Ty::DynArray(Box::new(t.substitute(subst))),
      Ty::Ref(m, t) => Ty::Ref(*m, Box::new(t.substitute(subst))),
      Ty::Nominal(name, args) => Ty::Nominal(*name, args.iter().map(|a| a.substitute(subst)).collect()),
      Ty::Builtin(b) => Ty::Builtin(match b {
        Builtin::Result(a, e) => Builtin::Result(Box::new(a.substitute(subst)), Box::new(e.substitute(subst))),
        Builtin::Maybe(a) => Builtin::Maybe(Box::new(a.substitute(subst))),
        Builtin::List(a) => Builtin::List(Box::new(a.substitute(subst))),
        Builtin::HashMap(k, v) => Builtin::HashMap(Box::new(k.substitute(subst)), Box::new(v.substitute(subst))),
        Builtin::Iterator(a) => Builtin::Iterator(Box::new(a.substitute(subst))),
        Builtin::Own(a) => Builtin::Own(Box::new(a.substitute(subst))),
      }),
    }
  }

  /// Every [`Ty::Param`] occurring at the *syntactic top level* of this type — i.e. not
  /// nested inside a generic/array/ref. Used by C3 to implement the intentionally limited
  /// inference rule of §4.3.
  pub fn top_level_params(&self, out: &mut Vec<Symbol>) {
    if let Ty::Param(p) = self { out.push(*p); }
  }

  /// Render this type as source-like text (§6: diagnostics carry "free-form explanatory
  /// text"), resolving every `Nominal`/`Param` name through `interner`. The plain [`Display`]
  /// impl below has no interner to resolve against and falls back to a bare symbol index; use
  /// this instead anywhere a type name reaches a diagnostic message.
  #[must_use] pub fn render(&self, interner: &crate::symbol::Interner) -> String {
    match self {
      Ty::Primitive(p) => p.canonical_name().to_string(),
      Ty::FixedArray(t, n) => format!("{}[{n}]", t.render(interner)),
      Ty::DynArray(t) => format!("{}[]", t.render(interner)),
      Ty::Ref(m, t) => format!("&{} {}", m.as_str(), t.render(interner)),
      Ty::Nominal(q, args) => {
        let mut s = interner.resolve(q.name).to_string();
        if !args.is_empty() {
          s.push('<');
          for (i, a) in args.iter().enumerate() {
            if i > 0 { s.push_str(", "); }
            s.push_str(&a.render(interner));
          }
          s.push('>');
        }
        s
      }
      Ty::Builtin(b) => {
        let mut s = format!("{}<", b.template_name());
        for (i, a) in b.type_args().into_iter().enumerate() {
          if i > 0 { s.push_str(", "); }
          s.push_str(&a.render(interner));
        }
        s.push('>');
        s
      }
      Ty::Param(p) => interner.resolve(*p).to_string(),
    }
  }
}

/// Interner-free rendering: `Nominal`/`Param` print their raw symbol index rather than a
/// name, since `Display::fmt` has no interner to resolve against. Used for quick debugging
/// and by anything comparing/sorting rendered text rather than showing it to a user; diagnostic
/// text should call [`Ty::render`] instead.
impl fmt::Display for Ty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Ty::Primitive(p) => write!(f, "{}", p.canonical_name()),
      Ty::FixedArray(t, n) => write!(f, "{t}[{n}]"),
      Ty::DynArray(t) => write!(f, "{t}[]"),
      Ty::Ref(m, t) => write!(f, "&{} {t}", m.as_str()),
      Ty::Nominal(q, args) => {
        write!(f, "{}", q.name.into_usize())?;
        if !args.is_empty() {
          write!(f, "<")?;
          for (i, a) in args.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{a}")?;
          }
          write!(f, ">")?;
        }
        Ok(())
      }
      Ty::Builtin(b) => {
        write!(f, "{}<", b.template_name())?;
        for (i, a) in b.type_args().into_iter().enumerate() {
          if i > 0 { write!(f, ", ")?; }
          write!(f, "{a}")?;
        }
        write!(f, ">")
      }
      Ty::Param(p) => write!(f, "${}", p.into_usize()),
    }
  }
}

/// A perk (trait) bound on a type parameter, with the ordered set of perks it must satisfy
/// (§3 "a type parameter with an ordered set of perk bounds").
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeParam {
  pub name: Symbol,
  pub bounds: SmallVec<[QName; 2]>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn substitute_replaces_nested_params() {
    let p = Symbol::UNDER; // any symbol works as a stand-in param name for this test
    let generic = Ty::Builtin(Builtin::Maybe(Box::new(Ty::Param(p))));
    let mut subst = hashbrown::HashMap::new();
    subst.insert(p, Ty::Primitive(Prim::I32));
    let concrete = generic.substitute(&subst);
    assert_eq!(concrete, Ty::Builtin(Builtin::Maybe(Box::new(Ty::Primitive(Prim::I32)))));
  }

  #[test]
  fn dyn_array_not_allowed_in_payload() {
    assert!(!Ty::DynArray(Box::new(Ty::Primitive(Prim::I32))).allowed_in_payload_or_key());
    assert!(Ty::FixedArray(Box::new(Ty::Primitive(Prim::I32)), 4).allowed_in_payload_or_key());
  }

  #[test]
  fn render_resolves_nominal_and_param_names_unlike_display() {
    let mut interner = crate::symbol::Interner::new();
    let unit = interner.intern("u");
    let point = interner.intern("Point");
    let t = interner.intern("T");
    let qn = QName::new(unit, point);
    let generic = Ty::Nominal(qn, vec![Ty::Param(t)]);
    assert_eq!(generic.render(&interner), "Point<T>");
    assert_ne!(generic.to_string(), "Point<T>");
  }
}
