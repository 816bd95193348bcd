//! C4's name-mangling scheme (§4.4), plus its inverse, the demangler (§8 Testable Property 4,
//! SPEC_FULL.md §3 supplement).
//!
//! Scheme: join the qualified generic name with a double-underscore separator followed by
//! each type argument rendered by the same rule; nested generics render by recursion
//! (`Maybe<Maybe<i32>>` -> `Maybe__Maybe__i32`); primitives render by their canonical name;
//! references render as `ref_peek_T` / `ref_poke_T`.

use crate::symbol::Interner;
use crate::types::ty::{BorrowMode, Builtin, Ty};

const SEP: &str = "__";

/// Render `ty` using C4's mangling grammar.
#[must_use] pub fn mangle_ty(ty: &Ty, interner: &Interner) -> String {
  match ty {
    Ty::Primitive(p) => p.canonical_name().to_string(),
    Ty::Ref(BorrowMode::Peek, t) => format!("ref_peek_{}", mangle_ty(t, interner)),
    Ty::Ref(BorrowMode::Poke, t) => format!("ref_poke_{}", mangle_ty(t, interner)),
    Ty::FixedArray(t, n) => format!("arr{n}_{}", mangle_ty(t, interner)),
    Ty::DynArray(t) => format!("slice_{}", mangle_ty(t, interner)),
    Ty::Param(s) => interner.resolve(*s).to_string(),
    Ty::Nominal(q, args) => mangle_name(interner.resolve(q.name), args, interner),
    Ty::Builtin(b) => {
      let owned: Vec<Ty> = b.type_args().into_iter().cloned().collect();
      mangle_name(b.template_name(), &owned, interner)
    }
  }
}

/// Mangle a template name applied to a type-argument vector: `template__arg0__arg1...`, or
/// just `template` when `args` is empty. This is the function Testable Property 4 requires to
/// be "a pure function of `(template, type-argument-vector)`".
#[must_use] pub fn mangle_name(template: &str, args: &[Ty], interner: &Interner) -> String {
  if args.is_empty() { return template.to_string(); }
  let mut out = String::from(template);
  for a in args {
    out.push_str(SEP);
    out.push_str(&mangle_ty(a, interner));
  }
  out
}

/// A demangled type tree — intentionally decoupled from [`Ty`] since demangling a name can't
/// recover which unit a nominal type was first published in (first-publish is a registry
/// fact, not encoded in the mangled string); callers that need a full `Ty` look up the
/// recovered `(template, args)` pair in the monomorphizer's instantiation table.
#[derive(Clone, Debug, PartialEq)]
pub enum Demangled {
  Primitive(String),
  /// A user/builtin generic template applied to its (already-demangled) type arguments.
  Generic(String, Vec<Demangled>),
  Ref(BorrowMode, Box<Demangled>),
  FixedArray(Box<Demangled>, u64),
  DynArray(Box<Demangled>),
}

const PRIMITIVE_NAMES: &[&str] = &["i8","i16","i32","i64","u8","u16","u32","u64","f32","f64","bool","string","unit"];

fn builtin_arity(name: &str) -> Option<usize> {
  match name {
    "Result" | "HashMap" => Some(2),
    "Maybe" | "List" | "Iterator" | "Own" => Some(1),
    _ => None,
  }
}

/// Demangle `s` back into its template/argument structure. `arity_of` resolves a *user*
/// nominal template's declared type-parameter count (builtins and primitives are known
/// in-crate); this is the registry lookup a live compiler would back with C1's symbol table.
#[must_use]
pub fn demangle(s: &str, arity_of: &dyn Fn(&str) -> Option<usize>) -> Option<Demangled> {
  let tokens: Vec<&str> = s.split(SEP).collect();
  let (node, next) = parse_node(&tokens, 0, arity_of)?;
  if next == tokens.len() { Some(node) } else { None }
}

fn parse_node(tokens: &[&str], idx: usize, arity_of: &dyn Fn(&str) -> Option<usize>) -> Option<(Demangled, usize)> {
  let tok = *tokens.get(idx)?;
  if let Some(rest) = tok.strip_prefix("ref_peek_") {
    let (inner, next) = parse_node_from_text(rest, tokens, idx, arity_of)?;
    return Some((Demangled::Ref(BorrowMode::Peek, Box::new(inner)), next));
  }
  if let Some(rest) = tok.strip_prefix("ref_poke_") {
    let (inner, next) = parse_node_from_text(rest, tokens, idx, arity_of)?;
    return Some((Demangled::Ref(BorrowMode::Poke, Box::new(inner)), next));
  }
  if let Some(rest) = tok.strip_prefix("slice_") {
    let (inner, next) = parse_node_from_text(rest, tokens, idx, arity_of)?;
    return Some((Demangled::DynArray(Box::new(inner)), next));
  }
  if let Some(rest) = tok.strip_prefix("arr") {
    if let Some(us) = rest.find('_') {
      let n: u64 = rest[..us].parse().ok()?;
      let (inner, next) = parse_node_from_text(&rest[us + 1..], tokens, idx, arity_of)?;
      return Some((Demangled::FixedArray(Box::new(inner), n), next));
    }
  }
  if PRIMITIVE_NAMES.contains(&tok) { return Some((Demangled::Primitive(tok.to_string()), idx + 1)); }
  let arity = builtin_arity(tok).or_else(|| arity_of(tok)).unwrap_or(0);
  let mut args = Vec::with_capacity(arity);
  let mut cursor = idx + 1;
  for _ in 0..arity {
    let (arg, next) = parse_node(tokens, cursor, arity_of)?;
    args.push(arg);
    cursor = next;
  }
  Some((Demangled::Generic(tok.to_string(), args), cursor))
}

/// Re-parse a node whose *first* token has had a prefix (`ref_peek_`/`arrN_`/`slice_`)
/// stripped off — the remaining tokens (if the stripped node is itself generic) still live at
/// `idx + 1..` in the original token stream.
fn parse_node_from_text(
  remainder: &str, tokens: &[&str], idx: usize, arity_of: &dyn Fn(&str) -> Option<usize>,
) -> Option<(Demangled, usize)> {
  let mut synthetic: Vec<&str> = Vec::with_capacity(tokens.len() - idx);
  synthetic.push(remainder);
  synthetic.extend_from_slice(&tokens[idx + 1..]);
  let (node, consumed) = parse_node(&synthetic, 0, arity_of)?;
  Some((node, idx + consumed))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Interner;
  use crate::types::ty::{Builtin, Prim};

  fn arity0(_: &str) -> Option<usize> { None }

  #[test]
  fn nested_maybe_matches_the_documented_example() {
    let interner = Interner::new();
    let inner = Ty::Builtin(Builtin::Maybe(Box::new(Ty::Primitive(Prim::I32))));
    let outer = Ty::Builtin(Builtin::Maybe(Box::new(inner)));
    assert_eq!(mangle_ty(&outer, &interner), "Maybe__Maybe__i32");
  }

  #[test]
  fn round_trips_through_demangle() {
    let interner = Interner::new();
    let ty = Ty::Builtin(Builtin::Result(
      Box::new(Ty::Ref(BorrowMode::Peek, Box::new(Ty::Primitive(Prim::I64)))),
      Box::new(Ty::Primitive(Prim::Bool)),
    ));
    let mangled = mangle_ty(&ty, &interner);
    let demangled = demangle(&mangled, &arity0).expect("should demangle");
    assert_eq!(demangled, Demangled::Generic("Result".into(), vec![
      Demangled::Ref(BorrowMode::Peek, Box::new(Demangled::Primitive("i64".into()))),
      Demangled::Primitive("bool".into()),
    ]));
  }

  #[test]
  fn user_generic_with_declared_arity_round_trips() {
    fn arity(name: &str) -> Option<usize> { if name == "Pair" { Some(2) } else { None } }
    let mangled = "Pair__i32__string";
    let demangled = demangle(mangled, &arity).unwrap();
    assert_eq!(demangled, Demangled::Generic("Pair".into(), vec![
      Demangled::Primitive("i32".into()), Demangled::Primitive("string".into()),
    ]));
  }
}
