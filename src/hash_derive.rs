//! C6: the Hash Deriver (§4.6).
//!
//! Synthesizes a `hash() -> u64` for every type reachable as a `HashMap` key or as an operand
//! of `==`. The derivation scheme is specified exactly by §4.6 rather than left to `Hash`'s
//! usual freedom, so this module computes the scheme directly instead of deferring to
//! `std::hash::Hash`/`Hasher` (whose output isn't specified to be stable across toolchains,
//! which §8 Testable Property 6 requires: "`v.hash() == v.hash()` on repeated calls").
//!
//! Dynamic arrays are never hashable (§4.6 "Constraint"); requesting one is `CE4002` via the
//! same `NoPerkImplementation` diagnostic C7 uses for a missing perk method, since `Hashable`
//! is a perk bound like any other (§4.7).

use crate::diag::{Code, DiagnosticBag};
use crate::span::FileSpan;
use crate::types::entity::{Entity, SymbolTable};
use crate::types::ty::{Builtin, Prim, Ty};
use crate::types::QName;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// Hash a primitive integer with an FxHash-style multiplicative fold (§4.6).
#[must_use] pub fn hash_int(v: i128) -> u64 {
  const FX_SEED: u64 = 0x51_7c_c1_b7_27_22_0a_95;
  (v as u64).rotate_left(5) ^ FX_SEED
}

/// Normalize and hash a float: −0.0 folds to 0.0, NaN folds to a single canonical bit pattern,
/// then the result is reinterpreted as the corresponding unsigned integer (§4.6).
#[must_use] pub fn hash_float(v: f64) -> u64 {
  let normalized = if v == 0.0 { 0.0 } else if v.is_nan() { f64::NAN.copysign(1.0) } else { v };
  hash_int(i128::from(normalized.to_bits()))
}

#[must_use] pub fn hash_bool(b: bool) -> u64 { u64::from(b) }

/// FNV-1a over UTF-8 bytes (§4.6).
#[must_use] pub fn hash_str(s: &str) -> u64 {
  let mut acc = FNV_OFFSET;
  for &byte in s.as_bytes() {
    acc ^= u64::from(byte);
    acc = acc.wrapping_mul(FNV_PRIME);
  }
  acc
}

/// Mix a field hash into a struct's running accumulator: `(acc ^ h) * FNV_PRIME`, starting
/// from the FNV offset basis and folding fields in declaration order (§4.6 "Struct").
#[must_use] pub fn mix(acc: u64, h: u64) -> u64 { (acc ^ h).wrapping_mul(FNV_PRIME) }

#[must_use] pub fn hash_fixed_array(elem_hashes: impl IntoIterator<Item = u64>) -> u64 {
  elem_hashes.into_iter().fold(FNV_OFFSET, mix)
}

/// Mix an enum discriminant then its active variant's payload hash (§4.6 "Enum"; `Result` and
/// `Maybe` are hashed the same way, as enums).
#[must_use] pub fn hash_enum(discriminant: u32, payload_hash: u64) -> u64 {
  mix(mix(FNV_OFFSET, hash_int(i128::from(discriminant))), payload_hash)
}

/// A synthesized hash-method descriptor: a plain recipe for the backend to emit, since C6
/// never executes code itself (§5 "the core never executes destructors" applies equally to
/// this recipe: it's data the backend consumes, not a computation the core performs on user
/// values).
#[derive(Clone, Debug)]
pub enum HashRecipe {
  Primitive,
  /// One step per field, each a `(field name, recipe)` pair mixed in declaration order.
  Struct(Vec<(crate::symbol::Symbol, HashRecipe)>),
  /// One recipe per variant's payload elements, matched by discriminant at runtime.
  Enum(Vec<Vec<HashRecipe>>),
  FixedArray(Box<HashRecipe>, u64),
  Unsupported,
}

/// Derive a [`HashRecipe`] for `ty`, reporting `NoPerkImplementation` at `span` if `ty`
/// contains a dynamic array (§4.6 "Constraint": dynamic arrays are non-hashable).
pub fn derive(ty: &Ty, table: &SymbolTable, span: &FileSpan, bag: &mut DiagnosticBag) -> HashRecipe {
  match ty {
    Ty::Primitive(_) => HashRecipe::Primitive,
    Ty::DynArray(_) => {
      bag.error(Code::NoPerkImplementation, span.clone(), "dynamic arrays are not hashable; a `HashMap` key or `==` operand needs a fixed-size or primitive type");
      HashRecipe::Unsupported
    }
    Ty::FixedArray(elem, n) => HashRecipe::FixedArray(Box::new(derive(elem, table, span, bag)), *n),
    Ty::Ref(_, inner) => derive(inner, table, span, bag),
    Ty::Nominal(qn, _) => derive_nominal(*qn, table, span, bag),
    Ty::Builtin(Builtin::Result(a, e)) => HashRecipe::Enum(vec![
      vec![derive(a, table, span, bag)],
      vec![derive(e, table, span, bag)],
    ]),
    Ty::Builtin(Builtin::Maybe(a)) => HashRecipe::Enum(vec![vec![derive(a, table, span, bag)], vec![]]),
    Ty::Builtin(_) | Ty::Param(_) => HashRecipe::Unsupported,
  }
}

fn derive_nominal(qn: QName, table: &SymbolTable, span: &FileSpan, bag: &mut DiagnosticBag) -> HashRecipe {
  match table.get(&qn) {
    Some(Entity::Struct(s)) => HashRecipe::Struct(
      s.fields.iter().map(|f| (f.name, derive(&f.ty, table, span, bag))).collect(),
    ),
    Some(Entity::Enum(e)) => HashRecipe::Enum(
      e.variants.iter().map(|v| v.payload.iter().map(|t| derive(t, table, span, bag)).collect()).collect(),
    ),
    _ => HashRecipe::Unsupported,
  }
}

/// Evaluate a [`HashRecipe`] against a concrete constant value, used by tests and by any
/// constant-folding caller that needs a hash at compile time (e.g. deduplicating match-arm
/// literals). Mirrors the exact mixing order `derive` recorded.
#[must_use] pub fn eval(recipe: &HashRecipe, value: &crate::const_eval::ConstValue) -> u64 {
  use crate::const_eval::ConstValue;
  match (recipe, value) {
    (HashRecipe::Primitive, ConstValue::Int(v, _)) => hash_int(*v),
    (HashRecipe::Primitive, ConstValue::Float(v, _)) => hash_float(*v),
    (HashRecipe::Primitive, ConstValue::Bool(b)) => hash_bool(*b),
    (HashRecipe::Primitive, ConstValue::Str(s)) => hash_str(s),
    (HashRecipe::FixedArray(elem, _), ConstValue::Array(items)) =>
      hash_fixed_array(items.iter().map(|i| eval(elem, i))),
    // A struct's constant value has no named-field representation of its own (§4.1's constant
    // grammar never produces one); callers that do have one pass it as a positional `Array`
    // whose items line up with `fields`' declaration order, the same order `derive_nominal`
    // built the recipe in.
    (HashRecipe::Struct(fields), ConstValue::Array(items)) if fields.len() == items.len() =>
      fields.iter().zip(items.iter()).fold(FNV_OFFSET, |acc, ((_, recipe), v)| mix(acc, eval(recipe, v))),
    _ => FNV_OFFSET,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Symbol;

  #[test]
  fn float_hash_normalizes_negative_zero() {
    assert_eq!(hash_float(0.0), hash_float(-0.0));
  }

  #[test]
  fn float_hash_is_deterministic_for_nan() {
    assert_eq!(hash_float(f64::NAN), hash_float(-f64::NAN));
  }

  #[test]
  fn string_hash_is_deterministic() {
    assert_eq!(hash_str("sushi"), hash_str("sushi"));
    assert_ne!(hash_str("sushi"), hash_str("roll"));
  }

  #[test]
  fn struct_hash_mixes_fields_in_declaration_order() {
    use crate::const_eval::ConstValue;
    let mut interner = crate::symbol::Interner::new();
    let a = interner.intern("a");
    let b = interner.intern("b");
    let recipe = HashRecipe::Struct(vec![(a, HashRecipe::Primitive), (b, HashRecipe::Primitive)]);
    let v = ConstValue::Array(vec![ConstValue::Int(1, Prim::I32), ConstValue::Int(2, Prim::I32)]);
    let swapped = ConstValue::Array(vec![ConstValue::Int(2, Prim::I32), ConstValue::Int(1, Prim::I32)]);
    // Determinism (§8 Property 6): evaluating the same recipe against the same value twice is
    // stable.
    assert_eq!(eval(&recipe, &v), eval(&recipe, &v));
    // Order sensitivity: the same two field values mixed in swapped positions must not collide,
    // or `mix`'s `(acc ^ h) * FNV_PRIME` fold would be commutative and miss transpositions.
    assert_ne!(eval(&recipe, &v), eval(&recipe, &swapped));
    let _ = Symbol::UNDER;
  }

  #[test]
  fn dyn_array_is_reported_unsupported() {
    use crate::span::{FileId, FileSpan};
    use std::rc::Rc;
    let table = SymbolTable::new();
    let span = FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1);
    let mut bag = DiagnosticBag::new();
    let ty = Ty::DynArray(Box::new(Ty::Primitive(Prim::I32)));
    let recipe = derive(&ty, &table, &span, &mut bag);
    assert!(matches!(recipe, HashRecipe::Unsupported));
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::NoPerkImplementation));
  }
}
