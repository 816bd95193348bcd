//! Resolves surface type syntax ([`TypeExpr`]) into the resolved type representation
//! ([`Ty`]). Shared by C1 (declaration signatures), C2/C7 (`let` annotations, casts), and C4
//! (instantiation type arguments) so there is exactly one place that implements §3's type
//! grammar.

use hashbrown::HashMap;
use crate::const_eval::{ConstEvaluator, ConstValue};
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{PrimitiveName, TypeExpr};
use crate::types::entity::SymbolTable;
use crate::types::ty::{BorrowMode, Builtin, Prim, Ty};
use crate::types::QName;

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
  /// The name doesn't refer to a known type parameter, struct, or enum.
  UnknownType(Symbol),
  /// A fixed-array length expression isn't a constant integer (§4.1 constant grammar).
  NonConstArrayLength,
  /// `Result<T, E>` / `T | E` written inside another implicit or explicit `Result` wrapping.
  DoubleWrapped,
}

/// Resolution context: the unit currently being resolved (for building [`QName`]s), the
/// in-scope type parameters (declaration-local, per §3), and the global symbol table for
/// looking up already-collected struct/enum shells.
pub struct ResolveCx<'a> {
  pub unit: Symbol,
  pub type_params: &'a [Symbol],
  pub symtab: &'a SymbolTable,
  pub consts: &'a HashMap<Symbol, ConstValue>,
  pub interner: &'a Interner,
}

pub fn resolve_type(cx: &ResolveCx<'_>, te: &TypeExpr) -> Result<Ty, ResolveError> {
  resolve_type_inner(cx, te, false)
}

fn resolve_type_inner(cx: &ResolveCx<'_>, te: &TypeExpr, inside_result: bool) -> Result<Ty, ResolveError> {
  match te {
    TypeExpr::Primitive(p) => Ok(Ty::Primitive(prim_of(*p))),
    TypeExpr::FixedArray(elem, len_expr) => {
      let elem = resolve_type_inner(cx, elem, inside_result)?;
      let mut ev = ConstEvaluator::new(cx.consts);
      let len = match ev.eval(len_expr) {
        Ok(ConstValue::Int(n, _)) if n >= 0 => n as u64,
        _ => return Err(ResolveError::NonConstArrayLength),
      };
      Ok(Ty::FixedArray(Box::new(elem), len))
    }
    TypeExpr::DynArray(elem) => Ok(Ty::DynArray(Box::new(resolve_type_inner(cx, elem, inside_result)?))),
    TypeExpr::Ref(mode, inner) => Ok(Ty::Ref(*mode, Box::new(resolve_type_inner(cx, inner, inside_result)?))),
    TypeExpr::Nominal(name, args) => resolve_nominal(cx, *name, args, inside_result),
    TypeExpr::ResultShorthand(t, e) | TypeExpr::ExplicitResult(t, e) => {
      if inside_result { return Err(ResolveError::DoubleWrapped); }
      let t = resolve_type_inner(cx, t, true)?;
      let e = resolve_type_inner(cx, e, true)?;
      Ok(Ty::Builtin(Builtin::Result(Box::new(t), Box::new(e))))
    }
  }
}

fn resolve_nominal(cx: &ResolveCx<'_>, name: Symbol, args: &[TypeExpr], inside_result: bool) -> Result<Ty, ResolveError> {
  if cx.type_params.contains(&name) {
    if !args.is_empty() { return Err(ResolveError::UnknownType(name)); }
    return Ok(Ty::Param(name));
  }
  let resolved_args = args.iter()
    .map(|a| resolve_type_inner(cx, a, inside_result))
    .collect::<Result<Vec<_>, _>>()?;
  if let Some(b) = builtin_of(cx.interner.resolve(name), resolved_args.clone()) { return Ok(Ty::Builtin(b)); }
  // First-publish rule (§3): the owning unit isn't resolved here by name search across every
  // unit's table because `QName` keys on `(unit, name)`; C1 instead looks up the owning unit
  // from its `type_names` index before calling this resolver. Here we just need *a* unit that
  // owns `name`; the caller in `collect.rs` passes the correct `cx.unit` already resolved.
  if let Some(&qn) = cx.symtab.type_names.get(&(cx.unit, name)) {
    return Ok(Ty::Nominal(qn, resolved_args));
  }
  // Fall back to searching all known type names for cross-unit references the caller hasn't
  // pre-resolved to a specific unit (used-import resolution is the external loader's job;
  // the core only observes the resulting unit set per §6).
  for (&(_, n), &qn) in &cx.symtab.type_names {
    if n == name { return Ok(Ty::Nominal(qn, resolved_args)); }
  }
  Err(ResolveError::UnknownType(name))
}

fn builtin_of(name: &str, mut args: Vec<Ty>) -> Option<Builtin> {
  match (name, args.len()) {
    ("Maybe", 1) => Some(Builtin::Maybe(Box::new(args.remove(0)))),
    ("List", 1) => Some(Builtin::List(Box::new(args.remove(0)))),
    ("Iterator", 1) => Some(Builtin::Iterator(Box::new(args.remove(0)))),
    ("Own", 1) => Some(Builtin::Own(Box::new(args.remove(0)))),
    ("HashMap", 2) => { let v = args.remove(1); let k = args.remove(0); Some(Builtin::HashMap(Box::new(k), Box::new(v))) }
    ("Result", 2) => { let e = args.remove(1); let t = args.remove(0); Some(Builtin::Result(Box::new(t), Box::new(e))) }
    _ => None,
  }
}

#[must_use] pub fn prim_of(p: PrimitiveName) -> Prim {
  match p {
    PrimitiveName::I8 => Prim::I8, PrimitiveName::I16 => Prim::I16,
    PrimitiveName::I32 => Prim::I32, PrimitiveName::I64 => Prim::I64,
    PrimitiveName::U8 => Prim::U8, PrimitiveName::U16 => Prim::U16,
    PrimitiveName::U32 => Prim::U32, PrimitiveName::U64 => Prim::U64,
    PrimitiveName::F32 => Prim::F32, PrimitiveName::F64 => Prim::F64,
    PrimitiveName::Bool => Prim::Bool, PrimitiveName::Str => Prim::Str, PrimitiveName::Unit => Prim::Unit,
  }
}

/// Build the fully-qualified name for a declaration inside `unit`.
#[must_use] pub fn qname(unit: Symbol, name: Symbol) -> QName { QName::new(unit, name) }

/// The standard error type a bare `T` return type implicitly wraps into (§4.7). Uses the
/// reserved [`Symbol::STD_ERROR`]/[`Symbol::STD_UNIT`] pair so no interner mutation is needed.
#[must_use] pub fn std_error_ty() -> Ty { Ty::Nominal(QName::new(Symbol::STD_UNIT, Symbol::STD_ERROR), Vec::new()) }

/// Names that are reserved to name a [`Builtin`] generic instead of a user struct/enum,
/// independent of any particular interner instance.
pub const BUILTIN_GENERIC_NAMES: &[&str] = &["Maybe", "List", "HashMap", "Iterator", "Own"];

#[must_use] pub fn borrow_mode_name(m: BorrowMode) -> &'static str { m.as_str() }

/// Whether `ty` contains a reference anywhere in its structure (§3: "Reference types may
/// appear only in parameter positions"). Struct fields and enum-variant payloads resolve
/// through this check in `collect.rs`'s `resolve_structs_and_enums`, the same rule C7's
/// `ReferenceEscapesStorage` already enforces for `let` bindings — a field is storage exactly
/// as much as a local variable is.
#[must_use] pub fn contains_ref(ty: &Ty) -> bool {
  match ty {
    Ty::Ref(..) => true,
    Ty::FixedArray(e, _) | Ty::DynArray(e) => contains_ref(e),
    Ty::Nominal(_, args) => args.iter().any(contains_ref),
    Ty::Builtin(Builtin::Maybe(a) | Builtin::List(a) | Builtin::Iterator(a) | Builtin::Own(a)) => contains_ref(a),
    Ty::Builtin(Builtin::HashMap(k, v) | Builtin::Result(k, v)) => contains_ref(k) || contains_ref(v),
    Ty::Primitive(_) | Ty::Param(_) => false,
  }
}
