//! C1: the Declaration Collector (§4.1).
//!
//! Builds the global symbol table from every parsed unit. Errors are accumulated, not
//! thrown (§4.1 "Failure semantics"): the collector always returns a best-effort table, and
//! the pipeline driver (`pipeline.rs`) is the one that halts before C2 if any were fatal.

use hashbrown::HashMap;
use log::{debug, trace};
use smallvec::SmallVec;

use crate::const_eval::{ConstError, ConstEvaluator, ConstValue};
use crate::diag::{Code, DiagnosticBag};
use crate::resolve::{self, ResolveCx, ResolveError};
use crate::span::FileSpan;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{Decl, Unit};
use crate::types::entity::{
  ConstEntity, Entity, EnumEntity, ExtensionEntity, FieldEntity, FuncEntity, FuncTc, FuncTy, PerkEntity,
  PerkImplEntity, PerkMethodSig, StructEntity, SymbolTable, Visibility, VariantEntity,
};
use crate::types::ty::{Ty, TypeParam};
use crate::types::QName;

/// Per-unit index of the declarations it contributed, keyed by declared name, so later passes
/// (and diagnostics) can answer "which unit declared X" without re-scanning every unit.
#[derive(Default, Debug)]
pub struct UnitIndex {
  pub decls_by_unit: HashMap<Symbol, Vec<QName>>,
}

fn vis_of(public: bool) -> Visibility { if public { Visibility::Public } else { Visibility::Private } }

/// Register every declaration from every unit, eagerly evaluating constants, and return the
/// resulting table alongside the per-unit index. Never fails outright; diagnostics land in
/// `bag`.
pub fn collect(units: &[Unit], interner: &Interner, bag: &mut DiagnosticBag) -> (SymbolTable, UnitIndex) {
  let mut table = SymbolTable::new();
  let mut index = UnitIndex::default();
  let mut const_exprs: HashMap<QName, (&crate::types::ast::Expr, FileSpan)> = HashMap::new();
  let mut const_values: HashMap<Symbol, ConstValue> = HashMap::new();

  // Pass 1: register shells (structs/enums/perks/functions) and stash constant expressions
  // for deferred evaluation, so forward references between constants across units resolve.
  for unit in units {
    debug!("C1: registering shells for unit {}", interner.resolve(unit.name));
    for decl in &unit.decls {
      register_shell(unit.name, decl, &mut table, &mut index, bag);
      if let Decl::Const(c) = decl {
        const_exprs.insert(resolve::qname(unit.name, c.name), (&c.value, c.span.clone()));
      }
    }
  }

  // Pass 2: evaluate constants. Simple fixed-point: keep evaluating whatever hasn't been
  // evaluated yet until nothing progresses; a `Circular` error from the evaluator means a
  // genuine cycle, not just "not ready yet".
  let mut pending: Vec<QName> = const_exprs.keys().copied().collect();
  pending.sort_by_key(|q| (q.unit.into_usize(), q.name.into_usize())); // order-stable (§5)
  loop {
    let mut progressed = false;
    let mut still_pending = Vec::new();
    for qn in pending {
      let (expr, span) = const_exprs[&qn];
      let mut ev = ConstEvaluator::new(&const_values);
      match ev.eval_as(qn.name, expr) {
        Ok(v) => { const_values.insert(qn.name, v); progressed = true; }
        Err(ConstError::UnknownConst(_)) => still_pending.push(qn),
        Err(ConstError::Circular(cycle)) => {
          let names = cycle.iter().map(|s| interner.resolve(*s)).collect::<Vec<_>>().join(" -> ");
          bag.error(Code::CircularConstant, span, format!("circular constant definition: {names}"));
        }
        Err(ConstError::NotConst | ConstError::TypeError(_)) => {
          bag.error(Code::NonConstExpression, span, "expression is not a constant expression");
        }
      }
    }
    if !progressed || still_pending.is_empty() { pending = still_pending; break; }
    pending = still_pending;
  }
  // Anything still pending after the fixed point couldn't resolve its referenced constants —
  // either a genuine forward reference to a never-defined name, which is also non-const.
  for qn in pending {
    let (_, span) = const_exprs[&qn];
    bag.error(Code::NonConstExpression, span, "constant refers to an undefined constant");
  }

  // Pass 3: finalize const entities now that every evaluable constant has a value, and
  // resolve field/signature types now that every struct/enum shell is registered.
  let finalized = finalize_const_entities(units, &const_values, interner);
  for (qn, entity) in finalized { table.entities.insert(qn, entity); }

  resolve_structs_and_enums(units, &mut table, &const_values, interner, bag);
  resolve_impls_and_extensions(units, &mut table, &const_values, interner, bag);
  resolve_function_signatures(units, &mut table, &const_values, interner, bag);
  check_infinite_size(&table, interner, bag);

  (table, index)
}

/// Resolve every function/method signature into a [`FuncTy`], applying §4.7's implicit
/// `Result<T, E>` wrapping, and set `FuncTc::Typed` on the corresponding entity. Until this
/// runs, every function sits at `FuncTc::ForwardDeclared` — later passes (C4's monomorphizer,
/// C5's lowerer) read `FuncTc::Typed` to know a function's true (post-wrapping) return type.
fn resolve_function_signatures(
  units: &[Unit], table: &mut SymbolTable, const_values: &HashMap<Symbol, ConstValue>,
  interner: &Interner, bag: &mut DiagnosticBag,
) {
  let mut resolved: Vec<(QName, FuncTy)> = Vec::new();
  for unit in units {
    for decl in &unit.decls {
      match decl {
        Decl::Function(f) => resolve_one_signature(unit.name, f, table, const_values, interner, bag, &mut resolved),
        Decl::Struct(s) => for m in &s.methods { resolve_one_signature(unit.name, m, table, const_values, interner, bag, &mut resolved); }
        Decl::Enum(e) => for m in &e.methods { resolve_one_signature(unit.name, m, table, const_values, interner, bag, &mut resolved); }
        Decl::Impl(i) => for m in &i.methods { resolve_one_signature(unit.name, m, table, const_values, interner, bag, &mut resolved); }
        Decl::Extension(x) => for m in &x.methods { resolve_one_signature(unit.name, m, table, const_values, interner, bag, &mut resolved); }
        Decl::Const(_) | Decl::Perk(_) | Decl::Use(_) => {}
      }
    }
  }
  for (qn, fty) in resolved {
    if let Some(Entity::Func(f)) = table.entities.get_mut(&qn) { f.tc = FuncTc::Typed(fty); }
  }
}

/// Resolve one function/method signature into a `(QName, FuncTy)` pair appended to `out`,
/// skipping it silently on an unresolvable type (the caller already reported the diagnostic).
/// `pub(crate)` so `pipeline.rs` can reuse it to type C4's monomorphized function clones,
/// which land in the table at `FuncTc::ForwardDeclared` just like any other fresh shell.
pub(crate) fn resolve_one_signature(
  unit: Symbol, fdecl: &crate::types::ast::FunctionDecl, table: &SymbolTable,
  const_values: &HashMap<Symbol, ConstValue>, interner: &Interner, bag: &mut DiagnosticBag,
  out: &mut Vec<(QName, FuncTy)>,
) {
  let sig = &fdecl.sig;
  let qn = resolve::qname(unit, sig.name);
  let params: Vec<Symbol> = sig.type_params.iter().map(|p| p.name).collect();
  let cx = ResolveCx { unit, type_params: &params, symtab: table, consts: const_values, interner };

  let mut resolved_params = Vec::with_capacity(sig.params.len());
  let mut ok = true;
  for p in &sig.params {
    match resolve::resolve_type(&cx, &p.ty) {
      Ok(ty) => resolved_params.push((p.name, ty)),
      Err(_) => { bag.error(Code::UnresolvedPath, p.span.clone(), "could not resolve parameter type"); ok = false; }
    }
  }
  let Some(ret) = resolve_true_return(&cx, &sig.ret, &fdecl.span, bag) else { return };
  if !ok { return; }

  let type_params = sig.type_params.iter()
    .map(|p| TypeParam { name: p.name, bounds: p.bounds.iter().map(|b| resolve::qname(unit, *b)).collect() })
    .collect();
  out.push((qn, FuncTy { type_params, params: resolved_params, ret }));
}

/// Resolve a declared return type into its *true* type (§4.7): `Result<T, E>`/`T | E` are used
/// as declared, and a bare `T` implicitly becomes `Result<T, StdError>`. Nesting either form
/// inside another wrapping is rejected as `DoubleWrappedResult` regardless of which form was
/// used to write it.
fn resolve_true_return(cx: &ResolveCx<'_>, ret: &crate::types::ast::TypeExpr, span: &FileSpan, bag: &mut DiagnosticBag) -> Option<Ty> {
  match resolve::resolve_type(cx, ret) {
    Ok(ty) if ty.is_result() => Some(ty),
    Ok(ty) => Some(Ty::Builtin(crate::types::ty::Builtin::Result(Box::new(ty), Box::new(resolve::std_error_ty())))),
    Err(ResolveError::DoubleWrapped) => {
      bag.error(Code::DoubleWrappedResult, span.clone(), "a `Result`/`T | E` return type can't wrap another `Result`/`T | E`");
      None
    }
    Err(_) => {
      bag.error(Code::UnresolvedPath, span.clone(), "could not resolve return type");
      None
    }
  }
}

fn finalize_const_entities(
  units: &[Unit],
  const_values: &HashMap<Symbol, ConstValue>,
  _interner: &Interner,
) -> Vec<(QName, Entity)> {
  let mut out = Vec::new();
  for unit in units {
    for decl in &unit.decls {
      if let Decl::Const(c) = decl {
        let qn = resolve::qname(unit.name, c.name);
        if let Some(v) = const_values.get(&c.name) {
          out.push((qn, Entity::Const(ConstEntity {
            qname: qn, vis: vis_of(c.public), ty: v.ty(), value: v.clone(), span: c.span.clone(),
          })));
        }
      }
    }
  }
  out
}

fn register_shell(unit: Symbol, decl: &Decl, table: &mut SymbolTable, index: &mut UnitIndex, bag: &mut DiagnosticBag) {
  match decl {
    Decl::Function(f) => {
      let qn = resolve::qname(unit, f.sig.name);
      if !insert_unique(&mut table.func_names, (unit, f.sig.name), qn, bag, f.span.clone()) { return; }
      index.decls_by_unit.entry(unit).or_default().push(qn);
      table.entities.insert(qn, Entity::Func(FuncEntity {
        qname: qn, vis: vis_of(f.sig.public), tc: FuncTc::ForwardDeclared, body: f.clone(),
        is_entry_point: false, mono_origin: None,
      }));
    }
    Decl::Struct(s) => {
      let qn = resolve::qname(unit, s.name);
      if !insert_unique(&mut table.type_names, (unit, s.name), qn, bag, s.span.clone()) { return; }
      index.decls_by_unit.entry(unit).or_default().push(qn);
      let method_qnames: SmallVec<[QName; 4]> = s.methods.iter().map(|m| resolve::qname(unit, m.sig.name)).collect();
      table.entities.insert(qn, Entity::Struct(StructEntity {
        qname: qn, vis: vis_of(s.public), type_params: Vec::new(), fields: Vec::new(),
        methods: method_qnames, span: s.span.clone(), mono_origin: None,
      }));
      for m in &s.methods { register_method_shell(unit, m, table, index, bag); }
    }
    Decl::Enum(e) => {
      let qn = resolve::qname(unit, e.name);
      if !insert_unique(&mut table.type_names, (unit, e.name), qn, bag, e.span.clone()) { return; }
      index.decls_by_unit.entry(unit).or_default().push(qn);
      let method_qnames: SmallVec<[QName; 4]> = e.methods.iter().map(|m| resolve::qname(unit, m.sig.name)).collect();
      table.entities.insert(qn, Entity::Enum(EnumEntity {
        qname: qn, vis: vis_of(e.public), type_params: Vec::new(), variants: Vec::new(),
        methods: method_qnames, span: e.span.clone(), mono_origin: None,
      }));
      for m in &e.methods { register_method_shell(unit, m, table, index, bag); }
    }
    Decl::Perk(p) => {
      let qn = resolve::qname(unit, p.name);
      if !insert_unique(&mut table.perk_names, (unit, p.name), qn, bag, p.span.clone()) { return; }
      index.decls_by_unit.entry(unit).or_default().push(qn);
      table.entities.insert(qn, Entity::Perk(PerkEntity {
        qname: qn, vis: vis_of(p.public),
        methods: p.methods.iter().map(|s| PerkMethodSig { name: s.name, params: Vec::new(), ret: Ty::UNIT }).collect(),
        span: p.span.clone(),
      }));
    }
    Decl::Impl(i) => {
      for m in &i.methods { register_method_shell(unit, m, table, index, bag); }
    }
    Decl::Extension(x) => {
      for m in &x.methods { register_method_shell(unit, m, table, index, bag); }
    }
    Decl::Const(_) | Decl::Use(_) => {
      // Constants are handled by the two-pass evaluator above; `use` is observed only as an
      // ordering signal the external loader already resolved (§6).
    }
  }
}

/// Register a method's [`FuncEntity`] shell under its bare name scoped to the unit, same as a
/// free function (C1-level duplicate detection sees it this way, mirroring the teacher's flat
/// per-unit `Entity` registry). The call-site mangling in `lower.rs` (`m__<ReceiverType>`) and
/// C4's `clone_methods` apply to generic instantiations; a concrete owner's method keeps its
/// bare declared name as its callable identity.
fn register_method_shell(
  unit: Symbol, m: &crate::types::ast::FunctionDecl,
  table: &mut SymbolTable, index: &mut UnitIndex, bag: &mut DiagnosticBag,
) {
  let qn = resolve::qname(unit, m.sig.name);
  if table.func_names.contains_key(&(unit, m.sig.name)) { return; } // collision reported via owner struct/enum instead
  table.func_names.insert((unit, m.sig.name), qn);
  index.decls_by_unit.entry(unit).or_default().push(qn);
  table.entities.insert(qn, Entity::Func(FuncEntity {
    qname: qn, vis: Visibility::Public, tc: FuncTc::ForwardDeclared, body: m.clone(), is_entry_point: false,
    mono_origin: None,
  }));
}

fn insert_unique(
  map: &mut HashMap<(Symbol, Symbol), QName>, key: (Symbol, Symbol), qn: QName,
  bag: &mut DiagnosticBag, span: FileSpan,
) -> bool {
  if map.contains_key(&key) {
    bag.error(Code::DuplicateSymbol, span, "a declaration with this qualified name already exists");
    return false;
  }
  map.insert(key, qn);
  true
}

fn resolve_structs_and_enums(
  units: &[Unit], table: &mut SymbolTable, const_values: &HashMap<Symbol, ConstValue>,
  interner: &Interner, bag: &mut DiagnosticBag,
) {
  for unit in units {
    for decl in &unit.decls {
      match decl {
        Decl::Struct(s) => {
          let qn = resolve::qname(unit.name, s.name);
          let params: Vec<Symbol> = s.type_params.iter().map(|p| p.name).collect();
          let cx = ResolveCx { unit: unit.name, type_params: &params, symtab: table, consts: const_values, interner };
          let mut fields = Vec::new();
          for f in &s.fields {
            match resolve::resolve_type(&cx, &f.ty) {
              Ok(ty) if resolve::contains_ref(&ty) => bag.error(
                Code::ReferenceEscapesStorage, f.span.clone(),
                "a reference cannot be stored in a struct field; borrows may only live in parameters and temporaries",
              ),
              Ok(ty) => fields.push(FieldEntity { name: f.name, ty }),
              Err(_) => bag.error(Code::UnresolvedPath, f.span.clone(), "could not resolve field type"),
            }
          }
          let type_params = s.type_params.iter()
            .map(|p| TypeParam { name: p.name, bounds: p.bounds.iter().map(|b| resolve::qname(unit.name, *b)).collect() })
            .collect();
          if let Some(Entity::Struct(e)) = table.entities.get_mut(&qn) { e.fields = fields; e.type_params = type_params; }
        }
        Decl::Enum(e) => {
          let qn = resolve::qname(unit.name, e.name);
          let params: Vec<Symbol> = e.type_params.iter().map(|p| p.name).collect();
          let cx = ResolveCx { unit: unit.name, type_params: &params, symtab: table, consts: const_values, interner };
          let mut variants = Vec::new();
          for v in &e.variants {
            let mut payload = Vec::with_capacity(v.payload.len());
            for t in &v.payload {
              match resolve::resolve_type(&cx, t) {
                Ok(ty) if resolve::contains_ref(&ty) => bag.error(
                  Code::ReferenceEscapesStorage, v.span.clone(),
                  "a reference cannot be stored in an enum-variant payload; borrows may only live in parameters and temporaries",
                ),
                Ok(ty) => payload.push(ty),
                Err(_) => bag.error(Code::UnresolvedPath, v.span.clone(), "could not resolve variant payload type"),
              }
            }
            variants.push(VariantEntity { name: v.name, payload });
          }
          let type_params = e.type_params.iter()
            .map(|p| TypeParam { name: p.name, bounds: p.bounds.iter().map(|b| resolve::qname(unit.name, *b)).collect() })
            .collect();
          if let Some(Entity::Enum(en)) = table.entities.get_mut(&qn) { en.variants = variants; en.type_params = type_params; }
        }
        _ => {}
      }
    }
  }
  trace!("C1: resolved {} struct/enum field types", table.entities.len());
}

/// Build the `PerkImpl`/`Extension` entities the global symbol table owns alongside every
/// other declaration (§3 "Symbols": "perk implementations (type × perk → method table),
/// extensions (receiver type pattern + method set)"). Runs after struct/enum field resolution
/// so a receiver type naming another declared struct/enum resolves cleanly, and before
/// function-signature resolution so C4/C7's perk-bound checks (`satisfies_perk`,
/// `satisfies_builtin_perk`) see every registered implementation.
fn resolve_impls_and_extensions(
  units: &[Unit], table: &mut SymbolTable, const_values: &HashMap<Symbol, ConstValue>,
  interner: &Interner, bag: &mut DiagnosticBag,
) {
  let mut built: Vec<(QName, Entity)> = Vec::new();
  for unit in units {
    for decl in &unit.decls {
      match decl {
        Decl::Impl(i) => {
          let cx = ResolveCx { unit: unit.name, type_params: &[], symtab: table, consts: const_values, interner };
          let Ok(receiver) = resolve::resolve_type(&cx, &i.receiver) else {
            bag.error(Code::UnresolvedPath, i.span.clone(), "could not resolve impl receiver type");
            continue;
          };
          let Some(perk) = resolve_perk_qname(unit.name, i.perk, table) else {
            bag.error(Code::UnresolvedPath, i.span.clone(), "impl refers to an undeclared perk");
            continue;
          };
          let methods = i.methods.iter().map(|m| (m.sig.name, resolve::qname(unit.name, m.sig.name))).collect();
          let qn = QName::new(unit.name, synthetic_name(i.id));
          built.push((qn, Entity::PerkImpl(PerkImplEntity { perk, receiver, methods, span: i.span.clone() })));
        }
        Decl::Extension(x) => {
          let cx = ResolveCx { unit: unit.name, type_params: &[], symtab: table, consts: const_values, interner };
          let Ok(receiver) = resolve::resolve_type(&cx, &x.receiver) else {
            bag.error(Code::UnresolvedPath, x.span.clone(), "could not resolve extension receiver type");
            continue;
          };
          let methods = x.methods.iter().map(|m| (m.sig.name, resolve::qname(unit.name, m.sig.name))).collect();
          let qn = QName::new(unit.name, synthetic_name(x.id));
          built.push((qn, Entity::Extension(ExtensionEntity { receiver, methods, span: x.span.clone() })));
        }
        _ => {}
      }
    }
  }
  trace!("C1: registered {} perk impl/extension entities", built.len());
  for (qn, entity) in built { table.entities.insert(qn, entity); }
}

/// An impl/extension block has no declared name of its own, so it needs a synthetic `QName`
/// to live in `table.entities` alongside named declarations. Offsets the parser's `NodeId`
/// (already unique per AST node) well past any realistic `Interner` index so it can never
/// collide with a real declaration's name symbol; nothing ever resolves this symbol back to
/// a string since neither entity stores its own qname.
fn synthetic_name(id: crate::types::NodeId) -> Symbol { Symbol::from_usize(1_000_000_000 + id.0 as usize) }

fn resolve_perk_qname(unit: Symbol, perk: Symbol, table: &SymbolTable) -> Option<QName> {
  if let Some(&qn) = table.perk_names.get(&(unit, perk)) { return Some(qn); }
  for (&(_, n), &qn) in &table.perk_names {
    if n == perk { return Some(qn); }
  }
  None
}

/// §8 boundary behavior: `struct Node: i32 value; Own<Node> next` is accepted, but removing
/// the `Own` indirection must be rejected with an infinite-size diagnostic, surfaced at C1.
fn check_infinite_size(table: &SymbolTable, _interner: &Interner, bag: &mut DiagnosticBag) {
  for (qn, entity) in &table.entities {
    let Entity::Struct(s) = entity else { continue };
    let mut seen = std::collections::HashSet::new();
    if has_infinite_cycle(*qn, &s.fields.iter().map(|f| f.ty.clone()).collect::<Vec<_>>(), table, &mut seen) {
      bag.error(Code::InfiniteSizeType, s.span.clone(), "type has infinite size: a struct field recursively contains the struct itself without an intervening `Own<T>`");
    }
  }
}

fn has_infinite_cycle(root: QName, field_tys: &[Ty], table: &SymbolTable, seen: &mut std::collections::HashSet<QName>) -> bool {
  for ty in field_tys {
    if ty_reaches(root, ty, table, seen) { return true; }
  }
  false
}

fn ty_reaches(root: QName, ty: &Ty, table: &SymbolTable, seen: &mut std::collections::HashSet<QName>) -> bool {
  match ty {
    Ty::Nominal(q, _) => {
      if *q == root { return true; }
      if !seen.insert(*q) { return false; }
      if let Some(Entity::Struct(s)) = table.get(q) {
        s.fields.iter().any(|f| ty_reaches(root, &f.ty, table, seen))
      } else { false }
    }
    Ty::FixedArray(elem, _) => ty_reaches(root, elem, table, seen),
    // `Own<T>`, references, dynamic arrays, and other builtins break the cycle: they store an
    // indirection/pointer rather than the value inline (§8 boundary behavior).
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{FileId, FileSpan};
  use crate::symbol::Interner;
  use crate::types::ast::*;
  use crate::types::NodeId;
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }

  fn unit_with_consts(interner: &mut Interner, values: &[(&str, Expr)]) -> Unit {
    let name = interner.intern("main");
    let decls = values.iter().map(|(n, e)| {
      Decl::Const(ConstDecl {
        id: NodeId(0), name: interner.intern(n),
        ty: TypeExpr::Primitive(PrimitiveName::I32), value: e.clone(), public: false, span: sp(),
      })
    }).collect();
    Unit { name, decls, source: String::new() }
  }

  fn int(v: i128) -> Expr { Expr { id: NodeId(0), kind: ExprKind::Literal(Literal::Int(v)), span: sp() } }
  fn var(interner: &mut Interner, s: &str) -> Expr { Expr { id: NodeId(0), kind: ExprKind::Var(interner.intern(s)), span: sp() } }
  fn mul(a: Expr, b: Expr) -> Expr { Expr { id: NodeId(0), kind: ExprKind::Binary(BinOp::Mul, Box::new(a), Box::new(b)), span: sp() } }

  #[test]
  fn evaluates_forward_and_backward_const_references() {
    let mut interner = Interner::new();
    let base = var(&mut interner, "BASE");
    let values = vec![
      ("BASE", int(10)),
      ("DOUBLE", mul(base.clone(), int(2))),
    ];
    let unit = unit_with_consts(&mut interner, &values);
    let mut bag = DiagnosticBag::new();
    let (table, _) = collect(&[unit], &interner, &mut bag);
    assert!(!bag.has_errors());
    let double = resolve::qname(interner.intern("main"), interner.intern("DOUBLE"));
    match table.get(&double) {
      Some(Entity::Const(c)) => assert_eq!(c.value, crate::const_eval::ConstValue::Int(20, crate::types::ty::Prim::I32)),
      _ => panic!("expected DOUBLE to be a resolved const entity"),
    }
  }

  #[test]
  fn circular_constant_is_reported() {
    let mut interner = Interner::new();
    let a = var(&mut interner, "B");
    let b = var(&mut interner, "A");
    let unit = unit_with_consts(&mut interner, &[("A", a), ("B", b)]);
    let mut bag = DiagnosticBag::new();
    let (_, _) = collect(&[unit], &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::CircularConstant));
  }

  #[test]
  fn duplicate_function_name_is_reported() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let f = interner.intern("f");
    let sig = Signature { name: f, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::Unit), public: false };
    let func = FunctionDecl { id: NodeId(0), sig, body: Block::default(), span: sp() };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(func.clone()), Decl::Function(func)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    collect(&[unit], &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::DuplicateSymbol));
  }

  #[test]
  fn struct_field_typed_as_a_reference_is_rejected() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let s = interner.intern("Holder");
    let field = interner.intern("inner");
    let decl = StructDecl {
      id: NodeId(0), name: s, type_params: vec![],
      fields: vec![FieldDecl {
        name: field,
        ty: TypeExpr::Ref(BorrowMode::Peek, Box::new(TypeExpr::Primitive(PrimitiveName::I32))),
        span: sp(),
      }],
      methods: vec![], public: true, span: sp(),
    };
    let unit = Unit { name: unit_name, decls: vec![Decl::Struct(decl)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    collect(&[unit], &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::ReferenceEscapesStorage));
  }

  #[test]
  fn enum_variant_payload_typed_as_a_reference_is_rejected() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let e = interner.intern("Holder");
    let variant = interner.intern("Wrapped");
    let decl = EnumDecl {
      id: NodeId(0), name: e, type_params: vec![],
      variants: vec![VariantDecl {
        name: variant,
        payload: vec![TypeExpr::Ref(BorrowMode::Poke, Box::new(TypeExpr::Primitive(PrimitiveName::I32)))],
        span: sp(),
      }],
      methods: vec![], public: true, span: sp(),
    };
    let unit = Unit { name: unit_name, decls: vec![Decl::Enum(decl)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    collect(&[unit], &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::ReferenceEscapesStorage));
  }

  #[test]
  fn bare_return_type_is_implicitly_wrapped_in_result() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let f = interner.intern("f");
    let sig = Signature { name: f, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::I32), public: false };
    let func = FunctionDecl { id: NodeId(0), sig, body: Block::default(), span: sp() };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(func)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    let (table, _) = collect(&[unit], &interner, &mut bag);
    assert!(!bag.has_errors());
    let qn = resolve::qname(unit_name, f);
    match table.get(&qn) {
      Some(Entity::Func(fe)) => match &fe.tc {
        FuncTc::Typed(fty) => assert!(fty.ret.is_result()),
        FuncTc::ForwardDeclared => panic!("expected signature resolution to type the function"),
      },
      _ => panic!("expected a function entity"),
    }
  }

  #[test]
  fn explicit_result_return_type_is_used_as_declared() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let f = interner.intern("f");
    let ret = TypeExpr::ResultShorthand(
      Box::new(TypeExpr::Primitive(PrimitiveName::I32)),
      Box::new(TypeExpr::Primitive(PrimitiveName::Str)),
    );
    let sig = Signature { name: f, type_params: vec![], params: vec![], ret, public: false };
    let func = FunctionDecl { id: NodeId(0), sig, body: Block::default(), span: sp() };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(func)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    let (table, _) = collect(&[unit], &interner, &mut bag);
    assert!(!bag.has_errors());
    let qn = resolve::qname(unit_name, f);
    match table.get(&qn) {
      Some(Entity::Func(fe)) => match &fe.tc {
        FuncTc::Typed(fty) => assert!(matches!(&fty.ret, Ty::Builtin(crate::types::ty::Builtin::Result(t, e))
          if matches!(**t, Ty::Primitive(crate::types::ty::Prim::I32)) && matches!(**e, Ty::Primitive(crate::types::ty::Prim::Str)))),
        FuncTc::ForwardDeclared => panic!("expected signature resolution to type the function"),
      },
      _ => panic!("expected a function entity"),
    }
  }

  #[test]
  fn double_wrapped_result_return_type_is_an_error() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let f = interner.intern("f");
    let inner = TypeExpr::ResultShorthand(
      Box::new(TypeExpr::Primitive(PrimitiveName::I32)),
      Box::new(TypeExpr::Primitive(PrimitiveName::Str)),
    );
    let ret = TypeExpr::ExplicitResult(Box::new(inner), Box::new(TypeExpr::Primitive(PrimitiveName::Str)));
    let sig = Signature { name: f, type_params: vec![], params: vec![], ret, public: false };
    let func = FunctionDecl { id: NodeId(0), sig, body: Block::default(), span: sp() };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(func)], source: String::new() };
    let mut bag = DiagnosticBag::new();
    collect(&[unit], &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::DoubleWrappedResult));
  }

  #[test]
  fn perk_impl_is_registered_with_its_receiver_and_methods() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let perk_name = interner.intern("Greet");
    let struct_name = interner.intern("Point");
    let method_name = interner.intern("greet");

    let perk = Decl::Perk(PerkDecl {
      id: NodeId(0), name: perk_name,
      methods: vec![Signature {
        name: method_name, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
      }],
      public: true, span: sp(),
    });
    let strukt = Decl::Struct(StructDecl {
      id: NodeId(1), name: struct_name, type_params: vec![], fields: vec![], methods: vec![], public: true, span: sp(),
    });
    let method_sig = Signature {
      name: method_name, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
    };
    let method = FunctionDecl { id: NodeId(2), sig: method_sig, body: Block::default(), span: sp() };
    let imp = Decl::Impl(ImplDecl {
      id: NodeId(3), perk: perk_name, receiver: TypeExpr::Nominal(struct_name, vec![]), methods: vec![method], span: sp(),
    });

    let unit = Unit { name: unit_name, decls: vec![perk, strukt, imp], source: String::new() };
    let mut bag = DiagnosticBag::new();
    let (table, _) = collect(&[unit], &interner, &mut bag);
    assert!(!bag.has_errors());

    let struct_qn = resolve::qname(unit_name, struct_name);
    let perk_qn = resolve::qname(unit_name, perk_name);
    let method_qn = resolve::qname(unit_name, method_name);
    let found = table.entities.values().any(|e| matches!(e, Entity::PerkImpl(pi)
      if pi.perk == perk_qn
        && pi.receiver == Ty::Nominal(struct_qn, Vec::new())
        && pi.methods.get(&method_name) == Some(&method_qn)));
    assert!(found, "expected a PerkImpl entity for `impl Greet for Point`");
  }

  #[test]
  fn extension_is_registered_with_its_receiver_and_methods() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let struct_name = interner.intern("Point");
    let method_name = interner.intern("doubled");

    let strukt = Decl::Struct(StructDecl {
      id: NodeId(0), name: struct_name, type_params: vec![], fields: vec![], methods: vec![], public: true, span: sp(),
    });
    let method_sig = Signature {
      name: method_name, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
    };
    let method = FunctionDecl { id: NodeId(1), sig: method_sig, body: Block::default(), span: sp() };
    let ext = Decl::Extension(ExtensionDecl {
      id: NodeId(2), receiver: TypeExpr::Nominal(struct_name, vec![]), methods: vec![method], span: sp(),
    });

    let unit = Unit { name: unit_name, decls: vec![strukt, ext], source: String::new() };
    let mut bag = DiagnosticBag::new();
    let (table, _) = collect(&[unit], &interner, &mut bag);
    assert!(!bag.has_errors());

    let struct_qn = resolve::qname(unit_name, struct_name);
    let method_qn = resolve::qname(unit_name, method_name);
    let found = table.entities.values().any(|e| matches!(e, Entity::Extension(ext)
      if ext.receiver == Ty::Nominal(struct_qn, Vec::new())
        && ext.methods.get(&method_name) == Some(&method_qn)));
    assert!(found, "expected an Extension entity for `extend Point`");
  }
}
