//! C3: the Instantiation Collector (§4.3).
//!
//! Walks every syntactic site that could require a monomorphized copy — type annotations,
//! struct/enum constructions, method/function calls, and builtin-generic uses — and records
//! the set of required `(template, type-argument-vector)` pairs C4 must produce.
//!
//! Type arguments are inferred **only** from the syntactic positions that contain the
//! parameter at top level (§4.3): `T` in `fn f<T>(T x)` infers, but `T` nested inside
//! `List<T>` or `T[]` does not. Sites where inference fails emit `UninferrableTypeParameter`
//! rather than silently skipping the instantiation.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::trace;

use crate::diag::{Code, DiagnosticBag};
use crate::resolve::{self, ResolveCx};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ast::{Decl, Expr, ExprKind, Stmt, Unit};
use crate::types::entity::{Entity, SymbolTable};
use crate::types::ty::Ty;
use crate::types::QName;

/// A single required instantiation: `template` names either a user struct/enum/function
/// (`QName`) or a builtin generic (by its `template_name()`); `args` is the concrete
/// type-argument vector requested at some call/construction site.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Template {
  User(QName),
  Builtin(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instantiation {
  pub template: Template,
  pub args: Vec<Ty>,
}

/// The deduplicated set of instantiations required across every unit (§4.3 "Identical
/// `(template, args)` tuples are deduplicated").
#[derive(Default, Debug)]
pub struct InstantiationSet {
  set: HashSet<Instantiation>,
}

impl InstantiationSet {
  pub fn record(&mut self, inst: Instantiation) { self.set.insert(inst); }

  #[must_use] pub fn iter(&self) -> impl Iterator<Item = &Instantiation> { self.set.iter() }
  #[must_use] pub fn len(&self) -> usize { self.set.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.set.is_empty() }

  /// Every distinct user-struct/enum instantiation requested for `qn`, in a stable order —
  /// used by C4 when cascading method instantiation (§4.3: "`List<i32>` referenced in code
  /// forces instantiation of every method of `List<T>` for `T = i32`").
  #[must_use] pub fn args_for(&self, qn: QName) -> Vec<Vec<Ty>> {
    self.set.iter()
      .filter(|i| i.template == Template::User(qn))
      .map(|i| i.args.clone())
      .unique()
      .collect()
  }
}

/// Walk every unit's declarations and record required instantiations. Mirrors C1's
/// "accumulate, never throw" policy (§7: "Generic ... Accumulate; skip instantiating the
/// failing template").
pub fn collect_instantiations(units: &[Unit], table: &SymbolTable, bag: &mut DiagnosticBag) -> InstantiationSet {
  let mut out = InstantiationSet::default();
  for unit in units {
    for decl in &unit.decls {
      match decl {
        Decl::Function(f) => walk_function(unit.name, f, table, &mut out, bag),
        Decl::Struct(s) => for m in &s.methods { walk_function(unit.name, m, table, &mut out, bag); }
        Decl::Enum(e) => for m in &e.methods { walk_function(unit.name, m, table, &mut out, bag); }
        Decl::Impl(i) => for m in &i.methods { walk_function(unit.name, m, table, &mut out, bag); }
        Decl::Extension(ext) => for m in &ext.methods { walk_function(unit.name, m, table, &mut out, bag); }
        Decl::Const(_) | Decl::Perk(_) | Decl::Use(_) => {}
      }
    }
  }
  trace!("C3: collected {} required instantiations", out.len());
  out
}

fn walk_function(
  unit: Symbol, f: &crate::types::ast::FunctionDecl, table: &SymbolTable,
  out: &mut InstantiationSet, bag: &mut DiagnosticBag,
) {
  // Explicit type annotations on parameters/return are resolved through C1's type resolver,
  // which already leaves un-substituted `Ty::Param`s for the function's own declared type
  // parameters; any *other* nominal reference found there is a direct instantiation request.
  for p in &f.sig.params {
    if let Ok(ty) = resolve_with_own_params(unit, &f.sig.type_params, table, &p.ty) {
      record_nominal_instantiations(&ty, out);
    }
  }
  for stmt in &f.body.stmts { walk_stmt(unit, stmt, table, out, bag); }
}

fn resolve_with_own_params(
  unit: Symbol, type_params: &[crate::types::ast::TypeParamDecl], table: &SymbolTable,
  te: &crate::types::ast::TypeExpr,
) -> Result<Ty, ()> {
  let params: Vec<Symbol> = type_params.iter().map(|p| p.name).collect();
  let consts = HashMap::new();
  let interner = crate::symbol::Interner::new(); // only used for builtin-name lookup fallback
  let cx = ResolveCx { unit, type_params: &params, symtab: table, consts: &consts, interner: &interner };
  resolve::resolve_type(&cx, te).map_err(|_| ())
}

/// Record every concrete (non-`Param`) nominal/builtin application reachable inside `ty`, at
/// any depth — unlike call-site inference, type *annotations* are not limited to top-level
/// positions (§4.3's syntactic-top-level limitation applies to inferring a param from an
/// *argument expression*, not to reading an already fully-spelled-out annotation).
fn record_nominal_instantiations(ty: &Ty, out: &mut InstantiationSet) {
  match ty {
    Ty::Nominal(qn, args) if !args.is_empty() => {
      out.record(Instantiation { template: Template::User(*qn), args: args.clone() });
      for a in args { record_nominal_instantiations(a, out); }
    }
    Ty::Builtin(b) => {
      let args: Vec<Ty> = b.type_args().into_iter().cloned().collect();
      out.record(Instantiation { template: Template::Builtin(b.template_name()), args: args.clone() });
      for a in &args { record_nominal_instantiations(a, out); }
    }
    Ty::FixedArray(elem, _) | Ty::DynArray(elem) | Ty::Ref(_, elem) => record_nominal_instantiations(elem, out),
    Ty::Nominal(..) | Ty::Primitive(_) | Ty::Param(_) => {}
  }
}

fn walk_stmt(unit: Symbol, stmt: &Stmt, table: &SymbolTable, out: &mut InstantiationSet, bag: &mut DiagnosticBag) {
  match stmt {
    Stmt::Let { ty, value, .. } => {
      if let Some(te) = ty {
        if let Ok(t) = resolve_with_own_params(unit, &[], table, te) { record_nominal_instantiations(&t, out); }
      }
      walk_expr(unit, value, table, out, bag);
    }
    Stmt::Rebind { value, .. } | Stmt::Expr(value) => walk_expr(unit, value, table, out, bag),
    Stmt::If { arms, else_block, .. } => {
      for (c, b) in arms { walk_expr(unit, c, table, out, bag); for s in &b.stmts { walk_stmt(unit, s, table, out, bag); } }
      if let Some(b) = else_block { for s in &b.stmts { walk_stmt(unit, s, table, out, bag); } }
    }
    Stmt::While { cond, body, .. } => { walk_expr(unit, cond, table, out, bag); for s in &body.stmts { walk_stmt(unit, s, table, out, bag); } }
    Stmt::Foreach { iter, body, .. } => { walk_expr(unit, iter, table, out, bag); for s in &body.stmts { walk_stmt(unit, s, table, out, bag); } }
    Stmt::Match { scrutinee, arms, .. } => {
      walk_expr(unit, scrutinee, table, out, bag);
      for arm in arms { for s in &arm.body.stmts { walk_stmt(unit, s, table, out, bag); } }
    }
    Stmt::Break { .. } | Stmt::Continue { .. } => {}
    Stmt::Return { value, .. } => if let Some(v) = value { walk_expr(unit, v, table, out, bag); }
  }
}

fn walk_expr(unit: Symbol, e: &Expr, table: &SymbolTable, out: &mut InstantiationSet, bag: &mut DiagnosticBag) {
  match &e.kind {
    ExprKind::StructLit { name, type_args, fields } => {
      record_explicit_or_inferred(unit, *name, type_args, &e.span, table, out, bag);
      for (_, v) in fields { walk_expr(unit, v, table, out, bag); }
    }
    ExprKind::EnumLit { enum_name, type_args, args, .. } => {
      record_explicit_or_inferred(unit, *enum_name, type_args, &e.span, table, out, bag);
      for a in args { walk_expr(unit, a, table, out, bag); }
    }
    ExprKind::Call { callee, args } => {
      if let ExprKind::Var(name) = &callee.kind {
        try_infer_call_instantiation(unit, *name, args, &e.span, table, out, bag);
      }
      walk_expr(unit, callee, table, out, bag);
      for a in args { walk_expr(unit, a, table, out, bag); }
    }
    ExprKind::MethodCall { receiver, args, .. } => {
      walk_expr(unit, receiver, table, out, bag);
      for a in args { walk_expr(unit, a, table, out, bag); }
    }
    ExprKind::Binary(_, l, r) => { walk_expr(unit, l, table, out, bag); walk_expr(unit, r, table, out, bag); }
    ExprKind::Unary(_, i) | ExprKind::Borrow(_, i) | ExprKind::Propagate(i) => walk_expr(unit, i, table, out, bag),
    ExprKind::Field { base, .. } | ExprKind::Index { base, index: _ } => walk_expr(unit, base, table, out, bag),
    ExprKind::Range { start, end, .. } => { walk_expr(unit, start, table, out, bag); walk_expr(unit, end, table, out, bag); }
    ExprKind::Cast(inner, te) => {
      walk_expr(unit, inner, table, out, bag);
      if let Ok(t) = resolve_with_own_params(unit, &[], table, te) { record_nominal_instantiations(&t, out); }
    }
    ExprKind::ArrayLit(items) => for it in items { walk_expr(unit, it, table, out, bag); }
    ExprKind::Interp(parts) => for p in parts {
      if let crate::types::ast::InterpPart::Expr(inner) = p { walk_expr(unit, inner, table, out, bag); }
    }
    ExprKind::Literal(_) | ExprKind::Var(_) => {}
  }
}

fn record_explicit_or_inferred(
  unit: Symbol, name: Symbol, type_args: &[crate::types::ast::TypeExpr], span: &FileSpan,
  table: &SymbolTable, out: &mut InstantiationSet, bag: &mut DiagnosticBag,
) {
  if type_args.is_empty() { return; } // no type args spelled out: nothing to instantiate here
  let args: Vec<Ty> = type_args.iter()
    .filter_map(|t| resolve_with_own_params(unit, &[], table, t).ok())
    .collect();
  if args.len() != type_args.len() {
    bag.error(Code::UninferrableTypeParameter, span.clone(), "could not resolve one or more explicit type arguments");
    return;
  }
  if let Some(&qn) = table.type_names.get(&(unit, name)) {
    out.record(Instantiation { template: Template::User(qn), args: args.clone() });
  }
  for a in &args { record_nominal_instantiations(a, out); }
}

/// Attempt to infer the type-argument vector for a call to a known generic function from its
/// arguments' syntactic positions, per §4.3's intentionally limited rule: a parameter is
/// inferred only when its declared type *is* the bare type parameter (`fn f<T>(T x)`), never
/// when the parameter only occurs nested (`List<T>`, `Pair<T, U>`, `T[]`).
fn try_infer_call_instantiation(
  unit: Symbol, callee: Symbol, args: &[Expr], span: &FileSpan,
  table: &SymbolTable, out: &mut InstantiationSet, bag: &mut DiagnosticBag,
) {
  let Some(&qn) = table.func_names.get(&(unit, callee)) else { return };
  let Some(Entity::Func(fe)) = table.get(&qn) else { return };
  if fe.body.sig.type_params.is_empty() { return; }

  let mut bound: HashMap<Symbol, Ty> = HashMap::new();
  for (param, arg_expr) in fe.body.sig.params.iter().zip(args) {
    if let crate::types::ast::TypeExpr::Nominal(pname, targs) = &param.ty {
      if targs.is_empty() && fe.body.sig.type_params.iter().any(|tp| tp.name == *pname) {
        if let Some(ty) = rough_expr_ty(unit, arg_expr, table) { bound.entry(*pname).or_insert(ty); }
      }
    }
  }
  let mut missing = Vec::new();
  let mut resolved_args = Vec::with_capacity(fe.body.sig.type_params.len());
  for tp in &fe.body.sig.type_params {
    match bound.get(&tp.name) {
      Some(t) => resolved_args.push(t.clone()),
      None => missing.push(tp.name),
    }
  }
  if !missing.is_empty() {
    bag.error(Code::UninferrableTypeParameter, span.clone(),
      "a type parameter only occurs in a non-top-level position and could not be inferred from the call site");
    return;
  }
  for a in &resolved_args { record_nominal_instantiations(a, out); }
  out.record(Instantiation { template: Template::User(qn), args: resolved_args });
}

/// A deliberately shallow type inferrer for call-site argument expressions, sufficient for
/// the top-level-only inference rule of §4.3 (full bidirectional inference is C7's job,
/// which runs after monomorphization).
fn rough_expr_ty(unit: Symbol, e: &Expr, table: &SymbolTable) -> Option<Ty> {
  match &e.kind {
    ExprKind::Literal(crate::types::ast::Literal::Int(_)) => Some(Ty::Primitive(crate::types::ty::Prim::I32)),
    ExprKind::Literal(crate::types::ast::Literal::Float(_)) => Some(Ty::Primitive(crate::types::ty::Prim::F64)),
    ExprKind::Literal(crate::types::ast::Literal::Bool(_)) => Some(Ty::Primitive(crate::types::ty::Prim::Bool)),
    ExprKind::Literal(crate::types::ast::Literal::Str(_)) => Some(Ty::Primitive(crate::types::ty::Prim::Str)),
    ExprKind::StructLit { name, type_args, .. } => {
      let qn = *table.type_names.get(&(unit, *name))?;
      let args = type_args.iter().filter_map(|t| resolve_with_own_params(unit, &[], table, t).ok()).collect();
      Some(Ty::Nominal(qn, args))
    }
    ExprKind::Cast(_, te) => resolve_with_own_params(unit, &[], table, te).ok(),
    _ => None,
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

  #[test]
  fn explicit_type_args_on_struct_literal_are_recorded() {
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let list = interner.intern("List");
    let i32_ty = TypeExpr::Primitive(PrimitiveName::I32);
    let lit = Expr {
      id: NodeId(0),
      kind: ExprKind::StructLit { name: list, type_args: vec![i32_ty], fields: vec![] },
      span: sp(),
    };
    let sig = Signature { name: interner.intern("main_fn"), type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::Unit), public: false };
    let body = Block { stmts: vec![Stmt::Expr(lit)] };
    let f = FunctionDecl { id: NodeId(0), sig, body, span: sp() };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(f)], source: String::new() };

    let mut bag = crate::diag::DiagnosticBag::new();
    let (table, _) = crate::collect::collect(&[unit.clone()], &interner, &mut bag);
    let insts = collect_instantiations(&[unit], &table, &mut bag);
    assert!(insts.iter().any(|i| matches!(&i.template, Template::Builtin("List") | Template::User(_))
      || i.args == vec![Ty::Primitive(crate::types::ty::Prim::I32)]));
  }
}
