//! C5: the AST Lowerer (§4.5).
//!
//! Rewrites every method/extension call into a free-function call (`x.m(args)` ->
//! `m__<ReceiverType>(x, args)`), desugars range expressions and string interpolation, and
//! requires every `return`'s value to already be an explicit `Result` constructor. The `??`
//! operator is kept structural rather than expanded here: whether it widens a `Maybe` or a
//! `Result` needs C7's inference to settle, so C5 only checks the extension-method
//! restriction and otherwise passes it through (§4.5, §6 output contract).
//!
//! Only concrete functions reach this pass — generic templates are never lowered
//! ([`crate::types::entity::FuncEntity::mono_origin`] doc comment).

use hashbrown::HashMap;
use log::trace;

use crate::diag::{Code, DiagnosticBag};
use crate::mangle;
use crate::span::FileSpan;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{self, Block, Expr, ExprKind, FunctionDecl, InterpPart, Literal, Stmt};
use crate::types::entity::{Entity, FuncTc, SymbolTable};
use crate::types::hir::{HBlock, HExpr, HExprKind, HFunction, HMatchArm, HSignature, HStmt};
use crate::types::linkage::Linkage;
use crate::types::ty::{BorrowMode, Builtin, Prim, Ty};
use crate::types::{NodeId, QName};

/// Lower one concrete function's body into the HIR. `params`/`ret` are the already-resolved
/// types from C1's [`crate::types::entity::FuncTy`] (the *true*, `Result`-wrapped return
/// type); `is_extension` gates the `??`-inside-extension-methods restriction (§4.5, Open
/// Question #3).
pub fn lower_function(
  qname: QName,
  func: &FunctionDecl,
  params: &[(Symbol, Ty)],
  ret: Ty,
  is_extension: bool,
  linkage: Linkage,
  table: &SymbolTable,
  interner: &mut Interner,
  bag: &mut DiagnosticBag,
) -> HFunction {
  trace!("C5: lowering {}", interner.resolve(qname.name));
  let mut lw = Lowerer { table, interner, bag, is_extension, var_types: params.iter().cloned().collect() };
  let body = lw.block(&func.body);
  let sig = HSignature {
    name: qname.name,
    params: params.iter().map(|(n, t)| (*n, t.clone(), borrow_mode_of(t))).collect(),
    ret,
  };
  HFunction { qname, sig, body, linkage }
}

fn borrow_mode_of(t: &Ty) -> Option<BorrowMode> {
  if let Ty::Ref(m, _) = t { Some(*m) } else { None }
}

fn unit_expr(span: FileSpan) -> HExpr {
  HExpr { id: NodeId(0), kind: HExprKind::Literal(Literal::Unit), ty: None, span }
}

struct Lowerer<'a> {
  table: &'a SymbolTable,
  interner: &'a mut Interner,
  bag: &'a mut DiagnosticBag,
  is_extension: bool,
  /// Declared types of in-scope variables, grown as `let`/`foreach` bindings are walked.
  /// Mirrors C2's own rough-type tracking: C5 runs before C7's full inference and only needs
  /// enough information to mangle method-call receivers and range-iterator element types.
  var_types: HashMap<Symbol, Ty>,
}

impl<'a> Lowerer<'a> {
  fn block(&mut self, b: &Block) -> HBlock {
    HBlock { stmts: b.stmts.iter().map(|s| self.stmt(s)).collect() }
  }

  fn stmt(&mut self, s: &Stmt) -> HStmt {
    match s {
      Stmt::Let { name, ty, value, span } => {
        let resolved_ty = ty.as_ref().map_or_else(|| self.rough_ty(value).unwrap_or(Ty::UNIT), |te| self.resolve_cast_ty(te));
        let hvalue = self.expr(value);
        self.var_types.insert(*name, resolved_ty.clone());
        HStmt::Let { name: *name, ty: resolved_ty, value: hvalue, span: span.clone() }
      }
      Stmt::Rebind { name, value, span } => HStmt::Rebind { name: *name, value: self.expr(value), span: span.clone() },
      Stmt::Expr(e) => HStmt::Expr(self.expr(e)),
      Stmt::If { arms, else_block, span } => {
        let arms = arms.iter().map(|(c, blk)| (self.expr(c), self.block(blk))).collect();
        let else_block = else_block.as_ref().map(|b| self.block(b));
        HStmt::If { arms, else_block, span: span.clone() }
      }
      Stmt::While { cond, body, span } => HStmt::While { cond: self.expr(cond), body: self.block(body), span: span.clone() },
      Stmt::Foreach { binding, iter, body, span } => {
        let elem_ty = self.iter_elem_ty(iter);
        let hiter = self.expr(iter);
        self.var_types.insert(*binding, elem_ty);
        HStmt::Foreach { binding: *binding, iter: hiter, body: self.block(body), span: span.clone() }
      }
      Stmt::Match { scrutinee, arms, span } => {
        let hscrutinee = self.expr(scrutinee);
        let harms = arms.iter().map(|arm| HMatchArm {
          pattern: arm.pattern.clone(),
          body: self.block(&arm.body),
          span: arm.span.clone(),
        }).collect();
        HStmt::Match { scrutinee: hscrutinee, arms: harms, span: span.clone() }
      }
      Stmt::Break { span } => HStmt::Break { span: span.clone() },
      Stmt::Continue { span } => HStmt::Continue { span: span.clone() },
      Stmt::Return { value, span } => self.lower_return(value.as_ref(), span),
    }
  }

  /// §4.5: "every `return` is a `Result` constructor" — C5 recognizes the explicit
  /// `Result.Ok(v)`/`Result.Err(e)` surface shape and lowers it to the dedicated HIR node; it
  /// does not silently insert `Ok(...)` around a bare value. A `return` whose value isn't
  /// already shaped as a `Result` constructor is a type error C7 reports precisely (it alone
  /// knows the function's declared error type to phrase the mismatch against).
  fn lower_return(&mut self, value: Option<&Expr>, span: &FileSpan) -> HStmt {
    let Some(v) = value else {
      let inner = unit_expr(span.clone());
      return HStmt::Return {
        value: HExpr { id: NodeId(0), kind: HExprKind::ResultOk(Box::new(inner)), ty: None, span: span.clone() },
        span: span.clone(),
      };
    };
    if let ExprKind::EnumLit { enum_name, variant, args, .. } = &v.kind {
      if self.interner.resolve(*enum_name) == "Result" {
        let variant_name = self.interner.resolve(*variant).to_string();
        let inner = args.first().map(|a| self.expr(a)).unwrap_or_else(|| unit_expr(v.span.clone()));
        let kind = if variant_name == "Ok" { HExprKind::ResultOk(Box::new(inner)) } else { HExprKind::ResultErr(Box::new(inner)) };
        return HStmt::Return { value: HExpr { id: v.id, kind, ty: None, span: v.span.clone() }, span: span.clone() };
      }
    }
    self.bag.error(
      Code::TypeMismatch,
      v.span.clone(),
      "return value must be an explicit `Result.Ok(...)` or `Result.Err(...)` constructor",
    );
    HStmt::Return { value: self.expr(v), span: span.clone() }
  }

  fn expr(&mut self, e: &Expr) -> HExpr {
    let span = e.span.clone();
    match &e.kind {
      ExprKind::Literal(l) => HExpr { id: e.id, kind: HExprKind::Literal(l.clone()), ty: None, span },
      ExprKind::Interp(parts) => {
        let lowered = parts.iter().map(|p| match p {
          InterpPart::Text(s) => HExpr { id: e.id, kind: HExprKind::Literal(Literal::Str(s.clone())), ty: None, span: span.clone() },
          InterpPart::Expr(inner) => self.expr(inner),
        }).collect();
        HExpr { id: e.id, kind: HExprKind::Interpolate(lowered), ty: None, span }
      }
      ExprKind::Var(s) => HExpr { id: e.id, kind: HExprKind::Var(*s), ty: None, span },
      ExprKind::Binary(op, l, r) => {
        let kind = HExprKind::Binary(*op, Box::new(self.expr(l)), Box::new(self.expr(r)));
        HExpr { id: e.id, kind, ty: None, span }
      }
      ExprKind::Unary(op, i) => HExpr { id: e.id, kind: HExprKind::Unary(*op, Box::new(self.expr(i))), ty: None, span },
      ExprKind::Call { callee, args } => {
        let hargs: Vec<HExpr> = args.iter().map(|a| self.expr(a)).collect();
        let kind = if let ExprKind::Var(name) = &callee.kind {
          HExprKind::Call { callee: *name, args: hargs }
        } else {
          // The grammar only ever produces a bare-name callee; anything else here would be an
          // earlier-pass invariant violation rather than a user-facing diagnosis.
          let lowered_callee = self.expr(callee);
          let mut all = vec![lowered_callee];
          all.extend(hargs);
          HExprKind::Call { callee: Symbol::UNDER, args: all }
        };
        HExpr { id: e.id, kind, ty: None, span }
      }
      ExprKind::MethodCall { receiver, method, args } => self.lower_method_call(receiver, *method, args, span),
      ExprKind::Field { base, field } => {
        let kind = HExprKind::Field { base: Box::new(self.expr(base)), field: *field };
        HExpr { id: e.id, kind, ty: None, span }
      }
      ExprKind::Index { base, index } => {
        let kind = HExprKind::Index { base: Box::new(self.expr(base)), index: Box::new(self.expr(index)) };
        HExpr { id: e.id, kind, ty: None, span }
      }
      ExprKind::Range { start, end, inclusive } => {
        // Direction is only knowable here when both bounds are literal integers; the general
        // dynamic-bounds case is decided at runtime by the backend, not by this pass.
        let descending = matches!((&start.kind, &end.kind),
          (ExprKind::Literal(Literal::Int(a)), ExprKind::Literal(Literal::Int(b))) if a > b);
        let kind = HExprKind::RangeIter {
          start: Box::new(self.expr(start)), end: Box::new(self.expr(end)), inclusive: *inclusive, descending,
        };
        HExpr { id: e.id, kind, ty: None, span }
      }
      ExprKind::Borrow(mode, inner) => HExpr { id: e.id, kind: HExprKind::Borrow(*mode, Box::new(self.expr(inner))), ty: None, span },
      ExprKind::Cast(inner, te) => {
        let ty = self.resolve_cast_ty(te);
        HExpr { id: e.id, kind: HExprKind::Cast(Box::new(self.expr(inner)), ty), ty: None, span }
      }
      ExprKind::Propagate(inner) => {
        if self.is_extension {
          self.bag.error(Code::PropagationInExtension, span.clone(), "`??` is not allowed inside an extension method body");
        }
        HExpr { id: e.id, kind: HExprKind::Propagate(Box::new(self.expr(inner))), ty: None, span }
      }
      ExprKind::StructLit { name, fields, .. } => {
        let qn = self.qname_for_type(*name);
        let fields = fields.iter().map(|(n, v)| (*n, self.expr(v))).collect();
        HExpr { id: e.id, kind: HExprKind::StructLit { name: qn, fields }, ty: None, span }
      }
      ExprKind::EnumLit { enum_name, variant, args, .. } => {
        let qn = self.qname_for_type(*enum_name);
        let args = args.iter().map(|a| self.expr(a)).collect();
        HExpr { id: e.id, kind: HExprKind::EnumLit { enum_name: qn, variant: *variant, args }, ty: None, span }
      }
      ExprKind::ArrayLit(items) => {
        let items = items.iter().map(|i| self.expr(i)).collect();
        HExpr { id: e.id, kind: HExprKind::ArrayLit(items), ty: None, span }
      }
    }
  }

  /// `x.m(args)` -> `m__<ReceiverType>(x, args)` (§4.5), except `.realise(default)`, which
  /// keeps its own dedicated HIR node since it's never a user-defined method.
  fn lower_method_call(&mut self, receiver: &Expr, method: Symbol, args: &[Expr], span: FileSpan) -> HExpr {
    if self.interner.resolve(method) == "realise" {
      let hreceiver = self.expr(receiver);
      let default = args.first().map(|a| self.expr(a)).unwrap_or_else(|| unit_expr(span.clone()));
      return HExpr { id: receiver.id, kind: HExprKind::Realise(Box::new(hreceiver), Box::new(default)), ty: None, span };
    }
    let receiver_ty = self.rough_ty(receiver);
    let hreceiver = self.expr(receiver);
    let hargs: Vec<HExpr> = args.iter().map(|a| self.expr(a)).collect();
    let Some(receiver_ty) = receiver_ty else {
      self.bag.error(Code::UnresolvedPath, span.clone(), "could not determine the receiver's type to resolve this method call");
      let mut all = vec![hreceiver];
      all.extend(hargs);
      return HExpr { id: receiver.id, kind: HExprKind::Call { callee: method, args: all }, ty: None, span };
    };
    let mangled = mangle::mangle_ty(&receiver_ty, self.interner);
    let method_name = self.interner.resolve(method).to_string();
    let callee = self.interner.intern(&format!("{method_name}__{mangled}"));
    let mut all = vec![hreceiver];
    all.extend(hargs);
    HExpr { id: receiver.id, kind: HExprKind::Call { callee, args: all }, ty: None, span }
  }

  fn iter_elem_ty(&mut self, iter: &Expr) -> Ty {
    match self.rough_ty(iter) {
      Some(Ty::DynArray(e) | Ty::FixedArray(e, _)) => *e,
      Some(Ty::Builtin(Builtin::List(e) | Builtin::Iterator(e))) => *e,
      _ => match &iter.kind {
        ExprKind::Range { .. } => Ty::Primitive(Prim::I32),
        _ => Ty::UNIT,
      },
    }
  }

  /// A best-effort, pre-C7 type hint used only to resolve method-call receivers and
  /// `foreach`/`let` element types; anything it can't determine falls through to `None` and is
  /// left entirely to C7's full inference.
  fn rough_ty(&self, e: &Expr) -> Option<Ty> {
    match &e.kind {
      ExprKind::Var(name) => self.var_types.get(name).cloned(),
      ExprKind::Literal(Literal::Int(_)) => Some(Ty::Primitive(Prim::I32)),
      ExprKind::Literal(Literal::Float(_)) => Some(Ty::Primitive(Prim::F64)),
      ExprKind::Literal(Literal::Bool(_)) => Some(Ty::Primitive(Prim::Bool)),
      ExprKind::Literal(Literal::Str(_)) => Some(Ty::Primitive(Prim::Str)),
      ExprKind::Literal(Literal::Unit) => Some(Ty::UNIT),
      ExprKind::Borrow(_, inner) => self.rough_ty(inner),
      ExprKind::Cast(_, te) => Some(self.resolve_cast_ty(te)),
      ExprKind::Field { base, field } => {
        let base_ty = self.rough_ty(base)?;
        self.field_ty(&base_ty, *field)
      }
      ExprKind::StructLit { name, type_args, .. } => {
        let qn = self.qname_for_type(*name);
        Some(Ty::Nominal(qn, type_args.iter().map(|t| self.resolve_cast_ty(t)).collect()))
      }
      ExprKind::EnumLit { enum_name, type_args, .. } => {
        let qn = self.qname_for_type(*enum_name);
        Some(Ty::Nominal(qn, type_args.iter().map(|t| self.resolve_cast_ty(t)).collect()))
      }
      ExprKind::ArrayLit(items) => {
        let elem = items.first().and_then(|i| self.rough_ty(i)).unwrap_or(Ty::UNIT);
        Some(Ty::DynArray(Box::new(elem)))
      }
      ExprKind::Call { callee, .. } => {
        if let ExprKind::Var(name) = &callee.kind { self.func_ret_ty(*name) } else { None }
      }
      ExprKind::MethodCall { .. } | ExprKind::Binary(..) | ExprKind::Unary(..) | ExprKind::Index { .. }
        | ExprKind::Range { .. } | ExprKind::Propagate(_) | ExprKind::Interp(_) => None,
    }
  }

  fn field_ty(&self, base: &Ty, field: Symbol) -> Option<Ty> {
    let Ty::Nominal(qn, _) = base else { return None };
    match self.table.get(qn)? {
      Entity::Struct(s) => s.fields.iter().find(|f| f.name == field).map(|f| f.ty.clone()),
      _ => None,
    }
  }

  fn func_ret_ty(&self, name: Symbol) -> Option<Ty> {
    let (_, qn) = self.table.func_names.iter().find(|((_, n), _)| *n == name)?;
    match self.table.get(qn)? {
      Entity::Func(f) => match &f.tc { FuncTc::Typed(fty) => Some(fty.ret.clone()), FuncTc::ForwardDeclared => None },
      _ => None,
    }
  }

  fn qname_for_type(&self, name: Symbol) -> QName {
    self.table.type_names.iter().find(|((_, n), _)| *n == name).map(|(_, qn)| *qn)
      .unwrap_or_else(|| QName::new(Symbol::UNDER, name))
  }

  /// Resolve a surface [`ast::TypeExpr`] the same way C1 does. No type parameters remain
  /// in-scope here: by the time a function reaches C5 it is already concrete (C4 substitutes
  /// away every parameter on a monomorphized copy, and templates never reach this pass).
  fn resolve_cast_ty(&self, te: &ast::TypeExpr) -> Ty {
    let empty_consts = HashMap::new();
    let cx = crate::resolve::ResolveCx {
      unit: Symbol::UNDER,
      type_params: &[],
      symtab: self.table,
      consts: &empty_consts,
      interner: self.interner,
    };
    crate::resolve::resolve_type(&cx, te).unwrap_or(Ty::UNIT)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileId;
  use crate::types::ast::{Param, Signature};
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }
  fn var(id: u32, name: Symbol) -> Expr { Expr { id: NodeId(id), kind: ExprKind::Var(name), span: sp() } }

  #[test]
  fn method_call_rewrites_to_mangled_free_function() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let len = interner.intern("len");
    let body = Block { stmts: vec![Stmt::Return {
      value: Some(Expr {
        id: NodeId(1),
        kind: ExprKind::EnumLit {
          enum_name: interner.intern("Result"),
          type_args: vec![],
          variant: interner.intern("Ok"),
          args: vec![Expr { id: NodeId(2), kind: ExprKind::MethodCall { receiver: Box::new(var(3, x)), method: len, args: vec![] }, span: sp() }],
        },
        span: sp(),
      }),
      span: sp(),
    }] };
    let func = FunctionDecl {
      id: NodeId(0),
      sig: Signature { name: interner.intern("main"), type_params: vec![], params: vec![
        Param { name: x, ty: ast::TypeExpr::DynArray(Box::new(ast::TypeExpr::Primitive(ast::PrimitiveName::I32))), span: sp() },
      ], ret: ast::TypeExpr::Primitive(ast::PrimitiveName::I32), public: true },
      body,
      span: sp(),
    };
    let table = crate::types::entity::SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    let params = vec![(x, Ty::DynArray(Box::new(Ty::Primitive(Prim::I32))))];
    let ret = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::I32))));
    let hf = lower_function(
      QName::new(interner.intern("unit"), interner.intern("main")),
      &func, &params, ret, false, Linkage::Public, &table, &mut interner, &mut bag,
    );
    let HStmt::Return { value, .. } = &hf.body.stmts[0] else { panic!("expected return") };
    let HExprKind::ResultOk(inner) = &value.kind else { panic!("expected ResultOk") };
    let HExprKind::Call { callee, args } = &inner.kind else { panic!("expected rewritten call") };
    assert_eq!(interner.resolve(*callee), "len__slice_i32");
    assert_eq!(args.len(), 1);
    assert!(!bag.has_errors());
  }

  #[test]
  fn bare_return_value_that_is_not_a_result_constructor_is_an_error() {
    let mut interner = Interner::new();
    let body = Block { stmts: vec![Stmt::Return { value: Some(Expr { id: NodeId(1), kind: ExprKind::Literal(Literal::Int(1)), span: sp() }), span: sp() }] };
    let func = FunctionDecl {
      id: NodeId(0),
      sig: Signature { name: interner.intern("f"), type_params: vec![], params: vec![], ret: ast::TypeExpr::Primitive(ast::PrimitiveName::I32), public: true },
      body,
      span: sp(),
    };
    let table = crate::types::entity::SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    let ret = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::I32))));
    let _ = lower_function(QName::new(interner.intern("u"), interner.intern("f")), &func, &[], ret, false, Linkage::Private, &table, &mut interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::TypeMismatch));
  }

  #[test]
  fn propagate_inside_extension_method_is_rejected() {
    let mut interner = Interner::new();
    let e = interner.intern("e");
    let body = Block { stmts: vec![Stmt::Expr(Expr { id: NodeId(1), kind: ExprKind::Propagate(Box::new(var(2, e))), span: sp() })] };
    let func = FunctionDecl {
      id: NodeId(0),
      sig: Signature { name: interner.intern("m"), type_params: vec![], params: vec![
        Param { name: e, ty: ast::TypeExpr::Primitive(ast::PrimitiveName::I32), span: sp() },
      ], ret: ast::TypeExpr::Primitive(ast::PrimitiveName::Unit), public: true },
      body,
      span: sp(),
    };
    let table = crate::types::entity::SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    let params = vec![(e, Ty::Primitive(Prim::I32))];
    let _ = lower_function(QName::new(interner.intern("u"), interner.intern("m")), &func, &params, Ty::UNIT, true, Linkage::Private, &table, &mut interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::PropagationInExtension));
  }
}
