//! C7: the Type Checker (§4.7).
//!
//! Runs after C5 has produced a fully concrete (post-monomorphization) HIR, so there is no
//! inference-variable machinery here — every [`Ty`] is already closed. What remains is
//! bidirectional checking in the chalk-ir sense (`examples/other_examples/5b1acd78_...
//! chalk-ir-src-lib.rs.rs`): compute each subexpression's type bottom-up, compare it against
//! whatever the surrounding context expects, and stamp [`HExpr::ty`] so C8 never has to
//! re-derive a type it can instead read off the tree (§8 Testable Property 2: "every
//! C7-typed expression has exactly one resolved type").

use log::trace;

use crate::diag::{Code, DiagnosticBag};
use crate::resolve;
use crate::span::FileSpan;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{BinOp, Literal, Pattern, UnOp};
use crate::types::entity::{Entity, FuncTc, FuncTy, SymbolTable};
use crate::types::hir::{HBlock, HExpr, HExprKind, HFunction, HMatchArm, HStmt};
use crate::types::ty::{BorrowMode, Builtin, Prim, Ty};
use crate::types::QName;
use hashbrown::HashMap;

/// Type-check one lowered function in place, stamping every [`HExpr::ty`] and reporting every
/// violation of §4.7's rules into `bag`. `is_entry_point` gates the `PropagationFromEntry`
/// warning (§4.7 warning surface).
pub fn typecheck_function(
  func: &mut HFunction,
  table: &SymbolTable,
  is_entry_point: bool,
  interner: &Interner,
  bag: &mut DiagnosticBag,
) {
  trace!("C7: type-checking {}", interner.resolve(func.qname.name));
  let (ret_ty, err_ty) = match &func.sig.ret {
    Ty::Builtin(Builtin::Result(t, e)) => ((**t).clone(), (**e).clone()),
    // A return type that escaped implicit wrapping is a C1 bug, not a user error; check
    // against itself rather than panic so a single malformed signature doesn't take down the
    // whole pass (§7: one bad declaration must not block diagnostics for the rest).
    other => (other.clone(), other.clone()),
  };
  let mut vars = HashMap::new();
  for (name, ty, _) in &func.sig.params { vars.insert(*name, ty.clone()); }
  let mut ck = Checker { table, interner, bag, ret_ty, err_ty, is_entry_point, vars };
  ck.block(&mut func.body);
}

struct Checker<'a> {
  table: &'a SymbolTable,
  interner: &'a Interner,
  bag: &'a mut DiagnosticBag,
  /// `T` from the function's true `Result<T, E>` return type.
  ret_ty: Ty,
  /// `E` from the function's true `Result<T, E>` return type.
  err_ty: Ty,
  is_entry_point: bool,
  vars: HashMap<Symbol, Ty>,
}

impl<'a> Checker<'a> {
  fn full_ret_ty(&self) -> Ty {
    Ty::Builtin(Builtin::Result(Box::new(self.ret_ty.clone()), Box::new(self.err_ty.clone())))
  }

  /// Is a value of type `actual` acceptable where `expected` is required? Equal types always
  /// are; `&peek T` additionally accepts `&poke T` (§4.7 borrow-mode covariance) but not the
  /// reverse.
  fn assignable(&self, expected: &Ty, actual: &Ty) -> bool {
    match (expected, actual) {
      (Ty::Ref(BorrowMode::Peek, e), Ty::Ref(BorrowMode::Peek | BorrowMode::Poke, a)) => self.assignable(e, a),
      (Ty::Ref(BorrowMode::Poke, e), Ty::Ref(BorrowMode::Poke, a)) => self.assignable(e, a),
      _ => expected == actual,
    }
  }

  /// Synthetic-or-registered perk satisfaction, the same two-step rule `monomorphize.rs`'s
  /// `satisfies_perk` applies to generic bounds: primitives satisfy the three built-in perks
  /// automatically; anything else needs a matching `impl perk for ty` in the registry.
  fn satisfies_builtin_perk(&self, ty: &Ty, perk_name: &str) -> bool {
    if matches!(ty, Ty::Primitive(_)) { return true; }
    self.table.entities.values().any(|e| matches!(e, Entity::PerkImpl(pi)
      if pi.receiver == *ty && self.interner.resolve(pi.perk.name) == perk_name))
  }

  fn lookup_func(&self, name: Symbol) -> Option<&FuncTy> {
    let (_, qn) = self.table.func_names.iter().find(|((_, n), _)| *n == name)?;
    match self.table.get(qn)? {
      Entity::Func(f) => match &f.tc { FuncTc::Typed(fty) => Some(fty), FuncTc::ForwardDeclared => None },
      _ => None,
    }
  }

  fn struct_field_ty(&self, qn: &QName, field: Symbol) -> Option<Ty> {
    match self.table.get(qn)? {
      Entity::Struct(s) => s.fields.iter().find(|f| f.name == field).map(|f| f.ty.clone()),
      _ => None,
    }
  }

  fn element_type(ty: &Ty) -> Ty {
    match ty {
      Ty::DynArray(e) | Ty::FixedArray(e, _) => (**e).clone(),
      Ty::Builtin(Builtin::List(e) | Builtin::Iterator(e)) => (**e).clone(),
      _ => Ty::UNIT,
    }
  }

  fn block(&mut self, b: &mut HBlock) {
    for s in &mut b.stmts { self.stmt(s); }
  }

  fn stmt(&mut self, s: &mut HStmt) {
    match s {
      HStmt::Let { name, ty, value, span } => {
        let vt = self.infer(value);
        if vt.is_result() && !ty.is_result() {
          self.bag.error(Code::UnwrappedResultAssignment, span.clone(),
            format!("cannot bind a `Result` directly to `{}`; use `.realise(default)` or `??`", ty.render(self.interner)));
        } else if !self.assignable(ty, &vt) {
          self.bag.error(Code::TypeMismatch, span.clone(),
            format!("expected `{}`, found `{}`", ty.render(self.interner), vt.render(self.interner)));
        }
        if let Ty::FixedArray(_, n) = ty {
          if let HExprKind::ArrayLit(items) = &value.kind {
            if items.len() as u64 != *n {
              self.bag.error(Code::ArrayLengthMismatch, span.clone(),
                format!("array literal has {} elements, expected {n}", items.len()));
            }
          }
        }
        if matches!(ty, Ty::Ref(..)) {
          self.bag.error(Code::ReferenceEscapesStorage, span.clone(),
            "a reference cannot be stored in a `let` binding; borrows may only live in parameters and temporaries");
        }
        self.vars.insert(*name, ty.clone());
      }
      HStmt::Rebind { name, value, span } => {
        let vt = self.infer(value);
        if let Some(declared) = self.vars.get(name).cloned() {
          // §4.8 "Writing through a `&peek` reference → `WriteThroughShared`": a rebind is the
          // only grammar site that writes through a variable's own storage (there is no
          // separate field-/deref-assignment syntax), so a `&peek`-typed variable being
          // rebound at all is the violation, independent of whatever value flows in.
          if matches!(declared, Ty::Ref(BorrowMode::Peek, _)) {
            self.bag.error(Code::WriteThroughShared, span.clone(),
              "cannot write through a shared (`peek`) reference");
          } else if vt.is_result() && !declared.is_result() {
            self.bag.error(Code::UnwrappedResultAssignment, span.clone(),
              format!("cannot rebind `Result` directly to `{}`; use `.realise(default)` or `??`", declared.render(self.interner)));
          } else if !self.assignable(&declared, &vt) {
            self.bag.error(Code::TypeMismatch, span.clone(), format!("expected `{}`, found `{}`", declared.render(self.interner), vt.render(self.interner)));
          }
        }
      }
      HStmt::Expr(e) => {
        let t = self.infer(e);
        if t.is_result() {
          self.bag.warn(Code::UnusedResult, e.span.clone(), "this `Result` is never consumed");
        }
      }
      HStmt::If { arms, else_block, .. } => {
        for (cond, body) in arms {
          let ct = self.infer(cond);
          if ct != Ty::Primitive(Prim::Bool) {
            self.bag.error(Code::TypeMismatch, cond.span.clone(), format!("`if` condition must be `bool`, found `{}`", ct.render(self.interner)));
          }
          self.block(body);
        }
        if let Some(b) = else_block { self.block(b); }
      }
      HStmt::While { cond, body, .. } => {
        let ct = self.infer(cond);
        if ct != Ty::Primitive(Prim::Bool) {
          self.bag.error(Code::TypeMismatch, cond.span.clone(), format!("`while` condition must be `bool`, found `{}`", ct.render(self.interner)));
        }
        self.block(body);
      }
      HStmt::Foreach { binding, iter, body, .. } => {
        let it = self.infer(iter);
        let elem = Self::element_type(&it);
        self.vars.insert(*binding, elem);
        self.block(body);
      }
      HStmt::Match { scrutinee, arms, span } => {
        let scrutinee_ty = self.infer(scrutinee);
        self.check_match(&scrutinee_ty, arms, span);
      }
      HStmt::Break { .. } | HStmt::Continue { .. } => {}
      HStmt::Return { value, span } => {
        let vt = self.infer(value);
        let expected = self.full_ret_ty();
        if !self.assignable(&expected, &vt) {
          self.bag.error(Code::TypeMismatch, span.clone(), format!("expected return type `{}`, found `{}`", expected.render(self.interner), vt.render(self.interner)));
        }
      }
    }
  }

  fn check_match(&mut self, scrutinee_ty: &Ty, arms: &mut [HMatchArm], span: &FileSpan) {
    let mut has_wildcard = false;
    let mut seen: Vec<Symbol> = Vec::new();
    for arm in arms.iter_mut() {
      match &arm.pattern {
        Pattern::Wildcard(_) | Pattern::Binding(..) => has_wildcard = true,
        Pattern::Variant { name, .. } => seen.push(*name),
        Pattern::Literal(..) => {}
      }
      self.bind_pattern(&arm.pattern, scrutinee_ty);
      self.block(&mut arm.body);
    }
    if has_wildcard { return; }
    let Ty::Nominal(qn, _) = scrutinee_ty else { return };
    let Some(Entity::Enum(e)) = self.table.get(qn) else { return };
    let missing: Vec<&str> = e.variants.iter()
      .filter(|v| !seen.contains(&v.name))
      .map(|v| self.interner.resolve(v.name))
      .collect();
    if !missing.is_empty() {
      self.bag.error(Code::NonExhaustiveMatch, span.clone(),
        format!("match is not exhaustive; missing variant(s): {}", missing.join(", ")));
    }
  }

  fn bind_pattern(&mut self, pattern: &Pattern, ty: &Ty) {
    match pattern {
      Pattern::Wildcard(_) | Pattern::Literal(..) => {}
      Pattern::Binding(name, _) => { self.vars.insert(*name, ty.clone()); }
      Pattern::Variant { name, args, span } => {
        let Ty::Nominal(qn, _) = ty else { return };
        let Some(Entity::Enum(e)) = self.table.get(qn) else { return };
        let Some(variant) = e.variants.iter().find(|v| v.name == *name) else { return };
        if variant.payload.len() != args.len() {
          self.bag.error(Code::TypeMismatch, span.clone(),
            format!("pattern for `{}` binds {} value(s), variant has {}", self.interner.resolve(*name), args.len(), variant.payload.len()));
          return;
        }
        for (sub, payload_ty) in args.iter().zip(variant.payload.clone()) {
          self.bind_pattern(sub, &payload_ty);
        }
      }
    }
  }

  fn infer(&mut self, e: &mut HExpr) -> Ty {
    let ty = self.infer_kind(&mut e.kind, &e.span);
    e.ty = Some(ty.clone());
    ty
  }

  fn infer_kind(&mut self, kind: &mut HExprKind, span: &FileSpan) -> Ty {
    match kind {
      HExprKind::Literal(l) => literal_ty(l),
      HExprKind::Var(name) => self.vars.get(name).cloned().unwrap_or(Ty::UNIT),
      HExprKind::Binary(op, l, r) => self.infer_binary(*op, l, r, span),
      HExprKind::Unary(op, inner) => self.infer_unary(*op, inner, span),
      HExprKind::Call { callee, args } => self.infer_call(*callee, args, span),
      HExprKind::Field { base, field } => {
        let bt = self.infer(base);
        match &bt {
          Ty::Nominal(qn, _) => self.struct_field_ty(qn, *field).unwrap_or_else(|| {
            self.bag.error(Code::TypeMismatch, span.clone(), format!("`{}` has no field `{}`", bt.render(self.interner), self.interner.resolve(*field)));
            Ty::UNIT
          }),
          _ => {
            self.bag.error(Code::TypeMismatch, span.clone(), format!("`{}` has no fields", bt.render(self.interner)));
            Ty::UNIT
          }
        }
      }
      HExprKind::Index { base, index } => {
        let bt = self.infer(base);
        let it = self.infer(index);
        if !matches!(it, Ty::Primitive(p) if p.is_integer()) {
          self.bag.error(Code::OperandTypeMismatch, index.span.clone(), format!("array index must be an integer, found `{}`", it.render(self.interner)));
        }
        match bt {
          Ty::DynArray(e) | Ty::FixedArray(e, _) => *e,
          other => {
            self.bag.error(Code::TypeMismatch, span.clone(), format!("`{}` cannot be indexed", other.render(self.interner)));
            Ty::UNIT
          }
        }
      }
      HExprKind::RangeIter { start, end, .. } => {
        let st = self.infer(start);
        let et = self.infer(end);
        if st != et {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("range bounds must share a type, found `{}` and `{}`", st.render(self.interner), et.render(self.interner)));
        }
        Ty::Builtin(Builtin::Iterator(Box::new(st)))
      }
      HExprKind::Borrow(mode, inner) => Ty::Ref(*mode, Box::new(self.infer(inner))),
      HExprKind::Cast(inner, target) => {
        let it = self.infer(inner);
        if !matches!(it, Ty::Primitive(p) if p.is_integer() || p.is_float())
          || !matches!(target, Ty::Primitive(p) if p.is_integer() || p.is_float()) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(),
            format!("`as` only converts between numeric primitive types, found `{}` as `{}`", it.render(self.interner), target.render(self.interner)));
        }
        target.clone()
      }
      HExprKind::ResultOk(inner) => {
        let it = self.infer(inner);
        if !self.assignable(&self.ret_ty.clone(), &it) {
          self.bag.error(Code::TypeMismatch, span.clone(), format!("expected `{}`, found `{}`", self.ret_ty.render(self.interner), it.render(self.interner)));
        }
        self.full_ret_ty()
      }
      HExprKind::ResultErr(inner) => {
        let it = self.infer(inner);
        if !self.assignable(&self.err_ty.clone(), &it) {
          self.bag.error(Code::TypeMismatch, span.clone(), format!("expected error type `{}`, found `{}`", self.err_ty.render(self.interner), it.render(self.interner)));
        }
        self.full_ret_ty()
      }
      HExprKind::MaybeSome(inner) => Ty::Builtin(Builtin::Maybe(Box::new(self.infer(inner)))),
      HExprKind::MaybeNone => Ty::Builtin(Builtin::Maybe(Box::new(Ty::UNIT))),
      HExprKind::Realise(receiver, default) => self.infer_realise(receiver, default, span),
      HExprKind::Propagate(inner) => self.infer_propagate(inner, span),
      HExprKind::Interpolate(parts) => {
        for p in parts.iter_mut() {
          let pt = self.infer(p);
          if !self.satisfies_builtin_perk(&pt, "Displayable") {
            self.bag.error(Code::NoPerkImplementation, p.span.clone(),
              format!("`{}` does not implement `Displayable` and cannot be interpolated", pt.render(self.interner)));
          }
        }
        Ty::Primitive(Prim::Str)
      }
      HExprKind::StructLit { name, fields } => self.infer_struct_lit(name, fields, span),
      HExprKind::EnumLit { enum_name, variant, args } => self.infer_enum_lit(enum_name, *variant, args, span),
      HExprKind::ArrayLit(items) => {
        let mut elem = None;
        for item in items.iter_mut() {
          let it = self.infer(item);
          match &elem {
            None => elem = Some(it),
            Some(e) if *e == it => {}
            Some(e) => {
              self.bag.error(Code::TypeMismatch, item.span.clone(), format!("array literal element type `{}` does not match earlier element type `{}`", it.render(self.interner), e.render(self.interner)));
            }
          }
        }
        Ty::DynArray(Box::new(elem.unwrap_or(Ty::UNIT)))
      }
    }
  }

  fn infer_binary(&mut self, op: BinOp, l: &mut HExpr, r: &mut HExpr, span: &FileSpan) -> Ty {
    let lt = self.infer(l);
    let rt = self.infer(r);
    match op {
      BinOp::And | BinOp::Or => {
        if lt != Ty::Primitive(Prim::Bool) || rt != Ty::Primitive(Prim::Bool) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("`{op:?}` requires `bool` operands, found `{}` and `{}`", lt.render(self.interner), rt.render(self.interner)));
        }
        Ty::Primitive(Prim::Bool)
      }
      BinOp::Eq | BinOp::Ne => {
        if lt != rt {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("cannot compare `{}` with `{}`", lt.render(self.interner), rt.render(self.interner)));
        } else if !self.satisfies_builtin_perk(&lt, "Equatable") {
          self.bag.error(Code::NoPerkImplementation, span.clone(), format!("`{}` does not implement `Equatable`", lt.render(self.interner)));
        }
        Ty::Primitive(Prim::Bool)
      }
      BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
        if lt != rt {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("cannot compare `{}` with `{}`", lt.render(self.interner), rt.render(self.interner)));
        }
        Ty::Primitive(Prim::Bool)
      }
      BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
      | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
        if lt != rt {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("arithmetic requires identical operand types, found `{}` and `{}`", lt.render(self.interner), rt.render(self.interner)));
        }
        lt
      }
    }
  }

  fn infer_unary(&mut self, op: UnOp, inner: &mut HExpr, span: &FileSpan) -> Ty {
    let it = self.infer(inner);
    match op {
      UnOp::Neg => {
        if !matches!(it, Ty::Primitive(p) if p.is_integer() || p.is_float()) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("unary `-` requires a numeric operand, found `{}`", it.render(self.interner)));
        }
        it
      }
      UnOp::Not => {
        if it != Ty::Primitive(Prim::Bool) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("`!` requires `bool`, found `{}`", it.render(self.interner)));
        }
        Ty::Primitive(Prim::Bool)
      }
      UnOp::BitNot => {
        if !matches!(it, Ty::Primitive(p) if p.is_integer()) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("`~` requires an integer operand, found `{}`", it.render(self.interner)));
        }
        it
      }
    }
  }

  fn infer_call(&mut self, callee: Symbol, args: &mut [HExpr], span: &FileSpan) -> Ty {
    let arg_types: Vec<Ty> = args.iter_mut().map(|a| self.infer(a)).collect();
    if self.interner.resolve(callee) == "destroy" { return Ty::UNIT; }
    let Some(fty) = self.lookup_func(callee) else {
      // Core runtime helpers (the range-iterator constructor, the interpolation helper) and
      // perk-dispatched methods C5 already mangled have no `FuncEntity` of their own; trust
      // the call shape C5 produced rather than re-deriving perk resolution C4 already did for
      // generic instantiations.
      return arg_types.into_iter().next().unwrap_or(Ty::UNIT);
    };
    let fty = fty.clone();
    if fty.params.len() != arg_types.len() {
      self.bag.error(Code::TypeMismatch, span.clone(),
        format!("expected {} argument(s), found {}", fty.params.len(), arg_types.len()));
    } else {
      for ((_, expected), actual) in fty.params.iter().zip(&arg_types) {
        if !self.assignable(expected, actual) {
          self.bag.error(Code::OperandTypeMismatch, span.clone(), format!("expected `{}`, found `{}`", expected.render(self.interner), actual.render(self.interner)));
        }
      }
    }
    fty.ret
  }

  fn infer_realise(&mut self, receiver: &mut HExpr, default: &mut HExpr, span: &FileSpan) -> Ty {
    let rt = self.infer(receiver);
    let dt = self.infer(default);
    let Ty::Builtin(Builtin::Result(t, _)) = &rt else {
      self.bag.error(Code::TypeMismatch, span.clone(), format!("`.realise()` requires a `Result`, found `{}`", rt.render(self.interner)));
      return dt;
    };
    if !self.assignable(t, &dt) {
      self.bag.error(Code::RealiseArityMismatch, span.clone(),
        format!("`.realise()` default must have type `{}`, found `{}`", t.render(self.interner), dt.render(self.interner)));
    }
    (**t).clone()
  }

  /// `e??` (§4.5 Open Question #2): on `Result<T, E>`, `E` must equal the enclosing function's
  /// declared error type exactly; the one sanctioned widening is `Maybe<T>`'s `None` lifting to
  /// `Err(StdError.Error)`, legal only when the enclosing function's error type *is*
  /// `StdError.Error`.
  fn infer_propagate(&mut self, inner: &mut HExpr, span: &FileSpan) -> Ty {
    let it = self.infer(inner);
    if self.is_entry_point {
      self.bag.warn(Code::PropagationFromEntry, span.clone(), "`??` appears inside the program's entry point");
    }
    match it {
      Ty::Builtin(Builtin::Result(t, e)) => {
        if *e != self.err_ty {
          self.bag.error(Code::ErrorTypeMismatch, span.clone(),
            format!("`??`'s error type `{}` does not match the enclosing function's error type `{}`", e.render(self.interner), self.err_ty.render(self.interner)));
        }
        *t
      }
      Ty::Builtin(Builtin::Maybe(t)) => {
        if self.err_ty != resolve::std_error_ty() {
          self.bag.error(Code::ErrorTypeMismatch, span.clone(),
            format!("`??` on `Maybe` only widens to `{}`, but the enclosing function's error type is `{}`", resolve::std_error_ty().render(self.interner), self.err_ty.render(self.interner)));
        }
        *t
      }
      other => {
        self.bag.error(Code::TypeMismatch, span.clone(), format!("`??` requires `Result` or `Maybe`, found `{}`", other.render(self.interner)));
        other
      }
    }
  }

  fn infer_struct_lit(&mut self, name: &QName, fields: &mut [(Symbol, HExpr)], span: &FileSpan) -> Ty {
    if let Some(Entity::Struct(s)) = self.table.get(name) {
      let decl_fields = s.fields.clone();
      for (fname, fexpr) in fields.iter_mut() {
        let ft = self.infer(fexpr);
        match decl_fields.iter().find(|f| f.name == *fname) {
          Some(f) if !self.assignable(&f.ty, &ft) => {
            self.bag.error(Code::TypeMismatch, fexpr.span.clone(),
              format!("field `{}` expects `{}`, found `{}`", self.interner.resolve(*fname), f.ty.render(self.interner), ft.render(self.interner)));
          }
          Some(_) => {}
          None => {
            self.bag.error(Code::TypeMismatch, span.clone(),
              format!("`{}` has no field `{}`", self.interner.resolve(name.name), self.interner.resolve(*fname)));
          }
        }
      }
    } else {
      for (_, fexpr) in fields.iter_mut() { self.infer(fexpr); }
    }
    Ty::Nominal(*name, Vec::new())
  }

  fn infer_enum_lit(&mut self, enum_name: &QName, variant: Symbol, args: &mut [HExpr], span: &FileSpan) -> Ty {
    if let Some(Entity::Enum(e)) = self.table.get(enum_name) {
      if let Some(v) = e.variants.iter().find(|v| v.name == variant).cloned() {
        if v.payload.len() != args.len() {
          self.bag.error(Code::TypeMismatch, span.clone(),
            format!("variant `{}` expects {} value(s), found {}", self.interner.resolve(variant), v.payload.len(), args.len()));
        }
        for (arg, expected) in args.iter_mut().zip(v.payload.iter()) {
          let at = self.infer(arg);
          if !self.assignable(expected, &at) {
            self.bag.error(Code::TypeMismatch, arg.span.clone(), format!("expected `{}`, found `{}`", expected.render(self.interner), at.render(self.interner)));
          }
        }
      } else {
        for a in args.iter_mut() { self.infer(a); }
      }
    } else {
      for a in args.iter_mut() { self.infer(a); }
    }
    Ty::Nominal(*enum_name, Vec::new())
  }
}

fn literal_ty(l: &Literal) -> Ty {
  match l {
    Literal::Int(_) => Ty::Primitive(Prim::I32),
    Literal::Float(_) => Ty::Primitive(Prim::F64),
    Literal::Bool(_) => Ty::Primitive(Prim::Bool),
    Literal::Str(_) => Ty::Primitive(Prim::Str),
    Literal::Unit => Ty::UNIT,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileId;
  use crate::types::hir::HSignature;
  use crate::types::linkage::Linkage;
  use crate::types::NodeId;
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }

  fn lit(i: i128) -> HExpr { HExpr { id: NodeId(0), kind: HExprKind::Literal(Literal::Int(i)), ty: None, span: sp() } }
  fn var(name: Symbol) -> HExpr { HExpr { id: NodeId(0), kind: HExprKind::Var(name), ty: None, span: sp() } }

  fn func(ret: Ty, params: Vec<(Symbol, Ty, Option<BorrowMode>)>, body: Vec<HStmt>, interner: &mut Interner) -> HFunction {
    HFunction {
      qname: QName::new(interner.intern("u"), interner.intern("f")),
      sig: HSignature { name: interner.intern("f"), params, ret },
      body: HBlock { stmts: body },
      linkage: Linkage::Private,
    }
  }

  #[test]
  fn result_type_is_the_wrapped_return_and_a_matching_ok_is_clean() {
    let mut interner = Interner::new();
    let ret = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool))));
    let mut f = func(ret, vec![], vec![HStmt::Return {
      value: HExpr { id: NodeId(1), kind: HExprKind::ResultOk(Box::new(lit(1))), ty: None, span: sp() },
      span: sp(),
    }], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(!bag.has_errors());
  }

  #[test]
  fn unwrapped_result_assignment_is_flagged() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let call_sym = interner.intern("produces_result");
    let mut table = SymbolTable::new();
    let unit = interner.intern("u");
    let qn = QName::new(unit, call_sym);
    table.func_names.insert((unit, call_sym), qn);
    table.entities.insert(qn, Entity::Func(crate::types::entity::FuncEntity {
      qname: qn,
      vis: crate::types::entity::Visibility::Private,
      tc: FuncTc::Typed(FuncTy {
        type_params: vec![], params: vec![],
        ret: Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool)))),
      }),
      body: crate::types::ast::FunctionDecl {
        id: NodeId(0),
        sig: crate::types::ast::Signature { name: call_sym, type_params: vec![], params: vec![], ret: crate::types::ast::TypeExpr::Primitive(crate::types::ast::PrimitiveName::I32), public: false },
        body: crate::types::ast::Block::default(),
        span: sp(),
      },
      is_entry_point: false,
      mono_origin: None,
    }));
    let call = HExpr { id: NodeId(2), kind: HExprKind::Call { callee: call_sym, args: vec![] }, ty: None, span: sp() };
    let mut f = func(
      Ty::Builtin(Builtin::Result(Box::new(Ty::UNIT), Box::new(Ty::Primitive(Prim::Bool)))),
      vec![],
      vec![HStmt::Let { name: x, ty: Ty::Primitive(Prim::I32), value: call, span: sp() }],
      &mut interner,
    );
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::UnwrappedResultAssignment));
  }

  #[test]
  fn rebinding_a_shared_reference_is_write_through_shared() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let peek_ty = Ty::Ref(BorrowMode::Peek, Box::new(Ty::Primitive(Prim::I32)));
    let rebind = HStmt::Rebind { name: x, value: lit(1), span: sp() };
    let mut f = func(Ty::UNIT, vec![(x, peek_ty, None)], vec![rebind], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::WriteThroughShared));
  }

  #[test]
  fn rebinding_an_exclusive_reference_is_not_write_through_shared() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let poke_ty = Ty::Ref(BorrowMode::Poke, Box::new(Ty::Primitive(Prim::I32)));
    let rebind = HStmt::Rebind { name: x, value: lit(1), span: sp() };
    let mut f = func(Ty::UNIT, vec![(x, poke_ty, None)], vec![rebind], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(!bag.diagnostics().iter().any(|d| d.code == Code::WriteThroughShared));
  }

  #[test]
  fn arithmetic_on_mismatched_operand_types_is_flagged() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let binary = HExpr {
      id: NodeId(1),
      kind: HExprKind::Binary(BinOp::Add, Box::new(var(x)), Box::new(HExpr {
        id: NodeId(2), kind: HExprKind::Literal(Literal::Bool(true)), ty: None, span: sp(),
      })),
      ty: None, span: sp(),
    };
    let mut f = func(Ty::UNIT, vec![(x, Ty::Primitive(Prim::I32), None)], vec![HStmt::Expr(binary)], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::OperandTypeMismatch));
  }

  #[test]
  fn realise_with_wrong_default_type_is_flagged() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let realise = HExpr {
      id: NodeId(1),
      kind: HExprKind::Realise(Box::new(var(x)), Box::new(HExpr { id: NodeId(2), kind: HExprKind::Literal(Literal::Bool(true)), ty: None, span: sp() })),
      ty: None, span: sp(),
    };
    let result_ty = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool))));
    let mut f = func(Ty::UNIT, vec![(x, result_ty, None)], vec![HStmt::Expr(realise)], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::RealiseArityMismatch));
  }

  #[test]
  fn propagate_with_mismatched_error_type_is_flagged() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let propagate = HExpr {
      id: NodeId(1),
      kind: HExprKind::Propagate(Box::new(var(x))),
      ty: None, span: sp(),
    };
    let inner_result = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Str))));
    let fn_ret = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool))));
    let mut f = func(fn_ret, vec![(x, inner_result, None)], vec![HStmt::Expr(propagate)], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::ErrorTypeMismatch));
  }

  #[test]
  fn propagate_inside_entry_point_warns() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let propagate = HExpr { id: NodeId(1), kind: HExprKind::Propagate(Box::new(var(x))), ty: None, span: sp() };
    let inner_result = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool))));
    let fn_ret = Ty::Builtin(Builtin::Result(Box::new(Ty::Primitive(Prim::I32)), Box::new(Ty::Primitive(Prim::Bool))));
    let mut f = func(fn_ret, vec![(x, inner_result, None)], vec![HStmt::Expr(propagate)], &mut interner);
    let table = SymbolTable::new();
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, true, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::PropagationFromEntry));
  }

  #[test]
  fn non_exhaustive_match_lists_missing_variant() {
    let mut interner = Interner::new();
    let unit = interner.intern("u");
    let enum_name = interner.intern("Shape");
    let circle = interner.intern("Circle");
    let square = interner.intern("Square");
    let qn = QName::new(unit, enum_name);
    let mut table = SymbolTable::new();
    table.entities.insert(qn, Entity::Enum(crate::types::entity::EnumEntity {
      qname: qn, vis: crate::types::entity::Visibility::Public, type_params: vec![],
      variants: vec![
        crate::types::entity::VariantEntity { name: circle, payload: vec![] },
        crate::types::entity::VariantEntity { name: square, payload: vec![] },
      ],
      methods: Default::default(), span: sp(), mono_origin: None,
    }));
    let x = interner.intern("x");
    let scrutinee = var(x);
    let match_stmt = HStmt::Match {
      scrutinee,
      arms: vec![HMatchArm { pattern: Pattern::Variant { name: circle, args: vec![], span: sp() }, body: HBlock { stmts: vec![] }, span: sp() }],
      span: sp(),
    };
    let mut f = func(Ty::UNIT, vec![(x, Ty::Nominal(qn, vec![]), None)], vec![match_stmt], &mut interner);
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::NonExhaustiveMatch));
  }

  #[test]
  fn exhaustive_match_with_wildcard_is_clean() {
    let mut interner = Interner::new();
    let unit = interner.intern("u");
    let enum_name = interner.intern("Shape");
    let circle = interner.intern("Circle");
    let qn = QName::new(unit, enum_name);
    let mut table = SymbolTable::new();
    table.entities.insert(qn, Entity::Enum(crate::types::entity::EnumEntity {
      qname: qn, vis: crate::types::entity::Visibility::Public, type_params: vec![],
      variants: vec![crate::types::entity::VariantEntity { name: circle, payload: vec![] }],
      methods: Default::default(), span: sp(), mono_origin: None,
    }));
    let x = interner.intern("x");
    let match_stmt = HStmt::Match {
      scrutinee: var(x),
      arms: vec![HMatchArm { pattern: Pattern::Wildcard(sp()), body: HBlock { stmts: vec![] }, span: sp() }],
      span: sp(),
    };
    let mut f = func(Ty::UNIT, vec![(x, Ty::Nominal(qn, vec![]), None)], vec![match_stmt], &mut interner);
    let mut bag = DiagnosticBag::new();
    typecheck_function(&mut f, &table, false, &interner, &mut bag);
    assert!(!bag.has_errors());
  }
}
