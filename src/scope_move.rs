//! C2: the Scope & Move Analyzer (§4.2).
//!
//! Produces, per function body, a scope tree annotated with each variable's initial state
//! plus a per-statement "move delta" recording which variables transition to `Moved`. Errors
//! (`UndefinedVariable`, `UseAfterMove`, `RebindWithoutDeclare`) are all recoverable: the pass
//! continues within a function and across functions (§4.2 "Errors").

use hashbrown::HashMap;
use log::trace;

use crate::diag::{Code, DiagnosticBag};
use crate::span::FileSpan;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{Block, Expr, ExprKind, Stmt};
use crate::types::ty::Ty;

/// A variable's lifecycle state (§3 "Variables").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarState { Live, Moved, Destroyed }

#[derive(Clone, Debug)]
pub struct VarInfo {
  pub ty: Ty,
  pub state: VarState,
  pub declared_at: FileSpan,
}

/// One function body's move-tracking result: the final state of every variable that was ever
/// declared, keyed by name (shadowing across nested scopes is out of scope for this
/// simplified per-function table — the grammar requires unique `let` names per function, as
/// every other pass also assumes).
#[derive(Default, Debug)]
pub struct MoveAnalysis {
  pub vars: HashMap<Symbol, VarInfo>,
}

/// Whether a type moves when passed/returned by value, vs. copies (§4.2 "Rules").
/// `is_move_only` asks the owner (C1's struct table, via a closure) whether a nominal type
/// recursively contains a dynamic array/`List`/`HashMap`/`Own`.
pub fn moves_by_value(ty: &Ty, struct_is_move_only: &impl Fn(&crate::types::QName) -> bool) -> bool {
  !ty.is_copy(struct_is_move_only)
}

struct Analyzer<'a> {
  vars: HashMap<Symbol, VarInfo>,
  struct_is_move_only: &'a dyn Fn(&crate::types::QName) -> bool,
  /// Resolves `destroy` once per analysis rather than by string comparison per call site.
  destroy_sym: Symbol,
}

/// Analyze one function body, reporting into `bag`. `var_type` resolves an expression-level
/// variable reference to its declared type (already computed by the time C2 runs — C2 reads
/// the declared types from `let`/parameter annotations, it doesn't infer them; full inference
/// is C7's job).
pub fn analyze_function(
  body: &Block,
  params: &[(Symbol, Ty)],
  struct_is_move_only: &impl Fn(&crate::types::QName) -> bool,
  fn_span: FileSpan,
  interner: &Interner,
  bag: &mut DiagnosticBag,
) -> MoveAnalysis {
  trace!("C2: analyzing function body with {} statements", body.stmts.len());
  // `destroy` is a built-in free function, not a symbol any real program declares; if this
  // interner never saw the literal string "destroy" there is nothing in the body that could
  // name it either, so falling back to `Symbol::UNDER` (which can't appear as a callee) is safe.
  let destroy_sym = interner_lookup(interner, "destroy").unwrap_or(Symbol::UNDER);
  let mut az = Analyzer { vars: HashMap::new(), struct_is_move_only, destroy_sym };
  for (name, ty) in params {
    az.vars.insert(*name, VarInfo { ty: ty.clone(), state: VarState::Live, declared_at: fn_span.clone() });
  }
  az.block(body, bag);
  MoveAnalysis { vars: az.vars }
}

fn interner_lookup(interner: &Interner, s: &str) -> Option<Symbol> {
  // `Interner` only exposes `intern` (mutable) and `resolve`; C2 never mutates the interner
  // (it runs read-only over already-interned ASTs), so recover the existing symbol, if any, by
  // a linear scan rather than widen `Interner`'s API for this one lookup.
  (0..interner.len()).map(|i| Symbol::from_usize(i)).find(|&sym| interner.resolve(sym) == s)
}

impl<'a> Analyzer<'a> {
  fn block(&mut self, block: &Block, bag: &mut DiagnosticBag) {
    for stmt in &block.stmts { self.stmt(stmt, bag); }
  }

  fn stmt(&mut self, stmt: &Stmt, bag: &mut DiagnosticBag) {
    match stmt {
      Stmt::Let { name, value, span, .. } => {
        self.consume_arg(value, bag);
        // `let` always (re)declares fresh storage in `Live` state, regardless of prior state
        // under the same name (shadowing), matching §3 lifecycle: "a variable is created at
        // its `let`".
        let ty = self.infer_rough_type(value);
        self.vars.insert(*name, VarInfo { ty, state: VarState::Live, declared_at: span.clone() });
      }
      Stmt::Rebind { name, value, span } => {
        self.expr(value, bag);
        if !self.vars.contains_key(name) {
          bag.error(Code::RebindWithoutDeclare, span.clone(), "`:=` used on a name that was never declared with `let`");
          return;
        }
        // §3 lifecycle: "rebinding (`:=`) leaves state Live" — it does not change the
        // variable's type, only its storage and state.
        if let Some(info) = self.vars.get_mut(name) { info.state = VarState::Live; }
      }
      Stmt::Expr(e) => self.expr(e, bag),
      Stmt::If { arms, else_block, .. } => {
        let before = self.vars.clone();
        let mut moved_after: HashMap<Symbol, VarState> = HashMap::new();
        for (cond, blk) in arms {
          self.vars = before.clone();
          self.expr(cond, bag);
          self.block(blk, bag);
          for (k, v) in &self.vars {
            moved_after.entry(*k).and_modify(|s| if v.state != VarState::Live { *s = v.state }).or_insert(v.state);
          }
        }
        if let Some(blk) = else_block {
          self.vars = before.clone();
          self.block(blk, bag);
          for (k, v) in &self.vars {
            moved_after.entry(*k).and_modify(|s| if v.state != VarState::Live { *s = v.state }).or_insert(v.state);
          }
        } else {
          for (k, v) in &before { moved_after.entry(*k).or_insert(v.state); }
        }
        self.vars = before;
        // Conservative merge: a variable moved/destroyed along *any* reachable arm is treated
        // as moved/destroyed after the `if`, since the analyzer can't statically know which
        // arm ran (documented decision — the spec is silent on branch-merge semantics).
        for (k, s) in moved_after {
          if let Some(info) = self.vars.get_mut(&k) { if s != VarState::Live { info.state = s; } }
        }
      }
      Stmt::While { cond, body, .. } => {
        self.expr(cond, bag);
        self.block(body, bag);
      }
      Stmt::Foreach { binding, iter, body, span } => {
        self.expr(iter, bag);
        let elem_ty = self.infer_rough_type(iter);
        self.vars.insert(*binding, VarInfo { ty: elem_ty, state: VarState::Live, declared_at: span.clone() });
        self.block(body, bag);
      }
      Stmt::Match { scrutinee, arms, .. } => {
        self.expr(scrutinee, bag);
        let before = self.vars.clone();
        let mut merged: HashMap<Symbol, VarState> = HashMap::new();
        for arm in arms {
          self.vars = before.clone();
          self.bind_pattern(&arm.pattern);
          self.block(&arm.body, bag);
          for (k, v) in &self.vars {
            merged.entry(*k).and_modify(|s| if v.state != VarState::Live { *s = v.state }).or_insert(v.state);
          }
        }
        self.vars = before;
        for (k, s) in merged {
          if let Some(info) = self.vars.get_mut(&k) { if s != VarState::Live { info.state = s; } }
        }
      }
      Stmt::Break { .. } | Stmt::Continue { .. } => {}
      Stmt::Return { value, .. } => {
        if let Some(v) = value { self.expr(v, bag); }
      }
    }
  }

  fn bind_pattern(&mut self, p: &crate::types::ast::Pattern) {
    use crate::types::ast::Pattern;
    match p {
      Pattern::Binding(name, span) if *name != Symbol::UNDER => {
        self.vars.insert(*name, VarInfo { ty: Ty::UNIT, state: VarState::Live, declared_at: span.clone() });
      }
      Pattern::Variant { args, .. } => for a in args { self.bind_pattern(a); }
      _ => {}
    }
  }

  fn expr(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
    match &e.kind {
      ExprKind::Var(name) => self.use_var(*name, e.span.clone(), bag, false),
      ExprKind::Literal(_) => {}
      ExprKind::Interp(parts) => for p in parts {
        if let crate::types::ast::InterpPart::Expr(inner) = p { self.expr(inner, bag); }
      }
      ExprKind::Binary(_, l, r) => { self.expr(l, bag); self.expr(r, bag); }
      ExprKind::Unary(_, i) => self.expr(i, bag),
      ExprKind::Call { callee, args } => {
        if let ExprKind::Var(name) = &callee.kind {
          if *name == self.destroy_sym {
            if let [arg] = args.as_slice() {
              if let ExprKind::Var(target) = &arg.kind {
                self.destroy_var(*target, arg.span.clone(), bag);
                return;
              }
            }
          }
        }
        self.expr(callee, bag);
        for a in args { self.consume_arg(a, bag); }
      }
      ExprKind::MethodCall { receiver, args, .. } => {
        self.expr(receiver, bag);
        for a in args { self.consume_arg(a, bag); }
      }
      ExprKind::Field { base, .. } | ExprKind::Index { base, .. } => self.expr(base, bag),
      ExprKind::Range { start, end, .. } => { self.expr(start, bag); self.expr(end, bag); }
      ExprKind::Borrow(_, inner) => {
        // Borrowing never moves (§4.2): only look the variable up for `UndefinedVariable`
        // purposes without transitioning its state.
        if let ExprKind::Var(name) = &inner.kind { self.use_var(*name, inner.span.clone(), bag, true); }
        else { self.expr(inner, bag); }
      }
      ExprKind::Cast(inner, _) => self.expr(inner, bag),
      ExprKind::Propagate(inner) => self.expr(inner, bag),
      ExprKind::StructLit { fields, .. } => for (_, v) in fields { self.consume_arg(v, bag); }
      ExprKind::EnumLit { args, .. } => for a in args { self.consume_arg(a, bag); }
      ExprKind::ArrayLit(items) => for it in items { self.consume_arg(it, bag); }
    }
  }

  /// A call/struct/enum argument position: by-value passing moves non-copy types.
  fn consume_arg(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
    if let ExprKind::Var(name) = &e.kind {
      self.use_var(*name, e.span.clone(), bag, false);
      if let Some(info) = self.vars.get(name) {
        if !info.ty.is_copy(self.struct_is_move_only) && info.state == VarState::Live {
          self.vars.get_mut(name).unwrap().state = VarState::Moved;
        }
      }
    } else {
      self.expr(e, bag);
    }
  }

  /// `destroy(x)` (§3 "Variables": the only way a value transitions to `Destroyed` rather than
  /// `Moved`). Flags re-destroying or destroying an already-moved variable the same way a
  /// second move would be flagged, then marks it `Destroyed`.
  fn destroy_var(&mut self, name: Symbol, span: FileSpan, bag: &mut DiagnosticBag) {
    self.use_var(name, span, bag, false);
    if let Some(info) = self.vars.get_mut(&name) { info.state = VarState::Destroyed; }
  }

  fn use_var(&mut self, name: Symbol, span: FileSpan, bag: &mut DiagnosticBag, is_borrow: bool) {
    let Some(info) = self.vars.get(&name) else {
      bag.error(Code::UndefinedVariable, span, "use of a variable before it was declared");
      return;
    };
    match info.state {
      VarState::Live => {}
      VarState::Moved if !is_borrow => {
        bag.error(Code::UseAfterMove, span, "use of a variable after it was moved");
      }
      VarState::Destroyed => {
        bag.error(Code::UseAfterDestroy, span, "use of a variable after `destroy()`");
      }
      VarState::Moved => {} // borrowing a moved-from variable is C8's concern, not C2's
    }
  }

  /// C2 runs before C7's full inference; it only needs a rough type to decide move-vs-copy,
  /// so unresolvable shapes default to a conservative "moves" type (unit is copy, so this
  /// purposefully picks a non-copy placeholder where we can't yet tell).
  fn infer_rough_type(&self, e: &Expr) -> Ty {
    match &e.kind {
      ExprKind::Var(name) => self.vars.get(name).map_or(Ty::UNIT, |i| i.ty.clone()),
      ExprKind::Literal(crate::types::ast::Literal::Int(_)) => Ty::Primitive(crate::types::ty::Prim::I32),
      ExprKind::Literal(crate::types::ast::Literal::Bool(_)) => Ty::Primitive(crate::types::ty::Prim::Bool),
      ExprKind::Literal(crate::types::ast::Literal::Str(_)) => Ty::Primitive(crate::types::ty::Prim::Str),
      ExprKind::Literal(crate::types::ast::Literal::Unit) => Ty::UNIT,
      ExprKind::ArrayLit(_) => Ty::DynArray(Box::new(Ty::UNIT)),
      // Any other shape (calls, field access, casts, ...) is resolved precisely by C7; C2
      // only needs move-vs-copy, so default to the conservative "moves" answer rather than
      // risk silently treating an owning value as copyable.
      _ => Ty::DynArray(Box::new(Ty::UNIT)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{FileId, FileSpan};
  use crate::symbol::Interner;
  use crate::types::ast::*;
  use crate::types::NodeId;
  use crate::types::ty::{Prim, Ty};
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }
  fn var(name: Symbol) -> Expr { Expr { id: NodeId(0), kind: ExprKind::Var(name), span: sp() } }
  fn never_move_only(_: &crate::types::QName) -> bool { false }

  #[test]
  fn move_then_use_is_flagged() {
    // Mirrors §8 scenario 1: `let a = ...; let b = a; return a.len()`.
    let mut interner = Interner::new();
    let a = interner.intern("a");
    let b = interner.intern("b");
    let dyn_arr = Ty::DynArray(Box::new(Ty::Primitive(Prim::I32)));
    let body = Block { stmts: vec![
      Stmt::Let { name: a, ty: None, value: Expr { id: NodeId(0), kind: ExprKind::ArrayLit(vec![]), span: sp() }, span: sp() },
      Stmt::Let { name: b, ty: None, value: var(a), span: sp() },
      Stmt::Return { value: Some(Expr {
        id: NodeId(0),
        kind: ExprKind::MethodCall { receiver: Box::new(var(a)), method: interner.intern("len"), args: vec![] },
        span: sp(),
      }), span: sp() },
    ]};
    let mut bag = DiagnosticBag::new();
    let params: Vec<(Symbol, Ty)> = vec![];
    let _ = dyn_arr;
    let _analysis = analyze_function(&body, &params, &never_move_only, sp(), &interner, &mut bag);
    assert_eq!(bag.diagnostics().iter().filter(|d| d.code == Code::UseAfterMove).count(), 1);
  }

  #[test]
  fn rebind_without_declare_is_an_error() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let body = Block { stmts: vec![
      Stmt::Rebind { name: x, value: Expr { id: NodeId(0), kind: ExprKind::Literal(Literal::Int(1)), span: sp() }, span: sp() },
    ]};
    let mut bag = DiagnosticBag::new();
    analyze_function(&body, &[], &never_move_only, sp(), &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::RebindWithoutDeclare));
  }

  #[test]
  fn use_after_destroy_is_flagged() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let destroy = interner.intern("destroy");
    let body = Block { stmts: vec![
      Stmt::Let { name: x, ty: None, value: Expr { id: NodeId(0), kind: ExprKind::ArrayLit(vec![]), span: sp() }, span: sp() },
      Stmt::Expr(Expr {
        id: NodeId(0),
        kind: ExprKind::Call { callee: Box::new(var(destroy)), args: vec![var(x)] },
        span: sp(),
      }),
      Stmt::Return { value: Some(var(x)), span: sp() },
    ]};
    let mut bag = DiagnosticBag::new();
    analyze_function(&body, &[], &never_move_only, sp(), &interner, &mut bag);
    assert!(bag.diagnostics().iter().any(|d| d.code == Code::UseAfterDestroy));
  }
}
