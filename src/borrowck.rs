//! C8: the Borrow Checker (§4.8).
//!
//! Runs last over the typed HIR (§2 dataflow: "C1 -> ... -> C8, with C9 reading the
//! results"). Every expression already carries a resolved [`Ty`] (C7), so this pass only
//! needs to track, per variable, which of the three borrow states it is currently in —
//! unborrowed, N shared (`peek`), or one exclusive (`poke`) — and flag the transitions §4.8
//! forbids. Unlike C2 (which tracks move state across the whole function for diagnostic
//! purposes), borrow state here is deliberately short-lived: a borrow taken as a call
//! argument ends at that call's semicolon (§4.8 "Borrows end at the semicolon / end of the
//! call expression ... or at the end of the block ... for longer-lived `&peek`"), so this
//! checker resets call-scoped borrows at each statement boundary and only carries
//! longer-lived `&peek` borrows (those bound by a `let`, which C7's `ReferenceEscapesStorage`
//! already rejects at the top level, but a borrow nested inside a stored struct literal is
//! still legal) across the rest of the enclosing block.
//!
//! Failure mode: per §4.8, borrow violations are always fatal and this pass does not attempt
//! to recover within the offending function — it still finishes checking every *other*
//! function, mirroring §7's per-function accumulation for every other diagnostic kind.

use hashbrown::HashMap;
use log::trace;

use crate::diag::{Code, DiagnosticBag};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::hir::{HBlock, HExpr, HExprKind, HFunction, HStmt};
use crate::types::ty::{BorrowMode, Ty};

/// One variable's borrow state at a program point (§4.8): unborrowed, `N >= 1` shared
/// borrows, or exactly one exclusive borrow.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BorrowState {
  Free,
  Shared(u32),
  Exclusive,
}

impl BorrowState {
  fn describe(self) -> &'static str {
    match self {
      BorrowState::Free => "unborrowed",
      BorrowState::Shared(_) => "a shared (`peek`) borrow",
      BorrowState::Exclusive => "an exclusive (`poke`) borrow",
    }
  }
}

/// Check every function's body, reporting into `bag`. `struct_is_move_only` mirrors C2's
/// closure of the same name (needed here only to recognize `Own<T>`-alike values, which
/// follow the same borrow rules as anything else per §4.8's last rule).
pub fn check_function(func: &HFunction, bag: &mut DiagnosticBag) {
  trace!("C8: borrow-checking {:?}", func.qname.name);
  let mut ck = Checker { borrows: HashMap::new(), long_lived: Vec::new(), bag, halted: false };
  for (name, ty, mode) in &func.sig.params {
    if let Some(m) = mode {
      let state = match m { BorrowMode::Peek => BorrowState::Shared(1), BorrowMode::Poke => BorrowState::Exclusive };
      ck.borrows.insert(*name, state);
    }
    let _ = ty;
  }
  ck.block(&func.body);
}

struct Checker<'a> {
  borrows: HashMap<Symbol, BorrowState>,
  /// `let`-bound `&peek`/`&poke` borrows that survive past the statement that introduced them,
  /// reinstated into `borrows` once the statement's own call-scoped borrows are cleared.
  long_lived: Vec<(Symbol, BorrowState)>,
  bag: &'a mut DiagnosticBag,
  /// §4.8 "Failure mode": once a conflict fires inside a function, stop reporting further
  /// conflicts for the *same* function body rather than cascade secondary noise from a
  /// checker state that's already diverged from what the program actually does.
  halted: bool,
}

impl<'a> Checker<'a> {
  fn block(&mut self, b: &HBlock) {
    for s in &b.stmts {
      if self.halted { return; }
      // Call-scoped borrows taken inside one statement never outlive it (§4.8): any borrow
      // still recorded after `stmt` returns that isn't a `let`-bound reference is cleared
      // before moving to the next statement.
      self.stmt(s);
      self.borrows.retain(|_, _| false);
      self.long_lived.drain(..).for_each(|(k, v)| { self.borrows.insert(k, v); });
    }
  }

  fn stmt(&mut self, s: &HStmt) {
    match s {
      HStmt::Let { ty, value, .. } => {
        self.expr(value);
        if let Ty::Ref(mode, _) = ty {
          if let HExprKind::Borrow(_, inner) = &value.kind {
            if let Some(root) = root_var(inner) {
              let state = match mode { BorrowMode::Peek => BorrowState::Shared(1), BorrowMode::Poke => BorrowState::Exclusive };
              self.long_lived.push((root, state));
            }
          }
        }
      }
      HStmt::Rebind { name, value, span } => {
        self.expr(value);
        self.write_to(*name, span);
      }
      HStmt::Expr(e) => self.expr(e),
      HStmt::If { arms, else_block, .. } => {
        for (cond, body) in arms {
          self.expr(cond);
          self.block(body);
        }
        if let Some(b) = else_block { self.block(b); }
      }
      HStmt::While { cond, body, .. } => {
        self.expr(cond);
        self.block(body);
      }
      HStmt::Foreach { iter, body, .. } => {
        self.expr(iter);
        self.block(body);
      }
      HStmt::Match { scrutinee, arms, .. } => {
        self.expr(scrutinee);
        for arm in arms { self.block(&arm.body); }
      }
      HStmt::Break { .. } | HStmt::Continue { .. } => {}
      HStmt::Return { value, .. } => self.expr(value),
    }
  }

  fn expr(&mut self, e: &HExpr) {
    if self.halted { return; }
    match &e.kind {
      HExprKind::Borrow(mode, inner) => {
        self.expr(inner);
        if let Some(root) = root_var(inner) { self.begin_borrow(root, *mode, &e.span); }
      }
      HExprKind::Literal(_) | HExprKind::Var(_) | HExprKind::MaybeNone => {}
      HExprKind::Binary(_, l, r) => { self.expr(l); self.expr(r); }
      HExprKind::Unary(_, i) => self.expr(i),
      HExprKind::Call { callee: _, args } => {
        for a in args { self.consume_call_arg(a); }
      }
      HExprKind::Field { base, .. } => self.expr(base),
      HExprKind::Index { base, index } => { self.expr(base); self.expr(index); }
      HExprKind::RangeIter { start, end, .. } => { self.expr(start); self.expr(end); }
      HExprKind::Cast(inner, _) => self.expr(inner),
      HExprKind::ResultOk(inner) | HExprKind::ResultErr(inner) | HExprKind::MaybeSome(inner) | HExprKind::Propagate(inner) => self.expr(inner),
      HExprKind::Realise(receiver, default) => { self.expr(receiver); self.expr(default); }
      HExprKind::Interpolate(parts) => for p in parts { self.expr(p); }
      HExprKind::StructLit { fields, .. } => for (_, v) in fields { self.consume_call_arg(v); }
      HExprKind::EnumLit { args, .. } => for a in args { self.consume_call_arg(a); }
      HExprKind::ArrayLit(items) => for it in items { self.consume_call_arg(it); }
    }
  }

  /// A call/struct/enum-literal argument position: a non-reference, non-copy value passed by
  /// name moves it (§4.2's rule applies again here because C8 re-derives move points directly
  /// from C7-resolved types rather than trusting C2's pre-lowering rough types).
  fn consume_call_arg(&mut self, e: &HExpr) {
    self.expr(e);
    if let HExprKind::Var(name) = &e.kind {
      let is_move = e.ty.as_ref().is_some_and(|t| !matches!(t, Ty::Ref(..)) && !is_trivially_copy(t));
      if is_move { self.destroy_or_move(*name, &e.span); }
    }
  }

  fn begin_borrow(&mut self, var: Symbol, mode: BorrowMode, span: &FileSpan) {
    let current = self.borrows.get(&var).copied().unwrap_or(BorrowState::Free);
    let next = match (current, mode) {
      (BorrowState::Free, BorrowMode::Peek) => Some(BorrowState::Shared(1)),
      (BorrowState::Free, BorrowMode::Poke) => Some(BorrowState::Exclusive),
      (BorrowState::Shared(n), BorrowMode::Peek) => Some(BorrowState::Shared(n + 1)),
      (BorrowState::Shared(_), BorrowMode::Poke) => None,
      (BorrowState::Exclusive, _) => None,
    };
    match next {
      Some(s) => { self.borrows.insert(var, s); }
      None => self.conflict(span.clone(), format!(
        "cannot take a {} borrow: variable already has {}",
        if mode == BorrowMode::Peek { "shared (`peek`)" } else { "exclusive (`poke`)" },
        current.describe(),
      )),
    }
  }

  fn write_to(&mut self, var: Symbol, span: &FileSpan) {
    if let Some(state) = self.borrows.get(&var).copied() {
      if state != BorrowState::Free {
        self.conflict(span.clone(), "cannot rebind a variable while it has an active borrow".to_string());
        return;
      }
    }
    self.borrows.remove(&var);
  }

  fn destroy_or_move(&mut self, var: Symbol, span: &FileSpan) {
    if let Some(state) = self.borrows.get(&var).copied() {
      if state != BorrowState::Free {
        self.conflict(span.clone(), "cannot move or destroy a variable while it has an active borrow".to_string());
        return;
      }
    }
  }

  fn conflict(&mut self, span: FileSpan, message: String) {
    self.bag.error(Code::BorrowConflict, span, message);
    self.halted = true;
  }
}

/// Walk down through field/index projections to find the root variable a borrow ultimately
/// targets (§4.8: "A borrow of a struct field counts as a borrow of the containing struct").
fn root_var(e: &HExpr) -> Option<Symbol> {
  match &e.kind {
    HExprKind::Var(name) => Some(*name),
    HExprKind::Field { base, .. } | HExprKind::Index { base, .. } => root_var(base),
    _ => None,
  }
}

/// A conservative, HIR-local stand-in for `Ty::is_copy`'s struct-recursion closure: primitives
/// and references copy; every dynamic array/`List`/`HashMap`/`Own`/nominal is treated as
/// move-only. This slightly over-approximates `is_copy` for structs that happen to contain no
/// owning field (they'd still be flagged as a move here), which only makes the checker more
/// conservative, never less — consistent with §4.8's "failure mode: always fatal" stance: a
/// false-positive "this moves" is a style/perf concern (the backend will insert an elidable
/// copy), never a soundness one.
fn is_trivially_copy(ty: &Ty) -> bool {
  matches!(ty, Ty::Primitive(_))
}
