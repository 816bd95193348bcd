//! The constant evaluator used eagerly by C1 (§4.1).
//!
//! Supports exactly the fixed grammar documented in §4.1: integer/float/bool/string literals
//! (including `0x`/`0b`/`0o` prefixes with underscore separators — parsed upstream by the
//! external lexer, so this module only ever sees already-tokenized [`Literal`]s), all
//! arithmetic/comparison operators, bitwise ops on integers only, logical ops on booleans
//! only, `as`-casts between numeric types, references to earlier constants, and fixed-array
//! literals over constant elements. Anything else is `NonConstExpression` (Open Question #1:
//! mirror the documented positive case literally rather than generalize).

use hashbrown::HashMap;
use smallvec::SmallVec;
use thiserror::Error;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ast::{BinOp, Expr, ExprKind, Literal, UnOp};
use crate::types::ty::{Prim, Ty};

/// A fully-evaluated constant value (§3 lifecycle: "a constant is created at C1 and never
/// mutated").
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
  Int(i128, Prim),
  Float(f64, Prim),
  Bool(bool),
  Str(String),
  Array(Vec<ConstValue>),
}

impl ConstValue {
  #[must_use] pub fn ty(&self) -> Ty {
    match self {
      ConstValue::Int(_, p) | ConstValue::Float(_, p) => Ty::Primitive(*p),
      ConstValue::Bool(_) => Ty::Primitive(Prim::Bool),
      ConstValue::Str(_) => Ty::Primitive(Prim::Str),
      ConstValue::Array(items) => {
        let elem = items.first().map_or(Ty::Primitive(Prim::I32), ConstValue::ty);
        Ty::FixedArray(Box::new(elem), items.len() as u64)
      }
    }
  }
}

/// Internal evaluator malfunction — as opposed to a user-facing `NonConstExpression`
/// diagnostic, this indicates the evaluator was asked to fold an expression shape C1 should
/// never have dispatched to it (a bug in the core, not the user's program).
#[derive(Debug, Error)]
pub enum EvalBug {
  #[error("constant evaluator received an unresolved node of kind {0}")]
  UnexpectedNodeKind(&'static str),
}

/// Why a constant expression was rejected (surfaced to the caller, who turns it into a
/// `Diagnostic` with the offending span).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstError {
  /// The expression shape is outside the fixed grammar of §4.1.
  NotConst,
  /// `name` refers to itself transitively; `cycle` is the path of qualified names as given
  /// by the caller (the evaluator itself only detects the cycle, the caller renders the path).
  Circular(Vec<Symbol>),
  /// A referenced constant name wasn't found (only reachable via caller misuse; see
  /// `collect.rs` which always resolves names before calling in).
  UnknownConst(Symbol),
  /// Arithmetic or bitwise overflow/type mismatch inside an otherwise-const expression.
  TypeError(String),
}

/// Evaluates constant expressions against an environment of already-evaluated earlier
/// constants (§4.1: "references to earlier constants").
pub struct ConstEvaluator<'a> {
  pub env: &'a HashMap<Symbol, ConstValue>,
  /// The in-progress evaluation stack, used for cycle detection.
  stack: SmallVec<[Symbol; 8]>,
}

impl<'a> ConstEvaluator<'a> {
  #[must_use] pub fn new(env: &'a HashMap<Symbol, ConstValue>) -> Self {
    Self { env, stack: SmallVec::new() }
  }

  pub fn eval(&mut self, e: &Expr) -> Result<ConstValue, ConstError> {
    match &e.kind {
      ExprKind::Literal(lit) => Self::eval_literal(lit),
      ExprKind::Var(name) => self.eval_var(*name),
      ExprKind::Unary(op, inner) => self.eval_unary(*op, inner),
      ExprKind::Binary(op, l, r) => self.eval_binary(*op, l, r),
      ExprKind::Cast(inner, ty) => self.eval_cast(inner, ty),
      ExprKind::ArrayLit(items) => {
        let mut out = Vec::with_capacity(items.len());
        for it in items { out.push(self.eval(it)?); }
        Ok(ConstValue::Array(out))
      }
      _ => Err(ConstError::NotConst),
    }
  }

  fn eval_literal(lit: &Literal) -> Result<ConstValue, ConstError> {
    Ok(match lit {
      Literal::Int(v) => ConstValue::Int(*v, default_int_prim(*v)),
      Literal::Float(v) => ConstValue::Float(*v, Prim::F64),
      Literal::Bool(v) => ConstValue::Bool(*v),
      Literal::Str(v) => ConstValue::Str(v.clone()),
      Literal::Unit => ConstValue::Bool(false), // unit has no const representation of its own
    })
  }

  fn eval_var(&mut self, name: Symbol) -> Result<ConstValue, ConstError> {
    if self.stack.contains(&name) {
      let mut cycle: Vec<Symbol> = self.stack.iter().copied().collect();
      cycle.push(name);
      return Err(ConstError::Circular(cycle));
    }
    match self.env.get(&name) {
      Some(v) => Ok(v.clone()),
      None => Err(ConstError::UnknownConst(name)),
    }
  }

  fn eval_unary(&mut self, op: UnOp, inner: &Expr) -> Result<ConstValue, ConstError> {
    let v = self.eval(inner)?;
    match (op, v) {
      (UnOp::Neg, ConstValue::Int(i, p)) => Ok(ConstValue::Int(-i, p)),
      (UnOp::Neg, ConstValue::Float(f, p)) => Ok(ConstValue::Float(-f, p)),
      (UnOp::Not, ConstValue::Bool(b)) => Ok(ConstValue::Bool(!b)),
      (UnOp::BitNot, ConstValue::Int(i, p)) => Ok(ConstValue::Int(!i, p)),
      _ => Err(ConstError::TypeError("unary operator applied to incompatible constant".into())),
    }
  }

  fn eval_binary(&mut self, op: BinOp, l: &Expr, r: &Expr) -> Result<ConstValue, ConstError> {
    let lv = self.eval(l)?;
    let rv = self.eval(r)?;
    use BinOp::*;
    match (op, &lv, &rv) {
      (And, ConstValue::Bool(a), ConstValue::Bool(b)) => Ok(ConstValue::Bool(*a && *b)),
      (Or, ConstValue::Bool(a), ConstValue::Bool(b)) => Ok(ConstValue::Bool(*a || *b)),
      (Eq | Ne | Lt | Le | Gt | Ge, _, _) => self.eval_compare(op, &lv, &rv),
      (BitAnd | BitOr | BitXor | Shl | Shr, ConstValue::Int(a, p), ConstValue::Int(b, _)) =>
        Ok(ConstValue::Int(apply_bitwise(op, *a, *b), *p)),
      (Add | Sub | Mul | Div | Mod, ConstValue::Int(a, p), ConstValue::Int(b, _)) =>
        apply_int_arith(op, *a, *b, *p),
      (Add | Sub | Mul | Div, ConstValue::Float(a, p), ConstValue::Float(b, _)) =>
        Ok(ConstValue::Float(apply_float_arith(op, *a, *b), *p)),
      _ => Err(ConstError::TypeError(format!("operator {op:?} not supported between these constant operands"))),
    }
  }

  fn eval_compare(&mut self, op: BinOp, l: &ConstValue, r: &ConstValue) -> Result<ConstValue, ConstError> {
    use BinOp::*;
    let ord = match (l, r) {
      (ConstValue::Int(a, _), ConstValue::Int(b, _)) => a.partial_cmp(b),
      (ConstValue::Float(a, _), ConstValue::Float(b, _)) => a.partial_cmp(b),
      (ConstValue::Bool(a), ConstValue::Bool(b)) => a.partial_cmp(b),
      (ConstValue::Str(a), ConstValue::Str(b)) => a.partial_cmp(b),
      _ => return Err(ConstError::TypeError("comparison between incompatible constants".into())),
    };
    let Some(ord) = ord else { return Err(ConstError::TypeError("unordered comparison".into())) };
    let b = match op {
      Eq => ord == std::cmp::Ordering::Equal,
      Ne => ord != std::cmp::Ordering::Equal,
      Lt => ord == std::cmp::Ordering::Less,
      Le => ord != std::cmp::Ordering::Greater,
      Gt => ord == std::cmp::Ordering::Greater,
      Ge => ord != std::cmp::Ordering::Less,
      _ => unreachable!(),
    };
    Ok(ConstValue::Bool(b))
  }

  fn eval_cast(&mut self, inner: &Expr, ty: &crate::types::ast::TypeExpr) -> Result<ConstValue, ConstError> {
    use crate::types::ast::{PrimitiveName, TypeExpr};
    let v = self.eval(inner)?;
    let TypeExpr::Primitive(p) = ty else {
      return Err(ConstError::TypeError("`as`-cast target must be a numeric primitive".into()));
    };
    let target = match p {
      PrimitiveName::I8 => Prim::I8, PrimitiveName::I16 => Prim::I16,
      PrimitiveName::I32 => Prim::I32, PrimitiveName::I64 => Prim::I64,
      PrimitiveName::U8 => Prim::U8, PrimitiveName::U16 => Prim::U16,
      PrimitiveName::U32 => Prim::U32, PrimitiveName::U64 => Prim::U64,
      PrimitiveName::F32 => Prim::F32, PrimitiveName::F64 => Prim::F64,
      _ => return Err(ConstError::TypeError("`as`-cast target must be numeric".into())),
    };
    match v {
      ConstValue::Int(i, _) if target.is_integer() => Ok(ConstValue::Int(i, target)),
      ConstValue::Int(i, _) if target.is_float() => Ok(ConstValue::Float(i as f64, target)),
      ConstValue::Float(f, _) if target.is_integer() => Ok(ConstValue::Int(f as i128, target)),
      ConstValue::Float(f, _) if target.is_float() => Ok(ConstValue::Float(f, target)),
      _ => Err(ConstError::TypeError("`as`-cast requires a numeric operand".into())),
    }
  }

  /// Evaluate `name`'s defining expression while `name` is on the stack, so self-reference is
  /// caught as `Circular` rather than infinite recursion. Callers in `collect.rs` use this to
  /// evaluate constants in dependency order while still catching genuine cycles.
  pub fn eval_as(&mut self, name: Symbol, e: &Expr) -> Result<ConstValue, ConstError> {
    self.stack.push(name);
    let r = self.eval(e);
    self.stack.pop();
    r
  }
}

fn default_int_prim(v: i128) -> Prim {
  if v >= i64::from(i32::MIN) && v <= i64::from(i32::MAX) as i128 { Prim::I32 } else { Prim::I64 }
}

fn apply_bitwise(op: BinOp, a: i128, b: i128) -> i128 {
  match op {
    BinOp::BitAnd => a & b,
    BinOp::BitOr => a | b,
    BinOp::BitXor => a ^ b,
    BinOp::Shl => a << b,
    BinOp::Shr => a >> b,
    _ => unreachable!(),
  }
}

fn apply_int_arith(op: BinOp, a: i128, b: i128, p: Prim) -> Result<ConstValue, ConstError> {
  let v = match op {
    BinOp::Add => a.checked_add(b),
    BinOp::Sub => a.checked_sub(b),
    BinOp::Mul => a.checked_mul(b),
    BinOp::Div => if b == 0 { None } else { a.checked_div(b) },
    BinOp::Mod => if b == 0 { None } else { a.checked_rem(b) },
    _ => unreachable!(),
  };
  v.map(|v| ConstValue::Int(v, p)).ok_or_else(|| ConstError::TypeError("constant arithmetic overflow or division by zero".into()))
}

fn apply_float_arith(op: BinOp, a: f64, b: f64) -> f64 {
  match op {
    BinOp::Add => a + b,
    BinOp::Sub => a - b,
    BinOp::Mul => a * b,
    BinOp::Div => a / b,
    _ => unreachable!(),
  }
}

/// A caller-facing wrapper pairing a [`ConstError`] with the span it occurred at, the shape
/// `collect.rs` turns directly into a `Diagnostic`.
#[derive(Debug, Clone)]
pub struct SpannedConstError {
  pub span: FileSpan,
  pub error: ConstError,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{FileId, FileSpan};
  use crate::types::ast::{BinOp, Expr, ExprKind, Literal};
  use crate::types::NodeId;
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }
  fn lit(l: Literal) -> Expr { Expr { id: NodeId(0), kind: ExprKind::Literal(l), span: sp() } }
  fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
    Expr { id: NodeId(0), kind: ExprKind::Binary(op, Box::new(l), Box::new(r)), span: sp() }
  }

  #[test]
  fn folds_arithmetic() {
    let env = HashMap::new();
    let mut ev = ConstEvaluator::new(&env);
    let e = bin(BinOp::Mul, lit(Literal::Int(2)), lit(Literal::Int(21)));
    assert_eq!(ev.eval(&e).unwrap(), ConstValue::Int(42, Prim::I32));
  }

  #[test]
  fn division_by_zero_is_a_const_error_not_a_panic() {
    let env = HashMap::new();
    let mut ev = ConstEvaluator::new(&env);
    let e = bin(BinOp::Div, lit(Literal::Int(1)), lit(Literal::Int(0)));
    assert!(matches!(ev.eval(&e), Err(ConstError::TypeError(_))));
  }

  #[test]
  fn detects_self_reference_cycle() {
    use crate::symbol::Interner;
    let mut i = Interner::new();
    let base = i.intern("BASE");
    let env = HashMap::new();
    let mut ev = ConstEvaluator::new(&env);
    let self_ref = Expr { id: NodeId(0), kind: ExprKind::Var(base), span: sp() };
    let err = ev.eval_as(base, &self_ref).unwrap_err();
    assert!(matches!(err, ConstError::Circular(_)));
  }

  #[test]
  fn array_of_constant_products_is_accepted() {
    // Mirrors the documented positive case: `[BASE, BASE * 2, BASE * 3]`.
    let mut env = HashMap::new();
    env.insert(Symbol::UNDER, ConstValue::Int(10, Prim::I32)); // stand-in for BASE
    let mut ev = ConstEvaluator::new(&env);
    let base = || Expr { id: NodeId(0), kind: ExprKind::Var(Symbol::UNDER), span: sp() };
    let arr = Expr {
      id: NodeId(0),
      kind: ExprKind::ArrayLit(vec![
        base(),
        bin(BinOp::Mul, base(), lit(Literal::Int(2))),
        bin(BinOp::Mul, base(), lit(Literal::Int(3))),
      ]),
      span: sp(),
    };
    let v = ev.eval(&arr).unwrap();
    assert_eq!(v, ConstValue::Array(vec![
      ConstValue::Int(10, Prim::I32), ConstValue::Int(20, Prim::I32), ConstValue::Int(30, Prim::I32),
    ]));
  }
}
