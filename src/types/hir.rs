//! The lowered IR (§6 output contract): produced by C5, typed by C7, checked by C8.
//!
//! Every call is already a free-function call (method/extension calls have been rewritten by
//! C5), every `return` is a `Result` constructor, and — once C7 has run — every expression
//! carries exactly one resolved [`Ty`] (§8 Testable Property 2).

use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ast::{BinOp, Literal, UnOp};
use crate::types::ty::{BorrowMode, Ty};
use crate::types::NodeId;

#[derive(Clone, Debug)]
pub struct HExpr {
  pub id: NodeId,
  pub kind: HExprKind,
  /// `None` before C7 runs; always `Some` afterwards.
  pub ty: Option<Ty>,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub enum HExprKind {
  Literal(Literal),
  Var(Symbol),
  Binary(BinOp, Box<HExpr>, Box<HExpr>),
  Unary(UnOp, Box<HExpr>),
  /// Every call is a free-function call post-C5; `callee` names the (possibly monomorphized,
  /// possibly mangled) function directly.
  Call { callee: Symbol, args: Vec<HExpr> },
  Field { base: Box<HExpr>, field: Symbol },
  Index { base: Box<HExpr>, index: Box<HExpr> },
  /// Rewritten range iterator (§4.5): a lowered call to the core range-iterator constructor.
  RangeIter { start: Box<HExpr>, end: Box<HExpr>, inclusive: bool, descending: bool },
  Borrow(BorrowMode, Box<HExpr>),
  Cast(Box<HExpr>, Ty),
  /// The `Ok`/`Err`/`Some`/`None` constructor forms that `return` is required to use.
  ResultOk(Box<HExpr>),
  ResultErr(Box<HExpr>),
  MaybeSome(Box<HExpr>),
  MaybeNone,
  /// `e.realise(default)`.
  Realise(Box<HExpr>, Box<HExpr>),
  /// `e??`, kept structural through C5 since resolving whether `e` is `Result`- or
  /// `Maybe`-typed (and therefore which widening rule applies) needs C7's inference; C8/the
  /// backend expand this into the destroy-live-owners-then-return-`Err` control flow (§4.5).
  Propagate(Box<HExpr>),
  /// A string-interpolation literal, desugared to a call to the runtime's interpolation
  /// helper over each text fragment and embedded-expression part in order (§6: "the core
  /// treats interpolated expressions as ordinary expressions concatenated to string
  /// fragments").
  Interpolate(Vec<HExpr>),
  StructLit { name: crate::types::QName, fields: Vec<(Symbol, HExpr)> },
  EnumLit { enum_name: crate::types::QName, variant: Symbol, args: Vec<HExpr> },
  ArrayLit(Vec<HExpr>),
}

#[derive(Clone, Debug)]
pub struct HBlock { pub stmts: Vec<HStmt> }

#[derive(Clone, Debug)]
pub enum HStmt {
  Let { name: Symbol, ty: Ty, value: HExpr, span: FileSpan },
  Rebind { name: Symbol, value: HExpr, span: FileSpan },
  Expr(HExpr),
  If { arms: Vec<(HExpr, HBlock)>, else_block: Option<HBlock>, span: FileSpan },
  While { cond: HExpr, body: HBlock, span: FileSpan },
  Foreach { binding: Symbol, iter: HExpr, body: HBlock, span: FileSpan },
  Match { scrutinee: HExpr, arms: Vec<HMatchArm>, span: FileSpan },
  Break { span: FileSpan },
  Continue { span: FileSpan },
  /// Always wraps a `Result` constructor by the time C5 is done (§4.5).
  Return { value: HExpr, span: FileSpan },
}

#[derive(Clone, Debug)]
pub struct HMatchArm {
  pub pattern: crate::types::ast::Pattern,
  pub body: HBlock,
  pub span: FileSpan,
}

/// The output contract's per-function signature (§6): name, `(name, type, borrow-mode)`
/// parameter list, and the return type which is always `Result<T, E>` post-lowering.
#[derive(Clone, Debug)]
pub struct HSignature {
  pub name: Symbol,
  pub params: Vec<(Symbol, Ty, Option<BorrowMode>)>,
  pub ret: Ty,
}

#[derive(Clone, Debug)]
pub struct HFunction {
  pub qname: crate::types::QName,
  pub sig: HSignature,
  pub body: HBlock,
  pub linkage: crate::types::linkage::Linkage,
}
