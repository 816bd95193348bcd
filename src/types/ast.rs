//! The input contract (§6): the parse tree produced by the external parser. The core never
//! re-parses source; it only ever walks and annotates this tree (or a freshly cloned copy of
//! it, produced by C4/C5).

use smallvec::SmallVec;
use crate::span::{FileSpan, Spanned};
use crate::symbol::Symbol;
pub use crate::types::ty::BorrowMode;
use crate::types::NodeId;

/// Surface type syntax, before name resolution. `T | E` and explicit `Result<T, E>` are kept
/// distinct so C7 can reject nesting one inside the other (`DoubleWrappedResult`).
#[derive(Clone, Debug)]
pub enum TypeExpr {
  Primitive(PrimitiveName),
  FixedArray(Box<TypeExpr>, Box<Expr>),
  DynArray(Box<TypeExpr>),
  Ref(BorrowMode, Box<TypeExpr>),
  /// A nominal type with an optional type-argument list: `Foo`, `Foo<i32>`, `Pair<T, U>`.
  Nominal(Symbol, Vec<TypeExpr>),
  /// `T | E`, sugar for "this function's true return type is `Result<T, E>`" (§4.7).
  ResultShorthand(Box<TypeExpr>, Box<TypeExpr>),
  /// Explicit `Result<T, E>` spelled out by the user.
  ExplicitResult(Box<TypeExpr>, Box<TypeExpr>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PrimitiveName { I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool, Str, Unit }

/// A perk/trait bound list attached to a declared type parameter: `T: Hashable + Displayable`.
#[derive(Clone, Debug)]
pub struct TypeParamDecl {
  pub name: Symbol,
  pub bounds: Vec<Symbol>,
}

/// A function/method parameter: name, declared type, and borrow-mode if the type is a
/// reference (kept separately for readability even though it's redundant with `ty`).
#[derive(Clone, Debug)]
pub struct Param {
  pub name: Symbol,
  pub ty: TypeExpr,
  pub span: FileSpan,
}

/// A function or method signature.
#[derive(Clone, Debug)]
pub struct Signature {
  pub name: Symbol,
  pub type_params: Vec<TypeParamDecl>,
  pub params: Vec<Param>,
  pub ret: TypeExpr,
  pub public: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
  pub id: NodeId,
  pub sig: Signature,
  pub body: Block,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
  pub name: Symbol,
  pub ty: TypeExpr,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
  pub id: NodeId,
  pub name: Symbol,
  pub type_params: Vec<TypeParamDecl>,
  pub fields: Vec<FieldDecl>,
  pub methods: Vec<FunctionDecl>,
  pub public: bool,
  pub span: FileSpan,
}

/// An enum variant, with an optional positional-tuple payload (§3).
#[derive(Clone, Debug)]
pub struct VariantDecl {
  pub name: Symbol,
  pub payload: Vec<TypeExpr>,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
  pub id: NodeId,
  pub name: Symbol,
  pub type_params: Vec<TypeParamDecl>,
  pub variants: Vec<VariantDecl>,
  pub methods: Vec<FunctionDecl>,
  pub public: bool,
  pub span: FileSpan,
}

/// A perk (trait) declaration: a bundle of method signatures.
#[derive(Clone, Debug)]
pub struct PerkDecl {
  pub id: NodeId,
  pub name: Symbol,
  pub methods: Vec<Signature>,
  pub public: bool,
  pub span: FileSpan,
}

/// `impl PerkName for ReceiverType: ...`
#[derive(Clone, Debug)]
pub struct ImplDecl {
  pub id: NodeId,
  pub perk: Symbol,
  pub receiver: TypeExpr,
  pub methods: Vec<FunctionDecl>,
  pub span: FileSpan,
}

/// `extend ReceiverType: ...` — methods attached to a receiver type pattern without an
/// owning perk.
#[derive(Clone, Debug)]
pub struct ExtensionDecl {
  pub id: NodeId,
  pub receiver: TypeExpr,
  pub methods: Vec<FunctionDecl>,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct ConstDecl {
  pub id: NodeId,
  pub name: Symbol,
  pub ty: TypeExpr,
  pub value: Expr,
  pub public: bool,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct UseDecl {
  pub path: Vec<Symbol>,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub enum Decl {
  Function(FunctionDecl),
  Struct(StructDecl),
  Enum(EnumDecl),
  Perk(PerkDecl),
  Impl(ImplDecl),
  Extension(ExtensionDecl),
  Const(ConstDecl),
  Use(UseDecl),
}

impl Decl {
  #[must_use] pub fn span(&self) -> &FileSpan {
    match self {
      Decl::Function(d) => &d.span,
      Decl::Struct(d) => &d.span,
      Decl::Enum(d) => &d.span,
      Decl::Perk(d) => &d.span,
      Decl::Impl(d) => &d.span,
      Decl::Extension(d) => &d.span,
      Decl::Const(d) => &d.span,
      Decl::Use(d) => &d.span,
    }
  }
}

/// One parsed source file and the top-level declarations in source order (§3 "Unit").
#[derive(Clone, Debug)]
pub struct Unit {
  pub name: Symbol,
  pub decls: Vec<Decl>,
  pub source: String,
}

/// A sequence of statements making up a function/block body.
#[derive(Clone, Debug, Default)]
pub struct Block {
  pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub enum Stmt {
  Let { name: Symbol, ty: Option<TypeExpr>, value: Expr, span: FileSpan },
  Rebind { name: Symbol, value: Expr, span: FileSpan },
  Expr(Expr),
  If { arms: Vec<(Expr, Block)>, else_block: Option<Block>, span: FileSpan },
  While { cond: Expr, body: Block, span: FileSpan },
  Foreach { binding: Symbol, iter: Expr, body: Block, span: FileSpan },
  Match { scrutinee: Expr, arms: Vec<MatchArm>, span: FileSpan },
  Break { span: FileSpan },
  Continue { span: FileSpan },
  Return { value: Option<Expr>, span: FileSpan },
}

#[derive(Clone, Debug)]
pub struct MatchArm {
  pub pattern: Pattern,
  pub body: Block,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub enum Pattern {
  Literal(Literal, FileSpan),
  Wildcard(FileSpan),
  /// A binding name (irrefutable pattern).
  Binding(Symbol, FileSpan),
  /// `Variant(p0, p1, ...)`, decomposing an enum payload positionally; nested patterns decompose
  /// further.
  Variant { name: Symbol, args: Vec<Pattern>, span: FileSpan },
}

impl Pattern {
  #[must_use] pub fn span(&self) -> &FileSpan {
    match self {
      Pattern::Literal(_, s) | Pattern::Wildcard(s) | Pattern::Binding(_, s) => s,
      Pattern::Variant { span, .. } => span,
    }
  }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum BinOp {
  Add, Sub, Mul, Div, Mod,
  Eq, Ne, Lt, Le, Gt, Ge,
  And, Or,
  BitAnd, BitOr, BitXor, Shl, Shr,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum UnOp { Neg, Not, BitNot }

#[derive(Clone, Debug)]
pub enum Literal {
  Int(i128),
  Float(f64),
  Bool(bool),
  Str(String),
  Unit,
}

/// A fragment of a string-interpolation literal: either a literal run of text or an embedded
/// expression (§6 "the core treats interpolated expressions as ordinary expressions
/// concatenated to string fragments").
#[derive(Clone, Debug)]
pub enum InterpPart {
  Text(String),
  Expr(Box<Expr>),
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Literal(Literal),
  Interp(Vec<InterpPart>),
  Var(Symbol),
  Binary(BinOp, Box<Expr>, Box<Expr>),
  Unary(UnOp, Box<Expr>),
  Call { callee: Box<Expr>, args: Vec<Expr> },
  /// `x.m(args)`: a method or extension call, resolved to a free function by C5.
  MethodCall { receiver: Box<Expr>, method: Symbol, args: Vec<Expr> },
  Field { base: Box<Expr>, field: Symbol },
  Index { base: Box<Expr>, index: Box<Expr> },
  /// `a..b` / `a..=b`.
  Range { start: Box<Expr>, end: Box<Expr>, inclusive: bool },
  Borrow(BorrowMode, Box<Expr>),
  Cast(Box<Expr>, TypeExpr),
  /// `e??`, C5's propagation operator.
  Propagate(Box<Expr>),
  /// Struct construction: `Foo { field: value, ... }`.
  StructLit { name: Symbol, type_args: Vec<TypeExpr>, fields: Vec<(Symbol, Expr)> },
  /// Enum variant construction: `Foo.Variant(args)`.
  EnumLit { enum_name: Symbol, type_args: Vec<TypeExpr>, variant: Symbol, args: Vec<Expr> },
  /// `from([1, 2, 3])`-style array literal.
  ArrayLit(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub struct Expr {
  pub id: NodeId,
  pub kind: ExprKind,
  pub span: FileSpan,
}

/// A small positional-arg helper used by literal array/tuple builders in tests and the
/// constant evaluator.
pub type ArgList = SmallVec<[Expr; 4]>;

pub type SpannedSymbol = Spanned<Symbol>;
