//! The data model shared by every pass: the input AST (§6 input contract), resolved types,
//! symbol-table entities, and the post-lowering HIR (§6 output contract).

pub mod ast;
pub mod ty;
pub mod entity;
pub mod hir;
pub mod linkage;

/// A stable integer id for an AST node, used by side-table annotation maps instead of object
/// identity (Design Notes: "AST identity via object references ... use arena allocation with
/// integer node ids; cross-referencing annotations index into side tables").
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(pub u32);

/// Assigns fresh, monotonically increasing [`NodeId`]s within one unit.
#[derive(Default)]
pub struct NodeIdGen(u32);

impl NodeIdGen {
  #[must_use] pub fn new() -> Self { Self(0) }
  pub fn next(&mut self) -> NodeId { let id = NodeId(self.0); self.0 += 1; id }
}

/// A fully-qualified name: the owning unit plus the declared name, the key every top-level
/// declaration is registered under (§3 "Symbols").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct QName {
  pub unit: crate::symbol::Symbol,
  pub name: crate::symbol::Symbol,
}

impl QName {
  #[must_use] pub fn new(unit: crate::symbol::Symbol, name: crate::symbol::Symbol) -> Self {
    Self { unit, name }
  }
}
