//! Symbol-table entities (§3 "Symbols"): the global, append-only-after-C1 registry every
//! later pass attaches annotations to by keying on a stable [`QName`] rather than by AST
//! object identity.
//!
//! The shape — a small set of `*Tc` "typechecking status" enums (`ForwardDeclared` /
//! `Typed`) wrapped in an `Entity` sum type — is kept from the teacher's `types/entity.rs`
//! almost directly; only the variant payloads change to match Sushi's declaration kinds
//! (struct/enum/perk/impl/extension/const/fn instead of MMC's typedef/proc/global/const).

use hashbrown::HashMap;
use smallvec::SmallVec;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ast::FunctionDecl;
use crate::types::ty::{Ty, TypeParam};
use crate::types::QName;

macro_rules! make_prims {
  {$($(#[$attr0:meta])* enum $name:ident { $($(#[$attr:meta])* $x:ident: $e:expr,)* })*} => {
    $(
      $(#[$attr0])*
      #[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
      pub enum $name { $($(#[$attr])* $x),* }

      impl $name {
        /// Evaluate `f` on every variant with its canonical keyword spelling.
        pub fn scan(mut f: impl FnMut(Self, &'static str)) { $(f($name::$x, $e);)* }

        /// Parse a keyword back into a variant.
        #[must_use] pub fn from_str(s: &str) -> Option<Self> {
          match s { $($e => Some(Self::$x),)* _ => None }
        }
      }
    )*
  }
}

make_prims! {
  /// Built-in perks every value may or may not implement; primitives satisfy some of these
  /// automatically via a synthetic implementation (§4.7).
  enum BuiltinPerk {
    Hashable: "Hashable",
    Displayable: "Displayable",
    Equatable: "Equatable",
  }
}

/// Visibility/linkage classification, computed definitively only at C9 (§4.9) but recorded
/// on every declaration from C1 onward so earlier passes can enforce cross-unit visibility.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Visibility { Private, Public }

/// A function's type-checking status.
#[derive(Clone, Debug)]
pub enum FuncTc {
  ForwardDeclared,
  Typed(FuncTy),
}

#[derive(Clone, Debug)]
pub struct FuncTy {
  pub type_params: Vec<TypeParam>,
  pub params: Vec<(Symbol, Ty)>,
  /// The *true* return type after implicit `Result<T, E>` wrapping (§4.7) — never the bare
  /// surface-syntax return type.
  pub ret: Ty,
}

#[derive(Clone, Debug)]
pub struct FuncEntity {
  pub qname: QName,
  pub vis: Visibility,
  pub tc: FuncTc,
  pub body: FunctionDecl,
  pub is_entry_point: bool,
  /// `Some((template, args))` when this entity is a C4-produced monomorphized copy;
  /// `None` for an original declaration (generic template or already-concrete function).
  /// Consulted by `fingerprint.rs` for linkage classification (§4.9: `weak-odr`) and by
  /// `lower.rs`/`typeck.rs` to skip generic templates, which are never themselves lowered.
  pub mono_origin: Option<(QName, smallvec::SmallVec<[Ty; 2]>)>,
}

#[derive(Clone, Debug)]
pub struct ConstEntity {
  pub qname: QName,
  pub vis: Visibility,
  pub ty: Ty,
  /// The constant's value, produced eagerly by C1's constant evaluator (§4.1). Stored as a
  /// resolved literal rather than a re-walkable AST since constants are "never mutated"
  /// (§3 lifecycle).
  pub value: crate::const_eval::ConstValue,
  pub span: FileSpan,
}

#[derive(Clone, Debug)]
pub struct FieldEntity {
  pub name: Symbol,
  pub ty: Ty,
}

#[derive(Clone, Debug)]
pub struct StructEntity {
  pub qname: QName,
  pub vis: Visibility,
  pub type_params: Vec<TypeParam>,
  pub fields: Vec<FieldEntity>,
  pub methods: SmallVec<[QName; 4]>,
  pub span: FileSpan,
  /// `Some((template, args))` for a C4-produced monomorphized copy (§4.4).
  pub mono_origin: Option<(QName, SmallVec<[Ty; 2]>)>,
}

#[derive(Clone, Debug)]
pub struct VariantEntity {
  pub name: Symbol,
  pub payload: Vec<Ty>,
}

#[derive(Clone, Debug)]
pub struct EnumEntity {
  pub qname: QName,
  pub vis: Visibility,
  pub type_params: Vec<TypeParam>,
  pub variants: Vec<VariantEntity>,
  pub methods: SmallVec<[QName; 4]>,
  pub span: FileSpan,
  /// `Some((template, args))` for a C4-produced monomorphized copy (§4.4).
  pub mono_origin: Option<(QName, SmallVec<[Ty; 2]>)>,
}

#[derive(Clone, Debug)]
pub struct PerkMethodSig {
  pub name: Symbol,
  pub params: Vec<Ty>,
  pub ret: Ty,
}

#[derive(Clone, Debug)]
pub struct PerkEntity {
  pub qname: QName,
  pub vis: Visibility,
  pub methods: Vec<PerkMethodSig>,
  pub span: FileSpan,
}

/// `impl perk for ty`: a method table keyed by method name (§3 "perk implementations").
#[derive(Clone, Debug)]
pub struct PerkImplEntity {
  pub perk: QName,
  pub receiver: Ty,
  pub methods: HashMap<Symbol, QName>,
  pub span: FileSpan,
}

/// An extension: a receiver-type pattern plus the method set it attaches (§3).
#[derive(Clone, Debug)]
pub struct ExtensionEntity {
  pub receiver: Ty,
  pub methods: HashMap<Symbol, QName>,
  pub span: FileSpan,
}

/// Any top-level declaration, once registered (§3's global symbol table).
#[derive(Clone, Debug)]
pub enum Entity {
  Func(FuncEntity),
  Const(ConstEntity),
  Struct(StructEntity),
  Enum(EnumEntity),
  Perk(PerkEntity),
  PerkImpl(PerkImplEntity),
  Extension(ExtensionEntity),
}

impl Entity {
  #[must_use] pub fn span(&self) -> &FileSpan {
    match self {
      Entity::Func(e) => &e.body.span,
      Entity::Const(e) => &e.span,
      Entity::Struct(e) => &e.span,
      Entity::Enum(e) => &e.span,
      Entity::Perk(e) => &e.span,
      Entity::PerkImpl(e) => &e.span,
      Entity::Extension(e) => &e.span,
    }
  }

  #[must_use] pub fn vis(&self) -> Option<Visibility> {
    match self {
      Entity::Func(e) => Some(e.vis),
      Entity::Const(e) => Some(e.vis),
      Entity::Struct(e) => Some(e.vis),
      Entity::Enum(e) => Some(e.vis),
      Entity::Perk(e) => Some(e.vis),
      Entity::PerkImpl(_) | Entity::Extension(_) => None,
    }
  }
}

/// The global symbol table (§3). Append-only after C1: later passes attach their own
/// annotation maps keyed by [`QName`] rather than mutating entities in place.
#[derive(Default, Debug)]
pub struct SymbolTable {
  pub entities: HashMap<QName, Entity>,
  /// Structs/enums live in a separate subspace from functions but collide with perks named
  /// identically (§3 "Name uniqueness").
  pub type_names: HashMap<(Symbol, Symbol), QName>,
  pub func_names: HashMap<(Symbol, Symbol), QName>,
  pub perk_names: HashMap<(Symbol, Symbol), QName>,
}

impl SymbolTable {
  #[must_use] pub fn new() -> Self { Self::default() }

  #[must_use] pub fn get(&self, q: &QName) -> Option<&Entity> { self.entities.get(q) }
}
