//! C4: the Monomorphizer (§4.4).
//!
//! For each instantiation C3 recorded, clones the generic template's AST, substitutes every
//! type parameter recursively, and registers a new concrete symbol under a mangled name
//! (§4.4's deterministic mangling scheme, implemented in `mangle.rs`). Before cloning, every
//! type argument is checked against the template's declared perk bounds; a failure yields
//! `UnsatisfiedConstraint` and the instantiation is skipped rather than cloned half-broken
//! (§7: "Generic ... skip instantiating the failing template").

use hashbrown::HashMap;
use log::{debug, trace};
use smallvec::SmallVec;

use crate::diag::{Code, DiagnosticBag};
use crate::instantiate::{InstantiationSet, Template};
use crate::mangle;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{
  Block, EnumDecl, Expr, ExprKind, FieldDecl, FunctionDecl, InterpPart, MatchArm, Pattern,
  Signature, Stmt, StructDecl, TypeExpr, Unit,
};
use crate::types::entity::{
  EnumEntity, Entity, FieldEntity, FuncEntity, FuncTc, StructEntity, SymbolTable, VariantEntity,
  Visibility,
};
use crate::types::entity::BuiltinPerk;
use crate::types::ty::{Ty, TypeParam};
use crate::types::QName;

/// A mangled clone ready to be merged into the global symbol table, plus the index entry that
/// lets `fingerprint.rs` and diagnostics map `(template, args)` back to the mangled `QName`
/// (§8 Testable Property 4).
pub struct MonomorphizeOutput {
  pub new_entities: Vec<(QName, Entity)>,
  pub index: HashMap<(QName, Vec<Ty>), QName>,
}

/// Index over the original parsed units so the monomorphizer can find a generic template's
/// AST body, which the symbol table alone does not retain (C1 keeps only the resolved shell).
struct DeclIndex<'a> {
  structs: HashMap<QName, &'a StructDecl>,
  enums: HashMap<QName, &'a EnumDecl>,
  funcs: HashMap<QName, &'a FunctionDecl>,
}

fn build_decl_index(units: &'_ [Unit]) -> DeclIndex<'_> {
  let mut idx = DeclIndex { structs: HashMap::new(), enums: HashMap::new(), funcs: HashMap::new() };
  for unit in units {
    for decl in &unit.decls {
      match decl {
        crate::types::ast::Decl::Struct(s) => {
          idx.structs.insert(crate::resolve::qname(unit.name, s.name), s);
          for m in &s.methods { idx.funcs.insert(crate::resolve::qname(unit.name, m.sig.name), m); }
        }
        crate::types::ast::Decl::Enum(e) => {
          idx.enums.insert(crate::resolve::qname(unit.name, e.name), e);
          for m in &e.methods { idx.funcs.insert(crate::resolve::qname(unit.name, m.sig.name), m); }
        }
        crate::types::ast::Decl::Function(f) => { idx.funcs.insert(crate::resolve::qname(unit.name, f.sig.name), f); }
        crate::types::ast::Decl::Impl(i) => for m in &i.methods { idx.funcs.insert(crate::resolve::qname(unit.name, m.sig.name), m); }
        crate::types::ast::Decl::Extension(ext) => for m in &ext.methods { idx.funcs.insert(crate::resolve::qname(unit.name, m.sig.name), m); }
        _ => {}
      }
    }
  }
  idx
}

/// Render a resolved [`Ty`] back into surface [`TypeExpr`] syntax, the inverse of
/// `resolve::resolve_type` restricted to the concrete types a monomorphization substitution
/// ever produces (no `Param`s survive past this point).
fn ty_to_type_expr(ty: &Ty, interner: &mut Interner) -> TypeExpr {
  use crate::types::ty::Builtin;
  match ty {
    Ty::Primitive(p) => TypeExpr::Primitive(prim_name(*p)),
    Ty::FixedArray(elem, n) => {
      let len = Expr {
        id: crate::types::NodeId(0),
        kind: ExprKind::Literal(crate::types::ast::Literal::Int(i128::from(*n))),
        span: dummy_span(),
      };
      TypeExpr::FixedArray(Box::new(ty_to_type_expr(elem, interner)), Box::new(len))
    }
    Ty::DynArray(elem) => TypeExpr::DynArray(Box::new(ty_to_type_expr(elem, interner))),
    Ty::Ref(mode, elem) => TypeExpr::Ref(*mode, Box::new(ty_to_type_expr(elem, interner))),
    Ty::Param(p) => TypeExpr::Nominal(*p, Vec::new()),
    Ty::Nominal(q, args) => {
      let args = args.iter().map(|a| ty_to_type_expr(a, interner)).collect();
      TypeExpr::Nominal(q.name, args)
    }
    Ty::Builtin(Builtin::Result(a, e)) =>
      TypeExpr::ExplicitResult(Box::new(ty_to_type_expr(a, interner)), Box::new(ty_to_type_expr(e, interner))),
    Ty::Builtin(b) => {
      let name = interner.intern(b.template_name());
      let args = b.type_args().into_iter().map(|a| ty_to_type_expr(a, interner)).collect();
      TypeExpr::Nominal(name, args)
    }
  }
}

fn prim_name(p: crate::types::ty::Prim) -> crate::types::ast::PrimitiveName {
  use crate::types::ast::PrimitiveName as P;
  use crate::types::ty::Prim;
  match p {
    Prim::I8 => P::I8, Prim::I16 => P::I16, Prim::I32 => P::I32, Prim::I64 => P::I64,
    Prim::U8 => P::U8, Prim::U16 => P::U16, Prim::U32 => P::U32, Prim::U64 => P::U64,
    Prim::F32 => P::F32, Prim::F64 => P::F64, Prim::Bool => P::Bool, Prim::Str => P::Str, Prim::Unit => P::Unit,
  }
}

fn dummy_span() -> crate::span::FileSpan {
  crate::span::FileSpan::new(crate::span::FileId(std::rc::Rc::from("<monomorphized>")), 0, 0)
}

/// Substitute every type-parameter occurrence in a [`TypeExpr`] using `subst` (param name ->
/// concrete [`Ty`]); non-parameter nominal names (plain user types, builtins) recurse through
/// their own type arguments unchanged except for nested substitution.
fn subst_type_expr(te: &TypeExpr, subst: &HashMap<Symbol, Ty>, interner: &mut Interner) -> TypeExpr {
  match te {
    TypeExpr::Primitive(p) => TypeExpr::Primitive(*p),
    TypeExpr::FixedArray(elem, len) => TypeExpr::FixedArray(Box::new(subst_type_expr(elem, subst, interner)), len.clone()),
    TypeExpr::DynArray(elem) => TypeExpr::DynArray(Box::new(subst_type_expr(elem, subst, interner))),
    TypeExpr::Ref(m, elem) => TypeExpr::Ref(*m, Box::new(subst_type_expr(elem, subst, interner))),
    TypeExpr::Nominal(name, args) => {
      if args.is_empty() {
        if let Some(ty) = subst.get(name) { return ty_to_type_expr(ty, interner); }
      }
      TypeExpr::Nominal(*name, args.iter().map(|a| subst_type_expr(a, subst, interner)).collect())
    }
    TypeExpr::ResultShorthand(t, e) => TypeExpr::ResultShorthand(
      Box::new(subst_type_expr(t, subst, interner)), Box::new(subst_type_expr(e, subst, interner))),
    TypeExpr::ExplicitResult(t, e) => TypeExpr::ExplicitResult(
      Box::new(subst_type_expr(t, subst, interner)), Box::new(subst_type_expr(e, subst, interner))),
  }
}

fn subst_expr(e: &Expr, subst: &HashMap<Symbol, Ty>, interner: &mut Interner) -> Expr {
  let kind = match &e.kind {
    ExprKind::Literal(l) => ExprKind::Literal(l.clone()),
    ExprKind::Interp(parts) => ExprKind::Interp(parts.iter().map(|p| match p {
      InterpPart::Text(t) => InterpPart::Text(t.clone()),
      InterpPart::Expr(inner) => InterpPart::Expr(Box::new(subst_expr(inner, subst, interner))),
    }).collect()),
    ExprKind::Var(s) => ExprKind::Var(*s),
    ExprKind::Binary(op, l, r) => ExprKind::Binary(*op, Box::new(subst_expr(l, subst, interner)), Box::new(subst_expr(r, subst, interner))),
    ExprKind::Unary(op, i) => ExprKind::Unary(*op, Box::new(subst_expr(i, subst, interner))),
    ExprKind::Call { callee, args } => ExprKind::Call {
      callee: Box::new(subst_expr(callee, subst, interner)),
      args: args.iter().map(|a| subst_expr(a, subst, interner)).collect(),
    },
    ExprKind::MethodCall { receiver, method, args } => ExprKind::MethodCall {
      receiver: Box::new(subst_expr(receiver, subst, interner)), method: *method,
      args: args.iter().map(|a| subst_expr(a, subst, interner)).collect(),
    },
    ExprKind::Field { base, field } => ExprKind::Field { base: Box::new(subst_expr(base, subst, interner)), field: *field },
    ExprKind::Index { base, index } => ExprKind::Index {
      base: Box::new(subst_expr(base, subst, interner)), index: Box::new(subst_expr(index, subst, interner)),
    },
    ExprKind::Range { start, end, inclusive } => ExprKind::Range {
      start: Box::new(subst_expr(start, subst, interner)), end: Box::new(subst_expr(end, subst, interner)), inclusive: *inclusive,
    },
    ExprKind::Borrow(m, i) => ExprKind::Borrow(*m, Box::new(subst_expr(i, subst, interner))),
    ExprKind::Cast(i, te) => ExprKind::Cast(Box::new(subst_expr(i, subst, interner)), subst_type_expr(te, subst, interner)),
    ExprKind::Propagate(i) => ExprKind::Propagate(Box::new(subst_expr(i, subst, interner))),
    ExprKind::StructLit { name, type_args, fields } => ExprKind::StructLit {
      name: *name, type_args: type_args.iter().map(|t| subst_type_expr(t, subst, interner)).collect(),
      fields: fields.iter().map(|(n, v)| (*n, subst_expr(v, subst, interner))).collect(),
    },
    ExprKind::EnumLit { enum_name, type_args, variant, args } => ExprKind::EnumLit {
      enum_name: *enum_name, type_args: type_args.iter().map(|t| subst_type_expr(t, subst, interner)).collect(),
      variant: *variant, args: args.iter().map(|a| subst_expr(a, subst, interner)).collect(),
    },
    ExprKind::ArrayLit(items) => ExprKind::ArrayLit(items.iter().map(|i| subst_expr(i, subst, interner)).collect()),
  };
  Expr { id: e.id, kind, span: e.span.clone() }
}

fn subst_pattern(p: &Pattern, _subst: &HashMap<Symbol, Ty>, _interner: &mut Interner) -> Pattern {
  // Patterns destructure values, not types; nothing to substitute beyond recursing so the
  // clone is structurally independent of the original tree (matches C4's "avoid shared
  // substructure" design note).
  match p {
    Pattern::Literal(l, s) => Pattern::Literal(l.clone(), s.clone()),
    Pattern::Wildcard(s) => Pattern::Wildcard(s.clone()),
    Pattern::Binding(n, s) => Pattern::Binding(*n, s.clone()),
    Pattern::Variant { name, args, span } => Pattern::Variant {
      name: *name, args: args.iter().map(|a| subst_pattern(a, _subst, _interner)).collect(), span: span.clone(),
    },
  }
}

fn subst_stmt(s: &Stmt, subst: &HashMap<Symbol, Ty>, interner: &mut Interner) -> Stmt {
  match s {
    Stmt::Let { name, ty, value, span } => Stmt::Let {
      name: *name, ty: ty.as_ref().map(|t| subst_type_expr(t, subst, interner)),
      value: subst_expr(value, subst, interner), span: span.clone(),
    },
    Stmt::Rebind { name, value, span } => Stmt::Rebind { name: *name, value: subst_expr(value, subst, interner), span: span.clone() },
    Stmt::Expr(e) => Stmt::Expr(subst_expr(e, subst, interner)),
    Stmt::If { arms, else_block, span } => Stmt::If {
      arms: arms.iter().map(|(c, b)| (subst_expr(c, subst, interner), subst_block(b, subst, interner))).collect(),
      else_block: else_block.as_ref().map(|b| subst_block(b, subst, interner)), span: span.clone(),
    },
    Stmt::While { cond, body, span } => Stmt::While { cond: subst_expr(cond, subst, interner), body: subst_block(body, subst, interner), span: span.clone() },
    Stmt::Foreach { binding, iter, body, span } => Stmt::Foreach {
      binding: *binding, iter: subst_expr(iter, subst, interner), body: subst_block(body, subst, interner), span: span.clone(),
    },
    Stmt::Match { scrutinee, arms, span } => Stmt::Match {
      scrutinee: subst_expr(scrutinee, subst, interner),
      arms: arms.iter().map(|a| MatchArm {
        pattern: subst_pattern(&a.pattern, subst, interner), body: subst_block(&a.body, subst, interner), span: a.span.clone(),
      }).collect(),
      span: span.clone(),
    },
    Stmt::Break { span } => Stmt::Break { span: span.clone() },
    Stmt::Continue { span } => Stmt::Continue { span: span.clone() },
    Stmt::Return { value, span } => Stmt::Return { value: value.as_ref().map(|v| subst_expr(v, subst, interner)), span: span.clone() },
  }
}

fn subst_block(b: &Block, subst: &HashMap<Symbol, Ty>, interner: &mut Interner) -> Block {
  Block { stmts: b.stmts.iter().map(|s| subst_stmt(s, subst, interner)).collect() }
}

fn subst_signature(sig: &Signature, subst: &HashMap<Symbol, Ty>, interner: &mut Interner) -> Signature {
  Signature {
    name: sig.name,
    type_params: Vec::new(), // fully concrete post-substitution
    params: sig.params.iter().map(|p| crate::types::ast::Param {
      name: p.name, ty: subst_type_expr(&p.ty, subst, interner), span: p.span.clone(),
    }).collect(),
    ret: subst_type_expr(&sig.ret, subst, interner),
    public: sig.public,
  }
}

fn subst_function(f: &FunctionDecl, subst: &HashMap<Symbol, Ty>, interner: &mut Interner, mangled_name: Symbol) -> FunctionDecl {
  let mut sig = subst_signature(&f.sig, subst, interner);
  sig.name = mangled_name;
  FunctionDecl { id: f.id, sig, body: subst_block(&f.body, subst, interner), span: f.span.clone() }
}

/// Does `ty` satisfy `perk` — either via a registered `impl perk for ty` or one of the
/// synthetic primitive implementations (§4.7, SPEC_FULL.md §3)?
fn satisfies_perk(ty: &Ty, perk: QName, table: &SymbolTable, interner: &Interner) -> bool {
  if let Ty::Primitive(_) | Ty::Ref(..) = ty {
    let perk_name = interner.resolve(perk.name);
    if let Some(builtin) = BuiltinPerk::from_str(perk_name) {
      return synthetic_primitive_satisfies(ty, builtin);
    }
  }
  table.entities.values().any(|e| matches!(e, Entity::PerkImpl(pi) if pi.perk == perk && pi.receiver == *ty))
}

fn synthetic_primitive_satisfies(ty: &Ty, perk: BuiltinPerk) -> bool {
  match perk {
    // Every primitive is Hashable/Displayable/Equatable via C6's derivation and the language's
    // built-in comparison/print machinery (§4.7: "primitives automatically satisfy `Hashable`,
    // `Displayable`, etc., when a matching auto-derived method exists").
    BuiltinPerk::Hashable | BuiltinPerk::Displayable | BuiltinPerk::Equatable => matches!(ty, Ty::Primitive(_)),
  }
}

/// Run C4 over every instantiation C3 recorded. `interner` is mutable because mangled names
/// must be freshly interned.
pub fn monomorphize(
  units: &[Unit], table: &SymbolTable, instantiations: &InstantiationSet,
  interner: &mut Interner, bag: &mut DiagnosticBag,
) -> MonomorphizeOutput {
  let decl_index = build_decl_index(units);
  let mut out = MonomorphizeOutput { new_entities: Vec::new(), index: HashMap::new() };

  for inst in instantiations.iter() {
    let Template::User(template_qn) = &inst.template else { continue };
    let Some(entity) = table.get(template_qn) else { continue };
    let type_params: &[TypeParam] = match entity {
      Entity::Struct(s) => &s.type_params,
      Entity::Enum(e) => &e.type_params,
      Entity::Func(f) => match &f.tc { FuncTc::Typed(ty) => &ty.type_params, FuncTc::ForwardDeclared => &[] },
      _ => continue,
    };
    if type_params.is_empty() { continue; } // not actually generic: nothing to monomorphize
    if type_params.len() != inst.args.len() { continue; } // arity mismatch: C7 will report it

    let mut unsatisfied = false;
    for (tp, arg) in type_params.iter().zip(&inst.args) {
      for &bound in &tp.bounds {
        if !satisfies_perk(arg, bound, table, interner) {
          bag.error(Code::UnsatisfiedConstraint, *entity.span(),
            format!("type argument `{}` does not satisfy perk bound `{}`", arg.render(interner), interner.resolve(bound.name)));
          unsatisfied = true;
        }
      }
    }
    if unsatisfied { continue; }

    let mangled = mangle::mangle_name(interner.resolve(template_qn.name), &inst.args, interner);
    let mangled_sym = interner.intern(&mangled);
    let mangled_qn = QName::new(template_qn.unit, mangled_sym);
    if out.index.contains_key(&(*template_qn, inst.args.clone())) { continue; } // already cloned

    let mut subst: HashMap<Symbol, Ty> = HashMap::new();
    for (tp, arg) in type_params.iter().zip(&inst.args) { subst.insert(tp.name, arg.clone()); }

    debug!("C4: monomorphizing {} with {} args -> {mangled}", interner.resolve(template_qn.name), inst.args.len());

    match entity {
      Entity::Struct(s) => {
        let Some(decl) = decl_index.structs.get(template_qn) else { continue };
        let fields: Vec<FieldEntity> = decl.fields.iter().zip(&s.fields).map(|(_fd, fe): (&FieldDecl, &FieldEntity)| {
          FieldEntity { name: fe.name, ty: fe.ty.substitute(&subst) }
        }).collect();
        let methods = clone_methods(&s.methods, &decl.methods, &subst, interner, &mangled, &mut out);
        out.new_entities.push((mangled_qn, Entity::Struct(StructEntity {
          qname: mangled_qn, vis: s.vis, type_params: Vec::new(), fields,
          methods, span: s.span.clone(), mono_origin: Some((*template_qn, inst.args.clone().into())),
        })));
      }
      Entity::Enum(e) => {
        let Some(decl) = decl_index.enums.get(template_qn) else { continue };
        let variants: Vec<VariantEntity> = e.variants.iter().map(|v| {
          VariantEntity { name: v.name, payload: v.payload.iter().map(|t| t.substitute(&subst)).collect() }
        }).collect();
        let methods = clone_methods(&e.methods, &decl.methods, &subst, interner, &mangled, &mut out);
        out.new_entities.push((mangled_qn, Entity::Enum(EnumEntity {
          qname: mangled_qn, vis: e.vis, type_params: Vec::new(), variants,
          methods, span: e.span.clone(), mono_origin: Some((*template_qn, inst.args.clone().into())),
        })));
      }
      Entity::Func(f) => {
        let Some(decl) = decl_index.funcs.get(template_qn) else { continue };
        let clone = subst_function(decl, &subst, interner, mangled_sym);
        out.new_entities.push((mangled_qn, Entity::Func(FuncEntity {
          qname: mangled_qn, vis: f.vis, tc: FuncTc::ForwardDeclared, body: clone,
          is_entry_point: false, mono_origin: Some((*template_qn, inst.args.clone().into())),
        })));
      }
      _ => unreachable!("filtered to struct/enum/func above"),
    }
    out.index.insert((*template_qn, inst.args.clone()), mangled_qn);
  }

  trace!("C4: produced {} monomorphized entities", out.new_entities.len());
  out
}

/// Cascade-instantiate every method of a struct/enum template for the same substitution
/// (§4.3 "Instantiations cascade"), mangling each as `method__<StructMangledName>`.
fn clone_methods(
  method_qnames: &SmallVec<[QName; 4]>, method_decls: &[FunctionDecl],
  subst: &HashMap<Symbol, Ty>, interner: &mut Interner, owner_mangled: &str,
  out: &mut MonomorphizeOutput,
) -> SmallVec<[QName; 4]> {
  let mut cloned = SmallVec::new();
  for (qn, decl) in method_qnames.iter().zip(method_decls) {
    let method_name = interner.resolve(decl.sig.name).to_string();
    let mangled_name = format!("{method_name}__{owner_mangled}");
    let mangled_sym = interner.intern(&mangled_name);
    let clone = subst_function(decl, subst, interner, mangled_sym);
    let new_qn = QName::new(qn.unit, mangled_sym);
    out.new_entities.push((new_qn, Entity::Func(FuncEntity {
      qname: new_qn, vis: Visibility::Public, tc: FuncTc::ForwardDeclared, body: clone,
      is_entry_point: false, mono_origin: None,
    })));
    cloned.push(new_qn);
  }
  cloned
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{FileId, FileSpan};
  use crate::types::ast::*;
  use crate::types::ty::Prim;
  use std::rc::Rc;

  fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("t.sushi")), 0, 1) }

  #[test]
  fn monomorphizes_a_generic_struct_for_two_type_arguments() {
    // Mirrors §8 scenario 6: `List<T>` instantiated for `i32` and `string`.
    let mut interner = Interner::new();
    let unit_name = interner.intern("main");
    let list = interner.intern("List");
    let t = interner.intern("T");
    let push = interner.intern("push");
    let push_sig = Signature {
      name: push, type_params: vec![], params: vec![Param { name: t, ty: TypeExpr::Nominal(t, vec![]), span: sp() }],
      ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
    };
    let push_fn = FunctionDecl { id: crate::types::NodeId(1), sig: push_sig, body: Block::default(), span: sp() };
    let struct_decl = StructDecl {
      id: crate::types::NodeId(0), name: list,
      type_params: vec![TypeParamDecl { name: t, bounds: vec![] }],
      fields: vec![], methods: vec![push_fn], public: true, span: sp(),
    };
    let unit = Unit { name: unit_name, decls: vec![Decl::Struct(struct_decl)], source: String::new() };

    let mut bag = DiagnosticBag::new();
    let (table, _) = crate::collect::collect(&[unit.clone()], &interner, &mut bag);
    let insts = crate::instantiate::collect_instantiations(&[unit.clone()], &table, &mut bag);

    let list_qn = crate::resolve::qname(unit_name, list);
    let mut manual = crate::instantiate::InstantiationSet::default();
    for args in [vec![Ty::Primitive(Prim::I32)], vec![Ty::Primitive(Prim::Str)]] {
      manual.record(crate::instantiate::Instantiation {
        template: crate::instantiate::Template::User(list_qn), args,
      });
    }
    let _ = insts;
    let out = monomorphize(&[unit], &table, &manual, &mut interner, &mut bag);
    assert!(!bag.has_errors());
    assert_eq!(out.new_entities.len(), 2 /* List clones */ + 2 /* push clones */);
    let mangled_names: Vec<String> = out.new_entities.iter()
      .filter(|(_, e)| matches!(e, Entity::Struct(_)))
      .map(|(qn, _)| interner.resolve(qn.name).to_string())
      .collect();
    assert!(mangled_names.contains(&"List__i32".to_string()));
    assert!(mangled_names.contains(&"List__string".to_string()));
  }
}
