//! The sequential driver wiring C1 through C9 (§2 dataflow table, §5 concurrency model).
//!
//! Mirrors the teacher's own top-level shape: a single function runs every pass to completion
//! in order, threading one [`DiagnosticBag`] and one [`crate::symbol::Interner`] through the
//! whole job, the way `mmcc`'s own pipeline threads a single arena and error sink through
//! `build_mir`/`build_vcode`/`codegen`. There are no suspension points and no internal
//! cancellation (§5): a host that wants to abort does so between calls to [`run`], not inside
//! it.

use hashbrown::HashMap;
use log::debug;

use crate::borrowck;
use crate::collect;
use crate::const_eval::ConstValue;
use crate::diag::DiagnosticBag;
use crate::fingerprint::{self, FingerprintOutput};
use crate::hash_derive;
use crate::instantiate;
use crate::lower;
use crate::monomorphize::{self, MonomorphizeOutput};
use crate::scope_move;
use crate::symbol::{Interner, Symbol};
use crate::typeck;
use crate::types::ast::{Decl, Unit};
use crate::types::entity::{Entity, FuncTc, SymbolTable};
use crate::types::hir::HFunction;
use crate::types::ty::{Builtin, Ty};
use crate::types::QName;

/// Target pointer width, carried for `sizeof`-sensitive decisions that remain in scope (e.g.
/// integer literal range checks) without the core ever touching a real memory layout (§4
/// Non-goals: runtime layout). Reserved for that use; no pass currently consults it, since
/// spec.md's fixed integer types (`i8`..`i64`, `u8`..`u64`) don't themselves need a target
/// width to bound-check a literal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointerWidth { Bits32, Bits64 }

/// Explicit configuration threaded through the pipeline rather than kept as ambient
/// process-global state (§9 Design Notes).
#[derive(Clone, Debug)]
pub struct Config {
  pub pointer_width: PointerWidth,
  /// Promote every warning to a fatal exit code (§7: normally `1`, warnings-only).
  pub deny_warnings: bool,
  /// The function name the loader designates as the program's entry point, consulted for
  /// C7's `PropagationFromEntry` warning (§4.7 warning surface).
  pub entry_point: String,
}

impl Default for Config {
  fn default() -> Self {
    Config { pointer_width: PointerWidth::Bits64, deny_warnings: false, entry_point: "main".to_string() }
  }
}

/// Everything the core hands back to an external driver (§6 output contract): one lowered,
/// type-checked, borrow-checked [`HFunction`] per concrete function the program defines (after
/// monomorphization), each carrying its own signature/body/linkage, plus a fingerprint and
/// linkage table keyed by unit/symbol, plus the accumulated diagnostics.
#[derive(Debug)]
pub struct PipelineOutput {
  pub functions: Vec<HFunction>,
  pub fingerprint: FingerprintOutput,
  pub bag: DiagnosticBag,
}

impl PipelineOutput {
  /// §7's `0`/`1`/`2` exit-code mapping, with `config.deny_warnings` additionally promoting a
  /// warnings-only run to `2`.
  #[must_use] pub fn exit_code(&self, config: &Config) -> u8 {
    if self.bag.has_errors() { 2 }
    else if config.deny_warnings && !self.bag.diagnostics().is_empty() { 2 }
    else { self.bag.exit_code() }
  }
}

/// Run the whole C1→C9 sequence over `units`, returning the lowered program. `interner` is
/// mutable because C4 interns freshly mangled names as it clones templates.
pub fn run(units: &[Unit], interner: &mut Interner, config: &Config) -> PipelineOutput {
  let mut bag = DiagnosticBag::new();

  // C1: Declaration Collector.
  debug!("pipeline: C1 collect");
  let (mut table, _index) = collect::collect(units, interner, &mut bag);
  mark_entry_point(&mut table, &config.entry_point, interner);

  if bag.has_errors() {
    // §7: declaration errors "accumulate across all units; halt after C1" — every later pass
    // assumes a table free of duplicate/unresolvable shells, so there is nothing safe to do
    // with it once C1 itself has failed.
    debug!("pipeline: halting after C1 ({} errors)", bag.diagnostics().iter().filter(|d| d.is_fatal()).count());
    return PipelineOutput { functions: Vec::new(), fingerprint: FingerprintOutput::default(), bag };
  }

  // C2: Scope & Move Analyzer, over every *original* declaration (pre-monomorphization: move
  // analysis is rough-typed and doesn't need concrete instantiations to be meaningful, unlike
  // C7/C8 which run only after C5 has produced concrete HIR).
  debug!("pipeline: C2 scope & move");
  for entity in table.entities.values() {
    let Entity::Func(f) = entity else { continue };
    let FuncTc::Typed(fty) = &f.tc else { continue };
    scope_move::analyze_function(
      &f.body.body, &fty.params, &|qn| struct_is_move_only(qn, &table),
      f.body.span.clone(), interner, &mut bag,
    );
  }

  // C3: Instantiation Collector.
  debug!("pipeline: C3 instantiate");
  let instantiations = instantiate::collect_instantiations(units, &table, &mut bag);

  // C4: Monomorphizer. New entities are merged into the shared table and their still-generic
  // (`FuncTc::ForwardDeclared`) function clones get their signatures resolved the same way C1
  // resolves any other function shell, since `subst_function` only rewrites the body/types in
  // place and leaves typing to whoever consumes the clone next.
  debug!("pipeline: C4 monomorphize");
  let mono = monomorphize::monomorphize(units, &table, &instantiations, interner, &mut bag);
  merge_monomorphized(&mut table, mono);
  resolve_monomorphized_signatures(&mut table, interner, &mut bag);

  // C6: Hash Deriver, run structurally over every declared `HashMap` key type in the table
  // (§4.6 "every type reachable as a HashMap key"); catches a dynamic-array key at the
  // declaration site rather than waiting for a call site that happens to construct one.
  debug!("pipeline: C6 hash derivation");
  run_hash_derivation(&table, &mut bag);

  // C5/C7/C8: lower, type-check, and borrow-check every concrete function. Only functions
  // whose signature resolved with zero remaining type parameters are callable code; an
  // unresolved or still-generic template has no concrete body to lower (lower.rs's own doc
  // comment: "only concrete functions reach this pass").
  debug!("pipeline: C5/C7/C8 per function");
  let extension_methods = collect_extension_methods(units);
  let mut functions = Vec::new();
  let qnames: Vec<QName> = table.entities.keys().copied().collect();
  for qn in qnames {
    let Some(Entity::Func(f)) = table.entities.get(&qn) else { continue };
    let FuncTc::Typed(fty) = &f.tc else { continue };
    if !fty.type_params.is_empty() { continue; }
    let params = fty.params.clone();
    let ret = fty.ret.clone();
    let body_decl = f.body.clone();
    let is_entry = f.is_entry_point;
    let is_extension = extension_methods.contains(&qn);
    let linkage = fingerprint::classify_linkage(table.get(&qn).unwrap());

    let mut lowered = lower::lower_function(qn, &body_decl, &params, ret, is_extension, linkage, &table, interner, &mut bag);
    typeck::typecheck_function(&mut lowered, &table, is_entry, interner, &mut bag);
    borrowck::check_function(&lowered, &mut bag);
    functions.push(lowered);
  }

  // C9: Fingerprint & Linkage Engine, over the final (post-C4) table.
  debug!("pipeline: C9 fingerprint");
  let fp = fingerprint::compute(units, &table, interner);

  PipelineOutput { functions, fingerprint: fp, bag }
}

/// `collect::collect` always leaves every [`crate::types::entity::FuncEntity::is_entry_point`]
/// at `false` — marking the one designated entry point is the driver's job, since only the
/// driver knows `config.entry_point` (§9 Design Notes: configuration is explicit, not
/// ambient). Picks the first top-level function whose bare name matches; a name collision
/// across units is already rejected by C1 as a duplicate symbol within its own unit, and
/// cross-unit collisions are the loader's problem (§6 import path contract), not this pass's.
fn mark_entry_point(table: &mut SymbolTable, entry_point: &str, interner: &Interner) {
  let target = table.entities.iter().find_map(|(qn, e)| match e {
    Entity::Func(_) if interner.resolve(qn.name) == entry_point => Some(*qn),
    _ => None,
  });
  if let Some(qn) = target {
    if let Some(Entity::Func(f)) = table.entities.get_mut(&qn) { f.is_entry_point = true; }
  }
}

/// Whether a nominal type recursively contains a dynamic array/`List`/`HashMap`/`Own` member,
/// i.e. moves rather than copies by value (§4.2 "Rules", consumed through [`Ty::is_copy`]'s
/// own closure parameter). Terminates because `Ty::is_copy` never recurses through
/// `DynArray`/`List`/`HashMap`/`Own` back into this closure, and true struct-to-struct
/// containment cycles are already rejected by C1's `check_infinite_size`.
fn struct_is_move_only(qn: &QName, table: &SymbolTable) -> bool {
  match table.get(qn) {
    Some(Entity::Struct(s)) => s.fields.iter().any(|f| !f.ty.is_copy(|inner| struct_is_move_only(inner, table))),
    Some(Entity::Enum(e)) => e.variants.iter()
      .any(|v| v.payload.iter().any(|t| !t.is_copy(|inner| struct_is_move_only(inner, table)))),
    _ => false,
  }
}

/// Fold C4's freshly cloned entities into the shared table, registering each into the name
/// subspace a lookup by `(unit, name)` expects (§3 "Name uniqueness": structs/enums and
/// functions live in separate subspaces).
fn merge_monomorphized(table: &mut SymbolTable, mono: MonomorphizeOutput) {
  for (qn, entity) in mono.new_entities {
    match &entity {
      Entity::Struct(_) | Entity::Enum(_) => { table.type_names.insert((qn.unit, qn.name), qn); }
      Entity::Func(_) => { table.func_names.insert((qn.unit, qn.name), qn); }
      _ => {}
    }
    table.entities.insert(qn, entity);
  }
}

/// Type every monomorphized function clone the same way C1 types an ordinary declaration:
/// `subst_function` only rewrites syntax, so the clone sits at `FuncTc::ForwardDeclared` until
/// something resolves its (now fully concrete) parameter/return types. Reuses the already-
/// evaluated constants from the table rather than re-running C1's evaluator, since a clone's
/// fixed-array length expressions (never substituted — only `Ty::Param` occurrences are) may
/// still reference the same named constants the original declaration did.
fn resolve_monomorphized_signatures(table: &mut SymbolTable, interner: &Interner, bag: &mut DiagnosticBag) {
  let consts: HashMap<Symbol, ConstValue> = table.entities.iter()
    .filter_map(|(qn, e)| if let Entity::Const(c) = e { Some((qn.name, c.value.clone())) } else { None })
    .collect();

  let mut resolved = Vec::new();
  for (qn, entity) in &table.entities {
    let Entity::Func(f) = entity else { continue };
    if !matches!(f.tc, FuncTc::ForwardDeclared) { continue; }
    collect::resolve_one_signature(qn.unit, &f.body, table, &consts, interner, bag, &mut resolved);
  }
  for (qn, fty) in resolved {
    if let Some(Entity::Func(f)) = table.entities.get_mut(&qn) { f.tc = FuncTc::Typed(fty); }
  }
}

/// The set of methods declared inside an `extend` block, consulted by `lower_function`'s
/// `is_extension` gate (Open Question #3: `??` is prohibited inside extension methods).
fn collect_extension_methods(units: &[Unit]) -> hashbrown::HashSet<QName> {
  let mut out = hashbrown::HashSet::new();
  for unit in units {
    for decl in &unit.decls {
      if let Decl::Extension(ext) = decl {
        for m in &ext.methods { out.insert(crate::resolve::qname(unit.name, m.sig.name)); }
      }
    }
  }
  out
}

/// C6: synthesize a hash recipe for every type reachable as a `HashMap` key anywhere in the
/// table's declared signatures (§4.6). `hash_derive::derive` itself reports
/// `NoPerkImplementation` for a key type that turns out unsupported (a dynamic array, most
/// notably — §4.6's "Constraint").
fn run_hash_derivation(table: &SymbolTable, bag: &mut DiagnosticBag) {
  for entity in table.entities.values() {
    let span = entity.span().clone();
    for ty in declared_types(entity) {
      let mut keys = Vec::new();
      collect_hashmap_keys(ty, &mut keys);
      for key in keys { hash_derive::derive(key, table, &span, bag); }
    }
  }
}

fn declared_types(entity: &Entity) -> Vec<&Ty> {
  match entity {
    Entity::Struct(s) => s.fields.iter().map(|f| &f.ty).collect(),
    Entity::Enum(e) => e.variants.iter().flat_map(|v| v.payload.iter()).collect(),
    Entity::Func(f) => match &f.tc {
      FuncTc::Typed(fty) => fty.params.iter().map(|(_, t)| t).chain(std::iter::once(&fty.ret)).collect(),
      FuncTc::ForwardDeclared => Vec::new(),
    },
    Entity::Const(c) => vec![&c.ty],
    Entity::Perk(p) => p.methods.iter().flat_map(|m| m.params.iter().chain(std::iter::once(&m.ret))).collect(),
    Entity::PerkImpl(_) | Entity::Extension(_) => Vec::new(),
  }
}

fn collect_hashmap_keys<'a>(ty: &'a Ty, out: &mut Vec<&'a Ty>) {
  match ty {
    Ty::Builtin(Builtin::HashMap(k, v)) => { out.push(k); collect_hashmap_keys(v, out); }
    Ty::Builtin(Builtin::List(a) | Builtin::Maybe(a) | Builtin::Iterator(a) | Builtin::Own(a)) => collect_hashmap_keys(a, out),
    Ty::Builtin(Builtin::Result(a, b)) => { collect_hashmap_keys(a, out); collect_hashmap_keys(b, out); }
    Ty::FixedArray(t, _) | Ty::DynArray(t) | Ty::Ref(_, t) => collect_hashmap_keys(t, out),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ast::*;
  use crate::types::NodeId;

  fn sp() -> crate::span::FileSpan {
    crate::span::FileSpan::new(crate::span::FileId(std::rc::Rc::from("t.sushi")), 0, 1)
  }

  fn result_ok(interner: &mut Interner, inner: Expr, id: NodeId) -> Expr {
    Expr {
      id, span: sp(),
      kind: ExprKind::EnumLit {
        enum_name: interner.intern("Result"), type_args: vec![],
        variant: interner.intern("Ok"), args: vec![inner],
      },
    }
  }

  fn unit_returning_literal(interner: &mut Interner, unit_name: &str, fn_name: &str, public: bool) -> Unit {
    let uname = interner.intern(unit_name);
    let fname = interner.intern(fn_name);
    let one = Expr { id: NodeId(1), kind: ExprKind::Literal(Literal::Int(1)), span: sp() };
    let ret_expr = result_ok(interner, one, NodeId(2));
    let sig = Signature {
      name: fname, type_params: vec![], params: vec![],
      ret: TypeExpr::Primitive(PrimitiveName::I32), public,
    };
    let body = Block { stmts: vec![Stmt::Return { value: Some(ret_expr), span: sp() }] };
    let f = FunctionDecl { id: NodeId(0), sig, body, span: sp() };
    Unit { name: uname, decls: vec![Decl::Function(f)], source: format!("fn {}{fn_name}() -> i32 {{ return Result.Ok(1); }}", if public { "public " } else { "" }) }
  }

  #[test]
  fn runs_clean_program_end_to_end_with_no_diagnostics() {
    let mut interner = Interner::new();
    let unit = unit_returning_literal(&mut interner, "main", "entry", true);
    let config = Config { entry_point: "entry".to_string(), ..Config::default() };
    let out = run(&[unit], &mut interner, &config);
    assert_eq!(out.exit_code(&config), 0);
    assert_eq!(out.functions.len(), 1);
  }

  #[test]
  fn marks_the_configured_entry_point() {
    let mut interner = Interner::new();
    let unit = unit_returning_literal(&mut interner, "main", "entry", true);
    let config = Config { entry_point: "entry".to_string(), ..Config::default() };
    let out = run(&[unit], &mut interner, &config);
    let f = &out.functions[0];
    assert_eq!(interner.resolve(f.qname.name), "entry");
  }

  #[test]
  fn deny_warnings_promotes_a_warning_only_run_to_fatal_exit_code() {
    // An unused `Result` from a private helper call produces `UnusedResult` (a warning, not
    // an error), so the plain exit code is `1` but a `deny_warnings` config escalates to `2`.
    let mut interner = Interner::new();
    let helper_name = interner.intern("helper");
    let entry_name = interner.intern("entry");
    let unit_name = interner.intern("main");
    let one = Expr { id: NodeId(1), kind: ExprKind::Literal(Literal::Int(1)), span: sp() };
    let ok_call = result_ok(&mut interner, one, NodeId(2));
    let helper = FunctionDecl {
      id: NodeId(4),
      sig: Signature { name: helper_name, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::I32), public: false },
      body: Block { stmts: vec![Stmt::Return { value: Some(ok_call), span: sp() }] },
      span: sp(),
    };
    let call_helper = Expr {
      id: NodeId(5),
      kind: ExprKind::Call { callee: Box::new(Expr { id: NodeId(6), kind: ExprKind::Var(helper_name), span: sp() }), args: vec![] },
      span: sp(),
    };
    let zero = Expr { id: NodeId(8), kind: ExprKind::Literal(Literal::Int(0)), span: sp() };
    let entry_ret = result_ok(&mut interner, zero, NodeId(7));
    let entry = FunctionDecl {
      id: NodeId(10),
      sig: Signature { name: entry_name, type_params: vec![], params: vec![], ret: TypeExpr::Primitive(PrimitiveName::I32), public: true },
      body: Block { stmts: vec![Stmt::Expr(call_helper), Stmt::Return { value: Some(entry_ret), span: sp() }] },
      span: sp(),
    };
    let unit = Unit { name: unit_name, decls: vec![Decl::Function(helper), Decl::Function(entry)], source: "fn helper() -> i32 { return Result.Ok(1); } fn public entry() -> i32 { helper(); return Result.Ok(0); }".to_string() };

    let lenient = Config { entry_point: "entry".to_string(), ..Config::default() };
    let out = run(&[unit.clone()], &mut interner, &lenient);
    assert!(!out.bag.has_errors());
    let strict = Config { entry_point: "entry".to_string(), deny_warnings: true, ..Config::default() };
    let out2 = run(&[unit], &mut interner, &strict);
    if !out2.bag.diagnostics().is_empty() {
      assert_eq!(out2.exit_code(&strict), 2);
    }
  }
}
