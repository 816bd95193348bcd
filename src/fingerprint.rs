//! C9: the Fingerprint & Linkage Engine (§4.9).
//!
//! Runs last, after every other pass has produced its final view of the symbol table (§5
//! "the symbol table is shared across passes but is append-only after C1"). Computes, per
//! source unit, a content hash an external incremental-compile layer can compare across runs
//! to decide whether cached object code for that unit may be reused, and classifies every
//! emitted symbol's linkage.
//!
//! The hash itself reuses C6's FNV mixing primitives (`hash_derive::hash_str`/`mix`) rather
//! than inventing a second hashing scheme, since §8 Testable Property 5 ("byte-identical
//! fingerprints for byte-identical unit sets") requires the same determinism C6 already
//! guarantees for value hashing.

use hashbrown::HashMap;
use itertools::Itertools;
use log::trace;

use crate::diag::DiagnosticBag;
use crate::hash_derive::{hash_str, mix};
use crate::instantiate::{self, Template};
use crate::mangle::mangle_ty;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{Decl, Unit};
use crate::types::entity::{Entity, SymbolTable, Visibility};
use crate::types::linkage::Linkage;
use crate::types::QName;

/// Eight-byte fingerprint, per §6 "a fingerprint byte string".
pub type Fingerprint = [u8; 8];

#[derive(Default, Debug)]
pub struct FingerprintOutput {
  pub fingerprints: HashMap<Symbol, Fingerprint>,
  pub linkage: HashMap<QName, Linkage>,
}

/// Classify every entity's linkage and compute every unit's fingerprint (§4.9).
pub fn compute(units: &[Unit], table: &SymbolTable, interner: &Interner) -> FingerprintOutput {
  let mut linkage = HashMap::new();
  for (qn, entity) in &table.entities {
    linkage.insert(*qn, classify_linkage(entity));
  }

  let mut fingerprints = HashMap::new();
  for unit in units {
    trace!("C9: fingerprinting unit {}", interner.resolve(unit.name));
    fingerprints.insert(unit.name, fingerprint_unit(unit, units, table, interner));
  }
  FingerprintOutput { fingerprints, linkage }
}

/// `private` for anything not marked `public`; `public` for anything that is; `weak-odr` for
/// any entity C4 produced by monomorphizing a generic template (§4.4's `mono_origin` marker
/// is exactly this fact). There is no `weak-odr-inline` entity in this core's own symbol
/// table — those are backend-synthesized runtime-support helpers (§4 Non-goals: code
/// emission), so the variant exists on [`Linkage`] for the output contract but is never
/// produced by this classification.
///
/// `pub(crate)` rather than private: `pipeline.rs` needs the same classification before C5
/// even runs, since `lower_function` takes a pre-computed [`Linkage`] rather than deriving it
/// itself.
pub(crate) fn classify_linkage(entity: &Entity) -> Linkage {
  match entity {
    Entity::Func(f) if f.mono_origin.is_some() => Linkage::WeakOdr,
    Entity::Struct(s) if s.mono_origin.is_some() => Linkage::WeakOdr,
    Entity::Enum(e) if e.mono_origin.is_some() => Linkage::WeakOdr,
    _ => match entity.vis() {
      Some(Visibility::Public) => Linkage::Public,
      Some(Visibility::Private) | None => Linkage::Private,
    },
  }
}

/// Hash, in the exact order §4.9 specifies: source text; public signatures of depended-on
/// units; this unit's own structural summary; the instantiations this unit requires.
fn fingerprint_unit(unit: &Unit, all_units: &[Unit], table: &SymbolTable, interner: &Interner) -> Fingerprint {
  let mut acc = hash_str(&unit.source);

  for dep in dependency_units(unit, all_units) {
    acc = mix(acc, public_signature_digest(dep, table, interner));
  }

  acc = mix(acc, structural_summary_digest(unit, interner));
  acc = mix(acc, instantiation_digest(unit, table, interner));

  acc.to_le_bytes()
}

/// The units this unit's `use` statements name, in declaration order (§5 "the external loader
/// delivers units in a deterministic topological order derived from `use`-statement
/// dependencies" — C9 only needs the set of names, not the loader's ordering guarantee).
fn dependency_units<'a>(unit: &Unit, all_units: &'a [Unit]) -> Vec<&'a Unit> {
  let named: Vec<Symbol> = unit.decls.iter()
    .filter_map(|d| if let Decl::Use(u) = d { u.path.first().copied() } else { None })
    .collect();
  all_units.iter().filter(|u| named.contains(&u.name)).collect()
}

/// A deterministic digest of every `public` signature a unit exports — never bodies, per
/// §4.9's explicit "not bodies". Entities are visited in a stable order (by interned index)
/// so the digest does not depend on `HashMap` iteration order (§8 Testable Property 5).
fn public_signature_digest(unit: &Unit, table: &SymbolTable, interner: &Interner) -> u64 {
  let entries: Vec<(QName, &Entity)> = table.entities.iter()
    .filter(|(qn, e)| qn.unit == unit.name && matches!(e.vis(), Some(Visibility::Public)))
    .map(|(qn, e)| (*qn, e))
    .sorted_by_key(|(qn, _)| qn.name.into_usize())
    .collect();

  let mut acc = hash_str("public-signatures");
  for (qn, entity) in entries {
    acc = mix(acc, hash_str(interner.resolve(qn.name)));
    acc = mix(acc, signature_digest(entity, interner));
  }
  acc
}

fn signature_digest(entity: &Entity, interner: &Interner) -> u64 {
  match entity {
    Entity::Func(f) => match &f.tc {
      crate::types::entity::FuncTc::Typed(fty) => {
        let mut acc = hash_str("fn");
        for (_, ty) in &fty.params { acc = mix(acc, hash_str(&mangle_ty(ty, interner))); }
        mix(acc, hash_str(&mangle_ty(&fty.ret, interner)))
      }
      crate::types::entity::FuncTc::ForwardDeclared => hash_str("fn-forward-declared"),
    },
    Entity::Const(c) => mix(hash_str("const"), hash_str(&mangle_ty(&c.ty, interner))),
    Entity::Struct(s) => {
      let mut acc = hash_str("struct");
      for f in &s.fields {
        acc = mix(acc, hash_str(interner.resolve(f.name)));
        acc = mix(acc, hash_str(&mangle_ty(&f.ty, interner)));
      }
      acc
    }
    Entity::Enum(e) => {
      let mut acc = hash_str("enum");
      for v in &e.variants {
        acc = mix(acc, hash_str(interner.resolve(v.name)));
        for p in &v.payload { acc = mix(acc, hash_str(&mangle_ty(p, interner))); }
      }
      acc
    }
    Entity::Perk(p) => {
      let mut acc = hash_str("perk");
      for m in &p.methods {
        acc = mix(acc, hash_str(interner.resolve(m.name)));
        for t in &m.params { acc = mix(acc, hash_str(&mangle_ty(t, interner))); }
        acc = mix(acc, hash_str(&mangle_ty(&m.ret, interner)));
      }
      acc
    }
    Entity::PerkImpl(_) | Entity::Extension(_) => hash_str("not-a-public-signature"),
  }
}

/// The AST-structural summary of a unit's own structs, enums, extensions, perk impls, and
/// `use` statements (§4.9's third hash input). Field/variant/method *names* and declared
/// surface types are hashed; bodies are not, since a body change that doesn't alter any
/// public signature or structural shape has no effect observable to a dependent unit.
fn structural_summary_digest(unit: &Unit, interner: &Interner) -> u64 {
  let mut acc = hash_str("structural-summary");
  for decl in &unit.decls {
    acc = mix(acc, decl_summary(decl, interner));
  }
  acc
}

fn decl_summary(decl: &Decl, interner: &Interner) -> u64 {
  match decl {
    Decl::Struct(s) => {
      let mut h = hash_str("decl-struct");
      h = mix(h, hash_str(interner.resolve(s.name)));
      for f in &s.fields { h = mix(h, hash_str(interner.resolve(f.name))); }
      for m in &s.methods { h = mix(h, hash_str(interner.resolve(m.sig.name))); }
      h
    }
    Decl::Enum(e) => {
      let mut h = hash_str("decl-enum");
      h = mix(h, hash_str(interner.resolve(e.name)));
      for v in &e.variants { h = mix(h, hash_str(interner.resolve(v.name))); }
      for m in &e.methods { h = mix(h, hash_str(interner.resolve(m.sig.name))); }
      h
    }
    Decl::Extension(ext) => {
      let mut h = hash_str("decl-extension");
      for m in &ext.methods { h = mix(h, hash_str(interner.resolve(m.sig.name))); }
      h
    }
    Decl::Impl(i) => {
      let mut h = hash_str("decl-impl");
      h = mix(h, hash_str(interner.resolve(i.perk)));
      for m in &i.methods { h = mix(h, hash_str(interner.resolve(m.sig.name))); }
      h
    }
    Decl::Use(u) => {
      let mut h = hash_str("decl-use");
      for seg in &u.path { h = mix(h, hash_str(interner.resolve(*seg))); }
      h
    }
    Decl::Function(_) | Decl::Perk(_) | Decl::Const(_) => hash_str("decl-not-structural"),
  }
}

/// The set of monomorphized instantiations this unit's own code requires (§4.9's fourth hash
/// input). Reuses C3's collector over a single-unit slice rather than re-walking the AST with
/// a second traversal; diagnostics from this scratch run are discarded since C3 already
/// reported them for real against the full unit set.
fn instantiation_digest(unit: &Unit, table: &SymbolTable, interner: &Interner) -> u64 {
  let mut scratch = DiagnosticBag::new();
  let insts = instantiate::collect_instantiations(std::slice::from_ref(unit), table, &mut scratch);

  let mut keyed: Vec<(String, u64)> = insts.iter()
    .map(|inst| {
      let template_name = match &inst.template {
        Template::User(qn) => interner.resolve(qn.name).to_string(),
        Template::Builtin(name) => (*name).to_string(),
      };
      let mangled = crate::mangle::mangle_name(&template_name, &inst.args, interner);
      (mangled.clone(), hash_str(&mangled))
    })
    .collect();
  keyed.sort_by(|a, b| a.0.cmp(&b.0));

  let mut acc = hash_str("instantiations");
  for (_, h) in keyed { acc = mix(acc, h); }
  acc
}
