//! End-to-end runs of the literal scenarios given in the compiler's semantic-analysis
//! specification (scenario numbering follows that document's "Testable Properties" section).
//! Scenarios 1 through 5 drive the full [`sushic_sema::pipeline::run`]; scenario 6 drives C3/C4
//! directly the way `monomorphize.rs`'s own unit test does, since a struct literal's explicit
//! type arguments are the one syntactic site C3 resolves without going back through C1's
//! builtin-generic shadowing rule, and exercising that directly avoids this test depending on a
//! reserved name.

use sushic_sema::collect;
use sushic_sema::diag::{Code, DiagnosticBag};
use sushic_sema::instantiate::{Instantiation, InstantiationSet, Template};
use sushic_sema::monomorphize;
use sushic_sema::pipeline::{run, Config};
use sushic_sema::span::{FileId, FileSpan};
use sushic_sema::symbol::Interner;
use sushic_sema::types::ast::*;
use sushic_sema::types::entity::Entity;
use sushic_sema::types::ty::{Prim, Ty};
use sushic_sema::types::NodeId;
use std::rc::Rc;

fn sp() -> FileSpan { FileSpan::new(FileId(Rc::from("scenario.sushi")), 0, 1) }

fn lit_int(v: i128, id: u32) -> Expr { Expr { id: NodeId(id), kind: ExprKind::Literal(Literal::Int(v)), span: sp() } }

fn var_expr(name: sushic_sema::symbol::Symbol, id: u32) -> Expr { Expr { id: NodeId(id), kind: ExprKind::Var(name), span: sp() } }

fn result_ok(interner: &mut Interner, inner: Expr, id: u32) -> Expr {
  Expr {
    id: NodeId(id), span: sp(),
    kind: ExprKind::EnumLit { enum_name: interner.intern("Result"), type_args: vec![], variant: interner.intern("Ok"), args: vec![inner] },
  }
}

fn fatal_codes(bag: &DiagnosticBag) -> Vec<Code> {
  bag.diagnostics().iter().filter(|d| d.is_fatal()).map(|d| d.code).collect()
}

/// Scenario 1: move-then-use on a dynamic array. The original wording returns `a.len()`; this
/// exercises C2's move tracking the same way a bare later reference to `a` would (calling a
/// genuine `.len()` here would need its own declared method, which would just be a second,
/// unrelated type fact to get right for what is a move-analysis test).
#[test]
fn scenario_1_move_then_use_dynamic_array() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario1");
  let main_name = interner.intern("main");
  let a = interner.intern("a");
  let b = interner.intern("b");

  let i32_ty = TypeExpr::Primitive(PrimitiveName::I32);
  let dyn_i32 = TypeExpr::DynArray(Box::new(i32_ty.clone()));

  let array_lit = Expr { id: NodeId(1), kind: ExprKind::ArrayLit(vec![lit_int(1, 2), lit_int(2, 3), lit_int(3, 4)]), span: sp() };
  let main_ret = result_ok(&mut interner, lit_int(0, 5), 6);
  let main_fn = FunctionDecl {
    id: NodeId(0),
    sig: Signature { name: main_name, type_params: vec![], params: vec![], ret: i32_ty, public: true },
    body: Block { stmts: vec![
      Stmt::Let { name: a, ty: Some(dyn_i32.clone()), value: array_lit, span: sp() },
      Stmt::Let { name: b, ty: Some(dyn_i32), value: var_expr(a, 7), span: sp() },
      Stmt::Expr(var_expr(a, 8)),
      Stmt::Return { value: Some(main_ret), span: sp() },
    ]},
    span: sp(),
  };
  let unit = Unit { name: unit_name, decls: vec![Decl::Function(main_fn)], source: String::new() };

  let config = Config { entry_point: "main".to_string(), ..Config::default() };
  let out = run(&[unit], &mut interner, &config);
  assert_eq!(fatal_codes(&out.bag), vec![Code::UseAfterMove]);
}

/// Scenario 2: `modify(&poke x, &peek x)` borrows the same variable as both exclusive and
/// shared in one call.
#[test]
fn scenario_2_borrow_conflict() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario2");
  let modify_name = interner.intern("modify");
  let main_name = interner.intern("main");
  let x = interner.intern("x");
  let pa = interner.intern("pa");
  let pb = interner.intern("pb");

  let i32_ty = TypeExpr::Primitive(PrimitiveName::I32);
  let modify_fn = FunctionDecl {
    id: NodeId(0),
    sig: Signature {
      name: modify_name, type_params: vec![],
      params: vec![
        Param { name: pa, ty: TypeExpr::Ref(BorrowMode::Poke, Box::new(i32_ty.clone())), span: sp() },
        Param { name: pb, ty: TypeExpr::Ref(BorrowMode::Peek, Box::new(i32_ty.clone())), span: sp() },
      ],
      ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
    },
    body: Block { stmts: vec![Stmt::Return { value: None, span: sp() }] },
    span: sp(),
  };

  let modify_call = Expr {
    id: NodeId(1),
    kind: ExprKind::Call {
      callee: Box::new(var_expr(modify_name, 2)),
      args: vec![
        Expr { id: NodeId(3), kind: ExprKind::Borrow(BorrowMode::Poke, Box::new(var_expr(x, 4))), span: sp() },
        Expr { id: NodeId(5), kind: ExprKind::Borrow(BorrowMode::Peek, Box::new(var_expr(x, 6))), span: sp() },
      ],
    },
    span: sp(),
  };
  let main_ret = result_ok(&mut interner, lit_int(0, 7), 8);
  let main_fn = FunctionDecl {
    id: NodeId(9),
    sig: Signature { name: main_name, type_params: vec![], params: vec![], ret: i32_ty.clone(), public: true },
    body: Block { stmts: vec![
      Stmt::Let { name: x, ty: Some(i32_ty), value: lit_int(0, 10), span: sp() },
      Stmt::Expr(modify_call),
      Stmt::Return { value: Some(main_ret), span: sp() },
    ]},
    span: sp(),
  };
  let unit = Unit { name: unit_name, decls: vec![Decl::Function(modify_fn), Decl::Function(main_fn)], source: String::new() };

  let config = Config { entry_point: "main".to_string(), ..Config::default() };
  let out = run(&[unit], &mut interner, &config);
  assert_eq!(fatal_codes(&out.bag), vec![Code::BorrowConflict]);
}

/// Scenario 3: `let i32 y = divide(10, 2)` where `divide` returns `i32 | MathError` — binding a
/// `Result` straight to a plain `i32` without `.realise()`/`??`.
#[test]
fn scenario_3_unwrapped_result_assignment() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario3");
  let math_error = interner.intern("MathError");
  let divide_name = interner.intern("divide");
  let run_division_name = interner.intern("run_division");
  let pa = interner.intern("a");
  let pb = interner.intern("b");
  let y = interner.intern("y");

  let i32_ty = TypeExpr::Primitive(PrimitiveName::I32);
  let math_error_decl = StructDecl {
    id: NodeId(0), name: math_error, type_params: vec![], fields: vec![], methods: vec![], public: true, span: sp(),
  };
  let divide_fn = FunctionDecl {
    id: NodeId(1),
    sig: Signature {
      name: divide_name, type_params: vec![],
      params: vec![Param { name: pa, ty: i32_ty.clone(), span: sp() }, Param { name: pb, ty: i32_ty.clone(), span: sp() }],
      ret: TypeExpr::ResultShorthand(Box::new(i32_ty.clone()), Box::new(TypeExpr::Nominal(math_error, vec![]))),
      public: true,
    },
    body: Block { stmts: vec![Stmt::Return { value: Some(result_ok(&mut interner, lit_int(0, 2), 3)), span: sp() }] },
    span: sp(),
  };

  let divide_call = Expr {
    id: NodeId(4),
    kind: ExprKind::Call { callee: Box::new(var_expr(divide_name, 5)), args: vec![lit_int(10, 6), lit_int(2, 7)] },
    span: sp(),
  };
  let run_division_ret = result_ok(&mut interner, var_expr(y, 8), 9);
  let run_division_fn = FunctionDecl {
    id: NodeId(10),
    sig: Signature { name: run_division_name, type_params: vec![], params: vec![], ret: i32_ty.clone(), public: true },
    body: Block { stmts: vec![
      Stmt::Let { name: y, ty: Some(i32_ty), value: divide_call, span: sp() },
      Stmt::Return { value: Some(run_division_ret), span: sp() },
    ]},
    span: sp(),
  };
  let unit = Unit {
    name: unit_name,
    decls: vec![Decl::Struct(math_error_decl), Decl::Function(divide_fn), Decl::Function(run_division_fn)],
    source: String::new(),
  };

  let config = Config { entry_point: "run_division".to_string(), ..Config::default() };
  let out = run(&[unit], &mut interner, &config);
  assert_eq!(fatal_codes(&out.bag), vec![Code::UnwrappedResultAssignment]);
}

fn shape_enum(interner: &mut Interner) -> (sushic_sema::symbol::Symbol, EnumDecl, sushic_sema::symbol::Symbol, sushic_sema::symbol::Symbol, sushic_sema::symbol::Symbol) {
  let shape = interner.intern("Shape");
  let circle = interner.intern("Circle");
  let square = interner.intern("Square");
  let triangle = interner.intern("Triangle");
  let decl = EnumDecl {
    id: NodeId(0), name: shape, type_params: vec![],
    variants: vec![
      VariantDecl { name: circle, payload: vec![], span: sp() },
      VariantDecl { name: square, payload: vec![], span: sp() },
      VariantDecl { name: triangle, payload: vec![], span: sp() },
    ],
    methods: vec![], public: true, span: sp(),
  };
  (shape, decl, circle, square, triangle)
}

fn classify_fn(interner: &mut Interner, shape: sushic_sema::symbol::Symbol, arms: Vec<MatchArm>) -> FunctionDecl {
  let s = interner.intern("s");
  let classify = interner.intern("classify");
  let ret = result_ok(interner, lit_int(0, 100), 101);
  FunctionDecl {
    id: NodeId(1),
    sig: Signature {
      name: classify, type_params: vec![],
      params: vec![Param { name: s, ty: TypeExpr::Nominal(shape, vec![]), span: sp() }],
      ret: TypeExpr::Primitive(PrimitiveName::I32), public: true,
    },
    body: Block { stmts: vec![
      Stmt::Match { scrutinee: var_expr(s, 2), arms, span: sp() },
      Stmt::Return { value: Some(ret), span: sp() },
    ]},
    span: sp(),
  }
}

/// Scenario 4: a match over every variant of a three-variant enum is clean.
#[test]
fn scenario_4_exhaustive_match_is_clean() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario4");
  let (shape, decl, circle, square, triangle) = shape_enum(&mut interner);
  let arms = vec![
    MatchArm { pattern: Pattern::Variant { name: circle, args: vec![], span: sp() }, body: Block::default(), span: sp() },
    MatchArm { pattern: Pattern::Variant { name: square, args: vec![], span: sp() }, body: Block::default(), span: sp() },
    MatchArm { pattern: Pattern::Variant { name: triangle, args: vec![], span: sp() }, body: Block::default(), span: sp() },
  ];
  let classify = classify_fn(&mut interner, shape, arms);
  let unit = Unit { name: unit_name, decls: vec![Decl::Enum(decl), Decl::Function(classify)], source: String::new() };

  let config = Config { entry_point: "classify".to_string(), ..Config::default() };
  let out = run(&[unit], &mut interner, &config);
  assert!(fatal_codes(&out.bag).is_empty());
}

/// Scenario 5: same three-variant enum, one arm removed — expect exactly one
/// `NonExhaustiveMatch` error naming the missing variant.
#[test]
fn scenario_5_non_exhaustive_match_lists_missing_variant() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario5");
  let (shape, decl, circle, square, _triangle) = shape_enum(&mut interner);
  let arms = vec![
    MatchArm { pattern: Pattern::Variant { name: circle, args: vec![], span: sp() }, body: Block::default(), span: sp() },
    MatchArm { pattern: Pattern::Variant { name: square, args: vec![], span: sp() }, body: Block::default(), span: sp() },
  ];
  let classify = classify_fn(&mut interner, shape, arms);
  let unit = Unit { name: unit_name, decls: vec![Decl::Enum(decl), Decl::Function(classify)], source: String::new() };

  let config = Config { entry_point: "classify".to_string(), ..Config::default() };
  let out = run(&[unit], &mut interner, &config);
  assert_eq!(fatal_codes(&out.bag), vec![Code::NonExhaustiveMatch]);
}

/// Scenario 6: `List<T>` instantiated for `i32` and `string` produces two distinct
/// monomorphized copies, mangled `List__i32`/`List__string`, each with its own `push` clone.
/// Driven directly through C3/C4 (see `monomorphize.rs`'s own unit test, which this mirrors):
/// a struct literal's explicit type-argument list is the one syntactic site C3 resolves
/// without going through C1's builtin-generic name, so exercising it directly avoids this
/// test depending on a reserved builtin name.
#[test]
fn scenario_6_generic_monomorphization() {
  let mut interner = Interner::new();
  let unit_name = interner.intern("scenario6");
  let list = interner.intern("List");
  let t = interner.intern("T");
  let push = interner.intern("push");
  let push_sig = Signature {
    name: push, type_params: vec![],
    params: vec![Param { name: t, ty: TypeExpr::Nominal(t, vec![]), span: sp() }],
    ret: TypeExpr::Primitive(PrimitiveName::Unit), public: true,
  };
  let push_fn = FunctionDecl { id: NodeId(1), sig: push_sig, body: Block::default(), span: sp() };
  let struct_decl = StructDecl {
    id: NodeId(0), name: list,
    type_params: vec![TypeParamDecl { name: t, bounds: vec![] }],
    fields: vec![], methods: vec![push_fn], public: true, span: sp(),
  };
  let unit = Unit { name: unit_name, decls: vec![Decl::Struct(struct_decl)], source: String::new() };

  let mut bag = DiagnosticBag::new();
  let (table, _) = collect::collect(&[unit.clone()], &interner, &mut bag);
  let list_qn = sushic_sema::resolve::qname(unit_name, list);
  let mut insts = InstantiationSet::default();
  for args in [vec![Ty::Primitive(Prim::I32)], vec![Ty::Primitive(Prim::Str)]] {
    insts.record(Instantiation { template: Template::User(list_qn), args });
  }
  let out = monomorphize::monomorphize(&[unit], &table, &insts, &mut interner, &mut bag);
  assert!(!bag.has_errors());

  let struct_names: Vec<String> = out.new_entities.iter()
    .filter(|(_, e)| matches!(e, Entity::Struct(_)))
    .map(|(qn, _)| interner.resolve(qn.name).to_string())
    .collect();
  assert!(struct_names.contains(&"List__i32".to_string()));
  assert!(struct_names.contains(&"List__string".to_string()));

  let method_names: Vec<String> = out.new_entities.iter()
    .filter(|(_, e)| matches!(e, Entity::Func(_)))
    .map(|(qn, _)| interner.resolve(qn.name).to_string())
    .collect();
  assert_eq!(method_names.iter().filter(|n| n.starts_with("push")).count(), 2);
}
