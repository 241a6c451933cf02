use pdlcheck::dialects::{irdl, pdl};
use pdlcheck::passes::{lower_pattern, optimize_irdl};
use pdlcheck::smt::{
    encode_check_subset, restore_yield_name_hints, Solver, SolverVerdict, Z3Process,
};
use pdlcheck::{IrGraph, Parser};

const ARITH_IRDL: &str = r#"
"irdl.dialect"() <{sym_name = "builtin"}> ({
  "irdl.type"() <{sym_name = "integer_type"}> ({
    %width = "irdl.any"() : () -> !irdl.attribute
    %sign = "irdl.any"() : () -> !irdl.attribute
    "irdl.parameters"(%width, %sign) : (!irdl.attribute, !irdl.attribute) -> ()
  }) : () -> ()
  "irdl.attribute"() <{sym_name = "signedness"}> ({
    %kind = "irdl.any"() : () -> !irdl.attribute
    "irdl.parameters"(%kind) : (!irdl.attribute) -> ()
  }) : () -> ()
  "irdl.attribute"() <{sym_name = "integer_attr"}> ({
    %value = "irdl.any"() : () -> !irdl.attribute
    %type = "irdl.any"() : () -> !irdl.attribute
    "irdl.parameters"(%value, %type) : (!irdl.attribute, !irdl.attribute) -> ()
  }) : () -> ()
}) : () -> ()
"irdl.dialect"() <{sym_name = "arith"}> ({
  "irdl.operation"() <{sym_name = "addi"}> ({
    %t = "irdl.base"() <{base_ref = @builtin::@integer_type}> : () -> !irdl.attribute
    "irdl.operands"(%t, %t) : (!irdl.attribute, !irdl.attribute) -> ()
    "irdl.results"(%t) : (!irdl.attribute) -> ()
  }) : () -> ()
}) : () -> ()
"#;

/// `addi(a, b) -> a`: the result keeps its type, so the rewrite is safe.
const SAFE_FOLD: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16, sym_name = "addi_fold"}> ({
  %t = "pdl.type"() : () -> !pdl.type
  %a = "pdl.operand"(%t) : (!pdl.type) -> !pdl.value
  %b = "pdl.operand"(%t) : (!pdl.type) -> !pdl.value
  %add = "pdl.operation"(%a, %b, %t) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
  "pdl.rewrite"(%add) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.replace"(%add, %a) <{operandSegmentSizes = array<i32: 1, 0, 1>}> : (!pdl.operation, !pdl.value) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

/// A bogus rewrite that changes the result type from i32 to i64.
const UNSAFE_WIDENING: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16, sym_name = "addi_widen"}> ({
  %t32 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %a = "pdl.operand"(%t32) : (!pdl.type) -> !pdl.value
  %b = "pdl.operand"(%t32) : (!pdl.type) -> !pdl.value
  %add = "pdl.operation"(%a, %b, %t32) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
  "pdl.rewrite"(%add) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %t64 = "pdl.type"() <{constantType = i64}> : () -> !pdl.type
    %new = "pdl.operation"(%a, %b, %t64) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
    "pdl.replace"(%add, %new) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

fn encode(pdl_text: &str) -> String {
    let mut g = IrGraph::new();
    Parser::parse_module(ARITH_IRDL, &mut g).unwrap();
    Parser::parse_module(pdl_text, &mut g).unwrap();
    let pattern = g
        .walk_all()
        .into_iter()
        .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .unwrap();
    let pattern = pdl::PatternOp::from_op(&g, pattern).unwrap();
    let check = lower_pattern(&mut g, pattern).unwrap();
    optimize_irdl(&mut g, check.0).unwrap();
    restore_yield_name_hints(&mut g, check);
    encode_check_subset(&g, check).unwrap()
}

#[test]
fn the_script_declares_the_attribute_universe() {
    let script = encode(SAFE_FOLD);
    assert!(script.contains("(declare-datatypes ((Attribute 0))"));
    assert!(script.contains("(unassigned)"));
    assert!(script.contains("(other (other_arg_0 Int))"));
    assert!(script.contains("|builtin.integer_type|"));
    assert!(script.contains("|arith.addi|") == false);
    assert!(script.contains("(assert (not "));
}

#[test]
fn rhs_values_are_existentially_quantified() {
    let script = encode(UNSAFE_WIDENING);
    assert!(script.contains("(exists ("));
}

#[test]
fn verdict_changes_are_invisible_to_simplification() {
    // Encode with and without simplification; with z3 available, both
    // scripts must agree on the verdict.
    let mut solver = Z3Process::new(None);
    if !solver.available() {
        eprintln!("skipping: no z3 on PATH");
        return;
    }

    let mut g = IrGraph::new();
    Parser::parse_module(ARITH_IRDL, &mut g).unwrap();
    Parser::parse_module(SAFE_FOLD, &mut g).unwrap();
    let pattern = g
        .walk_all()
        .into_iter()
        .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .unwrap();
    let pattern = pdl::PatternOp::from_op(&g, pattern).unwrap();
    let check = lower_pattern(&mut g, pattern).unwrap();
    restore_yield_name_hints(&mut g, check);
    let raw = encode_check_subset(&g, check).unwrap();
    optimize_irdl(&mut g, check.0).unwrap();
    let simplified = encode_check_subset(&g, check).unwrap();

    let raw_verdict = solver.check(&raw).unwrap();
    let simplified_verdict = solver.check(&simplified).unwrap();
    assert_eq!(
        std::mem::discriminant(&raw_verdict),
        std::mem::discriminant(&simplified_verdict)
    );
}

#[test]
fn a_type_preserving_rewrite_is_unsat() {
    let mut solver = Z3Process::new(None);
    if !solver.available() {
        eprintln!("skipping: no z3 on PATH");
        return;
    }
    let script = encode(SAFE_FOLD);
    assert_eq!(solver.check(&script).unwrap(), SolverVerdict::Unsat);
}

#[test]
fn a_type_changing_rewrite_is_sat_with_a_model() {
    let mut solver = Z3Process::new(None);
    if !solver.available() {
        eprintln!("skipping: no z3 on PATH");
        return;
    }
    let script = encode(UNSAFE_WIDENING);
    match solver.check(&script).unwrap() {
        SolverVerdict::Sat { model } => assert!(!model.is_empty()),
        other => panic!("expected sat, got {:?}", other),
    }
}

#[test]
fn infeasible_matches_are_vacuously_safe() {
    // An `any_of` with no argument admits no attribute; the lhs cannot be
    // satisfied with the match obligations, so the check is unsat.
    let text = r#"
"irdl_ext.check_subset"() ({
  %0 = "irdl.any_of"() : () -> !irdl.attribute
  "irdl_ext.match"(%0) : (!irdl.attribute) -> ()
  "irdl_ext.yield"(%0) <{name_hints = ["v"]}> : (!irdl.attribute) -> ()
}, {
  %1 = "irdl.any"() : () -> !irdl.attribute
  "irdl_ext.yield"(%1) <{name_hints = ["v"]}> : (!irdl.attribute) -> ()
}) : () -> ()
"#;
    let mut solver = Z3Process::new(None);
    if !solver.available() {
        eprintln!("skipping: no z3 on PATH");
        return;
    }
    let mut g = IrGraph::new();
    Parser::parse_module(text, &mut g).unwrap();
    let check = irdl::CheckSubsetOp::from_op(&g, g.top_ops()[0]).unwrap();
    let script = encode_check_subset(&g, check).unwrap();
    assert_eq!(solver.check(&script).unwrap(), SolverVerdict::Unsat);
}
