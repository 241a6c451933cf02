use pdlcheck::dialects::{irdl, pdl};
use pdlcheck::passes::{lower_pattern, optimize_irdl};
use pdlcheck::{IrGraph, OpId, Parser};

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

const ADDI_FOLD: &str = r#"
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

fn lower(irdl_text: &str, pdl_text: &str) -> (IrGraph, irdl::CheckSubsetOp) {
    let mut g = IrGraph::new();
    Parser::parse_module(irdl_text, &mut g).expect("IRDL input must parse");
    Parser::parse_module(pdl_text, &mut g).expect("PDL input must parse");
    let pattern = g
        .walk_all()
        .into_iter()
        .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .expect("a pattern is present");
    let pattern = pdl::PatternOp::from_op(&g, pattern).unwrap();
    let check = lower_pattern(&mut g, pattern).expect("lowering must succeed");
    (g, check)
}

fn live_ops_in(g: &IrGraph, block: pdlcheck::BlockId) -> Vec<OpId> {
    g.block_ops(block).to_vec()
}

#[test]
fn lowering_produces_a_well_formed_subset_check() {
    let (g, check) = lower(ARITH_IRDL, ADDI_FOLD);

    let lhs_yield = check.lhs_yield(&g).expect("lhs ends with a yield");
    let rhs_yield = check.rhs_yield(&g).expect("rhs ends with a yield");
    // Two external operands plus one observed result.
    assert_eq!(g.operands(lhs_yield).len(), 3);
    assert_eq!(g.operands(rhs_yield).len(), g.operands(lhs_yield).len());

    // No PDL is left on either side.
    for block in [check.lhs(&g), check.rhs(&g)] {
        for op in live_ops_in(&g, block) {
            let name = g.op_name(op).unwrap();
            assert!(
                name.starts_with("irdl.") || name.starts_with("irdl_ext."),
                "unexpected op `{}` after lowering",
                name
            );
        }
    }

    // The match side constrains the addi slots to concrete attributes.
    let lhs_matches = live_ops_in(&g, check.lhs(&g))
        .into_iter()
        .filter(|op| g.op_name(*op) == Some(irdl::MATCH))
        .count();
    assert_eq!(lhs_matches, 3);
}

#[test]
fn the_replaced_result_is_rewired_to_the_surviving_operand() {
    let (g, check) = lower(ARITH_IRDL, ADDI_FOLD);
    let rhs_yield = check.rhs_yield(&g).unwrap();
    let operands = g.operands(rhs_yield);
    // `%a` is yielded both as the external operand and as the observed
    // result that replaced the addi.
    assert_eq!(operands[0], operands[2]);
}

#[test]
fn simplification_keeps_the_interface_intact() {
    let (mut g, check) = lower(ARITH_IRDL, ADDI_FOLD);
    optimize_irdl(&mut g, check.0).expect("simplification must succeed");
    let lhs_yield = check.lhs_yield(&g).unwrap();
    let rhs_yield = check.rhs_yield(&g).unwrap();
    assert_eq!(g.operands(lhs_yield).len(), 3);
    assert_eq!(g.operands(rhs_yield).len(), 3);
    // No eq edge survives in a graph this simple.
    for block in [check.lhs(&g), check.rhs(&g)] {
        for op in live_ops_in(&g, block) {
            assert_ne!(g.op_name(op), Some(irdl::EQ));
        }
    }
}

const ERASE_LEAF: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16, sym_name = "erase_leaf"}> ({
  %t = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %a = "pdl.operand"(%t) : (!pdl.type) -> !pdl.value
  %add = "pdl.operation"(%a, %a, %t) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
  "pdl.rewrite"(%add) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%add) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erased_interface_values_leave_both_yields() {
    let (g, check) = lower(ARITH_IRDL, ERASE_LEAF);
    let lhs_yield = check.lhs_yield(&g).unwrap();
    let rhs_yield = check.rhs_yield(&g).unwrap();
    // The erased result is dropped from both sides; the operand stays.
    assert_eq!(g.operands(lhs_yield).len(), 1);
    assert_eq!(g.operands(rhs_yield).len(), 1);
}

const UNKNOWN_NATIVE_REWRITE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %t = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %a = "pdl.operand"(%t) : (!pdl.type) -> !pdl.value
  %add = "pdl.operation"(%a, %a, %t) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
  "pdl.rewrite"(%add) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %x = "pdl.apply_native_rewrite"(%t) <{name = "mystery_hook"}> : (!pdl.type) -> !pdl.type
    %new = "pdl.operation"(%a, %a, %x) <{attributeValueNames = [], opName = "arith.addi", operandSegmentSizes = array<i32: 2, 0, 1>}> : (!pdl.value, !pdl.value, !pdl.type) -> !pdl.operation
    "pdl.replace"(%add, %new) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn unknown_native_rewrites_fail_the_lowering() {
    let mut g = IrGraph::new();
    Parser::parse_module(ARITH_IRDL, &mut g).unwrap();
    Parser::parse_module(UNKNOWN_NATIVE_REWRITE, &mut g).unwrap();
    let pattern = g
        .walk_all()
        .into_iter()
        .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .unwrap();
    let pattern = pdl::PatternOp::from_op(&g, pattern).unwrap();
    let result = lower_pattern(&mut g, pattern);
    assert!(matches!(
        result,
        Err(pdlcheck::passes::LoweringError::UnknownNativeRewrite { .. })
    ));
}
