use pdlcheck::analysis::{
    analyze_pattern, AbortKind, AnalysisConfig, AnalysisResult, UseCheckingStrictness,
};
use pdlcheck::dialects::pdl;
use pdlcheck::{IrGraph, Parser, DEFAULT_REGISTRY};

fn analyze(text: &str, strictness: UseCheckingStrictness) -> AnalysisResult {
    let mut g = IrGraph::new();
    Parser::parse_module(text, &mut g).expect("test input must parse");
    let pattern = g
        .walk_all()
        .into_iter()
        .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .expect("test input must hold a pattern");
    let config = AnalysisConfig { strictness };
    analyze_pattern(&g, pattern, &DEFAULT_REGISTRY, &config)
}

fn kind(result: AnalysisResult) -> AbortKind {
    result.expect_err("analysis must abort").kind
}

const ERASE_MATCHED_ROOT: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  "pdl.rewrite"(%1) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%1) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erasing_the_root_is_strict_mode_dependent() {
    // The matched result may have users outside the pattern.
    assert_eq!(
        kind(analyze(ERASE_MATCHED_ROOT, UseCheckingStrictness::Strict)),
        AbortKind::UsesOutside
    );
    assert!(analyze(ERASE_MATCHED_ROOT, UseCheckingStrictness::AssumeNoUseOutside).is_ok());
}

const REPLACE_ROOT_WITH_NEW_OP: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  "pdl.rewrite"(%1) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %2 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
    %3 = "pdl.operation"(%2) <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
    "pdl.replace"(%1, %3) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn replacing_the_root_with_a_new_op_is_fine_in_both_modes() {
    assert!(analyze(REPLACE_ROOT_WITH_NEW_OP, UseCheckingStrictness::Strict).is_ok());
    assert!(
        analyze(REPLACE_ROOT_WITH_NEW_OP, UseCheckingStrictness::AssumeNoUseOutside).is_ok()
    );
}

const DISCONNECTED_MATCH: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  %1 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%1) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%1) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn two_disconnected_matched_ops_abort() {
    assert_eq!(
        kind(analyze(DISCONNECTED_MATCH, UseCheckingStrictness::Strict)),
        AbortKind::DisconnectedMatch
    );
}

const CREATE_AFTER_ROOT_ERASE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%0) : (!pdl.operation) -> ()
    %1 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn creating_after_erasing_the_root_has_no_insertion_point() {
    assert_eq!(
        kind(analyze(CREATE_AFTER_ROOT_ERASE, UseCheckingStrictness::Strict)),
        AbortKind::NoInsertionPoint
    );
}

const CREATE_AFTER_INDIRECT_ERASE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %1 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
    "pdl.erase"(%0) : (!pdl.operation) -> ()
    "pdl.erase"(%1) : (!pdl.operation) -> ()
    %2 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erasing_every_anchor_has_no_insertion_point() {
    assert_eq!(
        kind(analyze(CREATE_AFTER_INDIRECT_ERASE, UseCheckingStrictness::Strict)),
        AbortKind::NoInsertionPoint
    );
}

const REPLACE_TERMINATOR: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.terminator", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %1 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
    "pdl.replace"(%0, %1) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn terminator_replaced_by_non_terminator_aborts() {
    assert_eq!(
        kind(analyze(REPLACE_TERMINATOR, UseCheckingStrictness::Strict)),
        AbortKind::TerminatorReplacedByNonTerminator
    );
}

const ERASE_TERMINATOR: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.terminator", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%0) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erasing_a_matched_terminator_aborts() {
    assert_eq!(
        kind(analyze(ERASE_TERMINATOR, UseCheckingStrictness::Strict)),
        AbortKind::TerminatorErased
    );
}

const ERASE_TERMINATOR_WITH_FRESH_ONE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.terminator", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %1 = "pdl.operation"() <{attributeValueNames = [], opName = "func.return", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
    "pdl.erase"(%0) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn a_fresh_terminator_right_before_the_erase_is_accepted() {
    assert!(analyze(ERASE_TERMINATOR_WITH_FRESH_ONE, UseCheckingStrictness::Strict).is_ok());
}

const DOUBLE_ERASE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
  "pdl.rewrite"(%0) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%0) : (!pdl.operation) -> ()
    "pdl.erase"(%0) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erasing_twice_is_out_of_scope() {
    assert_eq!(
        kind(analyze(DOUBLE_ERASE, UseCheckingStrictness::Strict)),
        AbortKind::OutOfScope
    );
}

const ERASE_USED_OP: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  %2 = "pdl.result"(%1) <{index = 0 : i32}> : (!pdl.operation) -> !pdl.value
  %3 = "pdl.operation"(%2) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 1, 0, 0>}> : (!pdl.value) -> !pdl.operation
  "pdl.rewrite"(%3) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%1) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn erasing_an_op_that_is_still_used_aborts() {
    assert_eq!(
        kind(analyze(ERASE_USED_OP, UseCheckingStrictness::AssumeNoUseOutside)),
        AbortKind::StillInUse(1)
    );
}

const ERASE_USER_THEN_DEF: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  %2 = "pdl.result"(%1) <{index = 0 : i32}> : (!pdl.operation) -> !pdl.value
  %3 = "pdl.operation"(%2) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 1, 0, 0>}> : (!pdl.value) -> !pdl.operation
  "pdl.rewrite"(%3) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.erase"(%3) : (!pdl.operation) -> ()
    "pdl.erase"(%1) : (!pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn uses_erased_earlier_in_the_rewrite_do_not_count() {
    assert!(analyze(ERASE_USER_THEN_DEF, UseCheckingStrictness::AssumeNoUseOutside).is_ok());
}

const REPLACE_WITH_SELF: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  "pdl.rewrite"(%1) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    "pdl.replace"(%1, %1) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn replacing_an_op_with_results_by_itself_aborts_under_strict() {
    assert_eq!(
        kind(analyze(REPLACE_WITH_SELF, UseCheckingStrictness::Strict)),
        AbortKind::ReplaceWithSelf
    );
}

const ROOT_USED_IN_RHS: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operand"() : () -> !pdl.value
  %2 = "pdl.operation"(%1, %0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 1, 0, 1>}> : (!pdl.value, !pdl.type) -> !pdl.operation
  "pdl.rewrite"(%2) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %3 = "pdl.result"(%2) <{index = 0 : i32}> : (!pdl.operation) -> !pdl.value
    %4 = "pdl.operation"(%3, %0) <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 1, 0, 1>}> : (!pdl.value, !pdl.type) -> !pdl.operation
    "pdl.replace"(%2, %4) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn generated_op_consuming_a_live_root_result_aborts() {
    assert_eq!(
        kind(analyze(ROOT_USED_IN_RHS, UseCheckingStrictness::Strict)),
        AbortKind::RootUsedInRhs
    );
}

const REPLACE_ARITY_MISMATCH: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
  %1 = "pdl.operation"(%0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 1>}> : (!pdl.type) -> !pdl.operation
  "pdl.rewrite"(%1) <{operandSegmentSizes = array<i32: 1, 0>}> ({
    %2 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.rewriteop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
    "pdl.replace"(%1, %2) <{operandSegmentSizes = array<i32: 1, 1, 0>}> : (!pdl.operation, !pdl.operation) -> ()
  }) : (!pdl.operation) -> ()
}) : () -> ()
"#;

#[test]
fn replacement_result_arity_must_match() {
    assert!(matches!(
        kind(analyze(REPLACE_ARITY_MISMATCH, UseCheckingStrictness::Strict)),
        AbortKind::MalformedInput(_)
    ));
}

const PATTERN_WITHOUT_REWRITE: &str = r#"
"pdl.pattern"() <{benefit = 1 : i16}> ({
  %0 = "pdl.operation"() <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 0, 0, 0>}> : () -> !pdl.operation
}) : () -> ()
"#;

#[test]
fn a_pattern_must_end_with_a_rewrite() {
    assert!(matches!(
        kind(analyze(PATTERN_WITHOUT_REWRITE, UseCheckingStrictness::Strict)),
        AbortKind::MalformedInput(_)
    ));
}
