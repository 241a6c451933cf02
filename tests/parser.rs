use pdlcheck::{print_graph, Attribute, IrGraph, Parser};

const PATTERN: &str = r#"
"builtin.module"() ({
  "pdl.pattern"() <{benefit = 1 : i16, sym_name = "rewrite_with_args"}> ({
    %0 = "pdl.type"() <{constantType = i32}> : () -> !pdl.type
    %1 = "pdl.operand"(%0) : (!pdl.type) -> !pdl.value
    %2 = "pdl.operation"(%1, %0) <{attributeValueNames = [], opName = "pdltest.matchop", operandSegmentSizes = array<i32: 1, 0, 1>}> : (!pdl.value, !pdl.type) -> !pdl.operation
    %3 = "pdl.result"(%2) <{index = 0 : i32}> : (!pdl.operation) -> !pdl.value
    "pdl.rewrite"(%2) <{operandSegmentSizes = array<i32: 1, 0>}> ({
      "pdl.erase"(%2) : (!pdl.operation) -> ()
    }) : (!pdl.operation) -> ()
  }) : () -> ()
}) : () -> ()
"#;

#[test]
fn parse_print_round_trip_is_stable() {
    let mut g = IrGraph::new();
    Parser::parse_module(PATTERN, &mut g).expect("input must parse");
    let first = print_graph(&g);

    let mut g2 = IrGraph::new();
    Parser::parse_module(&first, &mut g2).expect("printed output must parse");
    let second = print_graph(&g2);
    assert_eq!(first, second);
}

#[test]
fn structure_survives_the_round_trip() {
    let mut g = IrGraph::new();
    let top = Parser::parse_module(PATTERN, &mut g).expect("input must parse");
    assert_eq!(top.len(), 1);
    let module = top[0];
    assert_eq!(g.op_name(module), Some("builtin.module"));
    let pattern = g.walk(module)[1];
    assert_eq!(g.op_name(pattern), Some("pdl.pattern"));
    assert_eq!(
        g.attr(pattern, "benefit"),
        Some(&Attribute::integer_attr(1, Attribute::integer_type(16)))
    );
    let body_ops = g.walk(pattern);
    // pattern, type, operand, operation, result, rewrite, erase
    assert_eq!(body_ops.len(), 7);
}

#[test]
fn blocks_and_successors_round_trip() {
    let text = r#"
"test.op"() ({
  "test.entry"() [^bb1] : () -> ()
^bb1:
  "test.branch"() [^bb1, ^bb2] : () -> ()
^bb2(%arg : i32):
  "test.use_op"(%arg) : (i32) -> ()
}) : () -> ()
"#;
    let mut g = IrGraph::new();
    Parser::parse_module(text, &mut g).expect("input must parse");
    let first = print_graph(&g);
    let mut g2 = IrGraph::new();
    Parser::parse_module(&first, &mut g2).expect("printed output must parse");
    assert_eq!(first, print_graph(&g2));

    let test_op = g.top_ops()[0];
    let region = g.regions(test_op)[0];
    assert_eq!(g.region_blocks(region).len(), 3);
    let entry = g.region_blocks(region)[0];
    let entry_branch = g.block_ops(entry)[0];
    assert_eq!(g.successors(entry_branch), &[g.region_blocks(region)[1]]);
}

#[test]
fn attribute_grammar_round_trips() {
    let text = r#"
"test.op"() <{a = 5, b = "text", c = [1, 2 : i16], d = {nested = @sym::@ref, flag}, e = array<i32: 1, 0, 2>, f = array<i32>, g = index}> : () -> ()
"#;
    let mut g = IrGraph::new();
    Parser::parse_module(text, &mut g).expect("input must parse");
    let first = print_graph(&g);
    let mut g2 = IrGraph::new();
    Parser::parse_module(&first, &mut g2).expect("printed output must parse");
    assert_eq!(first, print_graph(&g2));

    let op = g.top_ops()[0];
    assert_eq!(g.attr(op, "a"), Some(&Attribute::Int(5)));
    assert_eq!(g.attr(op, "f"), Some(&Attribute::DenseI32(vec![])));
    assert_eq!(g.attr(op, "g"), Some(&Attribute::index_type()));
}

#[test]
fn unknown_values_are_parse_errors() {
    let text = r#""test.use_op"(%missing) : (i32) -> ()"#;
    let mut g = IrGraph::new();
    assert!(Parser::parse_module(text, &mut g).is_err());
}
