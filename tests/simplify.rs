use pdlcheck::dialects::irdl;
use pdlcheck::passes::optimize_irdl;
use pdlcheck::{print_op, Attribute, BlockId, IrGraph, OpId};

/// A scratch module to host a constraint graph.
fn scratch(g: &mut IrGraph) -> (OpId, BlockId) {
    let region = g.new_region();
    let block = g.add_block(region, vec![]);
    let module = g.create_op(Some("builtin.module"), vec![], vec![], vec![], vec![region], vec![]);
    g.push_top_op(module);
    (module, block)
}

fn append(g: &mut IrGraph, block: BlockId, op: OpId) -> pdlcheck::ValueId {
    g.append_op(block, op);
    g.results(op)[0]
}

fn ops_in(g: &IrGraph, block: BlockId) -> Vec<String> {
    g.block_ops(block)
        .iter()
        .map(|op| g.op_name(*op).unwrap().to_string())
        .collect()
}

#[test]
fn singleton_all_of_collapses() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let base = irdl::build_base_ref(&mut g, pdlcheck::SymbolRef::nested("builtin", "integer_type"));
    let base_out = append(&mut g, block, base);
    let all_of = irdl::build_all_of(&mut g, vec![base_out]);
    let all_out = append(&mut g, block, all_of);
    let keep = irdl::build_match(&mut g, all_out);
    g.append_op(block, keep);

    optimize_irdl(&mut g, module).unwrap();
    assert_eq!(ops_in(&g, block), vec!["irdl.base", "irdl_ext.match"]);
    assert_eq!(g.operands(keep), &[base_out]);
}

#[test]
fn nested_all_of_flattens_and_any_drops() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let base = irdl::build_base_ref(&mut g, pdlcheck::SymbolRef::nested("builtin", "integer_type"));
    let base_out = append(&mut g, block, base);
    let any = irdl::build_any(&mut g);
    let any_out = append(&mut g, block, any);
    let inner = irdl::build_all_of(&mut g, vec![base_out, any_out]);
    let inner_out = append(&mut g, block, inner);
    let is = irdl::build_is(&mut g, Attribute::integer_type(32));
    let is_out = append(&mut g, block, is);
    let outer = irdl::build_all_of(&mut g, vec![inner_out, is_out]);
    let outer_out = append(&mut g, block, outer);
    let keep = irdl::build_match(&mut g, outer_out);
    g.append_op(block, keep);

    optimize_irdl(&mut g, module).unwrap();
    // base accepts i32, so only the concrete constraint survives.
    let names = ops_in(&g, block);
    assert_eq!(names, vec!["irdl.is", "irdl_ext.match"]);
}

#[test]
fn contradictory_is_constraints_become_the_empty_set() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let a = irdl::build_is(&mut g, Attribute::integer_type(32));
    let a_out = append(&mut g, block, a);
    let b = irdl::build_is(&mut g, Attribute::integer_type(64));
    let b_out = append(&mut g, block, b);
    let all_of = irdl::build_all_of(&mut g, vec![a_out, b_out]);
    let all_out = append(&mut g, block, all_of);
    let keep = irdl::build_match(&mut g, all_out);
    g.append_op(block, keep);

    optimize_irdl(&mut g, module).unwrap();
    let kept = g.operands(keep)[0];
    let (producer, _) = g.producer(kept).unwrap();
    assert_eq!(g.op_name(producer), Some(irdl::ANY_OF));
    assert!(g.operands(producer).is_empty());
}

#[test]
fn parametric_pair_merges_parameter_wise() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let int_ty = pdlcheck::SymbolRef::nested("builtin", "integer_type");
    let w1_op = irdl::build_any(&mut g);
    let w1 = append(&mut g, block, w1_op);
    let s1_op = irdl::build_any(&mut g);
    let s1 = append(&mut g, block, s1_op);
    let p1 = irdl::build_parametric(&mut g, int_ty.clone(), vec![w1, s1]);
    let p1_out = append(&mut g, block, p1);
    let w2_op = irdl::build_is(&mut g, Attribute::Int(32));
    let w2 = append(&mut g, block, w2_op);
    let s2_op = irdl::build_any(&mut g);
    let s2 = append(&mut g, block, s2_op);
    let p2 = irdl::build_parametric(&mut g, int_ty, vec![w2, s2]);
    let p2_out = append(&mut g, block, p2);
    let all_of = irdl::build_all_of(&mut g, vec![p1_out, p2_out]);
    let all_out = append(&mut g, block, all_of);
    let keep = irdl::build_match(&mut g, all_out);
    g.append_op(block, keep);

    optimize_irdl(&mut g, module).unwrap();
    let kept = g.operands(keep)[0];
    let (producer, _) = g.producer(kept).unwrap();
    assert_eq!(g.op_name(producer), Some(irdl::PARAMETRIC));
    // The width parameter collapsed onto the concrete 32.
    let width = g.operands(producer)[0];
    let (width_producer, _) = g.producer(width).unwrap();
    assert_eq!(g.op_name(width_producer), Some(irdl::IS));
}

#[test]
fn eq_edges_merge_into_all_of() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let a_op = irdl::build_any(&mut g);
    let a = append(&mut g, block, a_op);
    let b_op = irdl::build_base_ref(&mut g, pdlcheck::SymbolRef::nested("builtin", "integer_type"));
    let b = append(&mut g, block, b_op);
    let eq = irdl::build_eq(&mut g, vec![a, b]);
    g.append_op(block, eq);
    let keep_a = irdl::build_match(&mut g, a);
    g.append_op(block, keep_a);
    let keep_b = irdl::build_match(&mut g, b);
    g.append_op(block, keep_b);

    optimize_irdl(&mut g, module).unwrap();
    assert!(!ops_in(&g, block).contains(&"irdl_ext.eq".to_string()));
    // Both matches now watch the same merged constraint, and duplicate
    // matches collapse.
    let matches: Vec<OpId> = g
        .block_ops(block)
        .iter()
        .copied()
        .filter(|op| g.op_name(*op) == Some(irdl::MATCH))
        .collect();
    assert_eq!(matches.len(), 1);
}

#[test]
fn simplification_is_idempotent() {
    let mut g = IrGraph::new();
    let (module, block) = scratch(&mut g);
    let a_op = irdl::build_any(&mut g);
    let a = append(&mut g, block, a_op);
    let base = irdl::build_base_ref(&mut g, pdlcheck::SymbolRef::nested("builtin", "integer_type"));
    let b = append(&mut g, block, base);
    let all_of = irdl::build_all_of(&mut g, vec![a, b, b]);
    let all_out = append(&mut g, block, all_of);
    let keep = irdl::build_match(&mut g, all_out);
    g.append_op(block, keep);

    optimize_irdl(&mut g, module).unwrap();
    let first = print_op(&g, module);
    optimize_irdl(&mut g, module).unwrap();
    assert_eq!(first, print_op(&g, module));
}
