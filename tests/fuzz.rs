use pdlcheck::dialects::pdl;
use pdlcheck::fuzz::{
    create_dag_in_region, for_each_placement, generate_all_dags, generate_random_pdl_rewrite,
    pdl_to_operations,
};
use pdlcheck::{print_op, IrGraph, Parser};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::ControlFlow;

#[test]
fn dag_counts_for_small_sizes() {
    assert_eq!(generate_all_dags(1).len(), 2);
    // Each one-block DAG extends with {0} or {0, 1}.
    assert_eq!(generate_all_dags(2).len(), 4);
    for dag in generate_all_dags(3) {
        assert_eq!(dag.size, 3);
        // Single entry: every non-entry block has a predecessor.
        for parents in &dag.reverse_adjacency[1..] {
            assert!(!parents.is_empty());
        }
    }
}

#[test]
fn generation_is_deterministic_per_seed() {
    for seed in [0u64, 1, 7, 1234] {
        let mut g1 = IrGraph::new();
        let p1 = generate_random_pdl_rewrite(&mut g1, seed);
        let mut g2 = IrGraph::new();
        let p2 = generate_random_pdl_rewrite(&mut g2, seed);
        assert_eq!(print_op(&g1, p1.0), print_op(&g2, p2.0));
    }
}

#[test]
fn generated_patterns_are_well_formed() {
    for seed in 0..50u64 {
        let mut g = IrGraph::new();
        let pattern = generate_random_pdl_rewrite(&mut g, seed);
        let pattern = pdl::PatternOp::from_op(&g, pattern.0).expect("pattern shape");
        let rewrite = pattern.rewrite(&g).expect("pattern ends with a rewrite");
        assert!(rewrite.root(&g).is_some());
        let body = rewrite.body(&g).expect("fuzzed rewrites carry a body");
        assert!(!g.block_ops(body).is_empty());

        // The printed pattern parses back.
        let text = print_op(&g, pattern.0);
        let mut reparsed = IrGraph::new();
        Parser::parse_module(&text, &mut reparsed).expect("fuzzed pattern parses");
    }
}

#[test]
fn placements_honour_dominance() {
    for seed in 0..20u64 {
        let mut g = IrGraph::new();
        let pattern = generate_random_pdl_rewrite(&mut g, seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let (region, ops) =
            pdl_to_operations(&mut g, pattern, &mut rng).expect("host synthesis succeeds");
        let dags = generate_all_dags(3);
        let dag = &dags[(seed as usize) % dags.len()];
        create_dag_in_region(&mut g, region, dag);

        let dominance = dag.dominance_list();
        let mut placements = 0usize;
        let _ = for_each_placement(&mut g, dag, region, &ops, &mut |g| {
            placements += 1;
            let blocks = g.region_blocks(region)[1..].to_vec();
            for (index, block) in blocks.iter().enumerate() {
                for op in g.block_ops(*block).to_vec() {
                    for operand in g.operands(op) {
                        let Some((producer, _)) = g.producer(*operand) else {
                            continue;
                        };
                        let producer_block = g.parent_block(producer).unwrap();
                        let producer_index =
                            blocks.iter().position(|b| *b == producer_block).unwrap();
                        assert!(
                            dominance[index].contains(&producer_index),
                            "operand defined in a non-dominating block"
                        );
                    }
                }
            }
            if placements > 200 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
    }
}

#[test]
fn the_analyzer_is_total_on_fuzzed_patterns() {
    use pdlcheck::analysis::{analyze_pattern, AnalysisConfig, UseCheckingStrictness};
    use pdlcheck::DEFAULT_REGISTRY;

    for strictness in [
        UseCheckingStrictness::Strict,
        UseCheckingStrictness::AssumeNoUseOutside,
    ] {
        let config = AnalysisConfig { strictness };
        for seed in 0..200u64 {
            let mut g = IrGraph::new();
            let pattern = generate_random_pdl_rewrite(&mut g, seed);
            // Any verdict is fine; the analysis must simply terminate
            // without panicking on well-formed input.
            let _ = analyze_pattern(&g, pattern.0, &DEFAULT_REGISTRY, &config);
        }
    }
}

#[test]
fn every_block_of_the_host_dag_terminates() {
    let mut g = IrGraph::new();
    let pattern = generate_random_pdl_rewrite(&mut g, 3);
    let mut rng = StdRng::seed_from_u64(3);
    let (region, _) = pdl_to_operations(&mut g, pattern, &mut rng).unwrap();
    let dags = generate_all_dags(4);
    let dag = &dags[10 % dags.len()];
    create_dag_in_region(&mut g, region, dag);

    let blocks = g.region_blocks(region);
    assert_eq!(blocks.len(), dag.size + 1);
    let entry_terminator = *g.block_ops(blocks[0]).last().unwrap();
    assert_eq!(g.op_name(entry_terminator), Some("test.entry"));
    for block in &blocks[1..] {
        let terminator = *g.block_ops(*block).last().unwrap();
        assert_eq!(g.op_name(terminator), Some("test.branch"));
    }
}
