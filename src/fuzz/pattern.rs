/*!

  Random but well-formed PDL pattern generation, deterministic per seed.

  The match side grows 1-4 operations with 0-2 operands and 0-2 results
  each; the rewrite side draws 1-3 operations from {create, erase,
  replace-with-op, replace-with-values}. The last matched operation is the
  rewrite root.

*/

use crate::core::{Attribute, BlockId, IrGraph, ValueId};
use crate::dialects::pdl;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct FuzzerOptions {
    pub min_operands: usize,
    pub max_operands: usize,
    pub min_results: usize,
    pub max_results: usize,
    pub min_match_operations: usize,
    pub max_match_operations: usize,
    pub min_rewrite_operations: usize,
    pub max_rewrite_operations: usize,
    /// One in this many matched operations is a terminator.
    pub terminator_odds: usize,
}

impl Default for FuzzerOptions {
    fn default() -> FuzzerOptions {
        FuzzerOptions {
            min_operands: 0,
            max_operands: 2,
            min_results: 0,
            max_results: 2,
            min_match_operations: 1,
            max_match_operations: 4,
            min_rewrite_operations: 1,
            max_rewrite_operations: 3,
            terminator_odds: 8,
        }
    }
}

#[derive(Default)]
struct FuzzerContext {
    values: Vec<ValueId>,
    operations: Vec<pdl::OperationOp>,
}

impl FuzzerContext {
    fn random_value(&self, rng: &mut StdRng) -> ValueId {
        self.values[rng.gen_range(0..self.values.len())]
    }

    fn random_operation(&self, rng: &mut StdRng) -> pdl::OperationOp {
        self.operations[rng.gen_range(0..self.operations.len())]
    }
}

/// Generate one random pattern into `g` and return it. The same seed
/// always produces the same pattern.
pub fn generate_random_pdl_rewrite(g: &mut IrGraph, seed: u64) -> pdl::PatternOp {
    generate_with_options(g, seed, &FuzzerOptions::default())
}

pub fn generate_with_options(
    g: &mut IrGraph,
    seed: u64,
    options: &FuzzerOptions,
) -> pdl::PatternOp {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ctx = FuzzerContext::default();
    let (pattern, body) = pdl::PatternOp::build(g, 1, None);

    let num_matched = rng.gen_range(options.min_match_operations..=options.max_match_operations);
    for _ in 0..num_matched {
        generate_matched_operation(g, body, &mut ctx, &mut rng, options);
    }
    let root = *ctx.operations.last().expect("at least one matched op");

    let root_value = root.op_value(g);
    let (rewrite, rewrite_body) = pdl::RewriteOp::build(g, root_value, vec![]);
    let num_rewrite =
        rng.gen_range(options.min_rewrite_operations..=options.max_rewrite_operations);
    for _ in 0..num_rewrite {
        generate_rewrite_operation(g, rewrite_body, &mut ctx, &mut rng, options);
    }
    g.append_op(body, rewrite.0);
    pattern
}

fn random_operation_name(rng: &mut StdRng, options: &FuzzerOptions) -> &'static str {
    if rng.gen_range(0..options.terminator_odds) == 0 {
        "pdltest.terminator"
    } else {
        "pdltest.matchop"
    }
}

/// Either a fresh `pdl.operand` (with an i32 `pdl.type`) or a value already
/// in the context.
fn generate_random_operand(
    g: &mut IrGraph,
    block: BlockId,
    ctx: &mut FuzzerContext,
    rng: &mut StdRng,
) -> ValueId {
    if !ctx.values.is_empty() && rng.gen_range(0..2) == 0 {
        return ctx.random_value(rng);
    }
    let ty = pdl::TypeOp::build(g, Some(Attribute::integer_type(32)));
    g.append_op(block, ty.0);
    let ty_value = ty.value(g);
    let operand = pdl::OperandOp::build(g, Some(ty_value));
    g.append_op(block, operand.0);
    operand.value(g)
}

fn generate_matched_operation(
    g: &mut IrGraph,
    block: BlockId,
    ctx: &mut FuzzerContext,
    rng: &mut StdRng,
    options: &FuzzerOptions,
) {
    let num_operands = rng.gen_range(options.min_operands..=options.max_operands);
    let num_results = rng.gen_range(options.min_results..=options.max_results);

    let mut operands = Vec::new();
    for _ in 0..num_operands {
        operands.push(generate_random_operand(g, block, ctx, rng));
    }
    let mut result_types = Vec::new();
    for _ in 0..num_results {
        let ty = pdl::TypeOp::build(g, Some(Attribute::integer_type(32)));
        g.append_op(block, ty.0);
        result_types.push(ty.value(g));
    }

    let name = random_operation_name(rng, options);
    let op = pdl::OperationOp::build(g, Some(name), operands, vec![], result_types);
    g.append_op(block, op.0);
    ctx.operations.push(op);

    let handle = op.op_value(g);
    for index in 0..num_results {
        let result = pdl::ResultOp::build(g, index, handle);
        g.append_op(block, result.0);
        ctx.values.push(result.value(g));
    }
}

fn generate_rewrite_operation(
    g: &mut IrGraph,
    block: BlockId,
    ctx: &mut FuzzerContext,
    rng: &mut StdRng,
    options: &FuzzerOptions,
) {
    loop {
        match rng.gen_range(0..4) {
            // Erase an operation.
            0 => {
                let op = ctx.random_operation(rng);
                let target = op.op_value(g);
                let erase = pdl::EraseOp::build(g, target);
                g.append_op(block, erase.0);
                return;
            }
            // Replace an operation by another one.
            1 => {
                let target = ctx.random_operation(rng);
                let repl = ctx.random_operation(rng);
                let target_value = target.op_value(g);
                let repl_value = repl.op_value(g);
                let replace = pdl::ReplaceOp::build_with_op(g, target_value, repl_value);
                g.append_op(block, replace.0);
                return;
            }
            // Replace an operation by a list of values.
            2 => {
                let target = ctx.random_operation(rng);
                let num_results = target.type_values(g).len();
                if num_results != 0 && ctx.values.is_empty() {
                    continue;
                }
                let values: Vec<ValueId> =
                    (0..num_results).map(|_| ctx.random_value(rng)).collect();
                let target_value = target.op_value(g);
                let replace = pdl::ReplaceOp::build_with_values(g, target_value, values);
                g.append_op(block, replace.0);
                return;
            }
            // Create a new operation.
            _ => {
                let num_operands = rng.gen_range(options.min_operands..=options.max_operands);
                let num_results = rng.gen_range(options.min_results..=options.max_results);
                if num_operands != 0 && ctx.values.is_empty() {
                    continue;
                }
                let operands: Vec<ValueId> =
                    (0..num_operands).map(|_| ctx.random_value(rng)).collect();
                let mut result_types = Vec::new();
                for _ in 0..num_results {
                    let ty = pdl::TypeOp::build(g, Some(Attribute::integer_type(32)));
                    g.append_op(block, ty.0);
                    result_types.push(ty.value(g));
                }
                let op = pdl::OperationOp::build(
                    g,
                    Some("pdltest.rewriteop"),
                    operands,
                    vec![],
                    result_types,
                );
                g.append_op(block, op.0);
                ctx.operations.push(op);
                let handle = op.op_value(g);
                for index in 0..num_results {
                    let result = pdl::ResultOp::build(g, index, handle);
                    g.append_op(block, result.0);
                    ctx.values.push(result.value(g));
                }
                return;
            }
        }
    }
}
