/*!

  Host-IR synthesis for a fuzzed pattern: concrete operations matching the
  match side of a pattern, a random block DAG to host them, and the
  enumeration of every legal interleaving of the operations into the DAG.

*/

use crate::core::attribute::Attribute;
use crate::core::{BlockId, CloneMap, IrGraph, OpId, OperationBuilder, RegionId, ValueId};
use crate::dialects::pdl;
use crate::dialects::Malformed;
use crate::fuzz::dag::SingleEntryDag;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::ControlFlow;

/// Build concrete operations matched by the pattern. Returns the host
/// region (one entry block whose arguments feed external operands) and the
/// synthesised operations, detached and in pattern order.
pub fn pdl_to_operations(
    g: &mut IrGraph,
    pattern: pdl::PatternOp,
    rng: &mut StdRng,
) -> Result<(RegionId, Vec<OpId>), Malformed> {
    let region = g.new_region();
    let entry = g.add_block(region, vec![]);
    let mut synth_ops: Vec<OpId> = Vec::new();

    let mut types: BTreeMap<ValueId, Attribute> = BTreeMap::new();
    let mut attributes: BTreeMap<ValueId, Attribute> = BTreeMap::new();
    let mut values: BTreeMap<ValueId, ValueId> = BTreeMap::new();
    let mut host_ops: BTreeMap<ValueId, OpId> = BTreeMap::new();

    for op in g.block_ops(pattern.body(g)).to_vec() {
        match g.op_name(op) {
            Some(pdl::REWRITE) => continue,
            Some(pdl::TYPE) => {
                let view = pdl::TypeOp::from_op(g, op)?;
                let ty = view
                    .constant_type(g)
                    .unwrap_or_else(|| Attribute::integer_type(32));
                types.insert(view.value(g), ty);
            }
            Some(pdl::OPERAND) => {
                let view = pdl::OperandOp::from_op(g, op)?;
                let operand_type = view
                    .value_type(g)
                    .and_then(|ty| types.get(&ty).cloned())
                    .unwrap_or_else(|| Attribute::integer_type(32));
                // Any existing value of the right type, or a fresh entry
                // block argument.
                let mut candidates: Vec<ValueId> = Vec::new();
                for host in values.values() {
                    if g.value_type(*host) == &operand_type {
                        candidates.push(*host);
                    }
                }
                for host in host_ops.values() {
                    for result in g.results(*host) {
                        if g.value_type(*result) == &operand_type {
                            candidates.push(*result);
                        }
                    }
                }
                for arg in g.block_args(entry) {
                    if g.value_type(*arg) == &operand_type {
                        candidates.push(*arg);
                    }
                }
                let choice = rng.gen_range(0..=candidates.len());
                let host = if choice == candidates.len() {
                    g.insert_block_arg(entry, 0, operand_type)
                } else {
                    candidates[choice]
                };
                values.insert(view.value(g), host);
            }
            Some(pdl::ATTRIBUTE) => {
                let view = pdl::AttributeOp::from_op(g, op)?;
                let attr = view.value(g).unwrap_or_else(|| {
                    Attribute::integer_attr(5, Attribute::integer_type(32))
                });
                attributes.insert(view.output(g), attr);
            }
            Some(pdl::RESULT) => {
                let view = pdl::ResultOp::from_op(g, op)?;
                let host = host_ops
                    .get(&view.parent_value(g))
                    .copied()
                    .ok_or_else(|| Malformed::new(op, "result of an unsynthesised operation"))?;
                let index = view.index(g)?;
                values.insert(view.value(g), g.results(host)[index]);
            }
            Some(pdl::OPERATION) => {
                let view = pdl::OperationOp::from_op(g, op)?;
                let attr_names = view.attribute_names(g);
                let attr_values = view.attribute_values(g);
                if attr_names.len() != attr_values.len() {
                    return Err(Malformed::new(
                        op,
                        "attribute name count does not match the value count",
                    ));
                }
                let attrs: Vec<(String, Attribute)> = attr_names
                    .into_iter()
                    .zip(attr_values)
                    .map(|(name, value)| {
                        (name, attributes.get(&value).cloned().unwrap_or(Attribute::Unit))
                    })
                    .collect();
                let operands: Vec<ValueId> = view
                    .operand_values(g)
                    .into_iter()
                    .map(|v| {
                        values
                            .get(&v)
                            .copied()
                            .ok_or_else(|| Malformed::new(op, "operand never synthesised"))
                    })
                    .collect::<Result<_, _>>()?;
                let result_types: Vec<Attribute> = view
                    .type_values(g)
                    .into_iter()
                    .map(|ty| {
                        types
                            .get(&ty)
                            .cloned()
                            .ok_or_else(|| Malformed::new(op, "result type never synthesised"))
                    })
                    .collect::<Result<_, _>>()?;
                let name = view.op_name(g).unwrap_or_else(|| "unknown".to_string());
                let mut builder = OperationBuilder::new(&name)
                    .set_operands(operands)
                    .set_result_types(result_types);
                for (key, value) in attrs {
                    builder = builder.insert_attr(&key, value);
                }
                let host = builder.finish(g);
                host_ops.insert(view.op_value(g), host);
                synth_ops.push(host);
            }
            _ => return Err(Malformed::new(op, "unsupported operation in a pattern body")),
        }
    }
    Ok((region, synth_ops))
}

/// Materialise the DAG's control flow: the entry block branches into the
/// first DAG block, and every DAG block ends with a `test.branch` to its
/// successors.
pub fn create_dag_in_region(g: &mut IrGraph, region: RegionId, dag: &SingleEntryDag) {
    let entry = g.region_blocks(region)[0];
    let mut blocks: Vec<BlockId> = Vec::new();
    for _ in 0..dag.size {
        blocks.push(g.add_block(region, vec![]));
    }
    let entry_branch = OperationBuilder::new("test.entry")
        .push_successor(blocks[0])
        .finish(g);
    g.append_op(entry, entry_branch);
    for (i, successors) in dag.adjacency_list().into_iter().enumerate() {
        let mut builder = OperationBuilder::new("test.branch");
        for j in &successors {
            builder = builder.push_successor(blocks[*j]);
        }
        let branch = builder.finish(g);
        g.append_op(blocks[i], branch);
    }
}

/// Enumerate every placement of `ops` into the DAG blocks that honours
/// dominance: an op may land in block `i` only when every block holding one
/// of its operands strictly dominates `i`. Lazy; the visitor may break.
pub fn for_each_placement(
    g: &mut IrGraph,
    dag: &SingleEntryDag,
    region: RegionId,
    ops: &[OpId],
    visit: &mut dyn FnMut(&mut IrGraph) -> ControlFlow<()>,
) -> ControlFlow<()> {
    let blocks: Vec<BlockId> = g.region_blocks(region)[1..].to_vec();
    let block_index: HashMap<BlockId, usize> =
        blocks.iter().enumerate().map(|(i, b)| (*b, i)).collect();
    let dominance = dag.dominance_list();
    place(g, dag, &blocks, &block_index, &dominance, 0, ops, visit)
}

#[allow(clippy::too_many_arguments)]
fn place(
    g: &mut IrGraph,
    dag: &SingleEntryDag,
    blocks: &[BlockId],
    block_index: &HashMap<BlockId, usize>,
    dominance: &[BTreeSet<usize>],
    i: usize,
    ops: &[OpId],
    visit: &mut dyn FnMut(&mut IrGraph) -> ControlFlow<()>,
) -> ControlFlow<()> {
    if ops.is_empty() {
        return visit(g);
    }
    if i == dag.size {
        return ControlFlow::Continue(());
    }

    // Later blocks first, matching the reference enumeration order.
    place(g, dag, blocks, block_index, dominance, i + 1, ops, visit)?;

    let op = ops[0];
    let mut operand_blocks = BTreeSet::new();
    let mut placeable = true;
    for operand in g.operands(op) {
        if let Some((producer, _)) = g.producer(*operand) {
            match g.parent_block(producer).and_then(|b| block_index.get(&b)) {
                Some(index) => {
                    operand_blocks.insert(*index);
                }
                None => placeable = false,
            }
        }
    }
    if placeable && operand_blocks.is_subset(&dominance[i]) {
        let terminator = *g
            .block_ops(blocks[i])
            .last()
            .expect("every DAG block has a terminator");
        g.insert_op_before(op, terminator);
        place(g, dag, blocks, block_index, dominance, i, &ops[1..], visit)?;
        g.detach_op(op);
    }
    ControlFlow::Continue(())
}

/// The module shipped to the reference engine: a `patterns` module holding
/// the pattern and an `ir` module holding the host region wrapped in a
/// `test.op`. Returns the printed text; the temporary ops are erased again.
pub fn build_reference_module(
    g: &mut IrGraph,
    pattern: pdl::PatternOp,
    region: RegionId,
) -> String {
    let mut map = CloneMap::default();
    let host_region = g.new_region();
    g.clone_region_into(region, host_region, &mut map);
    let test_op = OperationBuilder::new("test.op").push_region(host_region).finish(g);

    let patterns_region = g.new_region();
    let patterns_block = g.add_block(patterns_region, vec![]);
    let mut pattern_map = CloneMap::default();
    let pattern_clone = g.clone_op(pattern.0, &mut pattern_map);
    g.append_op(patterns_block, pattern_clone);
    let patterns_module = OperationBuilder::new("builtin.module")
        .insert_attr("sym_name", Attribute::string("patterns"))
        .push_region(patterns_region)
        .finish(g);

    let ir_region = g.new_region();
    let ir_block = g.add_block(ir_region, vec![]);
    g.append_op(ir_block, test_op);
    let ir_module = OperationBuilder::new("builtin.module")
        .insert_attr("sym_name", Attribute::string("ir"))
        .push_region(ir_region)
        .finish(g);

    let outer_region = g.new_region();
    let outer_block = g.add_block(outer_region, vec![]);
    g.append_op(outer_block, patterns_module);
    g.append_op(outer_block, ir_module);
    let outer = OperationBuilder::new("builtin.module")
        .push_region(outer_region)
        .finish(g);

    let text = crate::core::print_op(g, outer);
    g.erase_op(outer);
    text
}
