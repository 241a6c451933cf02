/*!

  Lowering of a PDL pattern into an `irdl_ext.check_subset` whose regions
  are IRDL constraint graphs.

  The lhs region is the match constraint graph. The rhs region is the same
  expansion applied to the post-rewrite IR, obtained by textually applying
  the rewrite body (creations hoisted before the root, replacements and
  erasures applied) to a clone of the pattern. Both regions end with an
  `irdl_ext.yield` of the externally observable values: operands supplied
  from outside and results observed by outside consumers.

*/

use crate::core::attribute::{Attribute, SymbolRef};
use crate::core::{CloneMap, IrGraph, OpId, ValueId};
use crate::dialects::irdl::{self, AttrDefOp, CheckSubsetOp, OperationDefOp};
use crate::dialects::pdl;
use crate::dialects::Malformed;
use crate::passes::rewriter::{apply_to_fixpoint, Change};
use crate::passes::LoweringError;
use std::collections::HashMap;
use tracing::debug;

/// Add a `pdl.result` for each operation result that is missing one, so
/// that later stages can assume every result has a handle.
pub fn add_missing_pdl_results(
    g: &mut IrGraph,
    pattern: pdl::PatternOp,
) -> Result<(), LoweringError> {
    for op in g.walk(pattern.0) {
        if g.op_name(op) != Some(pdl::OPERATION) {
            continue;
        }
        let view = pdl::OperationOp::from_op(g, op)?;
        let num_results = view.type_values(g).len();
        if num_results == 0 {
            continue;
        }
        let handle = view.op_value(g);
        let mut found = vec![false; num_results];
        for use_ref in g.value_uses(handle).to_vec() {
            if g.op_name(use_ref.user) == Some(pdl::RESULT) {
                let result = pdl::ResultOp::from_op(g, use_ref.user)?;
                let index = result.index(g)?;
                if index >= num_results {
                    return Err(Malformed::new(
                        use_ref.user,
                        "`pdl.result` index exceeds the declared result count",
                    )
                    .into());
                }
                if found[index] {
                    return Err(Malformed::new(
                        use_ref.user,
                        "multiple `pdl.result` for the same operation and index",
                    )
                    .into());
                }
                found[index] = true;
            }
        }
        let mut anchor = op;
        for (index, found) in found.into_iter().enumerate() {
            if found {
                continue;
            }
            let result = pdl::ResultOp::build(g, index, handle);
            if let Some(hint) = g.name_hint(handle).map(|h| h.to_string()) {
                g.set_name_hint(result.value(g), &format!("{}_result_{}_", hint, index));
            }
            g.insert_op_after(result.0, anchor);
            anchor = result.0;
        }
    }
    Ok(())
}

/// Clone the pattern into both regions of a fresh `check_subset`, keep the
/// match side on the lhs, and apply the rewrite textually on the rhs. The
/// new op is inserted right before the pattern.
pub fn convert_pattern_to_check_subset(
    g: &mut IrGraph,
    pattern: pdl::PatternOp,
) -> Result<CheckSubsetOp, LoweringError> {
    let body_region = pattern.body_region(g);

    let lhs_region = g.new_region();
    let mut lhs_map = CloneMap::default();
    g.clone_region_into(body_region, lhs_region, &mut lhs_map);
    let rhs_region = g.new_region();
    let mut rhs_map = CloneMap::default();
    g.clone_region_into(body_region, rhs_region, &mut rhs_map);

    // Prefix name hints so solver models stay readable.
    for op in g.walk_region(body_region) {
        for result in g.results(op).to_vec() {
            if let Some(hint) = g.name_hint(result).map(|h| h.to_string()) {
                let lhs_value = lhs_map.value(result);
                let rhs_value = rhs_map.value(result);
                g.set_name_hint(lhs_value, &format!("match_{}", hint));
                g.set_name_hint(rhs_value, &format!("rewrite_{}", hint));
            }
        }
    }

    let check = g.create_op(
        Some(irdl::CHECK_SUBSET),
        vec![],
        vec![],
        vec![],
        vec![lhs_region, rhs_region],
        vec![],
    );
    if g.parent_block(pattern.0).is_some() {
        g.insert_op_before(check, pattern.0);
    } else {
        g.push_top_op(check);
    }
    let check = CheckSubsetOp::from_op(g, check)?;
    let lhs_block = check.lhs(g);
    let rhs_block = check.rhs(g);

    // Drop the rewrite from the match side.
    let lhs_rewrite = g
        .block_ops(lhs_block)
        .last()
        .copied()
        .filter(|op| g.op_name(*op) == Some(pdl::REWRITE))
        .ok_or_else(|| Malformed::new(pattern.0, "pattern must end with a `pdl.rewrite`"))?;
    g.erase_op(lhs_rewrite);

    // The externally observable values, in program order.
    let mut lhs_args = Vec::new();
    let mut rhs_args = Vec::new();
    for op in g.block_ops(pattern.body(g)).to_vec() {
        let value = match g.op_name(op) {
            Some(pdl::RESULT) => pdl::ResultOp::from_op(g, op)?.value(g),
            Some(pdl::OPERAND) => pdl::OperandOp::from_op(g, op)?.value(g),
            _ => continue,
        };
        lhs_args.push(lhs_map.value(value));
        rhs_args.push(rhs_map.value(value));
    }
    let hints: Vec<String> = lhs_args
        .iter()
        .map(|v| {
            g.name_hint(*v)
                .map(|h| h.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
        .collect();
    let lhs_yield = irdl::build_yield(g, lhs_args, hints.clone());
    g.append_op(lhs_block, lhs_yield);
    let rhs_yield = irdl::build_yield(g, rhs_args, hints);
    g.append_op(rhs_block, rhs_yield);

    apply_rhs_rewrite(g, check)?;
    Ok(check)
}

/// Textually apply the rhs `pdl.rewrite` body: hoist creations before the
/// root, apply replacements and erasures, then drop the rewrite itself.
fn apply_rhs_rewrite(g: &mut IrGraph, check: CheckSubsetOp) -> Result<(), LoweringError> {
    let rhs_block = check.rhs(g);
    let rewrite_op = g
        .block_ops(rhs_block)
        .iter()
        .copied()
        .find(|op| g.op_name(*op) == Some(pdl::REWRITE))
        .ok_or_else(|| Malformed::new(check.0, "pattern must end with a `pdl.rewrite`"))?;
    let rewrite = pdl::RewriteOp::from_op(g, rewrite_op)?;
    let root_value = rewrite
        .root(g)
        .ok_or_else(|| Malformed::new(rewrite_op, "expected a root operation in the rewrite"))?;
    let (root_op, _) = g
        .producer(root_value)
        .ok_or_else(|| Malformed::new(rewrite_op, "the rewrite root must be an operation"))?;
    let Some(body) = rewrite.body(g) else {
        g.erase_op(rewrite_op);
        return Ok(());
    };

    // Ops whose handle is still referenced by the rewrite op itself; erased
    // once the rewrite is gone.
    let mut deferred: Vec<OpId> = Vec::new();

    while let Some(op) = g.block_ops(body).first().copied() {
        match g.op_name(op) {
            Some(pdl::ATTRIBUTE) => {
                let view = pdl::AttributeOp::from_op(g, op)?;
                g.detach_op(op);
                match view.value_type(g).and_then(|ty| g.producer(ty)) {
                    Some((type_producer, _)) => g.insert_op_after(op, type_producer),
                    None => g.insert_op_before(op, root_op),
                }
            }
            Some(pdl::TYPE) | Some(pdl::OPERATION) | Some(pdl::APPLY_NATIVE_REWRITE) => {
                g.detach_op(op);
                g.insert_op_before(op, root_op);
            }
            Some(pdl::RESULT) => {
                let view = pdl::ResultOp::from_op(g, op)?;
                let (producer, _) = g
                    .producer(view.parent_value(g))
                    .ok_or_else(|| Malformed::new(op, "`pdl.result` of a non-operation"))?;
                g.detach_op(op);
                g.insert_op_after(op, producer);
            }
            Some(pdl::REPLACE) => {
                let view = pdl::ReplaceOp::from_op(g, op)?;
                let target_value = view.op_value(g);
                let (target_op, _) = g
                    .producer(target_value)
                    .ok_or_else(|| Malformed::new(op, "replacement of a non-operation"))?;
                if let Some(repl) = view.repl_operation(g) {
                    g.erase_op(op);
                    g.replace_all_uses(target_value, repl);
                    g.erase_op(target_op);
                } else {
                    let values = view.repl_values(g);
                    g.erase_op(op);
                    redirect_taken_results(g, target_value, &values)?;
                    defer_erase(g, target_op, target_value, rewrite_op, &mut deferred)?;
                }
            }
            Some(pdl::ERASE) => {
                let view = pdl::EraseOp::from_op(g, op)?;
                let target_value = view.op_value(g);
                let (target_op, _) = g
                    .producer(target_value)
                    .ok_or_else(|| Malformed::new(op, "erasure of a non-operation"))?;
                g.erase_op(op);
                drop_erased_results(g, check, target_value)?;
                defer_erase(g, target_op, target_value, rewrite_op, &mut deferred)?;
            }
            Some(other) => {
                return Err(Malformed::new(
                    op,
                    format!("unsupported operation in the pdl rewrite: `{}`", other),
                )
                .into())
            }
            None => return Err(Malformed::new(op, "unnamed operation in a rewrite body").into()),
        }
    }

    g.erase_op(rewrite_op);
    for op in deferred {
        if g.results(op).iter().any(|r| !g.value_uses(*r).is_empty()) {
            return Err(LoweringError::UnsupportedErase { op });
        }
        g.erase_op(op);
    }
    Ok(())
}

/// For a replace-with-values: rewire every `pdl.result` taken from the
/// replaced op onto the replacement values.
fn redirect_taken_results(
    g: &mut IrGraph,
    target_value: ValueId,
    values: &[ValueId],
) -> Result<(), LoweringError> {
    for use_ref in g.value_uses(target_value).to_vec() {
        if g.op_name(use_ref.user) == Some(pdl::RESULT) {
            let result = pdl::ResultOp::from_op(g, use_ref.user)?;
            let index = result.index(g)?;
            let repl = *values.get(index).ok_or_else(|| {
                Malformed::new(
                    use_ref.user,
                    "the number of replacement values and op results must match",
                )
            })?;
            let value = result.value(g);
            g.replace_all_uses(value, repl);
            g.erase_op(use_ref.user);
        }
    }
    Ok(())
}

/// For an erase: the erased interface values disappear from both yields so
/// the two sides keep equal arity. Any other remaining user makes the
/// reconstruction unsupported.
fn drop_erased_results(
    g: &mut IrGraph,
    check: CheckSubsetOp,
    target_value: ValueId,
) -> Result<(), LoweringError> {
    let lhs_yield = check.lhs_yield(g)?;
    let rhs_yield = check.rhs_yield(g)?;
    for use_ref in g.value_uses(target_value).to_vec() {
        if g.op_name(use_ref.user) != Some(pdl::RESULT) {
            continue;
        }
        let result = pdl::ResultOp::from_op(g, use_ref.user)?;
        let value = result.value(g);
        for value_use in g.value_uses(value).to_vec() {
            if value_use.user == rhs_yield {
                remove_yield_pair(g, lhs_yield, rhs_yield, value_use.index);
            } else {
                return Err(LoweringError::UnsupportedErase { op: use_ref.user });
            }
        }
        g.erase_op(use_ref.user);
    }
    Ok(())
}

fn remove_yield_pair(g: &mut IrGraph, lhs_yield: OpId, rhs_yield: OpId, index: usize) {
    g.remove_operand(rhs_yield, index);
    g.remove_operand(lhs_yield, index);
    for yield_op in [lhs_yield, rhs_yield] {
        if let Some(Attribute::Array(mut hints)) = g.attr(yield_op, "name_hints").cloned() {
            if index < hints.len() {
                hints.remove(index);
                g.set_attr(yield_op, "name_hints", Attribute::Array(hints));
            }
        }
    }
}

/// Erase `target_op` now if only the rewrite still holds its handle,
/// otherwise leave it to the caller's deferred list.
fn defer_erase(
    g: &mut IrGraph,
    target_op: OpId,
    target_value: ValueId,
    rewrite_op: OpId,
    deferred: &mut Vec<OpId>,
) -> Result<(), LoweringError> {
    let uses = g.value_uses(target_value).to_vec();
    if uses.is_empty() {
        g.erase_op(target_op);
    } else if uses.iter().all(|u| u.user == rewrite_op) {
        deferred.push(target_op);
    } else {
        return Err(LoweringError::UnsupportedErase { op: target_op });
    }
    Ok(())
}

/////
///// PDL constraint expansion.
/////

/// Convert the remaining PDL operations inside `root` into IRDL constraint
/// graphs, inlining each matched operation's IRDL schema.
pub fn convert_pdl_match_to_irdl_match(
    g: &mut IrGraph,
    root: OpId,
    irdl_ops: &HashMap<String, OperationDefOp>,
) -> Result<(), LoweringError> {
    apply_to_fixpoint(g, root, |g, op| {
        if g.is_dead(op) {
            return Ok(Change::Unchanged);
        }
        match g.op_name(op) {
            Some(pdl::TYPE) => lower_type(g, op),
            Some(pdl::OPERAND) => lower_operand(g, op),
            Some(pdl::ATTRIBUTE) => lower_attribute(g, op),
            Some(pdl::APPLY_NATIVE_CONSTRAINT) => lower_native_constraint(g, op),
            Some(pdl::APPLY_NATIVE_REWRITE) => lower_native_rewrite(g, op),
            Some(pdl::OPERATION) => lower_operation(g, op, irdl_ops),
            _ => Ok(Change::Unchanged),
        }
    })
}

fn lower_type(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let view = pdl::TypeOp::from_op(g, op)?;
    let repl = match view.constant_type(g) {
        None => irdl::build_any(g),
        Some(constant) => irdl::build_is(g, constant),
    };
    g.insert_op_before(repl, op);
    copy_hint(g, op, repl);
    let out = g.results(repl)[0];
    g.replace_op_with_values(op, &[out]);
    Ok(Change::Changed)
}

fn lower_operand(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let view = pdl::OperandOp::from_op(g, op)?;
    match view.value_type(g) {
        Some(ty) => {
            g.replace_op_with_values(op, &[ty]);
        }
        None => {
            let any = irdl::build_any(g);
            g.insert_op_before(any, op);
            copy_hint(g, op, any);
            let out = g.results(any)[0];
            g.replace_op_with_values(op, &[out]);
        }
    }
    Ok(Change::Changed)
}

fn lower_attribute(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let view = pdl::AttributeOp::from_op(g, op)?;
    if let Some(value) = view.value(g) {
        let is = irdl::build_is(g, value);
        g.insert_op_before(is, op);
        copy_hint(g, op, is);
        let out = g.results(is)[0];
        g.replace_op_with_values(op, &[out]);
        return Ok(Change::Changed);
    }
    if let Some(ty) = view.value_type(g) {
        // A typed attribute is assumed to be an integer attribute of that
        // type.
        let value = irdl::build_any(g);
        if let Some(hint) = g.name_hint(view.output(g)).map(|h| h.to_string()) {
            let value_out = g.results(value)[0];
            g.set_name_hint(value_out, &format!("{}_value", hint));
        }
        let value_out = g.results(value)[0];
        let parametric = irdl::build_parametric(
            g,
            SymbolRef::nested("builtin", "integer_attr"),
            vec![value_out, ty],
        );
        g.insert_op_before(value, op);
        g.insert_op_before(parametric, op);
        let out = g.results(parametric)[0];
        g.replace_op_with_values(op, &[out]);
        return Ok(Change::Changed);
    }
    let any = irdl::build_any(g);
    g.insert_op_before(any, op);
    copy_hint(g, op, any);
    let out = g.results(any)[0];
    g.replace_op_with_values(op, &[out]);
    Ok(Change::Changed)
}

/// The modeled native constraints; everything else is discarded, which is
/// conservative for a subset check on the match side.
fn lower_native_constraint(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let view = pdl::ApplyNativeConstraintOp::from_op(g, op)?;
    let name = view.constraint_name(g)?;
    let args = view.args(g);
    match name.as_str() {
        "is_vector" | "is_tensor" => {
            let base = match name.as_str() {
                "is_vector" => SymbolRef::nested("builtin", "vector"),
                _ => SymbolRef::nested("builtin", "tensor"),
            };
            let base_op = irdl::build_base_ref(g, base);
            g.insert_op_before(base_op, op);
            let base_out = g.results(base_op)[0];
            let eq = irdl::build_eq(g, vec![base_out, args[0]]);
            g.insert_op_before(eq, op);
            g.erase_op(op);
        }
        "is_vector_or_tensor" => {
            let vector = irdl::build_base_ref(g, SymbolRef::nested("builtin", "vector"));
            g.insert_op_before(vector, op);
            let tensor = irdl::build_base_ref(g, SymbolRef::nested("builtin", "tensor"));
            g.insert_op_before(tensor, op);
            let vector_out = g.results(vector)[0];
            let tensor_out = g.results(tensor)[0];
            let any_of = irdl::build_any_of(g, vec![vector_out, tensor_out]);
            g.insert_op_before(any_of, op);
            let any_of_out = g.results(any_of)[0];
            let eq = irdl::build_eq(g, vec![any_of_out, args[0]]);
            g.insert_op_before(eq, op);
            g.erase_op(op);
        }
        other => {
            debug!(constraint = other, "discarding unmodeled native constraint");
            g.erase_op(op);
        }
    }
    Ok(Change::Changed)
}

/// The modeled native rewrites. An unknown rewrite fails the lowering.
fn lower_native_rewrite(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let view = pdl::ApplyNativeRewriteOp::from_op(g, op)?;
    let name = view.rewrite_name(g)?;
    let args = view.args(g);
    let integer_attr = || SymbolRef::nested("builtin", "integer_attr");
    match name.as_str() {
        "get_zero" | "get_zero_attr" => {
            let zero = irdl::build_any(g);
            g.insert_op_before(zero, op);
            let zero_out = g.results(zero)[0];
            let parametric = irdl::build_parametric(g, integer_attr(), vec![zero_out, args[0]]);
            g.insert_op_before(parametric, op);
            let out = g.results(parametric)[0];
            g.replace_op_with_values(op, &[out]);
        }
        "addi" | "subi" | "muli" => {
            // Arithmetic on integer attributes preserves the first
            // argument's type.
            let arg = args[0];
            g.replace_op_with_values(op, &[arg]);
        }
        "get_width" => {
            let width = irdl::build_any(g);
            g.insert_op_before(width, op);
            let width_out = g.results(width)[0];
            let parametric = irdl::build_parametric(g, integer_attr(), vec![width_out, args[1]]);
            g.insert_op_before(parametric, op);
            let out = g.results(parametric)[0];
            g.replace_op_with_values(op, &[out]);
        }
        "invert_arith_cmpi_predicate" => {
            let value = irdl::build_any(g);
            g.insert_op_before(value, op);
            let i64_is = irdl::build_is(g, Attribute::integer_type(64));
            g.insert_op_before(i64_is, op);
            let value_out = g.results(value)[0];
            let i64_out = g.results(i64_is)[0];
            let parametric = irdl::build_parametric(g, integer_attr(), vec![value_out, i64_out]);
            g.insert_op_before(parametric, op);
            let out = g.results(parametric)[0];
            g.replace_op_with_values(op, &[out]);
        }
        other => {
            return Err(LoweringError::UnknownNativeRewrite {
                op,
                name: other.to_string(),
            })
        }
    }
    Ok(Change::Changed)
}

/// Inline the IRDL schema of a matched operation: clone its constraint
/// body, join cloned operand/result slots with the pattern's values via
/// `eq`, and require each slot to hold a concrete attribute via `match`.
fn lower_operation(
    g: &mut IrGraph,
    op: OpId,
    irdl_ops: &HashMap<String, OperationDefOp>,
) -> Result<Change, LoweringError> {
    let view = pdl::OperationOp::from_op(g, op)?;
    let name = view.op_name(g).ok_or_else(|| LoweringError::UnknownOperation {
        op,
        name: "<unnamed>".to_string(),
    })?;
    let def = irdl_ops
        .get(&name)
        .copied()
        .ok_or_else(|| LoweringError::UnknownOperation { op, name: name.clone() })?;

    // The operand/result segments of the pattern must still be decodable;
    // their values have been lowered to IRDL constraints by now.
    let pdl_operands = view.operand_values(g);
    let pdl_results = view.type_values(g);
    let op_hint = g.name_hint(view.op_value(g)).map(|h| h.to_string());

    let mut map = CloneMap::default();
    let mut irdl_operands: Vec<ValueId> = Vec::new();
    let mut irdl_results: Vec<ValueId> = Vec::new();
    let def_body = def.body(g)?;
    for def_op in g.block_ops(def_body).to_vec() {
        match g.op_name(def_op) {
            Some(irdl::OPERANDS) => {
                irdl_operands = g.operands(def_op).iter().map(|v| map.value(*v)).collect();
            }
            Some(irdl::RESULTS) => {
                irdl_results = g.operands(def_op).iter().map(|v| map.value(*v)).collect();
            }
            _ => {
                let clone = g.clone_op(def_op, &mut map);
                g.insert_op_before(clone, op);
                if let Some(op_hint) = &op_hint {
                    let def_results = g.results(def_op).to_vec();
                    if let [def_result] = def_results.as_slice() {
                        if let Some(hint) = g.name_hint(*def_result).map(|h| h.to_string()) {
                            let clone_result = g.results(clone)[0];
                            g.set_name_hint(clone_result, &format!("{}_{}", op_hint, hint));
                        }
                    }
                }
            }
        }
    }

    if irdl_operands.len() != pdl_operands.len() || irdl_results.len() != pdl_results.len() {
        return Err(Malformed::new(
            op,
            format!(
                "`{}` expects {} operand(s) and {} result(s)",
                name,
                irdl_operands.len(),
                irdl_results.len()
            ),
        )
        .into());
    }

    for (irdl_value, pdl_value) in irdl_operands
        .iter()
        .zip(&pdl_operands)
        .chain(irdl_results.iter().zip(&pdl_results))
    {
        let eq = irdl::build_eq(g, vec![*irdl_value, *pdl_value]);
        g.insert_op_before(eq, op);
        let matched = irdl::build_match(g, *irdl_value);
        g.insert_op_before(matched, op);
    }

    // Result handles become the matched result constraint values.
    for use_ref in g.value_uses(view.op_value(g)).to_vec() {
        if g.op_name(use_ref.user) != Some(pdl::RESULT) {
            return Err(Malformed::new(use_ref.user, "expected a `pdl.result` user").into());
        }
        let result = pdl::ResultOp::from_op(g, use_ref.user)?;
        let index = result.index(g)?;
        let repl = *pdl_results.get(index).ok_or_else(|| {
            Malformed::new(
                use_ref.user,
                "`pdl.result` index exceeds the declared result count",
            )
        })?;
        let value = result.value(g);
        g.replace_all_uses(value, repl);
        g.erase_op(use_ref.user);
    }
    g.erase_op(op);
    Ok(Change::Changed)
}

fn copy_hint(g: &mut IrGraph, from: OpId, to: OpId) {
    if let (Some(from_result), Some(to_result)) =
        (g.results(from).first().copied(), g.results(to).first().copied())
    {
        if let Some(hint) = g.name_hint(from_result).map(|h| h.to_string()) {
            g.set_name_hint(to_result, &hint);
        }
    }
}

/////
///// IRDL attribute embedding.
/////

/// Unfold every `irdl.base`/`irdl.parametric` through the referenced
/// attribute definition, joining the original with the cloned parameter
/// constraints via `irdl.all_of`. Marked `processed` to stay idempotent.
pub fn embed_irdl_attr_patterns(g: &mut IrGraph, root: OpId) -> Result<(), LoweringError> {
    apply_to_fixpoint(g, root, |g, op| {
        if g.is_dead(op) || g.has_attr(op, "processed") {
            return Ok(Change::Unchanged);
        }
        match g.op_name(op) {
            Some(irdl::BASE) => {
                let view = irdl::BaseOp::from_op(g, op)?;
                // Attributes not defined in the IRDL module cannot be
                // unfolded.
                let Some(base_ref) = view.base_ref(g) else {
                    return Ok(Change::Unchanged);
                };
                let def = resolve_attr_def(g, op, &base_ref)?;
                let param = clone_param_constraints(g, def, op)?;
                g.set_attr(param, "processed", Attribute::Unit);
                g.set_attr(op, "processed", Attribute::Unit);
                join_with_param(g, op, param);
                Ok(Change::Changed)
            }
            Some(irdl::PARAMETRIC) => {
                let view = irdl::ParametricOp::from_op(g, op)?;
                let base_type = view.base_type(g)?;
                let def = resolve_attr_def(g, op, &base_type)?;
                let param = clone_param_constraints(g, def, op)?;
                g.set_attr(param, "processed", Attribute::Unit);
                g.set_attr(op, "processed", Attribute::Unit);
                join_with_param(g, op, param);
                Ok(Change::Changed)
            }
            _ => Ok(Change::Unchanged),
        }
    })
}

fn resolve_attr_def(
    g: &IrGraph,
    at: OpId,
    sym: &SymbolRef,
) -> Result<AttrDefOp, LoweringError> {
    let def = g
        .lookup_symbol(sym)
        .ok_or(LoweringError::UnresolvedSymbol { op: at })?;
    Ok(AttrDefOp::from_op(g, def)?)
}

/// Clone the parameter constraints of `def` right before `at` and return a
/// fresh `irdl.parametric` of the definition over the cloned parameters.
fn clone_param_constraints(
    g: &mut IrGraph,
    def: AttrDefOp,
    at: OpId,
) -> Result<OpId, LoweringError> {
    let body = def
        .body(g)
        .ok_or_else(|| Malformed::new(def.0, "attribute definition without a body"))?;
    let mut map = CloneMap::default();
    let mut parameters: Vec<ValueId> = Vec::new();
    for def_op in g.block_ops(body).to_vec() {
        if g.op_name(def_op) == Some(irdl::PARAMETERS) {
            parameters = g.operands(def_op).iter().map(|v| map.value(*v)).collect();
            continue;
        }
        let clone = g.clone_op(def_op, &mut map);
        // References inside the definition's dialect must be valid from the
        // embedding site.
        if g.op_name(clone) == Some(irdl::BASE) {
            let view = irdl::BaseOp::from_op(g, clone)?;
            if let Some(base_ref) = view.base_ref(g) {
                let outside = ref_outside_dialect(g, def_op, &base_ref)?;
                g.set_attr(clone, "base_ref", Attribute::SymbolRef(outside));
            }
        }
        if g.op_name(clone) == Some(irdl::PARAMETRIC) {
            let view = irdl::ParametricOp::from_op(g, clone)?;
            let base_type = view.base_type(g)?;
            let outside = ref_outside_dialect(g, def_op, &base_type)?;
            g.set_attr(clone, "base_type", Attribute::SymbolRef(outside));
        }
        g.insert_op_before(clone, at);
    }
    let qualified = def.qualified_name(g)?;
    let (dialect, leaf) = qualified
        .split_once('.')
        .ok_or_else(|| Malformed::new(def.0, "attribute definition outside a dialect"))?;
    let param = irdl::build_parametric(g, SymbolRef::nested(dialect, leaf), parameters);
    g.insert_op_before(param, at);
    Ok(param)
}

/// Resolve a possibly dialect-local reference into a `@dialect::@name` one.
fn ref_outside_dialect(
    g: &IrGraph,
    at: OpId,
    sym: &SymbolRef,
) -> Result<SymbolRef, LoweringError> {
    if !sym.nested.is_empty() {
        if g.lookup_symbol(sym).is_some() {
            return Ok(sym.clone());
        }
    }
    // A flat reference names a sibling definition in the enclosing dialect.
    let mut parent = g.parent_op(at);
    while let Some(op) = parent {
        if g.op_name(op) == Some(irdl::DIALECT) {
            let dialect = irdl::DialectOp::from_op(g, op)?;
            return Ok(SymbolRef::nested(&dialect.sym_name(g)?, &sym.root));
        }
        parent = g.parent_op(op);
    }
    Err(LoweringError::UnresolvedSymbol { op: at })
}

/// Join the original constraint with the unfolded parameter constraint.
fn join_with_param(g: &mut IrGraph, op: OpId, param: OpId) {
    let mut map = CloneMap::default();
    let clone = g.clone_op(op, &mut map);
    g.insert_op_before(clone, op);
    let clone_out = g.results(clone)[0];
    let param_out = g.results(param)[0];
    let all_of = irdl::build_all_of(g, vec![clone_out, param_out]);
    g.insert_op_before(all_of, op);
    let out = g.results(all_of)[0];
    g.replace_op_with_values(op, &[out]);
}

/////
///// The full pipeline.
/////

/// Lower one `pdl.pattern` against the IRDL definitions visible in the
/// graph, erasing the pattern in the process.
pub fn lower_pattern(g: &mut IrGraph, pattern: pdl::PatternOp) -> Result<CheckSubsetOp, LoweringError> {
    let irdl_ops = irdl::collect_operation_defs(g)?;
    add_missing_pdl_results(g, pattern)?;
    let check = convert_pattern_to_check_subset(g, pattern)?;
    g.erase_op(pattern.0);
    convert_pdl_match_to_irdl_match(g, check.0, &irdl_ops)?;
    embed_irdl_attr_patterns(g, check.0)?;
    debug!(check = %check.0, "lowered pattern to a subset check");
    Ok(check)
}

/// Lower the last `pdl.pattern` of `module` (whose other ops are the IRDL
/// specification) into a simplifiable `check_subset`.
pub fn pdl_to_irdl_pass(g: &mut IrGraph, module: OpId) -> Result<CheckSubsetOp, LoweringError> {
    let ops = match g.regions(module).first() {
        Some(region) => g.walk_region(*region),
        None => g.walk(module),
    };
    let pattern = ops
        .iter()
        .rev()
        .find(|op| g.op_name(**op) == Some(pdl::PATTERN))
        .copied()
        .ok_or_else(|| Malformed::new(module, "expected a PDL pattern operation"))?;
    let pattern = pdl::PatternOp::from_op(g, pattern)?;
    lower_pattern(g, pattern)
}
