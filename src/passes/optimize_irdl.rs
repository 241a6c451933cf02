/*!

  Algebraic simplification of IRDL constraint graphs.

  Every law is size-reducing or normalising, so the driver's fixed point
  exists on any finite graph. Simplification never changes the solver
  verdict: an `irdl.any_of` with no argument is the empty attribute set, and
  a constraint proven contradictory reduces to it.

*/

use crate::core::{Attribute, IrGraph, OpId, ValueId};
use crate::dialects::irdl;
use crate::passes::rewriter::{apply_to_fixpoint, Change};
use crate::passes::LoweringError;

/// Run the whole law table to a fixed point under `root`.
pub fn optimize_irdl(g: &mut IrGraph, root: OpId) -> Result<(), LoweringError> {
    apply_to_fixpoint(g, root, |g, op| {
        if g.is_dead(op) {
            return Ok(Change::Unchanged);
        }
        if remove_unused(g, op)? == Change::Changed {
            return Ok(Change::Changed);
        }
        match g.op_name(op) {
            Some(irdl::ALL_OF) => simplify_all_of(g, op),
            Some(irdl::ANY_OF) => simplify_any_of(g, op),
            Some(irdl::EQ) => merge_eq(g, op),
            Some(irdl::IS) | Some(irdl::PARAMETRIC) => cse_constraint(g, op),
            Some(irdl::MATCH) => dedup_match(g, op),
            _ => Ok(Change::Unchanged),
        }
    })
}

/// Unused-op elimination for pure constraint constructors.
fn remove_unused(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let Some(name) = g.op_name(op) else {
        return Ok(Change::Unchanged);
    };
    if !irdl::is_constraint_op(name) {
        return Ok(Change::Unchanged);
    }
    if g.results(op).iter().all(|r| g.value_uses(*r).is_empty()) {
        g.erase_op(op);
        return Ok(Change::Changed);
    }
    Ok(Change::Unchanged)
}

fn producer_op(g: &IrGraph, v: ValueId) -> Option<OpId> {
    g.producer(v).map(|(op, _)| op)
}

/// The definite constructor head of a constraint value, when one is known.
fn constraint_head(g: &IrGraph, v: ValueId) -> Option<String> {
    let op = producer_op(g, v)?;
    match g.op_name(op) {
        Some(irdl::BASE) => irdl::BaseOp(op).base_dotted(g),
        Some(irdl::PARAMETRIC) => irdl::ParametricOp(op).base_type(g).ok().map(|r| r.dotted()),
        Some(irdl::IS) => attr_head(&irdl::IsOp(op).expected(g).ok()?),
        _ => None,
    }
}

fn attr_head(attr: &Attribute) -> Option<String> {
    match attr {
        Attribute::Parametric(name, _) => Some(name.clone()),
        Attribute::IntegerAttr(..) => Some("builtin.integer_attr".to_string()),
        Attribute::Int(_) => Some("int".to_string()),
        Attribute::String(_) => Some("string".to_string()),
        _ => None,
    }
}

/// Whether the constraint rooted at `v` accepts the concrete attribute `c`.
/// `None` when the answer cannot be decided purely.
fn constraint_matches(g: &IrGraph, v: ValueId, c: &Attribute) -> Option<bool> {
    let op = producer_op(g, v)?;
    match g.op_name(op) {
        Some(irdl::ANY) => Some(true),
        Some(irdl::IS) => {
            let expected = irdl::IsOp(op).expected(g).ok()?;
            Some(expected == *c)
        }
        Some(irdl::BASE) => {
            let base = irdl::BaseOp(op).base_dotted(g)?;
            Some(attr_head(c)? == base)
        }
        Some(irdl::PARAMETRIC) => {
            let base = irdl::ParametricOp(op).base_type(g).ok()?.dotted();
            match c {
                Attribute::Parametric(name, params) if *name == base => {
                    let args = irdl::ParametricOp(op).args(g);
                    if args.len() != params.len() {
                        return Some(false);
                    }
                    let mut all = true;
                    for (arg, param) in args.iter().zip(params) {
                        match constraint_matches(g, *arg, param) {
                            Some(true) => {}
                            Some(false) => return Some(false),
                            None => all = false,
                        }
                    }
                    all.then_some(true)
                }
                _ => Some(false),
            }
        }
        Some(irdl::ALL_OF) => {
            let mut all = true;
            for arg in g.operands(op) {
                match constraint_matches(g, *arg, c) {
                    Some(true) => {}
                    Some(false) => return Some(false),
                    None => all = false,
                }
            }
            all.then_some(true)
        }
        Some(irdl::ANY_OF) => {
            let mut any_unknown = false;
            for arg in g.operands(op) {
                match constraint_matches(g, *arg, c) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => any_unknown = true,
                }
            }
            if any_unknown {
                None
            } else {
                Some(false)
            }
        }
        _ => None,
    }
}

fn uniquely_used(g: &IrGraph, v: ValueId) -> bool {
    g.value_uses(v).len() == 1
}

fn replace_with_new_args(g: &mut IrGraph, op: OpId, name: &str, args: Vec<ValueId>) {
    let new_op = match name {
        irdl::ALL_OF => irdl::build_all_of(g, args),
        _ => irdl::build_any_of(g, args),
    };
    g.insert_op_before(new_op, op);
    let out = g.results(new_op)[0];
    g.replace_op_with_values(op, &[out]);
}

/// The empty attribute set, signalling an infeasible constraint.
fn replace_with_empty_set(g: &mut IrGraph, op: OpId) {
    replace_with_new_args(g, op, irdl::ANY_OF, vec![]);
}

fn simplify_all_of(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let args = g.operands(op).to_vec();

    // all_of([]) is any; all_of([x]) is x.
    if args.is_empty() {
        let any = irdl::build_any(g);
        g.insert_op_before(any, op);
        let out = g.results(any)[0];
        g.replace_op_with_values(op, &[out]);
        return Ok(Change::Changed);
    }
    if args.len() == 1 {
        let arg = args[0];
        g.replace_op_with_values(op, &[arg]);
        return Ok(Change::Changed);
    }

    // Flatten nested all_ofs.
    for (index, arg) in args.iter().enumerate() {
        if let Some(inner) = producer_op(g, *arg) {
            if g.op_name(inner) == Some(irdl::ALL_OF) {
                let mut new_args = args[..index].to_vec();
                new_args.extend(g.operands(inner).iter().copied());
                new_args.extend(args[index + 1..].iter().copied());
                replace_with_new_args(g, op, irdl::ALL_OF, new_args);
                return Ok(Change::Changed);
            }
        }
    }

    // Drop a uniquely-used `any`.
    for (index, arg) in args.iter().enumerate() {
        if let Some(inner) = producer_op(g, *arg) {
            if g.op_name(inner) == Some(irdl::ANY) && uniquely_used(g, *arg) {
                let mut new_args = args.clone();
                new_args.remove(index);
                replace_with_new_args(g, op, irdl::ALL_OF, new_args);
                return Ok(Change::Changed);
            }
        }
    }

    // Deduplicate identical arguments.
    for (index, arg) in args.iter().enumerate() {
        if args[index + 1..].contains(arg) {
            let mut new_args = args.clone();
            new_args.remove(index);
            replace_with_new_args(g, op, irdl::ALL_OF, new_args);
            return Ok(Change::Changed);
        }
    }

    // Two definite but different constructor heads cannot both hold.
    let heads: Vec<Option<String>> = args.iter().map(|a| constraint_head(g, *a)).collect();
    for (index, head) in heads.iter().enumerate() {
        if let Some(head) = head {
            for other in heads[index + 1..].iter().flatten() {
                if head != other {
                    replace_with_empty_set(g, op);
                    return Ok(Change::Changed);
                }
            }
        }
    }

    // Merge duplicate bases; a base is implied by a parametric of the same
    // head.
    for (index, arg) in args.iter().enumerate() {
        let Some(inner) = producer_op(g, *arg) else { continue };
        if g.op_name(inner) != Some(irdl::BASE) || !uniquely_used(g, *arg) {
            continue;
        }
        let base = irdl::BaseOp(inner).base_dotted(g);
        for (other_index, other) in args.iter().enumerate() {
            if other_index == index {
                continue;
            }
            let Some(other_op) = producer_op(g, *other) else { continue };
            let implied = match g.op_name(other_op) {
                Some(irdl::BASE) => {
                    other_index < index && irdl::BaseOp(other_op).base_dotted(g) == base
                }
                Some(irdl::PARAMETRIC) => {
                    irdl::ParametricOp(other_op).base_type(g).ok().map(|r| r.dotted()) == base
                }
                _ => false,
            };
            if implied {
                let mut new_args = args.clone();
                new_args.remove(index);
                replace_with_new_args(g, op, irdl::ALL_OF, new_args);
                return Ok(Change::Changed);
            }
        }
    }

    // Merge two parametrics of the same head parameter-wise.
    for (index, arg) in args.iter().enumerate() {
        let Some(first) = producer_op(g, *arg) else { continue };
        if g.op_name(first) != Some(irdl::PARAMETRIC) {
            continue;
        }
        for (other_index, other) in args.iter().enumerate().skip(index + 1) {
            let Some(second) = producer_op(g, *other) else { continue };
            if g.op_name(second) != Some(irdl::PARAMETRIC) {
                continue;
            }
            let first_base = irdl::ParametricOp(first).base_type(g)?;
            let second_base = irdl::ParametricOp(second).base_type(g)?;
            if first_base != second_base {
                continue;
            }
            let first_args = irdl::ParametricOp(first).args(g);
            let second_args = irdl::ParametricOp(second).args(g);
            if first_args.len() != second_args.len() {
                continue;
            }
            let mut merged_params = Vec::new();
            for (a, b) in first_args.iter().zip(&second_args) {
                let param_all_of = irdl::build_all_of(g, vec![*a, *b]);
                g.insert_op_before(param_all_of, op);
                merged_params.push(g.results(param_all_of)[0]);
            }
            let merged = irdl::build_parametric(g, first_base, merged_params);
            g.insert_op_before(merged, op);
            let merged_out = g.results(merged)[0];
            let mut new_args: Vec<ValueId> = Vec::new();
            for (i, a) in args.iter().enumerate() {
                if i != index && i != other_index {
                    new_args.push(*a);
                }
            }
            new_args.push(merged_out);
            replace_with_new_args(g, op, irdl::ALL_OF, new_args);
            return Ok(Change::Changed);
        }
    }

    // A concrete `is` decides every pure sibling.
    for arg in &args {
        let Some(inner) = producer_op(g, *arg) else { continue };
        if g.op_name(inner) != Some(irdl::IS) {
            continue;
        }
        let expected = irdl::IsOp(inner).expected(g)?;
        for (other_index, other) in args.iter().enumerate() {
            if other == arg || !uniquely_used(g, *other) {
                continue;
            }
            match constraint_matches(g, *other, &expected) {
                Some(true) => {
                    let mut new_args = args.clone();
                    new_args.remove(other_index);
                    replace_with_new_args(g, op, irdl::ALL_OF, new_args);
                    return Ok(Change::Changed);
                }
                Some(false) => {
                    replace_with_empty_set(g, op);
                    return Ok(Change::Changed);
                }
                None => {}
            }
        }
    }

    structural_dedup(g, op)
}

fn simplify_any_of(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let args = g.operands(op).to_vec();
    if args.len() == 1 {
        let arg = args[0];
        g.replace_op_with_values(op, &[arg]);
        return Ok(Change::Changed);
    }
    for (index, arg) in args.iter().enumerate() {
        if let Some(inner) = producer_op(g, *arg) {
            if g.op_name(inner) == Some(irdl::ANY_OF) {
                let mut new_args = args[..index].to_vec();
                new_args.extend(g.operands(inner).iter().copied());
                new_args.extend(args[index + 1..].iter().copied());
                replace_with_new_args(g, op, irdl::ANY_OF, new_args);
                return Ok(Change::Changed);
            }
        }
    }
    for (index, arg) in args.iter().enumerate() {
        if args[index + 1..].contains(arg) {
            let mut new_args = args.clone();
            new_args.remove(index);
            replace_with_new_args(g, op, irdl::ANY_OF, new_args);
            return Ok(Change::Changed);
        }
    }
    structural_dedup(g, op)
}

/// Merge `eq(a, b)` by inserting `all_of(a, b)` at the later definition and
/// retargeting every outside use, unless an earlier use would be broken.
fn merge_eq(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let args = g.operands(op).to_vec();
    if args.len() != 2 {
        return Ok(Change::Unchanged);
    }
    let (lhs, rhs) = (args[0], args[1]);
    if lhs == rhs {
        g.erase_op(op);
        return Ok(Change::Changed);
    }
    let (Some(lhs_op), Some(rhs_op)) = (producer_op(g, lhs), producer_op(g, rhs)) else {
        return Ok(Change::Unchanged);
    };
    let block = g.parent_block(op);
    if block.is_none()
        || g.parent_block(lhs_op) != block
        || g.parent_block(rhs_op) != block
    {
        return Ok(Change::Unchanged);
    }
    let block = block.unwrap();
    let ops = g.block_ops(block).to_vec();
    let index_of = |needle: OpId| ops.iter().position(|o| *o == needle);
    let (Some(lhs_index), Some(rhs_index)) = (index_of(lhs_op), index_of(rhs_op)) else {
        return Ok(Change::Unchanged);
    };
    let later = lhs_index.max(rhs_index);
    // The earliest op consuming either side must not precede the later
    // definition, otherwise the merge would break it.
    let earliest_use = ops
        .iter()
        .position(|o| g.operands(*o).iter().any(|v| *v == lhs || *v == rhs));
    if let Some(earliest_use) = earliest_use {
        if earliest_use < later {
            return Ok(Change::Unchanged);
        }
    }

    let anchor = ops[later];
    let all_of = irdl::build_all_of(g, vec![lhs, rhs]);
    g.insert_op_after(all_of, anchor);
    let out = g.results(all_of)[0];
    g.erase_op(op);
    for value in [lhs, rhs] {
        for use_ref in g.value_uses(value).to_vec() {
            if use_ref.user != all_of {
                g.set_operand(use_ref.user, use_ref.index, out);
            }
        }
    }
    Ok(Change::Changed)
}

/// CSE for `is` and `parametric`: merge a later structurally identical op
/// into an earlier one in the same block.
fn cse_constraint(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let Some(block) = g.parent_block(op) else {
        return Ok(Change::Unchanged);
    };
    let name = g.op_name(op).map(|s| s.to_string());
    for earlier in g.block_ops(block).to_vec() {
        if earlier == op {
            break;
        }
        if g.op_name(earlier).map(|s| s.to_string()) != name {
            continue;
        }
        if g.attrs(earlier) == g.attrs(op) && g.operands(earlier) == g.operands(op) {
            let out = g.results(earlier)[0];
            g.replace_op_with_values(op, &[out]);
            return Ok(Change::Changed);
        }
    }
    Ok(Change::Unchanged)
}

/// Drop a duplicate `all_of`/`any_of` over the same argument set (operand
/// order is irrelevant for both).
fn structural_dedup(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let Some(block) = g.parent_block(op) else {
        return Ok(Change::Unchanged);
    };
    let name = g.op_name(op).map(|s| s.to_string());
    let mut sorted = g.operands(op).to_vec();
    sorted.sort();
    for earlier in g.block_ops(block).to_vec() {
        if earlier == op {
            break;
        }
        if g.op_name(earlier).map(|s| s.to_string()) != name {
            continue;
        }
        let mut other = g.operands(earlier).to_vec();
        other.sort();
        if other == sorted {
            let out = g.results(earlier)[0];
            g.replace_op_with_values(op, &[out]);
            return Ok(Change::Changed);
        }
    }
    Ok(Change::Unchanged)
}

/// Duplicate `match`es of the same value in a block collapse to one.
fn dedup_match(g: &mut IrGraph, op: OpId) -> Result<Change, LoweringError> {
    let Some(block) = g.parent_block(op) else {
        return Ok(Change::Unchanged);
    };
    for earlier in g.block_ops(block).to_vec() {
        if earlier == op {
            break;
        }
        if g.op_name(earlier) == Some(irdl::MATCH) && g.operands(earlier) == g.operands(op) {
            g.erase_op(op);
            return Ok(Change::Changed);
        }
    }
    Ok(Change::Unchanged)
}
