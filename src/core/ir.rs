/*!

  The design of this IR is a close copy of MLIR: operations own regions,
  regions own blocks, blocks own operations, and every value is either a
  block argument or an operation result.

  All entities live in one arena (`IrGraph`) and are referred to by dense
  indices, so parent/child and def/use edges are plain index lookups. The
  use-list of every value is maintained by each mutating entry point; the
  rest of the crate relies on that invariant.

*/

use crate::core::attribute::{Attribute, SymbolRef};
use std::collections::HashMap;
use std::fmt;

macro_rules! arena_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

arena_id!(OpId, "op");
arena_id!(BlockId, "bb");
arena_id!(RegionId, "reg");
arena_id!(ValueId, "%");

/// A single operand slot pointing at a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UseRef {
    pub user: OpId,
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    BlockArg { block: BlockId, index: usize },
    OpResult { op: OpId, index: usize },
}

#[derive(Debug)]
struct ValueData {
    kind: ValueKind,
    ty: Attribute,
    uses: Vec<UseRef>,
    name_hint: Option<String>,
}

#[derive(Debug)]
struct OpData {
    /// Absent means "any operation".
    name: Option<String>,
    operands: Vec<ValueId>,
    results: Vec<ValueId>,
    attrs: Vec<(String, Attribute)>,
    regions: Vec<RegionId>,
    successors: Vec<BlockId>,
    parent: Option<BlockId>,
    dead: bool,
}

#[derive(Debug)]
struct BlockData {
    args: Vec<ValueId>,
    ops: Vec<OpId>,
    parent: Option<RegionId>,
}

#[derive(Debug, Default)]
struct RegionData {
    blocks: Vec<BlockId>,
    parent: Option<OpId>,
}

/// Mapping produced by cloning: old ids on the left, fresh ids on the right.
#[derive(Debug, Default)]
pub struct CloneMap {
    pub values: HashMap<ValueId, ValueId>,
    pub ops: HashMap<OpId, OpId>,
    pub blocks: HashMap<BlockId, BlockId>,
}

impl CloneMap {
    pub fn value(&self, v: ValueId) -> ValueId {
        *self.values.get(&v).unwrap_or(&v)
    }

    pub fn op(&self, op: OpId) -> OpId {
        *self.ops.get(&op).unwrap_or(&op)
    }
}

#[derive(Debug, Default)]
pub struct IrGraph {
    ops: Vec<OpData>,
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
    regions: Vec<RegionData>,
    /// Operations at the top level of the graph (usually one module).
    top: Vec<OpId>,
}

impl IrGraph {
    pub fn new() -> IrGraph {
        IrGraph::default()
    }

    fn op(&self, id: OpId) -> &OpData {
        &self.ops[id.index()]
    }

    fn op_mut(&mut self, id: OpId) -> &mut OpData {
        &mut self.ops[id.index()]
    }

    fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    /////
    ///// Read access.
    /////

    pub fn op_name(&self, id: OpId) -> Option<&str> {
        self.op(id).name.as_deref()
    }

    pub fn operands(&self, id: OpId) -> &[ValueId] {
        &self.op(id).operands
    }

    pub fn results(&self, id: OpId) -> &[ValueId] {
        &self.op(id).results
    }

    pub fn attrs(&self, id: OpId) -> &[(String, Attribute)] {
        &self.op(id).attrs
    }

    pub fn attr(&self, id: OpId, key: &str) -> Option<&Attribute> {
        self.op(id)
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn has_attr(&self, id: OpId, key: &str) -> bool {
        self.attr(id, key).is_some()
    }

    pub fn regions(&self, id: OpId) -> &[RegionId] {
        &self.op(id).regions
    }

    pub fn successors(&self, id: OpId) -> &[BlockId] {
        &self.op(id).successors
    }

    pub fn parent_block(&self, id: OpId) -> Option<BlockId> {
        self.op(id).parent
    }

    pub fn parent_region_of_block(&self, id: BlockId) -> Option<RegionId> {
        self.blocks[id.index()].parent
    }

    pub fn parent_op_of_region(&self, id: RegionId) -> Option<OpId> {
        self.regions[id.index()].parent
    }

    /// The operation enclosing `id`, if any.
    pub fn parent_op(&self, id: OpId) -> Option<OpId> {
        let block = self.parent_block(id)?;
        let region = self.parent_region_of_block(block)?;
        self.parent_op_of_region(region)
    }

    pub fn is_dead(&self, id: OpId) -> bool {
        self.op(id).dead
    }

    pub fn region_blocks(&self, id: RegionId) -> &[BlockId] {
        &self.regions[id.index()].blocks
    }

    pub fn block_ops(&self, id: BlockId) -> &[OpId] {
        &self.blocks[id.index()].ops
    }

    pub fn block_args(&self, id: BlockId) -> &[ValueId] {
        &self.blocks[id.index()].args
    }

    /// The single block of a single-block region.
    pub fn sole_block(&self, id: RegionId) -> Option<BlockId> {
        match self.region_blocks(id) {
            [b] => Some(*b),
            _ => None,
        }
    }

    pub fn top_ops(&self) -> &[OpId] {
        &self.top
    }

    pub fn value_type(&self, id: ValueId) -> &Attribute {
        &self.value(id).ty
    }

    pub fn value_kind(&self, id: ValueId) -> ValueKind {
        self.value(id).kind
    }

    pub fn value_uses(&self, id: ValueId) -> &[UseRef] {
        &self.value(id).uses
    }

    /// The producing operation and result index, for op results.
    pub fn producer(&self, id: ValueId) -> Option<(OpId, usize)> {
        match self.value(id).kind {
            ValueKind::OpResult { op, index } => Some((op, index)),
            ValueKind::BlockArg { .. } => None,
        }
    }

    pub fn name_hint(&self, id: ValueId) -> Option<&str> {
        self.value(id).name_hint.as_deref()
    }

    pub fn set_name_hint(&mut self, id: ValueId, hint: &str) {
        self.value_mut(id).name_hint = Some(hint.to_string());
    }

    pub fn op_index_in_block(&self, id: OpId) -> Option<usize> {
        let block = self.parent_block(id)?;
        self.block_ops(block).iter().position(|o| *o == id)
    }

    /// The operation immediately preceding `id` in its block.
    pub fn prev_op(&self, id: OpId) -> Option<OpId> {
        let block = self.parent_block(id)?;
        let index = self.op_index_in_block(id)?;
        if index == 0 {
            None
        } else {
            Some(self.block_ops(block)[index - 1])
        }
    }

    /////
    ///// Construction.
    /////

    pub fn new_region(&mut self) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionData::default());
        id
    }

    pub fn add_block(&mut self, region: RegionId, arg_types: Vec<Attribute>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            args: Vec::new(),
            ops: Vec::new(),
            parent: Some(region),
        });
        for (index, ty) in arg_types.into_iter().enumerate() {
            let v = self.new_value(ValueKind::BlockArg { block: id, index }, ty);
            self.blocks[id.index()].args.push(v);
        }
        self.regions[region.index()].blocks.push(id);
        id
    }

    /// Insert a fresh argument at position `index` of `block`.
    pub fn insert_block_arg(&mut self, block: BlockId, index: usize, ty: Attribute) -> ValueId {
        let v = self.new_value(ValueKind::BlockArg { block, index }, ty);
        self.blocks[block.index()].args.insert(index, v);
        let args = self.blocks[block.index()].args.clone();
        for (i, arg) in args.iter().enumerate() {
            if let ValueKind::BlockArg { block: b, .. } = self.value(*arg).kind {
                self.value_mut(*arg).kind = ValueKind::BlockArg { block: b, index: i };
            }
        }
        v
    }

    fn new_value(&mut self, kind: ValueKind, ty: Attribute) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            kind,
            ty,
            uses: Vec::new(),
            name_hint: None,
        });
        id
    }

    /// Create a detached operation. Use the insertion methods to place it.
    pub fn create_op(
        &mut self,
        name: Option<&str>,
        operands: Vec<ValueId>,
        result_types: Vec<Attribute>,
        attrs: Vec<(String, Attribute)>,
        regions: Vec<RegionId>,
        successors: Vec<BlockId>,
    ) -> OpId {
        let id = OpId(self.ops.len() as u32);
        for (index, operand) in operands.iter().enumerate() {
            self.values[operand.index()]
                .uses
                .push(UseRef { user: id, index });
        }
        self.ops.push(OpData {
            name: name.map(|s| s.to_string()),
            operands,
            results: Vec::new(),
            attrs,
            regions: regions.clone(),
            successors,
            parent: None,
            dead: false,
        });
        let count = result_types.len();
        let mut results = Vec::with_capacity(count);
        for (index, ty) in result_types.into_iter().enumerate() {
            results.push(self.new_value(ValueKind::OpResult { op: id, index }, ty));
        }
        self.ops[id.index()].results = results;
        for region in regions {
            self.regions[region.index()].parent = Some(id);
        }
        id
    }

    pub fn push_top_op(&mut self, op: OpId) {
        self.top.push(op);
    }

    pub fn append_op(&mut self, block: BlockId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none());
        self.blocks[block.index()].ops.push(op);
        self.op_mut(op).parent = Some(block);
    }

    pub fn insert_op_before(&mut self, op: OpId, before: OpId) {
        debug_assert!(self.op(op).parent.is_none());
        let block = self.parent_block(before).expect("anchor must be attached");
        let index = self.op_index_in_block(before).unwrap();
        self.blocks[block.index()].ops.insert(index, op);
        self.op_mut(op).parent = Some(block);
    }

    pub fn insert_op_after(&mut self, op: OpId, after: OpId) {
        debug_assert!(self.op(op).parent.is_none());
        let block = self.parent_block(after).expect("anchor must be attached");
        let index = self.op_index_in_block(after).unwrap();
        self.blocks[block.index()].ops.insert(index + 1, op);
        self.op_mut(op).parent = Some(block);
    }

    /// Remove `op` from its block without touching its uses.
    pub fn detach_op(&mut self, op: OpId) {
        if let Some(block) = self.op(op).parent {
            self.blocks[block.index()].ops.retain(|o| *o != op);
            self.op_mut(op).parent = None;
        }
    }

    /////
    ///// Mutation.
    /////

    pub fn set_attr(&mut self, id: OpId, key: &str, value: Attribute) {
        let data = self.op_mut(id);
        if let Some(entry) = data.attrs.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            data.attrs.push((key.to_string(), value));
        }
    }

    pub fn set_successors(&mut self, op: OpId, successors: Vec<BlockId>) {
        self.op_mut(op).successors = successors;
    }

    /// Point operand `index` of `user` at `value`, fixing both use-lists.
    pub fn set_operand(&mut self, user: OpId, index: usize, value: ValueId) {
        let old = self.op(user).operands[index];
        if old == value {
            return;
        }
        self.values[old.index()]
            .uses
            .retain(|u| !(u.user == user && u.index == index));
        self.values[value.index()].uses.push(UseRef { user, index });
        self.op_mut(user).operands[index] = value;
    }

    /// Remove operand `index` of `op`, shifting the following slots down and
    /// fixing the recorded use indices.
    pub fn remove_operand(&mut self, op: OpId, index: usize) {
        let removed = self.op(op).operands[index];
        self.values[removed.index()]
            .uses
            .retain(|u| !(u.user == op && u.index == index));
        self.op_mut(op).operands.remove(index);
        let later: Vec<ValueId> = self.op(op).operands[index..].to_vec();
        for (offset, value) in later.iter().enumerate() {
            let old_index = index + offset + 1;
            for u in &mut self.values[value.index()].uses {
                if u.user == op && u.index == old_index {
                    u.index -= 1;
                }
            }
        }
    }

    /// Rewrite every use of `from` to `to`.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) {
        if from == to {
            return;
        }
        let uses = std::mem::take(&mut self.value_mut(from).uses);
        for u in &uses {
            self.ops[u.user.index()].operands[u.index] = to;
        }
        self.value_mut(to).uses.extend(uses);
    }

    /// Erase `op` together with its regions. Its results must be unused.
    pub fn erase_op(&mut self, op: OpId) {
        for result in self.op(op).results.clone() {
            assert!(
                self.value(result).uses.is_empty(),
                "erasing {} whose {} still has uses",
                op,
                result
            );
        }
        self.detach_op(op);
        self.top.retain(|o| *o != op);
        for region in self.op(op).regions.clone() {
            for block in self.region_blocks(region).to_vec() {
                for inner in self.block_ops(block).to_vec() {
                    self.erase_op_inner(inner);
                }
            }
        }
        self.erase_op_inner(op);
    }

    fn erase_op_inner(&mut self, op: OpId) {
        if self.op(op).dead {
            return;
        }
        for region in self.op(op).regions.clone() {
            for block in self.region_blocks(region).to_vec() {
                for inner in self.block_ops(block).to_vec() {
                    self.erase_op_inner(inner);
                }
            }
        }
        let operands = self.op(op).operands.clone();
        for (index, operand) in operands.iter().enumerate() {
            self.values[operand.index()]
                .uses
                .retain(|u| !(u.user == op && u.index == index));
        }
        let data = self.op_mut(op);
        data.dead = true;
        data.operands.clear();
        data.parent = None;
    }

    /// Replace `op` by `values` (one per result) and erase it.
    pub fn replace_op_with_values(&mut self, op: OpId, values: &[ValueId]) {
        let results = self.op(op).results.clone();
        assert_eq!(results.len(), values.len());
        for (result, value) in results.iter().zip(values) {
            self.replace_all_uses(*result, *value);
        }
        self.erase_op(op);
    }

    /////
    ///// Cloning.
    /////

    /// Deep-clone the blocks of `src` into `dst`, recording old→new ids.
    /// Operands defined outside `src` are kept as-is.
    pub fn clone_region_into(&mut self, src: RegionId, dst: RegionId, map: &mut CloneMap) {
        for block in self.region_blocks(src).to_vec() {
            let arg_types: Vec<Attribute> = self
                .block_args(block)
                .iter()
                .map(|a| self.value_type(*a).clone())
                .collect();
            let new_block = self.add_block(dst, arg_types);
            for (old, new) in self
                .block_args(block)
                .to_vec()
                .into_iter()
                .zip(self.block_args(new_block).to_vec())
            {
                map.values.insert(old, new);
            }
            map.blocks.insert(block, new_block);
        }
        for block in self.region_blocks(src).to_vec() {
            let new_block = map.blocks[&block];
            for op in self.block_ops(block).to_vec() {
                let new_op = self.clone_op_into(op, map);
                self.append_op(new_block, new_op);
            }
        }
    }

    /// Clone one operation (and its regions) into a detached op, remapping
    /// operands through `map` and extending it with the clone's results.
    pub fn clone_op(&mut self, op: OpId, map: &mut CloneMap) -> OpId {
        self.clone_op_into(op, map)
    }

    fn clone_op_into(&mut self, op: OpId, map: &mut CloneMap) -> OpId {
        let name = self.op(op).name.clone();
        let operands: Vec<ValueId> = self.operands(op).iter().map(|v| map.value(*v)).collect();
        let result_types: Vec<Attribute> = self
            .results(op)
            .iter()
            .map(|r| self.value_type(*r).clone())
            .collect();
        let attrs = self.op(op).attrs.clone();
        let successors: Vec<BlockId> = self
            .successors(op)
            .iter()
            .map(|b| *map.blocks.get(b).unwrap_or(b))
            .collect();
        let mut regions = Vec::new();
        for region in self.regions(op).to_vec() {
            let new_region = self.new_region();
            self.clone_region_into(region, new_region, map);
            regions.push(new_region);
        }
        let new_op = self.create_op(
            name.as_deref(),
            operands,
            result_types,
            attrs,
            regions,
            successors,
        );
        for (old, new) in self
            .results(op)
            .to_vec()
            .into_iter()
            .zip(self.results(new_op).to_vec())
        {
            if let Some(hint) = self.name_hint(old).map(|s| s.to_string()) {
                self.set_name_hint(new, &hint);
            }
            map.values.insert(old, new);
        }
        map.ops.insert(op, new_op);
        new_op
    }

    /////
    ///// Walking.
    /////

    /// Pre-order walk: the operation first, then its regions in order.
    pub fn walk(&self, op: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        self.walk_into(op, &mut out);
        out
    }

    fn walk_into(&self, op: OpId, out: &mut Vec<OpId>) {
        out.push(op);
        for region in self.regions(op) {
            for block in self.region_blocks(*region) {
                for inner in self.block_ops(*block) {
                    self.walk_into(*inner, out);
                }
            }
        }
    }

    /// Post-order walk: regions first, then the operation.
    pub fn walk_post(&self, op: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        self.walk_post_into(op, &mut out);
        out
    }

    fn walk_post_into(&self, op: OpId, out: &mut Vec<OpId>) {
        for region in self.regions(op) {
            for block in self.region_blocks(*region) {
                for inner in self.block_ops(*block) {
                    self.walk_post_into(*inner, out);
                }
            }
        }
        out.push(op);
    }

    pub fn walk_region(&self, region: RegionId) -> Vec<OpId> {
        let mut out = Vec::new();
        for block in self.region_blocks(region) {
            for op in self.block_ops(*block) {
                self.walk_into(*op, &mut out);
            }
        }
        out
    }

    /// Every live operation in the graph, in pre-order from the top.
    pub fn walk_all(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        for op in &self.top {
            self.walk_into(*op, &mut out);
        }
        out
    }

    /////
    ///// Symbols.
    /////

    /// Resolve `sym` against the `irdl.dialect` scopes of the graph.
    /// A flat reference names a dialect; a nested one names a definition
    /// inside it.
    pub fn lookup_symbol(&self, sym: &SymbolRef) -> Option<OpId> {
        for op in self.walk_all() {
            if self.op_name(op) != Some("irdl.dialect") {
                continue;
            }
            if self.attr(op, "sym_name").and_then(|a| a.as_str()) != Some(&sym.root) {
                continue;
            }
            if sym.nested.is_empty() {
                return Some(op);
            }
            for inner in self.walk(op) {
                if inner == op {
                    continue;
                }
                if self.attr(inner, "sym_name").and_then(|a| a.as_str())
                    == Some(sym.nested[0].as_str())
                {
                    return Some(inner);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::pdl_value_type;

    #[test]
    fn use_lists_track_operands() {
        let mut g = IrGraph::new();
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let a = g.create_op(
            Some("test.op1"),
            vec![],
            vec![pdl_value_type()],
            vec![],
            vec![],
            vec![],
        );
        g.append_op(block, a);
        let v = g.results(a)[0];
        let b = g.create_op(Some("test.op2"), vec![v, v], vec![], vec![], vec![], vec![]);
        g.append_op(block, b);
        assert_eq!(g.value_uses(v).len(), 2);
        g.erase_op(b);
        assert!(g.value_uses(v).is_empty());
        g.erase_op(a);
    }

    #[test]
    fn replace_all_uses_moves_the_use_list() {
        let mut g = IrGraph::new();
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let a = g.create_op(
            Some("test.op1"),
            vec![],
            vec![pdl_value_type()],
            vec![],
            vec![],
            vec![],
        );
        let b = g.create_op(
            Some("test.op1"),
            vec![],
            vec![pdl_value_type()],
            vec![],
            vec![],
            vec![],
        );
        g.append_op(block, a);
        g.append_op(block, b);
        let va = g.results(a)[0];
        let vb = g.results(b)[0];
        let user = g.create_op(Some("test.use_op"), vec![va], vec![], vec![], vec![], vec![]);
        g.append_op(block, user);
        g.replace_all_uses(va, vb);
        assert_eq!(g.operands(user), &[vb]);
        assert!(g.value_uses(va).is_empty());
        assert_eq!(g.value_uses(vb).len(), 1);
    }

    #[test]
    fn walk_orders() {
        let mut g = IrGraph::new();
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let inner = g.create_op(Some("test.op1"), vec![], vec![], vec![], vec![], vec![]);
        g.append_op(block, inner);
        let outer = g.create_op(Some("test.op"), vec![], vec![], vec![], vec![region], vec![]);

        assert_eq!(g.walk(outer), vec![outer, inner]);
        assert_eq!(g.walk_post(outer), vec![inner, outer]);
    }

    #[test]
    fn clone_region_remaps_internal_edges() {
        let mut g = IrGraph::new();
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let a = g.create_op(
            Some("test.op1"),
            vec![],
            vec![pdl_value_type()],
            vec![],
            vec![],
            vec![],
        );
        g.append_op(block, a);
        let v = g.results(a)[0];
        let b = g.create_op(Some("test.use_op"), vec![v], vec![], vec![], vec![], vec![]);
        g.append_op(block, b);

        let dst = g.new_region();
        let mut map = CloneMap::default();
        g.clone_region_into(region, dst, &mut map);
        let cloned = g.walk_region(dst);
        assert_eq!(cloned.len(), 2);
        let new_v = g.results(cloned[0])[0];
        assert_eq!(g.operands(cloned[1]), &[new_v]);
        assert_eq!(map.value(v), new_v);
    }
}
