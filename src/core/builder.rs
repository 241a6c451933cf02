/*!

   A small fluent builder for detached operations, in the spirit of the
   usual MLIR operation builders. `finish` allocates the operation in the
   arena; the caller then places it with one of the insertion methods.

*/

use crate::core::attribute::Attribute;
use crate::core::ir::{BlockId, IrGraph, OpId, RegionId, ValueId};

#[derive(Debug, Default)]
pub struct OperationBuilder {
    name: Option<String>,
    operands: Vec<ValueId>,
    result_types: Vec<Attribute>,
    attrs: Vec<(String, Attribute)>,
    regions: Vec<RegionId>,
    successors: Vec<BlockId>,
}

impl OperationBuilder {
    pub fn new(name: &str) -> OperationBuilder {
        OperationBuilder {
            name: Some(name.to_string()),
            ..OperationBuilder::default()
        }
    }

    /// A builder for an operation with no fixed name ("any operation").
    pub fn unnamed() -> OperationBuilder {
        OperationBuilder::default()
    }

    pub fn push_operand(mut self, v: ValueId) -> Self {
        self.operands.push(v);
        self
    }

    pub fn set_operands(mut self, vs: Vec<ValueId>) -> Self {
        self.operands = vs;
        self
    }

    pub fn push_result_type(mut self, ty: Attribute) -> Self {
        self.result_types.push(ty);
        self
    }

    pub fn set_result_types(mut self, tys: Vec<Attribute>) -> Self {
        self.result_types = tys;
        self
    }

    pub fn insert_attr(mut self, key: &str, value: Attribute) -> Self {
        self.attrs.push((key.to_string(), value));
        self
    }

    pub fn push_region(mut self, region: RegionId) -> Self {
        self.regions.push(region);
        self
    }

    pub fn push_successor(mut self, block: BlockId) -> Self {
        self.successors.push(block);
        self
    }

    pub fn finish(self, g: &mut IrGraph) -> OpId {
        g.create_op(
            self.name.as_deref(),
            self.operands,
            self.result_types,
            self.attrs,
            self.regions,
            self.successors,
        )
    }
}
