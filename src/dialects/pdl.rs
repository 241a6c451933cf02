/*!

  Typed views over the PDL dialect.

  PDL represents rewrite patterns as IR: a `pdl.pattern` holds the matched
  sub-graph and ends with a `pdl.rewrite` whose body erases, replaces, and
  creates operations.

*/

use crate::core::attribute::{
    pdl_attribute_type, pdl_operation_type, pdl_type_type, pdl_value_type,
};
use crate::core::{Attribute, BlockId, IrGraph, OpId, RegionId, ValueId};
use crate::dialects::Malformed;

pub const PATTERN: &str = "pdl.pattern";
pub const OPERATION: &str = "pdl.operation";
pub const OPERAND: &str = "pdl.operand";
pub const RESULT: &str = "pdl.result";
pub const TYPE: &str = "pdl.type";
pub const ATTRIBUTE: &str = "pdl.attribute";
pub const REPLACE: &str = "pdl.replace";
pub const ERASE: &str = "pdl.erase";
pub const REWRITE: &str = "pdl.rewrite";
pub const APPLY_NATIVE_CONSTRAINT: &str = "pdl.apply_native_constraint";
pub const APPLY_NATIVE_REWRITE: &str = "pdl.apply_native_rewrite";

fn expect_name(g: &IrGraph, op: OpId, name: &str) -> Result<(), Malformed> {
    if g.op_name(op) == Some(name) {
        Ok(())
    } else {
        Err(Malformed::new(
            op,
            format!("expected a `{}` operation", name),
        ))
    }
}

/////
///// pdl.pattern
/////

#[derive(Clone, Copy, Debug)]
pub struct PatternOp(pub OpId);

impl PatternOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<PatternOp, Malformed> {
        expect_name(g, op, PATTERN)?;
        let region = g
            .regions(op)
            .first()
            .copied()
            .ok_or_else(|| Malformed::new(op, "`pdl.pattern` must have a body region"))?;
        g.sole_block(region)
            .ok_or_else(|| Malformed::new(op, "`pdl.pattern` body must be a single block"))?;
        Ok(PatternOp(op))
    }

    pub fn body(self, g: &IrGraph) -> BlockId {
        g.sole_block(g.regions(self.0)[0]).unwrap()
    }

    pub fn body_region(self, g: &IrGraph) -> RegionId {
        g.regions(self.0)[0]
    }

    pub fn benefit(self, g: &IrGraph) -> i64 {
        g.attr(self.0, "benefit").and_then(|a| a.as_int()).unwrap_or(1)
    }

    pub fn sym_name(self, g: &IrGraph) -> Option<String> {
        g.attr(self.0, "sym_name")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
    }

    /// The trailing `pdl.rewrite`, which every well-formed pattern must end
    /// with.
    pub fn rewrite(self, g: &IrGraph) -> Result<RewriteOp, Malformed> {
        let last = g
            .block_ops(self.body(g))
            .last()
            .copied()
            .ok_or_else(|| Malformed::new(self.0, "`pdl.pattern` body is empty"))?;
        RewriteOp::from_op(g, last).map_err(|_| {
            Malformed::new(self.0, "`pdl.pattern` must end with a `pdl.rewrite`")
        })
    }

    /// Build a detached pattern with an empty body block.
    pub fn build(g: &mut IrGraph, benefit: i64, sym_name: Option<&str>) -> (PatternOp, BlockId) {
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let mut attrs = vec![(
            "benefit".to_string(),
            Attribute::integer_attr(benefit, Attribute::integer_type(16)),
        )];
        if let Some(name) = sym_name {
            attrs.push(("sym_name".to_string(), Attribute::string(name)));
        }
        let op = g.create_op(Some(PATTERN), vec![], vec![], attrs, vec![region], vec![]);
        (PatternOp(op), block)
    }
}

/////
///// pdl.operation
/////

#[derive(Clone, Copy, Debug)]
pub struct OperationOp(pub OpId);

impl OperationOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<OperationOp, Malformed> {
        expect_name(g, op, OPERATION)?;
        let this = OperationOp(op);
        this.segments(g)?;
        Ok(this)
    }

    fn segments(self, g: &IrGraph) -> Result<(usize, usize, usize), Malformed> {
        let sizes = g
            .attr(self.0, "operandSegmentSizes")
            .and_then(|a| a.as_dense_i32())
            .ok_or_else(|| {
                Malformed::new(self.0, "`pdl.operation` needs `operandSegmentSizes`")
            })?;
        if sizes.len() != 3 || sizes.iter().any(|s| *s < 0) {
            return Err(Malformed::new(self.0, "invalid `operandSegmentSizes`"));
        }
        let (a, b, c) = (sizes[0] as usize, sizes[1] as usize, sizes[2] as usize);
        if a + b + c != g.operands(self.0).len() {
            return Err(Malformed::new(
                self.0,
                "`operandSegmentSizes` does not cover the operand list",
            ));
        }
        Ok((a, b, c))
    }

    pub fn op_name(self, g: &IrGraph) -> Option<String> {
        g.attr(self.0, "opName")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
    }

    /// The `!pdl.operation` handle produced by this op.
    pub fn op_value(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }

    pub fn operand_values(self, g: &IrGraph) -> Vec<ValueId> {
        let (a, _, _) = self.segments(g).unwrap();
        g.operands(self.0)[..a].to_vec()
    }

    pub fn attribute_values(self, g: &IrGraph) -> Vec<ValueId> {
        let (a, b, _) = self.segments(g).unwrap();
        g.operands(self.0)[a..a + b].to_vec()
    }

    pub fn attribute_names(self, g: &IrGraph) -> Vec<String> {
        g.attr(self.0, "attributeValueNames")
            .and_then(|a| a.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn type_values(self, g: &IrGraph) -> Vec<ValueId> {
        let (a, b, _) = self.segments(g).unwrap();
        g.operands(self.0)[a + b..].to_vec()
    }

    pub fn build(
        g: &mut IrGraph,
        name: Option<&str>,
        operand_values: Vec<ValueId>,
        attributes: Vec<(String, ValueId)>,
        type_values: Vec<ValueId>,
    ) -> OperationOp {
        let mut attrs = vec![(
            "attributeValueNames".to_string(),
            Attribute::Array(
                attributes
                    .iter()
                    .map(|(n, _)| Attribute::string(n))
                    .collect(),
            ),
        )];
        if let Some(name) = name {
            attrs.push(("opName".to_string(), Attribute::string(name)));
        }
        attrs.push((
            "operandSegmentSizes".to_string(),
            Attribute::DenseI32(vec![
                operand_values.len() as i32,
                attributes.len() as i32,
                type_values.len() as i32,
            ]),
        ));
        let mut operands = operand_values;
        operands.extend(attributes.iter().map(|(_, v)| *v));
        operands.extend(type_values);
        let op = g.create_op(
            Some(OPERATION),
            operands,
            vec![pdl_operation_type()],
            attrs,
            vec![],
            vec![],
        );
        OperationOp(op)
    }
}

/////
///// pdl.result
/////

#[derive(Clone, Copy, Debug)]
pub struct ResultOp(pub OpId);

impl ResultOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<ResultOp, Malformed> {
        expect_name(g, op, RESULT)?;
        if g.operands(op).len() != 1 {
            return Err(Malformed::new(op, "`pdl.result` takes exactly one operand"));
        }
        Ok(ResultOp(op))
    }

    pub fn index(self, g: &IrGraph) -> Result<usize, Malformed> {
        g.attr(self.0, "index")
            .and_then(|a| a.as_int())
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| Malformed::new(self.0, "`pdl.result` needs an `index`"))
    }

    /// The `!pdl.operation` handle the result is taken from.
    pub fn parent_value(self, g: &IrGraph) -> ValueId {
        g.operands(self.0)[0]
    }

    /// The producing `pdl.operation`.
    pub fn parent_operation(self, g: &IrGraph) -> Result<OperationOp, Malformed> {
        let (producer, _) = g.producer(self.parent_value(g)).ok_or_else(|| {
            Malformed::new(self.0, "`pdl.result` must take the result of a `pdl.operation`")
        })?;
        OperationOp::from_op(g, producer).map_err(|_| {
            Malformed::new(self.0, "`pdl.result` must take the result of a `pdl.operation`")
        })
    }

    pub fn value(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }

    pub fn build(g: &mut IrGraph, index: usize, parent: ValueId) -> ResultOp {
        let op = g.create_op(
            Some(RESULT),
            vec![parent],
            vec![pdl_value_type()],
            vec![(
                "index".to_string(),
                Attribute::integer_attr(index as i64, Attribute::integer_type(32)),
            )],
            vec![],
            vec![],
        );
        ResultOp(op)
    }
}

/////
///// pdl.type
/////

#[derive(Clone, Copy, Debug)]
pub struct TypeOp(pub OpId);

impl TypeOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<TypeOp, Malformed> {
        expect_name(g, op, TYPE)?;
        Ok(TypeOp(op))
    }

    pub fn constant_type(self, g: &IrGraph) -> Option<Attribute> {
        g.attr(self.0, "constantType").cloned()
    }

    pub fn value(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }

    pub fn build(g: &mut IrGraph, constant: Option<Attribute>) -> TypeOp {
        let mut attrs = Vec::new();
        if let Some(constant) = constant {
            attrs.push(("constantType".to_string(), constant));
        }
        let op = g.create_op(Some(TYPE), vec![], vec![pdl_type_type()], attrs, vec![], vec![]);
        TypeOp(op)
    }
}

/////
///// pdl.attribute
/////

#[derive(Clone, Copy, Debug)]
pub struct AttributeOp(pub OpId);

impl AttributeOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<AttributeOp, Malformed> {
        expect_name(g, op, ATTRIBUTE)?;
        Ok(AttributeOp(op))
    }

    pub fn value(self, g: &IrGraph) -> Option<Attribute> {
        g.attr(self.0, "value").cloned()
    }

    /// The optional `!pdl.type` constraining a typed attribute.
    pub fn value_type(self, g: &IrGraph) -> Option<ValueId> {
        g.operands(self.0).first().copied()
    }

    pub fn output(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }

    pub fn build(g: &mut IrGraph, value: Option<Attribute>, ty: Option<ValueId>) -> AttributeOp {
        let mut attrs = Vec::new();
        if let Some(value) = value {
            attrs.push(("value".to_string(), value));
        }
        let operands = ty.into_iter().collect();
        let op = g.create_op(
            Some(ATTRIBUTE),
            operands,
            vec![pdl_attribute_type()],
            attrs,
            vec![],
            vec![],
        );
        AttributeOp(op)
    }
}

/////
///// pdl.operand
/////

#[derive(Clone, Copy, Debug)]
pub struct OperandOp(pub OpId);

impl OperandOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<OperandOp, Malformed> {
        expect_name(g, op, OPERAND)?;
        Ok(OperandOp(op))
    }

    pub fn value_type(self, g: &IrGraph) -> Option<ValueId> {
        g.operands(self.0).first().copied()
    }

    pub fn value(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }

    pub fn build(g: &mut IrGraph, ty: Option<ValueId>) -> OperandOp {
        let operands = ty.into_iter().collect();
        let op = g.create_op(
            Some(OPERAND),
            operands,
            vec![pdl_value_type()],
            vec![],
            vec![],
            vec![],
        );
        OperandOp(op)
    }
}

/////
///// pdl.rewrite
/////

#[derive(Clone, Copy, Debug)]
pub struct RewriteOp(pub OpId);

impl RewriteOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<RewriteOp, Malformed> {
        expect_name(g, op, REWRITE)?;
        Ok(RewriteOp(op))
    }

    /// The matched root handle the rewrite is anchored on.
    pub fn root(self, g: &IrGraph) -> Option<ValueId> {
        let sizes = g
            .attr(self.0, "operandSegmentSizes")
            .and_then(|a| a.as_dense_i32());
        match sizes {
            Some(sizes) if sizes.first() == Some(&0) => None,
            _ => g.operands(self.0).first().copied(),
        }
    }

    pub fn body(self, g: &IrGraph) -> Option<BlockId> {
        g.regions(self.0).first().and_then(|r| g.sole_block(*r))
    }

    pub fn build(g: &mut IrGraph, root: ValueId, external: Vec<ValueId>) -> (RewriteOp, BlockId) {
        let region = g.new_region();
        let block = g.add_block(region, vec![]);
        let mut operands = vec![root];
        let external_len = external.len();
        operands.extend(external);
        let op = g.create_op(
            Some(REWRITE),
            operands,
            vec![],
            vec![(
                "operandSegmentSizes".to_string(),
                Attribute::DenseI32(vec![1, external_len as i32]),
            )],
            vec![region],
            vec![],
        );
        (RewriteOp(op), block)
    }
}

/////
///// pdl.erase / pdl.replace
/////

#[derive(Clone, Copy, Debug)]
pub struct EraseOp(pub OpId);

impl EraseOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<EraseOp, Malformed> {
        expect_name(g, op, ERASE)?;
        if g.operands(op).len() != 1 {
            return Err(Malformed::new(op, "`pdl.erase` takes exactly one operand"));
        }
        Ok(EraseOp(op))
    }

    pub fn op_value(self, g: &IrGraph) -> ValueId {
        g.operands(self.0)[0]
    }

    pub fn build(g: &mut IrGraph, target: ValueId) -> EraseOp {
        let op = g.create_op(Some(ERASE), vec![target], vec![], vec![], vec![], vec![]);
        EraseOp(op)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReplaceOp(pub OpId);

impl ReplaceOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<ReplaceOp, Malformed> {
        expect_name(g, op, REPLACE)?;
        let this = ReplaceOp(op);
        this.segments(g)?;
        Ok(this)
    }

    fn segments(self, g: &IrGraph) -> Result<(usize, usize), Malformed> {
        let sizes = g
            .attr(self.0, "operandSegmentSizes")
            .and_then(|a| a.as_dense_i32())
            .ok_or_else(|| Malformed::new(self.0, "`pdl.replace` needs `operandSegmentSizes`"))?;
        if sizes.len() != 3 || sizes[0] != 1 || sizes[1] > 1 {
            return Err(Malformed::new(self.0, "invalid `operandSegmentSizes`"));
        }
        if (sizes[1] as usize) + (sizes[2] as usize) + 1 != g.operands(self.0).len() {
            return Err(Malformed::new(
                self.0,
                "`operandSegmentSizes` does not cover the operand list",
            ));
        }
        Ok((sizes[1] as usize, sizes[2] as usize))
    }

    /// The handle of the operation being replaced.
    pub fn op_value(self, g: &IrGraph) -> ValueId {
        g.operands(self.0)[0]
    }

    /// The replacement operation handle, for the op form.
    pub fn repl_operation(self, g: &IrGraph) -> Option<ValueId> {
        let (has_op, _) = self.segments(g).unwrap();
        if has_op == 1 {
            Some(g.operands(self.0)[1])
        } else {
            None
        }
    }

    /// The replacement values, for the values form.
    pub fn repl_values(self, g: &IrGraph) -> Vec<ValueId> {
        let (has_op, _) = self.segments(g).unwrap();
        g.operands(self.0)[1 + has_op..].to_vec()
    }

    pub fn build_with_op(g: &mut IrGraph, target: ValueId, repl: ValueId) -> ReplaceOp {
        let op = g.create_op(
            Some(REPLACE),
            vec![target, repl],
            vec![],
            vec![(
                "operandSegmentSizes".to_string(),
                Attribute::DenseI32(vec![1, 1, 0]),
            )],
            vec![],
            vec![],
        );
        ReplaceOp(op)
    }

    pub fn build_with_values(g: &mut IrGraph, target: ValueId, values: Vec<ValueId>) -> ReplaceOp {
        let count = values.len() as i32;
        let mut operands = vec![target];
        operands.extend(values);
        let op = g.create_op(
            Some(REPLACE),
            operands,
            vec![],
            vec![(
                "operandSegmentSizes".to_string(),
                Attribute::DenseI32(vec![1, 0, count]),
            )],
            vec![],
            vec![],
        );
        ReplaceOp(op)
    }
}

/////
///// pdl.apply_native_constraint / pdl.apply_native_rewrite
/////

#[derive(Clone, Copy, Debug)]
pub struct ApplyNativeConstraintOp(pub OpId);

impl ApplyNativeConstraintOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<ApplyNativeConstraintOp, Malformed> {
        expect_name(g, op, APPLY_NATIVE_CONSTRAINT)?;
        Ok(ApplyNativeConstraintOp(op))
    }

    pub fn constraint_name(self, g: &IrGraph) -> Result<String, Malformed> {
        g.attr(self.0, "name")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Malformed::new(self.0, "native constraint needs a `name`"))
    }

    pub fn args(self, g: &IrGraph) -> Vec<ValueId> {
        g.operands(self.0).to_vec()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ApplyNativeRewriteOp(pub OpId);

impl ApplyNativeRewriteOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<ApplyNativeRewriteOp, Malformed> {
        expect_name(g, op, APPLY_NATIVE_REWRITE)?;
        Ok(ApplyNativeRewriteOp(op))
    }

    pub fn rewrite_name(self, g: &IrGraph) -> Result<String, Malformed> {
        g.attr(self.0, "name")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Malformed::new(self.0, "native rewrite needs a `name`"))
    }

    pub fn args(self, g: &IrGraph) -> Vec<ValueId> {
        g.operands(self.0).to_vec()
    }

    pub fn output(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }
}
