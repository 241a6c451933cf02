/*!

  Typed views over the IRDL dialect and the subset-checking extension.

  IRDL describes operation and attribute schemas as IR: an `irdl.dialect`
  holds `irdl.type`/`irdl.attribute` definitions (whose bodies constrain
  parameters) and `irdl.operation` definitions (whose bodies constrain
  operands and results). The extension ops express the rewrite-safety
  question: `irdl_ext.check_subset` holds two constraint graphs that end in
  `irdl_ext.yield`s of the same arity.

*/

use crate::core::attribute::irdl_attribute_type;
use crate::core::{Attribute, BlockId, IrGraph, OpId, SymbolRef, ValueId};
use crate::dialects::Malformed;

pub const DIALECT: &str = "irdl.dialect";
pub const TYPE: &str = "irdl.type";
pub const ATTRIBUTE: &str = "irdl.attribute";
pub const PARAMETERS: &str = "irdl.parameters";
pub const OPERATION: &str = "irdl.operation";
pub const OPERANDS: &str = "irdl.operands";
pub const RESULTS: &str = "irdl.results";
pub const ANY: &str = "irdl.any";
pub const ANY_OF: &str = "irdl.any_of";
pub const ALL_OF: &str = "irdl.all_of";
pub const IS: &str = "irdl.is";
pub const BASE: &str = "irdl.base";
pub const PARAMETRIC: &str = "irdl.parametric";

pub const CHECK_SUBSET: &str = "irdl_ext.check_subset";
pub const YIELD: &str = "irdl_ext.yield";
pub const EQ: &str = "irdl_ext.eq";
pub const MATCH: &str = "irdl_ext.match";

/// The constraint-constructor subset of IRDL, used by the simplifier.
pub fn is_constraint_op(name: &str) -> bool {
    matches!(name, ANY | ANY_OF | ALL_OF | IS | BASE | PARAMETRIC)
}

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

fn sym_name(g: &IrGraph, op: OpId) -> Result<String, Malformed> {
    g.attr(op, "sym_name")
        .and_then(|a| a.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Malformed::new(op, "definition needs a `sym_name`"))
}

/////
///// Definitions.
/////

#[derive(Clone, Copy, Debug)]
pub struct DialectOp(pub OpId);

impl DialectOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<DialectOp, Malformed> {
        expect_name(g, op, DIALECT)?;
        Ok(DialectOp(op))
    }

    pub fn sym_name(self, g: &IrGraph) -> Result<String, Malformed> {
        sym_name(g, self.0)
    }

    pub fn body(self, g: &IrGraph) -> Option<BlockId> {
        g.regions(self.0).first().and_then(|r| g.sole_block(*r))
    }
}

/// An `irdl.type` or `irdl.attribute` definition.
#[derive(Clone, Copy, Debug)]
pub struct AttrDefOp(pub OpId);

impl AttrDefOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<AttrDefOp, Malformed> {
        match g.op_name(op) {
            Some(TYPE) | Some(ATTRIBUTE) => Ok(AttrDefOp(op)),
            _ => Err(Malformed::new(
                op,
                "expected an `irdl.type` or `irdl.attribute` definition",
            )),
        }
    }

    pub fn sym_name(self, g: &IrGraph) -> Result<String, Malformed> {
        sym_name(g, self.0)
    }

    pub fn body(self, g: &IrGraph) -> Option<BlockId> {
        g.regions(self.0).first().and_then(|r| g.sole_block(*r))
    }

    /// The dotted `dialect.name` this definition answers to.
    pub fn qualified_name(self, g: &IrGraph) -> Result<String, Malformed> {
        let parent = g
            .parent_op(self.0)
            .ok_or_else(|| Malformed::new(self.0, "definition outside an `irdl.dialect`"))?;
        let dialect = DialectOp::from_op(g, parent)?;
        Ok(format!(
            "{}.{}",
            dialect.sym_name(g)?,
            self.sym_name(g)?
        ))
    }

    /// The `irdl.parameters` terminator, if the definition declares one.
    pub fn parameters(self, g: &IrGraph) -> Option<OpId> {
        let block = self.body(g)?;
        let last = g.block_ops(block).last().copied()?;
        (g.op_name(last) == Some(PARAMETERS)).then_some(last)
    }

    pub fn parameter_count(self, g: &IrGraph) -> usize {
        self.parameters(g)
            .map(|p| g.operands(p).len())
            .unwrap_or(0)
    }
}

/// An `irdl.operation` definition.
#[derive(Clone, Copy, Debug)]
pub struct OperationDefOp(pub OpId);

impl OperationDefOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<OperationDefOp, Malformed> {
        expect_name(g, op, OPERATION)?;
        Ok(OperationDefOp(op))
    }

    pub fn sym_name(self, g: &IrGraph) -> Result<String, Malformed> {
        sym_name(g, self.0)
    }

    pub fn body(self, g: &IrGraph) -> Result<BlockId, Malformed> {
        g.regions(self.0)
            .first()
            .and_then(|r| g.sole_block(*r))
            .ok_or_else(|| Malformed::new(self.0, "`irdl.operation` needs a body"))
    }

    pub fn qualified_name(self, g: &IrGraph) -> Result<String, Malformed> {
        let parent = g
            .parent_op(self.0)
            .ok_or_else(|| Malformed::new(self.0, "definition outside an `irdl.dialect`"))?;
        let dialect = DialectOp::from_op(g, parent)?;
        Ok(format!(
            "{}.{}",
            dialect.sym_name(g)?,
            self.sym_name(g)?
        ))
    }
}

/////
///// Constraint constructors.
/////

pub fn build_any(g: &mut IrGraph) -> OpId {
    g.create_op(Some(ANY), vec![], vec![irdl_attribute_type()], vec![], vec![], vec![])
}

pub fn build_any_of(g: &mut IrGraph, args: Vec<ValueId>) -> OpId {
    g.create_op(
        Some(ANY_OF),
        args,
        vec![irdl_attribute_type()],
        vec![],
        vec![],
        vec![],
    )
}

pub fn build_all_of(g: &mut IrGraph, args: Vec<ValueId>) -> OpId {
    g.create_op(
        Some(ALL_OF),
        args,
        vec![irdl_attribute_type()],
        vec![],
        vec![],
        vec![],
    )
}

pub fn build_is(g: &mut IrGraph, expected: Attribute) -> OpId {
    g.create_op(
        Some(IS),
        vec![],
        vec![irdl_attribute_type()],
        vec![("expected".to_string(), expected)],
        vec![],
        vec![],
    )
}

pub fn build_base_ref(g: &mut IrGraph, base: SymbolRef) -> OpId {
    g.create_op(
        Some(BASE),
        vec![],
        vec![irdl_attribute_type()],
        vec![("base_ref".to_string(), Attribute::SymbolRef(base))],
        vec![],
        vec![],
    )
}

pub fn build_base_name(g: &mut IrGraph, base: &str) -> OpId {
    g.create_op(
        Some(BASE),
        vec![],
        vec![irdl_attribute_type()],
        vec![("base_name".to_string(), Attribute::string(base))],
        vec![],
        vec![],
    )
}

pub fn build_parametric(g: &mut IrGraph, base: SymbolRef, args: Vec<ValueId>) -> OpId {
    g.create_op(
        Some(PARAMETRIC),
        args,
        vec![irdl_attribute_type()],
        vec![("base_type".to_string(), Attribute::SymbolRef(base))],
        vec![],
        vec![],
    )
}

pub fn build_eq(g: &mut IrGraph, args: Vec<ValueId>) -> OpId {
    g.create_op(Some(EQ), args, vec![], vec![], vec![], vec![])
}

pub fn build_match(g: &mut IrGraph, arg: ValueId) -> OpId {
    g.create_op(Some(MATCH), vec![arg], vec![], vec![], vec![], vec![])
}

pub fn build_yield(g: &mut IrGraph, args: Vec<ValueId>, name_hints: Vec<String>) -> OpId {
    g.create_op(
        Some(YIELD),
        args,
        vec![],
        vec![(
            "name_hints".to_string(),
            Attribute::Array(name_hints.iter().map(|h| Attribute::string(h)).collect()),
        )],
        vec![],
        vec![],
    )
}

#[derive(Clone, Copy, Debug)]
pub struct BaseOp(pub OpId);

impl BaseOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<BaseOp, Malformed> {
        expect_name(g, op, BASE)?;
        Ok(BaseOp(op))
    }

    pub fn base_ref(self, g: &IrGraph) -> Option<SymbolRef> {
        g.attr(self.0, "base_ref")
            .and_then(|a| a.as_symbol_ref())
            .cloned()
    }

    pub fn base_name(self, g: &IrGraph) -> Option<String> {
        g.attr(self.0, "base_name")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
    }

    /// The dotted name of the base, whichever way it is spelled.
    pub fn base_dotted(self, g: &IrGraph) -> Option<String> {
        if let Some(r) = self.base_ref(g) {
            return Some(r.dotted());
        }
        self.base_name(g)
            .map(|n| n.trim_start_matches('!').to_string())
    }

    pub fn output(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParametricOp(pub OpId);

impl ParametricOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<ParametricOp, Malformed> {
        expect_name(g, op, PARAMETRIC)?;
        Ok(ParametricOp(op))
    }

    pub fn base_type(self, g: &IrGraph) -> Result<SymbolRef, Malformed> {
        g.attr(self.0, "base_type")
            .and_then(|a| a.as_symbol_ref())
            .cloned()
            .ok_or_else(|| Malformed::new(self.0, "`irdl.parametric` needs a `base_type`"))
    }

    pub fn args(self, g: &IrGraph) -> Vec<ValueId> {
        g.operands(self.0).to_vec()
    }

    pub fn output(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IsOp(pub OpId);

impl IsOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<IsOp, Malformed> {
        expect_name(g, op, IS)?;
        Ok(IsOp(op))
    }

    pub fn expected(self, g: &IrGraph) -> Result<Attribute, Malformed> {
        g.attr(self.0, "expected")
            .cloned()
            .ok_or_else(|| Malformed::new(self.0, "`irdl.is` needs an `expected` attribute"))
    }

    pub fn output(self, g: &IrGraph) -> ValueId {
        g.results(self.0)[0]
    }
}

/////
///// Subset-check extension.
/////

#[derive(Clone, Copy, Debug)]
pub struct CheckSubsetOp(pub OpId);

impl CheckSubsetOp {
    pub fn from_op(g: &IrGraph, op: OpId) -> Result<CheckSubsetOp, Malformed> {
        expect_name(g, op, CHECK_SUBSET)?;
        if g.regions(op).len() != 2 {
            return Err(Malformed::new(op, "`check_subset` needs two regions"));
        }
        Ok(CheckSubsetOp(op))
    }

    pub fn lhs(self, g: &IrGraph) -> BlockId {
        g.sole_block(g.regions(self.0)[0]).unwrap()
    }

    pub fn rhs(self, g: &IrGraph) -> BlockId {
        g.sole_block(g.regions(self.0)[1]).unwrap()
    }

    pub fn lhs_yield(self, g: &IrGraph) -> Result<OpId, Malformed> {
        self.terminator(g, self.lhs(g))
    }

    pub fn rhs_yield(self, g: &IrGraph) -> Result<OpId, Malformed> {
        self.terminator(g, self.rhs(g))
    }

    fn terminator(self, g: &IrGraph, block: BlockId) -> Result<OpId, Malformed> {
        let last = g
            .block_ops(block)
            .last()
            .copied()
            .filter(|op| g.op_name(*op) == Some(YIELD))
            .ok_or_else(|| {
                Malformed::new(self.0, "`check_subset` regions must end with a yield")
            })?;
        Ok(last)
    }

    /// Build a detached `check_subset` with two empty single-block regions.
    pub fn build(g: &mut IrGraph) -> (CheckSubsetOp, BlockId, BlockId) {
        let lhs_region = g.new_region();
        let lhs = g.add_block(lhs_region, vec![]);
        let rhs_region = g.new_region();
        let rhs = g.add_block(rhs_region, vec![]);
        let op = g.create_op(
            Some(CHECK_SUBSET),
            vec![],
            vec![],
            vec![],
            vec![lhs_region, rhs_region],
            vec![],
        );
        (CheckSubsetOp(op), lhs, rhs)
    }
}

/// Collect every `irdl.operation` definition reachable in the graph, keyed
/// by its qualified `dialect.op` name.
pub fn collect_operation_defs(
    g: &IrGraph,
) -> Result<std::collections::HashMap<String, OperationDefOp>, Malformed> {
    let mut out = std::collections::HashMap::new();
    for op in g.walk_all() {
        if g.op_name(op) == Some(OPERATION) && !g.is_dead(op) {
            let def = OperationDefOp(op);
            out.insert(def.qualified_name(g)?, def);
        }
    }
    Ok(out)
}
