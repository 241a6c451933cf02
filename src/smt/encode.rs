/*!

  Encoding of a `check_subset` program into an SMT-LIB 2 script.

  All attributes live in a single algebraic datatype: an `unassigned`
  sentinel, an `other` escape hatch for attributes the program does not
  model, `int`/`string` payloads, and one constructor per IRDL attribute or
  type definition. The subset query asserts the lhs constraints outright
  and denies the existence of rhs values satisfying the rhs constraints
  together with the yield equalities; `unsat` therefore means every match
  produces a legal rewrite.

*/

use crate::core::attribute::{Attribute, INDEX_TYPE, INTEGER_ATTR, INTEGER_TYPE, SIGNEDNESS};
use crate::core::{IrGraph, OpId, ValueId};
use crate::dialects::irdl::{self, AttrDefOp, CheckSubsetOp};
use std::collections::HashMap;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("attribute constructor `{0}` is not declared by the IRDL program")]
    UnknownConstructor(String),
    #[error("cannot encode attribute `{0}`")]
    UnsupportedAttribute(String),
    #[error("value used before definition while encoding {0}")]
    UseBeforeDef(OpId),
    #[error("unsupported operation `{0}` in a constraint region")]
    UnsupportedOp(String),
    #[error("malformed check_subset program: {0}")]
    Malformed(String),
}

impl From<crate::dialects::Malformed> for EncodeError {
    fn from(m: crate::dialects::Malformed) -> EncodeError {
        EncodeError::Malformed(m.msg)
    }
}

fn quote(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '|' || c == '\\' { '_' } else { c })
        .collect();
    format!("|{}|", cleaned)
}

/// The datatype universe: constructor name -> parameter count.
struct Universe {
    constructors: Vec<(String, usize)>,
}

impl Universe {
    fn collect(g: &IrGraph) -> Result<Universe, EncodeError> {
        let mut constructors: Vec<(String, usize)> = Vec::new();
        for op in g.walk_all() {
            if g.is_dead(op) {
                continue;
            }
            if matches!(g.op_name(op), Some(irdl::TYPE) | Some(irdl::ATTRIBUTE)) {
                let def = AttrDefOp(op);
                let name = def.qualified_name(g)?;
                if !constructors.iter().any(|(n, _)| *n == name) {
                    constructors.push((name, def.parameter_count(g)));
                }
            }
        }
        // The builtin constructors referenced by the lowering, unless the
        // program declares its own versions.
        for (name, arity) in [
            (INTEGER_TYPE, 2usize),
            (SIGNEDNESS, 1),
            (INTEGER_ATTR, 2),
            (INDEX_TYPE, 0),
        ] {
            if !constructors.iter().any(|(n, _)| n == name) {
                constructors.push((name.to_string(), arity));
            }
        }
        Ok(Universe { constructors })
    }

    fn arity(&self, name: &str) -> Option<usize> {
        self.constructors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| *a)
    }

    fn declaration(&self) -> String {
        let mut s = String::from("(declare-datatypes ((Attribute 0)) ((\n");
        s.push_str("  (unassigned)\n");
        s.push_str("  (other (other_arg_0 Int))\n");
        s.push_str("  (int (int_arg_0 Int))\n");
        s.push_str("  (string (string_arg_0 String))\n");
        for (name, arity) in &self.constructors {
            let mut fields = String::new();
            for i in 0..*arity {
                write!(fields, " ({} Attribute)", quote(&format!("{}_arg_{}", name, i))).unwrap();
            }
            writeln!(s, "  ({}{})", quote(name), fields).unwrap();
        }
        s.push_str(")))\n");
        s
    }
}

/// Encode one concrete attribute as a ground term.
fn encode_attr(universe: &Universe, attr: &Attribute) -> Result<String, EncodeError> {
    match attr {
        Attribute::Int(v) => Ok(format!("(int {})", v)),
        Attribute::String(s) => Ok(format!("(string \"{}\")", s.replace('"', "\"\""))),
        Attribute::IntegerAttr(value, ty) => {
            let value = encode_attr(universe, value)?;
            let ty = encode_attr(universe, ty)?;
            Ok(format!("({} {} {})", quote(INTEGER_ATTR), value, ty))
        }
        Attribute::Parametric(name, params) => {
            let arity = universe
                .arity(name)
                .ok_or_else(|| EncodeError::UnknownConstructor(name.clone()))?;
            if arity != params.len() {
                return Err(EncodeError::UnsupportedAttribute(format!(
                    "`{}` expects {} parameter(s)",
                    name, arity
                )));
            }
            if params.is_empty() {
                return Ok(quote(name));
            }
            let mut s = format!("({}", quote(name));
            for p in params {
                s.push(' ');
                s.push_str(&encode_attr(universe, p)?);
            }
            s.push(')');
            Ok(s)
        }
        other => Err(EncodeError::UnsupportedAttribute(format!("{:?}", other))),
    }
}

struct Encoder<'g> {
    g: &'g IrGraph,
    universe: Universe,
    values: HashMap<ValueId, String>,
    declared: Vec<String>,
    name_index: usize,
}

impl<'g> Encoder<'g> {
    fn fresh(&mut self, value: ValueId) -> String {
        self.name_index += 1;
        let hint = self.g.name_hint(value).unwrap_or("tmp");
        let name = quote(&format!("{}{}", hint, self.name_index));
        self.declared.push(name.clone());
        name
    }

    fn term(&self, value: ValueId, at: OpId) -> Result<String, EncodeError> {
        self.values
            .get(&value)
            .cloned()
            .ok_or(EncodeError::UseBeforeDef(at))
    }

    /// Encode one constraint op; constants go through `fresh`, logical
    /// obligations through `constrain`.
    fn encode_op(
        &mut self,
        op: OpId,
        mut fresh: impl FnMut(&mut Self, ValueId) -> String,
        constrain: &mut impl FnMut(String),
    ) -> Result<(), EncodeError> {
        let g = self.g;
        match g.op_name(op) {
            Some(irdl::ANY) => {
                let out = g.results(op)[0];
                let c = fresh(self, out);
                self.values.insert(out, c);
            }
            Some(irdl::ANY_OF) => {
                let out = g.results(op)[0];
                let c = fresh(self, out);
                let mut parts = Vec::new();
                for operand in g.operands(op) {
                    parts.push(format!("(= {} {})", c, self.term(*operand, op)?));
                }
                parts.push(format!("(= {} unassigned)", c));
                constrain(format!("(or {})", parts.join(" ")));
                self.values.insert(out, c);
            }
            Some(irdl::ALL_OF) => {
                let out = g.results(op)[0];
                let c = fresh(self, out);
                let mut parts = Vec::new();
                for operand in g.operands(op) {
                    parts.push(format!("(= {} {})", c, self.term(*operand, op)?));
                }
                let conj = match parts.len() {
                    0 => "true".to_string(),
                    1 => parts[0].clone(),
                    _ => format!("(and {})", parts.join(" ")),
                };
                constrain(format!("(or {} (= {} unassigned))", conj, c));
                self.values.insert(out, c);
            }
            Some(irdl::IS) => {
                let view = irdl::IsOp(op);
                let expected = view.expected(g)?;
                let term = encode_attr(&self.universe, &expected)?;
                self.values.insert(view.output(g), term);
            }
            Some(irdl::BASE) => {
                let view = irdl::BaseOp(op);
                let base = view
                    .base_dotted(g)
                    .ok_or_else(|| EncodeError::Malformed("base without a target".into()))?;
                if self.universe.arity(&base).is_none() {
                    return Err(EncodeError::UnknownConstructor(base));
                }
                let out = view.output(g);
                let c = fresh(self, out);
                constrain(format!(
                    "(or ((_ is {}) {}) (= {} unassigned))",
                    quote(&base),
                    c,
                    c
                ));
                self.values.insert(out, c);
            }
            Some(irdl::PARAMETRIC) => {
                let view = irdl::ParametricOp(op);
                let base = view.base_type(g)?.dotted();
                let arity = self
                    .universe
                    .arity(&base)
                    .ok_or_else(|| EncodeError::UnknownConstructor(base.clone()))?;
                let args = view.args(g);
                if args.len() != arity {
                    return Err(EncodeError::Malformed(format!(
                        "`{}` expects {} parameter(s)",
                        base, arity
                    )));
                }
                let params: Vec<String> = args
                    .iter()
                    .map(|a| self.term(*a, op))
                    .collect::<Result<_, _>>()?;
                let out = view.output(g);
                let c = fresh(self, out);
                if params.is_empty() {
                    constrain(format!("(= {} {})", c, quote(&base)));
                } else {
                    let unassigned: Vec<String> = params
                        .iter()
                        .map(|p| format!("(= {} unassigned)", p))
                        .collect();
                    constrain(format!(
                        "(= {} (ite (or {}) unassigned ({} {})))",
                        c,
                        unassigned.join(" "),
                        quote(&base),
                        params.join(" ")
                    ));
                }
                self.values.insert(out, c);
            }
            Some(irdl::EQ) => {
                let operands = g.operands(op).to_vec();
                let first = self.term(operands[0], op)?;
                for operand in &operands[1..] {
                    constrain(format!("(= {} {})", first, self.term(*operand, op)?));
                }
            }
            Some(irdl::MATCH) => {
                let arg = self.term(g.operands(op)[0], op)?;
                constrain(format!("(not (= {} unassigned))", arg));
            }
            Some(irdl::YIELD) => {
                for operand in g.operands(op).to_vec() {
                    let term = self.term(operand, op)?;
                    constrain(format!("(not (= {} unassigned))", term));
                }
                for operand in g.operands(op).to_vec() {
                    let term = self.term(operand, op)?;
                    let named = fresh(self, operand);
                    constrain(format!("(= {} {})", term, named));
                }
            }
            Some(other) => return Err(EncodeError::UnsupportedOp(other.to_string())),
            None => return Err(EncodeError::UnsupportedOp("<unnamed>".to_string())),
        }
        Ok(())
    }
}

/// Propagate the `name_hints` recorded on the yields back onto hint-less
/// values, so model constants keep readable names.
pub fn restore_yield_name_hints(g: &mut IrGraph, check: CheckSubsetOp) {
    for yield_op in [check.lhs_yield(g), check.rhs_yield(g)] {
        let Ok(yield_op) = yield_op else { continue };
        let Some(Attribute::Array(hints)) = g.attr(yield_op, "name_hints").cloned() else {
            continue;
        };
        for (index, operand) in g.operands(yield_op).to_vec().into_iter().enumerate() {
            if g.name_hint(operand).is_none() {
                if let Some(hint) = hints.get(index).and_then(|h| h.as_str()) {
                    g.set_name_hint(operand, hint);
                }
            }
        }
    }
}

/// Produce the full SMT-LIB script for one `check_subset` program.
/// The script ends before `(check-sat)`; the solver driver appends it.
pub fn encode_check_subset(g: &IrGraph, check: CheckSubsetOp) -> Result<String, EncodeError> {
    let universe = Universe::collect(g)?;
    let mut script = universe.declaration();

    let mut encoder = Encoder {
        g,
        universe: Universe::collect(g)?,
        values: HashMap::new(),
        declared: Vec::new(),
        name_index: 0,
    };

    // lhs: plain constants, direct assertions.
    let mut lhs_decls: Vec<String> = Vec::new();
    let mut lhs_asserts: Vec<String> = Vec::new();
    for op in g.block_ops(check.lhs(g)).to_vec() {
        let before = encoder.declared.len();
        encoder.encode_op(
            op,
            |e, v| e.fresh(v),
            &mut |c| lhs_asserts.push(c),
        )?;
        for name in &encoder.declared[before..] {
            lhs_decls.push(name.clone());
        }
    }

    // rhs: existential constants, collected constraints.
    let rhs_start = encoder.declared.len();
    let mut rhs_constraints: Vec<String> = Vec::new();
    for op in g.block_ops(check.rhs(g)).to_vec() {
        encoder.encode_op(
            op,
            |e, v| e.fresh(v),
            &mut |c| rhs_constraints.push(c),
        )?;
    }
    let externals: Vec<String> = encoder.declared[rhs_start..].to_vec();

    // The two yields expose the same interface pre- and post-rewrite.
    let lhs_yield = check.lhs_yield(g)?;
    let rhs_yield = check.rhs_yield(g)?;
    let lhs_args = g.operands(lhs_yield).to_vec();
    let rhs_args = g.operands(rhs_yield).to_vec();
    if lhs_args.len() != rhs_args.len() {
        return Err(EncodeError::Malformed(
            "the lhs and rhs yields disagree on arity".into(),
        ));
    }
    for (lhs_arg, rhs_arg) in lhs_args.iter().zip(&rhs_args) {
        rhs_constraints.push(format!(
            "(= {} {})",
            encoder.term(*lhs_arg, lhs_yield)?,
            encoder.term(*rhs_arg, rhs_yield)?
        ));
    }

    for name in &lhs_decls {
        writeln!(script, "(declare-const {} Attribute)", name).unwrap();
    }
    for assert in &lhs_asserts {
        writeln!(script, "(assert {})", assert).unwrap();
    }

    let body = match rhs_constraints.len() {
        0 => "true".to_string(),
        1 => rhs_constraints[0].clone(),
        _ => format!("(and {})", rhs_constraints.join(" ")),
    };
    if externals.is_empty() {
        writeln!(script, "(assert (not {}))", body).unwrap();
    } else {
        let bound: Vec<String> = externals
            .iter()
            .map(|name| format!("({} Attribute)", name))
            .collect();
        writeln!(script, "(assert (not (exists ({}) {})))", bound.join(" "), body).unwrap();
    }
    Ok(script)
}
