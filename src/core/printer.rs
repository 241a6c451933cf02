/*!

  Printer for the generic operation syntax. Everything printed here parses
  back through `core::parser` into an identical graph, which is what lets
  the tools round-trip inputs and ship modules to the external engine.

*/

use crate::core::attribute::{Attribute, INDEX_TYPE, INTEGER_TYPE};
use crate::core::ir::{BlockId, IrGraph, OpId, ValueId};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use {indenter::indented, std::fmt};

pub fn print_attr(attr: &Attribute) -> String {
    let mut s = String::new();
    write_attr(&mut s, attr).unwrap();
    s
}

pub fn print_type(attr: &Attribute) -> String {
    let mut s = String::new();
    write_type(&mut s, attr).unwrap();
    s
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

fn write_attr(f: &mut dyn fmt::Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => write!(f, "unit"),
        Attribute::Int(v) => write!(f, "{}", v),
        Attribute::String(s) => write!(f, "\"{}\"", escape(s)),
        Attribute::SymbolRef(r) => write!(f, "{}", r),
        Attribute::IntegerAttr(v, t) => {
            write_attr(f, v)?;
            write!(f, " : ")?;
            write_type(f, t)
        }
        Attribute::Array(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write_attr(f, item)?;
            }
            write!(f, "]")
        }
        Attribute::Dict(entries) => {
            write!(f, "{{")?;
            for (i, (k, v)) in entries.iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                if *v == Attribute::Unit {
                    write!(f, "{}", k)?;
                } else {
                    write!(f, "{} = ", k)?;
                    write_attr(f, v)?;
                }
            }
            write!(f, "}}")
        }
        Attribute::DenseI32(items) => {
            if items.is_empty() {
                write!(f, "array<i32>")
            } else {
                write!(f, "array<i32: ")?;
                for (i, v) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ">")
            }
        }
        Attribute::Parametric(..) => write_type(f, attr),
    }
}

fn write_type(f: &mut dyn fmt::Write, ty: &Attribute) -> fmt::Result {
    if let Attribute::Parametric(name, params) = ty {
        if name == INDEX_TYPE && params.is_empty() {
            return write!(f, "index");
        }
        if name == INTEGER_TYPE {
            if let [Attribute::Int(width), signedness] = params.as_slice() {
                if *signedness == Attribute::signedness("signless") {
                    return write!(f, "i{}", width);
                }
            }
        }
        write!(f, "!{}", name)?;
        if !params.is_empty() {
            write!(f, "<")?;
            for (i, p) in params.iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write_attr(f, p)?;
            }
            write!(f, ">")?;
        }
        return Ok(());
    }
    // A non-parametric attribute in type position.
    write_attr(f, ty)
}

struct Printer<'g> {
    g: &'g IrGraph,
    value_names: HashMap<ValueId, String>,
    block_names: HashMap<BlockId, String>,
    used: HashSet<String>,
    next_value: usize,
    next_block: usize,
}

impl<'g> Printer<'g> {
    fn new(g: &'g IrGraph) -> Printer<'g> {
        Printer {
            g,
            value_names: HashMap::new(),
            block_names: HashMap::new(),
            used: HashSet::new(),
            next_value: 0,
            next_block: 0,
        }
    }

    fn name_value(&mut self, v: ValueId) {
        if self.value_names.contains_key(&v) {
            return;
        }
        let name = match self.g.name_hint(v) {
            Some(hint) if !self.used.contains(hint) => hint.to_string(),
            _ => loop {
                let candidate = format!("{}", self.next_value);
                self.next_value += 1;
                if !self.used.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.used.insert(name.clone());
        self.value_names.insert(v, name);
    }

    fn assign_names(&mut self, op: OpId) {
        for result in self.g.results(op) {
            self.name_value(*result);
        }
        for region in self.g.regions(op) {
            for block in self.g.region_blocks(*region) {
                let label = format!("bb{}", self.next_block);
                self.next_block += 1;
                self.block_names.insert(*block, label);
                for arg in self.g.block_args(*block) {
                    self.name_value(*arg);
                }
            }
            for block in self.g.region_blocks(*region) {
                for inner in self.g.block_ops(*block) {
                    self.assign_names(*inner);
                }
            }
        }
    }

    fn value_name(&self, v: ValueId) -> String {
        match self.value_names.get(&v) {
            Some(name) => name.clone(),
            // A value defined outside the printed subtree.
            None => self
                .g
                .name_hint(v)
                .map(|h| h.to_string())
                .unwrap_or_else(|| format!("v{}", v.index())),
        }
    }

    fn render_op(&self, op: OpId) -> String {
        let g = self.g;
        let mut s = String::new();
        let results = g.results(op);
        if !results.is_empty() {
            let names: Vec<String> = results
                .iter()
                .map(|r| format!("%{}", self.value_name(*r)))
                .collect();
            write!(s, "{} = ", names.join(", ")).unwrap();
        }
        write!(s, "\"{}\"", g.op_name(op).unwrap_or("unknown")).unwrap();
        let operands: Vec<String> = g
            .operands(op)
            .iter()
            .map(|v| format!("%{}", self.value_name(*v)))
            .collect();
        write!(s, "({})", operands.join(", ")).unwrap();
        if !g.successors(op).is_empty() {
            let succ: Vec<String> = g
                .successors(op)
                .iter()
                .map(|b| {
                    format!(
                        "^{}",
                        self.block_names
                            .get(b)
                            .cloned()
                            .unwrap_or_else(|| format!("bb{}", b.index()))
                    )
                })
                .collect();
            write!(s, " [{}]", succ.join(", ")).unwrap();
        }
        if !g.attrs(op).is_empty() {
            write!(s, " <{}>", print_attr(&Attribute::Dict(g.attrs(op).to_vec()))).unwrap();
        }
        if !g.regions(op).is_empty() {
            write!(s, " (").unwrap();
            for (i, region) in g.regions(op).iter().enumerate() {
                if i != 0 {
                    write!(s, ", ").unwrap();
                }
                writeln!(s, "{{").unwrap();
                let mut body = String::new();
                for (bi, block) in g.region_blocks(*region).iter().enumerate() {
                    let args = g.block_args(*block);
                    let label = self
                        .block_names
                        .get(block)
                        .cloned()
                        .unwrap_or_else(|| format!("bb{}", block.index()));
                    if bi != 0 || !args.is_empty() {
                        let rendered: Vec<String> = args
                            .iter()
                            .map(|a| {
                                format!(
                                    "%{} : {}",
                                    self.value_name(*a),
                                    print_type(g.value_type(*a))
                                )
                            })
                            .collect();
                        if rendered.is_empty() {
                            writeln!(body, "^{}:", label).unwrap();
                        } else {
                            writeln!(body, "^{}({}):", label, rendered.join(", ")).unwrap();
                        }
                    }
                    for inner in g.block_ops(*block) {
                        writeln!(body, "{}", self.render_op(*inner)).unwrap();
                    }
                }
                write!(indented(&mut s).with_str("  "), "{}", body).unwrap();
                write!(s, "}}").unwrap();
            }
            write!(s, ")").unwrap();
        }
        let operand_types: Vec<String> = g
            .operands(op)
            .iter()
            .map(|v| print_type(g.value_type(*v)))
            .collect();
        write!(s, " : ({}) -> ", operand_types.join(", ")).unwrap();
        let result_types: Vec<String> = results
            .iter()
            .map(|r| print_type(g.value_type(*r)))
            .collect();
        match result_types.len() {
            0 => write!(s, "()").unwrap(),
            1 => write!(s, "{}", result_types[0]).unwrap(),
            _ => write!(s, "({})", result_types.join(", ")).unwrap(),
        }
        s
    }
}

/// Print a single operation (and everything nested below it).
pub fn print_op(g: &IrGraph, op: OpId) -> String {
    let mut printer = Printer::new(g);
    printer.assign_names(op);
    printer.render_op(op)
}

/// Print every top-level operation of the graph.
pub fn print_graph(g: &IrGraph) -> String {
    let mut printer = Printer::new(g);
    for op in g.top_ops() {
        printer.assign_names(*op);
    }
    let mut out = String::new();
    for op in g.top_ops() {
        writeln!(out, "{}", printer.render_op(*op)).unwrap();
    }
    out
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_attr(f, self)
    }
}
