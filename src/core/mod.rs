//! Core functionality: the arena IR, the attribute universe, dialect
//! registration, the generic-syntax parser and printer, and diagnostics
//! setup for the command-line tools.

pub mod attribute;
mod builder;
mod diagnostics;
mod dialect;
mod ir;
pub mod parser;
pub mod printer;

// Public API.
pub use self::{
    attribute::{Attribute, SymbolRef},
    builder::OperationBuilder,
    diagnostics::{diagnostics_color_disable, diagnostics_setup},
    dialect::{default_registry, Dialect, DialectRegistry, OpSpec, OpTraits, DEFAULT_REGISTRY},
    ir::{BlockId, CloneMap, IrGraph, OpId, RegionId, UseRef, ValueId, ValueKind},
    parser::{ParseError, Parser},
    printer::{print_attr, print_graph, print_op, print_type},
};
