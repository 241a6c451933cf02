/*!

  Abstract interpretation of a PDL pattern.

  The interpreter simulates match + rewrite over symbolic records without
  fixing a concrete host IR, in three phases:

  1. INIT allocates a record for every PDL value in the pattern. Under
     strict use checking, every matched result slot is seeded with an
     `Unknown` use standing for the outside world.
  2. MATCH traverses backwards from the rewrite root through operand edges,
     marking reached records. A pattern op the traversal never reaches is a
     `DisconnectedMatch`.
  3. REWRITE executes the rewrite body in source order, tracking the scope
     of usable records, the list of live insertion anchors, and the
     terminator invariants.

  The first abort short-circuits the analysis; the symbolic arena is
  discarded either way.

*/

use crate::analysis::sym::{Rec, ResultSlot, SymArena, SymId, UseTok};
use crate::core::{DialectRegistry, IrGraph, OpId, ValueId};
use crate::dialects::pdl;
use crate::dialects::Malformed;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Whether matched results are assumed to have users outside the pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UseCheckingStrictness {
    /// The outside world may use any matched result.
    #[default]
    Strict,
    /// Only uses inside the pattern count.
    AssumeNoUseOutside,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AnalysisConfig {
    pub strictness: UseCheckingStrictness,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AbortKind {
    #[error("pattern body contains an operation not reachable from the rewrite root")]
    DisconnectedMatch,
    #[error("reference to a value that is no longer in scope")]
    OutOfScope,
    #[error("no valid insertion point remains, possibly the root was deleted")]
    NoInsertionPoint,
    #[error("erasing an operation whose results still have {0} use(s)")]
    StillInUse(usize),
    #[error("erasing an operation that may still be used outside the pattern")]
    UsesOutside,
    #[error("an operation with results is replaced by itself")]
    ReplaceWithSelf,
    #[error("a matched terminator is erased without a terminator replacing it")]
    TerminatorErased,
    #[error("a terminator is replaced by a non-terminator")]
    TerminatorReplacedByNonTerminator,
    #[error("a generated operation uses a root result while the root survives")]
    RootUsedInRhs,
    #[error("malformed PDL input: {0}")]
    MalformedInput(String),
}

/// The verdict of one pattern analysis: the offending op and the abort kind.
#[derive(Clone, Debug, Error)]
#[error("{kind} (at {op})")]
pub struct AnalysisAbort {
    pub op: OpId,
    pub kind: AbortKind,
}

impl AnalysisAbort {
    fn new(op: OpId, kind: AbortKind) -> AnalysisAbort {
        AnalysisAbort { op, kind }
    }
}

impl From<Malformed> for AnalysisAbort {
    fn from(m: Malformed) -> AnalysisAbort {
        AnalysisAbort::new(m.op, AbortKind::MalformedInput(m.msg))
    }
}

pub type AnalysisResult = Result<(), AnalysisAbort>;

/// Analyze one `pdl.pattern`.
pub fn analyze_pattern(
    g: &IrGraph,
    pattern: OpId,
    registry: &DialectRegistry,
    config: &AnalysisConfig,
) -> AnalysisResult {
    Interp::new(g, registry, config).run(pattern)
}

struct Interp<'a> {
    g: &'a IrGraph,
    registry: &'a DialectRegistry,
    config: &'a AnalysisConfig,
    arena: SymArena,
    env: HashMap<ValueId, SymId>,
    /// Live insertion anchors; generated ops are conceptually inserted
    /// before the root.
    anchors: Vec<SymId>,
    root: Option<SymId>,
    root_erased: bool,
    visited: HashSet<OpId>,
}

impl<'a> Interp<'a> {
    fn new(g: &'a IrGraph, registry: &'a DialectRegistry, config: &'a AnalysisConfig) -> Interp<'a> {
        Interp {
            g,
            registry,
            config,
            arena: SymArena::new(),
            env: HashMap::new(),
            anchors: Vec::new(),
            root: None,
            root_erased: false,
            visited: HashSet::new(),
        }
    }

    fn sym(&self, v: ValueId, at: OpId) -> Result<SymId, AnalysisAbort> {
        self.env.get(&v).copied().ok_or_else(|| {
            AnalysisAbort::new(
                at,
                AbortKind::MalformedInput("reference to a value outside the pattern".into()),
            )
        })
    }

    /// Whether the symbolic op may be a terminator: a named op defers to the
    /// registry, an unnamed match could be anything.
    fn maybe_terminator(&self, op: SymId) -> bool {
        match self.arena.op_name(op) {
            Some(name) => self.registry.is_terminator(name),
            None => true,
        }
    }

    fn definitely_terminator(&self, op: SymId) -> bool {
        match self.arena.op_name(op) {
            Some(name) => self.registry.is_terminator(name),
            None => false,
        }
    }

    fn run(&mut self, pattern: OpId) -> AnalysisResult {
        let pattern = pdl::PatternOp::from_op(self.g, pattern)?;
        let rewrite = pattern.rewrite(self.g)?;
        let body = pattern.body(self.g);

        debug!(pattern = %pattern.0, "analysis: init phase");
        self.init_phase(body, rewrite)?;
        debug!(pattern = %pattern.0, "analysis: match phase");
        self.match_phase(body, rewrite)?;
        debug!(pattern = %pattern.0, "analysis: rewrite phase");
        self.rewrite_phase(rewrite)?;
        Ok(())
    }

    /////
    ///// INIT.
    /////

    fn init_phase(&mut self, body: crate::core::BlockId, rewrite: pdl::RewriteOp) -> AnalysisResult {
        for op in self.g.block_ops(body).to_vec() {
            if op == rewrite.0 {
                break;
            }
            self.init_op(op, true)?;
        }
        if let Some(rewrite_body) = rewrite.body(self.g) {
            for op in self.g.block_ops(rewrite_body).to_vec() {
                self.init_op(op, false)?;
            }
        }
        Ok(())
    }

    fn init_op(&mut self, op: OpId, in_match: bool) -> AnalysisResult {
        match self.g.op_name(op) {
            Some(pdl::TYPE) => {
                let view = pdl::TypeOp::from_op(self.g, op)?;
                let rec = Rec::Type {
                    constant: view.constant_type(self.g),
                };
                let sym = self.arena.alloc(rec, in_match);
                self.env.insert(view.value(self.g), sym);
            }
            Some(pdl::ATTRIBUTE) => {
                let view = pdl::AttributeOp::from_op(self.g, op)?;
                let sym = self.arena.alloc(Rec::Attr, in_match);
                self.env.insert(view.output(self.g), sym);
            }
            Some(pdl::OPERAND) => {
                let view = pdl::OperandOp::from_op(self.g, op)?;
                let sym = self.arena.alloc(
                    Rec::Value {
                        producer: None,
                        index: 0,
                    },
                    in_match,
                );
                self.env.insert(view.value(self.g), sym);
            }
            Some(pdl::OPERATION) => {
                let view = pdl::OperationOp::from_op(self.g, op)?;
                let operands: Vec<SymId> = view
                    .operand_values(self.g)
                    .into_iter()
                    .map(|v| self.sym(v, op))
                    .collect::<Result<_, _>>()?;
                let seeded = in_match
                    && self.config.strictness == UseCheckingStrictness::Strict;
                let slots = view
                    .type_values(self.g)
                    .iter()
                    .map(|_| ResultSlot {
                        uses: if seeded { vec![UseTok::Unknown] } else { vec![] },
                    })
                    .collect();
                let rec = Rec::Op {
                    name: view.op_name(self.g),
                    operands,
                    slots,
                    matched: in_match,
                    erased: false,
                };
                let sym = self.arena.alloc(rec, in_match);
                self.env.insert(view.op_value(self.g), sym);
            }
            Some(pdl::RESULT) => {
                let view = pdl::ResultOp::from_op(self.g, op)?;
                let parent = self.sym(view.parent_value(self.g), op)?;
                if !self.arena.is_op(parent) {
                    return Err(Malformed::new(
                        op,
                        "`pdl.result` must take the result of a `pdl.operation`",
                    )
                    .into());
                }
                let index = view.index(self.g)?;
                if index >= self.arena.slot_count(parent) {
                    return Err(Malformed::new(
                        op,
                        "`pdl.result` index exceeds the declared result count",
                    )
                    .into());
                }
                let sym = self.arena.alloc(
                    Rec::Value {
                        producer: Some(parent),
                        index,
                    },
                    in_match,
                );
                self.env.insert(view.value(self.g), sym);
            }
            Some(pdl::APPLY_NATIVE_REWRITE) => {
                let view = pdl::ApplyNativeRewriteOp::from_op(self.g, op)?;
                for result in self.g.results(view.0).to_vec() {
                    let sym = self.arena.alloc(
                        Rec::Value {
                            producer: None,
                            index: 0,
                        },
                        in_match,
                    );
                    self.env.insert(result, sym);
                }
            }
            Some(pdl::ERASE) | Some(pdl::REPLACE) | Some(pdl::APPLY_NATIVE_CONSTRAINT) => {}
            Some(other) => {
                return Err(
                    Malformed::new(op, format!("unsupported PDL operation `{}`", other)).into(),
                )
            }
            None => {
                return Err(Malformed::new(op, "unnamed operation in a pattern body").into());
            }
        }
        Ok(())
    }

    /////
    ///// MATCH.
    /////

    fn match_phase(&mut self, body: crate::core::BlockId, rewrite: pdl::RewriteOp) -> AnalysisResult {
        let root_value = rewrite.root(self.g).ok_or_else(|| {
            Malformed::new(rewrite.0, "rewrites without an explicit root are not supported")
        })?;
        let root_sym = self.sym(root_value, rewrite.0)?;
        if !self.arena.is_op(root_sym) {
            return Err(Malformed::new(rewrite.0, "the rewrite root must be an operation").into());
        }
        self.root = Some(root_sym);
        self.anchors.push(root_sym);

        let (root_op, _) = self
            .g
            .producer(root_value)
            .ok_or_else(|| Malformed::new(rewrite.0, "the rewrite root must be an operation"))?;
        self.trace_matched_operation(root_op)?;
        self.visited.insert(rewrite.0);

        // Every pattern op must have been reached, except the rewrite and
        // result handles nothing consumes.
        for op in self.g.block_ops(body).to_vec() {
            if self.visited.contains(&op) {
                continue;
            }
            if self.g.op_name(op) == Some(pdl::RESULT) {
                let view = pdl::ResultOp::from_op(self.g, op)?;
                if self.g.value_uses(view.value(self.g)).is_empty() {
                    continue;
                }
            }
            // Native constraints constrain already-traced values; they are
            // not part of the operand DAG.
            if self.g.op_name(op) == Some(pdl::APPLY_NATIVE_CONSTRAINT) {
                continue;
            }
            debug!(op = %op, "unreachable op in pattern body");
            return Err(AnalysisAbort::new(op, AbortKind::DisconnectedMatch));
        }
        Ok(())
    }

    /// Backwards traversal from a matched `pdl.operation` through operand
    /// edges.
    fn trace_matched_operation(&mut self, op: OpId) -> AnalysisResult {
        if !self.visited.insert(op) {
            return Ok(());
        }
        let view = pdl::OperationOp::from_op(self.g, op)?;
        let self_sym = self.sym(view.op_value(self.g), op)?;

        for operand in view.operand_values(self.g) {
            self.trace_matched_value(operand, self_sym)?;
        }
        for attr_value in view.attribute_values(self.g) {
            if let Some((producer, _)) = self.g.producer(attr_value) {
                self.trace_leaf(producer)?;
            }
        }
        for type_value in view.type_values(self.g) {
            if let Some((producer, _)) = self.g.producer(type_value) {
                self.visited.insert(producer);
            }
        }

        // Result handles hanging off this operation belong to the match even
        // when only the rewrite consumes them.
        for use_ref in self.g.value_uses(view.op_value(self.g)).to_vec() {
            if self.g.op_name(use_ref.user) == Some(pdl::RESULT) {
                self.visited.insert(use_ref.user);
            }
        }
        Ok(())
    }

    /// Trace one operand edge of a matched operation: the producing
    /// `pdl.operand` or `pdl.result` and, transitively, its operation.
    fn trace_matched_value(&mut self, value: ValueId, user: SymId) -> AnalysisResult {
        let Some((producer, _)) = self.g.producer(value) else {
            return Ok(());
        };
        match self.g.op_name(producer) {
            Some(pdl::OPERAND) => {
                self.visited.insert(producer);
                let view = pdl::OperandOp::from_op(self.g, producer)?;
                if let Some(ty) = view.value_type(self.g) {
                    if let Some((type_producer, _)) = self.g.producer(ty) {
                        self.visited.insert(type_producer);
                    }
                }
            }
            Some(pdl::RESULT) => {
                self.visited.insert(producer);
                let view = pdl::ResultOp::from_op(self.g, producer)?;
                let value_sym = self.sym(view.value(self.g), producer)?;
                if let Some((producer_sym, index)) = self.arena.value_producer(value_sym) {
                    self.arena.add_use(producer_sym, index, user);
                }
                let parent = view.parent_operation(self.g)?;
                self.trace_matched_operation(parent.0)?;
            }
            Some(pdl::APPLY_NATIVE_REWRITE) => {
                self.visited.insert(producer);
            }
            _ => {
                return Err(Malformed::new(
                    producer,
                    "matched operands must come from `pdl.operand` or `pdl.result`",
                )
                .into());
            }
        }
        Ok(())
    }

    /// Mark an attribute leaf (and its optional type) reached.
    fn trace_leaf(&mut self, op: OpId) -> AnalysisResult {
        self.visited.insert(op);
        if self.g.op_name(op) == Some(pdl::ATTRIBUTE) {
            let view = pdl::AttributeOp::from_op(self.g, op)?;
            if let Some(ty) = view.value_type(self.g) {
                if let Some((producer, _)) = self.g.producer(ty) {
                    self.visited.insert(producer);
                }
            }
        }
        Ok(())
    }

    /////
    ///// REWRITE.
    /////

    fn rewrite_phase(&mut self, rewrite: pdl::RewriteOp) -> AnalysisResult {
        let Some(body) = rewrite.body(self.g) else {
            // An external rewriter; nothing to simulate.
            return Ok(());
        };
        for op in self.g.block_ops(body).to_vec() {
            match self.g.op_name(op) {
                Some(pdl::OPERATION) => self.exec_create(op)?,
                Some(pdl::ERASE) => self.exec_erase(op)?,
                Some(pdl::REPLACE) => self.exec_replace(op)?,
                Some(pdl::RESULT) => self.exec_result(op)?,
                Some(pdl::TYPE) | Some(pdl::ATTRIBUTE) => {
                    let result = self.g.results(op)[0];
                    let sym = self.sym(result, op)?;
                    self.arena.set_scope(sym, true);
                }
                Some(pdl::APPLY_NATIVE_REWRITE) => {
                    self.check_operands_in_scope(op)?;
                    for result in self.g.results(op).to_vec() {
                        let sym = self.sym(result, op)?;
                        self.arena.set_scope(sym, true);
                    }
                }
                Some(pdl::APPLY_NATIVE_CONSTRAINT) => {
                    self.check_operands_in_scope(op)?;
                }
                _ => {
                    return Err(Malformed::new(op, "unsupported operation in a rewrite body").into())
                }
            }
        }
        Ok(())
    }

    fn check_operands_in_scope(&mut self, op: OpId) -> AnalysisResult {
        for operand in self.g.operands(op).to_vec() {
            let sym = self.sym(operand, op)?;
            if !self.arena.in_scope(sym) {
                return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
            }
        }
        Ok(())
    }

    fn exec_create(&mut self, op: OpId) -> AnalysisResult {
        let view = pdl::OperationOp::from_op(self.g, op)?;
        let self_sym = self.sym(view.op_value(self.g), op)?;

        for operand in view.operand_values(self.g) {
            let sym = self.sym(operand, op)?;
            if !self.arena.in_scope(sym) {
                return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
            }
            if let Some((producer, _)) = self.arena.value_producer(sym) {
                if Some(producer) == self.root && !self.root_erased {
                    return Err(AnalysisAbort::new(op, AbortKind::RootUsedInRhs));
                }
            }
        }
        for other in view
            .attribute_values(self.g)
            .into_iter()
            .chain(view.type_values(self.g))
        {
            let sym = self.sym(other, op)?;
            if !self.arena.in_scope(sym) {
                return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
            }
        }

        if self.anchors.is_empty() {
            return Err(AnalysisAbort::new(op, AbortKind::NoInsertionPoint));
        }

        // Record the new op's uses of taken results.
        for operand in view.operand_values(self.g) {
            let sym = self.sym(operand, op)?;
            if let Some((producer, index)) = self.arena.value_producer(sym) {
                self.arena.add_use(producer, index, self_sym);
            }
        }
        self.arena.set_scope(self_sym, true);
        self.anchors.push(self_sym);
        Ok(())
    }

    fn exec_result(&mut self, op: OpId) -> AnalysisResult {
        let view = pdl::ResultOp::from_op(self.g, op)?;
        let parent = self.sym(view.parent_value(self.g), op)?;
        if !self.arena.in_scope(parent) {
            return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
        }
        let sym = self.sym(view.value(self.g), op)?;
        self.arena.set_scope(sym, true);
        Ok(())
    }

    /// Shared erase path. `check_terminator` is off when the erase is the
    /// tail of a replacement, which has its own terminator rule.
    fn erase_sym(
        &mut self,
        at: OpId,
        target: SymId,
        check_uses: bool,
        check_terminator: bool,
    ) -> AnalysisResult {
        if check_uses {
            let (_, slots) = self
                .arena
                .as_op(target)
                .ok_or_else(|| Malformed::new(at, "only operations can be erased"))?;
            let concrete: usize = slots.iter().map(|s| s.concrete_uses()).sum();
            if concrete > 0 {
                return Err(AnalysisAbort::new(at, AbortKind::StillInUse(concrete)));
            }
            if self.config.strictness == UseCheckingStrictness::Strict
                && slots.iter().any(|s| s.has_unknown_use())
            {
                return Err(AnalysisAbort::new(at, AbortKind::UsesOutside));
            }
        }

        if check_terminator && self.arena.op_matched(target) && self.maybe_terminator(target) {
            // The root may be erased if a new terminator was generated
            // immediately before the erase.
            let allowed = Some(target) == self.root && self.prev_is_new_terminator(at);
            if !allowed {
                return Err(AnalysisAbort::new(at, AbortKind::TerminatorErased));
            }
        }

        // The erased op no longer uses anything.
        self.arena.remove_user(target);

        // Remove the op and its taken results from scope.
        self.arena.set_scope(target, false);
        for sym in self.arena.ids().collect::<Vec<_>>() {
            if self.arena.value_producer(sym).map(|(p, _)| p) == Some(target) {
                self.arena.set_scope(sym, false);
            }
        }
        if let Rec::Op { erased, .. } = self.arena.get_mut(target) {
            *erased = true;
        }
        self.anchors.retain(|a| *a != target);
        if Some(target) == self.root {
            self.root_erased = true;
        }
        Ok(())
    }

    /// Whether the op immediately preceding `at` in the rewrite body is a
    /// freshly generated, definite terminator.
    fn prev_is_new_terminator(&self, at: OpId) -> bool {
        let Some(prev) = self.g.prev_op(at) else {
            return false;
        };
        if self.g.op_name(prev) != Some(pdl::OPERATION) {
            return false;
        }
        let Ok(view) = pdl::OperationOp::from_op(self.g, prev) else {
            return false;
        };
        let Some(sym) = self.env.get(&view.op_value(self.g)) else {
            return false;
        };
        !self.arena.op_matched(*sym) && self.definitely_terminator(*sym)
    }

    fn exec_erase(&mut self, op: OpId) -> AnalysisResult {
        let view = pdl::EraseOp::from_op(self.g, op)?;
        let target = self.sym(view.op_value(self.g), op)?;
        if !self.arena.is_op(target) {
            return Err(Malformed::new(op, "only operations can be erased").into());
        }
        if !self.arena.in_scope(target) {
            return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
        }
        self.erase_sym(op, target, true, true)
    }

    fn exec_replace(&mut self, op: OpId) -> AnalysisResult {
        let view = pdl::ReplaceOp::from_op(self.g, op)?;
        let target = self.sym(view.op_value(self.g), op)?;
        if !self.arena.is_op(target) {
            return Err(Malformed::new(op, "only operations can be replaced").into());
        }
        if !self.arena.in_scope(target) {
            return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
        }

        if let Some(repl) = view.repl_operation(self.g) {
            let repl_sym = self.sym(repl, op)?;
            if !self.arena.in_scope(repl_sym) {
                return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
            }
            if repl_sym == target {
                if self.arena.slot_count(target) > 0
                    && self.config.strictness == UseCheckingStrictness::Strict
                {
                    return Err(AnalysisAbort::new(op, AbortKind::ReplaceWithSelf));
                }
                // Degenerates to an erase.
                return self.erase_sym(op, target, true, false);
            }
            if self.arena.slot_count(repl_sym) != self.arena.slot_count(target) {
                return Err(Malformed::new(
                    op,
                    "the number of replacement results and op results must match",
                )
                .into());
            }
            if self.arena.op_matched(target)
                && self.maybe_terminator(target)
                && !self.maybe_terminator(repl_sym)
            {
                return Err(AnalysisAbort::new(
                    op,
                    AbortKind::TerminatorReplacedByNonTerminator,
                ));
            }

            // Move each result slot's use-list onto the replacement and
            // retarget the taken results.
            let count = self.arena.slot_count(target);
            for index in 0..count {
                let moved = match self.arena.get_mut(target) {
                    Rec::Op { slots, .. } => std::mem::take(&mut slots[index].uses),
                    _ => unreachable!(),
                };
                if let Rec::Op { slots, .. } = self.arena.get_mut(repl_sym) {
                    slots[index].uses.extend(moved);
                }
            }
            self.arena.redirect_results(target, repl_sym);
            self.erase_sym(op, target, true, false)
        } else {
            let values = view.repl_values(self.g);
            if values.len() != self.arena.slot_count(target) {
                return Err(Malformed::new(
                    op,
                    "the number of replacement values and op results must match",
                )
                .into());
            }
            let mut value_syms = Vec::new();
            for value in &values {
                let sym = self.sym(*value, op)?;
                if !self.arena.in_scope(sym) {
                    return Err(AnalysisAbort::new(op, AbortKind::OutOfScope));
                }
                value_syms.push(sym);
            }
            // Replacing an op by its own results is a self-replacement.
            let own_results = value_syms
                .iter()
                .enumerate()
                .all(|(i, sym)| self.arena.value_producer(*sym) == Some((target, i)));
            if !value_syms.is_empty() && own_results {
                return Err(AnalysisAbort::new(op, AbortKind::ReplaceWithSelf));
            }
            if self.arena.op_matched(target) && self.maybe_terminator(target) {
                return Err(AnalysisAbort::new(
                    op,
                    AbortKind::TerminatorReplacedByNonTerminator,
                ));
            }

            // Move the use-lists onto the replacement values' producers and
            // rewrite users' operand entries.
            for (index, repl_sym) in value_syms.iter().enumerate() {
                let moved = match self.arena.get_mut(target) {
                    Rec::Op { slots, .. } => std::mem::take(&mut slots[index].uses),
                    _ => unreachable!(),
                };
                if let Some((producer, pindex)) = self.arena.value_producer(*repl_sym) {
                    if let Rec::Op { slots, .. } = self.arena.get_mut(producer) {
                        slots[pindex].uses.extend(moved);
                    }
                }
                // Any value taken from `(target, index)` is now the
                // replacement value.
                for sym in self.arena.ids().collect::<Vec<_>>() {
                    if self.arena.value_producer(sym) == Some((target, index)) {
                        self.arena.rewrite_operands(sym, *repl_sym);
                    }
                }
            }
            self.erase_sym(op, target, true, false)
        }
    }
}
