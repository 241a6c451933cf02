/*!

  Symbolic records for one pattern analysis.

  Every PDL value in the pattern gets a record in a per-analysis arena:
  types, attributes, values, and operations. An operation record owns one
  slot per declared result; each slot tracks its users, either concrete
  symbolic operations or the `Unknown` token standing for the IR outside
  the pattern. The arena is dropped when the analysis returns.

*/

use crate::core::Attribute;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymId(pub(crate) u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One entry in a result slot's use-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseTok {
    /// A concrete symbolic operation consuming the result.
    Op(SymId),
    /// A possible consumer in the IR surrounding the match.
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct ResultSlot {
    pub uses: Vec<UseTok>,
}

impl ResultSlot {
    pub fn concrete_uses(&self) -> usize {
        self.uses.iter().filter(|u| matches!(u, UseTok::Op(_))).count()
    }

    pub fn has_unknown_use(&self) -> bool {
        self.uses.iter().any(|u| matches!(u, UseTok::Unknown))
    }
}

#[derive(Clone, Debug)]
pub enum Rec {
    /// A `pdl.type`.
    Type { constant: Option<Attribute> },
    /// A `pdl.attribute`.
    Attr,
    /// A `pdl.value`: either an external operand (no producer) or a result
    /// taken from a symbolic operation.
    Value {
        producer: Option<SymId>,
        index: usize,
    },
    /// A `pdl.operation`, matched or generated.
    Op {
        name: Option<String>,
        operands: Vec<SymId>,
        slots: Vec<ResultSlot>,
        matched: bool,
        erased: bool,
    },
}

/// The per-analysis arena plus the scope bitset over it.
#[derive(Debug, Default)]
pub struct SymArena {
    recs: Vec<Rec>,
    in_scope: Vec<bool>,
}

impl SymArena {
    pub fn new() -> SymArena {
        SymArena::default()
    }

    pub fn alloc(&mut self, rec: Rec, in_scope: bool) -> SymId {
        let id = SymId(self.recs.len() as u32);
        self.recs.push(rec);
        self.in_scope.push(in_scope);
        id
    }

    pub fn get(&self, id: SymId) -> &Rec {
        &self.recs[id.index()]
    }

    pub fn get_mut(&mut self, id: SymId) -> &mut Rec {
        &mut self.recs[id.index()]
    }

    pub fn in_scope(&self, id: SymId) -> bool {
        self.in_scope[id.index()]
    }

    pub fn set_scope(&mut self, id: SymId, value: bool) {
        self.in_scope[id.index()] = value;
    }

    pub fn ids(&self) -> impl Iterator<Item = SymId> {
        (0..self.recs.len() as u32).map(SymId)
    }

    /// The operation record behind `id`, if it is one.
    pub fn as_op(&self, id: SymId) -> Option<(&Vec<SymId>, &Vec<ResultSlot>)> {
        match self.get(id) {
            Rec::Op { operands, slots, .. } => Some((operands, slots)),
            _ => None,
        }
    }

    pub fn is_op(&self, id: SymId) -> bool {
        matches!(self.get(id), Rec::Op { .. })
    }

    pub fn op_name(&self, id: SymId) -> Option<&str> {
        match self.get(id) {
            Rec::Op { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    pub fn op_matched(&self, id: SymId) -> bool {
        matches!(self.get(id), Rec::Op { matched: true, .. })
    }

    pub fn op_erased(&self, id: SymId) -> bool {
        matches!(self.get(id), Rec::Op { erased: true, .. })
    }

    pub fn slot_count(&self, id: SymId) -> usize {
        match self.get(id) {
            Rec::Op { slots, .. } => slots.len(),
            _ => 0,
        }
    }

    /// The producing operation of a value record, if the value is a taken
    /// result.
    pub fn value_producer(&self, id: SymId) -> Option<(SymId, usize)> {
        match self.get(id) {
            Rec::Value {
                producer: Some(op),
                index,
            } => Some((*op, *index)),
            _ => None,
        }
    }

    /// Record that `user` consumes result `index` of `producer`.
    pub fn add_use(&mut self, producer: SymId, index: usize, user: SymId) {
        if let Rec::Op { slots, .. } = self.get_mut(producer) {
            if let Some(slot) = slots.get_mut(index) {
                slot.uses.push(UseTok::Op(user));
            }
        }
    }

    /// Drop every use token contributed by `user` (it was erased).
    pub fn remove_user(&mut self, user: SymId) {
        for rec in &mut self.recs {
            if let Rec::Op { slots, .. } = rec {
                for slot in slots {
                    slot.uses.retain(|u| *u != UseTok::Op(user));
                }
            }
        }
    }

    /// Redirect every value record taken from `(from, index)` so that it is
    /// taken from `(to, index)` instead.
    pub fn redirect_results(&mut self, from: SymId, to: SymId) {
        for rec in &mut self.recs {
            if let Rec::Value {
                producer: Some(p), ..
            } = rec
            {
                if *p == from {
                    *p = to;
                }
            }
        }
    }

    /// Rewrite every operand entry `from` to `to` across all operations.
    pub fn rewrite_operands(&mut self, from: SymId, to: SymId) {
        for rec in &mut self.recs {
            if let Rec::Op { operands, .. } = rec {
                for operand in operands {
                    if *operand == from {
                        *operand = to;
                    }
                }
            }
        }
    }
}
