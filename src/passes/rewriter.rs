/*!

  A small fixed-point driver for local rewrites over the arena IR. Rules are
  plain functions from an operation to a `Change`; the driver sweeps every
  live op under a root and reapplies the rule set until a whole sweep makes
  no progress. Every rule in this crate is size-reducing or normalising, so
  the fixed point exists.

*/

use crate::core::{IrGraph, OpId};
use crate::passes::LoweringError;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

/// Sweep `root`'s subtree with `rule` until a full sweep changes nothing.
pub fn apply_to_fixpoint<F>(g: &mut IrGraph, root: OpId, mut rule: F) -> Result<(), LoweringError>
where
    F: FnMut(&mut IrGraph, OpId) -> Result<Change, LoweringError>,
{
    // Far above anything a real constraint graph needs; a stuck rule set is
    // a bug, not a workload.
    let mut fuel = 100_000usize;
    loop {
        let mut changed = false;
        for op in g.walk(root) {
            if g.is_dead(op) {
                continue;
            }
            if rule(g, op)? == Change::Changed {
                trace!(op = %op, "rewrite applied");
                changed = true;
                fuel = fuel.saturating_sub(1);
                if fuel == 0 {
                    panic!("rewrite driver failed to reach a fixed point");
                }
            }
        }
        if !changed {
            return Ok(());
        }
    }
}
