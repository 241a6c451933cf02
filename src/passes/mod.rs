//! IR-to-IR passes: the PDL→IRDL lowering that produces an
//! `irdl_ext.check_subset`, and the IRDL constraint-graph simplifier.

mod optimize_irdl;
mod pdl_to_irdl;
mod rewriter;

pub use self::{
    optimize_irdl::optimize_irdl,
    pdl_to_irdl::{
        add_missing_pdl_results, convert_pattern_to_check_subset, convert_pdl_match_to_irdl_match,
        embed_irdl_attr_patterns, lower_pattern, pdl_to_irdl_pass,
    },
    rewriter::{apply_to_fixpoint, Change},
};

use crate::core::OpId;
use crate::dialects::Malformed;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error(transparent)]
    Malformed(#[from] Malformed),
    #[error("unknown native rewrite `{name}`")]
    UnknownNativeRewrite { op: OpId, name: String },
    #[error("operation `{name}` not found in the IRDL specification")]
    UnknownOperation { op: OpId, name: String },
    #[error("cannot reconstruct the rewritten IR: erased results are still in use")]
    UnsupportedErase { op: OpId },
    #[error("cannot resolve symbol in the IRDL specification")]
    UnresolvedSymbol { op: OpId },
}
