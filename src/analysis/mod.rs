//! The PDL abstract interpreter (dynamic well-formedness) and the external
//! reference-engine runner used to cross-check its verdicts.

mod interp;
mod reference;
mod sym;

pub use self::{
    interp::{
        analyze_pattern, AbortKind, AnalysisAbort, AnalysisConfig, AnalysisResult,
        UseCheckingStrictness,
    },
    reference::{MlirRunner, ReferenceRunner, RunOutcome},
    sym::{Rec, ResultSlot, SymArena, SymId, UseTok},
};
