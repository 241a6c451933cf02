//! The pattern fuzzer: random DAGs, random PDL patterns, host-IR
//! synthesis, and the differential tabulator.

pub mod dag;
pub mod host;
pub mod pattern;
pub mod table;

pub use self::{
    dag::{generate_all_dags, SingleEntryDag},
    host::{build_reference_module, create_dag_in_region, for_each_placement, pdl_to_operations},
    pattern::{generate_random_pdl_rewrite, generate_with_options, FuzzerOptions},
    table::{
        analyze_with_reference, fuzz_pdl_matches, run_tabulation, DynamicVerdict, FuzzReport,
        TabulateOptions,
    },
};
