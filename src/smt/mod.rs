//! SMT encoding of IRDL constraint graphs and the solver seam used to
//! discharge subset queries.

mod encode;
mod solver;

pub use self::{
    encode::{encode_check_subset, restore_yield_name_hints, EncodeError},
    solver::{Solver, SolverError, SolverVerdict, Z3Process},
};
