//! Typed views over the dialects this crate manipulates. A view wraps an
//! `OpId` and validates shape on construction; accessors decode operand
//! segments and attributes, builders create detached operations for the
//! caller to place.

pub mod irdl;
pub mod pdl;

use crate::core::OpId;
use thiserror::Error;

/// A structural misuse of PDL or IRDL itself (as opposed to a pattern that
/// is well-formed but unsafe).
#[derive(Debug, Error)]
#[error("malformed input at {op}: {msg}")]
pub struct Malformed {
    pub op: OpId,
    pub msg: String,
}

impl Malformed {
    pub fn new(op: OpId, msg: impl Into<String>) -> Malformed {
        Malformed {
            op,
            msg: msg.into(),
        }
    }
}
