#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod dialects;
pub mod fuzz;
pub mod passes;
pub mod smt;

mod core;
pub use self::core::*;

#[macro_use]
extern crate lazy_static;
