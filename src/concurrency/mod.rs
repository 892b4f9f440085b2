//! Concurrency primitives.
//!
//! Important: [`atomic`] never blocks; [`sync`] blocks for at most the
//! timeout the caller supplies.

pub mod atomic;
pub mod sync;
