//! Lock-free atomic scalar cells.
//!
//! [`AtomicCell`] wraps any [`AtomicScalar`] (booleans, integers, durations,
//! timestamps) in a single `AtomicU64`. It never blocks and never allocates,
//! which makes it suitable for the released/releasing flags every lifecycle
//! object carries.
//!
//! Important:
//! - Comparisons read the cell once per operand; comparing two cells is not
//!   a single atomic snapshot of both.

mod cell;
mod scalar;

pub use cell::AtomicCell;
pub use scalar::AtomicScalar;
