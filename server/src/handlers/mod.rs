//! Request handlers for objects and batches.

mod batch;
mod objects;

pub use batch::*;
pub use objects::*;
