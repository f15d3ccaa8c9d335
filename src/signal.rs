//! Leaf state nodes: every propagation pass begins at a signal write.

mod guards;
mod inner;
mod rw;

pub use guards::*;
pub use rw::*;
