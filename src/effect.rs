//! Side effects that run in response to changes in the reactive values
//! they read.

#[allow(clippy::module_inception)]
mod effect;
pub(crate) mod inner;

pub use effect::*;
