//! Derived values that cache their result and recompute lazily.

mod inner;
mod memo;

pub use memo::*;
