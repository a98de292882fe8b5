//! Helpers for defining and running synthesis passes
mod construct;
mod pass;

pub use construct::{ConstructPass, Named, ParseVal, PassOpt};
pub use pass::Pass;
