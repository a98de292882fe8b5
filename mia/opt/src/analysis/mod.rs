//! Analyses shared by the synthesis passes.
mod matcher;
mod simplify;

pub use matcher::Matcher;
pub use simplify::{Placement, dedup, simplify};
