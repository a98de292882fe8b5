//! Shared utilities for the pipeline synthesis crates.
mod errors;
mod id;
mod namegenerator;
mod position;

pub mod math;

pub use errors::{Error, ErrorKind, MiaResult, MultiError};
pub use id::{GetName, Id};
pub use namegenerator::NameGenerator;
pub use position::{SourceLoc, WithPos};
