//! Source location information for description items.
use crate::Id;

/// Location of an item in a processor description: the unit it belongs to
/// (an instruction or a stage) and, optionally, the statement index inside
/// that unit's behavior.
#[derive(Clone, Copy, PartialEq, Eq, Debug, PartialOrd, Ord)]
pub struct SourceLoc {
    pub unit: Id,
    pub item: Option<usize>,
}

impl SourceLoc {
    pub fn new<S: Into<Id>>(unit: S, item: Option<usize>) -> Self {
        Self {
            unit: unit.into(),
            item,
        }
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.item {
            Some(idx) => write!(f, "{}[{idx}]", self.unit),
            None => write!(f, "{}", self.unit),
        }
    }
}

/// Types that may carry a source location.
pub trait WithPos {
    fn copy_span(&self) -> Option<SourceLoc>;
}
