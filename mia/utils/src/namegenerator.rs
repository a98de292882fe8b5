use crate::Id;
use std::collections::{BTreeMap, BTreeSet};

/// Hands out names that were not handed out or reserved before.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    /// Next numeric suffix to try for a prefix.
    next: BTreeMap<Id, u64>,
    taken: BTreeSet<Id>,
}

impl NameGenerator {
    /// A generator that never returns one of `names`.
    pub fn with_prev_defined_names(names: BTreeSet<Id>) -> Self {
        NameGenerator {
            next: BTreeMap::new(),
            taken: names,
        }
    }

    /// `prefix` itself if it is free, else `prefix` followed by the smallest
    /// free number.
    /// ```
    /// # use mia_utils::NameGenerator;
    /// let mut names = NameGenerator::default();
    /// assert_eq!(names.gen_name("EXECUTE_imm"), "EXECUTE_imm");
    /// assert_eq!(names.gen_name("EXECUTE_imm"), "EXECUTE_imm0");
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix: Id = prefix.into();
        if self.taken.insert(prefix) {
            return prefix;
        }
        let counter = self.next.entry(prefix).or_default();
        loop {
            let name = Id::new(format!("{prefix}{counter}"));
            *counter += 1;
            if self.taken.insert(name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_skipped() {
        let reserved = BTreeSet::from([Id::new("S_x"), Id::new("S_x0")]);
        let mut names = NameGenerator::with_prev_defined_names(reserved);
        assert_eq!(names.gen_name("S_x"), "S_x1");
        assert_eq!(names.gen_name("S_y"), "S_y");
        assert_eq!(names.gen_name("S_x"), "S_x2");
    }
}
