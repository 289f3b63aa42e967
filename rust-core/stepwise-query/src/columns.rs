// SPDX-License-Identifier: PMPL-1.0-or-later
//! Column sets used to decide whether a field reference still resolves.

use std::collections::BTreeSet;

/// The columns visible at some point of a stage.
///
/// `Any` is used when the underlying table is not described by metadata;
/// every name then resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSet {
    Any,
    Known(BTreeSet<String>),
}

impl ColumnSet {
    pub fn empty() -> Self {
        ColumnSet::Known(BTreeSet::new())
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            ColumnSet::Any => true,
            ColumnSet::Known(names) => names.contains(name),
        }
    }

    /// Union with another set. `Any` absorbs everything.
    pub fn union(self, other: ColumnSet) -> ColumnSet {
        match (self, other) {
            (ColumnSet::Known(mut a), ColumnSet::Known(b)) => {
                a.extend(b);
                ColumnSet::Known(a)
            }
            _ => ColumnSet::Any,
        }
    }

    /// Add names to a known set. No effect on `Any`.
    pub fn with_names<I>(self, names: I) -> ColumnSet
    where
        I: IntoIterator<Item = String>,
    {
        match self {
            ColumnSet::Any => ColumnSet::Any,
            ColumnSet::Known(mut set) => {
                set.extend(names);
                ColumnSet::Known(set)
            }
        }
    }
}

impl FromIterator<String> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        ColumnSet::Known(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_contains_everything() {
        assert!(ColumnSet::Any.contains("whatever"));
        assert!(!ColumnSet::empty().contains("whatever"));
    }

    #[test]
    fn test_union_with_any_is_any() {
        let known: ColumnSet = vec!["a".to_string()].into_iter().collect();
        assert_eq!(known.clone().union(ColumnSet::Any), ColumnSet::Any);
        let merged = known.union(vec!["b".to_string()].into_iter().collect());
        assert!(merged.contains("a") && merged.contains("b"));
    }
}
