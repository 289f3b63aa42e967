// SPDX-License-Identifier: PMPL-1.0-or-later
//! Force-open overrides supplied by the caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Step id → "show this step even though it is empty".
///
/// Typically filled when the user picks an action ("add a filter") and
/// cleared once the step has content or is dismissed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenSteps(HashMap<String, bool>);

impl OpenSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.0.get(id).copied().unwrap_or(false)
    }

    pub fn open(&mut self, id: impl Into<String>) {
        self.0.insert(id.into(), true);
    }

    pub fn close(&mut self, id: &str) {
        self.0.remove(id);
    }

    pub fn is_empty(&self) -> bool {
        !self.0.values().any(|open| *open)
    }

    /// Keep only the open ids for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|id, open| *open && keep(id));
    }

    /// Ids currently forced open, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .0
            .iter()
            .filter(|(_, open)| **open)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl<S: Into<String>> FromIterator<S> for OpenSteps {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|id| (id.into(), true)).collect())
    }
}
