// SPDX-License-Identifier: PMPL-1.0-or-later
//! Derived step instances.

use serde::{Deserialize, Serialize};
use stepwise_query::{QueryError, StagedQuery, StructuredQuery};

use crate::catalog::{definition, StepContext, StepDefinition, StepType};
use crate::open::OpenSteps;

/// "Add this step" offered next to a visible step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAction {
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Id to force open when the action is taken.
    pub step_id: String,
}

impl StepAction {
    /// Take the action: the step shows up on the next derivation.
    pub fn open(&self, open_steps: &mut OpenSteps) {
        open_steps.open(self.step_id.clone());
    }
}

/// Where a step instance sits in the show/hide state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    Shown,
    HiddenAndAddable,
    HiddenAndUnavailable,
}

/// One step of one stage, as derived from the current query.
#[derive(Debug, Clone, Serialize)]
pub struct NotebookStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Literal stage index, or `-1` for sort/limit in the last stage.
    pub stage_index: isize,
    pub item_index: Option<usize>,
    pub test_id: String,
    pub valid: bool,
    pub active: bool,
    pub visible: bool,
    /// The stage query this step edits.
    #[serde(skip)]
    pub query: StructuredQuery,
    /// The stage query with every later step removed. `None` when inactive.
    pub preview_query: Option<StructuredQuery>,
    pub actions: Vec<StepAction>,
    #[serde(skip)]
    pub(crate) context: StepContext,
}

/// `{stage}:{type}`, plus `:{item}` for items after the first.
pub fn step_id(stage_position: usize, step_type: StepType, item_index: Option<usize>) -> String {
    match item_index {
        Some(item) if item > 0 => format!("{stage_position}:{step_type}:{item}"),
        _ => format!("{stage_position}:{step_type}"),
    }
}

/// `{type}`, plus `-{item}` for items after the first.
pub fn test_id(step_type: StepType, item_index: Option<usize>) -> String {
    match item_index {
        Some(item) if item > 0 => format!("{step_type}-{item}"),
        _ => step_type.to_string(),
    }
}

impl NotebookStep {
    /// Build an instance, evaluating `valid`/`active`/`visible` once.
    pub(crate) fn derive(
        def: &'static StepDefinition,
        query: &StructuredQuery,
        context: StepContext,
        top: &StagedQuery,
        open_steps: &OpenSteps,
    ) -> Result<Self, QueryError> {
        let id = step_id(context.stage_position, def.step_type, context.item_index);
        let valid = (def.valid)(query, &context, top);
        let active = (def.active)(query, &context, top)?;
        let visible = valid && (active || open_steps.is_open(&id));
        Ok(Self {
            test_id: test_id(def.step_type, context.item_index),
            id,
            step_type: def.step_type,
            stage_index: context.stage_index,
            item_index: context.item_index,
            valid,
            active,
            visible,
            query: query.clone(),
            preview_query: None,
            actions: Vec::new(),
            context,
        })
    }

    pub fn definition(&self) -> &'static StepDefinition {
        definition(self.step_type)
    }

    pub fn stage_position(&self) -> usize {
        self.context.stage_position
    }

    pub fn state(&self) -> StepState {
        if self.visible {
            StepState::Shown
        } else if self.valid {
            StepState::HiddenAndAddable
        } else {
            StepState::HiddenAndUnavailable
        }
    }

    /// Remove this step's clause from `query`. `Ok(None)` when there is
    /// nothing to remove.
    pub fn revert(
        &self,
        query: &StructuredQuery,
        top: &StagedQuery,
    ) -> Result<Option<StructuredQuery>, QueryError> {
        match self.definition().revert {
            Some(revert) => revert(query, &self.context, top),
            None => Ok(None),
        }
    }

    /// Repair this step's clause in `query`.
    pub fn clean(
        &self,
        query: &StructuredQuery,
        top: &StagedQuery,
    ) -> Result<StructuredQuery, QueryError> {
        (self.definition().clean)(query, &self.context, top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_id_format() {
        assert_eq!(step_id(0, StepType::Filter, None), "0:filter");
        assert_eq!(step_id(2, StepType::Join, Some(3)), "2:join:3");
    }

    // The first item of a repeatable step shares its id and test id with a
    // singleton of the same type; only `item_index` tells them apart.
    #[test]
    fn test_item_zero_has_no_suffix() {
        assert_eq!(step_id(1, StepType::Join, Some(0)), step_id(1, StepType::Join, None));
        assert_eq!(test_id(StepType::Join, Some(0)), "join");
        assert_eq!(test_id(StepType::Join, Some(1)), "join-1");
        assert_eq!(test_id(StepType::Sort, None), "sort");
    }

    #[test]
    fn test_action_opens_step() {
        let action = StepAction {
            step_type: StepType::Sort,
            step_id: "0:sort".to_string(),
        };
        let mut open = OpenSteps::new();
        action.open(&mut open);
        assert!(open.is_open("0:sort"));
    }
}
