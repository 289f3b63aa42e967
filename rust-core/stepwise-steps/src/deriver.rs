// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stage step derivation.
//!
//! Turns one stage into its visible steps:
//! 1. Expand the catalog into raw instances (one per item for repeatable
//!    steps, plus an "add new" placeholder).
//! 2. Fold right to left with a running preview query. Visible steps take the
//!    current preview and the actions accumulated since the previous visible
//!    step; hidden but valid steps become actions. Every revertible step then
//!    strips its clause from the preview, so each step sees the stage with all
//!    later steps removed.

use std::collections::VecDeque;

use stepwise_query::{StagedQuery, StructuredQuery, LAST_STAGE};
use tracing::trace;

use crate::catalog::{StepContext, STEPS};
use crate::error::StepError;
use crate::open::OpenSteps;
use crate::step::{NotebookStep, StepAction};

/// Visible steps of one stage, plus actions with no visible step to their
/// left (spliced onto the previous stage by the caller).
#[derive(Debug, Clone)]
pub struct StageSteps {
    pub steps: Vec<NotebookStep>,
    pub actions: Vec<StepAction>,
}

/// Every catalog instance of a stage, in catalog order, visible or not.
pub fn raw_stage_steps(
    top: &StagedQuery,
    stage_query: &StructuredQuery,
    stage_position: usize,
    is_last_stage: bool,
    open_steps: &OpenSteps,
) -> Result<Vec<NotebookStep>, StepError> {
    let mut raw = Vec::new();
    for def in STEPS.iter() {
        let stage_index = if is_last_stage && def.last_stage_relative {
            LAST_STAGE
        } else {
            stage_position as isize
        };
        let items: Vec<Option<usize>> = match def.sub_steps {
            Some(count) => (0..=count(stage_query)).map(Some).collect(),
            None => vec![None],
        };
        for item_index in items {
            let context = StepContext {
                item_index,
                stage_index,
                stage_position,
            };
            let step = NotebookStep::derive(def, stage_query, context, top, open_steps)?;
            trace!(
                id = %step.id,
                valid = step.valid,
                active = step.active,
                visible = step.visible,
                "Derived step"
            );
            raw.push(step);
        }
    }
    Ok(raw)
}

struct Fold {
    kept: Vec<NotebookStep>,
    preview: StructuredQuery,
    pending: VecDeque<StepAction>,
}

/// Derive the visible steps of one stage.
pub fn derive_stage_steps(
    top: &StagedQuery,
    stage_query: &StructuredQuery,
    stage_position: usize,
    is_last_stage: bool,
    open_steps: &OpenSteps,
) -> Result<StageSteps, StepError> {
    let raw = raw_stage_steps(top, stage_query, stage_position, is_last_stage, open_steps)?;

    let seed = Fold {
        kept: Vec::with_capacity(raw.len()),
        preview: stage_query.clone(),
        pending: VecDeque::new(),
    };

    let folded = raw
        .into_iter()
        .rev()
        .try_fold(seed, |mut acc, mut step| -> Result<Fold, StepError> {
            let reverted = step.revert(&acc.preview, top)?;
            if step.visible {
                step.preview_query = step.active.then(|| acc.preview.clone());
                step.actions = acc.pending.drain(..).collect();
                acc.kept.push(step);
            } else if step.valid {
                acc.pending.push_front(StepAction {
                    step_type: step.step_type,
                    step_id: step.id,
                });
            }
            // A revert with nothing to remove leaves the preview as is.
            if let Some(reverted) = reverted {
                acc.preview = reverted;
            }
            Ok(acc)
        })?;

    let mut steps = folded.kept;
    steps.reverse();
    Ok(StageSteps {
        steps,
        actions: folded.pending.into(),
    })
}
