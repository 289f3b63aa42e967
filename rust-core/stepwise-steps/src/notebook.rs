// SPDX-License-Identifier: PMPL-1.0-or-later
//! Multi-stage orchestration.
//!
//! `Notebook::derive` normalizes the query, derives every stage in order and
//! flattens the result into `NotebookSteps`. Leading actions of a stage (the
//! hidden-but-valid steps before its first visible step) are offered on the
//! last step of the previous stage.
//!
//! `NotebookSteps::update` is the edit cascade: a step's stage query is
//! replaced, then every later step re-reads its source and cleans its own
//! clause against it, stage by stage.

use std::sync::Arc;

use stepwise_query::{DatasetQuery, Feature, Metadata, StagedQuery, StructuredQuery};
use tracing::{debug, trace};

use crate::config::NotebookConfig;
use crate::deriver::derive_stage_steps;
use crate::error::StepError;
use crate::open::OpenSteps;
use crate::step::NotebookStep;

/// Derives notebook steps from queries.
#[derive(Debug, Clone, Default)]
pub struct Notebook {
    config: NotebookConfig,
}

impl Notebook {
    pub fn new(config: NotebookConfig) -> Result<Self, StepError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    /// Drop empty nested stages, then open a follow-up stage after a
    /// breakout when the database can nest.
    pub fn normalize(&self, query: &StructuredQuery) -> StructuredQuery {
        let query = query.clean_nesting();
        if self.config.auto_nest
            && query.has_feature(Feature::NestedQueries)
            && query.has_breakouts()
        {
            trace!("Auto-nesting summarized top stage");
            query.nest()
        } else {
            query
        }
    }

    /// Derive the steps of a structured query.
    pub fn derive(
        &self,
        query: &StructuredQuery,
        open_steps: &OpenSteps,
    ) -> Result<NotebookSteps, StepError> {
        let query = self.normalize(query);
        let stages = query.queries();
        if stages.len() > self.config.max_stages {
            return Err(StepError::TooManyStages {
                count: stages.len(),
                max: self.config.max_stages,
            });
        }

        let top = StagedQuery::from_legacy(&query);
        let last = stages.len() - 1;
        let mut steps: Vec<NotebookStep> = Vec::new();
        for (position, stage) in stages.iter().enumerate() {
            let derived = derive_stage_steps(&top, stage, position, position == last, open_steps)?;
            if let Some(previous) = steps.last_mut() {
                previous.actions.extend(derived.actions);
            }
            steps.extend(derived.steps);
        }

        debug!(
            stage_count = stages.len(),
            step_count = steps.len(),
            "Derived notebook steps"
        );

        Ok(NotebookSteps {
            steps,
            stages,
            query: Some(query),
            top: Some(top),
        })
    }

    /// Derive the steps of a dataset query. Native queries have no steps.
    pub fn derive_dataset(
        &self,
        dataset: &DatasetQuery,
        metadata: Arc<Metadata>,
        open_steps: &OpenSteps,
    ) -> Result<NotebookSteps, StepError> {
        match StructuredQuery::from_dataset(dataset, metadata) {
            Some(query) => self.derive(&query, open_steps),
            None => {
                debug!("Native query, no steps");
                Ok(NotebookSteps::default())
            }
        }
    }
}

/// The flattened, ordered step sequence of one query.
#[derive(Debug, Clone, Default)]
pub struct NotebookSteps {
    steps: Vec<NotebookStep>,
    /// One view per stage, innermost first.
    stages: Vec<StructuredQuery>,
    query: Option<StructuredQuery>,
    top: Option<StagedQuery>,
}

impl NotebookSteps {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NotebookStep> {
        self.steps.iter()
    }

    pub fn steps(&self) -> &[NotebookStep] {
        &self.steps
    }

    pub fn get(&self, position: usize) -> Option<&NotebookStep> {
        self.steps.get(position)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&NotebookStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn next(&self, position: usize) -> Option<&NotebookStep> {
        self.steps.get(position.checked_add(1)?)
    }

    pub fn previous(&self, position: usize) -> Option<&NotebookStep> {
        self.steps.get(position.checked_sub(1)?)
    }

    /// The normalized query the steps were derived from.
    pub fn query(&self) -> Option<&StructuredQuery> {
        self.query.as_ref()
    }

    /// The same query in the staged representation.
    pub fn top_level(&self) -> Option<&StagedQuery> {
        self.top.as_ref()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn step_at(&self, position: usize) -> Result<(&NotebookStep, &StagedQuery), StepError> {
        let out_of_range = || StepError::StepOutOfRange {
            position,
            len: self.steps.len(),
        };
        let step = self.steps.get(position).ok_or_else(out_of_range)?;
        let top = self.top.as_ref().ok_or_else(out_of_range)?;
        Ok((step, top))
    }

    /// The step's stage query with its clause removed. `None` when the step
    /// has nothing to remove.
    pub fn revert(&self, position: usize) -> Result<Option<StructuredQuery>, StepError> {
        let (step, top) = self.step_at(position)?;
        Ok(step.revert(&step.query, top)?)
    }

    /// Repair the step's clause in `query`.
    pub fn clean(
        &self,
        position: usize,
        query: &StructuredQuery,
    ) -> Result<StructuredQuery, StepError> {
        let (step, top) = self.step_at(position)?;
        Ok(step.clean(query, top)?)
    }

    /// Replace the stage query of the step at `position` and cascade the
    /// change through every later step. Returns the full updated query.
    pub fn update(
        &self,
        position: usize,
        dataset: DatasetQuery,
    ) -> Result<StructuredQuery, StepError> {
        let (step, top) = self.step_at(position)?;
        let mut query = step.query.set_dataset_query(dataset)?;
        let mut stage = step.stage_position();

        for next in &self.steps[position + 1..] {
            if next.stage_position() > stage {
                query = self.attach_stages(query, stage + 1, next.stage_position());
                query = next.query.set_source_query(query.into_query());
                stage = next.stage_position();
            }
            query = next.clean(&query, top)?;
            trace!(id = %next.id, "Cleaned step");
        }

        // Stages after the last visible step.
        query = self.attach_stages(query, stage + 1, self.stages.len());
        Ok(query.clean_nesting())
    }

    /// Revert the step's clause and cascade the change downstream.
    pub fn remove(&self, position: usize) -> Result<StructuredQuery, StepError> {
        let (step, top) = self.step_at(position)?;
        let reverted = step
            .revert(&step.query, top)?
            .ok_or_else(|| StepError::NotRevertible(step.id.clone()))?;
        debug!(id = %step.id, "Removing step");
        self.update(position, reverted.dataset_query())
    }

    /// Re-stack the original stages `from..to` on top of `query`.
    fn attach_stages(&self, query: StructuredQuery, from: usize, to: usize) -> StructuredQuery {
        self.stages
            .get(from..to)
            .unwrap_or_default()
            .iter()
            .fold(query, |source, stage| {
                stage.set_source_query(source.into_query())
            })
    }
}

impl<'a> IntoIterator for &'a NotebookSteps {
    type Item = &'a NotebookStep;
    type IntoIter = std::slice::Iter<'a, NotebookStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
