// SPDX-License-Identifier: PMPL-1.0-or-later
//! Step catalog.
//!
//! A fixed, ordered table of step definitions. Order is significant: within a
//! stage, steps appear in catalog order, and a step's preview removes every
//! step that comes after it.
//!
//! data → join → expression → filter → summarize → sort → limit

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use stepwise_query::{Feature, QueryError, StagedQuery, StructuredQuery};
use tracing::warn;

use crate::error::StepError;

/// Kinds of notebook step, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Data,
    Join,
    Expression,
    Filter,
    Summarize,
    Sort,
    Limit,
}

impl StepType {
    /// All step types in catalog order.
    pub const ALL: [StepType; 7] = [
        StepType::Data,
        StepType::Join,
        StepType::Expression,
        StepType::Filter,
        StepType::Summarize,
        StepType::Sort,
        StepType::Limit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Data => "data",
            StepType::Join => "join",
            StepType::Expression => "expression",
            StepType::Filter => "filter",
            StepType::Summarize => "summarize",
            StepType::Sort => "sort",
            StepType::Limit => "limit",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StepError::UnknownStepType(s.to_string()))
    }
}

/// Per-instance context passed to every step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// Item of a repeatable step (`None` for singleton steps).
    pub item_index: Option<usize>,
    /// Stage index as addressed by the step; `-1` for last-stage-relative
    /// steps in the last stage.
    pub stage_index: isize,
    /// Literal position of the stage in the stage list.
    pub stage_position: usize,
}

impl StepContext {
    fn item(&self) -> usize {
        self.item_index.unwrap_or(0)
    }
}

pub type ValidFn = fn(&StructuredQuery, &StepContext, &StagedQuery) -> bool;
pub type ActiveFn = fn(&StructuredQuery, &StepContext, &StagedQuery) -> Result<bool, QueryError>;
pub type CleanFn =
    fn(&StructuredQuery, &StepContext, &StagedQuery) -> Result<StructuredQuery, QueryError>;
pub type RevertFn = fn(
    &StructuredQuery,
    &StepContext,
    &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError>;
pub type SubStepsFn = fn(&StructuredQuery) -> usize;

/// One catalog entry.
pub struct StepDefinition {
    pub step_type: StepType,
    /// Structural legality of the step at this point of the query.
    pub valid: ValidFn,
    /// Whether the step currently has content.
    pub active: ActiveFn,
    /// Repair this step's clause against the current upstream state.
    pub clean: CleanFn,
    /// Remove this step's clause. `Ok(None)` means nothing to remove.
    pub revert: Option<RevertFn>,
    /// Number of existing items of a repeatable step.
    pub sub_steps: Option<SubStepsFn>,
    /// Addressed as stage `-1` when it sits in the last stage.
    pub last_stage_relative: bool,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("step_type", &self.step_type)
            .field("revertible", &self.revert.is_some())
            .field("repeatable", &self.sub_steps.is_some())
            .field("last_stage_relative", &self.last_stage_relative)
            .finish()
    }
}

/// The catalog, in step order.
pub static STEPS: [StepDefinition; 7] = [
    StepDefinition {
        step_type: StepType::Data,
        valid: |query, _, _| query.source_query().is_none(),
        active: |_, _, _| Ok(true),
        clean: |query, _, _| Ok(query.clone()),
        revert: None,
        sub_steps: None,
        last_stage_relative: false,
    },
    StepDefinition {
        step_type: StepType::Join,
        valid: |query, _, _| query.has_data() && query.has_feature(Feature::Join),
        active: |query, ctx, _| Ok(ctx.item_index.is_some_and(|i| i < query.joins().len())),
        clean: clean_join,
        revert: Some(revert_join),
        sub_steps: Some(join_count),
        last_stage_relative: false,
    },
    StepDefinition {
        step_type: StepType::Expression,
        valid: |query, _, _| query.has_data() && query.has_feature(Feature::Expressions),
        active: |query, _, _| Ok(query.has_expressions()),
        clean: |query, _, _| Ok(query.clean_expressions()),
        revert: Some(revert_expressions),
        sub_steps: None,
        last_stage_relative: false,
    },
    StepDefinition {
        step_type: StepType::Filter,
        valid: |query, _, _| query.has_data(),
        active: |query, _, _| Ok(query.has_filters()),
        clean: |query, _, _| Ok(query.clean_filters()),
        revert: Some(revert_filters),
        sub_steps: None,
        last_stage_relative: false,
    },
    StepDefinition {
        step_type: StepType::Summarize,
        valid: |query, _, _| query.has_data(),
        active: |query, _, _| Ok(query.has_aggregations() || query.has_breakouts()),
        clean: |query, _, _| Ok(query.clean_breakouts().clean_aggregations()),
        revert: Some(revert_summarize),
        sub_steps: None,
        last_stage_relative: false,
    },
    StepDefinition {
        step_type: StepType::Sort,
        valid: sortable,
        active: |query, _, _| Ok(query.has_sorts()),
        clean: clean_sort,
        revert: Some(revert_sort),
        sub_steps: None,
        last_stage_relative: true,
    },
    StepDefinition {
        step_type: StepType::Limit,
        valid: sortable,
        active: |_, ctx, top| top.has_limit(ctx.stage_index),
        clean: clean_limit,
        revert: Some(revert_limit),
        sub_steps: None,
        last_stage_relative: true,
    },
];

fn join_count(query: &StructuredQuery) -> usize {
    query.joins().len()
}

fn revert_join(
    query: &StructuredQuery,
    ctx: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    if ctx.item() < query.joins().len() {
        Ok(Some(query.remove_join(ctx.item())?))
    } else {
        Ok(None)
    }
}

fn revert_expressions(
    query: &StructuredQuery,
    _: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    Ok(query.has_expressions().then(|| query.clear_expressions()))
}

fn revert_filters(
    query: &StructuredQuery,
    _: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    Ok(query.has_filters().then(|| query.clear_filters()))
}

/// Only clears when something is there, so an unrelated `fields` projection
/// survives.
fn revert_summarize(
    query: &StructuredQuery,
    _: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    if query.has_aggregations() || query.has_breakouts() {
        Ok(Some(query.clear_breakouts().clear_aggregations()))
    } else {
        Ok(None)
    }
}

// Sort and limit go through the staged representation, addressed by the
// step's stage index.

fn revert_sort(
    query: &StructuredQuery,
    ctx: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    let staged = StagedQuery::from_legacy(query);
    if !staged.has_sorts(ctx.stage_index)? {
        return Ok(None);
    }
    let cleared = staged.clear_sorts(ctx.stage_index)?;
    Ok(Some(query.with_query(cleared.to_legacy())))
}

fn revert_limit(
    query: &StructuredQuery,
    ctx: &StepContext,
    _: &StagedQuery,
) -> Result<Option<StructuredQuery>, QueryError> {
    let staged = StagedQuery::from_legacy(query);
    if !staged.has_limit(ctx.stage_index)? {
        return Ok(None);
    }
    let cleared = staged.limit(ctx.stage_index, None)?;
    Ok(Some(query.with_query(cleared.to_legacy())))
}

/// A bare aggregate (no breakouts) yields a single row: nothing to sort or
/// limit.
fn sortable(query: &StructuredQuery, _: &StepContext, _: &StagedQuery) -> bool {
    query.has_data() && (!query.has_aggregations() || query.has_breakouts())
}

// A stage that is no longer sortable keeps no sort or limit.

fn clean_sort(
    query: &StructuredQuery,
    ctx: &StepContext,
    top: &StagedQuery,
) -> Result<StructuredQuery, QueryError> {
    if sortable(query, ctx, top) {
        return Ok(query.clean_sorts());
    }
    Ok(revert_sort(query, ctx, top)?.unwrap_or_else(|| query.clone()))
}

fn clean_limit(
    query: &StructuredQuery,
    ctx: &StepContext,
    top: &StagedQuery,
) -> Result<StructuredQuery, QueryError> {
    if sortable(query, ctx, top) {
        return Ok(query.clone());
    }
    Ok(revert_limit(query, ctx, top)?.unwrap_or_else(|| query.clone()))
}

/// Joins left alone: missing, valid, or still being edited. Anything else is
/// repaired, and removed if the repair does not make it valid.
fn clean_join(
    query: &StructuredQuery,
    ctx: &StepContext,
    _: &StagedQuery,
) -> Result<StructuredQuery, QueryError> {
    let index = ctx.item();
    let Some(join) = query.joins().get(index) else {
        return Ok(query.clone());
    };
    if query.is_valid_join(index) || join.has_gaps() {
        return Ok(query.clone());
    }
    let repaired = query.update_join(index, query.repair_join(join))?;
    if repaired.is_valid_join(index) {
        return Ok(repaired);
    }
    warn!(
        alias = %join.alias,
        stage = ctx.stage_position,
        "Removing join that no longer resolves"
    );
    query.remove_join(index)
}

/// Look up the catalog entry for a step type.
pub fn definition(step_type: StepType) -> &'static StepDefinition {
    // STEPS is indexed in StepType order.
    &STEPS[step_type as usize]
}
