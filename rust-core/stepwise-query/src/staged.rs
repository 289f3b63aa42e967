// SPDX-License-Identifier: PMPL-1.0-or-later
//! Current (flat) staged representation.
//!
//! Stages are stored innermost first and addressed by a signed index:
//! non-negative indexes count from the first stage, negative ones from the
//! end (`-1` is the last stage). Unlike the legacy form, addressing a stage
//! that does not exist is an error.

use serde::{Deserialize, Serialize};

use crate::inner::InnerQuery;
use crate::structured::StructuredQuery;
use crate::{DatabaseId, QueryError};

/// Stage index meaning "whichever stage is last".
pub const LAST_STAGE: isize = -1;

/// A query as a flat list of stages.
///
/// Every stored stage has `source_query == None`; the chaining is implied by
/// position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedQuery {
    pub database: Option<DatabaseId>,
    stages: Vec<InnerQuery>,
}

impl StagedQuery {
    /// Convert a legacy stage view (and everything nested in it).
    pub fn from_legacy(query: &StructuredQuery) -> Self {
        Self::from_inner(query.database_id(), query.query())
    }

    pub fn from_inner(database: Option<DatabaseId>, query: &InnerQuery) -> Self {
        let mut stages = Vec::with_capacity(query.stage_count());
        let mut current = Some(query);
        while let Some(stage) = current {
            let mut flat = stage.clone();
            flat.source_query = None;
            stages.push(flat);
            current = stage.source_query.as_deref();
        }
        stages.reverse();
        Self { database, stages }
    }

    /// Rebuild the nested form.
    pub fn to_legacy(&self) -> InnerQuery {
        let mut stages = self.stages.iter().cloned();
        let first = stages.next().unwrap_or_default();
        stages.fold(first, |source, stage| stage.with_source_query(source))
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Turn a signed stage index into a position, rejecting stages that do
    /// not exist.
    pub fn resolve_stage(&self, index: isize) -> Result<usize, QueryError> {
        let count = self.stages.len();
        let resolved = if index < 0 {
            count.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|i| *i < count)
        };
        resolved.ok_or(QueryError::StageOutOfRange { index, count })
    }

    pub fn stage(&self, index: isize) -> Result<&InnerQuery, QueryError> {
        let position = self.resolve_stage(index)?;
        Ok(&self.stages[position])
    }

    fn map_stage(
        &self,
        index: isize,
        f: impl FnOnce(&mut InnerQuery),
    ) -> Result<Self, QueryError> {
        let position = self.resolve_stage(index)?;
        let mut updated = self.clone();
        f(&mut updated.stages[position]);
        Ok(updated)
    }

    pub fn current_limit(&self, index: isize) -> Result<Option<u64>, QueryError> {
        Ok(self.stage(index)?.limit)
    }

    pub fn has_limit(&self, index: isize) -> Result<bool, QueryError> {
        Ok(self.current_limit(index)?.is_some())
    }

    /// Set or remove (`None`) the limit of a stage.
    pub fn limit(&self, index: isize, limit: Option<u64>) -> Result<Self, QueryError> {
        self.map_stage(index, |stage| stage.limit = limit)
    }

    pub fn has_sorts(&self, index: isize) -> Result<bool, QueryError> {
        Ok(!self.stage(index)?.order_by.is_empty())
    }

    pub fn clear_sorts(&self, index: isize) -> Result<Self, QueryError> {
        self.map_stage(index, |stage| stage.order_by.clear())
    }
}
