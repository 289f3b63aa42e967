// SPDX-License-Identifier: PMPL-1.0-or-later
//! Legacy nested query representation.
//!
//! An `InnerQuery` is one stage. A stage reads either from a table
//! (`source-table`) or from the stage before it (`source-query`), so a
//! multi-stage query is a chain of boxed inner queries, innermost first.
//!
//! Field references are resolved against the columns visible in the stage:
//! its input (table columns or previous stage output), its joins, and its
//! expressions. The `clean_*` methods drop clauses whose references no longer
//! resolve; the `clear_*` methods drop a clause kind entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clause::{joined_column_name, Aggregation, AggregationOp, Expr, FieldRef, Filter, Join, OrderBy};
use crate::columns::ColumnSet;
use crate::metadata::Metadata;
use crate::TableId;

/// One stage of a legacy query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InnerQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<TableId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_query: Option<Box<InnerQuery>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expressions: BTreeMap<String, Expr>,
    #[serde(default, rename = "filter", skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, rename = "aggregation", skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, rename = "breakout", skip_serializing_if = "Vec::is_empty")]
    pub breakouts: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRef>,
}

impl InnerQuery {
    /// A stage reading every row of `table`.
    pub fn from_table(table: TableId) -> Self {
        Self {
            source_table: Some(table),
            ..Default::default()
        }
    }

    /// A stage reading the output of `source`.
    pub fn from_query(source: InnerQuery) -> Self {
        Self {
            source_query: Some(Box::new(source)),
            ..Default::default()
        }
    }

    pub fn has_data(&self) -> bool {
        self.source_table.is_some() || self.source_query.is_some()
    }

    /// Whether this stage has any clause of its own (sources excluded).
    pub fn has_any_clauses(&self) -> bool {
        !self.joins.is_empty()
            || !self.expressions.is_empty()
            || !self.filters.is_empty()
            || !self.aggregations.is_empty()
            || !self.breakouts.is_empty()
            || !self.order_by.is_empty()
            || self.limit.is_some()
            || !self.fields.is_empty()
    }

    pub fn is_summarized(&self) -> bool {
        !self.aggregations.is_empty() || !self.breakouts.is_empty()
    }

    /// Replace the source with another stage.
    pub fn with_source_query(mut self, source: InnerQuery) -> Self {
        self.source_table = None;
        self.source_query = Some(Box::new(source));
        self
    }

    /// Wrap this stage in a new, empty stage.
    pub fn nest(self) -> Self {
        Self::from_query(self)
    }

    /// Remove stages that read from a query but have no clauses of their own.
    pub fn clean_nesting(mut self) -> Self {
        let Some(source) = self.source_query.take() else {
            return self;
        };
        let source = source.clean_nesting();
        if self.has_any_clauses() {
            self.source_query = Some(Box::new(source));
            self
        } else {
            source
        }
    }

    /// Every stage, innermost first. Each entry keeps its own sources.
    pub fn stages(&self) -> Vec<InnerQuery> {
        let mut stages = match &self.source_query {
            Some(source) => source.stages(),
            None => Vec::new(),
        };
        stages.push(self.clone());
        stages
    }

    pub fn stage_count(&self) -> usize {
        1 + self.source_query.as_ref().map_or(0, |s| s.stage_count())
    }

    // ------------------------------------------------------------------
    // Column resolution
    // ------------------------------------------------------------------

    /// Columns entering the stage from its source.
    pub fn input_columns(&self, metadata: &Metadata) -> ColumnSet {
        if let Some(table) = self.source_table {
            metadata.table_columns(table)
        } else if let Some(source) = &self.source_query {
            source.output_columns(metadata)
        } else {
            ColumnSet::empty()
        }
    }

    /// Columns leaving the stage.
    pub fn output_columns(&self, metadata: &Metadata) -> ColumnSet {
        if self.is_summarized() {
            return self
                .breakouts
                .iter()
                .map(FieldRef::column_name)
                .chain(self.aggregations.iter().map(Aggregation::column_name))
                .collect();
        }
        if !self.fields.is_empty() {
            return self.fields.iter().map(FieldRef::column_name).collect();
        }
        let mut columns = self
            .input_columns(metadata)
            .with_names(self.expressions.keys().cloned());
        for join in &self.joins {
            columns = columns.union(self.joined_output_columns(join, metadata));
        }
        columns
    }

    fn joined_output_columns(&self, join: &Join, metadata: &Metadata) -> ColumnSet {
        if !join.fields.is_empty() {
            return join
                .fields
                .iter()
                .map(|name| joined_column_name(&join.alias, name))
                .collect();
        }
        match join_table_columns(join, metadata) {
            ColumnSet::Any => ColumnSet::Any,
            ColumnSet::Known(names) => names
                .iter()
                .map(|name| joined_column_name(&join.alias, name))
                .collect(),
        }
    }

    /// Whether `field` resolves in this stage.
    pub fn is_valid_ref(&self, field: &FieldRef, metadata: &Metadata) -> bool {
        match field {
            FieldRef::Field { name } => self
                .source_table
                .is_some_and(|table| metadata.table_columns(table).contains(name)),
            FieldRef::Column { name } => self
                .source_query
                .as_ref()
                .is_some_and(|source| source.output_columns(metadata).contains(name)),
            FieldRef::Expression { name } => self.expressions.contains_key(name),
            FieldRef::Joined { alias, name } => self
                .joins
                .iter()
                .any(|j| j.alias == *alias && join_table_columns(j, metadata).contains(name)),
            FieldRef::Aggregation { .. } => false,
        }
    }

    /// Whether `field` may be sorted on. Summarized stages only sort on their
    /// own breakouts and aggregations.
    pub fn is_valid_sort(&self, field: &FieldRef, metadata: &Metadata) -> bool {
        if self.is_summarized() {
            match field {
                FieldRef::Aggregation { index } => *index < self.aggregations.len(),
                other => self.breakouts.contains(other),
            }
        } else {
            self.is_valid_ref(field, metadata)
        }
    }

    pub fn is_valid_aggregation(&self, aggregation: &Aggregation, metadata: &Metadata) -> bool {
        match &aggregation.field {
            Some(field) => self.is_valid_ref(field, metadata),
            None => aggregation.op == AggregationOp::Count,
        }
    }

    /// Whether the join at `index` is complete and every reference in it
    /// resolves. The left-hand side may only use the source and earlier joins.
    pub fn is_valid_join(&self, index: usize, metadata: &Metadata) -> bool {
        let Some(join) = self.joins.get(index) else {
            return false;
        };
        let (Some(table), Some(condition)) = (join.source_table, &join.condition) else {
            return false;
        };
        if join.alias.is_empty() || self.joins[..index].iter().any(|j| j.alias == join.alias) {
            return false;
        }
        let table_columns = metadata.table_columns(table);
        let lhs_ok = match &condition.lhs {
            FieldRef::Joined { alias, name } => self.joins[..index]
                .iter()
                .any(|j| j.alias == *alias && join_table_columns(j, metadata).contains(name)),
            FieldRef::Field { .. } | FieldRef::Column { .. } => {
                self.is_valid_ref(&condition.lhs, metadata)
            }
            FieldRef::Expression { .. } | FieldRef::Aggregation { .. } => false,
        };
        let rhs_ok = matches!(
            &condition.rhs,
            FieldRef::Joined { alias, name } if *alias == join.alias && table_columns.contains(name)
        );
        lhs_ok && rhs_ok && join.fields.iter().all(|f| table_columns.contains(f))
    }

    // ------------------------------------------------------------------
    // Clean
    // ------------------------------------------------------------------

    /// Drop expressions with unresolved references, until none are left.
    pub fn clean_expressions(mut self, metadata: &Metadata) -> Self {
        loop {
            let stale: Vec<String> = self
                .expressions
                .iter()
                .filter(|(name, expr)| {
                    expr.field_refs().into_iter().any(|field| match field {
                        FieldRef::Expression { name: other } => {
                            other == *name || !self.expressions.contains_key(other)
                        }
                        other => !self.is_valid_ref(other, metadata),
                    })
                })
                .map(|(name, _)| name.clone())
                .collect();
            if stale.is_empty() {
                return self;
            }
            for name in stale {
                self.expressions.remove(&name);
            }
        }
    }

    pub fn clean_filters(mut self, metadata: &Metadata) -> Self {
        let filters = std::mem::take(&mut self.filters);
        self.filters = filters
            .into_iter()
            .filter(|f| self.is_valid_ref(&f.field, metadata))
            .collect();
        self
    }

    pub fn clean_breakouts(mut self, metadata: &Metadata) -> Self {
        let breakouts = std::mem::take(&mut self.breakouts);
        let mut kept: Vec<FieldRef> = Vec::with_capacity(breakouts.len());
        for breakout in breakouts {
            if self.is_valid_ref(&breakout, metadata) && !kept.contains(&breakout) {
                kept.push(breakout);
            }
        }
        self.breakouts = kept;
        self
    }

    pub fn clean_aggregations(mut self, metadata: &Metadata) -> Self {
        let aggregations = std::mem::take(&mut self.aggregations);
        self.aggregations = aggregations
            .into_iter()
            .filter(|a| self.is_valid_aggregation(a, metadata))
            .collect();
        self
    }

    pub fn clean_sorts(mut self, metadata: &Metadata) -> Self {
        let sorts = std::mem::take(&mut self.order_by);
        let mut kept: Vec<OrderBy> = Vec::with_capacity(sorts.len());
        for sort in sorts {
            let duplicate = kept.iter().any(|k| k.field == sort.field);
            if !duplicate && self.is_valid_sort(&sort.field, metadata) {
                kept.push(sort);
            }
        }
        self.order_by = kept;
        self
    }

    // ------------------------------------------------------------------
    // Clear
    // ------------------------------------------------------------------

    pub fn clear_expressions(mut self) -> Self {
        self.expressions.clear();
        self
    }

    pub fn clear_filters(mut self) -> Self {
        self.filters.clear();
        self
    }

    /// Also clears the `fields` projection, which a summarized stage implies.
    pub fn clear_breakouts(mut self) -> Self {
        self.breakouts.clear();
        self.fields.clear();
        self
    }

    /// Also clears the `fields` projection, which a summarized stage implies.
    pub fn clear_aggregations(mut self) -> Self {
        self.aggregations.clear();
        self.fields.clear();
        self
    }
}

fn join_table_columns(join: &Join, metadata: &Metadata) -> ColumnSet {
    match join.source_table {
        Some(table) => metadata.table_columns(table),
        None => ColumnSet::empty(),
    }
}
