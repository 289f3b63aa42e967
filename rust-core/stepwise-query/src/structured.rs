// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stage view over the legacy representation.
//!
//! A `StructuredQuery` pairs one stage (with every earlier stage nested inside
//! it as its source) with the database it runs against and the metadata used
//! to resolve columns. Stage `k` of a query therefore carries stages `0..=k`,
//! and the last stage is the whole query.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::trace;

use crate::clause::{FieldRef, Join};
use crate::dataset::DatasetQuery;
use crate::inner::InnerQuery;
use crate::metadata::{Database, Metadata};
use crate::{DatabaseId, Feature, QueryError};

#[derive(Debug, Clone)]
pub struct StructuredQuery {
    database_id: Option<DatabaseId>,
    query: InnerQuery,
    metadata: Arc<Metadata>,
}

impl PartialEq for StructuredQuery {
    fn eq(&self, other: &Self) -> bool {
        self.database_id == other.database_id && self.query == other.query
    }
}

impl Serialize for StructuredQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.dataset_query().serialize(serializer)
    }
}

impl StructuredQuery {
    pub fn new(database_id: Option<DatabaseId>, query: InnerQuery, metadata: Arc<Metadata>) -> Self {
        Self {
            database_id,
            query,
            metadata,
        }
    }

    /// View a dataset query. Native queries have no structured view.
    pub fn from_dataset(dataset: &DatasetQuery, metadata: Arc<Metadata>) -> Option<Self> {
        match dataset {
            DatasetQuery::Query { database, query } => {
                Some(Self::new(*database, query.clone(), metadata))
            }
            DatasetQuery::Native { .. } => None,
        }
    }

    pub fn query(&self) -> &InnerQuery {
        &self.query
    }

    pub fn into_query(self) -> InnerQuery {
        self.query
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn database_id(&self) -> Option<DatabaseId> {
        self.database_id
    }

    pub fn dataset_query(&self) -> DatasetQuery {
        DatasetQuery::structured(self.database_id, self.query.clone())
    }

    /// Same database and metadata, different stage contents.
    pub fn with_query(&self, query: InnerQuery) -> Self {
        Self {
            database_id: self.database_id,
            query,
            metadata: Arc::clone(&self.metadata),
        }
    }

    fn map(&self, f: impl FnOnce(InnerQuery) -> InnerQuery) -> Self {
        self.with_query(f(self.query.clone()))
    }

    /// Replace this view with a new dataset query.
    pub fn set_dataset_query(&self, dataset: DatasetQuery) -> Result<Self, QueryError> {
        match dataset {
            DatasetQuery::Query { database, query } => Ok(Self {
                database_id: database,
                query,
                metadata: Arc::clone(&self.metadata),
            }),
            DatasetQuery::Native { .. } => Err(QueryError::NotStructured),
        }
    }

    pub fn database(&self) -> Option<&Database> {
        self.database_id.and_then(|id| self.metadata.database(id))
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.database().is_some_and(|db| db.has_feature(feature))
    }

    pub fn has_data(&self) -> bool {
        self.query.has_data()
    }

    /// The previous stage, if this stage reads from one.
    pub fn source_query(&self) -> Option<StructuredQuery> {
        self.query
            .source_query
            .as_ref()
            .map(|source| self.with_query((**source).clone()))
    }

    pub fn set_source_query(&self, source: InnerQuery) -> Self {
        self.map(|q| q.with_source_query(source))
    }

    // Joins

    pub fn joins(&self) -> &[Join] {
        &self.query.joins
    }

    pub fn has_joins(&self) -> bool {
        !self.query.joins.is_empty()
    }

    pub fn is_valid_join(&self, index: usize) -> bool {
        self.query.is_valid_join(index, &self.metadata)
    }

    pub fn remove_join(&self, index: usize) -> Result<Self, QueryError> {
        if index >= self.query.joins.len() {
            return Err(QueryError::JoinNotFound(index));
        }
        Ok(self.map(|mut q| {
            q.joins.remove(index);
            q
        }))
    }

    pub fn update_join(&self, index: usize, join: Join) -> Result<Self, QueryError> {
        if index >= self.query.joins.len() {
            return Err(QueryError::JoinNotFound(index));
        }
        Ok(self.map(|mut q| {
            q.joins[index] = join;
            q
        }))
    }

    /// Best-effort repair of a join: fill a missing alias from the joined
    /// table, point the condition's right-hand side at the join's own alias,
    /// and drop selected columns the table does not have.
    pub fn repair_join(&self, join: &Join) -> Join {
        let mut repaired = join.clone();
        if let Some(table) = repaired.source_table {
            if repaired.alias.is_empty() {
                repaired.alias = self
                    .metadata
                    .table(table)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| format!("table_{table}"));
            }
            let columns = self.metadata.table_columns(table);
            repaired.fields.retain(|f| columns.contains(f));
        }
        if let Some(condition) = repaired.condition.as_mut() {
            if let FieldRef::Joined { alias, .. } = &mut condition.rhs {
                if *alias != repaired.alias {
                    trace!(from = %alias, to = %repaired.alias, "Re-pointing join condition");
                    *alias = repaired.alias.clone();
                }
            }
        }
        repaired
    }

    // Expressions

    pub fn has_expressions(&self) -> bool {
        !self.query.expressions.is_empty()
    }

    pub fn clear_expressions(&self) -> Self {
        self.map(InnerQuery::clear_expressions)
    }

    pub fn clean_expressions(&self) -> Self {
        self.map(|q| q.clean_expressions(&self.metadata))
    }

    // Filters

    pub fn has_filters(&self) -> bool {
        !self.query.filters.is_empty()
    }

    pub fn clear_filters(&self) -> Self {
        self.map(InnerQuery::clear_filters)
    }

    pub fn clean_filters(&self) -> Self {
        self.map(|q| q.clean_filters(&self.metadata))
    }

    // Summarize

    pub fn has_aggregations(&self) -> bool {
        !self.query.aggregations.is_empty()
    }

    pub fn has_breakouts(&self) -> bool {
        !self.query.breakouts.is_empty()
    }

    pub fn clear_aggregations(&self) -> Self {
        self.map(InnerQuery::clear_aggregations)
    }

    pub fn clear_breakouts(&self) -> Self {
        self.map(InnerQuery::clear_breakouts)
    }

    pub fn clean_aggregations(&self) -> Self {
        self.map(|q| q.clean_aggregations(&self.metadata))
    }

    pub fn clean_breakouts(&self) -> Self {
        self.map(|q| q.clean_breakouts(&self.metadata))
    }

    // Sort and limit

    pub fn has_sorts(&self) -> bool {
        !self.query.order_by.is_empty()
    }

    pub fn clean_sorts(&self) -> Self {
        self.map(|q| q.clean_sorts(&self.metadata))
    }

    pub fn has_any_clauses(&self) -> bool {
        self.query.has_any_clauses()
    }

    // Nesting

    pub fn clean_nesting(&self) -> Self {
        self.map(InnerQuery::clean_nesting)
    }

    pub fn nest(&self) -> Self {
        self.map(InnerQuery::nest)
    }

    /// One view per stage, innermost first.
    pub fn queries(&self) -> Vec<StructuredQuery> {
        self.query
            .stages()
            .into_iter()
            .map(|stage| self.with_query(stage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Aggregation;
    use crate::metadata::Table;

    fn metadata() -> Arc<Metadata> {
        Arc::new(
            Metadata::new()
                .with_database(Database::new(
                    1,
                    "sample",
                    &[Feature::Join, Feature::NestedQueries],
                ))
                .with_table(Table::new(10, 1, "orders", &["id", "product_id", "total"]))
                .with_table(Table::new(20, 1, "products", &["id", "category"])),
        )
    }

    fn orders() -> StructuredQuery {
        StructuredQuery::new(Some(1), InnerQuery::from_table(10), metadata())
    }

    #[test]
    fn test_has_feature_uses_metadata() {
        let q = orders();
        assert!(q.has_feature(Feature::Join));
        assert!(!q.has_feature(Feature::Expressions));

        let unknown_db = StructuredQuery::new(Some(7), InnerQuery::from_table(10), metadata());
        assert!(!unknown_db.has_feature(Feature::Join));
    }

    #[test]
    fn test_remove_join_out_of_range() {
        let err = orders().remove_join(0).unwrap_err();
        assert!(matches!(err, QueryError::JoinNotFound(0)));
    }

    #[test]
    fn test_repair_join_fills_alias_and_condition() {
        let q = orders();
        let mut join = Join::new("", 20, FieldRef::field("product_id"), "id");
        join.fields = vec!["category".to_string(), "gone".to_string()];
        let repaired = q.repair_join(&join);
        assert_eq!(repaired.alias, "products");
        assert_eq!(
            repaired.condition.as_ref().unwrap().rhs,
            FieldRef::joined("products", "id")
        );
        assert_eq!(repaired.fields, vec!["category".to_string()]);
    }

    #[test]
    fn test_queries_share_database() {
        let mut stage = InnerQuery::from_table(10);
        stage.breakouts.push(FieldRef::field("product_id"));
        stage.aggregations.push(Aggregation::count());
        let q = StructuredQuery::new(Some(1), stage, metadata()).nest();
        let stages = q.queries();
        assert_eq!(stages.len(), 2);
        assert!(stages.iter().all(|s| s.database_id() == Some(1)));
        assert_eq!(stages[1], q);
        assert_eq!(stages[0], q.source_query().unwrap());
    }

    #[test]
    fn test_set_dataset_query_rejects_native() {
        let err = orders()
            .set_dataset_query(DatasetQuery::native(Some(1), "SELECT 1"))
            .unwrap_err();
        assert!(matches!(err, QueryError::NotStructured));
    }

    #[test]
    fn test_serializes_as_dataset_query() {
        let json = serde_json::to_value(orders()).unwrap();
        assert_eq!(json["type"], "query");
        assert_eq!(json["database"], 1);
        assert_eq!(json["query"]["source-table"], 10);
    }
}
