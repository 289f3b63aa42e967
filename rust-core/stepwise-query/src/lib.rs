// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stepwise Query
//!
//! Query model consumed by the Stepwise notebook.
//! Two representations of the same multi-stage query live here:
//! - the legacy nested form (`InnerQuery`, wrapped per stage by `StructuredQuery`)
//!   where each stage embeds the previous one as its `source-query`;
//! - the current staged form (`StagedQuery`), a flat list of stages addressed
//!   by index, where `-1` means "the last stage".
//!
//! Clause-level operations (clear / clean / nest) are pure: every call returns
//! a new value and leaves the receiver untouched.

pub mod clause;
pub mod columns;
pub mod dataset;
pub mod error;
pub mod inner;
pub mod metadata;
pub mod staged;
pub mod structured;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use clause::{
    Aggregation, AggregationOp, Direction, Expr, FieldRef, Filter, FilterOp, Join, JoinCondition,
    OrderBy,
};
pub use columns::ColumnSet;
pub use dataset::{DatasetQuery, NativeQuery};
pub use error::QueryError;
pub use inner::InnerQuery;
pub use metadata::{Database, Metadata, Table};
pub use staged::{StagedQuery, LAST_STAGE};
pub use structured::StructuredQuery;

/// Database identifier.
pub type DatabaseId = u64;

/// Table identifier.
pub type TableId = u64;

/// Backend capabilities that gate which clauses a query may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Join,
    Expressions,
    NestedQueries,
    BasicAggregations,
}

impl Feature {
    /// All features in canonical order.
    pub const ALL: [Feature; 4] = [
        Feature::Join,
        Feature::Expressions,
        Feature::NestedQueries,
        Feature::BasicAggregations,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Join => write!(f, "join"),
            Feature::Expressions => write!(f, "expressions"),
            Feature::NestedQueries => write!(f, "nested-queries"),
            Feature::BasicAggregations => write!(f, "basic-aggregations"),
        }
    }
}

impl FromStr for Feature {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "join" => Ok(Feature::Join),
            "expressions" => Ok(Feature::Expressions),
            "nested-queries" => Ok(Feature::NestedQueries),
            "basic-aggregations" => Ok(Feature::BasicAggregations),
            _ => Err(QueryError::UnknownFeature(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_display_roundtrip() {
        for feature in Feature::ALL {
            let parsed: Feature = feature.to_string().parse().unwrap();
            assert_eq!(feature, parsed);
        }
    }

    #[test]
    fn test_feature_case_insensitive_parse() {
        assert_eq!("JOIN".parse::<Feature>().unwrap(), Feature::Join);
        assert_eq!(
            "Nested-Queries".parse::<Feature>().unwrap(),
            Feature::NestedQueries
        );
    }

    #[test]
    fn test_unknown_feature_error() {
        let err = "window-functions".parse::<Feature>().unwrap_err();
        assert!(matches!(err, QueryError::UnknownFeature(ref s) if s == "window-functions"));
    }

    #[test]
    fn test_feature_serde_matches_display() {
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{feature}\""));
        }
    }
}
