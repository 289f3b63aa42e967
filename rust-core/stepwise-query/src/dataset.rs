// SPDX-License-Identifier: PMPL-1.0-or-later
//! Serializable dataset query: the value callers store and hand back.

use serde::{Deserialize, Serialize};

use crate::inner::InnerQuery;
use crate::{DatabaseId, QueryError};

/// Native (hand-written) query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub query: String,
}

/// A dataset query as persisted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatasetQuery {
    /// Structured (notebook-editable) query.
    Query {
        #[serde(default)]
        database: Option<DatabaseId>,
        query: InnerQuery,
    },
    /// Native query. The notebook shows no steps for it.
    Native {
        #[serde(default)]
        database: Option<DatabaseId>,
        native: NativeQuery,
    },
}

impl DatasetQuery {
    pub fn structured(database: Option<DatabaseId>, query: InnerQuery) -> Self {
        DatasetQuery::Query { database, query }
    }

    pub fn native(database: Option<DatabaseId>, query: impl Into<String>) -> Self {
        DatasetQuery::Native {
            database,
            native: NativeQuery {
                query: query.into(),
            },
        }
    }

    pub fn database(&self) -> Option<DatabaseId> {
        match self {
            DatasetQuery::Query { database, .. } | DatasetQuery::Native { database, .. } => {
                *database
            }
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, DatasetQuery::Query { .. })
    }

    /// The structured stage chain, if any.
    pub fn inner(&self) -> Option<&InnerQuery> {
        match self {
            DatasetQuery::Query { query, .. } => Some(query),
            DatasetQuery::Native { .. } => None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, QueryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_json_roundtrip() {
        let dataset = DatasetQuery::structured(Some(1), InnerQuery::from_table(10));
        let json = dataset.to_json_pretty().unwrap();
        assert!(json.contains("\"type\": \"query\""));
        assert!(json.contains("\"source-table\": 10"));
        assert_eq!(DatasetQuery::from_json(&json).unwrap(), dataset);
    }

    #[test]
    fn test_native_is_not_structured() {
        let dataset = DatasetQuery::native(Some(1), "SELECT 1");
        assert!(!dataset.is_structured());
        assert!(dataset.inner().is_none());
        assert_eq!(dataset.database(), Some(1));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = DatasetQuery::from_json("{\"type\":\"sparql\"}").unwrap_err();
        assert!(matches!(err, QueryError::Serialization(_)));
    }
}
