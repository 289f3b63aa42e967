// SPDX-License-Identifier: PMPL-1.0-or-later
//! Database and table metadata.
//!
//! Metadata answers two questions for the notebook: which features a backend
//! supports, and which columns a table has. Tables that are not described (or
//! described without columns) resolve every column name.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::columns::ColumnSet;
use crate::{DatabaseId, Feature, QueryError, TableId};

/// A database and its capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub id: DatabaseId,
    pub name: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub features: BTreeSet<Feature>,
}

impl Database {
    pub fn new(id: DatabaseId, name: impl Into<String>, features: &[Feature]) -> Self {
        Self {
            id,
            name: name.into(),
            engine: String::new(),
            features: features.iter().copied().collect(),
        }
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// A table and its column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub db_id: DatabaseId,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Table {
    pub fn new(id: TableId, db_id: DatabaseId, name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            id,
            db_id,
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Metadata catalogue for every database and table a query may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse metadata from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.databases.retain(|db| db.id != database.id);
        self.databases.push(database);
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.retain(|t| t.id != table.id);
        self.tables.push(table);
        self
    }

    pub fn database(&self, id: DatabaseId) -> Option<&Database> {
        self.databases.iter().find(|db| db.id == id)
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Columns of a table, or `Any` when the table is not described.
    pub fn table_columns(&self, id: TableId) -> ColumnSet {
        match self.table(id) {
            Some(table) if !table.columns.is_empty() => table.columns.iter().cloned().collect(),
            _ => ColumnSet::Any,
        }
    }
}
