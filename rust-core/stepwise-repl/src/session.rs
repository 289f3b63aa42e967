// SPDX-License-Identifier: PMPL-1.0-or-later
//! REPL session state: the query being edited, its metadata, and the steps
//! the user has forced open.

use std::path::Path;
use std::sync::Arc;

use stepwise_query::{DatasetQuery, Metadata, QueryError, StructuredQuery};
use stepwise_steps::{Notebook, NotebookSteps, OpenSteps, StepError};
use thiserror::Error;
use tracing::debug;

use crate::formatter::OutputFormat;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("no query loaded; use \\load <file> or paste a dataset query")]
    NoQuery,

    #[error("{0}")]
    Usage(String),
}

pub struct Session {
    pub notebook: Notebook,
    pub metadata: Arc<Metadata>,
    pub dataset: Option<DatasetQuery>,
    pub open_steps: OpenSteps,
    pub format: OutputFormat,
}

impl Session {
    pub fn new(notebook: Notebook, format: OutputFormat) -> Self {
        Self {
            notebook,
            metadata: Arc::new(Metadata::default()),
            dataset: None,
            open_steps: OpenSteps::new(),
            format,
        }
    }

    pub fn load_metadata(&mut self, path: &Path) -> Result<(), SessionError> {
        let metadata = Metadata::from_json(&read(path)?)?;
        debug!(
            databases = metadata.databases.len(),
            tables = metadata.tables.len(),
            "Loaded metadata"
        );
        self.metadata = Arc::new(metadata);
        Ok(())
    }

    pub fn load_query(&mut self, path: &Path) -> Result<(), SessionError> {
        self.set_query_json(&read(path)?)
    }

    /// Replace the current query. Force-open steps refer to the old query's
    /// ids, so they are reset.
    pub fn set_query_json(&mut self, json: &str) -> Result<(), SessionError> {
        self.set_query(DatasetQuery::from_json(json)?);
        self.open_steps = OpenSteps::new();
        Ok(())
    }

    pub fn set_query(&mut self, dataset: DatasetQuery) {
        self.dataset = Some(dataset);
    }

    pub fn save_query(&self, path: &Path) -> Result<(), SessionError> {
        let json = self.dataset()?.to_json_pretty()?;
        std::fs::write(path, json).map_err(|source| SessionError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn dataset(&self) -> Result<&DatasetQuery, SessionError> {
        self.dataset.as_ref().ok_or(SessionError::NoQuery)
    }

    pub fn steps(&self) -> Result<NotebookSteps, SessionError> {
        let dataset = self.dataset()?;
        Ok(self
            .notebook
            .derive_dataset(dataset, Arc::clone(&self.metadata), &self.open_steps)?)
    }

    /// Remove step `position` and make the cascaded result current.
    pub fn revert(&mut self, position: usize) -> Result<(), SessionError> {
        let steps = self.steps()?;
        let updated = steps.remove(position)?;
        self.commit(&steps, updated)
    }

    /// Replace step `position`'s stage query and make the cascaded result
    /// current.
    pub fn update(&mut self, position: usize, json: &str) -> Result<(), SessionError> {
        let dataset = DatasetQuery::from_json(json)?;
        let steps = self.steps()?;
        let updated = steps.update(position, dataset)?;
        self.commit(&steps, updated)
    }

    /// Make `query` current. A force-open id survives only if it names a step
    /// on both sides of the edit in the same active state; ids of removed
    /// stages or shifted join items would otherwise open an unrelated step.
    fn commit(
        &mut self,
        before: &NotebookSteps,
        query: StructuredQuery,
    ) -> Result<(), SessionError> {
        let after = self.notebook.derive(&query, &self.open_steps)?;
        self.open_steps
            .retain(|id| match (before.find(id), after.find(id)) {
                (Some(old), Some(new)) => old.active == new.active,
                _ => false,
            });
        debug!(open = ?self.open_steps.ids(), "Committed query");
        self.dataset = Some(query.dataset_query());
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, SessionError> {
    std::fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse a step position argument.
pub fn parse_position(arg: &str) -> Result<usize, SessionError> {
    arg.parse()
        .map_err(|_| SessionError::Usage(format!("expected a step number, got '{arg}'")))
}
