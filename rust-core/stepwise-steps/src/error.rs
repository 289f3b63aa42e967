// SPDX-License-Identifier: PMPL-1.0-or-later
//! Notebook error types.

use stepwise_query::QueryError;
use thiserror::Error;

/// Errors that can occur while deriving or editing notebook steps.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("step position {position} out of range for {len} step(s)")]
    StepOutOfRange { position: usize, len: usize },

    #[error("step {0} has nothing to revert")]
    NotRevertible(String),

    #[error("query has {count} stages, more than the configured maximum of {max}")]
    TooManyStages { count: usize, max: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown step type: {0}")]
    UnknownStepType(String),
}
