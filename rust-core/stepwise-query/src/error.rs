// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query error types.

use thiserror::Error;

/// Errors raised by query operations.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("stage index {index} out of range for a query with {count} stage(s)")]
    StageOutOfRange { index: isize, count: usize },

    #[error("query is not a structured query")]
    NotStructured,

    #[error("no join at index {0}")]
    JoinNotFound(usize),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
