// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stepwise Steps
//!
//! Derives the notebook view of a multi-stage structured query: an ordered
//! list of steps (data, join, expression, filter, summarize, sort, limit) per
//! stage, each carrying a preview of the query up to and including itself and
//! the "add step" actions that may follow it.
//!
//! Derivation is a pure function of the query and the caller's force-open
//! set. Editing goes through `NotebookSteps::update` / `remove`, which return
//! a new query; the caller re-derives.
//!
//! ```text
//! StructuredQuery ──normalize──► stages ──derive_stage_steps──► NotebookSteps
//!        ▲                                                          │
//!        └───────────────── update / remove (cascade) ◄─────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod deriver;
pub mod error;
pub mod notebook;
pub mod open;
pub mod step;

pub use catalog::{definition, StepContext, StepDefinition, StepType, STEPS};
pub use config::NotebookConfig;
pub use deriver::{derive_stage_steps, StageSteps};
pub use error::StepError;
pub use notebook::{Notebook, NotebookSteps};
pub use open::OpenSteps;
pub use step::{NotebookStep, StepAction, StepState};
