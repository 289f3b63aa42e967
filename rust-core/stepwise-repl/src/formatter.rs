// SPDX-License-Identifier: PMPL-1.0-or-later
//! Output formatters for notebook steps.
//!
//! - **Table**: one row per visible step, using `comfy-table`.
//! - **JSON**: the serialized steps, pretty-printed.

use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::Value;
use std::fmt;
use stepwise_steps::{NotebookStep, NotebookSteps};

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown format '{other}'. Valid formats: table, json")),
        }
    }
}

pub fn format_steps(steps: &NotebookSteps, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(steps),
        OutputFormat::Json => match serde_json::to_value(steps.steps()) {
            Ok(value) => format_json(&value),
            Err(e) => format!("<unserializable steps: {e}>"),
        },
    }
}

/// Pretty-print JSON with 2-space indentation.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn format_table(steps: &NotebookSteps) -> String {
    if steps.is_empty() {
        return "(no steps: native query)".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["#", "id", "type", "stage", "item", "flags", "actions"]
            .into_iter()
            .map(Cell::new),
    );

    for (position, step) in steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(position),
            Cell::new(&step.id),
            Cell::new(step.step_type),
            Cell::new(step.stage_index),
            Cell::new(step.item_index.map_or_else(|| "-".to_string(), |i| i.to_string())),
            Cell::new(flags(step)),
            Cell::new(actions(step)),
        ]);
    }

    let count = steps.len();
    format!("{table}\n({count} step{})", if count == 1 { "" } else { "s" })
}

/// `active`, or `open` for a step shown only because it was forced open.
fn flags(step: &NotebookStep) -> &'static str {
    if step.active {
        "active"
    } else {
        "open"
    }
}

fn actions(step: &NotebookStep) -> String {
    step.actions
        .iter()
        .map(|a| a.step_id.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stepwise_query::{InnerQuery, Metadata, StructuredQuery, Table as MetaTable};
    use stepwise_steps::{Notebook, OpenSteps};

    fn steps() -> NotebookSteps {
        let metadata = Arc::new(Metadata::new().with_table(MetaTable::new(
            10,
            1,
            "orders",
            &["id"],
        )));
        let query = StructuredQuery::new(Some(1), InnerQuery::from_table(10), metadata);
        let open: OpenSteps = ["0:limit"].into_iter().collect();
        Notebook::default().derive(&query, &open).unwrap()
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_format_table_lists_steps() {
        let out = format_steps(&steps(), OutputFormat::Table);
        assert!(out.contains("0:data"));
        assert!(out.contains("0:limit"));
        assert!(out.contains("open"));
        assert!(out.contains("(2 steps)"));
    }

    #[test]
    fn test_format_json_steps() {
        let out = format_steps(&steps(), OutputFormat::Json);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[1]["type"], "limit");
        assert_eq!(value[1]["stage_index"], -1);
        assert!(value[1]["preview_query"].is_null());
    }

    #[test]
    fn test_empty_steps() {
        let out = format_steps(&NotebookSteps::default(), OutputFormat::Table);
        assert!(out.contains("no steps"));
    }
}
