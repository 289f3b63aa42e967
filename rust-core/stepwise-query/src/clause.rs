// SPDX-License-Identifier: PMPL-1.0-or-later
//! Clause types shared by both query representations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TableId;

/// Reference to a column from inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldRef {
    /// Column of the stage's source table.
    Field { name: String },
    /// Column produced by the previous stage.
    Column { name: String },
    /// Custom expression defined in the same stage.
    Expression { name: String },
    /// Column of a joined table, addressed through the join alias.
    Joined { alias: String, name: String },
    /// Aggregation of the same stage, by position. Only meaningful in sorts.
    Aggregation { index: usize },
}

impl FieldRef {
    pub fn field(name: impl Into<String>) -> Self {
        FieldRef::Field { name: name.into() }
    }

    pub fn column(name: impl Into<String>) -> Self {
        FieldRef::Column { name: name.into() }
    }

    pub fn expression(name: impl Into<String>) -> Self {
        FieldRef::Expression { name: name.into() }
    }

    pub fn joined(alias: impl Into<String>, name: impl Into<String>) -> Self {
        FieldRef::Joined {
            alias: alias.into(),
            name: name.into(),
        }
    }

    /// Name of the output column this reference produces when used as a breakout.
    pub fn column_name(&self) -> String {
        match self {
            FieldRef::Field { name } | FieldRef::Column { name } | FieldRef::Expression { name } => {
                name.clone()
            }
            FieldRef::Joined { alias, name } => joined_column_name(alias, name),
            FieldRef::Aggregation { index } => format!("aggregation_{index}"),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Field { name } => write!(f, "{name}"),
            FieldRef::Column { name } => write!(f, "{name}"),
            FieldRef::Expression { name } => write!(f, "[{name}]"),
            FieldRef::Joined { alias, name } => write!(f, "{alias}.{name}"),
            FieldRef::Aggregation { index } => write!(f, "aggregation#{index}"),
        }
    }
}

/// Output column name of a joined column.
pub fn joined_column_name(alias: &str, name: &str) -> String {
    format!("{alias}__{name}")
}

/// Equality condition between the current stage and a joined table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub lhs: FieldRef,
    pub rhs: FieldRef,
}

/// A join against another table.
///
/// A join without a table or without a condition is still being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Join {
    #[serde(default)]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<TableId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<JoinCondition>,
    /// Selected columns of the joined table (empty = all).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl Join {
    /// Create a complete join `alias` on `table` with `lhs = alias.rhs_column`.
    pub fn new(
        alias: impl Into<String>,
        table: TableId,
        lhs: FieldRef,
        rhs_column: impl Into<String>,
    ) -> Self {
        let alias = alias.into();
        Self {
            condition: Some(JoinCondition {
                lhs,
                rhs: FieldRef::joined(alias.clone(), rhs_column),
            }),
            alias,
            source_table: Some(table),
            fields: Vec::new(),
        }
    }

    /// A join with no table picked yet.
    pub fn draft() -> Self {
        Self {
            alias: String::new(),
            source_table: None,
            condition: None,
            fields: Vec::new(),
        }
    }

    /// Whether the join is still missing a table or a condition.
    pub fn has_gaps(&self) -> bool {
        self.source_table.is_none() || self.condition.is_none()
    }
}

/// Custom expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Expr {
    Field { field: FieldRef },
    Number { value: f64 },
    Text { value: String },
    Call { op: String, args: Vec<Expr> },
}

impl Expr {
    pub fn field(field: FieldRef) -> Self {
        Expr::Field { field }
    }

    pub fn number(value: f64) -> Self {
        Expr::Number { value }
    }

    pub fn call(op: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            op: op.into(),
            args,
        }
    }

    /// All field references in this expression, depth first.
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Expr::Field { field } => out.push(field),
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_refs(out)),
            Expr::Number { .. } | Expr::Text { .. } => {}
        }
    }
}

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Between,
    Contains,
    IsNull,
    NotNull,
}

/// A single filter condition. Filters in a stage are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub op: FilterOp,
    pub field: FieldRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<serde_json::Value>,
}

impl Filter {
    pub fn new(op: FilterOp, field: FieldRef, values: Vec<serde_json::Value>) -> Self {
        Self { op, field, values }
    }
}

/// Aggregation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Distinct,
}

impl fmt::Display for AggregationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationOp::Count => write!(f, "count"),
            AggregationOp::Sum => write!(f, "sum"),
            AggregationOp::Avg => write!(f, "avg"),
            AggregationOp::Min => write!(f, "min"),
            AggregationOp::Max => write!(f, "max"),
            AggregationOp::Distinct => write!(f, "distinct"),
        }
    }
}

/// An aggregation. Only `count` may omit its field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub op: AggregationOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Aggregation {
    pub fn count() -> Self {
        Self {
            op: AggregationOp::Count,
            field: None,
            name: None,
        }
    }

    pub fn of(op: AggregationOp, field: FieldRef) -> Self {
        Self {
            op,
            field: Some(field),
            name: None,
        }
    }

    /// Output column name.
    pub fn column_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.op.to_string())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// A sort clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub direction: Direction,
    pub field: FieldRef,
}

impl OrderBy {
    pub fn asc(field: FieldRef) -> Self {
        Self {
            direction: Direction::Asc,
            field,
        }
    }

    pub fn desc(field: FieldRef) -> Self {
        Self {
            direction: Direction::Desc,
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_column_name() {
        let field = FieldRef::joined("Products", "category");
        assert_eq!(field.column_name(), "Products__category");
    }

    #[test]
    fn test_join_gaps() {
        assert!(Join::draft().has_gaps());
        let join = Join::new("Products", 20, FieldRef::field("product_id"), "id");
        assert!(!join.has_gaps());
    }

    #[test]
    fn test_expr_field_refs_depth_first() {
        let expr = Expr::call(
            "+",
            vec![
                Expr::field(FieldRef::field("total")),
                Expr::call("*", vec![Expr::field(FieldRef::field("tax")), Expr::number(2.0)]),
            ],
        );
        let names: Vec<String> = expr.field_refs().iter().map(|r| r.column_name()).collect();
        assert_eq!(names, vec!["total", "tax"]);
    }

    #[test]
    fn test_aggregation_default_name() {
        assert_eq!(Aggregation::count().column_name(), "count");
        let mut sum = Aggregation::of(AggregationOp::Sum, FieldRef::field("total"));
        assert_eq!(sum.column_name(), "sum");
        sum.name = Some("revenue".to_string());
        assert_eq!(sum.column_name(), "revenue");
    }

    #[test]
    fn test_field_ref_serde_shape() {
        let json = serde_json::to_string(&FieldRef::joined("P", "id")).unwrap();
        assert!(json.contains("\"kind\":\"joined\""));
        let parsed: FieldRef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FieldRef::joined("P", "id"));
    }
}
