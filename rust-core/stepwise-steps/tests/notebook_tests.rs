// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests: derive, navigate, update and remove notebook steps.

use std::sync::Arc;

use serde_json::json;
use stepwise_query::{
    Aggregation, Database, DatasetQuery, Expr, Feature, FieldRef, Filter, FilterOp, InnerQuery,
    Join, Metadata, OrderBy, StructuredQuery, Table,
};
use stepwise_steps::{
    Notebook, NotebookConfig, NotebookSteps, OpenSteps, StepError, StepState, StepType,
};

fn metadata() -> Arc<Metadata> {
    Arc::new(
        Metadata::new()
            .with_database(Database::new(
                1,
                "sample",
                &[Feature::Join, Feature::Expressions, Feature::NestedQueries],
            ))
            .with_table(Table::new(10, 1, "orders", &["id", "product_id", "total"]))
            .with_table(Table::new(20, 1, "products", &["id", "category", "price"])),
    )
}

fn structured(inner: InnerQuery) -> StructuredQuery {
    StructuredQuery::new(Some(1), inner, metadata())
}

fn derive(inner: InnerQuery) -> NotebookSteps {
    Notebook::default()
        .derive(&structured(inner), &OpenSteps::new())
        .unwrap()
}

fn ids(steps: &NotebookSteps) -> Vec<&str> {
    steps.iter().map(|s| s.id.as_str()).collect()
}

fn total_over(n: i64) -> Filter {
    Filter::new(FilterOp::Gt, FieldRef::field("total"), vec![json!(n)])
}

/// Stage 0 counts orders per product; stage 1 keeps popular products, most
/// popular first.
fn two_stage() -> InnerQuery {
    let mut base = InnerQuery::from_table(10);
    base.filters.push(total_over(100));
    base.breakouts.push(FieldRef::field("product_id"));
    base.aggregations.push(Aggregation::count());
    let mut outer = base.nest();
    outer.filters.push(Filter::new(
        FilterOp::Gt,
        FieldRef::column("count"),
        vec![json!(5)],
    ));
    outer.order_by.push(OrderBy::desc(FieldRef::column("count")));
    outer
}

fn everything() -> InnerQuery {
    let mut q = InnerQuery::from_table(10);
    q.joins
        .push(Join::new("P", 20, FieldRef::field("product_id"), "id"));
    q.expressions.insert(
        "double".to_string(),
        Expr::call(
            "*",
            vec![Expr::field(FieldRef::field("total")), Expr::number(2.0)],
        ),
    );
    q.filters.push(total_over(10));
    q.breakouts.push(FieldRef::joined("P", "category"));
    q.aggregations.push(Aggregation::count());
    q.order_by.push(OrderBy::desc(FieldRef::Aggregation { index: 0 }));
    q.limit = Some(10);
    q
}

#[test]
fn test_empty_query_has_only_data_step() {
    let steps = derive(InnerQuery::from_table(10));
    assert_eq!(ids(&steps), vec!["0:data"]);
    let data = &steps.steps()[0];
    assert_eq!(data.state(), StepState::Shown);
    assert_eq!(data.actions.len(), 6);
}

#[test]
fn test_visible_implies_valid_and_inactive_has_no_preview() {
    let open: OpenSteps = ["0:sort", "0:join:1", "1:limit"].into_iter().collect();
    let steps = Notebook::default()
        .derive(&structured(two_stage()), &open)
        .unwrap();
    for step in &steps {
        assert!(step.visible);
        assert!(step.valid, "{} visible but invalid", step.id);
        if !step.active {
            assert!(step.preview_query.is_none(), "{}", step.id);
        }
    }
    assert!(steps.find("0:sort").is_some());
    assert!(steps.find("0:join:1").is_none(), "placeholder is 0:join");
    assert!(steps.find("1:limit").is_some());
}

#[test]
fn test_two_stage_layout_and_sentinel() {
    let steps = derive(two_stage());
    assert_eq!(
        ids(&steps),
        vec!["0:data", "0:filter", "0:summarize", "1:filter", "1:sort"]
    );
    let sort = steps.find("1:sort").unwrap();
    assert_eq!(sort.stage_index, -1);
    assert_eq!(sort.stage_position(), 1);
    assert_eq!(steps.find("1:filter").unwrap().stage_index, 1);

    let open: OpenSteps = ["0:sort"].into_iter().collect();
    let steps = Notebook::default()
        .derive(&structured(two_stage()), &open)
        .unwrap();
    assert_eq!(steps.find("0:sort").unwrap().stage_index, 0);
}

#[test]
fn test_leading_actions_bridge_to_previous_stage() {
    let steps = derive(two_stage());
    let summarize = steps.find("0:summarize").unwrap();
    let action_ids: Vec<&str> = summarize.actions.iter().map(|a| a.step_id.as_str()).collect();
    assert_eq!(
        action_ids,
        vec!["0:sort", "0:limit", "1:join", "1:expression"]
    );
}

#[test]
fn test_remove_summarize_cascades_to_later_stage() {
    let steps = derive(two_stage());
    let position = steps.position("0:summarize").unwrap();
    let updated = steps.remove(position).unwrap();

    let mut expected = InnerQuery::from_table(10);
    expected.filters.push(total_over(100));
    assert_eq!(updated.query(), &expected);
}

#[test]
fn test_remove_last_stage_sort() {
    let steps = derive(two_stage());
    let updated = steps.remove(steps.position("1:sort").unwrap()).unwrap();
    let mut expected = two_stage();
    expected.order_by.clear();
    assert_eq!(updated.query(), &expected);
}

#[test]
fn test_update_is_idempotent() {
    let steps = derive(two_stage());
    for (position, step) in steps.iter().enumerate() {
        let first = steps
            .update(position, step.query.dataset_query())
            .unwrap();
        assert_eq!(first.query(), &two_stage(), "{}", step.id);

        let again = derive(first.query().clone());
        let second = again
            .update(position, again.steps()[position].query.dataset_query())
            .unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_update_after_edit_is_idempotent() {
    let steps = derive(two_stage());
    let mut moved = steps.steps()[0].query.query().clone();
    moved.source_table = Some(20);
    let first = steps
        .update(0, DatasetQuery::structured(Some(1), moved))
        .unwrap();
    assert_ne!(first.query(), &two_stage());

    let again = derive(first.query().clone());
    let second = again
        .update(0, again.steps()[0].query.dataset_query())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_remove_join_drops_sort_and_limit_of_bare_aggregate() {
    let notebook = Notebook::new(NotebookConfig {
        auto_nest: false,
        ..Default::default()
    })
    .unwrap();
    let steps = notebook
        .derive(&structured(everything()), &OpenSteps::new())
        .unwrap();
    let updated = steps.remove(steps.position("0:join").unwrap()).unwrap();

    let query = updated.query();
    assert!(query.joins.is_empty());
    assert!(query.breakouts.is_empty());
    assert_eq!(query.aggregations.len(), 1);
    assert!(query.order_by.is_empty());
    assert_eq!(query.limit, None);

    let again = notebook.derive(&updated, &OpenSteps::new()).unwrap();
    assert_eq!(
        ids(&again),
        vec!["0:data", "0:expression", "0:filter", "0:summarize"]
    );
}

#[test]
fn test_update_reattaches_stage_without_visible_steps() {
    let mut base = InnerQuery::from_table(10);
    base.filters.push(total_over(100));
    base.breakouts.push(FieldRef::field("product_id"));
    base.aggregations.push(Aggregation::count());
    let mut outer = base.nest();
    outer.fields.push(FieldRef::column("product_id"));

    let steps = derive(outer.clone());
    assert_eq!(ids(&steps), vec!["0:data", "0:filter", "0:summarize"]);
    assert_eq!(steps.stage_count(), 2);

    let updated = steps.remove(steps.position("0:filter").unwrap()).unwrap();
    assert_eq!(updated.query().stage_count(), 2);
    assert_eq!(updated.query().fields, outer.fields);
    let source = updated.source_query().unwrap();
    assert!(!source.has_filters());
    assert!(source.has_breakouts());
}

#[test]
fn test_update_removes_join_that_no_longer_resolves() {
    let mut inner = InnerQuery::from_table(10);
    inner
        .joins
        .push(Join::new("P", 20, FieldRef::field("product_id"), "id"));
    inner.filters.push(Filter::new(
        FilterOp::Eq,
        FieldRef::joined("P", "category"),
        vec![json!("books")],
    ));
    let steps = derive(inner.clone());
    assert_eq!(ids(&steps), vec!["0:data", "0:join", "0:filter"]);

    // Point the data step at a table with no product_id column.
    let mut moved = inner;
    moved.source_table = Some(20);
    let updated = steps
        .update(0, DatasetQuery::structured(Some(1), moved))
        .unwrap();
    assert_eq!(updated.query(), &InnerQuery::from_table(20));
}

#[test]
fn test_update_repairs_join_alias() {
    let mut inner = InnerQuery::from_table(10);
    inner
        .joins
        .push(Join::new("P", 20, FieldRef::field("product_id"), "id"));
    let steps = derive(inner.clone());

    let mut edited = inner;
    edited.joins[0].alias = String::new();
    let updated = steps
        .update(0, DatasetQuery::structured(Some(1), edited))
        .unwrap();
    let join = &updated.joins()[0];
    assert_eq!(join.alias, "products");
    assert_eq!(
        join.condition.as_ref().unwrap().rhs,
        FieldRef::joined("products", "id")
    );
    assert!(updated.is_valid_join(0));
}

#[test]
fn test_revert_chain_reaches_data_only_query() {
    let notebook = Notebook::new(NotebookConfig {
        auto_nest: false,
        ..Default::default()
    })
    .unwrap();
    let steps = notebook
        .derive(&structured(everything()), &OpenSteps::new())
        .unwrap();
    assert_eq!(
        steps.iter().map(|s| s.step_type).collect::<Vec<_>>(),
        StepType::ALL.to_vec()
    );

    let top = steps.top_level().unwrap();
    let data_only = steps.iter().rev().fold(structured(everything()), |acc, step| {
        assert_eq!(step.preview_query.as_ref(), Some(&acc), "{}", step.id);
        step.revert(&acc, top).unwrap().unwrap_or(acc)
    });
    assert_eq!(data_only.query(), &InnerQuery::from_table(10));
}

#[test]
fn test_auto_nested_stage_offers_actions() {
    let mut inner = InnerQuery::from_table(10);
    inner.breakouts.push(FieldRef::field("product_id"));
    let steps = derive(inner.clone());
    assert_eq!(steps.stage_count(), 2);
    assert_eq!(ids(&steps), vec!["0:data", "0:summarize"]);
    let summarize = steps.find("0:summarize").unwrap();
    assert!(summarize.actions.iter().any(|a| a.step_id == "1:filter"));

    // The empty stage is dropped again on the way out.
    let updated = steps
        .update(0, DatasetQuery::structured(Some(1), inner.clone()))
        .unwrap();
    assert_eq!(updated.query(), &inner);
}

#[test]
fn test_remove_placeholder_join_is_not_revertible() {
    let open: OpenSteps = ["0:join"].into_iter().collect();
    let steps = Notebook::default()
        .derive(&structured(InnerQuery::from_table(10)), &open)
        .unwrap();
    let position = steps.position("0:join").unwrap();
    assert!(steps.revert(position).unwrap().is_none());
    assert!(matches!(
        steps.remove(position),
        Err(StepError::NotRevertible(id)) if id == "0:join"
    ));
}

#[test]
fn test_out_of_range_position() {
    let steps = derive(InnerQuery::from_table(10));
    assert!(matches!(
        steps.revert(5),
        Err(StepError::StepOutOfRange { position: 5, len: 1 })
    ));
}

#[test]
fn test_steps_serialize_to_json() {
    let steps = derive(two_stage());
    let value = serde_json::to_value(steps.steps()).unwrap();
    assert_eq!(value[0]["id"], "0:data");
    assert_eq!(value[0]["type"], "data");
    assert_eq!(value[4]["stage_index"], -1);
    assert_eq!(value[4]["preview_query"]["type"], "query");
}

#[test]
fn test_update_rejects_native_query() {
    let steps = derive(InnerQuery::from_table(10));
    let err = steps
        .update(0, DatasetQuery::native(Some(1), "SELECT 1"))
        .unwrap_err();
    assert!(matches!(err, StepError::Query(_)));
}
