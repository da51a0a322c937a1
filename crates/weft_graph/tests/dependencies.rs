//! Tests for dependency calls: unresolved dependencies, resolver fan-out,
//! skips and cycles.

mod test_utils;

use std::collections::BTreeSet;

use test_utils::*;
use weft_graph::prelude::*;

fn ids_of(inputs: &Inputs, name: &str) -> Vec<i64> {
    inputs
        .value_or(name, Vec::<i64>::new())
        .expect("list of ids")
}

fn fan_out(name: &str, ids: Vec<i64>) -> ResolverCommand {
    ResolverCommand::multi_execute_with(
        ids.into_iter()
            .map(|id| Inputs::empty().with(name, int(id))),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Unresolved dependencies
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresolved_dependency_runs_once_for_every_request() {
    let constant = CallLog::default();
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("constant", &constant, |_| {
            ValueOrError::with_value(int(10))
        }))
        .add_main_logic(MainLogicDefinition::compute("plus", |inputs| {
            let x = inputs.value_or("x", 0_i64).unwrap_or_default();
            ValueOrError::with_value(int(x + sum_results(inputs, "base")))
        }))
        .add_node(NodeDefinition::new("constant", "constant"))
        .add_node(
            NodeDefinition::new("plus", "plus")
                .with_input("x")
                .with_dependency("base", "constant"),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let one = executor
        .execute_node_with_id("plus", Inputs::empty().with("x", int(1)), "one")
        .expect("registered");
    let two = executor
        .execute_node_with_id("plus", Inputs::empty().with("x", int(2)), "two")
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(one).await), 11);
    assert_eq!(int_of(&resolve(two).await), 12);
    assert_eq!(constant.count(), 1);
}

#[tokio::test]
async fn shared_dependency_runs_once_across_chains() {
    let shared = CallLog::default();
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("shared", &shared, |_| ValueOrError::with_value(int(5))))
        .add_main_logic(MainLogicDefinition::compute("left", |inputs| {
            ValueOrError::with_value(int(sum_results(inputs, "shared") + 1))
        }))
        .add_main_logic(MainLogicDefinition::compute("right", |inputs| {
            ValueOrError::with_value(int(sum_results(inputs, "shared") + 2))
        }))
        .add_main_logic(MainLogicDefinition::compute("top", |inputs| {
            ValueOrError::with_value(int(
                sum_results(inputs, "left") + sum_results(inputs, "right"),
            ))
        }))
        .add_node(NodeDefinition::new("shared", "shared"))
        .add_node(NodeDefinition::new("left", "left").with_dependency("shared", "shared"))
        .add_node(NodeDefinition::new("right", "right").with_dependency("shared", "shared"))
        .add_node(
            NodeDefinition::new("top", "top")
                .with_dependency("left", "left")
                .with_dependency("right", "right"),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let top = executor
        .execute_node("top", Inputs::empty())
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(top).await), 13);
    assert_eq!(shared.count(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Fan-out
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolver_fans_out_one_call_per_input_set() {
    let items = CallLog::default();
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("item", &items, |inputs| {
            ValueOrError::from_result(inputs.value_or("id", 0_i64).map(|id| int(id * 10)))
        }))
        .add_main_logic(MainLogicDefinition::compute("feed", |inputs| {
            ValueOrError::with_value(int(sum_results(inputs, "item")))
        }))
        .add_resolver("ids_to_items", |inputs| fan_out("id", ids_of(inputs, "ids")))
        .add_node(NodeDefinition::new("item", "item").with_input("id"))
        .add_node(
            NodeDefinition::new("feed", "feed")
                .with_input("ids")
                .with_dependency("item", "item")
                .with_resolver(
                    ResolverDefinition::new("ids_to_items", "item")
                        .bound_from(["ids"])
                        .resolves(["id"]),
                ),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let feed = executor
        .execute_node("feed", Inputs::empty().with("ids", Value::new(vec![1_i64, 2, 3])))
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(feed).await), 60);
    let called: BTreeSet<i64> = items
        .calls()
        .iter()
        .map(|inputs| inputs.value_or("id", 0_i64).expect("id"))
        .collect();
    assert_eq!(called, BTreeSet::from([1, 2, 3]));
    assert_eq!(items.count(), 3);
}

#[tokio::test]
async fn two_resolvers_cross_their_input_sets() {
    let cells = CallLog::default();
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("cell", &cells, |inputs| {
            let row = inputs.value_or("row", 0_i64).unwrap_or_default();
            let col = inputs.value_or("col", 0_i64).unwrap_or_default();
            ValueOrError::with_value(int(row * col))
        }))
        .add_main_logic(MainLogicDefinition::compute("grid", |inputs| {
            let results = inputs.results("cell").unwrap_or_default();
            let total: i64 = results
                .values()
                .filter_map(|outcome| outcome.value()?.downcast_ref::<i64>().copied())
                .sum();
            ValueOrError::with_value(int(total * 1000 + results.len() as i64))
        }))
        .add_resolver("rows", |inputs| fan_out("row", ids_of(inputs, "rows")))
        .add_resolver("cols", |inputs| fan_out("col", ids_of(inputs, "cols")))
        .add_node(NodeDefinition::new("cell", "cell").with_inputs(["row", "col"]))
        .add_node(
            NodeDefinition::new("grid", "grid")
                .with_inputs(["rows", "cols"])
                .with_dependency("cell", "cell")
                .with_resolver(
                    ResolverDefinition::new("rows", "cell")
                        .bound_from(["rows"])
                        .resolves(["row"]),
                )
                .with_resolver(
                    ResolverDefinition::new("cols", "cell")
                        .bound_from(["cols"])
                        .resolves(["col"]),
                ),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let grid = executor
        .execute_node(
            "grid",
            Inputs::empty()
                .with("rows", Value::new(vec![1_i64, 2]))
                .with("cols", Value::new(vec![10_i64, 20, 30])),
        )
        .expect("registered");
    executor.close().expect("closed");

    // (1 + 2) * (10 + 20 + 30) over six cells.
    assert_eq!(int_of(&resolve(grid).await), 180 * 1000 + 6);
    assert_eq!(cells.count(), 6);
}

#[tokio::test]
async fn failed_dependency_calls_are_visible_to_the_caller() {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(MainLogicDefinition::compute("item", |inputs| {
            match inputs.value_or("id", 0_i64) {
                Ok(2) => ValueOrError::with_error(std::io::Error::other("no item 2")),
                other => ValueOrError::from_result(other.map(int)),
            }
        }))
        .add_main_logic(MainLogicDefinition::compute("count_errors", |inputs| {
            let errors = inputs
                .results("item")
                .unwrap_or_default()
                .values()
                .filter(|outcome| outcome.is_error())
                .count();
            ValueOrError::with_value(int(errors as i64))
        }))
        .add_resolver("ids_to_items", |inputs| fan_out("id", ids_of(inputs, "ids")))
        .add_node(NodeDefinition::new("item", "item").with_input("id"))
        .add_node(
            NodeDefinition::new("feed", "count_errors")
                .with_input("ids")
                .with_dependency("item", "item")
                .with_resolver(
                    ResolverDefinition::new("ids_to_items", "item")
                        .bound_from(["ids"])
                        .resolves(["id"]),
                ),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let feed = executor
        .execute_node("feed", Inputs::empty().with("ids", Value::new(vec![1_i64, 2, 3])))
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(feed).await), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Skips and cycles
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn skipped_dependency_delivers_empty_results() {
    let details = CallLog::default();
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("detail", &details, |_| ValueOrError::with_value(int(1))))
        .add_main_logic(MainLogicDefinition::compute("summary", |inputs| {
            let delivered = inputs.results("detail").unwrap_or_default().len();
            ValueOrError::with_value(int(delivered as i64))
        }))
        .add_resolver("only_when_flagged", |inputs| {
            if inputs.value_or("flag", false).unwrap_or_default() {
                ResolverCommand::execute_with(Inputs::empty())
            } else {
                ResolverCommand::skip("flag is off")
            }
        })
        .add_node(NodeDefinition::new("detail", "detail"))
        .add_node(
            NodeDefinition::new("summary", "summary")
                .with_input("flag")
                .with_dependency("detail", "detail")
                .with_resolver(
                    ResolverDefinition::new("only_when_flagged", "detail").bound_from(["flag"]),
                ),
        );
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let summary = executor
        .execute_node("summary", Inputs::empty().with("flag", Value::new(false)))
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(summary).await), 0);
    assert_eq!(details.count(), 0);
}

#[tokio::test]
async fn cyclic_dependencies_terminate() {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(MainLogicDefinition::compute("a", |inputs| {
            let x = inputs.value_or("x", 0_i64).unwrap_or_default();
            let from_b = inputs.results("b").unwrap_or_default().len() as i64;
            ValueOrError::with_value(int(x + from_b))
        }))
        .add_main_logic(MainLogicDefinition::compute("b", |_| {
            ValueOrError::with_value(int(0))
        }))
        .add_resolver("never_b", |_| ResolverCommand::skip("b is not needed"))
        .add_node(
            NodeDefinition::new("a", "a")
                .with_input("x")
                .with_dependency("b", "b")
                .with_resolver(ResolverDefinition::new("never_b", "b").bound_from(["x"])),
        )
        .add_node(NodeDefinition::new("b", "b").with_dependency("a", "a"));
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let a = executor
        .execute_node("a", Inputs::empty().with("x", int(5)))
        .expect("registered");
    executor.close().expect("closed");

    assert_eq!(int_of(&resolve(a).await), 5);
}
