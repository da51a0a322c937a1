//! End-to-end tests for registering, flushing and resolving node executions.

mod test_utils;

use futures::FutureExt;
use test_utils::*;
use weft_graph::prelude::*;
use weft_pool::PoolError;

fn square_registry(log: &CallLog) -> weft_graph::RegistryBuilder {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(probed("square", log, |inputs| {
            ValueOrError::from_result(inputs.value_or("x", 0_i64).map(|x| int(x * x)))
        }))
        .add_node(NodeDefinition::new("square", "square").with_input("x"));
    builder
}

// ─────────────────────────────────────────────────────────────────────────────
// Caller inputs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn caller_inputs_reach_main_logic() {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(MainLogicDefinition::compute("greet", |inputs| {
            ValueOrError::from_result(
                inputs
                    .value_or("name", String::new())
                    .map(|name| Value::new(format!("hello {name}"))),
            )
        }))
        .add_node(NodeDefinition::new("greeter", "greet").with_input("name"));
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let greeting = executor
        .execute_node(
            "greeter",
            Inputs::empty().with("name", Value::new("weft".to_string())),
        )
        .expect("registered");
    executor.close().expect("closed");

    let value = resolve(greeting)
        .await
        .expect("succeeds")
        .expect("has a value");
    assert_eq!(
        value.downcast_ref::<String>().map(String::as_str),
        Some("hello weft")
    );
}

#[tokio::test]
async fn nothing_runs_before_flush() {
    let log = CallLog::default();
    let graph = graph_of(square_registry(&log));
    let executor = executor_of(&graph);

    let result = executor
        .execute_node("square", Inputs::empty().with("x", int(4)))
        .expect("registered");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(log.count(), 0);

    executor.flush().expect("flushed");
    assert_eq!(int_of(&resolve(result).await), 16);
    assert!(!executor.is_closed());
}

#[tokio::test]
async fn main_logic_runs_once_per_input_set() {
    let log = CallLog::default();
    let graph = graph_of(square_registry(&log));
    let executor = executor_of(&graph);

    let calls: Vec<_> = [("a", 3), ("b", 3), ("c", 3), ("d", 4)]
        .into_iter()
        .map(|(id, x)| {
            executor
                .execute_node_with_id("square", Inputs::empty().with("x", int(x)), id)
                .expect("registered")
        })
        .collect();
    executor.close().expect("closed");

    let mut squares = Vec::new();
    for call in calls {
        squares.push(int_of(&resolve(call).await));
    }
    assert_eq!(squares, vec![9, 9, 9, 16]);
    assert_eq!(log.count(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_node_fails_its_execution() {
    let graph = graph_of(square_registry(&CallLog::default()));
    let executor = executor_of(&graph);

    let result = executor
        .execute_node("ghost", Inputs::empty())
        .expect("registered");
    executor.close().expect("closed");

    assert!(matches!(
        resolve(result).await,
        Err(ExecutionError::UnknownNode(node)) if node.as_str() == "ghost"
    ));
}

#[tokio::test]
async fn closed_executor_rejects_executions() {
    let graph = graph_of(square_registry(&CallLog::default()));
    let executor = executor_of(&graph);

    executor.close().expect("closed");
    executor.close().expect("closing twice is harmless");

    assert!(executor.is_closed());
    assert!(matches!(
        executor.execute_node("square", Inputs::empty()),
        Err(ExecutionError::Rejected)
    ));
}

#[tokio::test]
async fn repeated_inputs_on_one_request_are_rejected() {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(MainLogicDefinition::asynchronous("stall", |_| {
            futures::future::pending().boxed()
        }))
        .add_node(NodeDefinition::new("stall", "stall").with_input("x"));
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let inputs = Inputs::empty().with("x", int(1));
    let first = executor
        .execute_node("stall", inputs.clone())
        .expect("registered");
    let second = executor.execute_node("stall", inputs).expect("registered");
    executor.flush().expect("flushed");

    for result in [resolve(first).await, resolve(second).await] {
        assert!(matches!(
            result,
            Err(ExecutionError::DuplicateInputs { names, .. }) if names == ["x"]
        ));
    }
}

#[tokio::test]
async fn logic_errors_surface_as_computation_errors() {
    let mut builder = NodeDefinitionRegistry::builder();
    builder
        .add_main_logic(MainLogicDefinition::compute("fail", |_| {
            ValueOrError::with_error(std::io::Error::other("boom"))
        }))
        .add_node(NodeDefinition::new("fail", "fail"));
    let graph = graph_of(builder);
    let executor = executor_of(&graph);

    let result = executor
        .execute_node("fail", Inputs::empty())
        .expect("registered");
    executor.close().expect("closed");

    match resolve(result).await {
        Err(ExecutionError::Computation(error)) => assert_eq!(error.to_string(), "boom"),
        other => panic!("expected a computation error, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_executors_lease_separate_workers() {
    let graph = graph_of(square_registry(&CallLog::default()));

    let first = executor_of(&graph);
    let second = executor_of(&graph);
    assert_eq!(graph.worker_pool().size(), 2);
    assert_eq!(first.request_id().as_str(), "req");

    drop(first);
    drop(second);
}

#[test]
fn closed_graph_creates_no_executors() {
    let graph = graph_of(square_registry(&CallLog::default()));
    graph.close();

    assert!(matches!(
        graph.create_executor(ExecutorConfig::new("late")),
        Err(ExecutionError::Pool(PoolError::Closed))
    ));
}
