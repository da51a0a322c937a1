//! The per-node execution state machine.
//!
//! A [`Node`] accumulates the inputs of every request addressed to it. As
//! inputs arrive it runs the resolvers they unlock, fans calls out to
//! dependencies, and once every declared input is present runs its decorated
//! main logic, at most once per distinct set of caller inputs.
//!
//! Nodes are only ever touched from the session worker; every method here
//! runs inside a worker command and may queue further commands, but never
//! waits on one.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};
use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use weft_data::{InputValue, Inputs, Results, ValueOrError};

use crate::chain::DependantChain;
use crate::command::{Flush, NodeOutcome, NodeRequestCommand, NodeResponse};
use crate::decoration::{DecoratorCommand, LogicExecutionContext, MainLogicDecorator, decorate};
use crate::definition::{
    LogicFuture, MainLogicDefinition, NodeDefinition, ResolverCommand, ResolverDefinition,
};
use crate::executor::{DecorationState, ExecutionError, Session};
use crate::id::{LogicId, NodeId, RequestId};
use crate::promise::Promise;

/// Session services available to a node while it handles a command.
pub(crate) struct NodeContext<'a> {
    pub(crate) session: &'a Session,
    pub(crate) decoration: &'a mut DecorationState,
}

/// Calls made to one dependency on behalf of one request.
#[derive(Default)]
struct DependencyExecutions {
    /// Number of distinct calls issued.
    execution_counter: usize,
    executed_resolvers: IndexSet<LogicId>,
    call_inputs: HashMap<RequestId, Inputs>,
    call_responses: IndexMap<RequestId, BoxFuture<'static, NodeOutcome>>,
}

struct RequestState {
    promise: Promise<NodeOutcome>,
    dependant_chain: Option<DependantChain>,
    inputs: IndexMap<String, InputValue>,
    dependency_values: IndexMap<String, Results>,
    resolver_results: IndexMap<LogicId, ResolverCommand>,
    dependency_executions: HashMap<String, DependencyExecutions>,
    main_logic_executed: bool,
}

impl RequestState {
    fn new() -> Self {
        Self {
            promise: Promise::new(),
            dependant_chain: None,
            inputs: IndexMap::new(),
            dependency_values: IndexMap::new(),
            resolver_results: IndexMap::new(),
            dependency_executions: HashMap::new(),
            main_logic_executed: false,
        }
    }

    fn available_inputs(&self) -> HashSet<&str> {
        self.inputs
            .keys()
            .chain(self.dependency_values.keys())
            .map(String::as_str)
            .collect()
    }

    /// Finished running, one way or another.
    fn is_settled(&self) -> bool {
        self.main_logic_executed || self.promise.is_done()
    }
}

struct CachedDecorators {
    active_chains: usize,
    decorators: Arc<[Arc<dyn MainLogicDecorator>]>,
}

/// Runtime state of one node within one session.
pub(crate) struct Node {
    node_id: NodeId,
    definition: Arc<NodeDefinition>,
    logic: Arc<MainLogicDefinition>,
    /// Resolvers keyed by each input they are bound from.
    resolvers_by_input: HashMap<String, Vec<ResolverDefinition>>,
    /// Resolvers bound from no input at all.
    unbound_resolvers: Vec<ResolverDefinition>,
    resolvers_by_dependency: HashMap<String, IndexSet<LogicId>>,
    requests: HashMap<RequestId, RequestState>,
    results_cache: HashMap<Inputs, Shared<LogicFuture>>,
    flushed_chains: HashSet<DependantChain>,
    requests_by_chain: HashMap<DependantChain, IndexSet<RequestId>>,
    decorators_by_chain: HashMap<DependantChain, CachedDecorators>,
}

impl Node {
    pub(crate) fn new(
        definition: Arc<NodeDefinition>,
        logic: Arc<MainLogicDefinition>,
    ) -> Self {
        let mut resolvers_by_input: HashMap<String, Vec<ResolverDefinition>> = HashMap::new();
        let mut unbound_resolvers = Vec::new();
        let mut resolvers_by_dependency: HashMap<String, IndexSet<LogicId>> = HashMap::new();
        for resolver in definition.resolver_definitions() {
            if resolver.bound_from_inputs().is_empty() {
                unbound_resolvers.push(resolver.clone());
            }
            for input in resolver.bound_from_inputs() {
                resolvers_by_input
                    .entry(input.clone())
                    .or_default()
                    .push(resolver.clone());
            }
            resolvers_by_dependency
                .entry(resolver.dependency_name().to_string())
                .or_default()
                .insert(resolver.resolver_id().clone());
        }

        Self {
            node_id: definition.node_id().clone(),
            definition,
            logic,
            resolvers_by_input,
            unbound_resolvers,
            resolvers_by_dependency,
            requests: HashMap::new(),
            results_cache: HashMap::new(),
            flushed_chains: HashSet::new(),
            requests_by_chain: HashMap::new(),
            decorators_by_chain: HashMap::new(),
        }
    }

    fn request(&mut self, request_id: &RequestId) -> &mut RequestState {
        self.requests
            .entry(request_id.clone())
            .or_insert_with(RequestState::new)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a command and returns the promise of the request it targets.
    pub(crate) fn execute_request_command(
        &mut self,
        command: NodeRequestCommand,
        cx: &mut NodeContext<'_>,
    ) -> Promise<NodeOutcome> {
        let request_id = command.request_id().clone();
        let promise = self.request(&request_id).promise.clone();

        let ready = match command {
            NodeRequestCommand::Skip { reason, .. } => {
                tracing::debug!(node = %self.node_id, request = %request_id, %reason, "request skipped");
                promise.complete(Err(ExecutionError::Skipped { reason }));
                return promise;
            }
            NodeRequestCommand::ExecuteWithDependency {
                dependency_name,
                results,
                ..
            } => self.execute_with_dependency(&request_id, dependency_name, results, cx),
            NodeRequestCommand::ExecuteWithInputs {
                input_names,
                inputs,
                dependant_chain,
                ..
            } => self.execute_with_inputs(&request_id, input_names, &inputs, dependant_chain, cx),
        };

        let result = ready.and_then(|ready| {
            if ready {
                self.execute_main_logic(&request_id, cx)
            } else {
                Ok(())
            }
        });
        if let Err(error) = result {
            tracing::debug!(node = %self.node_id, request = %request_id, %error, "request failed");
            promise.complete(Err(error));
        }
        promise
    }

    fn execute_with_dependency(
        &mut self,
        request_id: &RequestId,
        dependency_name: String,
        results: Results,
        cx: &mut NodeContext<'_>,
    ) -> Result<bool, ExecutionError> {
        let node_id = self.node_id.clone();
        let state = self.request(request_id);
        if state.dependency_values.contains_key(&dependency_name) {
            return Err(ExecutionError::DuplicateDependency {
                node: node_id,
                request: request_id.clone(),
                dependency: dependency_name,
            });
        }
        tracing::trace!(
            node = %node_id,
            request = %request_id,
            dependency = %dependency_name,
            results = results.len(),
            "received dependency results"
        );
        state
            .dependency_values
            .insert(dependency_name.clone(), results);
        let new_inputs = IndexSet::from([dependency_name]);
        self.execute(request_id, &new_inputs, cx)
    }

    fn execute_with_inputs(
        &mut self,
        request_id: &RequestId,
        input_names: IndexSet<String>,
        inputs: &Inputs,
        dependant_chain: DependantChain,
        cx: &mut NodeContext<'_>,
    ) -> Result<bool, ExecutionError> {
        self.requests_by_chain
            .entry(dependant_chain.clone())
            .or_default()
            .insert(request_id.clone());

        let node_id = self.node_id.clone();
        let state = self.request(request_id);
        state.dependant_chain.get_or_insert(dependant_chain);

        let duplicates: Vec<String> = input_names
            .iter()
            .filter(|name| state.inputs.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(ExecutionError::DuplicateInputs {
                node: node_id,
                request: request_id.clone(),
                names: duplicates,
            });
        }
        for name in &input_names {
            let value = inputs.get(name).cloned().unwrap_or_default();
            state.inputs.insert(name.clone(), value);
        }
        self.execute(request_id, &input_names, cx)
    }

    /// Runs whatever the newly arrived inputs unlock. Returns `true` once every
    /// declared input of the request is present and no resolver is pending.
    fn execute(
        &mut self,
        request_id: &RequestId,
        new_input_names: &IndexSet<String>,
        cx: &mut NodeContext<'_>,
    ) -> Result<bool, ExecutionError> {
        let definition = Arc::clone(&self.definition);
        let Some(state) = self.requests.get(request_id) else {
            return Ok(false);
        };

        let available = state.available_inputs();
        if available.is_empty() && definition.input_names().is_empty() {
            return Ok(true);
        }

        let candidates: Vec<&ResolverDefinition> = if new_input_names.is_empty() {
            self.unbound_resolvers.iter().collect()
        } else {
            new_input_names
                .iter()
                .filter_map(|name| self.resolvers_by_input.get(name))
                .flatten()
                .collect()
        };
        let mut pending: IndexMap<LogicId, ResolverDefinition> = IndexMap::new();
        for resolver in candidates {
            let bound = resolver
                .bound_from_inputs()
                .iter()
                .all(|name| available.contains(name.as_str()));
            if bound && !state.resolver_results.contains_key(resolver.resolver_id()) {
                pending
                    .entry(resolver.resolver_id().clone())
                    .or_insert_with(|| resolver.clone());
            }
        }
        let all_present = definition
            .input_names()
            .iter()
            .all(|name| available.contains(name.as_str()));
        drop(available);

        self.execute_unresolved_dependencies(request_id, cx);

        if pending.is_empty() {
            return Ok(all_present);
        }
        for resolver in pending.values() {
            self.execute_resolver(request_id, resolver, cx)?;
        }
        Ok(false)
    }

    /// Calls, once per request and with no inputs, every dependency that no
    /// resolver feeds.
    fn execute_unresolved_dependencies(&mut self, request_id: &RequestId, cx: &mut NodeContext<'_>) {
        let node_id = self.node_id.clone();
        let definition = Arc::clone(&self.definition);
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        let chain = state.dependant_chain.clone().unwrap_or_default();

        for (dependency_name, dependency_node) in definition.dependencies() {
            if self.resolvers_by_dependency.contains_key(dependency_name)
                || state.dependency_values.contains_key(dependency_name)
            {
                continue;
            }
            let executions = state
                .dependency_executions
                .entry(dependency_name.clone())
                .or_default();
            if executions.execution_counter > 0 {
                continue;
            }
            executions.execution_counter = 1;

            let response = cx.session.enqueue_request(NodeRequestCommand::ExecuteWithInputs {
                node_id: dependency_node.clone(),
                request_id: request_id.append(dependency_name),
                input_names: IndexSet::new(),
                inputs: Inputs::empty(),
                dependant_chain: chain.extend(node_id.clone(), dependency_name.as_str()),
            });
            let session = cx.session.clone();
            let command = DependencyDelivery {
                node_id: node_id.clone(),
                request_id: request_id.clone(),
                dependency_name: dependency_name.clone(),
            };
            cx.session.spawn_task(async move {
                let results = collect_results(vec![response.await]);
                session.deliver(command, results);
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolvers and fan-out
    // ─────────────────────────────────────────────────────────────────────────

    fn resolver_inputs(&self, request_id: &RequestId, resolver: &ResolverDefinition) -> Inputs {
        let Some(state) = self.requests.get(request_id) else {
            return Inputs::empty();
        };
        resolver
            .bound_from_inputs()
            .iter()
            .filter_map(|name| {
                let value = state.inputs.get(name).cloned().or_else(|| {
                    state
                        .dependency_values
                        .get(name)
                        .cloned()
                        .map(InputValue::Results)
                })?;
                Some((name.clone(), value))
            })
            .collect()
    }

    fn execute_resolver(
        &mut self,
        request_id: &RequestId,
        resolver: &ResolverDefinition,
        cx: &mut NodeContext<'_>,
    ) -> Result<(), ExecutionError> {
        let dependency_name = resolver.dependency_name();
        let dependency_node = self
            .definition
            .dependencies()
            .get(dependency_name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownDependency {
                node: self.node_id.clone(),
                dependency: dependency_name.to_string(),
            })?;
        let resolver_logic = cx
            .session
            .registry()
            .logic()
            .resolver(resolver.resolver_id())
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownResolver {
                node: self.node_id.clone(),
                resolver: resolver.resolver_id().clone(),
            })?;

        let command = resolver_logic(&self.resolver_inputs(request_id, resolver));
        tracing::trace!(
            node = %self.node_id,
            request = %request_id,
            resolver = %resolver.resolver_id(),
            ?command,
            "resolver executed"
        );

        let state = self.request(request_id);
        state
            .resolver_results
            .insert(resolver.resolver_id().clone(), command.clone());
        state
            .dependency_executions
            .entry(dependency_name.to_string())
            .or_default()
            .executed_resolvers
            .insert(resolver.resolver_id().clone());
        let already_delivered = state.dependency_values.contains_key(dependency_name);
        let request_chain = state.dependant_chain.clone();

        match command {
            ResolverCommand::Skip { reason } => {
                if !already_delivered {
                    drop(cx.session.enqueue_request(NodeRequestCommand::Skip {
                        node_id: dependency_node,
                        request_id: request_id.append(format_args!("skip({dependency_name})")),
                        reason,
                    }));
                    self.execute_request_command(
                        NodeRequestCommand::ExecuteWithDependency {
                            node_id: self.node_id.clone(),
                            request_id: request_id.clone(),
                            dependency_name: dependency_name.to_string(),
                            results: Results::empty(),
                        },
                        cx,
                    );
                }
            }
            ResolverCommand::MultiExecuteWith(input_list) => {
                self.fan_out(request_id, resolver, dependency_node, &input_list, cx);
                if let Some(chain) = request_chain {
                    self.flush_dependency_if_needed(dependency_name, &chain, cx);
                }
            }
        }
        Ok(())
    }

    /// Issues one dependency call per resolved input set, crossed with every
    /// call already in progress for the dependency. Once every resolver of
    /// the dependency has run, the joined results are delivered back.
    fn fan_out(
        &mut self,
        request_id: &RequestId,
        resolver: &ResolverDefinition,
        dependency_node: NodeId,
        input_list: &[Inputs],
        cx: &mut NodeContext<'_>,
    ) {
        let node_id = self.node_id.clone();
        let dependency_name = resolver.dependency_name();
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        let chain = state
            .dependant_chain
            .clone()
            .unwrap_or_default()
            .extend(node_id.clone(), dependency_name);
        let executions = state
            .dependency_executions
            .entry(dependency_name.to_string())
            .or_default();

        let call_id = |index: usize| request_id.append(format_args!("{dependency_name}[{index}]"));
        let in_progress = executions.execution_counter;
        let previous_inputs: Vec<Inputs> = (0..in_progress)
            .map(|i| executions.call_inputs.get(&call_id(i)).cloned().unwrap_or_default())
            .collect();
        let batch_size = in_progress.max(1);

        let input_list: Vec<Inputs> = input_list
            .iter()
            .map(|inputs| with_declared_inputs(inputs, resolver.resolved_inputs()))
            .collect();

        let mut request_counter = 0;
        for (j, inputs) in input_list.iter().enumerate() {
            for i in 0..batch_size {
                let dependency_request_id = call_id(j * batch_size + i);
                let previous = previous_inputs.get(i).cloned().unwrap_or_default();
                if request_counter >= in_progress {
                    executions.execution_counter += 1;
                }
                let recorded = Inputs::union(&previous, inputs);
                // The first input set extends calls already in flight, which
                // have received the previous inputs.
                let delivered = if j == 0 { inputs.clone() } else { recorded.clone() };
                executions
                    .call_inputs
                    .insert(dependency_request_id.clone(), recorded);

                let input_names: IndexSet<String> = delivered.names().cloned().collect();
                let response = cx.session.enqueue_request(NodeRequestCommand::ExecuteWithInputs {
                    node_id: dependency_node.clone(),
                    request_id: dependency_request_id.clone(),
                    input_names,
                    inputs: delivered,
                    dependant_chain: chain.clone(),
                });
                executions
                    .call_responses
                    .entry(dependency_request_id)
                    .or_insert(response);
            }
            request_counter += batch_size;
        }

        let all_resolved = self
            .resolvers_by_dependency
            .get(dependency_name)
            .is_some_and(|expected| *expected == executions.executed_resolvers);
        if !all_resolved {
            return;
        }

        let responses: Vec<_> = executions
            .call_responses
            .drain(..)
            .map(|(_, response)| response)
            .collect();
        tracing::trace!(
            node = %node_id,
            request = %request_id,
            dependency = %dependency_name,
            calls = responses.len(),
            "dependency fully resolved"
        );
        let session = cx.session.clone();
        let delivery = DependencyDelivery {
            node_id,
            request_id: request_id.clone(),
            dependency_name: dependency_name.to_string(),
        };
        cx.session.spawn_task(async move {
            let outcomes = future::join_all(responses).await;
            session.deliver(delivery, collect_results(outcomes));
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Main logic
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_main_logic(
        &mut self,
        request_id: &RequestId,
        cx: &mut NodeContext<'_>,
    ) -> Result<(), ExecutionError> {
        let Some(state) = self.requests.get(request_id) else {
            return Ok(());
        };
        let caller_inputs = Inputs::new(state.inputs.clone());
        let dependency_inputs: Inputs = state
            .dependency_values
            .iter()
            .map(|(name, results)| (name.clone(), InputValue::Results(results.clone())))
            .collect();
        let chain = state.dependant_chain.clone();
        let promise = state.promise.clone();

        let future = match self.results_cache.get(&caller_inputs) {
            Some(cached) => {
                tracing::trace!(node = %self.node_id, request = %request_id, "reusing cached result");
                cached.clone()
            }
            None => {
                let all_inputs = Inputs::union(&dependency_inputs, &caller_inputs);
                let decorators = self.sorted_decorators(&chain.clone().unwrap_or_default(), cx);
                let logic = decorate(self.logic.logic(), &decorators);
                tracing::debug!(node = %self.node_id, request = %request_id, "executing main logic");
                let mut outputs = logic(core::slice::from_ref(&all_inputs));
                let future = outputs
                    .swap_remove(&all_inputs)
                    .unwrap_or_else(|| {
                        let error = ExecutionError::MissingLogicOutput {
                            node: self.node_id.clone(),
                        };
                        future::ready(ValueOrError::with_error(error)).boxed()
                    })
                    .shared();
                self.results_cache
                    .insert(caller_inputs.clone(), future.clone());
                future
            }
        };

        cx.session.spawn_task(async move {
            let response = future.await;
            promise.complete(Ok(NodeResponse {
                inputs: caller_inputs,
                response,
            }));
        });

        if let Some(state) = self.requests.get_mut(request_id) {
            state.main_logic_executed = true;
        }
        if let Some(chain) = chain {
            self.flush_decorators_if_needed(&chain, cx);
        }
        Ok(())
    }

    /// Decorators for calls arriving on `chain`, in application order.
    fn sorted_decorators(
        &mut self,
        chain: &DependantChain,
        cx: &mut NodeContext<'_>,
    ) -> Arc<[Arc<dyn MainLogicDecorator>]> {
        let active_chains = cx.decoration.chain_count(&self.node_id);
        if let Some(cached) = self.decorators_by_chain.get(chain) {
            if cached.active_chains == active_chains {
                return Arc::clone(&cached.decorators);
            }
        }

        let ctx = LogicExecutionContext {
            node_id: self.node_id.clone(),
            logic_tags: Arc::clone(self.logic.logic_tags()),
            dependant_chain: chain.clone(),
            registry: Arc::clone(cx.session.registry()),
        };
        let mut by_type = cx.session.graph().session_scoped_decorators(&self.logic, &ctx);
        by_type.extend(cx.decoration.request_scoped_decorators(&self.logic, &ctx));
        let decorators: Arc<[_]> = cx
            .session
            .graph()
            .ordering()
            .sort(by_type.into_values().collect())
            .into();

        self.decorators_by_chain.insert(
            chain.clone(),
            CachedDecorators {
                active_chains,
                decorators: Arc::clone(&decorators),
            },
        );
        decorators
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Flush
    // ─────────────────────────────────────────────────────────────────────────

    /// Marks `chain` as flushed and passes the flush on wherever possible.
    pub(crate) fn execute_flush(&mut self, chain: DependantChain, cx: &mut NodeContext<'_>) {
        tracing::trace!(node = %self.node_id, %chain, "flush");
        self.flushed_chains.insert(chain.clone());
        let definition = Arc::clone(&self.definition);
        for dependency_name in definition.dependencies().keys() {
            self.flush_dependency_if_needed(dependency_name, &chain, cx);
        }
        self.flush_decorators_if_needed(&chain, cx);
    }

    /// Flushes a dependency on `chain` once every request on the chain has run
    /// every resolver of that dependency.
    fn flush_dependency_if_needed(
        &self,
        dependency_name: &str,
        chain: &DependantChain,
        cx: &mut NodeContext<'_>,
    ) {
        if !self.flushed_chains.contains(chain) {
            return;
        }
        let Some(dependency_node) = self.definition.dependencies().get(dependency_name) else {
            return;
        };
        let dependency_chain = chain.extend(self.node_id.clone(), dependency_name);

        let ready = match self.requests_by_chain.get(chain) {
            Some(request_ids) if !request_ids.is_empty() => {
                let expected = self.resolvers_by_dependency.get(dependency_name);
                request_ids.iter().all(|request_id| {
                    let executed = self
                        .requests
                        .get(request_id)
                        .and_then(|state| state.dependency_executions.get(dependency_name))
                        .map(|executions| &executions.executed_resolvers);
                    match (expected, executed) {
                        (None, _) => true,
                        (Some(expected), Some(executed)) => expected == executed,
                        (Some(_), None) => false,
                    }
                })
            }
            // Nothing was requested on this chain, so nothing will reach the
            // dependency through it either.
            _ => cx.decoration.is_active(dependency_node, &dependency_chain),
        };
        if ready {
            cx.session.enqueue_flush(Flush {
                node_id: dependency_node.clone(),
                dependant_chain: dependency_chain,
            });
        }
    }

    /// Sends a flush to this node's decorators once every request on `chain`
    /// has run its main logic or failed. Outermost decorators are flushed first.
    fn flush_decorators_if_needed(&mut self, chain: &DependantChain, cx: &mut NodeContext<'_>) {
        if !self.flushed_chains.contains(chain) {
            return;
        }
        let settled = self.requests_by_chain.get(chain).is_none_or(|request_ids| {
            request_ids.iter().all(|request_id| {
                self.requests
                    .get(request_id)
                    .is_some_and(RequestState::is_settled)
            })
        });
        if !settled {
            return;
        }
        let decorators = self.sorted_decorators(chain, cx);
        let command = DecoratorCommand::Flush(chain.clone());
        for decorator in decorators.iter().rev() {
            decorator.execute_command(&command);
        }
    }
}

/// Where to deliver a dependency's joined results.
pub(crate) struct DependencyDelivery {
    pub(crate) node_id: NodeId,
    pub(crate) request_id: RequestId,
    pub(crate) dependency_name: String,
}

/// Adds an empty entry for every declared input missing from `inputs`.
fn with_declared_inputs(inputs: &Inputs, declared: &IndexSet<String>) -> Inputs {
    if declared.iter().all(|name| inputs.contains(name)) {
        return inputs.clone();
    }
    let mut values: IndexMap<String, InputValue> = inputs
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    for name in declared {
        values.entry(name.clone()).or_default();
    }
    Inputs::new(values)
}

/// Joins dependency call outcomes into [`Results`] keyed by the inputs each
/// call ran with. A failed call fails the whole set.
fn collect_results(outcomes: Vec<NodeOutcome>) -> Results {
    let mut entries = IndexMap::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(response) => {
                entries.insert(response.inputs, response.response);
            }
            Err(error) => {
                return Results::single(Inputs::empty(), ValueOrError::with_error(error));
            }
        }
    }
    Results::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_data::Value;

    #[test]
    fn collect_results_keys_by_call_inputs() {
        let a = Inputs::empty().with("id", Value::new(1_u8));
        let b = Inputs::empty().with("id", Value::new(2_u8));
        let results = collect_results(vec![
            Ok(NodeResponse {
                inputs: a.clone(),
                response: ValueOrError::with_value(Value::new("one")),
            }),
            Ok(NodeResponse {
                inputs: b.clone(),
                response: ValueOrError::empty(),
            }),
        ]);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results.get(&a).and_then(|v| v.value()),
            Some(&Value::new("one"))
        );
        assert!(results.get(&b).is_some_and(ValueOrError::is_empty));
    }

    #[test]
    fn collect_results_fails_on_any_error() {
        let results = collect_results(vec![
            Ok(NodeResponse::default()),
            Err(ExecutionError::Skipped {
                reason: "not needed".to_string(),
            }),
        ]);
        let outcome = results.get(&Inputs::empty()).expect("single entry");
        assert!(outcome.is_error());
    }
}
