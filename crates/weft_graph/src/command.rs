//! Commands exchanged between nodes.
//!
//! Nodes never call each other directly. Every interaction is a command
//! queued on the session's worker, so all node state is touched from one
//! thread, one command at a time.

use indexmap::IndexSet;
use weft_data::{Inputs, Results, ValueOrError};

use crate::chain::DependantChain;
use crate::executor::ExecutionError;
use crate::id::{NodeId, RequestId};

/// What a node answers for one request: the non-dependency inputs its main
/// logic ran with, and the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResponse {
    /// Non-dependency inputs of the request.
    pub inputs: Inputs,
    /// Outcome of the main logic.
    pub response: ValueOrError,
}

/// Final state of one request on one node.
pub type NodeOutcome = Result<NodeResponse, ExecutionError>;

/// A command addressed to one request of one node.
#[derive(Debug, Clone)]
pub(crate) enum NodeRequestCommand {
    /// The request will never run; its outcome is a skip error.
    Skip {
        node_id: NodeId,
        request_id: RequestId,
        reason: String,
    },
    /// Delivers the results of one dependency.
    ExecuteWithDependency {
        node_id: NodeId,
        request_id: RequestId,
        dependency_name: String,
        results: Results,
    },
    /// Delivers caller inputs. `input_names` lists every name being
    /// delivered, including names with no value in `inputs`.
    ExecuteWithInputs {
        node_id: NodeId,
        request_id: RequestId,
        input_names: IndexSet<String>,
        inputs: Inputs,
        dependant_chain: DependantChain,
    },
}

impl NodeRequestCommand {
    pub(crate) fn node_id(&self) -> &NodeId {
        match self {
            NodeRequestCommand::Skip { node_id, .. }
            | NodeRequestCommand::ExecuteWithDependency { node_id, .. }
            | NodeRequestCommand::ExecuteWithInputs { node_id, .. } => node_id,
        }
    }

    pub(crate) fn request_id(&self) -> &RequestId {
        match self {
            NodeRequestCommand::Skip { request_id, .. }
            | NodeRequestCommand::ExecuteWithDependency { request_id, .. }
            | NodeRequestCommand::ExecuteWithInputs { request_id, .. } => request_id,
        }
    }
}

/// Marks every request on `dependant_chain` as delivered to a node.
#[derive(Debug, Clone)]
pub(crate) struct Flush {
    pub(crate) node_id: NodeId,
    pub(crate) dependant_chain: DependantChain,
}
