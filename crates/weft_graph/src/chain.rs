//! Dependant chains.
//!
//! A [`DependantChain`] records the path of `(node, dependency)` hops through
//! which a node was reached from the top of an execution. Chains are how the
//! engine tells apart two invocations of the same node that arrive through
//! different routes, and how it stops recursing into cyclic graphs: a node is
//! never expanded again on a chain that already contains it.
//!
//! Chains are persistent linked lists: extending a chain shares its parent.
//! Equality and hashing are structural.

use core::fmt;
use std::sync::Arc;

use crate::id::NodeId;

/// An immutable path of `(node, dependency)` hops from the top of an execution.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DependantChain(Arc<Link>);

#[derive(PartialEq, Eq, Hash)]
enum Link {
    Start,
    Hop {
        node_id: NodeId,
        dependency_name: Arc<str>,
        parent: DependantChain,
    },
}

impl DependantChain {
    /// The empty chain, used for top-level requests.
    #[must_use]
    pub fn start() -> Self {
        Self(Arc::new(Link::Start))
    }

    /// Extends this chain by one hop: `node_id` calling its dependency `dependency_name`.
    #[must_use]
    pub fn extend(&self, node_id: NodeId, dependency_name: impl Into<Arc<str>>) -> Self {
        Self(Arc::new(Link::Hop {
            node_id,
            dependency_name: dependency_name.into(),
            parent: self.clone(),
        }))
    }

    /// Returns `true` for the empty chain.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(*self.0, Link::Start)
    }

    /// The node of the last hop, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match &*self.0 {
            Link::Start => None,
            Link::Hop { node_id, .. } => Some(node_id),
        }
    }

    /// The dependency of the last hop, if any.
    #[must_use]
    pub fn dependency_name(&self) -> Option<&str> {
        match &*self.0 {
            Link::Start => None,
            Link::Hop {
                dependency_name, ..
            } => Some(dependency_name),
        }
    }

    /// The chain without its last hop.
    #[must_use]
    pub fn parent(&self) -> Option<&DependantChain> {
        match &*self.0 {
            Link::Start => None,
            Link::Hop { parent, .. } => Some(parent),
        }
    }

    /// Returns `true` if any hop on the chain was made by `node_id`.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.hops().any(|(hop_node, _)| hop_node == node_id)
    }

    /// Number of hops.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.hops().count()
    }

    /// Iterates over hops from the most recent back to the start.
    pub fn hops(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        let mut current = self;
        core::iter::from_fn(move || match &*current.0 {
            Link::Start => None,
            Link::Hop {
                node_id,
                dependency_name,
                parent,
            } => {
                current = parent;
                Some((node_id, &**dependency_name))
            }
        })
    }
}

impl Default for DependantChain {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for DependantChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hops: Vec<_> = self.hops().collect();
        hops.reverse();
        f.write_str("[Start]")?;
        for (node_id, dependency_name) in hops {
            write!(f, ">{node_id}:{dependency_name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DependantChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_compare_structurally() {
        let a = DependantChain::start().extend(NodeId::from("order"), "items");
        let b = DependantChain::start().extend(NodeId::from("order"), "items");
        assert_eq!(a, b);
        assert_ne!(a, DependantChain::start());
    }

    #[test]
    fn contains_checks_every_hop() {
        let chain = DependantChain::start()
            .extend(NodeId::from("a"), "b")
            .extend(NodeId::from("b"), "c");
        assert!(chain.contains(&NodeId::from("a")));
        assert!(chain.contains(&NodeId::from("b")));
        assert!(!chain.contains(&NodeId::from("c")));
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn display_lists_hops_from_start() {
        let chain = DependantChain::start()
            .extend(NodeId::from("a"), "dep_b")
            .extend(NodeId::from("b"), "dep_c");
        assert_eq!(chain.to_string(), "[Start]>a:dep_b>b:dep_c");
        assert_eq!(chain.node_id(), Some(&NodeId::from("b")));
        assert_eq!(chain.dependency_name(), Some("dep_c"));
        assert_eq!(chain.parent().map(DependantChain::depth), Some(1));
    }
}
