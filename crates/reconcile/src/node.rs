//! Resource nodes and programs - the declaration interface.
//!
//! A node is pure data: a stable logical id, a resource type token, and
//! declared inputs. A [`Program`] is the full declaration set a client
//! hands to the engine, plus its exported outputs.

use crate::cell::OutputRef;
use crate::value::Input;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Lifecycle state of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Declared, not yet planned
    Pending,
    /// An operation has been planned for this node
    Planned,
    /// The operation has been dispatched to a provider
    Applying,
    /// The operation committed; physical_id is known
    Applied,
    /// The operation failed; dependents are skipped
    Failed,
    /// Never dispatched because an upstream node failed or the run was
    /// cancelled
    Skipped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A declared unit of desired state.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Stable logical identifier, unique within a program
    pub id: String,
    /// Provider resource kind, e.g. `sim:network/Vpc`
    pub type_token: String,
    /// Declared input properties
    pub inputs: BTreeMap<String, Input>,
    pub status: NodeStatus,
    /// Provider-assigned identifier, present once applied
    pub physical_id: Option<String>,
}

impl ResourceNode {
    pub fn new(
        id: impl Into<String>,
        type_token: impl Into<String>,
        inputs: BTreeMap<String, Input>,
    ) -> Self {
        Self {
            id: id.into(),
            type_token: type_token.into(),
            inputs,
            status: NodeStatus::Pending,
            physical_id: None,
        }
    }

    /// Every output reference embedded in this node's inputs, in stable
    /// property order.
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        for input in self.inputs.values() {
            input.collect_refs(&mut refs);
        }
        refs
    }
}

/// Handle returned when a resource is declared.
///
/// Lets the client reference the resource's future outputs without ever
/// touching an unresolved value.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    id: String,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A reference to one of this resource's output properties.
    pub fn output(&self, property: impl Into<String>) -> Input {
        Input::Ref(OutputRef::new(self.id.clone(), property))
    }
}

/// A declaration set: ordered resource nodes plus named exports.
///
/// Declaration order is preserved; it breaks ties among independent nodes
/// in the topological order and makes plans deterministic.
#[derive(Debug, Default)]
pub struct Program {
    nodes: Vec<ResourceNode>,
    exports: BTreeMap<String, Input>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource.
    ///
    /// Duplicate ids are not rejected here; [`DependencyGraph::build`]
    /// validates the full declaration set before any provider call.
    ///
    /// [`DependencyGraph::build`]: crate::graph::DependencyGraph::build
    pub fn resource(
        &mut self,
        id: impl Into<String>,
        type_token: impl Into<String>,
        inputs: BTreeMap<String, Input>,
    ) -> ResourceHandle {
        let node = ResourceNode::new(id, type_token, inputs);
        let handle = ResourceHandle {
            id: node.id.clone(),
        };
        self.nodes.push(node);
        handle
    }

    /// Record a named binding from a program-level key to a value or cell.
    pub fn export(&mut self, name: impl Into<String>, input: Input) {
        self.exports.insert(name.into(), input);
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn exports(&self) -> &BTreeMap<String, Input> {
        &self.exports
    }

    pub fn declared_ids(&self) -> HashSet<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Fold a run's outcomes back into the declared nodes.
    pub fn absorb_report(&mut self, report: &crate::executor::RunReport) {
        for outcome in &report.outcomes {
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id == outcome.node_id) {
                node.status = outcome.status;
                if outcome.physical_id.is_some() {
                    node.physical_id = outcome.physical_id.clone();
                }
            }
        }
    }
}
