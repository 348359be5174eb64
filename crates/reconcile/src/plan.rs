//! Execution planning - diff declared nodes against stored state.
//!
//! The planner walks the graph in topological order and assigns exactly one
//! operation to every declared node, then appends deletes for orphaned
//! records (dependents before their producers). Nothing here talks to a
//! provider beyond asking which properties force replacement.

use crate::cell::OutputRef;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::node::Program;
use crate::provider::ProviderRegistry;
use crate::state::{StateRecord, StateStore};
use crate::value::hash_properties;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// The operation the reconciler will issue for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// No state record exists; create the physical resource
    Create,
    /// Inputs changed on mutable properties; update in place
    Update,
    /// Inputs changed on a replace-triggering property; delete then create
    Replace,
    /// The record is orphaned; delete the physical resource
    Delete,
    /// Inputs are unchanged
    NoOp,
}

impl Operation {
    /// Whether this operation changes a physical resource.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}

/// One planned operation.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub node_id: String,
    pub op: Operation,
    pub type_token: String,
    /// Known physical id (from the state record), if any
    pub physical_id: Option<String>,
    /// Properties whose content hash changed since the last apply
    pub changed: Vec<String>,
    /// References whose value is only known after the producer applies
    pub deferred: Vec<OutputRef>,
}

/// Ordered sequence of operations: survivors in topological order, then
/// orphan deletes with dependents ahead of their producers.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Number of operations that change a physical resource.
    pub fn changes(&self) -> usize {
        self.steps.iter().filter(|s| s.op.is_change()).count()
    }

    pub fn is_all_noop(&self) -> bool {
        self.changes() == 0
    }

    pub fn count(&self, op: Operation) -> usize {
        self.steps.iter().filter(|s| s.op == op).count()
    }

    pub fn step(&self, node_id: &str) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.node_id == node_id)
    }

    /// Steps for declared nodes (everything except deletes).
    pub fn survivors(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|s| s.op != Operation::Delete)
    }

    /// Delete steps for orphaned records.
    pub fn deletes(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|s| s.op == Operation::Delete)
    }
}

/// Compute the execution plan for a program against stored state.
///
/// Every reference is substituted with the producer's last-applied output
/// where one exists; references into nodes that will be created or replaced
/// this run stay deferred, so their consumers re-hash once the new value is
/// known.
pub fn plan(
    program: &Program,
    graph: &DependencyGraph,
    state: &dyn StateStore,
    providers: &ProviderRegistry,
) -> Result<ExecutionPlan> {
    let records: HashMap<String, StateRecord> = state
        .load()?
        .into_iter()
        .map(|r| (r.node_id.clone(), r))
        .collect();

    let mut ops: HashMap<String, Operation> = HashMap::new();
    let mut steps = Vec::with_capacity(program.len());

    for id in graph.topological_order() {
        let Some(node) = program.get(id) else {
            continue;
        };
        // Fail on unknown resource types before anything is dispatched.
        providers.for_type(&node.type_token)?;

        let lookup = |r: &OutputRef| -> Option<Value> {
            match ops.get(r.node.as_str()) {
                // The producer's outputs are only known after it applies.
                Some(Operation::Create | Operation::Replace) => None,
                _ => records
                    .get(&r.node)
                    .and_then(|rec| rec.outputs.get(&r.property).cloned()),
            }
        };

        let mut deferred = Vec::new();
        let mut substituted: BTreeMap<String, Value> = BTreeMap::new();
        for (property, input) in &node.inputs {
            substituted.insert(property.clone(), input.predict(&lookup, &mut deferred));
        }
        let (input_hash, property_hashes) = hash_properties(&substituted);

        let (op, physical_id, changed) = match records.get(id) {
            None => (Operation::Create, None, Vec::new()),
            Some(rec) if input_hash == rec.input_hash => {
                (Operation::NoOp, Some(rec.physical_id.clone()), Vec::new())
            }
            Some(rec) => {
                let names: BTreeSet<&String> = property_hashes
                    .keys()
                    .chain(rec.property_hashes.keys())
                    .collect();
                let changed: Vec<String> = names
                    .into_iter()
                    .filter(|n| property_hashes.get(*n) != rec.property_hashes.get(*n))
                    .cloned()
                    .collect();

                let triggers = providers.replace_triggers(&node.type_token)?;
                let op = if changed.iter().any(|c| triggers.contains(c)) {
                    Operation::Replace
                } else {
                    Operation::Update
                };
                (op, Some(rec.physical_id.clone()), changed)
            }
        };

        log::debug!("planned {op} for '{id}'");
        ops.insert(id.clone(), op);
        steps.push(PlannedStep {
            node_id: id.clone(),
            op,
            type_token: node.type_token.clone(),
            physical_id,
            changed,
            deferred,
        });
    }

    for record in order_orphan_deletes(state.orphans(&program.declared_ids())?) {
        log::debug!("planned delete for orphaned '{}'", record.node_id);
        steps.push(PlannedStep {
            node_id: record.node_id.clone(),
            op: Operation::Delete,
            type_token: record.type_token.clone(),
            physical_id: Some(record.physical_id.clone()),
            changed: Vec::new(),
            deferred: Vec::new(),
        });
    }

    Ok(ExecutionPlan { steps })
}

/// Order orphaned records so dependents delete before their producers.
///
/// Uses the dependency ids persisted when each record was applied. Stored
/// dependencies are acyclic by construction; if a hand-edited state file
/// introduces a cycle the remainder is deleted in id order.
fn order_orphan_deletes(orphans: Vec<StateRecord>) -> Vec<StateRecord> {
    let mut remaining: BTreeMap<String, StateRecord> =
        orphans.into_iter().map(|r| (r.node_id.clone(), r)).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .keys()
            .filter(|id| {
                !remaining
                    .values()
                    .any(|r| r.node_id != **id && r.dependencies.contains(*id))
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            ordered.extend(std::mem::take(&mut remaining).into_values());
            break;
        }
        for id in ready {
            if let Some(record) = remaining.remove(&id) {
                ordered.push(record);
            }
        }
    }

    ordered
}
