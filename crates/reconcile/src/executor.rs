//! Execution engine - applies plans with a dependency-aware worker pool.
//!
//! Independent branches of the plan run concurrently; the partial order of
//! the dependency graph is respected through in-degree counters decremented
//! as producers commit. A node dispatches only after every producer it
//! reads from has committed its state record and resolved its cells.
//!
//! Failure is not all-or-nothing: a failed operation skips exactly the
//! failed node's transitive dependents, and everything else runs to
//! completion. Orphan deletes run as a second stage once all surviving
//! operations have settled.

use crate::cell::CellTable;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::node::{NodeStatus, Program};
use crate::outputs::{self, ExportSet};
use crate::plan::{ExecutionPlan, Operation, PlannedStep};
use crate::provider::ProviderRegistry;
use crate::state::{LockSet, StateRecord, StateStore};
use crate::value::hash_properties;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Options for applying a plan.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Number of parallel workers
    pub jobs: usize,
    /// Run-level cancellation flag; stops dispatch of new operations but
    /// lets in-flight provider calls finish
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            cancel: None,
        }
    }
}

/// Progress callback for apply operations.
///
/// Implementations are shared across workers, so methods take `&self`.
pub trait ProgressSink: Send + Sync {
    fn operation_started(&self, _node_id: &str, _op: Operation) {}
    fn operation_finished(&self, _node_id: &str, _op: Operation, _status: NodeStatus) {}
}

/// No-op progress sink.
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Final state of one node's operation.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node_id: String,
    pub type_token: String,
    pub op: Operation,
    pub status: NodeStatus,
    pub physical_id: Option<String>,
    pub error: Option<String>,
}

/// Per-operation tallies for a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &NodeOutcome) {
        match outcome.status {
            NodeStatus::Failed => self.failed += 1,
            NodeStatus::Skipped => self.skipped += 1,
            NodeStatus::Applied => match outcome.op {
                Operation::Create => self.created += 1,
                Operation::Update => self.updated += 1,
                Operation::Replace => self.replaced += 1,
                Operation::Delete => self.deleted += 1,
                Operation::NoOp => self.unchanged += 1,
            },
            _ => {}
        }
    }

    /// Total number of physical changes made.
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.failed + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Full per-node report of a run - partial success is expected and must be
/// diagnosable, so this is never collapsed to a single pass/fail bit.
#[derive(Debug)]
pub struct RunReport {
    /// One outcome per planned operation, in plan order
    pub outcomes: Vec<NodeOutcome>,
    pub summary: RunSummary,
    /// Exports resolved from the run's property cells
    pub exports: ExportSet,
}

impl RunReport {
    pub fn outcome(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.node_id == node_id)
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

// ============================================================================
// Shared execution context
// ============================================================================

struct ExecShared<'a> {
    program: &'a Program,
    graph: &'a DependencyGraph,
    state: &'a dyn StateStore,
    providers: &'a ProviderRegistry,
    cells: &'a CellTable,
    locks: LockSet,
    progress: &'a dyn ProgressSink,
    cancel: Option<Arc<AtomicBool>>,
    inner: Mutex<StageInner>,
}

impl ExecShared<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::SeqCst))
    }
}

/// Bookkeeping for one scheduling stage.
#[derive(Default)]
struct StageInner {
    steps: HashMap<String, PlannedStep>,
    status: HashMap<String, NodeStatus>,
    indegree: HashMap<String, usize>,
    /// Producers each node waits on in this stage (delete stage only;
    /// the survivor stage reads the dependency graph directly)
    deps: HashMap<String, Vec<String>>,
    outcomes: HashMap<String, NodeOutcome>,
}

fn skipped_outcome(step: &PlannedStep, reason: &str) -> NodeOutcome {
    NodeOutcome {
        node_id: step.node_id.clone(),
        type_token: step.type_token.clone(),
        op: step.op,
        status: NodeStatus::Skipped,
        physical_id: None,
        error: Some(reason.to_string()),
    }
}

/// Collect the stage's initially ready nodes and mark them dispatched.
fn take_ready(inner: &Mutex<StageInner>) -> Vec<String> {
    let mut guard = inner.lock().unwrap_or_else(|p| p.into_inner());
    let stage = &mut *guard;
    let mut ready = Vec::new();
    for (id, degree) in &stage.indegree {
        if *degree == 0 && stage.status.get(id) == Some(&NodeStatus::Planned) {
            ready.push(id.clone());
        }
    }
    for id in &ready {
        stage.status.insert(id.clone(), NodeStatus::Applying);
    }
    ready
}

/// Apply a plan, returning the per-node report.
///
/// Ordering guarantee: for any dependency edge, the producer's operation
/// fully completes (record committed, cells resolved) before the consumer
/// dispatches.
pub fn apply(
    program: &Program,
    graph: &DependencyGraph,
    plan: &ExecutionPlan,
    state: &dyn StateStore,
    providers: &ProviderRegistry,
    opts: &ApplyOptions,
    progress: &dyn ProgressSink,
) -> Result<RunReport> {
    let cells = CellTable::new();
    let shared = ExecShared {
        program,
        graph,
        state,
        providers,
        cells: &cells,
        locks: LockSet::new(),
        progress,
        cancel: opts.cancel.clone(),
        inner: Mutex::new(survivor_stage(plan, graph)),
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Scheduler {
            message: format!("failed to build worker pool: {e}"),
        })?;

    // Stage 1: creates, updates, replaces and no-ops, in dependency order.
    pool.scope(|scope| {
        for id in take_ready(&shared.inner) {
            scope.spawn(|scope| exec_node(scope, &shared, id));
        }
    });
    sweep_undispatched(&shared.inner, "run cancelled");

    // Stage 2: orphan deletes, dependents ahead of their producers. The
    // dependency ids come from the records, which still exist here.
    let delete_inner = Mutex::new(delete_stage(plan, state)?);
    pool.scope(|scope| {
        for id in take_ready(&delete_inner) {
            scope.spawn(|scope| exec_delete(scope, &shared, &delete_inner, id));
        }
    });
    sweep_undispatched(&delete_inner, "run cancelled");

    // Assemble outcomes in plan order.
    let survivors = shared.inner.into_inner().unwrap_or_else(|p| p.into_inner());
    let deletes = delete_inner.into_inner().unwrap_or_else(|p| p.into_inner());
    let mut outcomes = Vec::with_capacity(plan.steps.len());
    let mut summary = RunSummary::default();
    for step in &plan.steps {
        let outcome = survivors
            .outcomes
            .get(&step.node_id)
            .or_else(|| deletes.outcomes.get(&step.node_id))
            .cloned()
            .unwrap_or_else(|| skipped_outcome(step, "never dispatched"));
        summary.record(&outcome);
        outcomes.push(outcome);
    }

    let exports = outputs::resolve_from_cells(program, &cells);
    Ok(RunReport {
        outcomes,
        summary,
        exports,
    })
}

/// Build stage-one bookkeeping: survivor steps with in-degrees restricted
/// to the survivor set.
fn survivor_stage(plan: &ExecutionPlan, graph: &DependencyGraph) -> StageInner {
    let steps: HashMap<String, PlannedStep> = plan
        .survivors()
        .map(|s| (s.node_id.clone(), s.clone()))
        .collect();
    let status = steps
        .keys()
        .map(|id| (id.clone(), NodeStatus::Planned))
        .collect();
    let indegree = steps
        .keys()
        .map(|id| {
            let degree = graph
                .dependencies_of(id)
                .iter()
                .filter(|d| steps.contains_key(*d))
                .count();
            (id.clone(), degree)
        })
        .collect();
    StageInner {
        steps,
        status,
        indegree,
        deps: HashMap::new(),
        outcomes: HashMap::new(),
    }
}

/// Stage-one worker: perform one node's operation, then release dependents.
fn exec_node<'s>(scope: &rayon::Scope<'s>, shared: &'s ExecShared<'s>, node_id: String) {
    let step = {
        let guard = shared.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.steps.get(&node_id).cloned()
    };
    let Some(step) = step else { return };

    if shared.is_cancelled() {
        finish_node(scope, shared, skipped_outcome(&step, "run cancelled"));
        return;
    }

    shared.progress.operation_started(&node_id, step.op);
    let outcome = match perform(shared, &step) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("operation failed for '{node_id}': {e}");
            NodeOutcome {
                node_id: node_id.clone(),
                type_token: step.type_token.clone(),
                op: step.op,
                status: NodeStatus::Failed,
                physical_id: step.physical_id.clone(),
                error: Some(e.to_string()),
            }
        }
    };
    finish_node(scope, shared, outcome);
}

/// Record an outcome, propagate skips on failure, release ready dependents
/// on success.
fn finish_node<'s>(scope: &rayon::Scope<'s>, shared: &'s ExecShared<'s>, outcome: NodeOutcome) {
    let node_id = outcome.node_id.clone();
    let op = outcome.op;
    let status = outcome.status;
    let mut to_spawn: Vec<String> = Vec::new();
    let mut also_finished: Vec<(String, Operation, NodeStatus)> = Vec::new();

    {
        let mut guard = shared.inner.lock().unwrap_or_else(|p| p.into_inner());
        let stage = &mut *guard;
        stage.status.insert(node_id.clone(), status);
        stage.outcomes.insert(node_id.clone(), outcome);

        match status {
            NodeStatus::Failed => {
                // Skip the blast radius: every transitive dependent that
                // has not been dispatched yet.
                for dependent in shared.graph.transitive_dependents(&node_id) {
                    if stage.status.get(&dependent) == Some(&NodeStatus::Planned)
                        && let Some(step) = stage.steps.get(&dependent)
                    {
                        let skipped =
                            skipped_outcome(step, &format!("upstream '{node_id}' failed"));
                        stage.status.insert(dependent.clone(), NodeStatus::Skipped);
                        also_finished.push((dependent.clone(), step.op, NodeStatus::Skipped));
                        stage.outcomes.insert(dependent, skipped);
                    }
                }
            }
            NodeStatus::Applied => {
                for dependent in shared.graph.dependents_of(&node_id) {
                    if let Some(degree) = stage.indegree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0
                            && stage.status.get(dependent) == Some(&NodeStatus::Planned)
                            && !shared.is_cancelled()
                        {
                            stage.status.insert(dependent.clone(), NodeStatus::Applying);
                            to_spawn.push(dependent.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    shared.progress.operation_finished(&node_id, op, status);
    for (id, op, status) in also_finished {
        shared.progress.operation_finished(&id, op, status);
    }
    for id in to_spawn {
        scope.spawn(move |scope| exec_node(scope, shared, id));
    }
}

/// Execute one planned operation against its provider and the state store.
fn perform(shared: &ExecShared<'_>, step: &PlannedStep) -> Result<NodeOutcome> {
    match step.op {
        Operation::NoOp => {
            let record = shared
                .state
                .get(&step.node_id)?
                .ok_or_else(|| Error::Store {
                    message: format!("missing state record for '{}'", step.node_id),
                })?;
            shared.cells.resolve_node(&step.node_id, &record.outputs);
            Ok(NodeOutcome {
                node_id: step.node_id.clone(),
                type_token: step.type_token.clone(),
                op: step.op,
                status: NodeStatus::Applied,
                physical_id: Some(record.physical_id),
                error: None,
            })
        }
        Operation::Delete => {
            let physical_id = step.physical_id.clone().ok_or_else(|| Error::Store {
                message: format!("no physical id recorded for '{}'", step.node_id),
            })?;
            let provider = shared.providers.for_type(&step.type_token)?;
            let _lock = shared.locks.acquire(&step.node_id)?;
            provider
                .delete(&physical_id, &step.type_token)
                .map_err(|e| Error::Provider {
                    node: step.node_id.clone(),
                    message: format!("{e:#}"),
                })?;
            shared.state.remove(&step.node_id)?;
            Ok(NodeOutcome {
                node_id: step.node_id.clone(),
                type_token: step.type_token.clone(),
                op: step.op,
                status: NodeStatus::Applied,
                physical_id: Some(physical_id),
                error: None,
            })
        }
        Operation::Create | Operation::Update | Operation::Replace => {
            let node = shared.program.get(&step.node_id).ok_or_else(|| Error::Store {
                message: format!("'{}' is not declared in this program", step.node_id),
            })?;

            // Every producer has committed by now; all references resolve.
            let mut resolved: BTreeMap<String, Value> = BTreeMap::new();
            for (property, input) in &node.inputs {
                let value = input
                    .resolve(&|r| shared.cells.get(r))
                    .map_err(|r| Error::Store {
                        message: format!(
                            "input '{property}' of '{}' references unresolved output {r}",
                            step.node_id
                        ),
                    })?;
                resolved.insert(property.clone(), value);
            }
            let (input_hash, property_hashes) = hash_properties(&resolved);

            let provider = shared.providers.for_type(&step.type_token)?;
            let _lock = shared.locks.acquire(&step.node_id)?;
            let as_provider_error = |e: anyhow::Error| Error::Provider {
                node: step.node_id.clone(),
                message: format!("{e:#}"),
            };

            let (physical_id, mut outputs) = match step.op {
                Operation::Update => {
                    let physical_id = step.physical_id.clone().ok_or_else(|| Error::Store {
                        message: format!("no physical id recorded for '{}'", step.node_id),
                    })?;
                    let outputs = provider
                        .update(&physical_id, &step.type_token, &resolved)
                        .map_err(as_provider_error)?;
                    (physical_id, outputs)
                }
                Operation::Replace => {
                    // Delete the old physical resource, then create anew;
                    // dependents only see the new physical id.
                    if let Some(old_id) = &step.physical_id {
                        provider
                            .delete(old_id, &step.type_token)
                            .map_err(as_provider_error)?;
                    }
                    let created = provider
                        .create(&step.type_token, &resolved)
                        .map_err(as_provider_error)?;
                    (created.physical_id, created.outputs)
                }
                _ => {
                    let created = provider
                        .create(&step.type_token, &resolved)
                        .map_err(as_provider_error)?;
                    (created.physical_id, created.outputs)
                }
            };

            // Consumers can always reference `id`, even if the provider
            // did not publish it as an output.
            outputs
                .entry("id".to_string())
                .or_insert_with(|| Value::String(physical_id.clone()));

            shared.state.commit(StateRecord {
                node_id: step.node_id.clone(),
                type_token: step.type_token.clone(),
                input_hash,
                property_hashes,
                physical_id: physical_id.clone(),
                outputs: outputs.clone(),
                dependencies: shared.graph.dependencies_of(&step.node_id).to_vec(),
                updated_at: Utc::now(),
            })?;
            shared.cells.resolve_node(&step.node_id, &outputs);

            Ok(NodeOutcome {
                node_id: step.node_id.clone(),
                type_token: step.type_token.clone(),
                op: step.op,
                status: NodeStatus::Applied,
                physical_id: Some(physical_id),
                error: None,
            })
        }
    }
}

// ============================================================================
// Delete stage
// ============================================================================

/// Build stage-two bookkeeping from the delete steps and the dependency ids
/// persisted in their records. An orphan becomes ready once every orphan
/// that depended on it has been deleted.
fn delete_stage(plan: &ExecutionPlan, state: &dyn StateStore) -> Result<StageInner> {
    let steps: HashMap<String, PlannedStep> = plan
        .deletes()
        .map(|s| (s.node_id.clone(), s.clone()))
        .collect();

    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    for id in steps.keys() {
        let recorded: Vec<String> = state
            .get(id)?
            .map(|r| r.dependencies)
            .unwrap_or_default()
            .into_iter()
            .filter(|d| steps.contains_key(d))
            .collect();
        deps.insert(id.clone(), recorded);
    }

    let mut indegree: HashMap<String, usize> =
        steps.keys().map(|id| (id.clone(), 0)).collect();
    for producers in deps.values() {
        for producer in producers {
            if let Some(degree) = indegree.get_mut(producer) {
                *degree += 1;
            }
        }
    }

    let status = steps
        .keys()
        .map(|id| (id.clone(), NodeStatus::Planned))
        .collect();
    Ok(StageInner {
        steps,
        status,
        indegree,
        deps,
        outcomes: HashMap::new(),
    })
}

/// Stage-two worker: delete one orphan, then release the orphans it
/// depended on. A failed delete keeps its producers alive.
fn exec_delete<'s>(
    scope: &rayon::Scope<'s>,
    shared: &'s ExecShared<'s>,
    inner: &'s Mutex<StageInner>,
    node_id: String,
) {
    let step = {
        let guard = inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.steps.get(&node_id).cloned()
    };
    let Some(step) = step else { return };

    if shared.is_cancelled() {
        finish_delete(scope, shared, inner, skipped_outcome(&step, "run cancelled"));
        return;
    }

    shared.progress.operation_started(&node_id, step.op);
    let outcome = match perform(shared, &step) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("delete failed for '{node_id}': {e}");
            NodeOutcome {
                node_id: node_id.clone(),
                type_token: step.type_token.clone(),
                op: step.op,
                status: NodeStatus::Failed,
                physical_id: step.physical_id.clone(),
                error: Some(e.to_string()),
            }
        }
    };
    finish_delete(scope, shared, inner, outcome);
}

fn finish_delete<'s>(
    scope: &rayon::Scope<'s>,
    shared: &'s ExecShared<'s>,
    inner: &'s Mutex<StageInner>,
    outcome: NodeOutcome,
) {
    let node_id = outcome.node_id.clone();
    let op = outcome.op;
    let status = outcome.status;
    let mut to_spawn: Vec<String> = Vec::new();
    let mut also_finished: Vec<(String, Operation, NodeStatus)> = Vec::new();

    {
        let mut guard = inner.lock().unwrap_or_else(|p| p.into_inner());
        let stage = &mut *guard;
        let producers = stage.deps.get(&node_id).cloned().unwrap_or_default();
        stage.status.insert(node_id.clone(), status);
        stage.outcomes.insert(node_id.clone(), outcome);

        match status {
            NodeStatus::Applied => {
                for producer in producers {
                    if let Some(degree) = stage.indegree.get_mut(&producer) {
                        *degree -= 1;
                        if *degree == 0
                            && stage.status.get(&producer) == Some(&NodeStatus::Planned)
                            && !shared.is_cancelled()
                        {
                            stage.status.insert(producer.clone(), NodeStatus::Applying);
                            to_spawn.push(producer);
                        }
                    }
                }
            }
            NodeStatus::Failed | NodeStatus::Skipped => {
                // A still-referenced producer must not be deleted.
                let mut stack = producers;
                while let Some(producer) = stack.pop() {
                    if stage.status.get(&producer) == Some(&NodeStatus::Planned)
                        && let Some(step) = stage.steps.get(&producer)
                    {
                        let skipped = skipped_outcome(
                            step,
                            &format!("dependent '{node_id}' was not deleted"),
                        );
                        stack.extend(stage.deps.get(&producer).cloned().unwrap_or_default());
                        stage.status.insert(producer.clone(), NodeStatus::Skipped);
                        also_finished.push((producer.clone(), step.op, NodeStatus::Skipped));
                        stage.outcomes.insert(producer, skipped);
                    }
                }
            }
            _ => {}
        }
    }

    shared.progress.operation_finished(&node_id, op, status);
    for (id, op, status) in also_finished {
        shared.progress.operation_finished(&id, op, status);
    }
    for id in to_spawn {
        scope.spawn(move |scope| exec_delete(scope, shared, inner, id));
    }
}

/// Mark every never-dispatched node skipped (cancellation path).
fn sweep_undispatched(inner: &Mutex<StageInner>, reason: &str) {
    let mut guard = inner.lock().unwrap_or_else(|p| p.into_inner());
    let stage = &mut *guard;
    let pending: Vec<String> = stage
        .status
        .iter()
        .filter(|(_, s)| **s == NodeStatus::Planned)
        .map(|(id, _)| id.clone())
        .collect();
    for id in pending {
        if let Some(step) = stage.steps.get(&id) {
            let outcome = skipped_outcome(step, reason);
            stage.status.insert(id.clone(), NodeStatus::Skipped);
            stage.outcomes.insert(id, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Created, Provider};
    use crate::state::MemoryStateStore;
    use crate::value::Input;
    use serde_json::json;

    /// Test provider that records call order and fails on demand.
    ///
    /// A node whose inputs contain `"fail": true` fails its create/update;
    /// a delete of physical id "undeletable" fails.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<String>>,
        next_id: Mutex<u64>,
    }

    impl ScriptedProvider {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }
    }

    impl Provider for ScriptedProvider {
        fn create(
            &self,
            type_token: &str,
            inputs: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Created> {
            if inputs.get("fail") == Some(&json!(true)) {
                self.log(format!("create-fail {type_token}"));
                anyhow::bail!("simulated create failure");
            }
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let physical_id = format!("phys-{}", *next);
            self.log(format!("create {type_token} -> {physical_id}"));
            Ok(Created {
                physical_id,
                outputs: BTreeMap::from([("ready".to_string(), json!(true))]),
            })
        }

        fn update(
            &self,
            physical_id: &str,
            type_token: &str,
            inputs: &BTreeMap<String, Value>,
        ) -> anyhow::Result<BTreeMap<String, Value>> {
            if inputs.get("fail") == Some(&json!(true)) {
                anyhow::bail!("simulated update failure");
            }
            self.log(format!("update {type_token} {physical_id}"));
            Ok(BTreeMap::from([("ready".to_string(), json!(true))]))
        }

        fn delete(&self, physical_id: &str, type_token: &str) -> anyhow::Result<()> {
            if physical_id == "undeletable" {
                anyhow::bail!("simulated delete failure");
            }
            self.log(format!("delete {type_token} {physical_id}"));
            Ok(())
        }

        fn replace_triggers(&self, _type_token: &str) -> Vec<String> {
            vec!["cidr_block".to_string()]
        }
    }

    fn setup(provider: Arc<ScriptedProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register("sim", provider);
        registry
    }

    fn run(
        program: &Program,
        store: &MemoryStateStore,
        registry: &ProviderRegistry,
    ) -> RunReport {
        let graph = DependencyGraph::build(program).unwrap();
        let plan = crate::plan::plan(program, &graph, store, registry).unwrap();
        apply(
            program,
            &graph,
            &plan,
            store,
            registry,
            &ApplyOptions::default(),
            &NoProgress,
        )
        .unwrap()
    }

    fn network_program() -> Program {
        let mut program = Program::new();
        let net = program.resource(
            "net",
            "sim:network/Vpc",
            BTreeMap::from([("cidr_block".into(), Input::value(json!("10.0.0.0/16")))]),
        );
        let subnet = program.resource(
            "subnet",
            "sim:network/Subnet",
            BTreeMap::from([
                ("vpc_id".into(), net.output("id")),
                ("cidr_block".into(), Input::value(json!("10.0.1.0/24"))),
            ]),
        );
        program.export("network_id", net.output("id"));
        program.export("subnet_id", subnet.output("id"));
        program
    }

    #[test]
    fn test_create_commits_records_and_resolves_exports() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();
        let program = network_program();

        let report = run(&program, &store, &registry);

        assert!(report.is_success());
        assert_eq!(report.summary.created, 2);
        assert!(report.exports.is_complete());
        assert_eq!(report.exports.values["network_id"], json!("phys-1"));

        let record = store.get("subnet").unwrap().unwrap();
        assert_eq!(record.dependencies, vec!["net".to_string()]);
        // The subnet's committed inputs carry the resolved vpc id.
        assert!(record.property_hashes.contains_key("vpc_id"));
    }

    #[test]
    fn test_producer_commits_before_consumer_dispatches() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();
        let program = network_program();

        run(&program, &store, &registry);

        let calls = provider.calls();
        let net_pos = calls
            .iter()
            .position(|c| c.contains("network/Vpc"))
            .unwrap();
        let subnet_pos = calls
            .iter()
            .position(|c| c.contains("network/Subnet"))
            .unwrap();
        assert!(net_pos < subnet_pos, "ordering violated: {calls:?}");
    }

    #[test]
    fn test_second_run_is_all_noop() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();
        let program = network_program();

        run(&program, &store, &registry);
        let calls_after_first = provider.calls().len();

        let graph = DependencyGraph::build(&program).unwrap();
        let second_plan = crate::plan::plan(&program, &graph, &store, &registry).unwrap();
        assert!(second_plan.is_all_noop());

        let report = run(&program, &store, &registry);
        assert_eq!(report.summary.unchanged, 2);
        assert_eq!(provider.calls().len(), calls_after_first);
        // Exports still resolve, from the stored outputs.
        assert!(report.exports.is_complete());
    }

    #[test]
    fn test_failure_skips_dependents_but_independent_branch_completes() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        let mut program = Program::new();
        let doomed = program.resource(
            "doomed",
            "sim:network/Vpc",
            BTreeMap::from([("fail".into(), Input::value(json!(true)))]),
        );
        program.resource(
            "dependent",
            "sim:network/Subnet",
            BTreeMap::from([("vpc_id".into(), doomed.output("id"))]),
        );
        program.resource(
            "bystander",
            "sim:iam/Role",
            BTreeMap::from([("name".into(), Input::value(json!("runner")))]),
        );
        program.export("doomed_id", doomed.output("id"));

        let report = run(&program, &store, &registry);
        program.absorb_report(&report);

        assert!(!report.is_success());
        assert_eq!(report.outcome("doomed").unwrap().status, NodeStatus::Failed);
        assert_eq!(
            report.outcome("dependent").unwrap().status,
            NodeStatus::Skipped
        );
        assert_eq!(
            report.outcome("bystander").unwrap().status,
            NodeStatus::Applied
        );
        assert_eq!(program.get("doomed").unwrap().status, NodeStatus::Failed);

        // The unrelated branch committed its record despite the failure.
        assert!(store.get("bystander").unwrap().is_some());
        assert!(store.get("doomed").unwrap().is_none());

        // The failed node's export never resolved.
        assert!(!report.exports.is_complete());
        assert_eq!(report.exports.unresolved[0].name, "doomed_id");
    }

    #[test]
    fn test_removed_node_is_deleted_and_record_dropped() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        run(&network_program(), &store, &registry);
        assert!(store.get("subnet").unwrap().is_some());

        // Redeclare without the subnet.
        let mut program = Program::new();
        program.resource(
            "net",
            "sim:network/Vpc",
            BTreeMap::from([("cidr_block".into(), Input::value(json!("10.0.0.0/16")))]),
        );

        let report = run(&program, &store, &registry);
        assert_eq!(report.summary.deleted, 1);
        assert_eq!(report.summary.unchanged, 1);
        assert!(store.get("subnet").unwrap().is_none());
        assert!(!store.load().unwrap().iter().any(|r| r.node_id == "subnet"));
    }

    #[test]
    fn test_destroy_deletes_dependents_before_producers() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        run(&network_program(), &store, &registry);

        let empty = Program::new();
        let report = run(&empty, &store, &registry);
        assert_eq!(report.summary.deleted, 2);
        assert!(store.load().unwrap().is_empty());

        let calls = provider.calls();
        let deletes: Vec<&String> = calls.iter().filter(|c| c.starts_with("delete")).collect();
        assert_eq!(deletes.len(), 2);
        assert!(deletes[0].contains("Subnet"), "subnet first: {calls:?}");
        assert!(deletes[1].contains("Vpc"));
    }

    #[test]
    fn test_replace_deletes_old_physical_resource_then_creates() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        let program = network_program();
        run(&program, &store, &registry);
        let old_physical = store.get("net").unwrap().unwrap().physical_id;

        // Changing the cidr triggers a replacement.
        let mut changed = Program::new();
        let net = changed.resource(
            "net",
            "sim:network/Vpc",
            BTreeMap::from([("cidr_block".into(), Input::value(json!("10.9.0.0/16")))]),
        );
        changed.resource(
            "subnet",
            "sim:network/Subnet",
            BTreeMap::from([
                ("vpc_id".into(), net.output("id")),
                ("cidr_block".into(), Input::value(json!("10.0.1.0/24"))),
            ]),
        );

        let report = run(&changed, &store, &registry);
        assert_eq!(report.summary.replaced, 1);
        assert_eq!(report.summary.updated, 1);

        let record = store.get("net").unwrap().unwrap();
        assert_ne!(record.physical_id, old_physical);
        assert!(
            provider
                .calls()
                .iter()
                .any(|c| c.contains("delete") && c.contains(&old_physical)),
            "old physical resource was not deleted: {:?}",
            provider.calls()
        );
    }

    #[test]
    fn test_failed_delete_keeps_its_producers() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        run(&network_program(), &store, &registry);

        // Make the subnet's physical resource undeletable.
        let mut record = store.get("subnet").unwrap().unwrap();
        record.physical_id = "undeletable".to_string();
        store.commit(record).unwrap();

        let empty = Program::new();
        let report = run(&empty, &store, &registry);

        assert_eq!(report.outcome("subnet").unwrap().status, NodeStatus::Failed);
        assert_eq!(report.outcome("net").unwrap().status, NodeStatus::Skipped);
        // The vpc record survives for the next run.
        assert!(store.get("net").unwrap().is_some());
    }

    #[test]
    fn test_cancellation_skips_everything_without_provider_calls() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();
        let program = network_program();

        let graph = DependencyGraph::build(&program).unwrap();
        let plan = crate::plan::plan(&program, &graph, &store, &registry).unwrap();

        let cancel = Arc::new(AtomicBool::new(true));
        let opts = ApplyOptions {
            jobs: 4,
            cancel: Some(cancel),
        };
        let report = apply(
            &program, &graph, &plan, &store, &registry, &opts, &NoProgress,
        )
        .unwrap();

        assert_eq!(report.summary.skipped, 2);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_wide_independent_fanout_completes() {
        let provider = Arc::new(ScriptedProvider::default());
        let registry = setup(Arc::clone(&provider));
        let store = MemoryStateStore::new();

        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", BTreeMap::new());
        for i in 0..16 {
            program.resource(
                format!("subnet-{i}"),
                "sim:network/Subnet",
                BTreeMap::from([("vpc_id".into(), net.output("id"))]),
            );
        }

        let report = run(&program, &store, &registry);
        assert!(report.is_success());
        assert_eq!(report.summary.created, 17);
        assert_eq!(store.load().unwrap().len(), 17);
    }
}
