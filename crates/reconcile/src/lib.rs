//! # Reconcile
//!
//! A framework for declarative resource reconciliation.
//!
//! Client programs declare resources as data: a stable logical id, a
//! resource type token, and a set of input properties. Inputs may reference
//! the not-yet-known outputs of other resources. This crate turns such a
//! declaration set into converged infrastructure:
//!
//! 1. **Graph** - input references are scanned into a dependency graph,
//!    validated (duplicates, unknown references, cycles) before any
//!    provider is called.
//! 2. **Plan** - each node is diffed against the persisted state store
//!    using content hashes, producing exactly one operation per declared
//!    or orphaned node: `Create`, `Update`, `Replace`, `Delete`, `NoOp`.
//! 3. **Apply** - a dependency-aware worker pool executes independent
//!    branches in parallel. A failure skips only the failed node's
//!    transitive dependents; unrelated branches run to completion.
//!
//! ## Core Concepts
//!
//! - **Program**: the declaration set (resources plus exports)
//! - **PropertyCell**: a value that starts unresolved and is resolved once
//!   its producing operation completes
//! - **StateStore**: persisted record of previously applied resources
//! - **Provider**: the only point of contact with concrete resource kinds
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{
//!     ApplyOptions, CellTable, DependencyGraph, Input, MemoryStateStore,
//!     NoProgress, Program, ProviderRegistry,
//! };
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let mut program = Program::new();
//!
//! let net = program.resource(
//!     "core-net",
//!     "sim:network/Vpc",
//!     BTreeMap::from([("cidr_block".into(), Input::value(json!("10.0.0.0/16")))]),
//! );
//! program.resource(
//!     "core-subnet",
//!     "sim:network/Subnet",
//!     BTreeMap::from([
//!         ("vpc_id".into(), net.output("id")),
//!         ("cidr_block".into(), Input::value(json!("10.0.1.0/24"))),
//!     ]),
//! );
//! program.export("network_id", net.output("id"));
//!
//! let graph = DependencyGraph::build(&program)?;
//! let store = MemoryStateStore::new();
//! let mut registry = ProviderRegistry::new();
//! registry.register("sim", my_provider);
//!
//! let plan = reconcile::plan(&program, &graph, &store, &registry)?;
//! let report = reconcile::apply(
//!     &program, &graph, &plan, &store, &registry,
//!     &ApplyOptions::default(), &NoProgress,
//! )?;
//! println!("{:?}", report.exports.values);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: creates, updates and deletes physical resources
//! - [`StateStore`]: persists one record per live physical resource
//! - [`ProgressSink`]: receives per-operation progress updates
//!
//! This keeps the engine agnostic to concrete cloud APIs, storage layouts
//! and UI frameworks.

pub mod cell;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod outputs;
pub mod plan;
pub mod provider;
pub mod state;
pub mod value;

// Re-export main types at crate root
pub use cell::{CellTable, CellValue, OutputRef, PropertyCell};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{
    ApplyOptions, NoProgress, NodeOutcome, ProgressSink, RunReport, RunSummary, apply,
};
pub use graph::DependencyGraph;
pub use node::{NodeStatus, Program, ResourceHandle, ResourceNode};
pub use outputs::{ExportSet, UnresolvedExport, resolve_exports, resolve_from_records};
pub use plan::{ExecutionPlan, Operation, PlannedStep, plan};
pub use provider::{Created, Provider, ProviderRegistry};
pub use state::{FileStateStore, LockSet, MemoryStateStore, NodeLock, StateRecord, StateStore};
pub use value::Input;
