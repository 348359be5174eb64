//! Property cells - values resolved asynchronously during a run.
//!
//! A cell is owned exclusively by its producer node. Consumers never hold a
//! copy of an unresolved value; they hold an [`OutputRef`] (a reference by
//! id) which becomes an edge in the dependency graph and is only read back
//! once the producer's operation has committed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A symbolic reference to a named output of another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// Logical id of the producing node
    pub node: String,
    /// Output property name on the producer
    pub property: String,
}

impl OutputRef {
    pub fn new(node: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.property)
    }
}

/// The value held by a property cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// The producing operation has not completed yet
    Unresolved,
    /// The producing operation committed and published this value
    Resolved(Value),
}

impl CellValue {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// A single output cell, tagged with its producer and resolution step.
#[derive(Debug, Clone)]
pub struct PropertyCell {
    /// Logical id of the node that owns this cell
    pub producer: String,
    pub value: CellValue,
    /// Logical step at which the cell resolved, if it did
    pub resolved_at: Option<u64>,
}

/// Run-scoped table of property cells, keyed by producer node.
///
/// All outputs of one operation resolve at the same logical step; the step
/// counter is monotonic across the run, so `resolved_at` totally orders
/// operation completions.
#[derive(Debug, Default)]
pub struct CellTable {
    cells: Mutex<HashMap<String, BTreeMap<String, PropertyCell>>>,
    step: AtomicU64,
}

impl CellTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish all outputs of a completed operation.
    ///
    /// Returns the logical step assigned to this resolution.
    pub fn resolve_node(&self, node: &str, outputs: &BTreeMap<String, Value>) -> u64 {
        let step = self.step.fetch_add(1, Ordering::SeqCst) + 1;
        let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        let entry = cells.entry(node.to_string()).or_default();
        for (property, value) in outputs {
            entry.insert(
                property.clone(),
                PropertyCell {
                    producer: node.to_string(),
                    value: CellValue::Resolved(value.clone()),
                    resolved_at: Some(step),
                },
            );
        }
        step
    }

    /// Read a resolved value, or `None` while the producer has not run.
    pub fn get(&self, reference: &OutputRef) -> Option<Value> {
        let cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        match cells.get(&reference.node)?.get(&reference.property)? {
            PropertyCell {
                value: CellValue::Resolved(v),
                ..
            } => Some(v.clone()),
            _ => None,
        }
    }

    /// Snapshot a cell, including producer and resolution step.
    pub fn cell(&self, reference: &OutputRef) -> Option<PropertyCell> {
        let cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        cells
            .get(&reference.node)
            .and_then(|c| c.get(&reference.property))
            .cloned()
    }

    pub fn is_resolved(&self, reference: &OutputRef) -> bool {
        self.get(reference).is_some()
    }
}
