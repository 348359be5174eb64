//! Output exporter - the program's externally visible results.
//!
//! Exports are named bindings from stable program-level keys to literal
//! values or property cells. Only cells reachable from at least one export
//! are resolved and serialized; an export whose cell never resolved (its
//! producer failed or was skipped) surfaces as an unresolved entry.

use crate::cell::{CellTable, OutputRef};
use crate::error::{Error, Result};
use crate::node::Program;
use crate::state::StateRecord;
use serde_json::Value;
use std::collections::BTreeMap;

/// An export whose backing cell never reached resolved state.
#[derive(Debug, Clone)]
pub struct UnresolvedExport {
    pub name: String,
    /// The first unresolved reference behind the export
    pub reference: OutputRef,
}

/// Resolved exports of a run, with any unresolved stragglers kept aside.
#[derive(Debug, Default)]
pub struct ExportSet {
    pub values: BTreeMap<String, Value>,
    pub unresolved: Vec<UnresolvedExport>,
}

impl ExportSet {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// All values, or the error for the first export that never resolved.
    pub fn require_all(self) -> Result<BTreeMap<String, Value>> {
        if let Some(missing) = self.unresolved.first() {
            return Err(Error::UnresolvedOutput {
                name: missing.name.clone(),
                producer: missing.reference.node.clone(),
            });
        }
        Ok(self.values)
    }
}

/// Resolve a program's exports through an arbitrary lookup.
pub fn resolve_exports(
    program: &Program,
    lookup: &dyn Fn(&OutputRef) -> Option<Value>,
) -> ExportSet {
    let mut set = ExportSet::default();
    for (name, input) in program.exports() {
        match input.resolve(lookup) {
            Ok(value) => {
                set.values.insert(name.clone(), value);
            }
            Err(reference) => set.unresolved.push(UnresolvedExport {
                name: name.clone(),
                reference,
            }),
        }
    }
    set
}

/// Resolve exports from a run's cell table (used at the end of apply).
pub fn resolve_from_cells(program: &Program, cells: &CellTable) -> ExportSet {
    resolve_exports(program, &|r| cells.get(r))
}

/// Resolve exports offline, from persisted state records.
pub fn resolve_from_records(program: &Program, records: &[StateRecord]) -> ExportSet {
    resolve_exports(program, &|r| {
        records
            .iter()
            .find(|rec| rec.node_id == r.node)
            .and_then(|rec| rec.outputs.get(&r.property).cloned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Input;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_literal_exports_always_resolve() {
        let mut program = Program::new();
        program.export("region", Input::value(json!("local-1")));

        let set = resolve_exports(&program, &|_| None);
        assert!(set.is_complete());
        assert_eq!(set.values["region"], json!("local-1"));
    }

    #[test]
    fn test_unresolved_cell_is_reported_with_producer() {
        let mut program = Program::new();
        let cluster = program.resource("cluster", "sim:container/Cluster", BTreeMap::new());
        program.export("kubeconfig", cluster.output("kubeconfig"));

        let set = resolve_exports(&program, &|_| None);
        assert!(!set.is_complete());
        assert_eq!(set.unresolved[0].name, "kubeconfig");
        assert_eq!(set.unresolved[0].reference.node, "cluster");

        match set.require_all() {
            Err(Error::UnresolvedOutput { name, producer }) => {
                assert_eq!(name, "kubeconfig");
                assert_eq!(producer, "cluster");
            }
            other => panic!("expected UnresolvedOutput, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_from_cells() {
        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", BTreeMap::new());
        program.export("network_id", net.output("id"));

        let cells = CellTable::new();
        cells.resolve_node("net", &BTreeMap::from([("id".into(), json!("vpc-1"))]));

        let set = resolve_from_cells(&program, &cells);
        assert_eq!(set.values["network_id"], json!("vpc-1"));
    }

    #[test]
    fn test_resolve_from_records() {
        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", BTreeMap::new());
        program.export("network_id", net.output("id"));
        program.export(
            "subnet_ids",
            Input::list(vec![net.output("id"), Input::value(json!("static"))]),
        );

        let records = vec![StateRecord {
            node_id: "net".into(),
            type_token: "sim:network/Vpc".into(),
            input_hash: "h".into(),
            property_hashes: BTreeMap::new(),
            physical_id: "vpc-1".into(),
            outputs: BTreeMap::from([("id".to_string(), json!("vpc-1"))]),
            dependencies: Vec::new(),
            updated_at: Utc::now(),
        }];

        let set = resolve_from_records(&program, &records);
        assert_eq!(set.values["network_id"], json!("vpc-1"));
        assert_eq!(set.values["subnet_ids"], json!(["vpc-1", "static"]));
    }
}
