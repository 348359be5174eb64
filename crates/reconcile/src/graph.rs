//! Dependency graph - built by scanning declared inputs for references.
//!
//! Every output reference in a node's inputs becomes an edge from the
//! producing node to the consumer. The graph validates the declaration set
//! (duplicate ids, unknown references, cycles) before any provider call is
//! issued, and exposes the topological order the planner and executor walk.

use crate::error::{Error, Result};
use crate::node::Program;
use std::collections::{BTreeSet, HashMap, HashSet};

/// An immutable dependency graph over a program's nodes.
#[derive(Debug)]
pub struct DependencyGraph {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build and validate the graph for a declaration set.
    ///
    /// Fails with a declaration error on duplicate logical ids, references
    /// to undeclared nodes, or reference cycles. The cycle error names the
    /// participating node ids.
    pub fn build(program: &Program) -> Result<Self> {
        let mut decl_index: HashMap<&str, usize> = HashMap::new();
        for (index, node) in program.nodes().iter().enumerate() {
            if decl_index.insert(node.id.as_str(), index).is_some() {
                return Err(Error::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for node in program.nodes() {
            let mut deps: Vec<String> = Vec::new();
            for reference in node.references() {
                if !decl_index.contains_key(reference.node.as_str()) {
                    return Err(Error::UnknownReference {
                        node: node.id.clone(),
                        reference: reference.node.clone(),
                    });
                }
                if !deps.contains(&reference.node) {
                    deps.push(reference.node.clone());
                }
            }
            for producer in &deps {
                dependents
                    .entry(producer.clone())
                    .or_default()
                    .push(node.id.clone());
            }
            dependencies.insert(node.id.clone(), deps);
        }

        // Kahn's algorithm; ties among ready nodes resolve by declaration
        // order so plans are deterministic.
        let mut indegree: HashMap<&str, usize> = program
            .nodes()
            .iter()
            .map(|n| (n.id.as_str(), dependencies[&n.id].len()))
            .collect();
        let mut ready: BTreeSet<usize> = program
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| indegree[n.id.as_str()] == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(program.len());
        while let Some(index) = ready.pop_first() {
            let id = program.nodes()[index].id.clone();
            if let Some(consumers) = dependents.get(&id) {
                for consumer in consumers {
                    if let Some(remaining) = indegree.get_mut(consumer.as_str()) {
                        *remaining -= 1;
                        if *remaining == 0 {
                            ready.insert(decl_index[consumer.as_str()]);
                        }
                    }
                }
            }
            order.push(id);
        }

        if order.len() < program.len() {
            let remaining: HashSet<&str> = program
                .nodes()
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| !order.iter().any(|o| o == id))
                .collect();
            return Err(Error::Cycle {
                path: extract_cycle(program, &dependencies, &remaining),
            });
        }

        Ok(Self {
            order,
            dependencies,
            dependents,
        })
    }

    /// Node ids with every producer before all of its consumers.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Direct producers of a node, in first-reference order.
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct consumers of a node.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All nodes downstream of `id`, directly or transitively.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: Vec<&str> = self.dependents_of(id).iter().map(String::as_str).collect();
        let mut out = Vec::new();
        while let Some(current) = queue.pop() {
            if seen.insert(current) {
                out.push(current.to_string());
                queue.extend(self.dependents_of(current).iter().map(String::as_str));
            }
        }
        out
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Walk the unordered remainder of a failed toposort until a node repeats;
/// the slice between the two visits is a cycle.
fn extract_cycle(
    program: &Program,
    dependencies: &HashMap<String, Vec<String>>,
    remaining: &HashSet<&str>,
) -> Vec<String> {
    let start = program
        .nodes()
        .iter()
        .map(|n| n.id.as_str())
        .find(|id| remaining.contains(id))
        .unwrap_or_default();

    let mut path: Vec<&str> = Vec::new();
    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|p| *p == current) {
            return path[position..].iter().map(|s| (*s).to_string()).collect();
        }
        path.push(current);
        current = dependencies
            .get(current)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|dep| remaining.contains(dep))
            .unwrap_or(start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Input;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn empty_inputs() -> BTreeMap<String, Input> {
        BTreeMap::new()
    }

    #[test]
    fn test_topological_order_producers_first() {
        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", empty_inputs());
        let subnet = program.resource(
            "subnet",
            "sim:network/Subnet",
            BTreeMap::from([("vpc_id".into(), net.output("id"))]),
        );
        program.resource(
            "cluster",
            "sim:container/Cluster",
            BTreeMap::from([
                ("vpc_id".into(), net.output("id")),
                ("subnet_ids".into(), Input::list(vec![subnet.output("id")])),
            ]),
        );

        let graph = DependencyGraph::build(&program).unwrap();
        assert_eq!(graph.topological_order(), &["net", "subnet", "cluster"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let mut program = Program::new();
        program.resource("b-second", "sim:iam/Role", empty_inputs());
        program.resource("a-first", "sim:iam/Role", empty_inputs());

        let graph = DependencyGraph::build(&program).unwrap();
        // Declaration order, not lexicographic order.
        assert_eq!(graph.topological_order(), &["b-second", "a-first"]);
    }

    #[test]
    fn test_duplicate_id_is_a_declaration_error() {
        let mut program = Program::new();
        program.resource("net", "sim:network/Vpc", empty_inputs());
        program.resource("net", "sim:network/Vpc", empty_inputs());

        match DependencyGraph::build(&program) {
            Err(Error::DuplicateNode { id }) => assert_eq!(id, "net"),
            other => panic!("expected DuplicateNode, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_reference_is_a_declaration_error() {
        let mut program = Program::new();
        program.resource(
            "subnet",
            "sim:network/Subnet",
            BTreeMap::from([("vpc_id".into(), Input::reference("ghost", "id"))]),
        );

        match DependencyGraph::build(&program) {
            Err(Error::UnknownReference { node, reference }) => {
                assert_eq!(node, "subnet");
                assert_eq!(reference, "ghost");
            }
            other => panic!("expected UnknownReference, got {other:?}"),
        }
    }

    #[test]
    fn test_three_node_cycle_names_all_participants() {
        let mut program = Program::new();
        program.resource(
            "a",
            "sim:test/Thing",
            BTreeMap::from([("x".into(), Input::reference("c", "id"))]),
        );
        program.resource(
            "b",
            "sim:test/Thing",
            BTreeMap::from([("x".into(), Input::reference("a", "id"))]),
        );
        program.resource(
            "c",
            "sim:test/Thing",
            BTreeMap::from([("x".into(), Input::reference("b", "id"))]),
        );

        match DependencyGraph::build(&program) {
            Err(Error::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                for id in ["a", "b", "c"] {
                    assert!(path.iter().any(|p| p == id), "missing {id} in {path:?}");
                }
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut program = Program::new();
        program.resource(
            "loop",
            "sim:test/Thing",
            BTreeMap::from([("x".into(), Input::reference("loop", "id"))]),
        );

        match DependencyGraph::build(&program) {
            Err(Error::Cycle { path }) => assert_eq!(path, vec!["loop".to_string()]),
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_transitive_dependents() {
        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", empty_inputs());
        let subnet = program.resource(
            "subnet",
            "sim:network/Subnet",
            BTreeMap::from([("vpc_id".into(), net.output("id"))]),
        );
        program.resource(
            "cluster",
            "sim:container/Cluster",
            BTreeMap::from([("subnet_id".into(), subnet.output("id"))]),
        );
        program.resource("role", "sim:iam/Role", empty_inputs());

        let graph = DependencyGraph::build(&program).unwrap();
        let mut downstream = graph.transitive_dependents("net");
        downstream.sort();
        assert_eq!(downstream, vec!["cluster".to_string(), "subnet".to_string()]);
        assert!(graph.transitive_dependents("role").is_empty());
    }

    #[test]
    fn test_duplicate_references_create_one_edge() {
        let mut program = Program::new();
        let net = program.resource("net", "sim:network/Vpc", empty_inputs());
        program.resource(
            "sg",
            "sim:network/SecurityGroup",
            BTreeMap::from([
                ("vpc_id".into(), net.output("id")),
                ("description_vpc".into(), net.output("id")),
            ]),
        );

        let graph = DependencyGraph::build(&program).unwrap();
        assert_eq!(graph.dependencies_of("sg"), &["net"]);
        assert_eq!(graph.dependents_of("net"), &["sg"]);
    }

    #[test]
    fn test_json_literal_inputs_create_no_edges() {
        let mut program = Program::new();
        program.resource(
            "role",
            "sim:iam/Role",
            BTreeMap::from([("tags".into(), Input::value(json!({"team": "platform"})))]),
        );

        let graph = DependencyGraph::build(&program).unwrap();
        assert!(graph.dependencies_of("role").is_empty());
    }
}
