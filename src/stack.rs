//! The declared stack - a network-and-cluster topology.
//!
//! This is the client program the engine consumes: pure declarations, no
//! control flow. Every ordering the stack needs is expressed as an output
//! reference, so the dependency graph is the single source of execution
//! order.

use crate::config::MaestroConfig;
use reconcile::{Input, Program};
use serde_json::json;
use std::collections::BTreeMap;

/// Export names whose values are credentials and get masked by default.
pub const SECRET_EXPORTS: &[&str] = &["kubeconfig"];

/// Declare the stack described by the configuration.
pub fn build_program(config: &MaestroConfig) -> Program {
    let name = &config.stack.name;
    let mut program = Program::new();

    let vpc = program.resource(
        format!("{name}-vpc"),
        "sim:network/Vpc",
        BTreeMap::from([
            (
                "cidr_block".to_string(),
                Input::value(json!(config.network.cidr_block)),
            ),
            ("enable_dns_support".to_string(), Input::value(json!(true))),
            (
                "enable_dns_hostnames".to_string(),
                Input::value(json!(true)),
            ),
        ]),
    );

    let mut subnets = Vec::new();
    for (index, cidr) in config.network.subnet_cidrs.iter().enumerate() {
        let subnet = program.resource(
            format!("{name}-subnet-{index}"),
            "sim:network/Subnet",
            BTreeMap::from([
                ("vpc_id".to_string(), vpc.output("id")),
                ("cidr_block".to_string(), Input::value(json!(cidr))),
                (
                    "map_public_ip_on_launch".to_string(),
                    Input::value(json!(config.network.map_public_ip)),
                ),
            ]),
        );
        subnets.push(subnet);
    }

    program.resource(
        format!("{name}-routes"),
        "sim:network/RouteTable",
        BTreeMap::from([
            ("vpc_id".to_string(), vpc.output("id")),
            (
                "default_route".to_string(),
                Input::value(json!("0.0.0.0/0")),
            ),
        ]),
    );

    let role = program.resource(
        format!("{name}-cluster-role"),
        "sim:iam/Role",
        BTreeMap::from([
            (
                "name".to_string(),
                Input::value(json!(format!("{name}-cluster-role"))),
            ),
            (
                "assume_role_service".to_string(),
                Input::value(json!("cluster.sim.local")),
            ),
        ]),
    );

    let cluster_policy = program.resource(
        format!("{name}-cluster-policy"),
        "sim:iam/RolePolicyAttachment",
        BTreeMap::from([
            ("role_id".to_string(), role.output("id")),
            (
                "policy_arn".to_string(),
                Input::value(json!("sim:iam:policy/ClusterPolicy")),
            ),
        ]),
    );
    let service_policy = program.resource(
        format!("{name}-service-policy"),
        "sim:iam/RolePolicyAttachment",
        BTreeMap::from([
            ("role_id".to_string(), role.output("id")),
            (
                "policy_arn".to_string(),
                Input::value(json!("sim:iam:policy/ServicePolicy")),
            ),
        ]),
    );

    let security_group = program.resource(
        format!("{name}-cluster-sg"),
        "sim:network/SecurityGroup",
        BTreeMap::from([
            ("vpc_id".to_string(), vpc.output("id")),
            (
                "ingress".to_string(),
                Input::value(json!([{
                    "protocol": "tcp",
                    "port": 443,
                    "cidr": config.network.cidr_block,
                }])),
            ),
        ]),
    );

    let cluster = program.resource(
        format!("{name}-cluster"),
        "sim:container/Cluster",
        BTreeMap::from([
            (
                "name".to_string(),
                Input::value(json!(format!("{name}-cluster"))),
            ),
            ("vpc_id".to_string(), vpc.output("id")),
            (
                "subnet_ids".to_string(),
                Input::list(subnets.iter().map(|s| s.output("id")).collect()),
            ),
            ("role_id".to_string(), role.output("id")),
            ("security_group_id".to_string(), security_group.output("id")),
            // The control plane needs the role's policies in place; the
            // references make that ordering part of the graph.
            (
                "policy_attachments".to_string(),
                Input::list(vec![cluster_policy.output("id"), service_policy.output("id")]),
            ),
        ]),
    );

    program.resource(
        format!("{name}-nodes"),
        "sim:container/NodeGroup",
        BTreeMap::from([
            ("cluster_id".to_string(), cluster.output("id")),
            (
                "instance_type".to_string(),
                Input::value(json!(config.cluster.instance_type)),
            ),
            (
                "desired_capacity".to_string(),
                Input::value(json!(config.cluster.desired_capacity)),
            ),
            (
                "min_size".to_string(),
                Input::value(json!(config.cluster.min_size)),
            ),
            (
                "max_size".to_string(),
                Input::value(json!(config.cluster.max_size)),
            ),
        ]),
    );

    program.export("vpc_id", vpc.output("id"));
    program.export(
        "subnet_ids",
        Input::list(subnets.iter().map(|s| s.output("id")).collect()),
    );
    program.export("cluster_endpoint", cluster.output("endpoint"));
    program.export("kubeconfig", cluster.output("kubeconfig"));

    program
}
