//! The simulated resource kinds and their behavior.
//!
//! Each kind declares the inputs it requires, the physical id prefix it
//! mints, and which input changes force a replacement instead of an
//! in-place update. Outputs are deterministic functions of the physical id
//! and the inputs, so repeated runs produce identical values.

use crate::error::{Error, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Static description of one simulated resource kind.
pub struct KindSpec {
    pub type_token: &'static str,
    /// Prefix for minted physical ids, e.g. `vpc` -> `vpc-00000001`
    pub id_prefix: &'static str,
    pub required_inputs: &'static [&'static str],
    /// Inputs whose change cannot be applied in place
    pub replace_triggers: &'static [&'static str],
}

const KINDS: &[KindSpec] = &[
    KindSpec {
        type_token: "sim:network/Vpc",
        id_prefix: "vpc",
        required_inputs: &["cidr_block"],
        replace_triggers: &["cidr_block"],
    },
    KindSpec {
        type_token: "sim:network/Subnet",
        id_prefix: "subnet",
        required_inputs: &["vpc_id", "cidr_block"],
        replace_triggers: &["vpc_id", "cidr_block"],
    },
    KindSpec {
        type_token: "sim:network/RouteTable",
        id_prefix: "rtb",
        required_inputs: &["vpc_id"],
        replace_triggers: &["vpc_id"],
    },
    KindSpec {
        type_token: "sim:network/SecurityGroup",
        id_prefix: "sg",
        required_inputs: &["vpc_id"],
        replace_triggers: &["vpc_id"],
    },
    KindSpec {
        type_token: "sim:iam/Role",
        id_prefix: "role",
        required_inputs: &["name", "assume_role_service"],
        replace_triggers: &["name"],
    },
    KindSpec {
        // Attachments are immutable bindings; any change remakes them.
        type_token: "sim:iam/RolePolicyAttachment",
        id_prefix: "attach",
        required_inputs: &["role_id", "policy_arn"],
        replace_triggers: &["role_id", "policy_arn"],
    },
    KindSpec {
        type_token: "sim:container/Cluster",
        id_prefix: "cluster",
        required_inputs: &["name", "vpc_id", "subnet_ids", "role_id"],
        replace_triggers: &["name", "vpc_id"],
    },
    KindSpec {
        type_token: "sim:container/NodeGroup",
        id_prefix: "nodes",
        required_inputs: &["cluster_id", "instance_type"],
        replace_triggers: &["cluster_id", "instance_type"],
    },
];

/// Look up a kind spec by its full type token.
pub fn spec(type_token: &str) -> Result<&'static KindSpec> {
    KINDS
        .iter()
        .find(|k| k.type_token == type_token)
        .ok_or_else(|| Error::UnknownKind {
            type_token: type_token.to_string(),
        })
}

/// Check that every required input is present.
pub fn validate_inputs(spec: &KindSpec, inputs: &BTreeMap<String, Value>) -> Result<()> {
    for required in spec.required_inputs {
        if !inputs.contains_key(*required) {
            return Err(Error::MissingInput {
                type_token: spec.type_token.to_string(),
                property: (*required).to_string(),
            });
        }
    }
    Ok(())
}

/// Compute the outputs a resource publishes.
pub fn outputs_for(
    spec: &KindSpec,
    physical_id: &str,
    inputs: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut outputs = BTreeMap::from([
        ("id".to_string(), json!(physical_id)),
        ("arn".to_string(), json!(arn(spec, physical_id))),
    ]);

    match spec.type_token {
        "sim:network/Vpc" => {
            outputs.insert("cidr_block".into(), input_or_null(inputs, "cidr_block"));
        }
        "sim:network/Subnet" => {
            outputs.insert("cidr_block".into(), input_or_null(inputs, "cidr_block"));
            outputs.insert("vpc_id".into(), input_or_null(inputs, "vpc_id"));
            outputs.insert("availability_zone".into(), json!("local-1a"));
        }
        "sim:network/RouteTable" | "sim:network/SecurityGroup" => {
            outputs.insert("vpc_id".into(), input_or_null(inputs, "vpc_id"));
        }
        "sim:iam/Role" => {
            outputs.insert("name".into(), input_or_null(inputs, "name"));
        }
        "sim:container/Cluster" => {
            let endpoint = format!("https://{physical_id}.sim.cluster.local");
            let name = inputs
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(physical_id)
                .to_string();
            outputs.insert("endpoint".into(), json!(endpoint));
            outputs.insert("kubeconfig".into(), json!(kubeconfig(&name, &endpoint, physical_id)));
        }
        "sim:container/NodeGroup" => {
            outputs.insert("cluster_id".into(), input_or_null(inputs, "cluster_id"));
            outputs.insert("status".into(), json!("ACTIVE"));
        }
        _ => {}
    }

    outputs
}

fn input_or_null(inputs: &BTreeMap<String, Value>, property: &str) -> Value {
    inputs.get(property).cloned().unwrap_or(Value::Null)
}

fn arn(spec: &KindSpec, physical_id: &str) -> String {
    // sim:network/Vpc + vpc-00000001 -> sim:network:vpc/vpc-00000001
    let module = spec
        .type_token
        .split([':', '/'])
        .nth(1)
        .unwrap_or("unknown");
    format!("sim:{module}:{}/{physical_id}", spec.id_prefix)
}

/// A deterministic credential bundle for a simulated cluster.
fn kubeconfig(name: &str, endpoint: &str, physical_id: &str) -> String {
    format!(
        r"apiVersion: v1
kind: Config
clusters:
- name: {name}
  cluster:
    server: {endpoint}
contexts:
- name: {name}
  context:
    cluster: {name}
    user: {name}-admin
current-context: {name}
users:
- name: {name}-admin
  user:
    token: sim-token-{physical_id}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(spec("sim:storage/Bucket").is_err());
        assert!(spec("sim:network/Vpc").is_ok());
    }

    #[test]
    fn test_required_inputs_are_enforced() {
        let vpc = spec("sim:network/Vpc").unwrap();
        let err = validate_inputs(vpc, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("cidr_block"));

        let inputs = BTreeMap::from([("cidr_block".to_string(), json!("10.0.0.0/16"))]);
        assert!(validate_inputs(vpc, &inputs).is_ok());
    }

    #[test]
    fn test_cluster_outputs_carry_credentials() {
        let cluster = spec("sim:container/Cluster").unwrap();
        let inputs = BTreeMap::from([("name".to_string(), json!("demo"))]);
        let outputs = outputs_for(cluster, "cluster-00000007", &inputs);

        assert_eq!(outputs["id"], json!("cluster-00000007"));
        let endpoint = outputs["endpoint"].as_str().unwrap();
        assert!(endpoint.starts_with("https://cluster-00000007"));

        let kubeconfig = outputs["kubeconfig"].as_str().unwrap();
        assert!(kubeconfig.contains("apiVersion: v1"));
        assert!(kubeconfig.contains(endpoint));
        assert!(kubeconfig.contains("sim-token-cluster-00000007"));
    }

    #[test]
    fn test_outputs_are_deterministic() {
        let subnet = spec("sim:network/Subnet").unwrap();
        let inputs = BTreeMap::from([
            ("vpc_id".to_string(), json!("vpc-1")),
            ("cidr_block".to_string(), json!("10.0.1.0/24")),
        ]);
        assert_eq!(
            outputs_for(subnet, "subnet-1", &inputs),
            outputs_for(subnet, "subnet-1", &inputs)
        );
    }

    #[test]
    fn test_arn_shape() {
        let role = spec("sim:iam/Role").unwrap();
        let outputs = outputs_for(role, "role-00000001", &BTreeMap::new());
        assert_eq!(outputs["arn"], json!("sim:iam:role/role-00000001"));
    }
}
