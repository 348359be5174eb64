//! Declared input values and content hashing.
//!
//! An input property is a tree: literal JSON values with [`OutputRef`]s
//! embedded at any depth (a list of subnet ids, for example, where each
//! element references another node's output). Scanning that tree yields the
//! dependency edges; substituting the references yields the concrete value
//! handed to a provider.

use crate::cell::OutputRef;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single declared input property.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A literal value known at declaration time
    Value(Value),
    /// A reference to another node's output, resolved during execution
    Ref(OutputRef),
    /// A list whose elements may themselves contain references
    List(Vec<Input>),
    /// A map whose values may themselves contain references
    Map(BTreeMap<String, Input>),
}

impl Input {
    /// Construct a literal input.
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }

    /// Construct a reference input.
    pub fn reference(node: impl Into<String>, property: impl Into<String>) -> Self {
        Self::Ref(OutputRef::new(node, property))
    }

    /// Construct a list input.
    pub fn list(items: Vec<Input>) -> Self {
        Self::List(items)
    }

    /// Collect every output reference embedded in this input.
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a OutputRef>) {
        match self {
            Self::Value(_) => {}
            Self::Ref(r) => out.push(r),
            Self::List(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            Self::Map(entries) => {
                for item in entries.values() {
                    item.collect_refs(out);
                }
            }
        }
    }

    /// Substitute every reference, failing on the first unresolved one.
    ///
    /// Used at dispatch time, when the graph guarantees all producers have
    /// already committed.
    pub fn resolve(
        &self,
        lookup: &dyn Fn(&OutputRef) -> Option<Value>,
    ) -> std::result::Result<Value, OutputRef> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Ref(r) => lookup(r).ok_or_else(|| r.clone()),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.resolve(lookup)?);
                }
                Ok(Value::Array(out))
            }
            Self::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, item) in entries {
                    out.insert(key.clone(), item.resolve(lookup)?);
                }
                Ok(Value::Object(out))
            }
        }
    }

    /// Substitute references best-effort, leaving a deferred marker where
    /// the producer has not run in this pass.
    ///
    /// Used at plan time. The marker is stable for a given reference, so an
    /// unchanged declaration hashes identically across passes. Deferred
    /// references are collected into `deferred`.
    pub fn predict(
        &self,
        lookup: &dyn Fn(&OutputRef) -> Option<Value>,
        deferred: &mut Vec<OutputRef>,
    ) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Ref(r) => lookup(r).unwrap_or_else(|| {
                deferred.push(r.clone());
                Value::String(format!("<deferred {r}>"))
            }),
            Self::List(items) => {
                Value::Array(items.iter().map(|i| i.predict(lookup, deferred)).collect())
            }
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, i)| (k.clone(), i.predict(lookup, deferred)))
                    .collect(),
            ),
        }
    }
}

impl From<OutputRef> for Input {
    fn from(r: OutputRef) -> Self {
        Self::Ref(r)
    }
}

/// Hash a single JSON value (BLAKE3 over its canonical serialization).
pub fn hash_value(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Hash a full property map.
///
/// Returns the whole-map hash plus one hash per property. The per-property
/// hashes let the planner attribute a change to specific properties when
/// classifying it as update-in-place or replacement.
pub fn hash_properties(props: &BTreeMap<String, Value>) -> (String, BTreeMap<String, String>) {
    let mut hasher = blake3::Hasher::new();
    let mut per_property = BTreeMap::new();
    for (name, value) in props {
        let value_hash = hash_value(value);
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value_hash.as_bytes());
        hasher.update(b"\n");
        per_property.insert(name.clone(), value_hash);
    }
    (hasher.finalize().to_hex().to_string(), per_property)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_refs_finds_nested_references() {
        let input = Input::list(vec![
            Input::reference("subnet-a", "id"),
            Input::value(json!("static")),
            Input::Map(BTreeMap::from([(
                "role".to_string(),
                Input::reference("role", "arn"),
            )])),
        ]);

        let mut refs = Vec::new();
        input.collect_refs(&mut refs);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].node, "subnet-a");
        assert_eq!(refs[1].node, "role");
    }

    #[test]
    fn test_resolve_fails_on_unresolved_reference() {
        let input = Input::reference("net", "id");
        let err = input.resolve(&|_| None).unwrap_err();
        assert_eq!(err, OutputRef::new("net", "id"));
    }

    #[test]
    fn test_resolve_substitutes_values() {
        let input = Input::list(vec![
            Input::reference("net", "id"),
            Input::value(json!(443)),
        ]);
        let resolved = input
            .resolve(&|r| (r.node == "net").then(|| json!("vpc-1")))
            .unwrap();
        assert_eq!(resolved, json!(["vpc-1", 443]));
    }

    #[test]
    fn test_predict_defers_unknown_producers() {
        let input = Input::reference("cluster", "endpoint");
        let mut deferred = Vec::new();
        let predicted = input.predict(&|_| None, &mut deferred);

        assert_eq!(predicted, json!("<deferred cluster.endpoint>"));
        assert_eq!(deferred, vec![OutputRef::new("cluster", "endpoint")]);
    }

    #[test]
    fn test_predict_is_stable_for_unchanged_declarations() {
        let input = Input::reference("cluster", "endpoint");
        let mut first_deferred = Vec::new();
        let mut second_deferred = Vec::new();
        let first = input.predict(&|_| None, &mut first_deferred);
        let second = input.predict(&|_| None, &mut second_deferred);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_properties_changes_with_values() {
        let a = BTreeMap::from([("cidr".to_string(), json!("10.0.0.0/16"))]);
        let b = BTreeMap::from([("cidr".to_string(), json!("10.1.0.0/16"))]);

        let (hash_a, props_a) = hash_properties(&a);
        let (hash_b, props_b) = hash_properties(&b);
        assert_ne!(hash_a, hash_b);
        assert_ne!(props_a["cidr"], props_b["cidr"]);
    }

    #[test]
    fn test_hash_properties_is_order_insensitive() {
        // BTreeMap iteration is sorted, so insertion order cannot leak into
        // the hash.
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), json!(1));
        a.insert("y".to_string(), json!(2));

        let mut b = BTreeMap::new();
        b.insert("y".to_string(), json!(2));
        b.insert("x".to_string(), json!(1));

        assert_eq!(hash_properties(&a).0, hash_properties(&b).0);
    }
}
