//! Provider call interface - the engine's only contact with resource kinds.
//!
//! The engine stays agnostic to what a "network" or "cluster" actually is;
//! everything concrete lives behind this trait. Call timeouts are enforced
//! by implementations; a timed-out call is just a failed operation.

use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result as EngineResult};

/// Result of a successful create call.
#[derive(Debug, Clone)]
pub struct Created {
    /// Provider-assigned identifier of the new physical resource
    pub physical_id: String,
    /// Output properties published by the new resource
    pub outputs: BTreeMap<String, Value>,
}

/// A plugin that can materialize resources of some type family.
///
/// Inputs arrive fully resolved (no unresolved references). The engine
/// merges the returned `physical_id` into the outputs under `"id"` if the
/// provider did not publish it itself, so consumers can always reference
/// `handle.output("id")`.
pub trait Provider: Send + Sync {
    /// Create a new physical resource.
    fn create(&self, type_token: &str, inputs: &BTreeMap<String, Value>) -> Result<Created>;

    /// Update a physical resource in place, returning its new outputs.
    fn update(
        &self,
        physical_id: &str,
        type_token: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>>;

    /// Delete a physical resource.
    fn delete(&self, physical_id: &str, type_token: &str) -> Result<()>;

    /// Input properties whose change cannot be applied in place.
    ///
    /// A diff touching any of these forces a replacement (delete the old
    /// physical resource, then create a new one).
    fn replace_triggers(&self, _type_token: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Routes resource type tokens to registered providers.
///
/// A token has the shape `prefix:module/Kind`; routing is by prefix.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a type-token prefix.
    pub fn register(&mut self, prefix: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(prefix.into(), provider);
    }

    /// Look up the provider for a full type token.
    pub fn for_type(&self, type_token: &str) -> EngineResult<Arc<dyn Provider>> {
        let prefix = type_token.split(':').next().unwrap_or(type_token);
        self.providers
            .get(prefix)
            .cloned()
            .ok_or_else(|| Error::UnknownType {
                type_token: type_token.to_string(),
            })
    }

    /// Replace triggers for a type token, resolved through its provider.
    pub fn replace_triggers(&self, type_token: &str) -> EngineResult<Vec<String>> {
        Ok(self.for_type(type_token)?.replace_triggers(type_token))
    }
}
