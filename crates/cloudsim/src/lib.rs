//! # Cloudsim
//!
//! An in-process cloud provider simulator.
//!
//! Cloudsim implements the engine's [`Provider`] interface for the resource
//! kinds a network-and-cluster stack needs: virtual networks, subnets,
//! route tables, security groups, identity roles, policy attachments,
//! managed clusters and managed node pools. Physical ids are minted
//! deterministically and outputs (endpoints, credential bundles) are pure
//! functions of id and inputs, so runs are reproducible.
//!
//! The catalog can persist to a JSON file so separate invocations converge
//! against the same simulated cloud, or stay in memory for tests.
//!
//! ## Example
//!
//! ```ignore
//! use cloudsim::SimCloud;
//! use reconcile::ProviderRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("sim", Arc::new(SimCloud::open("/tmp/cloud.json")?));
//! ```

mod catalog;
mod error;
mod kinds;

pub use catalog::{Catalog, SimResource};
pub use error::{Error, Result};
pub use kinds::KindSpec;

use reconcile::{Created, Provider};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// The simulated cloud: a catalog of live resources behind the engine's
/// provider interface.
pub struct SimCloud {
    catalog: Mutex<Catalog>,
    path: Option<PathBuf>,
}

impl SimCloud {
    /// A purely in-memory cloud (state dies with the process).
    pub fn new() -> Self {
        Self {
            catalog: Mutex::new(Catalog::default()),
            path: None,
        }
    }

    /// A cloud persisted at `path`, loaded if it already exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let catalog = Catalog::load(&path)?;
        Ok(Self {
            catalog: Mutex::new(catalog),
            path: Some(path),
        })
    }

    /// Number of live resources in the catalog.
    pub fn resource_count(&self) -> usize {
        let catalog = self.catalog.lock().unwrap_or_else(|p| p.into_inner());
        catalog.resources.len()
    }

    /// Snapshot one resource by physical id.
    pub fn resource(&self, physical_id: &str) -> Option<SimResource> {
        let catalog = self.catalog.lock().unwrap_or_else(|p| p.into_inner());
        catalog.resources.get(physical_id).cloned()
    }

    fn persist(&self, catalog: &Catalog) -> Result<()> {
        if let Some(path) = &self.path {
            catalog.save(path)?;
        }
        Ok(())
    }
}

impl Default for SimCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SimCloud {
    fn create(
        &self,
        type_token: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Created> {
        let spec = kinds::spec(type_token)?;
        kinds::validate_inputs(spec, inputs)?;

        let mut catalog = self.catalog.lock().unwrap_or_else(|p| p.into_inner());
        let physical_id = catalog.mint_id(spec.id_prefix);
        let outputs = kinds::outputs_for(spec, &physical_id, inputs);
        catalog.insert(SimResource {
            physical_id: physical_id.clone(),
            type_token: type_token.to_string(),
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        });
        self.persist(&catalog)?;
        log::debug!("created {type_token} as {physical_id}");

        Ok(Created {
            physical_id,
            outputs,
        })
    }

    fn update(
        &self,
        physical_id: &str,
        type_token: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> anyhow::Result<BTreeMap<String, Value>> {
        let spec = kinds::spec(type_token)?;
        kinds::validate_inputs(spec, inputs)?;

        let mut catalog = self.catalog.lock().unwrap_or_else(|p| p.into_inner());
        catalog.get(physical_id)?;
        let outputs = kinds::outputs_for(spec, physical_id, inputs);
        catalog.insert(SimResource {
            physical_id: physical_id.to_string(),
            type_token: type_token.to_string(),
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        });
        self.persist(&catalog)?;
        log::debug!("updated {type_token} {physical_id}");

        Ok(outputs)
    }

    fn delete(&self, physical_id: &str, type_token: &str) -> anyhow::Result<()> {
        let mut catalog = self.catalog.lock().unwrap_or_else(|p| p.into_inner());
        catalog.remove(physical_id)?;
        self.persist(&catalog)?;
        log::debug!("deleted {type_token} {physical_id}");
        Ok(())
    }

    fn replace_triggers(&self, type_token: &str) -> Vec<String> {
        kinds::spec(type_token)
            .map(|s| s.replace_triggers.iter().map(|t| (*t).to_string()).collect())
            .unwrap_or_default()
    }
}
