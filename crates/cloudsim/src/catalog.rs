//! The simulated cloud's resource catalog.
//!
//! A catalog is the provider-side source of truth: every live simulated
//! resource, keyed by physical id, plus the sequence counter used to mint
//! new ids. It can live purely in memory (tests) or persist to a JSON file
//! so separate CLI invocations see the same cloud.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One live simulated resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimResource {
    pub physical_id: String,
    pub type_token: String,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
}

/// All live resources plus the id sequence counter.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub next_seq: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, SimResource>,
}

impl Catalog {
    /// Mint the next physical id for a prefix, e.g. `vpc-00000001`.
    pub fn mint_id(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        format!("{prefix}-{:08x}", self.next_seq)
    }

    pub fn get(&self, physical_id: &str) -> Result<&SimResource> {
        self.resources
            .get(physical_id)
            .ok_or_else(|| Error::NotFound {
                physical_id: physical_id.to_string(),
            })
    }

    pub fn insert(&mut self, resource: SimResource) {
        self.resources
            .insert(resource.physical_id.clone(), resource);
    }

    pub fn remove(&mut self, physical_id: &str) -> Result<SimResource> {
        self.resources
            .remove(physical_id)
            .ok_or_else(|| Error::NotFound {
                physical_id: physical_id.to_string(),
            })
    }

    /// Load a catalog from disk, or start empty if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("catalog {} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the catalog (temp file plus rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minted_ids_are_sequential_and_prefixed() {
        let mut catalog = Catalog::default();
        assert_eq!(catalog.mint_id("vpc"), "vpc-00000001");
        assert_eq!(catalog.mint_id("subnet"), "subnet-00000002");
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = Catalog::default();
        let id = catalog.mint_id("vpc");
        catalog.insert(SimResource {
            physical_id: id.clone(),
            type_token: "sim:network/Vpc".into(),
            inputs: BTreeMap::from([("cidr_block".to_string(), json!("10.0.0.0/16"))]),
            outputs: BTreeMap::new(),
        });
        catalog.save(&path).unwrap();

        let mut reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded.next_seq, 1);
        assert_eq!(reloaded.get(&id).unwrap().type_token, "sim:network/Vpc");
        // The counter keeps advancing after a reload, so ids never collide.
        assert_eq!(reloaded.mint_id("subnet"), "subnet-00000002");
    }

    #[test]
    fn test_remove_unknown_id_is_not_found() {
        let mut catalog = Catalog::default();
        assert!(matches!(
            catalog.remove("vpc-missing"),
            Err(Error::NotFound { .. })
        ));
    }
}
