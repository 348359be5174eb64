//! Stack configuration - maestro.toml
//!
//! Parameters of the declared topology (cidr blocks, instance sizing) and
//! where the stack keeps its state. Looked up in the current directory
//! first, then under the user config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaestroConfig {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Stack identity and state placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack name, prefixed onto every logical resource id
    #[serde(default = "default_stack_name")]
    pub name: String,
    /// Directory holding state and the simulated cloud catalog
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_stack_name() -> String {
    "dev".to_string()
}

fn default_state_dir() -> String {
    ".maestro".to_string()
}

/// Network topology parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_cidr_block")]
    pub cidr_block: String,
    #[serde(default = "default_subnet_cidrs")]
    pub subnet_cidrs: Vec<String>,
    #[serde(default = "default_true")]
    pub map_public_ip: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr_block: default_cidr_block(),
            subnet_cidrs: default_subnet_cidrs(),
            map_public_ip: default_true(),
        }
    }
}

fn default_cidr_block() -> String {
    "10.0.0.0/16".to_string()
}

fn default_subnet_cidrs() -> Vec<String> {
    vec!["10.0.1.0/24".to_string()]
}

fn default_true() -> bool {
    true
}

/// Managed cluster and node pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_desired_capacity")]
    pub desired_capacity: u32,
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            instance_type: default_instance_type(),
            desired_capacity: default_desired_capacity(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

fn default_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_desired_capacity() -> u32 {
    1
}

fn default_min_size() -> u32 {
    1
}

fn default_max_size() -> u32 {
    2
}

impl MaestroConfig {
    /// Load configuration.
    ///
    /// Resolution order: an explicit `--config` path, `./maestro.toml`,
    /// then `~/.config/maestro/maestro.toml`. Defaults apply when no file
    /// is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }

        let local = PathBuf::from("maestro.toml");
        if local.exists() {
            return Self::read(&local);
        }

        if let Some(home_config) = Self::user_config_path()
            && home_config.exists()
        {
            return Self::read(&home_config);
        }

        log::debug!("no maestro.toml found, using defaults");
        Ok(Self::default())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("maestro").join("maestro.toml"))
    }

    /// Expanded state directory.
    pub fn state_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.stack.state_dir);
        PathBuf::from(expanded.as_ref())
    }

    /// Path of the stack's state file.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.json", self.stack.name))
    }

    /// Path of the simulated cloud's catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.state_dir().join("cloudsim.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_free_tier_stack() {
        let config = MaestroConfig::default();
        assert_eq!(config.stack.name, "dev");
        assert_eq!(config.network.cidr_block, "10.0.0.0/16");
        assert_eq!(config.network.subnet_cidrs, vec!["10.0.1.0/24".to_string()]);
        assert!(config.network.map_public_ip);
        assert_eq!(config.cluster.instance_type, "t3.micro");
        assert_eq!(config.cluster.desired_capacity, 1);
        assert_eq!(config.cluster.max_size, 2);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: MaestroConfig = toml::from_str(
            r#"
            [stack]
            name = "staging"

            [cluster]
            desired_capacity = 3
            max_size = 5
            "#,
        )
        .unwrap();

        assert_eq!(parsed.stack.name, "staging");
        assert_eq!(parsed.cluster.desired_capacity, 3);
        assert_eq!(parsed.cluster.max_size, 5);
        // Untouched sections keep their defaults.
        assert_eq!(parsed.cluster.instance_type, "t3.micro");
        assert_eq!(parsed.network.cidr_block, "10.0.0.0/16");
    }

    #[test]
    fn test_state_paths_derive_from_stack_name() {
        let mut config = MaestroConfig::default();
        config.stack.name = "prod".to_string();
        config.stack.state_dir = "/tmp/maestro-state".to_string();

        assert_eq!(
            config.state_path(),
            PathBuf::from("/tmp/maestro-state/prod.json")
        );
        assert_eq!(
            config.catalog_path(),
            PathBuf::from("/tmp/maestro-state/cloudsim.json")
        );
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[stack]\nname = \"custom\"\n").unwrap();

        let config = MaestroConfig::load(Some(&path)).unwrap();
        assert_eq!(config.stack.name, "custom");
    }
}
