pub mod destroy;
pub mod outputs;
pub mod preview;
pub mod state;
pub mod up;

use crate::config::MaestroConfig;
use crate::stack;
use anyhow::{Context as AnyhowContext, Result};
use cloudsim::SimCloud;
use colored::Colorize;
use reconcile::{ExportSet, ProviderRegistry};
use serde_json::Value;
use std::sync::Arc;

/// Build the provider registry backed by the simulated cloud catalog.
pub fn provider_registry(config: &MaestroConfig) -> Result<ProviderRegistry> {
    let catalog = config.catalog_path();
    let cloud = SimCloud::open(&catalog)
        .with_context(|| format!("Could not open cloud catalog at {}", catalog.display()))?;

    let mut registry = ProviderRegistry::new();
    registry.register("sim", Arc::new(cloud));
    Ok(registry)
}

/// Print resolved exports, masking credentials unless asked not to.
pub fn display_exports(exports: &ExportSet, show_secrets: bool) {
    if exports.values.is_empty() && exports.unresolved.is_empty() {
        return;
    }

    crate::ui::section("Outputs");
    for (name, value) in &exports.values {
        if stack::SECRET_EXPORTS.contains(&name.as_str()) && !show_secrets {
            println!("  {}: {}", name.dimmed(), "(secret, pass --show-secrets)".dimmed());
            continue;
        }
        match value {
            Value::String(s) if s.contains('\n') => {
                println!("  {}:", name.dimmed());
                for line in s.lines() {
                    println!("    {line}");
                }
            }
            Value::String(s) => println!("  {}: {}", name.dimmed(), s),
            other => println!("  {}: {}", name.dimmed(), other),
        }
    }
    for missing in &exports.unresolved {
        println!(
            "  {}: {}",
            missing.name.dimmed(),
            format!("unresolved (producer: {})", missing.reference.node).yellow()
        );
    }
}
