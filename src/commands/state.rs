//! State command - list the stack's persisted records.

use crate::config::MaestroConfig;
use crate::{Context, ui};
use anyhow::Result;
use colored::Colorize;
use reconcile::{FileStateStore, StateStore};

pub fn run(_ctx: &Context, config: &MaestroConfig) -> Result<()> {
    ui::header(&format!("Stack State: {}", config.stack.name));

    let store = FileStateStore::open(config.state_path());
    let mut records = store.load()?;

    if records.is_empty() {
        println!();
        ui::info("No state recorded - run 'maestro up' first");
        return Ok(());
    }

    records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    for record in &records {
        println!();
        println!(
            "  {} {}",
            record.node_id.bold(),
            record.type_token.dimmed()
        );
        ui::kv("physical id", &record.physical_id);
        ui::kv(
            "input hash",
            record.input_hash.get(..12).unwrap_or(&record.input_hash),
        );
        ui::kv(
            "applied",
            &record.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        if !record.dependencies.is_empty() {
            ui::kv("depends on", &record.dependencies.join(", "));
        }
    }

    println!();
    ui::success(&format!("{} resources tracked", records.len()));
    Ok(())
}
