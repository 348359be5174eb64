//! Outputs command - re-resolve exports from persisted state.

use crate::cli::OutputsArgs;
use crate::config::MaestroConfig;
use crate::{Context, stack, ui};
use anyhow::Result;
use reconcile::{FileStateStore, StateStore, resolve_from_records};

pub fn run(_ctx: &Context, config: &MaestroConfig, args: &OutputsArgs) -> Result<()> {
    ui::header(&format!("Stack Outputs: {}", config.stack.name));

    let store = FileStateStore::open(config.state_path());
    let records = store.load()?;
    if records.is_empty() {
        println!();
        ui::info("No state recorded - run 'maestro up' first");
        return Ok(());
    }

    let program = stack::build_program(config);
    let exports = resolve_from_records(&program, &records);
    super::display_exports(&exports, args.show_secrets);

    if !exports.is_complete() {
        println!();
        ui::warn("Some exports are unresolved; their producers have not applied");
    }
    exports.require_all()?;
    Ok(())
}
