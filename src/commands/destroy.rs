//! Destroy command - tear the whole stack down.
//!
//! Plans against an empty declaration set, so every persisted record
//! orphans and the engine deletes dependents ahead of their producers.

use crate::cli::DestroyArgs;
use crate::config::MaestroConfig;
use crate::{Context, progress, ui};
use anyhow::Result;
use colored::Colorize;
use reconcile::{ApplyOptions, DependencyGraph, FileStateStore, Program};

use super::preview::display_plan;
use super::up::{display_outcomes, display_summary};

pub fn run(ctx: &Context, config: &MaestroConfig, args: &DestroyArgs) -> Result<()> {
    ui::header(&format!("Destroying Stack: {}", config.stack.name));

    let program = Program::new();
    let graph = DependencyGraph::build(&program)?;
    let registry = super::provider_registry(config)?;
    let store = FileStateStore::open_locked(config.state_path())?;

    let plan = reconcile::plan(&program, &graph, &store, &registry)?;
    if plan.steps.is_empty() {
        println!();
        println!("  {} Nothing to destroy", "✓".green());
        return Ok(());
    }
    display_plan(&plan, ctx);

    if !args.yes && !confirm_destroy()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    println!();
    let sink = super::up::BarSink::new(progress::bar(plan.steps.len() as u64, "Destroying"));
    let opts = ApplyOptions {
        jobs: args.jobs,
        cancel: None,
    };
    let report = reconcile::apply(&program, &graph, &plan, &store, &registry, &opts, &sink)?;
    sink.finish();

    display_outcomes(&report, ctx);
    display_summary(&report);

    if !report.is_success() {
        anyhow::bail!("{} operations failed", report.summary.failed);
    }
    Ok(())
}

fn confirm_destroy() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Delete all of these resources?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}
