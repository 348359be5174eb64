//! Up command - converge the stack to its declared state.

use crate::cli::UpArgs;
use crate::config::MaestroConfig;
use crate::{Context, progress, stack, ui};
use anyhow::Result;
use colored::Colorize;
use indicatif::ProgressBar;
use reconcile::{
    ApplyOptions, DependencyGraph, FileStateStore, NodeStatus, Operation, ProgressSink, RunReport,
};

use super::preview::display_plan;

/// Progress sink feeding the apply bar.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarSink {
    fn operation_finished(&self, node_id: &str, _op: Operation, status: NodeStatus) {
        let symbol = match status {
            NodeStatus::Applied => "✓",
            NodeStatus::Failed => "✗",
            NodeStatus::Skipped => "⊘",
            _ => "·",
        };
        self.bar.set_message(format!("{symbol} {node_id}"));
        self.bar.inc(1);
    }
}

pub fn run(ctx: &Context, config: &MaestroConfig, args: &UpArgs) -> Result<()> {
    ui::header(&format!("Converging Stack: {}", config.stack.name));

    let program = stack::build_program(config);
    let graph = DependencyGraph::build(&program)?;
    let registry = super::provider_registry(config)?;
    let store = FileStateStore::open_locked(config.state_path())?;

    let plan = reconcile::plan(&program, &graph, &store, &registry)?;
    display_plan(&plan, ctx);

    if plan.is_all_noop() {
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    println!();
    let sink = BarSink::new(progress::bar(plan.steps.len() as u64, "Applying"));
    let opts = ApplyOptions {
        jobs: args.jobs,
        cancel: None,
    };
    let report = reconcile::apply(&program, &graph, &plan, &store, &registry, &opts, &sink)?;
    sink.finish();

    display_outcomes(&report, ctx);
    display_summary(&report);
    super::display_exports(&report.exports, args.show_secrets);

    if !report.is_success() {
        anyhow::bail!("{} operations failed", report.summary.failed);
    }
    Ok(())
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Per-node operation results - partial success must be diagnosable.
pub fn display_outcomes(report: &RunReport, ctx: &Context) {
    for outcome in &report.outcomes {
        if outcome.op == Operation::NoOp && ctx.verbose == 0 {
            continue;
        }
        let symbol = match outcome.status {
            NodeStatus::Applied if outcome.op == Operation::NoOp => "○".dimmed(),
            NodeStatus::Applied => "✓".green(),
            NodeStatus::Failed => "✗".red(),
            NodeStatus::Skipped => "⊘".yellow(),
            _ => "·".dimmed(),
        };
        println!(
            "  {} {:<28} {}",
            symbol,
            outcome.node_id,
            outcome.op.to_string().dimmed()
        );
        if let Some(error) = &outcome.error {
            ui::dim(&format!("    {error}"));
        }
    }
}

pub fn display_summary(report: &RunReport) {
    let summary = &report.summary;
    println!();
    if summary.is_success() {
        println!("  {} Stack converged", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
