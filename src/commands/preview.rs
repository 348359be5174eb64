//! Preview command - plan without applying.

use crate::config::MaestroConfig;
use crate::{Context, stack, ui};
use anyhow::Result;
use colored::Colorize;
use reconcile::{DependencyGraph, ExecutionPlan, FileStateStore, Operation};

pub fn run(ctx: &Context, config: &MaestroConfig) -> Result<()> {
    ui::header(&format!("Stack Preview: {}", config.stack.name));

    let program = stack::build_program(config);
    let graph = DependencyGraph::build(&program)?;
    let store = FileStateStore::open(config.state_path());
    let registry = super::provider_registry(config)?;

    let plan = reconcile::plan(&program, &graph, &store, &registry)?;
    display_plan(&plan, ctx);

    Ok(())
}

/// Display a plan's operations and a one-line summary.
pub fn display_plan(plan: &ExecutionPlan, ctx: &Context) {
    if plan.is_all_noop() {
        println!();
        println!("  {} No changes - stack matches declarations", "✓".green());
        return;
    }

    println!();
    for step in &plan.steps {
        if step.op == Operation::NoOp && ctx.verbose == 0 {
            continue;
        }
        let symbol = match step.op {
            Operation::Create => "+".green(),
            Operation::Update => "~".yellow(),
            Operation::Replace => "±".red(),
            Operation::Delete => "-".red(),
            Operation::NoOp => "○".dimmed(),
        };

        let mut detail = String::new();
        if !step.changed.is_empty() {
            detail = format!("({})", step.changed.join(", "));
        } else if !step.deferred.is_empty() && step.op == Operation::Create {
            detail = "(references resolve after producers apply)".to_string();
        }

        println!(
            "  {} {:<28} {} {}",
            symbol,
            step.node_id,
            step.type_token.dimmed(),
            detail.dimmed()
        );
    }

    println!();
    println!(
        "  Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged",
        plan.count(Operation::Create).to_string().green(),
        plan.count(Operation::Update).to_string().yellow(),
        plan.count(Operation::Replace).to_string().red(),
        plan.count(Operation::Delete).to_string().red(),
        plan.count(Operation::NoOp)
    );
}
