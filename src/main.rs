mod cli;
mod commands;
mod config;
mod progress;
mod stack;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let config = config::MaestroConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Preview => commands::preview::run(&ctx, &config),
        Command::Up(args) => commands::up::run(&ctx, &config, &args),
        Command::Destroy(args) => commands::destroy::run(&ctx, &config, &args),
        Command::State => commands::state::run(&ctx, &config),
        Command::Outputs(args) => commands::outputs::run(&ctx, &config, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "maestro", &mut io::stdout());
            Ok(())
        }
    }
}
