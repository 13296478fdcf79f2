mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod provider;
mod signal;
mod stack;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Settings;
use state::StateStore;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
    stack: Option<PathBuf>,
    state: Option<PathBuf>,
}

impl Context {
    /// Stack file, `--stack` first
    pub fn stack_path(&self) -> PathBuf {
        self.settings.stack_path(self.stack.as_deref())
    }

    /// Snapshot store, `--state` first
    pub fn state_store(&self) -> Result<StateStore> {
        Ok(StateStore::new(
            self.settings.state_path(self.state.as_deref())?,
        ))
    }
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

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "stackplan", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings: Settings::load()?,
        stack: cli.stack,
        state: cli.state,
    };

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Graph(args) => commands::graph::run(&ctx, &args),
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Apply(args) => commands::apply::apply(&ctx, &args),
        Command::Destroy(args) => commands::apply::destroy(&ctx, &args),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Completions { .. } => Ok(()),
    }
}
