//! `stackplan apply` and `stackplan destroy`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use stackgraph::ResourceGraph;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ExecuteOptions};
use crate::provider;
use crate::signal;
use crate::stack;

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let graph = stack::load_graph(&ctx.stack_path())?;
    run(ctx, &graph, args, "apply")
}

/// Destroy is apply against an empty stack
pub fn destroy(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    run(ctx, &ResourceGraph::default(), args, "destroy")
}

fn run(ctx: &Context, graph: &ResourceGraph, args: &ApplyArgs, operation: &str) -> Result<()> {
    let store = ctx.state_store()?;
    let provider = provider::from_settings(&ctx.settings)?;

    let lock = store.lock(operation)?;
    let snapshot = store.load()?;
    let changes = stackgraph::plan(graph, &snapshot).context("Planning failed")?;
    let has_changes = changes.has_changes();

    if !ctx.quiet {
        engine::display_changeset(&changes, ctx.verbose > 0);
    }

    if has_changes && !args.yes {
        println!();
        let prompt = if operation == "destroy" {
            "Destroy these resources?"
        } else {
            "Apply these changes?"
        };
        if !engine::confirm_proceed(prompt)? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(());
        }
    }

    let opts = ExecuteOptions {
        jobs: ctx.settings.jobs(args.jobs),
        verbose: ctx.verbose > 0,
        // Without changes the run only refreshes recorded dependencies
        quiet: ctx.quiet || !has_changes,
    };
    let cancel = signal::cancel_on_interrupt();
    let original = snapshot.clone();

    let mut report = engine::execute(changes, graph, snapshot, provider.as_ref(), &opts, cancel);

    // Save whatever succeeded, even when the run stopped early
    if report.snapshot != original {
        store
            .save(&mut report.snapshot, &lock)
            .context("Failed to save state")?;
    }

    if has_changes && !ctx.quiet {
        engine::print_summary(&report);
    }

    if let Some(error) = report.error.take() {
        let completed = report.summary.total_changes();
        return Err(anyhow::Error::new(error).context(format!(
            "{operation} failed after {completed} completed changes; state saved, re-run to resume"
        )));
    }
    if report.cancelled {
        anyhow::bail!(
            "{operation} cancelled; {} operations not attempted, state saved",
            report.summary.skipped
        );
    }
    Ok(())
}
