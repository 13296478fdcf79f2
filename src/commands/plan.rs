//! `stackplan plan`

use anyhow::{Context as AnyhowContext, Result};

use crate::Context;
use crate::cli::PlanArgs;
use crate::engine;
use crate::stack;
use crate::ui;

/// Exit code for `--detailed-exitcode` when there are changes
const EXIT_CHANGES: i32 = 2;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let graph = stack::load_graph(&ctx.stack_path())?;
    let store = ctx.state_store()?;

    if let Some(info) = store.lock_info()? {
        ui::warn(&format!(
            "State is locked by pid {} ({}); the plan may be out of date",
            info.pid, info.operation
        ));
    }

    let snapshot = store.load()?;
    let changes = stackgraph::plan(&graph, &snapshot).context("Planning failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else if !ctx.quiet || changes.has_changes() {
        engine::display_changeset(&changes, args.all || ctx.verbose > 0);
    }

    if args.detailed_exitcode && changes.has_changes() {
        std::process::exit(EXIT_CHANGES);
    }
    Ok(())
}
