//! `stackplan validate`

use anyhow::{Context as AnyhowContext, Result};

use crate::Context;
use crate::stack;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let path = ctx.stack_path();
    let graph = stack::load_graph(&path)?;
    stackgraph::schedule(&graph).with_context(|| format!("Invalid stack {}", path.display()))?;

    if !ctx.quiet {
        ui::success(&format!(
            "{} is valid: {}, {}",
            path.display(),
            ui::count(graph.len(), "resource"),
            ui::count(graph.edges().len(), "edge")
        ));
    }
    Ok(())
}
