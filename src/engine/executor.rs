//! Apply driver - stackgraph executor with UI integration

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use stackgraph::{
    ApplyOptions, ApplyReport, ApplyResult, ApplySummary, CancelToken, ChangeSet, Operation,
    ProgressCallback, Provisioner, ResourceGraph, StateSnapshot,
};

use super::differ::symbol;

/// Options for a CLI apply run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of parallel provider calls
    pub jobs: usize,
    /// List every operation as it finishes
    pub verbose: bool,
    /// Hide the progress bar
    pub quiet: bool,
}

/// Progress bar fed by the executor
pub struct BarProgress {
    pb: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        Self { pb, verbose }
    }
}

impl ProgressCallback for BarProgress {
    fn on_start(&mut self, total: usize) {
        self.pb.set_length(total as u64);
    }

    fn on_operation_start(&mut self, op: &Operation) {
        self.pb
            .set_message(format!("{} {}", op.kind, op.node_id));
    }

    fn on_operation_complete(&mut self, op: &Operation, result: &ApplyResult) {
        self.pb.inc(1);

        let mark = match result {
            ApplyResult::NoChange => "○".dimmed(),
            ApplyResult::Failed { .. } => "✗".red(),
            _ => "✓".green(),
        };
        let line = match result {
            ApplyResult::Failed { error } => {
                format!("  {mark} {} {}  {}", symbol(op.kind), op.node_id, error.red())
            }
            ApplyResult::NoChange if !self.verbose => return,
            ApplyResult::Retained => format!(
                "  {mark} {} {} {}",
                symbol(op.kind),
                op.node_id,
                "(retained, left running)".dimmed()
            ),
            _ => format!("  {mark} {} {}", symbol(op.kind), op.node_id),
        };
        self.pb.suspend(|| println!("{line}"));
    }

    fn on_finish(&mut self, _summary: &ApplySummary) {
        self.pb.finish_and_clear();
    }
}

/// Confirm with user
pub fn confirm_proceed(prompt: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Run the executor with a progress bar
pub fn execute(
    changes: ChangeSet,
    graph: &ResourceGraph,
    snapshot: StateSnapshot,
    provider: &dyn Provisioner,
    opts: &ExecuteOptions,
    cancel: CancelToken,
) -> ApplyReport {
    let mut progress = BarProgress::new(opts.quiet, opts.verbose);
    let apply_opts = ApplyOptions {
        jobs: opts.jobs,
        cancel,
    };

    if !opts.quiet {
        println!();
        println!(
            "  {} Applying {} operations...",
            "→".cyan(),
            changes.summary().total()
        );
    }

    stackgraph::apply(changes, graph, snapshot, provider, &apply_opts, &mut progress)
}

/// Print final summary
pub fn print_summary(report: &ApplyReport) {
    let summary = &report.summary;

    println!();
    if report.is_success() {
        println!("  {} Apply complete!", "✓".green().bold());
    } else if report.cancelled {
        println!("  {} Apply cancelled", "⚠".yellow().bold());
    } else {
        println!("  {} Apply stopped on error", "✗".red().bold());
    }

    let lines = [
        (summary.created, "created"),
        (summary.modified, "updated"),
        (summary.replaced, "replaced"),
        (summary.removed, "deleted"),
        (summary.retained, "retained (removed from state only)"),
    ];
    for (n, what) in lines {
        if n > 0 {
            println!("    • {n} {what}");
        }
    }
    if summary.skipped > 0 {
        println!("    • {} not attempted", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}
