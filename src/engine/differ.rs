//! Changeset display

use colored::{ColoredString, Colorize};
use serde_json::Value;
use stackgraph::{ChangeSet, DiffSummary, Operation, OperationKind, PlannedValue};

use crate::ui;

const VALUE_WIDTH: usize = 60;

/// Colored plan symbol for an operation kind, right-aligned to 3 columns
pub fn symbol(kind: OperationKind) -> ColoredString {
    let padded = format!("{:>3}", kind.symbol());
    match kind {
        OperationKind::Create => padded.green(),
        OperationKind::Update => padded.yellow(),
        OperationKind::Replace => padded.magenta(),
        OperationKind::Delete => padded.red(),
        OperationKind::NoOp => padded.dimmed(),
    }
}

/// One-line rendering of a JSON value
pub fn format_value(value: &Value) -> String {
    ui::truncate(&value.to_string(), VALUE_WIDTH)
}

fn format_planned(value: Option<&PlannedValue>) -> String {
    match value {
        Some(PlannedValue::Known(v)) => format_value(v),
        Some(PlannedValue::Pending) => "(known after apply)".to_string(),
        None => "(removed)".to_string(),
    }
}

/// Attribute lines for one operation
fn attribute_lines(op: &Operation) -> Vec<String> {
    match op.kind {
        OperationKind::Create => op
            .after
            .iter()
            .flatten()
            .map(|(name, value)| format!("{name}: {}", format_planned(Some(value))))
            .collect(),
        OperationKind::Update | OperationKind::Replace => op
            .changed
            .iter()
            .map(|name| {
                let before = op
                    .before
                    .as_ref()
                    .and_then(|b| b.get(name))
                    .map_or_else(|| "(none)".to_string(), format_value);
                let after = format_planned(op.after.as_ref().and_then(|a| a.get(name)));
                format!("{name}: {before} → {after}")
            })
            .collect(),
        OperationKind::Delete | OperationKind::NoOp => Vec::new(),
    }
}

/// Display a changeset in a user-friendly format
///
/// Unchanged nodes are listed only when `show_unchanged` is set.
pub fn display_changeset(changes: &ChangeSet, show_unchanged: bool) {
    let summary = changes.summary();

    if !summary.has_changes() && !show_unchanged {
        println!();
        println!(
            "  {} No changes. {} up to date.",
            "✓".green(),
            ui::count(summary.unchanged, "resource")
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Plan".bold()
    );
    println!("│");

    for op in changes {
        if op.kind == OperationKind::NoOp && !show_unchanged {
            continue;
        }

        let label = match (&op.kind, &op.deposed) {
            (OperationKind::Replace, _) => format!("({}, kind changed)", op.resource_kind),
            (_, Some(deposed)) => format!(
                "({}, replaced {})",
                op.resource_kind, deposed.provider_id
            ),
            _ => format!("({})", op.resource_kind),
        };
        println!(
            "│ {} {} {}",
            symbol(op.kind),
            format!("{:<30}", op.node_id).bold(),
            label.dimmed()
        );

        for line in attribute_lines(op) {
            println!("│       {}", line.dimmed());
        }
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!("│ {}", summary_line(&summary));
    println!("└─────────────────────────────────────────────────────┘");
}

/// "Plan: 1 to create, 2 to update, 0 to replace, 1 to delete"
pub fn summary_line(summary: &DiffSummary) -> String {
    format!(
        "Plan: {} to create, {} to update, {} to replace, {} to delete",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replaces.to_string().magenta(),
        summary.deletes.to_string().red()
    )
}
