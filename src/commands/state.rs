//! `stackplan state ...`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use stackgraph::{AppliedResource, StateSnapshot};

use crate::Context;
use crate::cli::StateCommand;
use crate::engine;
use crate::ui;

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::List => list(ctx),
        StateCommand::Show { id } => show(ctx, &id),
        StateCommand::Rm { id, yes } => rm(ctx, &id, yes),
        StateCommand::Unlock { yes } => unlock(ctx, yes),
    }
}

fn list(ctx: &Context) -> Result<()> {
    let store = ctx.state_store()?;
    let snapshot = store.load()?;

    if snapshot.is_empty() {
        ui::info(&format!("No resources recorded in {}", store.path().display()));
        return Ok(());
    }

    ui::header(&format!(
        "State serial {} ({})",
        snapshot.serial,
        ui::count(snapshot.len(), "resource")
    ));
    for (id, resource) in &snapshot.resources {
        println!(
            "  {:<24} {:<20} {}",
            id.bold(),
            resource.kind,
            resource.provider_id.dimmed()
        );
    }
    if !snapshot.deposed.is_empty() {
        println!();
        ui::warn(&format!(
            "{} awaiting deletion, run apply to finish",
            ui::count(snapshot.deposed.len(), "replaced resource")
        ));
        for deposed in &snapshot.deposed {
            println!(
                "  {:<24} {:<20} {}",
                deposed.node_id,
                deposed.kind,
                deposed.provider_id.dimmed()
            );
        }
    }
    Ok(())
}

fn show(ctx: &Context, id: &str) -> Result<()> {
    let snapshot = ctx.state_store()?.load()?;
    let resource = snapshot
        .get(id)
        .with_context(|| format!("No resource '{id}' in state"))?;

    ui::header(id);
    ui::kv("kind", &resource.kind);
    ui::kv("provider id", &resource.provider_id);
    ui::kv("applied at", &resource.applied_at.to_rfc3339());
    ui::kv("removal policy", &format!("{:?}", resource.removal_policy).to_lowercase());
    if !resource.dependencies.is_empty() {
        ui::kv("depends on", &resource.dependencies.join(", "));
    }
    print_attributes("inputs", resource);
    print_attributes("outputs", resource);
    Ok(())
}

fn print_attributes(which: &str, resource: &AppliedResource) {
    let attrs = if which == "inputs" {
        &resource.inputs
    } else {
        &resource.outputs
    };
    if attrs.is_empty() {
        return;
    }
    println!();
    println!("  {}", which.cyan());
    for (name, value) in attrs {
        println!("    {}: {}", name, engine::differ::format_value(value));
    }
}

/// Snapshot entries that still list `id` as a dependency
fn dependents_of<'a>(snapshot: &'a StateSnapshot, id: &str) -> Vec<&'a str> {
    snapshot
        .resources
        .iter()
        .filter(|(_, r)| r.dependencies.iter().any(|d| d == id))
        .map(|(other, _)| other.as_str())
        .collect()
}

fn rm(ctx: &Context, id: &str, yes: bool) -> Result<()> {
    let store = ctx.state_store()?;
    let lock = store.lock("state rm")?;
    let mut snapshot = store.load()?;

    let Some(resource) = snapshot.get(id) else {
        anyhow::bail!("No resource '{id}' in state");
    };
    ui::warn(&format!(
        "{} ({}) will be forgotten but keeps running",
        id, resource.provider_id
    ));
    let dependents = dependents_of(&snapshot, id);
    if !dependents.is_empty() {
        ui::warn(&format!("Still depended on by: {}", dependents.join(", ")));
    }

    if !yes && !engine::confirm_proceed("Remove from state?")? {
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    snapshot.remove(id);
    store.save(&mut snapshot, &lock).context("Failed to save state")?;
    ui::success(&format!("Removed {id} from state"));
    Ok(())
}

fn unlock(ctx: &Context, yes: bool) -> Result<()> {
    let store = ctx.state_store()?;

    let Some(info) = store.lock_info()? else {
        ui::info("State is not locked");
        return Ok(());
    };
    ui::kv("held by pid", &info.pid.to_string());
    ui::kv("operation", &info.operation);
    ui::kv("since", &info.created_at.to_rfc3339());

    if !yes && !engine::confirm_proceed("Release this lock?")? {
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    if store.force_unlock()? {
        ui::success("Lock released");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stackgraph::{Attributes, RemovalPolicy};

    fn applied(deps: &[&str]) -> AppliedResource {
        AppliedResource {
            kind: "k".into(),
            provider_id: "k-000000000000".into(),
            inputs: Attributes::new(),
            outputs: Attributes::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            removal_policy: RemovalPolicy::Destroy,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_dependents_of() {
        let mut snapshot = StateSnapshot::new();
        snapshot.insert("db", applied(&[]));
        snapshot.insert("app", applied(&["db"]));
        snapshot.insert("worker", applied(&["db", "app"]));

        assert_eq!(dependents_of(&snapshot, "db"), vec!["app", "worker"]);
        assert!(dependents_of(&snapshot, "worker").is_empty());
    }
}
