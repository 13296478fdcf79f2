//! `stackplan graph`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use serde::Serialize;
use stackgraph::{Edge, ResourceGraph};

use crate::Context;
use crate::cli::{GraphArgs, GraphFormat};
use crate::stack;

#[derive(Serialize)]
struct GraphJson<'a> {
    order: Vec<String>,
    levels: Vec<Vec<String>>,
    edges: &'a [Edge],
}

pub fn run(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let path = ctx.stack_path();
    let graph = stack::load_graph(&path)?;
    let levels =
        stackgraph::levels(&graph).with_context(|| format!("Invalid stack {}", path.display()))?;

    match args.format {
        GraphFormat::Text => print_levels(&graph, &levels),
        GraphFormat::Dot => print!("{}", render_dot(&graph)),
        GraphFormat::Json => {
            let json = GraphJson {
                order: levels.iter().flatten().cloned().collect(),
                levels,
                edges: graph.edges(),
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn print_levels(graph: &ResourceGraph, levels: &[Vec<String>]) {
    for (depth, ids) in levels.iter().enumerate() {
        println!("{}", format!("Level {depth}").cyan().bold());
        for id in ids {
            let Some(node) = graph.node(id) else { continue };
            let deps = graph.dependencies_of(id);
            if deps.is_empty() {
                println!("  {} {}", id.bold(), format!("({})", node.kind()).dimmed());
            } else {
                println!(
                    "  {} {} {} {}",
                    id.bold(),
                    format!("({})", node.kind()).dimmed(),
                    "←".dimmed(),
                    deps.join(", ")
                );
            }
        }
    }
}

/// Graphviz rendering; edges point from dependent to dependency
fn render_dot(graph: &ResourceGraph) -> String {
    let mut out = String::from("digraph stack {\n    rankdir=LR;\n");
    for node in graph.nodes() {
        out.push_str(&format!(
            "    {:?} [label={:?}];\n",
            node.id(),
            format!("{}\n{}", node.id(), node.kind())
        ));
    }
    for edge in graph.edges() {
        out.push_str(&format!("    {:?} -> {:?};\n", edge.from, edge.to));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::NodeDecl;

    #[test]
    fn test_render_dot() {
        let graph = ResourceGraph::build(vec![
            NodeDecl::new("db", "database"),
            NodeDecl::new("app", "container").attr("db", "ref(db, id)"),
        ])
        .unwrap();

        let dot = render_dot(&graph);
        assert!(dot.starts_with("digraph stack {"));
        assert!(dot.contains(r#""db" [label="db\ndatabase"];"#));
        assert!(dot.contains(r#""app" -> "db";"#));
        assert!(dot.ends_with("}\n"));
    }
}
