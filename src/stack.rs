//! Stack file loading
//!
//! A stack file holds a top-level `resources` list of declarations. The
//! format follows the extension: `.json`, `.yaml`/`.yml`, or `.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stackgraph::{NodeDecl, ResourceGraph};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackFile {
    #[serde(default)]
    pub resources: Vec<NodeDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFormat {
    Json,
    Yaml,
    Toml,
}

impl StackFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => anyhow::bail!(
                "Unsupported stack file extension: {} (expected .json, .yaml, .yml or .toml)",
                path.display()
            ),
        }
    }
}

impl StackFile {
    pub fn parse(content: &str, format: StackFormat) -> Result<Self> {
        let stack = match format {
            StackFormat::Json => serde_json::from_str(content).context("Invalid JSON stack")?,
            StackFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML stack")?,
            StackFormat::Toml => toml::from_str(content).context("Invalid TOML stack")?,
        };
        Ok(stack)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let format = StackFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read stack file: {}", path.display()))?;
        let stack = Self::parse(&content, format)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::debug!(
            "Loaded {} declarations from {}",
            stack.resources.len(),
            path.display()
        );
        Ok(stack)
    }
}

/// Load a stack file and build its graph
pub fn load_graph(path: &Path) -> Result<ResourceGraph> {
    let stack = StackFile::load(path)?;
    ResourceGraph::build(stack.resources)
        .with_context(|| format!("Invalid stack {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackgraph::RemovalPolicy;
    use tempfile::TempDir;

    const YAML: &str = r#"
resources:
  - id: db
    kind: database
    outputs: [host]
    attributes:
      engine: postgres
      size: 10
  - id: app
    kind: container
    removal_policy: retain
    attributes:
      env:
        DB_HOST: ref(db, host)
      ports: [80, 443]
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(StackFormat::from_path(Path::new("s.yml")).unwrap(), StackFormat::Yaml);
        assert_eq!(StackFormat::from_path(Path::new("s.JSON")).unwrap(), StackFormat::Json);
        assert_eq!(StackFormat::from_path(Path::new("s.toml")).unwrap(), StackFormat::Toml);
        assert!(StackFormat::from_path(Path::new("stack")).is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let stack = StackFile::parse(YAML, StackFormat::Yaml).unwrap();
        assert_eq!(stack.resources.len(), 2);
        let app = &stack.resources[1];
        assert_eq!(app.removal_policy, RemovalPolicy::Retain);
        assert_eq!(app.attributes["env"], json!({"DB_HOST": "ref(db, host)"}));
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[[resources]]
id = "zone"
kind = "dns_zone"
attributes = { domain = "example.com" }

[[resources]]
id = "cert"
kind = "certificate"
depends_on = ["zone"]
attributes = { domain = "ref(zone, domain)" }
"#;
        let stack = StackFile::parse(content, StackFormat::Toml).unwrap();
        assert_eq!(stack.resources[1].depends_on, vec!["zone"]);
    }

    #[test]
    fn test_load_graph_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.yaml");
        fs::write(&path, YAML).unwrap();

        let graph = load_graph(&path).unwrap();
        assert_eq!(graph.dependencies_of("app"), vec!["db"]);
    }

    #[test]
    fn test_load_graph_reports_dangling_reference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.json");
        fs::write(
            &path,
            r#"{"resources": [{"id": "app", "kind": "container", "attributes": {"h": "ref(db, host)"}}]}"#,
        )
        .unwrap();

        let err = load_graph(&path).unwrap_err();
        let engine_err = err.downcast_ref::<stackgraph::Error>().unwrap();
        assert!(matches!(engine_err, stackgraph::Error::DanglingReference { .. }));
    }
}
