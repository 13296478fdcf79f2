//! Local provider - one JSON document per resource
//!
//! Provider ids are `<kind>-<12 hex chars>`, derived with blake3 from the
//! kind, the attributes, and a per-process nonce. Outputs echo the
//! attributes and add `id` and `urn`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackgraph::{Attributes, Provisioned, Provisioner};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stored form of a local resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDocument {
    pub provider_id: String,
    pub kind: String,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalDocument {
    fn outputs(&self) -> Attributes {
        let mut outputs = self.attributes.clone();
        outputs.insert("id".into(), Value::String(self.provider_id.clone()));
        outputs.insert(
            "urn".into(),
            Value::String(format!("local://{}/{}", self.kind, self.provider_id)),
        );
        outputs
    }
}

#[derive(Debug)]
pub struct LocalProvider {
    root: PathBuf,
    nonce: AtomicU64,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nonce: AtomicU64::new(0),
        }
    }

    /// Read a stored resource
    pub fn get(&self, provider_id: &str) -> Result<Option<LocalDocument>> {
        let path = self.document_path(provider_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt resource document: {}", path.display()))?;
        Ok(Some(doc))
    }

    fn document_path(&self, provider_id: &str) -> Result<PathBuf> {
        if provider_id.is_empty()
            || !provider_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("Invalid provider id: '{provider_id}'");
        }
        Ok(self.root.join(format!("{provider_id}.json")))
    }

    fn new_id(&self, kind: &str, attrs: &Attributes) -> Result<String> {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(attrs).context("Failed to serialize attributes")?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(&body);
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        hasher.update(Utc::now().to_rfc3339().as_bytes());
        let hash = hasher.finalize().to_hex();

        Ok(format!("{}-{}", slug(kind), &hash[..12]))
    }

    fn write(&self, doc: &LocalDocument) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let path = self.document_path(&doc.provider_id)?;
        let content = serde_json::to_string_pretty(doc).context("Failed to serialize resource")?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Kind reduced to characters safe in a file name
fn slug(kind: &str) -> String {
    let slug: String = kind
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.is_empty() { "resource".into() } else { slug }
}

impl Provisioner for LocalProvider {
    fn create(&self, kind: &str, attrs: &Attributes) -> Result<Provisioned> {
        let now = Utc::now();
        let doc = LocalDocument {
            provider_id: self.new_id(kind, attrs)?,
            kind: kind.to_string(),
            attributes: attrs.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write(&doc)?;
        log::debug!("Local provider created {}", doc.provider_id);

        Ok(Provisioned {
            outputs: doc.outputs(),
            provider_id: doc.provider_id,
        })
    }

    fn update(&self, provider_id: &str, attrs: &Attributes) -> Result<Attributes> {
        let mut doc = self
            .get(provider_id)?
            .with_context(|| format!("Resource {provider_id} does not exist"))?;
        doc.attributes = attrs.clone();
        doc.updated_at = Utc::now();
        self.write(&doc)?;
        log::debug!("Local provider updated {provider_id}");
        Ok(doc.outputs())
    }

    fn delete(&self, provider_id: &str) -> Result<()> {
        let path = self.document_path(provider_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Local provider deleted {provider_id}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Resource {provider_id} was already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackgraph::{
        ApplyOptions, NoProgress, NodeDecl, OperationKind, ResourceGraph, StateSnapshot, apply,
        plan,
    };
    use tempfile::TempDir;

    fn attrs() -> Attributes {
        Attributes::from([("engine".to_string(), json!("postgres"))])
    }

    #[test]
    fn test_create_writes_document() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());

        let created = provider.create("database", &attrs()).unwrap();
        assert!(created.provider_id.starts_with("database-"));
        assert_eq!(created.provider_id.len(), "database-".len() + 12);
        assert_eq!(created.outputs["engine"], json!("postgres"));
        assert_eq!(created.outputs["id"], json!(created.provider_id));
        assert_eq!(
            created.outputs["urn"],
            json!(format!("local://database/{}", created.provider_id))
        );

        let doc = provider.get(&created.provider_id).unwrap().unwrap();
        assert_eq!(doc.kind, "database");
    }

    #[test]
    fn test_identical_creates_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());
        let a = provider.create("database", &attrs()).unwrap();
        let b = provider.create("database", &attrs()).unwrap();
        assert_ne!(a.provider_id, b.provider_id);
    }

    #[test]
    fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());
        let created = provider.create("database", &attrs()).unwrap();

        let bigger = Attributes::from([("size".to_string(), json!(20))]);
        let outputs = provider.update(&created.provider_id, &bigger).unwrap();
        assert_eq!(outputs["size"], json!(20));
        assert!(!outputs.contains_key("engine"));

        provider.delete(&created.provider_id).unwrap();
        assert!(provider.get(&created.provider_id).unwrap().is_none());
        // Deleting twice is fine
        provider.delete(&created.provider_id).unwrap();
    }

    #[test]
    fn test_update_missing_resource_fails() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());
        assert!(provider.update("database-000000000000", &attrs()).is_err());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());
        assert!(provider.delete("../etc/passwd").is_err());
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("aws::s3/Bucket"), "aws__s3_bucket");
        assert_eq!(slug(""), "resource");
    }

    #[test]
    fn test_engine_round_trip_through_local_provider() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path());
        let graph = ResourceGraph::build(vec![
            NodeDecl::new("db", "database").attr("engine", "postgres"),
            NodeDecl::new("app", "container").attr("db_urn", "ref(db, urn)"),
        ]);
        // `urn` is not declared, so the reference is dangling
        assert!(graph.is_err());

        let graph = ResourceGraph::build(vec![
            NodeDecl::new("db", "database")
                .attr("engine", "postgres")
                .output("urn"),
            NodeDecl::new("app", "container").attr("db_urn", "ref(db, urn)"),
        ])
        .unwrap();

        let changes = plan(&graph, &StateSnapshot::new()).unwrap();
        let report = apply(
            changes,
            &graph,
            StateSnapshot::new(),
            &provider,
            &ApplyOptions::default(),
            &mut NoProgress,
        );
        assert!(report.is_success());

        let db_id = &report.snapshot.get("db").unwrap().provider_id;
        let app = report.snapshot.get("app").unwrap();
        assert_eq!(app.inputs["db_urn"], json!(format!("local://database/{db_id}")));

        let again = plan(&graph, &report.snapshot).unwrap();
        assert!(again.iter().all(|op| op.kind == OperationKind::NoOp));
    }
}
