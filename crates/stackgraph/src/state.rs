//! Last-applied state snapshot
//!
//! The snapshot is a plain value: the engine reads it when diffing and
//! returns an updated copy from apply. Persisting it is the caller's job.

use crate::types::{Attributes, ID_OUTPUT, RemovalPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What was last applied for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Resource kind at the time it was created
    pub kind: String,
    /// Identifier assigned by the provider
    pub provider_id: String,
    /// Resolved attributes sent to the provider
    #[serde(default)]
    pub inputs: Attributes,
    /// Concrete attributes the provider returned
    #[serde(default)]
    pub outputs: Attributes,
    /// Nodes this one depended on when last applied
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    pub applied_at: DateTime<Utc>,
}

impl AppliedResource {
    /// Look up an output value
    ///
    /// `id` maps to the provider id. Provider outputs win over inputs;
    /// inputs are the fallback for attributes the provider echoes implicitly.
    pub fn output(&self, name: &str) -> Option<Value> {
        if name == ID_OUTPUT {
            return Some(Value::String(self.provider_id.clone()));
        }
        self.outputs
            .get(name)
            .or_else(|| self.inputs.get(name))
            .cloned()
    }
}

/// A resource superseded by a replace, still waiting to be deleted
///
/// The replacement already holds the node's entry in `resources`; this
/// record keeps the old provider id around until nothing uses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeposedResource {
    pub node_id: String,
    pub kind: String,
    pub provider_id: String,
    /// Nodes the old resource depended on
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

impl DeposedResource {
    pub fn from_applied(node_id: impl Into<String>, resource: &AppliedResource) -> Self {
        Self {
            node_id: node_id.into(),
            kind: resource.kind.clone(),
            provider_id: resource.provider_id.clone(),
            dependencies: resource.dependencies.clone(),
            removal_policy: resource.removal_policy,
        }
    }
}

/// Mapping of node id to last-applied resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Incremented on every persisted write
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, AppliedResource>,
    /// Replaced resources not yet deleted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deposed: Vec<DeposedResource>,
}

impl StateSnapshot {
    /// Empty snapshot for a first run
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&AppliedResource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// No live or deposed resources
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.deposed.is_empty()
    }

    /// Node ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn insert(&mut self, id: impl Into<String>, resource: AppliedResource) {
        self.resources.insert(id.into(), resource);
    }

    pub fn remove(&mut self, id: &str) -> Option<AppliedResource> {
        self.resources.remove(id)
    }

    /// Record a replaced resource for deletion later
    pub fn depose(&mut self, deposed: DeposedResource) {
        if !self.is_deposed(&deposed.provider_id) {
            self.deposed.push(deposed);
        }
    }

    pub fn is_deposed(&self, provider_id: &str) -> bool {
        self.deposed.iter().any(|d| d.provider_id == provider_id)
    }

    /// Drop a deposed resource once it is gone
    pub fn forget_deposed(&mut self, provider_id: &str) -> Option<DeposedResource> {
        let at = self
            .deposed
            .iter()
            .position(|d| d.provider_id == provider_id)?;
        Some(self.deposed.remove(at))
    }

    /// Output `name` of node `id`, if recorded
    pub fn output(&self, id: &str, name: &str) -> Option<Value> {
        self.resources.get(id).and_then(|r| r.output(name))
    }
}
