//! Core types for stack declarations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Concrete attribute values, keyed by attribute name
pub type Attributes = BTreeMap<String, Value>;

/// Output name every node provides: the provider-assigned identifier
pub const ID_OUTPUT: &str = "id";

/// What happens to the real resource when its node leaves the stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Delete the resource through the provider
    #[default]
    Destroy,
    /// Forget the resource, leave it running
    Retain,
}

impl RemovalPolicy {
    pub fn is_retain(&self) -> bool {
        matches!(self, Self::Retain)
    }
}

/// A single resource declaration as written in a stack file
///
/// Attribute values are raw JSON; strings of the form `ref(node, output)`
/// become references once the graph is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDecl {
    /// Unique id within the stack
    pub id: String,
    /// Resource kind, passed to the provider on create
    pub kind: String,
    /// Attribute name to raw value
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Extra output names the provider is expected to return
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// Explicit ordering dependencies with no attribute reference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

impl NodeDecl {
    /// Create a declaration with no attributes
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            removal_policy: RemovalPolicy::default(),
        }
    }

    /// Add an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Declare an output name
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Add an explicit dependency
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }
}

/// Result of applying one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No provider call was needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place
    Modified,
    /// Old resource destroyed, new one created
    Replaced,
    /// Resource was deleted
    Removed,
    /// Resource left running and dropped from state
    Retained,
    /// Apply failed
    Failed { error: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Replaced | Self::Removed | Self::Retained
        )
    }
}

/// Summary of apply results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub retained: usize,
    pub no_change: usize,
    pub failed: usize,
    /// Operations never attempted because apply stopped early
    pub skipped: usize,
}

impl ApplySummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed + self.retained
    }

    /// Check if execution was fully successful (no failures, nothing skipped)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of operations processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.no_change + self.failed + self.skipped
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Retained => self.retained += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
        }
    }
}
