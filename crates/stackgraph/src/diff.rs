//! Diff engine - desired graph vs last-applied snapshot
//!
//! Produces a [`ChangeSet`]: one operation per graph node in scheduled
//! order, followed by deletes for nodes that only exist in the snapshot and
//! for resources superseded by a replace. References resolve against the
//! snapshot when the referenced node is unchanged; otherwise the value is
//! [`PlannedValue::Pending`] until apply.
//!
//! Replaces create before they destroy: the new resource is created in the
//! node's slot, dependents move over to it, and the old resource is deleted
//! with the trailing deletes.

use crate::error::{Error, Result};
use crate::expr::Reference;
use crate::graph::ResourceGraph;
use crate::scheduler::{cycle_error, kahn, schedule};
use crate::state::{DeposedResource, StateSnapshot};
use crate::types::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// What an operation does to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    /// Kind changed: create a new resource, delete the old one later
    Replace,
    Delete,
    NoOp,
}

impl OperationKind {
    /// Whether this operation calls the provider
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Short plan symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
            Self::NoOp => "=",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

/// A planned attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedValue {
    /// Fully resolved
    Known(Value),
    /// Depends on an output that is only known after apply
    Pending,
}

impl PlannedValue {
    pub fn known(&self) -> Option<&Value> {
        match self {
            Self::Known(v) => Some(v),
            Self::Pending => None,
        }
    }
}

/// Planned attributes, keyed by attribute name
pub type PlannedAttributes = BTreeMap<String, PlannedValue>;

/// One step of a changeset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub node_id: String,
    pub resource_kind: String,
    /// Inputs recorded in the snapshot, if the node was applied before
    pub before: Option<Attributes>,
    /// Planned attributes, absent for deletes
    pub after: Option<PlannedAttributes>,
    /// Attribute names whose value changes (or may change)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    /// For deletes of a replaced resource, the resource being deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposed: Option<DeposedResource>,
}

impl Operation {
    pub fn is_change(&self) -> bool {
        self.kind.is_change()
    }

    fn delete_deposed(deposed: DeposedResource) -> Self {
        Self {
            kind: OperationKind::Delete,
            node_id: deposed.node_id.clone(),
            resource_kind: deposed.kind.clone(),
            before: None,
            after: None,
            changed: Vec::new(),
            deposed: Some(deposed),
        }
    }
}

/// Ordered operations moving the snapshot to the desired graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    operations: Vec<Operation>,
}

impl ChangeSet {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The operation for a node, if any
    pub fn get(&self, node_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.node_id == node_id)
    }

    /// Whether any operation calls the provider
    pub fn has_changes(&self) -> bool {
        self.operations.iter().any(Operation::is_change)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_operations(&self.operations)
    }

    /// `(kind, node_id)` pairs, handy for assertions and logs
    pub fn steps(&self) -> Vec<(OperationKind, &str)> {
        self.operations
            .iter()
            .map(|op| (op.kind, op.node_id.as_str()))
            .collect()
    }

    /// Keep only operations matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Operation) -> bool,
    {
        Self {
            operations: self
                .operations
                .into_iter()
                .filter(|op| predicate(op))
                .collect(),
        }
    }
}

impl IntoIterator for ChangeSet {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn from_operations(operations: &[Operation]) -> Self {
        let mut summary = Self::default();
        for op in operations {
            match op.kind {
                OperationKind::Create => summary.creates += 1,
                OperationKind::Update => summary.updates += 1,
                OperationKind::Replace => summary.replaces += 1,
                OperationKind::Delete => summary.deletes += 1,
                OperationKind::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Number of operations that call the provider
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Schedule the graph and diff it against the snapshot
pub fn plan(graph: &ResourceGraph, snapshot: &StateSnapshot) -> Result<ChangeSet> {
    let order = schedule(graph)?;
    diff(graph, &order, snapshot)
}

/// Compute the changeset for an already scheduled graph
///
/// `order` must be a topological order of `graph`, as returned by
/// [`schedule`].
pub fn diff(graph: &ResourceGraph, order: &[String], snapshot: &StateSnapshot) -> Result<ChangeSet> {
    let mut changing: HashSet<&str> = HashSet::new();
    let mut operations = Vec::with_capacity(order.len());
    let mut replaced = Vec::new();

    for id in order {
        let node = graph.node(id).ok_or_else(|| Error::DanglingReference {
            node: id.clone(),
            target: id.clone(),
            output: None,
        })?;
        let previous = snapshot.get(id);

        let lookup = |r: &Reference| {
            if changing.contains(r.node.as_str()) {
                None
            } else {
                snapshot.output(&r.node, &r.output)
            }
        };
        let after: PlannedAttributes = node
            .attributes()
            .iter()
            .map(|(name, expr)| {
                let value = expr
                    .resolve(&lookup)
                    .map_or(PlannedValue::Pending, PlannedValue::Known);
                (name.clone(), value)
            })
            .collect();

        let (kind, changed) = match previous {
            None => (OperationKind::Create, after.keys().cloned().collect()),
            Some(prev) if prev.kind != node.kind() => {
                let names: BTreeSet<String> =
                    after.keys().chain(prev.inputs.keys()).cloned().collect();
                (OperationKind::Replace, names.into_iter().collect())
            }
            Some(prev) => {
                let changed = changed_attributes(&prev.inputs, &after);
                if changed.is_empty() {
                    (OperationKind::NoOp, changed)
                } else {
                    (OperationKind::Update, changed)
                }
            }
        };

        if kind.is_change() {
            changing.insert(id.as_str());
        }
        if let (OperationKind::Replace, Some(prev)) = (kind, previous) {
            replaced.push(DeposedResource::from_applied(id.clone(), prev));
        }

        operations.push(Operation {
            kind,
            node_id: id.clone(),
            resource_kind: node.kind().to_string(),
            before: previous.map(|p| p.inputs.clone()),
            after: Some(after),
            changed,
            deposed: None,
        });
    }

    operations.extend(ordered_deletes(graph, snapshot, replaced)?);

    let changeset = ChangeSet::new(operations);
    let summary = changeset.summary();
    log::debug!(
        "Diff: {} create, {} update, {} replace, {} delete, {} unchanged",
        summary.creates,
        summary.updates,
        summary.replaces,
        summary.deletes,
        summary.unchanged
    );
    Ok(changeset)
}

/// Attribute names whose planned value differs from the recorded input
fn changed_attributes(before: &Attributes, after: &PlannedAttributes) -> Vec<String> {
    let mut changed = BTreeSet::new();
    for (name, planned) in after {
        match planned {
            PlannedValue::Known(v) if before.get(name) == Some(v) => {}
            _ => {
                changed.insert(name.clone());
            }
        }
    }
    for name in before.keys() {
        if !after.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed.into_iter().collect()
}

/// Delete operations, dependents first
///
/// Covers nodes that left the graph, resources replaced in this plan, and
/// deposed resources left over from an earlier run. Ordering uses the
/// dependencies recorded in the snapshot, since none of these have a
/// current declaration. Every live node has already been moved off them by
/// the forward operations, so they all run last.
fn ordered_deletes(
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    replaced: Vec<DeposedResource>,
) -> Result<Vec<Operation>> {
    let mut removals: Vec<(Operation, Vec<String>)> = Vec::new();
    for (id, prev) in &snapshot.resources {
        if graph.contains(id) {
            continue;
        }
        let op = Operation {
            kind: OperationKind::Delete,
            node_id: id.clone(),
            resource_kind: prev.kind.clone(),
            before: Some(prev.inputs.clone()),
            after: None,
            changed: Vec::new(),
            deposed: None,
        };
        removals.push((op, prev.dependencies.clone()));
    }
    for deposed in snapshot.deposed.iter().cloned().chain(replaced) {
        let dependencies = deposed.dependencies.clone();
        removals.push((Operation::delete_deposed(deposed), dependencies));
    }

    let mut by_node: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, (op, _)) in removals.iter().enumerate() {
        by_node.entry(op.node_id.as_str()).or_default().push(i);
    }

    // A removal must wait for every removal that depended on its node.
    let mut waits: Vec<Vec<usize>> = vec![Vec::new(); removals.len()];
    for (i, (_, dependencies)) in removals.iter().enumerate() {
        for dep in dependencies {
            for &d in by_node.get(dep.as_str()).into_iter().flatten() {
                if d != i {
                    waits[d].push(i);
                }
            }
        }
    }
    for list in &mut waits {
        list.sort_unstable();
        list.dedup();
    }

    let order = kahn(removals.len(), |i| waits[i].as_slice())
        .map_err(|cycle| cycle_error(&cycle, |i| removals[i].0.node_id.as_str()))?;

    let mut slots: Vec<Option<Operation>> = removals.into_iter().map(|(op, _)| Some(op)).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
