//! Resource graph builder
//!
//! Turns an ordered list of declarations into a validated graph. Edges are
//! derived from `ref(node, output)` references and explicit `depends_on`
//! entries. Validation fails closed: ids a reference could not name,
//! malformed references, duplicate ids, references to unknown nodes and
//! references to outputs a node does not provide are all errors. Cycles are
//! left for the scheduler to report.

use crate::error::{Error, Result};
use crate::expr::{Expr, ID_PUNCTUATION, Reference, is_valid_id};
use crate::types::{ID_OUTPUT, NodeDecl, RemovalPolicy};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A validated node in the resource graph
#[derive(Debug, Clone)]
pub struct ResourceNode {
    id: String,
    kind: String,
    attributes: BTreeMap<String, Expr>,
    outputs: BTreeSet<String>,
    removal_policy: RemovalPolicy,
    /// Position in the declaration list
    order: usize,
}

impl ResourceNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn attributes(&self) -> &BTreeMap<String, Expr> {
        &self.attributes
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Declaration order, used to break scheduling ties
    pub fn order(&self) -> usize {
        self.order
    }

    /// Whether this node provides the named output
    ///
    /// Every node provides `id`, each of its attribute names, and any
    /// explicitly declared output.
    pub fn provides(&self, output: &str) -> bool {
        output == ID_OUTPUT || self.attributes.contains_key(output) || self.outputs.contains(output)
    }

    /// All references made by this node's attributes
    pub fn references(&self) -> Vec<&Reference> {
        self.attributes
            .values()
            .flat_map(Expr::references)
            .collect()
    }
}

/// A dependency edge: `from` needs `to` to exist first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A validated resource graph
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Distinct dependency indices per node, sorted
    deps: Vec<Vec<usize>>,
    /// Distinct dependent indices per node, sorted
    dependents: Vec<Vec<usize>>,
}

impl ResourceGraph {
    /// Build and validate a graph from declarations
    pub fn build(decls: impl IntoIterator<Item = NodeDecl>) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut explicit = Vec::new();
        let mut index = HashMap::new();

        for (order, decl) in decls.into_iter().enumerate() {
            if !is_valid_id(&decl.id) {
                return Err(Error::InvalidDeclaration {
                    id: decl.id,
                    message: format!(
                        "id must be non-empty ASCII letters, digits or any of '{ID_PUNCTUATION}'"
                    ),
                });
            }
            if decl.kind.trim().is_empty() {
                return Err(Error::InvalidDeclaration {
                    id: decl.id,
                    message: "kind must not be empty".into(),
                });
            }
            if index.insert(decl.id.clone(), order).is_some() {
                return Err(Error::DuplicateId { id: decl.id });
            }

            let mut attributes = BTreeMap::new();
            for (name, raw) in &decl.attributes {
                match Expr::parse(raw) {
                    Ok(expr) => {
                        attributes.insert(name.clone(), expr);
                    }
                    Err(e) => {
                        return Err(Error::InvalidDeclaration {
                            id: decl.id,
                            message: format!("attribute '{name}': {e}"),
                        });
                    }
                }
            }

            explicit.push(decl.depends_on);
            nodes.push(ResourceNode {
                id: decl.id,
                kind: decl.kind,
                attributes,
                outputs: decl.outputs.into_iter().collect(),
                removal_policy: decl.removal_policy,
                order,
            });
        }

        let mut edges = Vec::new();
        let mut deps = vec![BTreeSet::new(); nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            for r in node.references() {
                let target = index.get(&r.node).map(|&t| &nodes[t]);
                match target {
                    Some(t) if t.provides(&r.output) => {
                        if deps[i].insert(t.order) {
                            edges.push(Edge {
                                from: node.id.clone(),
                                to: r.node.clone(),
                            });
                        }
                    }
                    _ => {
                        return Err(Error::DanglingReference {
                            node: node.id.clone(),
                            target: r.node.clone(),
                            output: Some(r.output.clone()),
                        });
                    }
                }
            }

            for dep in &explicit[i] {
                let Some(&t) = index.get(dep) else {
                    return Err(Error::DanglingReference {
                        node: node.id.clone(),
                        target: dep.clone(),
                        output: None,
                    });
                };
                if deps[i].insert(t) {
                    edges.push(Edge {
                        from: node.id.clone(),
                        to: dep.clone(),
                    });
                }
            }
        }

        let deps: Vec<Vec<usize>> = deps.into_iter().map(|d| d.into_iter().collect()).collect();
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node_deps) in deps.iter().enumerate() {
            for &d in node_deps {
                dependents[d].push(i);
            }
        }

        log::debug!(
            "Built resource graph: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            nodes,
            index,
            edges,
            deps,
            dependents,
        })
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the nodes `id` depends on, in declaration order
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| self.deps[i].iter().map(|&d| self.nodes[d].id()).collect())
            .unwrap_or_default()
    }

    /// Ids of the nodes that depend on `id`, in declaration order
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.nodes[d].id())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn dependency_indices(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }
}
