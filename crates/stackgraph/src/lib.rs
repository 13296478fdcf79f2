//! # Stackgraph
//!
//! Engine for declaring infrastructure as a graph of resources and
//! converging real resources to match it.
//!
//! ## Core Concepts
//!
//! - **NodeDecl**: One declared resource: id, kind, attributes, outputs
//! - **ResourceGraph**: Validated declarations with dependency edges derived
//!   from `ref(node, output)` references
//! - **StateSnapshot**: What was last applied, keyed by node id
//! - **ChangeSet**: Ordered create / update / replace / delete / no-op steps
//! - **Provisioner**: The backend that actually creates and destroys things
//!
//! ## Example
//!
//! ```ignore
//! use stackgraph::{NodeDecl, ResourceGraph, StateSnapshot, plan, apply_simple};
//!
//! let graph = ResourceGraph::build(vec![
//!     NodeDecl::new("db", "database").output("host"),
//!     NodeDecl::new("app", "container").attr("db_host", "ref(db, host)"),
//! ])?;
//!
//! let snapshot = StateSnapshot::new();
//! let changes = plan(&graph, &snapshot)?;
//! let report = apply_simple(changes, &graph, snapshot, &my_provider);
//!
//! // Persist report.snapshot whether or not the run succeeded
//! save(&report.snapshot)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`Provisioner`]: Creates, updates, and deletes real resources
//! - [`ProgressCallback`]: Receives progress updates during apply
//!
//! The engine does no I/O of its own. Loading declarations, persisting
//! snapshots, and talking to a backend are left to the caller.

pub mod diff;
pub mod error;
pub mod executor;
pub mod expr;
pub mod graph;
pub mod provider;
pub mod scheduler;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use diff::{
    ChangeSet, DiffSummary, Operation, OperationKind, PlannedAttributes, PlannedValue, diff, plan,
};
pub use error::{Error, Result};
pub use executor::{ApplyOptions, ApplyReport, apply, apply_simple};
pub use expr::{Expr, MalformedReference, Reference, is_valid_id};
pub use graph::{Edge, ResourceGraph, ResourceNode};
pub use provider::{CancelToken, NoProgress, ProgressCallback, Provisioned, Provisioner};
pub use scheduler::{levels, schedule};
pub use state::{AppliedResource, DeposedResource, StateSnapshot};
pub use types::{ApplyResult, ApplySummary, Attributes, NodeDecl, RemovalPolicy};
