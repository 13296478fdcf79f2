//! Apply executor - runs a changeset against a provisioner
//!
//! Operations run in changeset order. The first failure stops the run and
//! the report carries the snapshot as it stood after the last successful
//! operation. With `jobs > 1`, operations with no dependency path between
//! them run in parallel waves; anything connected by a path stays ordered.
//!
//! A replace creates the new resource and records the old one as deposed.
//! The old resource is deleted by a later operation of the same changeset,
//! or by the next plan if the run stops first.

use crate::diff::{ChangeSet, Operation, OperationKind};
use crate::error::Error;
use crate::expr::Reference;
use crate::graph::{ResourceGraph, ResourceNode};
use crate::provider::{CancelToken, ProgressCallback, Provisioner};
use crate::state::{AppliedResource, DeposedResource, StateSnapshot};
use crate::types::{ApplyResult, ApplySummary, Attributes};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Options for apply
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Maximum provider calls in flight; 1 means strictly sequential
    pub jobs: usize,
    /// Checked between operations
    pub cancel: CancelToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            cancel: CancelToken::new(),
        }
    }
}

/// Outcome of an apply run
#[derive(Debug)]
pub struct ApplyReport {
    /// Snapshot reflecting every operation that succeeded
    pub snapshot: StateSnapshot,
    /// Result per attempted operation, by node id
    pub results: Vec<(String, ApplyResult)>,
    pub summary: ApplySummary,
    /// First failure, if any
    pub error: Option<Error>,
    /// Whether the run stopped because of cancellation
    pub cancelled: bool,
}

impl ApplyReport {
    fn new(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot,
            results: Vec::new(),
            summary: ApplySummary::default(),
            error: None,
            cancelled: false,
        }
    }

    /// Whether every operation ran and succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.summary.is_success()
    }

    /// Result recorded for a node
    pub fn result(&self, node_id: &str) -> Option<&ApplyResult> {
        self.results
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, r)| r)
    }

    /// Fold one finished operation into the snapshot and counters
    fn record(&mut self, op: &Operation, step: Step) -> ApplyResult {
        match step.change {
            StateChange::Upsert(resource) => self.snapshot.insert(op.node_id.clone(), resource),
            StateChange::Remove => {
                self.snapshot.remove(&op.node_id);
            }
            StateChange::Depose { resource, deposed } => {
                self.snapshot.insert(op.node_id.clone(), resource);
                self.snapshot.depose(deposed);
            }
            StateChange::Forget(provider_id) => {
                self.snapshot.forget_deposed(&provider_id);
            }
            StateChange::Keep => {}
        }

        let result = match step.result {
            Ok(result) => result,
            Err(error) => {
                log::warn!("{error}");
                let failed = ApplyResult::Failed {
                    error: error.to_string(),
                };
                if self.error.is_none() {
                    self.error = Some(error);
                }
                failed
            }
        };

        self.summary.add_result(&result);
        self.results.push((op.node_id.clone(), result.clone()));
        result
    }
}

/// Apply a changeset
///
/// # Arguments
/// * `changeset` - Operations from [`crate::plan`], consumed
/// * `graph` - The graph the changeset was planned from
/// * `snapshot` - Snapshot the changeset was planned against
/// * `provider` - Provisioning backend
/// * `opts` - Concurrency and cancellation
/// * `progress` - Progress callback
///
/// # Returns
/// A report holding the updated snapshot. Failures and cancellation are
/// reported in it rather than as an `Err`, so the partial snapshot is never
/// lost.
pub fn apply<P, C>(
    changeset: ChangeSet,
    graph: &ResourceGraph,
    snapshot: StateSnapshot,
    provider: &P,
    opts: &ApplyOptions,
    progress: &mut C,
) -> ApplyReport
where
    P: Provisioner + ?Sized,
    C: ProgressCallback,
{
    let operations: Vec<Operation> = changeset.into_iter().collect();
    let mut report = ApplyReport::new(snapshot);

    progress.on_start(operations.len());

    if opts.jobs > 1 && operations.len() > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(opts.jobs).build() {
            Ok(pool) => apply_waves(&operations, graph, provider, opts, &pool, &mut report, progress),
            Err(e) => {
                log::warn!("Failed to create apply thread pool, running sequentially: {e}");
                apply_sequential(&operations, graph, provider, opts, &mut report, progress);
            }
        }
    } else {
        apply_sequential(&operations, graph, provider, opts, &mut report, progress);
    }

    report.summary.skipped = operations.len() - report.results.len();
    progress.on_finish(&report.summary);

    log::debug!(
        "Apply finished: {} changes, {} failed, {} skipped",
        report.summary.total_changes(),
        report.summary.failed,
        report.summary.skipped
    );
    report
}

/// Simple apply without progress reporting
pub fn apply_simple<P: Provisioner + ?Sized>(
    changeset: ChangeSet,
    graph: &ResourceGraph,
    snapshot: StateSnapshot,
    provider: &P,
) -> ApplyReport {
    use crate::provider::NoProgress;

    apply(
        changeset,
        graph,
        snapshot,
        provider,
        &ApplyOptions::default(),
        &mut NoProgress,
    )
}

fn apply_sequential<P, C>(
    operations: &[Operation],
    graph: &ResourceGraph,
    provider: &P,
    opts: &ApplyOptions,
    report: &mut ApplyReport,
    progress: &mut C,
) where
    P: Provisioner + ?Sized,
    C: ProgressCallback,
{
    for op in operations {
        if opts.cancel.is_cancelled() {
            log::warn!("Apply cancelled before {} of '{}'", op.kind, op.node_id);
            report.cancelled = true;
            break;
        }

        progress.on_operation_start(op);
        let step = execute_operation(op, graph, &report.snapshot, provider);
        let result = report.record(op, step);
        progress.on_operation_complete(op, &result);

        if !result.is_success() {
            break;
        }
    }
}

/// Run operations in waves of mutually independent operations
fn apply_waves<P, C>(
    operations: &[Operation],
    graph: &ResourceGraph,
    provider: &P,
    opts: &ApplyOptions,
    pool: &rayon::ThreadPool,
    report: &mut ApplyReport,
    progress: &mut C,
) where
    P: Provisioner + ?Sized,
    C: ProgressCallback,
{
    let prereqs = prerequisites(operations, graph, &report.snapshot);
    let mut started = vec![false; operations.len()];
    let mut done = vec![false; operations.len()];

    loop {
        if opts.cancel.is_cancelled() {
            log::warn!("Apply cancelled at wave boundary");
            report.cancelled = true;
            break;
        }

        let wave: Vec<usize> = (0..operations.len())
            .filter(|&i| !started[i] && prereqs[i].iter().all(|&j| done[j]))
            .collect();
        if wave.is_empty() {
            break;
        }

        log::debug!("Applying wave of {} operations", wave.len());
        for &i in &wave {
            started[i] = true;
            progress.on_operation_start(&operations[i]);
        }

        let snapshot = &report.snapshot;
        let steps: Vec<Step> = pool.install(|| {
            wave.par_iter()
                .map(|&i| execute_operation(&operations[i], graph, snapshot, provider))
                .collect()
        });

        let mut failed = false;
        for (&i, step) in wave.iter().zip(steps) {
            let result = report.record(&operations[i], step);
            progress.on_operation_complete(&operations[i], &result);
            done[i] = true;
            failed |= !result.is_success();
        }

        if failed {
            break;
        }
    }
}

/// For each operation, the earlier operations it must wait for
///
/// Two operations are ordered when they touch the same node, or when a
/// dependency path, current or recorded in the snapshot, connects their
/// nodes in either direction.
fn prerequisites(
    operations: &[Operation],
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
) -> Vec<Vec<usize>> {
    let mut deps: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for node in graph.nodes() {
        deps.entry(node.id())
            .or_default()
            .extend(graph.dependencies_of(node.id()));
    }
    for (id, resource) in &snapshot.resources {
        deps.entry(id.as_str())
            .or_default()
            .extend(resource.dependencies.iter().map(String::as_str));
    }
    for deposed in &snapshot.deposed {
        deps.entry(deposed.node_id.as_str())
            .or_default()
            .extend(deposed.dependencies.iter().map(String::as_str));
    }

    let reach: Vec<BTreeSet<&str>> = operations
        .iter()
        .map(|op| reachable(&op.node_id, &deps))
        .collect();

    (0..operations.len())
        .map(|i| {
            (0..i)
                .filter(|&j| {
                    operations[i].node_id == operations[j].node_id
                        || reach[i].contains(operations[j].node_id.as_str())
                        || reach[j].contains(operations[i].node_id.as_str())
                })
                .collect()
        })
        .collect()
}

fn reachable<'a>(start: &str, deps: &HashMap<&'a str, BTreeSet<&'a str>>) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&str> = deps
        .get(start)
        .map(|d| d.iter().copied().collect())
        .unwrap_or_default();
    while let Some(current) = stack.pop() {
        if seen.insert(current)
            && let Some(next) = deps.get(current)
        {
            stack.extend(next.iter().copied());
        }
    }
    seen
}

/// How an operation changes the snapshot
enum StateChange {
    Upsert(AppliedResource),
    Remove,
    /// The node moved to a new resource; the old one awaits deletion
    Depose {
        resource: AppliedResource,
        deposed: DeposedResource,
    },
    /// A deposed resource is gone
    Forget(String),
    Keep,
}

/// A finished operation, not yet folded into the snapshot
struct Step {
    change: StateChange,
    result: Result<ApplyResult, Error>,
}

impl Step {
    fn ok(change: StateChange, result: ApplyResult) -> Self {
        Self {
            change,
            result: Ok(result),
        }
    }

    fn failed(change: StateChange, error: Error) -> Self {
        Self {
            change,
            result: Err(error),
        }
    }
}

/// Run one operation, reading (never writing) the snapshot
fn execute_operation<P: Provisioner + ?Sized>(
    op: &Operation,
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    provider: &P,
) -> Step {
    let previous = snapshot.get(&op.node_id);

    if op.kind == OperationKind::Delete {
        return match &op.deposed {
            Some(deposed) => delete_deposed(op, deposed, snapshot, provider),
            None => delete(op, previous, provider),
        };
    }

    let Some(node) = graph.node(&op.node_id) else {
        return Step::failed(
            StateChange::Keep,
            provisioning_error(op, anyhow::anyhow!("resource is not part of the graph")),
        );
    };

    match (op.kind, previous) {
        (OperationKind::NoOp, Some(prev)) => {
            Step::ok(refresh(prev, node, graph), ApplyResult::NoChange)
        }
        (OperationKind::NoOp, None) => Step::ok(StateChange::Keep, ApplyResult::NoChange),
        (OperationKind::Create, _) | (OperationKind::Update | OperationKind::Replace, None) => {
            create(op, node, graph, snapshot, provider, ApplyResult::Created)
        }
        (OperationKind::Update, Some(prev)) => update(op, node, graph, snapshot, prev, provider),
        (OperationKind::Replace, Some(prev)) => {
            match create(op, node, graph, snapshot, provider, ApplyResult::Replaced) {
                Step {
                    change: StateChange::Upsert(resource),
                    result,
                } => Step {
                    change: StateChange::Depose {
                        resource,
                        deposed: DeposedResource::from_applied(op.node_id.clone(), prev),
                    },
                    result,
                },
                // The old resource is untouched, so state keeps it
                step => step,
            }
        }
        (OperationKind::Delete, _) => delete(op, previous, provider),
    }
}

fn create<P: Provisioner + ?Sized>(
    op: &Operation,
    node: &ResourceNode,
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    provider: &P,
    success: ApplyResult,
) -> Step {
    let inputs = match resolve_inputs(node, snapshot) {
        Ok(inputs) => inputs,
        Err(e) => return Step::failed(StateChange::Keep, e),
    };

    match provider.create(node.kind(), &inputs) {
        Ok(provisioned) => {
            log::debug!("Created '{}' as {}", node.id(), provisioned.provider_id);
            let record = applied(node, graph, provisioned.provider_id, inputs, provisioned.outputs);
            Step::ok(StateChange::Upsert(record), success)
        }
        Err(e) => Step::failed(StateChange::Keep, provisioning_error(op, e)),
    }
}

fn update<P: Provisioner + ?Sized>(
    op: &Operation,
    node: &ResourceNode,
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    prev: &AppliedResource,
    provider: &P,
) -> Step {
    let inputs = match resolve_inputs(node, snapshot) {
        Ok(inputs) => inputs,
        Err(e) => return Step::failed(StateChange::Keep, e),
    };

    // Pending references may resolve to the values already applied
    if inputs == prev.inputs {
        log::debug!("'{}' resolved to its applied inputs, skipping update", node.id());
        return Step::ok(refresh(prev, node, graph), ApplyResult::NoChange);
    }

    match provider.update(&prev.provider_id, &inputs) {
        Ok(outputs) => {
            let record = applied(node, graph, prev.provider_id.clone(), inputs, outputs);
            Step::ok(StateChange::Upsert(record), ApplyResult::Modified)
        }
        Err(e) => Step::failed(StateChange::Keep, provisioning_error(op, e)),
    }
}

fn delete<P: Provisioner + ?Sized>(
    op: &Operation,
    previous: Option<&AppliedResource>,
    provider: &P,
) -> Step {
    let Some(prev) = previous else {
        return Step::ok(StateChange::Keep, ApplyResult::NoChange);
    };

    if prev.removal_policy.is_retain() {
        log::info!("Retaining '{}' ({}), dropping it from state", op.node_id, prev.provider_id);
        return Step::ok(StateChange::Remove, ApplyResult::Retained);
    }

    match provider.delete(&prev.provider_id) {
        Ok(()) => Step::ok(StateChange::Remove, ApplyResult::Removed),
        Err(e) => Step::failed(StateChange::Keep, provisioning_error(op, e)),
    }
}

/// Delete a resource that a replace left behind
fn delete_deposed<P: Provisioner + ?Sized>(
    op: &Operation,
    deposed: &DeposedResource,
    snapshot: &StateSnapshot,
    provider: &P,
) -> Step {
    // Only resources the snapshot records as deposed are safe to delete
    if !snapshot.is_deposed(&deposed.provider_id) {
        log::warn!(
            "'{}' ({}) is not recorded as replaced, leaving it alone",
            op.node_id,
            deposed.provider_id
        );
        return Step::ok(StateChange::Keep, ApplyResult::NoChange);
    }

    let forget = StateChange::Forget(deposed.provider_id.clone());
    if deposed.removal_policy.is_retain() {
        log::info!(
            "Retaining replaced '{}' ({}), dropping it from state",
            op.node_id,
            deposed.provider_id
        );
        return Step::ok(forget, ApplyResult::Retained);
    }

    match provider.delete(&deposed.provider_id) {
        Ok(()) => {
            log::debug!("Deleted replaced '{}' ({})", op.node_id, deposed.provider_id);
            Step::ok(forget, ApplyResult::Removed)
        }
        Err(e) => Step::failed(StateChange::Keep, provisioning_error(op, e)),
    }
}

/// Carry dependency and policy changes into state without a provider call
fn refresh(prev: &AppliedResource, node: &ResourceNode, graph: &ResourceGraph) -> StateChange {
    let dependencies = dependency_ids(node, graph);
    if prev.dependencies == dependencies && prev.removal_policy == node.removal_policy() {
        return StateChange::Keep;
    }
    StateChange::Upsert(AppliedResource {
        dependencies,
        removal_policy: node.removal_policy(),
        ..prev.clone()
    })
}

/// Resolve every attribute against the current snapshot
fn resolve_inputs(node: &ResourceNode, snapshot: &StateSnapshot) -> Result<Attributes, Error> {
    let lookup = |r: &Reference| snapshot.output(&r.node, &r.output);
    let mut inputs = Attributes::new();

    for (name, expr) in node.attributes() {
        match expr.resolve(&lookup) {
            Some(value) => {
                inputs.insert(name.clone(), value);
            }
            None => {
                let missing = expr
                    .references()
                    .into_iter()
                    .find(|&r| lookup(r).is_none());
                let (target, output) = missing
                    .map(|r| (r.node.clone(), r.output.clone()))
                    .unwrap_or_else(|| (String::new(), name.clone()));
                return Err(Error::UnresolvedOutput {
                    node: node.id().to_string(),
                    target,
                    output,
                });
            }
        }
    }
    Ok(inputs)
}

fn applied(
    node: &ResourceNode,
    graph: &ResourceGraph,
    provider_id: String,
    inputs: Attributes,
    outputs: Attributes,
) -> AppliedResource {
    AppliedResource {
        kind: node.kind().to_string(),
        provider_id,
        inputs,
        outputs,
        dependencies: dependency_ids(node, graph),
        removal_policy: node.removal_policy(),
        applied_at: Utc::now(),
    }
}

fn dependency_ids(node: &ResourceNode, graph: &ResourceGraph) -> Vec<String> {
    graph
        .dependencies_of(node.id())
        .into_iter()
        .map(String::from)
        .collect()
}

fn provisioning_error(op: &Operation, source: anyhow::Error) -> Error {
    Error::Provisioning {
        node: op.node_id.clone(),
        operation: op.kind,
        source,
    }
}
