//! Provisioning and progress traits
//!
//! These traits let the engine drive any backend without depending on a
//! specific cloud SDK, UI toolkit, or signal handling crate.

use crate::diff::Operation;
use crate::types::{ApplyResult, ApplySummary, Attributes};
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a provider returns after creating a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    /// Identifier used for later updates and deletes
    pub provider_id: String,
    /// Concrete attributes, including computed ones
    pub outputs: Attributes,
}

/// External provisioning API
///
/// Implementations talk to the real backend. Calls are made one node at a
/// time; with `jobs > 1` unrelated nodes may be provisioned from several
/// threads at once.
pub trait Provisioner: Send + Sync {
    /// Create a resource of `kind` with fully resolved attributes
    fn create(&self, kind: &str, attrs: &Attributes) -> Result<Provisioned>;

    /// Update an existing resource in place, returning its new outputs
    fn update(&self, provider_id: &str, attrs: &Attributes) -> Result<Attributes>;

    /// Delete an existing resource
    fn delete(&self, provider_id: &str) -> Result<()>;
}

impl<P: Provisioner + ?Sized> Provisioner for Box<P> {
    fn create(&self, kind: &str, attrs: &Attributes) -> Result<Provisioned> {
        (**self).create(kind, attrs)
    }

    fn update(&self, provider_id: &str, attrs: &Attributes) -> Result<Attributes> {
        (**self).update(provider_id, attrs)
    }

    fn delete(&self, provider_id: &str) -> Result<()> {
        (**self).delete(provider_id)
    }
}

/// Progress callback for apply
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called once before the first operation
    fn on_start(&mut self, total: usize);

    /// Called when an operation is about to run
    fn on_operation_start(&mut self, op: &Operation);

    /// Called when an operation finishes, successfully or not
    fn on_operation_complete(&mut self, op: &Operation, result: &ApplyResult);

    /// Called once after the last operation that ran
    fn on_finish(&mut self, summary: &ApplySummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_operation_start(&mut self, _op: &Operation) {}
    fn on_operation_complete(&mut self, _op: &Operation, _result: &ApplyResult) {}
    fn on_finish(&mut self, _summary: &ApplySummary) {}
}

/// Cooperative cancellation flag
///
/// Checked between operations; an in-flight provider call always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    ///
    /// Only touches an atomic, so it is safe to call from a signal handler.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
