//! The kernel's error taxonomy.
//!
//! Every fallible entry point in `tickgraph-core` returns a [`KernelError`].
//! Each variant corresponds to one of the kinds named in the kernel's error
//! taxonomy; variants that fire mid-run carry a [`FiringContext`] so the
//! caller can report exactly where (tick/phase/group/component) things went
//! wrong.

use std::fmt;

use thiserror::Error;

use crate::ids::{GroupId, Tick, VertexId};
use crate::phase::Phase;

/// Where in the firing order an error occurred.
///
/// Attached to errors raised from inside a handler so that a fatal message
/// can always identify tick/phase/group-id/component, per the kernel's
/// user-visible error contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiringContext {
    pub tick: Tick,
    pub phase: Phase,
    pub group: GroupId,
    pub component: String,
}

impl FiringContext {
    pub fn new(tick: Tick, phase: Phase, group: GroupId, component: impl Into<String>) -> Self {
        Self {
            tick,
            phase,
            group,
            component: component.into(),
        }
    }
}

impl fmt::Display for FiringContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tick, self.phase, self.group, self.component
        )
    }
}

/// The vertex sequence that forms a detected precedence cycle, kept in both
/// the order discovered (for a human-readable trace) and ready to render as
/// a DOT subgraph for tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleTrace {
    pub vertices: Vec<VertexId>,
    pub labels: Vec<String>,
}

impl CycleTrace {
    pub fn new(vertices: Vec<VertexId>, labels: Vec<String>) -> Self {
        debug_assert_eq!(vertices.len(), labels.len());
        Self { vertices, labels }
    }

    /// Render the cycle as a human-readable arrow chain: `a -> b -> c -> a`.
    pub fn as_text(&self) -> String {
        let mut s = String::new();
        for label in &self.labels {
            if !s.is_empty() {
                s.push_str(" -> ");
            }
            s.push_str(label);
        }
        if let Some(first) = self.labels.first() {
            s.push_str(" -> ");
            s.push_str(first);
        }
        s
    }

    /// Render the cycle as a minimal DOT digraph for external tooling.
    pub fn as_dot(&self) -> String {
        let mut out = String::from("digraph cycle {\n\trankdir=LR;\n");
        for pair in self.labels.windows(2) {
            out.push_str(&format!("\t\"{}\" -> \"{}\";\n", pair[0], pair[1]));
        }
        if let (Some(last), Some(first)) = (self.labels.last(), self.labels.first()) {
            out.push_str(&format!("\t\"{}\" -> \"{}\";\n", last, first));
        }
        out.push_str("}\n");
        out
    }
}

/// The kernel's complete error taxonomy.
///
/// Propagation policy: variants raised while the scheduler is still
/// Building/Configuring propagate to the caller of whatever setup function
/// triggered them and leave the system in Configuring. Variants raised from
/// inside a handler carry a [`FiringContext`] and propagate out of `run()`.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Invalid constructor arguments: watermark above capacity, missing
    /// required wiring, and similar setup-time mistakes.
    #[error("config error: {0}")]
    Config(String),

    /// A precedence cycle was detected during linking or sort.
    #[error("precedence cycle detected: {}", .0.as_text())]
    Cycle(CycleTrace),

    /// A GOP associate already carried a group-id from another source.
    #[error("ordering conflict: vertex {vertex} already has a group-id from another controller")]
    OrderingConflict { vertex: VertexId },

    /// The arena pool could not allocate within its configured capacity.
    #[error("pool out of capacity: {live}/{max} objects live")]
    OutOfCapacity { live: usize, max: usize },

    /// A payload token referenced a cell that already fired or was cancelled.
    #[error("invalid continuation token {token}")]
    InvalidContinuation { token: u32 },

    /// An operation was attempted against a scheduler that has not yet been
    /// finalized.
    #[error("scheduler is not finalized yet")]
    NotFinalized,

    /// An operation targeted a clock whose owning scheduler has torn down.
    #[error("clock is inactive")]
    ClockInactive,

    /// A handler tried to schedule an event with (phase, group-id) strictly
    /// less than the position currently being drained.
    #[error("retroactive schedule at {context}: target group {target} < firing group {firing}")]
    RetroactiveSchedule {
        context: FiringContext,
        target: GroupId,
        firing: GroupId,
    },

    /// An illegal backward state transition was attempted (e.g. Running ->
    /// Building). Always a programming error, always fatal.
    #[error("lifecycle violation: cannot move from {from} back to {to}")]
    LifecycleViolation { from: String, to: String },

    /// A handler raised an error while firing; the context pinpoints exactly
    /// where. The run loop guarantees internal state stays consistent, so a
    /// subsequent `run()` could in principle proceed, but this is a
    /// diagnostic path, not a recovery path.
    #[error("handler failed at {context}: {source}")]
    HandlerFailed {
        context: FiringContext,
        #[source]
        source: Box<dyn std::error::Error>,
    },
}

impl KernelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
