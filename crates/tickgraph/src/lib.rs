//! Meta crate that re-exports the tickgraph precedence kernel with sensible
//! defaults. Downstream host models can depend on this crate alone and opt
//! into deeper integration (e.g. a `tracing`-backed log sink) via feature
//! flags while keeping access to the underlying crates directly.

#[cfg(feature = "core")]
pub use tickgraph_core as core;

#[cfg(feature = "core")]
pub use tickgraph_core::{
    clock::Clock,
    config::{PoolConfig, SchedulerConfig},
    dag::{Dag, PhaseGops},
    event::{
        ContinuationToken, HandlerError, HandlerResult, OneShotEvent, PayloadEvent, Scheduleable,
        UniqueEvent, gop_precedes, precedes, precedes_gop,
    },
    log::{Level, LogRecord, LogSink, NullLogSink},
    pool::{ArenaPool, CellRef, SharedHandle, WeakHandle},
    port::{InPort, OutPort, SignalInPort, SignalOutPort, SyncInPort, SyncOutPort},
    report::{Counter, Report},
    scheduler::{LifecycleState, Scheduler},
};

#[cfg(feature = "tracing")]
pub use tickgraph_core::log::TracingLogSink;

#[cfg(feature = "core")]
pub mod doc_examples;

pub use tickgraph_common::{
    CycleTrace, EdgeId, FiringContext, GroupId, KernelError, Phase, Tick, VertexId,
};
