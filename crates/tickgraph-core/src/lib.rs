//! Phase-ordered discrete-event scheduling kernel.
//!
//! A model is built as a precedence DAG of [`event::Scheduleable`]s grouped
//! into seven totally ordered phases per tick. [`dag::Dag::finalize`] sorts
//! the DAG into dense group-ids; [`scheduler::Scheduler::run`] then drains
//! pending events in `(tick, phase, group-id, insertion order)` order until
//! the queue empties or a run budget is hit. [`pool::ArenaPool`] gives model
//! components a fixed-capacity, ref-counted object arena for the payloads
//! those events carry.

pub mod clock;
pub mod config;
pub mod dag;
pub mod event;
pub mod log;
pub mod pool;
pub mod port;
pub mod report;
pub mod scheduler;

pub use clock::Clock;
pub use config::{PoolConfig, SchedulerConfig};
pub use dag::{Dag, PhaseGops};
pub use event::{
    ContinuationToken, HandlerError, HandlerResult, OneShotEvent, PayloadEvent, Scheduleable,
    UniqueEvent, gop_precedes, precedes, precedes_gop,
};
pub use log::{Level, LogRecord, LogSink, NullLogSink};
#[cfg(feature = "tracing")]
pub use log::TracingLogSink;
pub use pool::{ArenaPool, CellRef, SharedHandle, WeakHandle};
pub use port::{InPort, OutPort, SignalInPort, SignalOutPort, SyncInPort, SyncOutPort};
pub use report::{Counter, Report};
pub use scheduler::{LifecycleState, Scheduler};

pub use tickgraph_common::{CycleTrace, EdgeId, FiringContext, GroupId, KernelError, Phase, Tick, VertexId};

#[cfg(test)]
pub mod testutil;
