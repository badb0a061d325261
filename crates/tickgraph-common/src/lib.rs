//! Shared identifiers, phase ordering, and error taxonomy for the tickgraph
//! precedence kernel.
//!
//! This crate has no knowledge of the DAG, scheduler, or pool implementations
//! in `tickgraph-core` — it exists so that those pieces (and anything a host
//! application builds on top of them) can agree on the same small vocabulary
//! of ids and error kinds without a dependency cycle.

pub mod error;
pub mod ids;
pub mod phase;

pub use error::{CycleTrace, FiringContext, KernelError};
pub use ids::{EdgeId, GroupId, Tick, VertexId};
pub use phase::Phase;
