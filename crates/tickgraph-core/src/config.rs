//! Builder-style configuration structs for the pool and scheduler.

use tickgraph_common::Phase;

/// Configuration for an [`crate::pool::ArenaPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_blocks: usize,
    pub watermark: usize,
}

impl PoolConfig {
    pub fn new(max_blocks: usize, watermark: usize) -> Self {
        Self {
            max_blocks,
            watermark,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_blocks: 4096,
            watermark: 3072,
        }
    }
}

/// Configuration for a [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Run an O(V+E) cycle search after every `Dag::link`, failing fast
    /// during model bring-up instead of only at `finalize()`.
    pub early_cycle_detect: bool,
    /// Phase used by Scheduleables that do not specify one explicitly.
    pub default_phase: Phase,
    /// Default `max_run_ticks` passed to `Scheduler::run` when the caller
    /// doesn't override it.
    pub default_max_run_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            early_cycle_detect: true,
            default_phase: Phase::Tick,
            default_max_run_ticks: u64::MAX,
        }
    }
}

impl SchedulerConfig {
    pub fn with_early_cycle_detect(mut self, enable: bool) -> Self {
        self.early_cycle_detect = enable;
        self
    }

    pub fn with_default_phase(mut self, phase: Phase) -> Self {
        self.default_phase = phase;
        self
    }

    pub fn with_default_max_run_ticks(mut self, ticks: u64) -> Self {
        self.default_max_run_ticks = ticks;
        self
    }
}
