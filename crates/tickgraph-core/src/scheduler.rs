//! The tick engine: holds the pending event set, drains it tick by tick in
//! phase-and-group-id order, and tracks the scheduler's lifecycle state.

use std::cell::Cell as StdCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tickgraph_common::{EdgeId, FiringContext, GroupId, KernelError, Phase, Tick, VertexId};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::dag::Dag;
use crate::event::{ContinuationToken, Scheduleable};
use crate::log::{LogRecord, LogSink, NullLogSink};
use crate::report::Report;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Building,
    Configuring,
    Finalized,
    Running,
    TearingDown,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LifecycleState::Building => "Building",
            LifecycleState::Configuring => "Configuring",
            LifecycleState::Finalized => "Finalized",
            LifecycleState::Running => "Running",
            LifecycleState::TearingDown => "TearingDown",
        })
    }
}

struct QueueEntry {
    insertion: u64,
    group_id: GroupId,
    scheduleable: Rc<Scheduleable>,
    token: Option<ContinuationToken>,
}

/// Which (tick, phase) is currently draining, and the highest group-id
/// that has fired so far in this pass. Used to validate handler-inserted
/// entries against the `RetroactiveSchedule` rule.
struct FiringCursor {
    tick: Tick,
    phase: Phase,
    last_fired_group: GroupId,
}

/// Owns the precedence DAG and the per-phase pending-event queues.
pub struct Scheduler {
    dag: Dag,
    config: SchedulerConfig,
    state: LifecycleState,
    current_tick: Tick,
    insertion_counter: u64,
    queues: Vec<BTreeMap<Tick, Vec<QueueEntry>>>,
    firing: Option<FiringCursor>,
    stop_requested: Rc<StdCell<bool>>,
    paused: Rc<StdCell<bool>>,
    log_sink: Box<dyn LogSink>,
    report: Report,
    root_clock: Clock,
    names: Vec<String>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, KernelError> {
        let dag = Dag::new(config.early_cycle_detect)?;
        let queues = (0..Phase::COUNT).map(|_| BTreeMap::new()).collect();
        Ok(Self {
            dag,
            config,
            state: LifecycleState::Building,
            current_tick: Tick::ZERO,
            insertion_counter: 0,
            queues,
            firing: None,
            stop_requested: Rc::new(StdCell::new(false)),
            paused: Rc::new(StdCell::new(false)),
            log_sink: Box::new(NullLogSink),
            report: Report::new(),
            root_clock: Clock::root("root"),
            names: Vec::new(),
        })
    }

    // -- DAG construction (valid in Building/Configuring) -------------

    fn ensure_configuring(&mut self) -> Result<(), KernelError> {
        match self.state {
            LifecycleState::Building => {
                self.state = LifecycleState::Configuring;
                Ok(())
            }
            LifecycleState::Configuring => Ok(()),
            other => Err(KernelError::LifecycleViolation {
                from: other.to_string(),
                to: "DAG edit".to_string(),
            }),
        }
    }

    pub fn new_vertex(&mut self, label: impl Into<String>) -> Result<VertexId, KernelError> {
        self.ensure_configuring()?;
        Ok(self.dag.new_vertex(label))
    }

    pub fn link(
        &mut self,
        src: VertexId,
        dst: VertexId,
        label: impl Into<String>,
    ) -> Result<EdgeId, KernelError> {
        self.ensure_configuring()?;
        self.dag.link(src, dst, label)
    }

    pub fn unlink(&mut self, src: VertexId, dst: VertexId) -> Result<(), KernelError> {
        self.ensure_configuring()?;
        self.dag.unlink(src, dst);
        Ok(())
    }

    pub fn find_or_create_gop(&mut self, name: &str) -> Result<VertexId, KernelError> {
        self.ensure_configuring()?;
        Ok(self.dag.find_or_create_gop(name))
    }

    pub fn add_gop_associate(&mut self, gop: VertexId, vertex: VertexId) -> Result<(), KernelError> {
        self.ensure_configuring()?;
        self.dag.add_gop_associate(gop, vertex);
        Ok(())
    }

    /// The phase GOP a Scheduleable in `phase` should link from/to, for
    /// model code that wants explicit phase ordering beyond what
    /// attaching a Scheduleable to that phase already gives it.
    pub fn phase_vertex(&self, phase: Phase) -> VertexId {
        self.dag.phase_gops().vertex_for(phase)
    }

    pub fn group_id(&self, vertex: VertexId) -> GroupId {
        self.dag.group_id(vertex)
    }

    pub fn root_clock(&self) -> &Clock {
        &self.root_clock
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn report(&mut self) -> &mut Report {
        &mut self.report
    }

    pub fn report_ref(&self) -> &Report {
        &self.report
    }

    pub fn set_log_sink(&mut self, sink: Box<dyn LogSink>) {
        self.log_sink = sink;
    }

    /// Attach a Scheduleable's owning component to a hierarchical name
    /// (e.g. `top.core.lsu.issue`) used only for diagnostics. Names must
    /// be unique within their parent.
    pub fn attach_name(&mut self, full_name: impl Into<String>) -> Result<(), KernelError> {
        let full_name = full_name.into();
        if self.names.iter().any(|n| n == &full_name) {
            return Err(KernelError::config(format!(
                "name '{full_name}' already attached"
            )));
        }
        self.names.push(full_name);
        Ok(())
    }

    // -- Finalization ---------------------------------------------------

    pub fn finalize(&mut self) -> Result<u32, KernelError> {
        if self.state == LifecycleState::Building {
            self.state = LifecycleState::Configuring;
        }
        if self.state != LifecycleState::Configuring {
            return Err(KernelError::LifecycleViolation {
                from: self.state.to_string(),
                to: LifecycleState::Finalized.to_string(),
            });
        }
        let n_groups = self.dag.finalize()?;
        self.state = LifecycleState::Finalized;
        Ok(n_groups)
    }

    // -- Scheduling -------------------------------------------------

    pub(crate) fn target_tick_for(&self, sched: &Scheduleable, delay: Option<u64>) -> Tick {
        let delay_cycles = delay.unwrap_or(sched.default_delay());
        let root_delay = crate::clock::cycles_to_root_ticks(sched.clock(), delay_cycles);
        Tick(self.current_tick.0 + root_delay)
    }

    pub(crate) fn enqueue(
        &mut self,
        sched: Rc<Scheduleable>,
        target_tick: Tick,
        token: Option<ContinuationToken>,
    ) -> Result<(), KernelError> {
        match self.state {
            LifecycleState::Finalized | LifecycleState::Running => {}
            _ => return Err(KernelError::NotFinalized),
        }
        if !sched.clock().is_active() {
            return Err(KernelError::ClockInactive);
        }

        let group_id = self.dag.group_id(sched.vertex());
        let phase = sched.phase();

        if let Some(cursor) = &self.firing {
            let retroactive = cursor.tick == target_tick
                && (phase < cursor.phase
                    || (phase == cursor.phase && group_id < cursor.last_fired_group));
            if retroactive {
                return Err(KernelError::RetroactiveSchedule {
                    context: FiringContext::new(cursor.tick, cursor.phase, cursor.last_fired_group, sched.name()),
                    target: group_id,
                    firing: cursor.last_fired_group,
                });
            }
        }

        let insertion = self.insertion_counter;
        self.insertion_counter += 1;

        self.queues[phase.as_index()]
            .entry(target_tick)
            .or_default()
            .push(QueueEntry {
                insertion,
                group_id,
                scheduleable: sched,
                token,
            });
        Ok(())
    }

    pub(crate) fn cancel_all_for(&mut self, vertex: VertexId) {
        for bucket_map in &mut self.queues {
            for bucket in bucket_map.values_mut() {
                bucket.retain(|e| e.scheduleable.vertex() != vertex);
            }
        }
    }

    pub(crate) fn cancel_token(&mut self, vertex: VertexId, phase: Phase, token: ContinuationToken) {
        for bucket in self.queues[phase.as_index()].values_mut() {
            bucket.retain(|e| !(e.scheduleable.vertex() == vertex && e.token == Some(token)));
        }
    }

    // -- Run loop ---------------------------------------------------

    fn next_pending_tick(&self) -> Option<Tick> {
        self.queues
            .iter()
            .filter_map(|bucket_map| {
                bucket_map
                    .iter()
                    .find(|(_, v)| !v.is_empty())
                    .map(|(tick, _)| *tick)
            })
            .min()
    }

    fn pop_min_entry(&mut self, tick: Tick, phase: Phase) -> Option<QueueEntry> {
        let bucket = self.queues[phase.as_index()].get_mut(&tick)?;
        if bucket.is_empty() {
            return None;
        }
        let min_idx = bucket
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.group_id, e.insertion))
            .map(|(i, _)| i)?;
        Some(bucket.remove(min_idx))
    }

    /// Request the run loop to stop after the current tick completes all
    /// phases. Safe to call from any context; does not preempt a running
    /// handler.
    pub fn request_stop(&self) {
        self.stop_requested.set(true);
    }

    /// Cooperative pause, checked between ticks. Does not preempt a
    /// running handler or a tick already in progress.
    pub fn pause(&self) {
        self.paused.set(true);
    }

    pub fn resume(&self) {
        self.paused.set(false);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    /// `request_stop()` plus marking intent to tear down once the current
    /// tick finishes.
    pub fn terminate(&self) {
        self.request_stop();
    }

    /// Drain pending events tick-by-tick, in (tick, phase, group-id,
    /// insertion) order, until no events remain, `max_run_ticks` ticks
    /// have elapsed since entry, or `request_stop()` was called.
    /// `run()` using `SchedulerConfig::default_max_run_ticks` as the budget.
    pub fn run_default(&mut self) -> Result<(), KernelError> {
        self.run(self.config.default_max_run_ticks)
    }

    pub fn run(&mut self, max_run_ticks: u64) -> Result<(), KernelError> {
        if self.state != LifecycleState::Finalized {
            return Err(KernelError::LifecycleViolation {
                from: self.state.to_string(),
                to: LifecycleState::Running.to_string(),
            });
        }
        if self.next_pending_tick().is_none() {
            return Ok(());
        }
        self.state = LifecycleState::Running;
        self.stop_requested.set(false);

        let start_tick = self.current_tick;
        let result = self.run_inner(start_tick, max_run_ticks);

        self.state = LifecycleState::Finalized;
        result
    }

    fn run_inner(&mut self, start_tick: Tick, max_run_ticks: u64) -> Result<(), KernelError> {
        loop {
            if self.paused.get() {
                return Ok(());
            }
            let Some(next_tick) = self.next_pending_tick() else {
                return Ok(());
            };
            self.current_tick = next_tick;

            for phase in Phase::ALL {
                self.drain_phase(next_tick, phase)?;
            }

            self.log_sink.log(&LogRecord {
                level: crate::log::Level::Debug,
                tick: self.current_tick,
                phase: Phase::PostTick,
                group: GroupId::UNSORTED,
                component: "scheduler",
                message: "tick complete",
            });

            if self.stop_requested.get() {
                return Ok(());
            }
            if self.current_tick.0 >= start_tick.0.saturating_add(max_run_ticks) {
                return Ok(());
            }
        }
    }

    fn drain_phase(&mut self, tick: Tick, phase: Phase) -> Result<(), KernelError> {
        self.firing = Some(FiringCursor {
            tick,
            phase,
            last_fired_group: GroupId(0),
        });

        while let Some(entry) = self.pop_min_entry(tick, phase) {
            if let Some(cursor) = &mut self.firing {
                cursor.last_fired_group = entry.group_id;
            }
            let group = entry.group_id;
            let name = entry.scheduleable.name().to_string();
            if let Err(source) = entry.scheduleable.invoke(entry.token) {
                self.firing = None;
                return Err(KernelError::HandlerFailed {
                    context: FiringContext::new(tick, phase, group, name),
                    source,
                });
            }
        }

        self.firing = None;
        Ok(())
    }

    // -- Teardown ---------------------------------------------------

    pub fn teardown(&mut self) -> Result<(), KernelError> {
        if self.state != LifecycleState::Finalized {
            return Err(KernelError::LifecycleViolation {
                from: self.state.to_string(),
                to: LifecycleState::TearingDown.to_string(),
            });
        }
        self.state = LifecycleState::TearingDown;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::event::OneShotEvent;
    use std::cell::RefCell;

    #[test]
    fn run_with_no_pending_events_leaves_tick_unchanged() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.finalize().unwrap();
        let before = scheduler.current_tick();
        scheduler.run(10).unwrap();
        assert_eq!(scheduler.current_tick(), before);
    }

    #[test]
    fn firing_order_respects_tick_phase_group_insertion() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let a = scheduler.new_vertex("a").unwrap();
        let b = scheduler.new_vertex("b").unwrap();
        scheduler.link(a, b, "a-before-b").unwrap();
        scheduler.finalize().unwrap();

        let order = Rc::new(RefCell::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();
        let clock = scheduler.root_clock().clone();

        let ev_b = OneShotEvent::new("b", clock.clone(), Phase::Tick, 0, b, move || {
            order_b.borrow_mut().push("b");
            Ok(())
        });
        let ev_a = OneShotEvent::new("a", clock, Phase::Tick, 0, a, move || {
            order_a.borrow_mut().push("a");
            Ok(())
        });

        // Schedule b first to prove ordering comes from group-id, not
        // insertion order.
        ev_b.schedule(&mut scheduler, Some(0)).unwrap();
        ev_a.schedule(&mut scheduler, Some(0)).unwrap();
        scheduler.run(1).unwrap();

        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn retroactive_schedule_within_current_phase_errors() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let a = scheduler.new_vertex("a").unwrap();
        let b = scheduler.new_vertex("b").unwrap();
        scheduler.link(a, b, "a-before-b").unwrap();
        scheduler.finalize().unwrap();

        let clock = scheduler.root_clock().clone();
        let scheduler_ptr: *mut Scheduler = &mut scheduler;
        let vertex_a = a;
        let ev_b = OneShotEvent::new("b", clock.clone(), Phase::Tick, 0, b, move || {
            // SAFETY: test-only reentrant access within the same handler
            // invocation, matching how a model component would hold a
            // scheduler reference passed into its handler.
            let scheduler = unsafe { &mut *scheduler_ptr };
            let clock = scheduler.root_clock().clone();
            let retro = OneShotEvent::new("retro", clock, Phase::Tick, 0, vertex_a, || Ok(()));
            let err = retro.schedule(scheduler, Some(0)).unwrap_err();
            assert!(matches!(err, KernelError::RetroactiveSchedule { .. }));
            Ok(())
        });
        ev_b.schedule(&mut scheduler, Some(0)).unwrap();
        scheduler.run(1).unwrap();
    }

    #[test]
    fn dag_edit_after_finalize_is_lifecycle_violation() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.finalize().unwrap();
        let err = scheduler.new_vertex("late").unwrap_err();
        assert!(matches!(err, KernelError::LifecycleViolation { .. }));
    }

    #[test]
    fn request_stop_completes_current_tick_then_exits() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let a = scheduler.new_vertex("a").unwrap();
        scheduler.finalize().unwrap();

        let fired = Rc::new(StdCell::new(0));
        let fired_in = fired.clone();
        let clock = scheduler.root_clock().clone();
        let scheduler_ptr: *mut Scheduler = &mut scheduler;
        let ev = OneShotEvent::new("a", clock, Phase::Tick, 0, a, move || {
            fired_in.set(fired_in.get() + 1);
            let scheduler = unsafe { &*scheduler_ptr };
            scheduler.request_stop();
            Ok(())
        });
        ev.schedule(&mut scheduler, Some(0)).unwrap();
        scheduler.run(100).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[derive(Debug)]
    struct BoomError;

    impl std::fmt::Display for BoomError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for BoomError {}

    #[test]
    fn handler_failure_propagates_out_of_run_with_firing_context() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let a = scheduler.new_vertex("a").unwrap();
        scheduler.finalize().unwrap();

        let clock = scheduler.root_clock().clone();
        let ev = OneShotEvent::new("boom", clock, Phase::Tick, 0, a, || Err(Box::new(BoomError)));
        ev.schedule(&mut scheduler, Some(0)).unwrap();

        let err = scheduler.run(1).unwrap_err();
        match err {
            KernelError::HandlerFailed { context, .. } => {
                assert_eq!(context.tick, Tick(1));
                assert_eq!(context.phase, Phase::Tick);
                assert_eq!(context.component, "boom");
            }
            other => panic!("expected HandlerFailed, got {other:?}"),
        }
        // The scheduler returns to Finalized even after a handler failure,
        // so a subsequent run() could in principle proceed.
        assert_eq!(scheduler.state(), LifecycleState::Finalized);
    }
}
