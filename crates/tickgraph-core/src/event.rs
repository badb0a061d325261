//! The Scheduleable and its three event variants: one-shot, unique
//! (coalescing), and payload-carrying.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slab::Slab;

use tickgraph_common::{KernelError, Phase, Tick, VertexId};

use crate::clock::Clock;
use crate::scheduler::Scheduler;

/// Identifies a prepared payload cell so it can be scheduled or cancelled
/// in O(1).
pub type ContinuationToken = u32;

/// The error a handler raises when it cannot complete. Not required to be
/// `Send`/`Sync`: the kernel is single-threaded (§5) and a handler's error
/// may legitimately close over thread-local state.
pub type HandlerError = Box<dyn std::error::Error>;

/// What a Scheduleable's handler returns. An `Err` here propagates out of
/// `Scheduler::run` as `KernelError::HandlerFailed`, with the firing
/// tick/phase/group-id/component attached, and terminates the run loop.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Rc<RefCell<dyn FnMut(Option<ContinuationToken>) -> HandlerResult>>;

/// The atomic unit the scheduler fires: a handler, a phase, a default
/// delay, and a vertex in the precedence DAG. Built by the three event
/// variants below; rarely constructed directly by model code.
pub struct Scheduleable {
    name: String,
    clock: Clock,
    phase: Phase,
    default_delay: u64,
    vertex: VertexId,
    handler: Handler,
}

impl Scheduleable {
    pub fn new(
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        default_delay: u64,
        vertex: VertexId,
        handler: impl FnMut(Option<ContinuationToken>) -> HandlerResult + 'static,
    ) -> Rc<Scheduleable> {
        Rc::new(Self {
            name: name.into(),
            clock,
            phase,
            default_delay,
            vertex,
            handler: Rc::new(RefCell::new(handler)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn default_delay(&self) -> u64 {
        self.default_delay
    }

    pub(crate) fn invoke(&self, token: Option<ContinuationToken>) -> HandlerResult {
        (self.handler.borrow_mut())(token)
    }
}

/// `a precedes b`: adds a DAG edge from `a`'s vertex to `b`'s vertex. Pure
/// edge-builder; schedules nothing.
pub fn precedes(scheduler: &mut Scheduler, a: &Scheduleable, b: &Scheduleable) -> Result<(), KernelError> {
    scheduler.link(a.vertex, b.vertex, format!("{} precedes {}", a.name, b.name))?;
    Ok(())
}

/// `a precedes GOP("...")`.
pub fn precedes_gop(scheduler: &mut Scheduler, a: &Scheduleable, gop: VertexId) -> Result<(), KernelError> {
    scheduler.link(a.vertex, gop, format!("{} precedes gop", a.name))?;
    Ok(())
}

/// `GOP("...") precedes b`.
pub fn gop_precedes(scheduler: &mut Scheduler, gop: VertexId, b: &Scheduleable) -> Result<(), KernelError> {
    scheduler.link(gop, b.vertex, format!("gop precedes {}", b.name))?;
    Ok(())
}

/// Every `schedule(delay)` creates an independent tick queue entry. Two
/// schedules at the same (tick, phase, group-id) fire twice, in insertion
/// order.
pub struct OneShotEvent {
    sched: Rc<Scheduleable>,
}

impl OneShotEvent {
    pub fn new(
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        default_delay: u64,
        vertex: VertexId,
        handler: impl FnMut() -> HandlerResult + 'static,
    ) -> Self {
        let mut handler = handler;
        let sched = Scheduleable::new(name, clock, phase, default_delay, vertex, move |_| {
            handler()
        });
        Self { sched }
    }

    pub fn scheduleable(&self) -> &Rc<Scheduleable> {
        &self.sched
    }

    pub fn schedule(&self, scheduler: &mut Scheduler, delay: Option<u64>) -> Result<(), KernelError> {
        let target = scheduler.target_tick_for(&self.sched, delay);
        scheduler.enqueue(self.sched.clone(), target, None)
    }

    /// Remove every pending entry for this event.
    pub fn cancel_all(&self, scheduler: &mut Scheduler) {
        scheduler.cancel_all_for(self.sched.vertex());
    }
}

/// At most one pending entry per (tick, phase); repeated `schedule(delay)`
/// within the tick it would land on is a no-op after the first.
///
/// Tracks every distinct tick this event currently has a queued entry for
/// (not just the most recently requested one), so that interleaving
/// `schedule` calls with different delays before either has fired still
/// dedupes correctly per target tick. Each pending tick occupies a slot in
/// a small slab; the slot's index travels as the queue entry's
/// continuation token so the firing entry can remove exactly itself.
pub struct UniqueEvent {
    sched: Rc<Scheduleable>,
    pending: Rc<RefCell<Slab<Tick>>>,
}

impl UniqueEvent {
    pub fn new(
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        default_delay: u64,
        vertex: VertexId,
        mut handler: impl FnMut() -> HandlerResult + 'static,
    ) -> Self {
        let pending: Rc<RefCell<Slab<Tick>>> = Rc::new(RefCell::new(Slab::new()));
        let pending_in_handler = pending.clone();
        let sched = Scheduleable::new(name, clock, phase, default_delay, vertex, move |token| {
            if let Some(token) = token {
                pending_in_handler.borrow_mut().try_remove(token as usize);
            }
            handler()
        });
        Self { sched, pending }
    }

    pub fn scheduleable(&self) -> &Rc<Scheduleable> {
        &self.sched
    }

    pub fn schedule(&self, scheduler: &mut Scheduler, delay: Option<u64>) -> Result<(), KernelError> {
        let target = scheduler.target_tick_for(&self.sched, delay);
        if self.pending.borrow().iter().any(|(_, &t)| t == target) {
            return Ok(());
        }
        let slot = self.pending.borrow_mut().insert(target);
        if let Err(err) = scheduler.enqueue(self.sched.clone(), target, Some(slot as ContinuationToken)) {
            self.pending.borrow_mut().try_remove(slot);
            return Err(err);
        }
        Ok(())
    }

    /// Cancel every still-pending entry for this event, at any tick. A
    /// no-op for entries that have already fired.
    pub fn cancel(&self, scheduler: &mut Scheduler) {
        scheduler.cancel_all_for(self.sched.vertex());
        self.pending.borrow_mut().clear();
    }
}

struct PayloadCell<T> {
    value: Option<T>,
}

/// `prepare_payload(value) -> token`; `schedule(token, delay)` enqueues
/// that specific cell; `cancel(token)` removes it if still pending.
/// Payloads outlive the prepare call until the cell fires or is
/// cancelled.
pub struct PayloadEvent<T> {
    sched: Rc<Scheduleable>,
    cells: Rc<RefCell<Slab<PayloadCell<T>>>>,
}

impl<T: 'static> PayloadEvent<T> {
    pub fn new(
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        default_delay: u64,
        vertex: VertexId,
        mut on_fire: impl FnMut(T) -> HandlerResult + 'static,
    ) -> Self {
        let cells: Rc<RefCell<Slab<PayloadCell<T>>>> = Rc::new(RefCell::new(Slab::new()));
        let cells_in_handler = cells.clone();
        let sched = Scheduleable::new(name, clock, phase, default_delay, vertex, move |token| {
            let token = token.expect("payload event fired without a continuation token");
            let cell = cells_in_handler.borrow_mut().try_remove(token as usize);
            if let Some(PayloadCell { value: Some(value) }) = cell {
                on_fire(value)
            } else {
                Ok(())
            }
        });
        Self { sched, cells }
    }

    pub fn scheduleable(&self) -> &Rc<Scheduleable> {
        &self.sched
    }

    /// Stage `value` for later delivery, returning a token valid until the
    /// cell fires or is cancelled.
    pub fn prepare_payload(&self, value: T) -> ContinuationToken {
        self.cells
            .borrow_mut()
            .insert(PayloadCell { value: Some(value) }) as ContinuationToken
    }

    pub fn schedule(
        &self,
        scheduler: &mut Scheduler,
        token: ContinuationToken,
        delay: Option<u64>,
    ) -> Result<(), KernelError> {
        if !self.cells.borrow().contains(token as usize) {
            return Err(KernelError::InvalidContinuation { token });
        }
        let target = scheduler.target_tick_for(&self.sched, delay);
        scheduler.enqueue(self.sched.clone(), target, Some(token))
    }

    /// Schedule `token` for delivery at an absolute tick, bypassing the
    /// clock-ratio delay conversion `schedule` applies. For callers that
    /// have already resolved the target tick themselves (cross-clock port
    /// sends rounding to a destination edge) and would otherwise have that
    /// tick re-interpreted as a cycle count on the Scheduleable's own clock.
    pub fn schedule_at(
        &self,
        scheduler: &mut Scheduler,
        token: ContinuationToken,
        target_tick: Tick,
    ) -> Result<(), KernelError> {
        if !self.cells.borrow().contains(token as usize) {
            return Err(KernelError::InvalidContinuation { token });
        }
        scheduler.enqueue(self.sched.clone(), target_tick, Some(token))
    }

    pub fn cancel(&self, scheduler: &mut Scheduler, token: ContinuationToken) -> Result<(), KernelError> {
        if self.cells.borrow_mut().try_remove(token as usize).is_none() {
            return Err(KernelError::InvalidContinuation { token });
        }
        scheduler.cancel_token(self.sched.vertex(), self.sched.phase(), token);
        Ok(())
    }
}
