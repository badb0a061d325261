//! Producer/consumer port bindings that transport payloads across the
//! precedence DAG and, for sync ports, across clock boundaries.
//!
//! Binding an `OutPort` to an `InPort` adds a DAG edge `OutPort -> InPort`,
//! so model code never has to call `precedes` by hand for wiring that is
//! already expressed by a port connection. Sending a value on an `OutPort`
//! schedules a [`PayloadEvent`] at the `InPort`'s phase (default
//! `PortUpdate`), carrying the value to the registered consumer handler.

use std::rc::Rc;

use tickgraph_common::{KernelError, Phase, Tick, VertexId};

use crate::clock::Clock;
use crate::event::{HandlerResult, OneShotEvent, PayloadEvent};
use crate::scheduler::Scheduler;

/// An inbound binding point: owns the [`PayloadEvent`] that delivers to the
/// registered consumer and the vertex producers link against.
pub struct InPort<T> {
    name: String,
    vertex: VertexId,
    phase: Phase,
    delay: u64,
    event: Rc<PayloadEvent<T>>,
}

impl<T: 'static> InPort<T> {
    pub fn new(
        scheduler: &mut Scheduler,
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        delay: u64,
        on_receive: impl FnMut(T) -> HandlerResult + 'static,
    ) -> Result<Self, KernelError> {
        let name = name.into();
        let vertex = scheduler.new_vertex(format!("inport:{name}"))?;
        let event = Rc::new(PayloadEvent::new(name.clone(), clock, phase, delay, vertex, on_receive));
        Ok(Self {
            name,
            vertex,
            phase,
            delay,
            event,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub(crate) fn event(&self) -> Rc<PayloadEvent<T>> {
        self.event.clone()
    }
}

/// An outbound binding point. `bind` registers a precedence edge to an
/// `InPort`'s vertex and remembers its event so `send` can deliver to it.
pub struct OutPort<T> {
    name: String,
    vertex: VertexId,
    bindings: Vec<Rc<PayloadEvent<T>>>,
}

impl<T: Clone + 'static> OutPort<T> {
    pub fn new(scheduler: &mut Scheduler, name: impl Into<String>) -> Result<Self, KernelError> {
        let name = name.into();
        let vertex = scheduler.new_vertex(format!("outport:{name}"))?;
        Ok(Self {
            name,
            vertex,
            bindings: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    /// Bind this port to `consumer`, adding the `OutPort -> InPort` edge.
    pub fn bind(&mut self, scheduler: &mut Scheduler, consumer: &InPort<T>) -> Result<(), KernelError> {
        scheduler.link(self.vertex, consumer.vertex, format!("{}->{}", self.name, consumer.name))?;
        self.bindings.push(consumer.event());
        Ok(())
    }

    /// Send `value` to every bound consumer, each scheduled independently
    /// at its own `InPort`'s phase and delay.
    pub fn send(&self, scheduler: &mut Scheduler, value: T) -> Result<(), KernelError> {
        for binding in &self.bindings {
            let token = binding.prepare_payload(value.clone());
            binding.schedule(scheduler, token, None)?;
        }
        Ok(())
    }
}

/// A payload-free input: fires its handler with no value attached.
pub struct SignalInPort {
    name: String,
    vertex: VertexId,
    event: Rc<OneShotEvent>,
}

impl SignalInPort {
    pub fn new(
        scheduler: &mut Scheduler,
        name: impl Into<String>,
        clock: Clock,
        phase: Phase,
        delay: u64,
        on_receive: impl FnMut() -> HandlerResult + 'static,
    ) -> Result<Self, KernelError> {
        let name = name.into();
        let vertex = scheduler.new_vertex(format!("signal_in:{name}"))?;
        let event = Rc::new(OneShotEvent::new(name.clone(), clock, phase, delay, vertex, on_receive));
        Ok(Self { name, vertex, event })
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }
}

/// A payload-free pulse port: `fire` wakes every bound consumer.
pub struct SignalOutPort {
    name: String,
    vertex: VertexId,
    bindings: Vec<Rc<OneShotEvent>>,
}

impl SignalOutPort {
    pub fn new(scheduler: &mut Scheduler, name: impl Into<String>) -> Result<Self, KernelError> {
        let name = name.into();
        let vertex = scheduler.new_vertex(format!("signal_out:{name}"))?;
        Ok(Self {
            name,
            vertex,
            bindings: Vec::new(),
        })
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn bind(&mut self, scheduler: &mut Scheduler, consumer: &SignalInPort) -> Result<(), KernelError> {
        scheduler.link(self.vertex, consumer.vertex, format!("{}->{}", self.name, consumer.name))?;
        self.bindings.push(consumer.event.clone());
        Ok(())
    }

    pub fn fire(&self, scheduler: &mut Scheduler) -> Result<(), KernelError> {
        for binding in &self.bindings {
            binding.schedule(scheduler, None)?;
        }
        Ok(())
    }
}

/// The downstream half of a port that crosses a clock boundary. Identical
/// to `InPort` except it remembers its own clock so a bound `SyncOutPort`
/// can round sends forward to its next edge.
pub struct SyncInPort<T> {
    inner: InPort<T>,
    dest_clock: Clock,
}

impl<T: 'static> SyncInPort<T> {
    pub fn new(
        scheduler: &mut Scheduler,
        name: impl Into<String>,
        dest_clock: Clock,
        phase: Phase,
        on_receive: impl FnMut(T) -> HandlerResult + 'static,
    ) -> Result<Self, KernelError> {
        let inner = InPort::new(scheduler, name, dest_clock.clone(), phase, 0, on_receive)?;
        Ok(Self { inner, dest_clock })
    }

    pub fn vertex(&self) -> VertexId {
        self.inner.vertex
    }
}

pub struct SyncOutPort<T> {
    name: String,
    vertex: VertexId,
    bindings: Vec<(Rc<PayloadEvent<T>>, Clock)>,
}

impl<T: Clone + 'static> SyncOutPort<T> {
    pub fn new(scheduler: &mut Scheduler, name: impl Into<String>) -> Result<Self, KernelError> {
        let name = name.into();
        let vertex = scheduler.new_vertex(format!("sync_out:{name}"))?;
        Ok(Self {
            name,
            vertex,
            bindings: Vec::new(),
        })
    }

    pub fn bind(&mut self, scheduler: &mut Scheduler, consumer: &SyncInPort<T>) -> Result<(), KernelError> {
        scheduler.link(
            self.vertex,
            consumer.vertex(),
            format!("{}->{}", self.name, consumer.inner.name),
        )?;
        self.bindings.push((consumer.inner.event(), consumer.dest_clock.clone()));
        Ok(())
    }

    /// Send `value`, resolving to each destination clock's next edge
    /// strictly after the scheduler's current tick and scheduling delivery
    /// there directly. The target is computed as an absolute tick and
    /// handed to `schedule_at` rather than passed through `schedule`'s
    /// delay path, which would reinterpret a root-tick offset as a count
    /// of the destination clock's own cycles and convert it a second time.
    pub fn send(&self, scheduler: &mut Scheduler, value: T) -> Result<(), KernelError> {
        for (event, dest_clock) in &self.bindings {
            let current = scheduler.current_tick();
            let target_edge = dest_clock.next_edge_at_or_after(Tick(current.0 + 1));
            let token = event.prepare_payload(value.clone());
            event.schedule_at(scheduler, token, target_edge)?;
        }
        Ok(())
    }
}
