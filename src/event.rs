/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

//! First-class events.
//!
//! The [`Simulation`] owns every event in an arena; model code holds
//! [`EventId`] handles. An event moves through a monotonic lifecycle:
//! alive, then *triggered* (an outcome is fixed and the event is
//! queued), then *processed* (its callbacks ran). No transition is
//! reversible and each may happen at most once.

use chrono::Duration;

use crate::condition::ConditionState;
use crate::error::SimError;
use crate::payload::Payload;
use crate::resources::{RequestState, ResourceRef};
use crate::simulation::{scale, Simulation};
use crate::ProcessId;

/// Handle to an event owned by a [`Simulation`].
///
/// The handle remembers which simulation instance created it, so that
/// passing it to a different instance is rejected instead of silently
/// aliasing an unrelated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    pub(crate) sim: u32,
    pub(crate) index: u32,
}

/// Token returned by [`Simulation::add_callback`], used for
/// best-effort removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(pub(crate) u64);

/// Handler invoked when an event is processed.
pub(crate) enum Callback {
    /// Resume the process waiting on this event.
    Resume(ProcessId),
    /// Re-evaluate a condition this event belongs to.
    Check(EventId),
    /// End the current `run` once this event has been processed.
    Stop,
    /// A user hook.
    Hook(CallbackId, Box<dyn FnMut(&mut Simulation, EventId)>),
}

pub(crate) enum EventKind {
    /// Plain event with no kernel-side state.
    Generic,
    /// Internal sentinel ending a time-bounded run.
    Stop,
    /// Termination event of a process.
    Process(ProcessId),
    /// Composite over sub-events.
    Condition(ConditionState),
    /// Lease request on a resource, store or container.
    Request(RequestState),
    /// Return of a granted request.
    Release {
        target: ResourceRef,
        request: EventId,
    },
}

pub(crate) struct EventSlot {
    pub(crate) value: Payload,
    pub(crate) ok: bool,
    pub(crate) triggered: bool,
    pub(crate) processed: bool,
    pub(crate) callbacks: Vec<Callback>,
    pub(crate) kind: EventKind,
}

impl EventSlot {
    pub(crate) fn new(kind: EventKind) -> EventSlot {
        EventSlot {
            value: Payload::None,
            ok: true,
            triggered: false,
            processed: false,
            callbacks: Vec::new(),
            kind,
        }
    }
}

impl Simulation {
    pub(crate) fn new_event(&mut self, kind: EventKind) -> EventId {
        let id = EventId {
            sim: self.instance,
            index: self.events.len() as u32,
        };
        self.events.push(EventSlot::new(kind));
        id
    }

    pub(crate) fn ensure_local(&self, event: EventId) -> Result<(), SimError> {
        if event.sim != self.instance || (event.index as usize) >= self.events.len() {
            return Err(SimError::ForeignEvent);
        }
        Ok(())
    }

    pub(crate) fn slot(&self, event: EventId) -> &EventSlot {
        &self.events[event.index as usize]
    }

    pub(crate) fn slot_mut(&mut self, event: EventId) -> &mut EventSlot {
        &mut self.events[event.index as usize]
    }

    /// Create an untriggered event. It fires when model code calls
    /// [`succeed`](Simulation::succeed) or [`fail`](Simulation::fail).
    pub fn event(&mut self) -> EventId {
        self.new_event(EventKind::Generic)
    }

    /// Create an event pre-scheduled at `now + delay`, firing OK with
    /// no value. Negative delays are rejected.
    pub fn timeout(&mut self, delay: Duration) -> Result<EventId, SimError> {
        self.timeout_with(delay, Payload::None, true, 0)
    }

    /// Full form of [`timeout`](Simulation::timeout): the event fires
    /// with the given value and outcome, ordered among same-instant
    /// events by `priority` (lower runs first).
    pub fn timeout_with(
        &mut self,
        delay: Duration,
        value: Payload,
        ok: bool,
        priority: i32,
    ) -> Result<EventId, SimError> {
        if delay < Duration::zero() {
            return Err(SimError::NegativeDelay);
        }
        let event = self.new_event(EventKind::Generic);
        {
            let slot = self.slot_mut(event);
            slot.triggered = true;
            slot.ok = ok;
            slot.value = value;
        }
        let due = self.now + delay;
        self.schedule.enqueue(due, priority, event);
        Ok(event)
    }

    /// [`timeout`](Simulation::timeout) with the delay given as a
    /// multiple of the configured default step.
    pub fn timeout_d(&mut self, steps: f64) -> Result<EventId, SimError> {
        let delay = scale(self.default_step, steps);
        self.timeout(delay)
    }

    /// Fix the event's outcome to OK and queue it for processing.
    pub fn succeed(&mut self, event: EventId, value: Payload) -> Result<(), SimError> {
        self.ensure_local(event)?;
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        self.schedule_trigger(event, true, value);
        Ok(())
    }

    /// Fix the event's outcome to a fault and queue it for processing.
    /// The value is the fault cause.
    pub fn fail(&mut self, event: EventId, cause: Payload) -> Result<(), SimError> {
        self.ensure_local(event)?;
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        self.schedule_trigger(event, false, cause);
        Ok(())
    }

    /// Copy outcome and value from an already-triggered event and
    /// queue this one for processing.
    pub fn trigger_from(&mut self, event: EventId, from: EventId) -> Result<(), SimError> {
        self.ensure_local(event)?;
        self.ensure_local(from)?;
        if !self.slot(from).triggered {
            return Err(SimError::UntriggeredSource);
        }
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        let (ok, value) = {
            let from = self.slot(from);
            (from.ok, from.value.clone())
        };
        self.schedule_trigger(event, ok, value);
        Ok(())
    }

    /// [`succeed`](Simulation::succeed) with an explicit tie-break
    /// priority. The event is scheduled at the current instant on the
    /// time queue, ordered among same-instant events by `priority`
    /// (lower runs first), instead of joining the zero-delay FIFO.
    pub fn succeed_prioritized(
        &mut self,
        event: EventId,
        value: Payload,
        priority: i32,
    ) -> Result<(), SimError> {
        self.ensure_local(event)?;
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        self.schedule_trigger_at_now(event, true, value, priority);
        Ok(())
    }

    /// [`fail`](Simulation::fail) with an explicit tie-break priority.
    pub fn fail_prioritized(
        &mut self,
        event: EventId,
        cause: Payload,
        priority: i32,
    ) -> Result<(), SimError> {
        self.ensure_local(event)?;
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        self.schedule_trigger_at_now(event, false, cause, priority);
        Ok(())
    }

    /// [`trigger_from`](Simulation::trigger_from) with an explicit
    /// tie-break priority.
    pub fn trigger_from_prioritized(
        &mut self,
        event: EventId,
        from: EventId,
        priority: i32,
    ) -> Result<(), SimError> {
        self.ensure_local(event)?;
        self.ensure_local(from)?;
        if !self.slot(from).triggered {
            return Err(SimError::UntriggeredSource);
        }
        if self.slot(event).triggered {
            return Err(SimError::AlreadyTriggered);
        }
        let (ok, value) = {
            let from = self.slot(from);
            (from.ok, from.value.clone())
        };
        self.schedule_trigger_at_now(event, ok, value, priority);
        Ok(())
    }

    /// Trigger `event` and append it to the zero-delay ready queue.
    pub(crate) fn schedule_trigger(&mut self, event: EventId, ok: bool, value: Payload) {
        let slot = self.slot_mut(event);
        slot.triggered = true;
        slot.ok = ok;
        slot.value = value;
        self.ready.push_back(event);
    }

    /// Trigger `event` and schedule it on the time queue at `now` with
    /// an explicit tie-break priority.
    pub(crate) fn schedule_trigger_at_now(
        &mut self,
        event: EventId,
        ok: bool,
        value: Payload,
        priority: i32,
    ) {
        let slot = self.slot_mut(event);
        slot.triggered = true;
        slot.ok = ok;
        slot.value = value;
        let now = self.now;
        self.schedule.enqueue(now, priority, event);
    }

    /// Append a hook run when the event is processed. Hooks run after
    /// the kernel's own callbacks, in insertion order, exactly once.
    pub fn add_callback(
        &mut self,
        event: EventId,
        hook: Box<dyn FnMut(&mut Simulation, EventId)>,
    ) -> Result<CallbackId, SimError> {
        self.ensure_local(event)?;
        if self.slot(event).processed {
            return Err(SimError::AlreadyProcessed);
        }
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.slot_mut(event).callbacks.push(Callback::Hook(id, hook));
        Ok(id)
    }

    /// Best-effort removal of a hook added with
    /// [`add_callback`](Simulation::add_callback).
    pub fn remove_callback(&mut self, event: EventId, id: CallbackId) {
        if self.ensure_local(event).is_err() {
            return;
        }
        self.slot_mut(event)
            .callbacks
            .retain(|cb| !matches!(cb, Callback::Hook(existing, _) if *existing == id));
    }

    /// The value the event fired with, or its fault cause.
    pub fn value(&self, event: EventId) -> Result<Payload, SimError> {
        self.ensure_local(event)?;
        Ok(self.slot(event).value.clone())
    }

    /// Whether the event fired OK. Meaningful once triggered.
    pub fn is_ok(&self, event: EventId) -> Result<bool, SimError> {
        self.ensure_local(event)?;
        Ok(self.slot(event).ok)
    }

    /// Whether an outcome has been fixed for this event.
    pub fn is_triggered(&self, event: EventId) -> Result<bool, SimError> {
        self.ensure_local(event)?;
        Ok(self.slot(event).triggered)
    }

    /// Whether the event's callbacks have run.
    pub fn is_processed(&self, event: EventId) -> Result<bool, SimError> {
        self.ensure_local(event)?;
        Ok(self.slot(event).processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::EndCondition;

    #[test]
    fn lifecycle_is_single_use() {
        let mut sim = Simulation::new();
        let e = sim.event();
        assert!(!sim.is_triggered(e).unwrap());
        sim.succeed(e, Payload::Number(1.0)).unwrap();
        assert!(sim.is_triggered(e).unwrap());
        assert_eq!(
            sim.succeed(e, Payload::None),
            Err(SimError::AlreadyTriggered)
        );
        assert_eq!(sim.fail(e, Payload::None), Err(SimError::AlreadyTriggered));
        sim.run(EndCondition::NoEvents).unwrap();
        assert!(sim.is_processed(e).unwrap());
        assert_eq!(sim.value(e).unwrap(), Payload::Number(1.0));
    }

    #[test]
    fn callbacks_run_once_in_insertion_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let e = sim.event();
        for i in 0..3 {
            let order = Rc::clone(&order);
            sim.add_callback(e, Box::new(move |_, _| order.borrow_mut().push(i)))
                .unwrap();
        }
        sim.succeed(e, Payload::None).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn late_callback_is_rejected() {
        let mut sim = Simulation::new();
        let e = sim.event();
        sim.succeed(e, Payload::None).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        let result = sim.add_callback(e, Box::new(|_, _| {}));
        assert!(matches!(result, Err(SimError::AlreadyProcessed)));
    }

    #[test]
    fn removed_callback_does_not_run() {
        use std::cell::Cell;
        use std::rc::Rc;

        let fired = Rc::new(Cell::new(false));
        let mut sim = Simulation::new();
        let e = sim.event();
        let id = {
            let fired = Rc::clone(&fired);
            sim.add_callback(e, Box::new(move |_, _| fired.set(true)))
                .unwrap()
        };
        sim.remove_callback(e, id);
        sim.succeed(e, Payload::None).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn prioritized_outcomes_order_same_instant_ties() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let low = sim.event();
        let high = sim.event();
        let fifo = sim.event();
        for (event, tag) in [(low, "low"), (high, "high"), (fifo, "fifo")] {
            let order = Rc::clone(&order);
            sim.add_callback(event, Box::new(move |_, _| order.borrow_mut().push(tag)))
                .unwrap();
        }
        sim.succeed_prioritized(low, Payload::None, 5).unwrap();
        sim.succeed_prioritized(high, Payload::None, -5).unwrap();
        // an unprioritized outcome stays in the zero-delay FIFO and
        // runs before any same-instant scheduled event
        sim.succeed(fifo, Payload::None).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(*order.borrow(), vec!["fifo", "high", "low"]);
        assert_eq!(
            sim.succeed_prioritized(low, Payload::None, 0),
            Err(SimError::AlreadyTriggered)
        );
    }

    #[test]
    fn prioritized_failure_carries_its_cause() {
        let mut sim = Simulation::new();
        let broken = sim.event();
        sim.fail_prioritized(broken, Payload::from("boom"), -1).unwrap();
        let copy = sim.event();
        sim.trigger_from_prioritized(copy, broken, -1).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert!(!sim.is_ok(broken).unwrap());
        assert!(!sim.is_ok(copy).unwrap());
        assert_eq!(sim.value(copy).unwrap(), Payload::from("boom"));
    }

    #[test]
    fn negative_delay_is_an_argument_error() {
        let mut sim = Simulation::new();
        assert_eq!(
            sim.timeout(Duration::seconds(-1)).unwrap_err(),
            SimError::NegativeDelay
        );
    }

    #[test]
    fn trigger_from_copies_outcome() {
        let mut sim = Simulation::new();
        let source = sim.event();
        let copy = sim.event();
        assert_eq!(
            sim.trigger_from(copy, source),
            Err(SimError::UntriggeredSource)
        );
        sim.fail(source, Payload::from("boom")).unwrap();
        sim.trigger_from(copy, source).unwrap();
        assert!(!sim.is_ok(copy).unwrap());
        assert_eq!(sim.value(copy).unwrap(), Payload::from("boom"));
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut one = Simulation::new();
        let mut two = Simulation::new();
        let e = one.event();
        assert_eq!(two.succeed(e, Payload::None), Err(SimError::ForeignEvent));
        assert_eq!(two.value(e), Err(SimError::ForeignEvent));
    }
}
