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

//! Cooperative processes.
//!
//! A process is a resumable transition function: the kernel calls it
//! once per resumption and it answers with either the next event to
//! wait on or its final value. At most one process executes at any
//! instant; everything a process does between two yields is atomic
//! from the simulator's point of view.
//!
//! A process is itself an event. It fires when the transition
//! function completes, so waiting on another process is a join and
//! the joined value is the process's return value.
//!
//! # Faults
//!
//! An interrupt, or waiting on an event that failed, marks the
//! process faulted: its `ok` flag drops and its value becomes the
//! fault cause. The transition function must acknowledge the fault by
//! calling [`Simulation::handle_fault`] before yielding again;
//! advancing (or completing) while still faulted aborts the run.

use tracing::debug;

use crate::error::SimError;
use crate::event::{Callback, EventId, EventKind};
use crate::payload::Payload;
use crate::queue::URGENT;
use crate::simulation::Simulation;
use crate::ProcessId;

/// Outcome of one advance of a process transition function.
pub enum ProcessStep {
    /// Suspend until this event fires.
    Yielded(EventId),
    /// The process terminates with this value.
    Complete(Payload),
}

/// The type of each process transition function.
pub type SimGen = dyn FnMut(&mut Simulation) -> ProcessStep;

pub(crate) struct ProcessSlot {
    pub(crate) generator: Option<Box<SimGen>>,
    /// Termination event; doubles as the fault marker while alive.
    pub(crate) event: EventId,
    /// Event the process is currently suspended on.
    pub(crate) target: Option<EventId>,
    /// Explicit scheduling priority, if any.
    pub(crate) priority: Option<i32>,
}

impl Simulation {
    /// Create a process.
    ///
    /// The process starts through a zero-delay initialization event,
    /// so several processes created at the same instant run in
    /// creation order. Returns the identifier of the process.
    pub fn create_process(&mut self, generator: Box<SimGen>) -> ProcessId {
        self.spawn(generator, None)
    }

    /// Create a process with an explicit priority. Among processes
    /// becoming runnable at the same instant, lower priority values
    /// run first; unprioritized processes keep FIFO order among
    /// themselves.
    pub fn create_process_prioritized(
        &mut self,
        generator: Box<SimGen>,
        priority: i32,
    ) -> ProcessId {
        self.spawn(generator, Some(priority))
    }

    fn spawn(&mut self, generator: Box<SimGen>, priority: Option<i32>) -> ProcessId {
        let process = self.processes.len();
        let event = self.new_event(EventKind::Process(process));
        let initialize = self.new_event(EventKind::Generic);
        self.slot_mut(initialize).callbacks.push(Callback::Resume(process));
        match priority {
            None => self.schedule_trigger(initialize, true, Payload::None),
            Some(priority) => {
                self.schedule_trigger_at_now(initialize, true, Payload::None, priority)
            }
        }
        self.processes.push(ProcessSlot {
            generator: Some(generator),
            event,
            target: Some(initialize),
            priority,
        });
        process
    }

    /// The termination event of a process. Waiting on it joins the
    /// process; its value is the process's return value.
    pub fn join(&self, process: ProcessId) -> EventId {
        self.processes[process].event
    }

    /// Acknowledge a pending fault of the active process.
    ///
    /// Returns whether there was a fault to acknowledge; the fault
    /// cause stays readable through the process event's value.
    pub fn handle_fault(&mut self) -> bool {
        let process = match self.active {
            Some(process) => process,
            None => return false,
        };
        let event = self.processes[process].event;
        if self.slot(event).ok {
            false
        } else {
            self.slot_mut(event).ok = true;
            true
        }
    }

    /// Inject a fault into another process.
    ///
    /// The target is detached from whatever it is waiting on and
    /// resumed with `cause` as its fault value, ahead of any natural
    /// event due at the same instant. A process can interrupt neither
    /// itself nor a process that already terminated.
    pub fn interrupt(&mut self, process: ProcessId, cause: Payload) -> Result<(), SimError> {
        if self.active == Some(process) {
            return Err(SimError::InterruptSelf);
        }
        if self.processes[process].generator.is_none() {
            return Err(SimError::InterruptTerminated);
        }
        debug!(target: "prosim", process, "interrupt");
        let interrupt = self.new_event(EventKind::Generic);
        self.slot_mut(interrupt).callbacks.push(Callback::Resume(process));
        self.schedule_trigger_at_now(interrupt, false, cause, URGENT);
        Ok(())
    }

    /// Resume protocol: called when the event a process waits on is
    /// processed.
    pub(crate) fn resume(&mut self, process: ProcessId, arrived: EventId) -> Result<(), SimError> {
        let event = self.processes[process].event;
        // the process event was triggered by user code; nothing to
        // drive anymore
        if self.slot(event).triggered {
            self.active = None;
            return Ok(());
        }
        // an interrupt bypassed the current target: detach from it so
        // its natural resolution no longer reaches this process
        if self.processes[process].target != Some(arrived) {
            if let Some(target) = self.processes[process].target {
                self.slot_mut(target)
                    .callbacks
                    .retain(|cb| !matches!(cb, Callback::Resume(p) if *p == process));
            }
        }
        self.active = Some(process);
        if !self.slot(arrived).ok {
            let cause = self.slot(arrived).value.clone();
            let slot = self.slot_mut(event);
            slot.ok = false;
            slot.value = cause;
        }
        let mut generator = match self.processes[process].generator.take() {
            Some(generator) => generator,
            None => {
                self.active = None;
                return Err(SimError::CompletedProcess);
            }
        };
        let step = generator(self);
        match step {
            ProcessStep::Yielded(next) => {
                self.processes[process].generator = Some(generator);
                // an explicit fail of the process event is deliberate
                // failure, not an unacknowledged fault
                if !self.slot(event).ok && !self.slot(event).triggered {
                    self.active = None;
                    return Err(SimError::UnhandledFault);
                }
                if let Err(foreign) = self.ensure_local(next) {
                    self.active = None;
                    return Err(foreign);
                }
                if self.slot(next).processed {
                    // the target already fired; resume through an
                    // immediate surrogate carrying the same outcome
                    let surrogate = self.new_event(EventKind::Generic);
                    self.slot_mut(surrogate).callbacks.push(Callback::Resume(process));
                    let (ok, value) = {
                        let slot = self.slot(next);
                        (slot.ok, slot.value.clone())
                    };
                    match self.processes[process].priority {
                        None => self.schedule_trigger(surrogate, ok, value),
                        Some(priority) => {
                            self.schedule_trigger_at_now(surrogate, ok, value, priority)
                        }
                    }
                    self.processes[process].target = Some(surrogate);
                } else {
                    self.slot_mut(next).callbacks.push(Callback::Resume(process));
                    self.processes[process].target = Some(next);
                }
            }
            ProcessStep::Complete(value) => {
                self.processes[process].target = None;
                if !self.slot(event).triggered {
                    if !self.slot(event).ok {
                        self.active = None;
                        return Err(SimError::UnhandledFault);
                    }
                    self.schedule_trigger(event, true, value);
                }
            }
        }
        self.active = None;
        Ok(())
    }
}
