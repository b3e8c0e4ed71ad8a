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

//! The simulation kernel: clock, queues and the step loop.
//!
//! A step takes the next event (from the zero-delay ready queue
//! first, then from the time-ordered schedule), advances the clock to
//! its due instant and runs its callbacks. Events due at the same
//! instant fire in the total order `(time, priority, insertion
//! index)`; zero-delay events always run before the next clock
//! advance, FIFO among themselves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::container::ContainerState;
use crate::error::SimError;
use crate::event::{Callback, EventId, EventKind, EventSlot};
use crate::payload::Payload;
use crate::process::ProcessSlot;
use crate::queue::EventQueue;
use crate::random::RandomStream;
use crate::resources::{PoolState, ResourceState};
use crate::store::StoreState;
use crate::ProcessId;

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

/// Default seed of the random stream; the low 64 bits of the PCG
/// default state constant.
pub const DEFAULT_SEED: u64 = 0x853c_49e6_748f_ea9b;

/// Initial configuration of a [`Simulation`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Calendar instant the clock starts at.
    pub start: DateTime<Utc>,
    /// Seed of the random stream.
    pub seed: u64,
    /// Duration of one logical step for the `*_d` projections.
    pub default_step: Duration,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            start: DateTime::<Utc>::default(),
            seed: DEFAULT_SEED,
            default_step: Duration::seconds(1),
        }
    }
}

/// Specify which condition must be met for the simulation to stop.
pub enum EndCondition {
    /// Run until a certain point in time is reached.
    Time(DateTime<Utc>),
    /// Run for a span of simulated time from now.
    Delay(Duration),
    /// Run until the given event has been processed.
    Event(EventId),
    /// Run until there are no more events scheduled.
    NoEvents,
}

/// This struct provides the methods to create and run the simulation
/// in a single thread.
///
/// It owns every event, process and resource of the model; model code
/// holds plain id handles. See the crate-level documentation for more
/// information about how the simulation framework works.
pub struct Simulation {
    pub(crate) instance: u32,
    pub(crate) now: DateTime<Utc>,
    pub(crate) start: DateTime<Utc>,
    pub(crate) default_step: Duration,
    pub(crate) stop: bool,
    pub(crate) events: Vec<EventSlot>,
    pub(crate) schedule: EventQueue,
    pub(crate) ready: VecDeque<EventId>,
    pub(crate) processes: Vec<ProcessSlot>,
    pub(crate) resources: Vec<ResourceState>,
    pub(crate) pools: Vec<PoolState>,
    pub(crate) stores: Vec<StoreState>,
    pub(crate) containers: Vec<ContainerState>,
    pub(crate) active: Option<ProcessId>,
    pub(crate) processed_event_count: u64,
    pub(crate) request_seq: u64,
    pub(crate) next_callback: u64,
    pub(crate) random: RandomStream,
}

impl Simulation {
    /// Create a new `Simulation` environment with the default
    /// configuration: epoch start, fixed seed, one-second step.
    pub fn new() -> Simulation {
        Simulation::with_config(SimConfig::default())
    }

    /// Create a new `Simulation` environment with the given seed.
    pub fn with_seed(seed: u64) -> Simulation {
        Simulation::with_config(SimConfig {
            seed,
            ..SimConfig::default()
        })
    }

    /// Create a new `Simulation` environment from a full configuration.
    pub fn with_config(config: SimConfig) -> Simulation {
        Simulation {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            now: config.start,
            start: config.start,
            default_step: config.default_step,
            stop: false,
            events: Vec::new(),
            schedule: EventQueue::new(),
            ready: VecDeque::new(),
            processes: Vec::new(),
            resources: Vec::new(),
            pools: Vec::new(),
            stores: Vec::new(),
            containers: Vec::new(),
            active: None,
            processed_event_count: 0,
            request_seq: 0,
            next_callback: 0,
            random: RandomStream::new(config.seed),
        }
    }

    /// Current simulated instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Current simulated time as a multiple of the default step.
    pub fn now_d(&self) -> f64 {
        self.to_double(self.now)
    }

    /// The instant the clock started at.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Project an absolute instant onto the logical step axis.
    pub fn to_double(&self, instant: DateTime<Utc>) -> f64 {
        to_seconds(instant - self.start) / to_seconds(self.default_step)
    }

    /// Project a logical step count back onto the calendar axis.
    pub fn to_date(&self, steps: f64) -> DateTime<Utc> {
        self.start + scale(self.default_step, steps)
    }

    /// A span of `steps` logical steps.
    pub fn span_d(&self, steps: f64) -> Duration {
        scale(self.default_step, steps)
    }

    /// Instant of the next event, if any is pending.
    pub fn peek(&self) -> Option<DateTime<Utc>> {
        if !self.ready.is_empty() {
            Some(self.now)
        } else {
            self.schedule.peek().map(|node| node.time)
        }
    }

    /// [`peek`](Simulation::peek) on the logical step axis; infinity
    /// when nothing is pending.
    pub fn peek_d(&self) -> f64 {
        self.peek().map(|t| self.to_double(t)).unwrap_or(f64::INFINITY)
    }

    /// Number of events processed so far.
    pub fn processed_event_count(&self) -> u64 {
        self.processed_event_count
    }

    /// The process currently executing, if a step is resuming one.
    pub fn active_process(&self) -> Option<ProcessId> {
        self.active
    }

    /// Whether any event is pending in either queue.
    pub fn has_events(&self) -> bool {
        !self.ready.is_empty() || !self.schedule.is_empty()
    }

    /// Proceed in the simulation by one event. Returns `false` if
    /// both queues were empty.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let event = if let Some(event) = self.ready.pop_front() {
            event
        } else if let Some(node) = self.schedule.dequeue() {
            self.now = node.time;
            node.event
        } else {
            return Ok(false);
        };
        self.process_event(event)?;
        Ok(true)
    }

    /// Run the simulation until an ending condition is met.
    ///
    /// Bounded by time, an internal stop sentinel is scheduled at the
    /// target instant ahead of every natural event due there; the
    /// clock ends exactly at the bound. Bounded by an event, the
    /// return value is that event's payload. Any error raised while
    /// dispatching events aborts the run with the clock intact.
    pub fn run(&mut self, until: EndCondition) -> Result<Option<Payload>, SimError> {
        self.stop = false;
        let mut until_event = None;
        match until {
            EndCondition::Time(instant) => {
                if instant < self.now {
                    return Err(SimError::StopTimeInPast);
                }
                self.schedule_stop(instant);
            }
            EndCondition::Delay(delay) => {
                if delay < Duration::zero() {
                    return Err(SimError::NegativeDelay);
                }
                let instant = self.now + delay;
                self.schedule_stop(instant);
            }
            EndCondition::Event(event) => {
                self.ensure_local(event)?;
                if self.slot(event).processed {
                    return Ok(Some(self.slot(event).value.clone()));
                }
                self.slot_mut(event).callbacks.push(Callback::Stop);
                until_event = Some(event);
            }
            EndCondition::NoEvents => {}
        }
        debug!(target: "prosim", time = %self.now, "run started");
        loop {
            if self.stop {
                break;
            }
            if !self.has_events() {
                if let Some(event) = until_event {
                    if !self.slot(event).processed {
                        return Err(SimError::UntilNotTriggered);
                    }
                }
                break;
            }
            self.step()?;
        }
        debug!(
            target: "prosim",
            time = %self.now,
            processed = self.processed_event_count,
            "run finished"
        );
        Ok(until_event.map(|event| self.slot(event).value.clone()))
    }

    fn schedule_stop(&mut self, instant: DateTime<Utc>) {
        let stop = self.new_event(EventKind::Stop);
        self.slot_mut(stop).triggered = true;
        self.schedule.enqueue_first(instant, stop);
    }

    fn process_event(&mut self, event: EventId) -> Result<(), SimError> {
        self.processed_event_count += 1;
        let callbacks = {
            let slot = self.slot_mut(event);
            slot.processed = true;
            std::mem::take(&mut slot.callbacks)
        };
        trace!(
            target: "prosim",
            time = %self.now,
            event = event.index,
            ok = self.slot(event).ok,
            "event processed"
        );
        if matches!(self.slot(event).kind, EventKind::Stop) {
            self.stop = true;
        }
        for callback in callbacks {
            match callback {
                Callback::Resume(process) => self.resume(process, event)?,
                Callback::Check(condition) => self.check_condition(condition, event)?,
                Callback::Stop => self.stop = true,
                Callback::Hook(_, mut hook) => hook(self, event),
            }
        }
        Ok(())
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation::new()
    }
}

pub(crate) fn to_seconds(span: Duration) -> f64 {
    match span.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => span.num_milliseconds() as f64 / 1e3,
    }
}

pub(crate) fn from_seconds(seconds: f64) -> Duration {
    Duration::nanoseconds((seconds * 1e9).round() as i64)
}

pub(crate) fn scale(span: Duration, factor: f64) -> Duration {
    match span.num_nanoseconds() {
        Some(nanos) => Duration::nanoseconds((nanos as f64 * factor).round() as i64),
        None => Duration::milliseconds((span.num_milliseconds() as f64 * factor).round() as i64),
    }
}
