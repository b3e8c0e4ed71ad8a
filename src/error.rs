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

//! Error kinds reported by the kernel.
//!
//! Argument and lifecycle violations are returned at the call site;
//! errors hit during event dispatch abort [`Simulation::run`] with the
//! simulated clock intact. Process faults are not errors: they travel
//! as event data (`ok = false`) until a `handle_fault` acknowledges
//! them, and only an unacknowledged fault turns into
//! [`SimError::UnhandledFault`].
//!
//! [`Simulation::run`]: crate::Simulation::run

use thiserror::Error;

/// Everything that can go wrong inside the simulation kernel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A delay was negative.
    #[error("delay must not be negative")]
    NegativeDelay,

    /// `succeed`, `fail` or `trigger_from` hit an event a second time.
    #[error("event has already been triggered")]
    AlreadyTriggered,

    /// A callback was added to an event whose callbacks already ran.
    #[error("event has already been processed")]
    AlreadyProcessed,

    /// An event handle from a different simulation instance was used.
    #[error("event does not belong to this simulation")]
    ForeignEvent,

    /// `trigger_from` was given an untriggered source event.
    #[error("cannot copy the outcome of an untriggered event")]
    UntriggeredSource,

    /// A run was bounded by an instant that already passed.
    #[error("stop time must not be in the past")]
    StopTimeInPast,

    /// Both queues drained while the until-event never fired.
    #[error("no scheduled events left but until event was not triggered")]
    UntilNotTriggered,

    /// A faulted process advanced without calling `handle_fault`.
    #[error("process did not react to being faulted")]
    UnhandledFault,

    /// A process tried to interrupt itself.
    #[error("a process cannot interrupt itself")]
    InterruptSelf,

    /// The interrupt target already terminated.
    #[error("cannot interrupt a terminated process")]
    InterruptTerminated,

    /// A sub-event failed after its condition had already fired.
    #[error("condition has already been triggered; a late sub-event failure cannot be handled")]
    LateConditionFault,

    /// An empty payload was put into a store.
    #[error("store values must not be none")]
    NullValue,

    /// A capacity was zero.
    #[error("capacity must be positive")]
    InvalidCapacity,

    /// A container amount was out of `(0, capacity]`.
    #[error("amount must be positive and must not exceed the capacity")]
    InvalidAmount,

    /// A resource pool was created without items.
    #[error("a resource pool requires at least one item")]
    EmptyPool,

    /// A release named a request the resource does not know about.
    #[error("released request does not belong to this resource")]
    UnknownRequest,

    /// A filtered get was issued against a store without filter
    /// support.
    #[error("filtered gets require a filter store")]
    FilterUnsupported,

    /// A distribution was parameterized outside its domain.
    #[error("invalid distribution parameter: {0}")]
    InvalidDistribution(&'static str),

    /// `rand_choice` was called on an empty slice.
    #[error("cannot choose from an empty collection")]
    EmptyChoice,

    /// A process was resumed after its transition function completed.
    #[error("resumed a process that has already completed")]
    CompletedProcess,
}
