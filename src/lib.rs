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

//! This crate implements a process-based discrete events simulation
//! kernel inspired by the SimPy library for Python. It runs on stable
//! Rust: processes are written as resumable transition functions
//! instead of generators, and everything else (events, conditions,
//! resources, stores, containers) is a first-class object owned by
//! the [`Simulation`].
//!
//! # Simulation
//! A simulation is performed scheduling one or more processes that
//! model the environment you are going to simulate. Your model may
//! consider some kind of finite resource that must be shared among
//! the processes, e.g. a bunch of servers in a simulation on queues.
//!
//! After setting up the simulation, it can be run step-by-step, using
//! the `step()` method, or all at once, with `run()`, until an ending
//! condition is met: a point in simulated time, a designated event,
//! or queue exhaustion. For a fixed model and seed, the order and
//! timing of every processed event is identical across runs: ties are
//! broken by an explicit priority and then by insertion order, never
//! by anything platform-dependent.
//!
//! # Events
//! An event is created through the [`Simulation`] and referenced by a
//! copyable [`EventId`]. It fires at most once, with a value on
//! success or a cause on failure, and then runs its callbacks
//! exactly once, in insertion order. Composite events are built with
//! [`Simulation::all_of`] and [`Simulation::any_of`].
//!
//! # Process
//! A process is a closure that the kernel calls once per resumption.
//! It keeps its own state across calls and answers with either the
//! next event to suspend on or its final value:
//!
//! ```
//! use prosim::prelude::*;
//! use chrono::Duration;
//!
//! let mut sim = Simulation::new();
//! let server = sim.create_resource(1).unwrap();
//! let mut stage = 0;
//! let mut lease = None;
//! sim.create_process(Box::new(move |sim: &mut Simulation| {
//!     stage += 1;
//!     match stage {
//!         1 => {
//!             let request = sim.request(server).unwrap();
//!             lease = Some(request);
//!             ProcessStep::Yielded(request)
//!         }
//!         2 => ProcessStep::Yielded(sim.timeout(Duration::seconds(5)).unwrap()),
//!         3 => ProcessStep::Yielded(sim.release(server, lease.unwrap()).unwrap()),
//!         _ => ProcessStep::Complete(Payload::None),
//!     }
//! }));
//! sim.run(EndCondition::NoEvents).unwrap();
//! assert_eq!(sim.now(), sim.start() + Duration::seconds(5));
//! ```
//!
//! A process is itself an event that fires on termination, so one
//! process can wait for another through [`Simulation::join`]. It can
//! be interrupted from the outside, which injects a fault the target
//! must acknowledge with [`Simulation::handle_fault`].
//!
//! # Resource
//! A resource is a finite amount of leases that must be shared among
//! the processes. When all leases are taken, the requiring process is
//! enqueued and resumed when the resource becomes available again.
//! When the process does not need the resource anymore, it must
//! release it; releasing a request that was never granted withdraws
//! it from the queue instead.
//!
//! Beyond the counted FIFO resource there are a priority variant, a
//! preemptive variant, a typed item pool, stores (FIFO, filtered,
//! prioritized) and a continuous container. Each exposes one-shot
//! latch events that fire when a predicate on its state becomes true.

pub mod prelude;

mod condition;
mod container;
mod error;
mod event;
mod monitor;
mod payload;
mod process;
mod queue;
mod random;
mod resources;
mod simulation;
mod store;

pub use crate::error::SimError;
pub use crate::event::{CallbackId, EventId};
pub use crate::monitor::{
    ContainerMonitors, ResourceMonitors, SampleMonitor, SampleSlot, StoreMonitors,
    TimeSeriesMonitor, TimeSeriesSlot,
};
pub use crate::payload::Payload;
pub use crate::process::{ProcessStep, SimGen};
pub use crate::random::RandomStream;
pub use crate::simulation::{EndCondition, SimConfig, Simulation, DEFAULT_SEED};

/// Identifies a process. Can be used to join it or to interrupt it
/// from another one.
pub type ProcessId = usize;
/// Identifies a counted resource. Can be used to request and release
/// leases on it.
pub type ResourceId = usize;
/// Identifies a resource pool of distinct items.
pub type PoolId = usize;
/// Identifies a store. Can be used to put and get items.
pub type StoreId = usize;
/// Identifies a container. Can be used to pour amounts in and out.
pub type ContainerId = usize;
