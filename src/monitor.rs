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

//! Observation hooks.
//!
//! Statistics collectors live outside the kernel; the kernel only
//! notifies them. A time series monitor is told the new value of a
//! state variable whenever it changes, a sample monitor is handed one
//! observation at a time. All slots are optional; an unset slot costs
//! nothing.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};

/// Collector for a piecewise-constant state variable (queue length,
/// utilization, container level).
pub trait TimeSeriesMonitor {
    /// The variable holds `value` from `time` on.
    fn update_to(&mut self, time: DateTime<Utc>, value: f64);
}

/// Collector for independent observations (waiting times, lead times).
pub trait SampleMonitor {
    /// Record one observation, in seconds for durations.
    fn add(&mut self, value: f64);
}

/// Shared handle to a time series collector.
pub type TimeSeriesSlot = Option<Rc<RefCell<dyn TimeSeriesMonitor>>>;
/// Shared handle to a sample collector.
pub type SampleSlot = Option<Rc<RefCell<dyn SampleMonitor>>>;

/// Optional collectors of a `Resource`, `PriorityResource`,
/// `PreemptiveResource` or `ResourcePool`.
#[derive(Default, Clone)]
pub struct ResourceMonitors {
    /// Number of users holding the resource.
    pub utilization: TimeSeriesSlot,
    /// Users plus queued requests.
    pub wip: TimeSeriesSlot,
    /// Queued requests.
    pub queue_length: TimeSeriesSlot,
    /// Seconds from request to grant.
    pub waiting_time: SampleSlot,
    /// Seconds from request to release.
    pub lead_time: SampleSlot,
    /// Seconds from request to cancellation of a never-granted request.
    pub break_off_time: SampleSlot,
    /// Seconds a preempted user had held its lease when it was
    /// evicted.
    pub interrupt_time: SampleSlot,
}

/// Optional collectors of a `Store`, `FilterStore` or `PriorityStore`.
#[derive(Default, Clone)]
pub struct StoreMonitors {
    /// Number of items held.
    pub wip: TimeSeriesSlot,
    /// Blocked gets.
    pub queue_length: TimeSeriesSlot,
    /// Seconds an item spent in the store.
    pub lead_time: SampleSlot,
}

/// Optional collectors of a `Container`.
#[derive(Default, Clone)]
pub struct ContainerMonitors {
    /// Fill level.
    pub level: TimeSeriesSlot,
}

pub(crate) fn update_series(slot: &TimeSeriesSlot, time: DateTime<Utc>, value: f64) {
    if let Some(monitor) = slot {
        monitor.borrow_mut().update_to(time, value);
    }
}

pub(crate) fn add_sample(slot: &SampleSlot, value: f64) {
    if let Some(monitor) = slot {
        monitor.borrow_mut().add(value);
    }
}
