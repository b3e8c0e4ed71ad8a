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

//! Capacity-governed resources and their wait queues.
//!
//! A resource grants at most `capacity` concurrent leases. Requests
//! queue FIFO; the priority variant serves lower priority values
//! first, FIFO within one value; the preemptive variant may evict the
//! least important user in favor of a strictly stronger request,
//! interrupting the evicted owner. A `ResourcePool` hands out
//! identity-carrying items instead of anonymous slots, optionally
//! screened by a filter predicate.
//!
//! A granted request is returned with `release`; releasing a request
//! that was never granted cancels it instead. Latch events
//! (`when_any`, `when_full`, `when_empty`, `when_change`) fire once
//! when the matching predicate becomes true.

use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SimError;
use crate::event::{EventId, EventKind};
use crate::monitor::{add_sample, update_series, ResourceMonitors};
use crate::payload::Payload;
use crate::simulation::{to_seconds, Simulation};
use crate::{ContainerId, PoolId, ProcessId, ResourceId, StoreId};

/// Which structure a request or release belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ResourceRef {
    Resource(ResourceId),
    Pool(PoolId),
    StorePut(StoreId),
    StoreGet(StoreId),
    ContainerPut(ContainerId),
    ContainerGet(ContainerId),
}

/// Kernel-side state of a lease request. The request is an event; it
/// fires when granted.
pub(crate) struct RequestState {
    pub(crate) target: ResourceRef,
    pub(crate) owner: Option<ProcessId>,
    pub(crate) issued: DateTime<Utc>,
    /// Issue order; final tie-break wherever issue instants collide.
    pub(crate) seq: u64,
    pub(crate) priority: i32,
    pub(crate) preempt: bool,
    pub(crate) granted: Option<DateTime<Utc>>,
    /// Amount moved by a container put or get.
    pub(crate) amount: f64,
    /// Item predicate of a pool request or filtered store get.
    pub(crate) filter: Option<Rc<dyn Fn(&Payload) -> bool>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Fifo,
    Priority,
    Preemptive,
}

/// One-shot notification events, drained when their predicate holds.
#[derive(Default)]
pub(crate) struct Latches {
    pub(crate) when_any: Vec<EventId>,
    pub(crate) when_full: Vec<EventId>,
    pub(crate) when_empty: Vec<EventId>,
    pub(crate) when_change: Vec<EventId>,
    pub(crate) when_new: Vec<EventId>,
}

pub(crate) struct ResourceState {
    pub(crate) capacity: usize,
    pub(crate) kind: ResourceKind,
    pub(crate) users: Vec<EventId>,
    pub(crate) request_queue: VecDeque<EventId>,
    pub(crate) release_queue: VecDeque<EventId>,
    pub(crate) latches: Latches,
    pub(crate) monitors: ResourceMonitors,
}

pub(crate) struct PoolState {
    pub(crate) items: VecDeque<Payload>,
    pub(crate) capacity: usize,
    pub(crate) request_queue: VecDeque<EventId>,
    pub(crate) release_queue: VecDeque<EventId>,
    pub(crate) latches: Latches,
    pub(crate) monitors: ResourceMonitors,
}

impl Simulation {
    pub(crate) fn new_request(
        &mut self,
        target: ResourceRef,
        priority: i32,
        preempt: bool,
    ) -> EventId {
        let seq = self.request_seq;
        self.request_seq += 1;
        let state = RequestState {
            target,
            owner: self.active,
            issued: self.now,
            seq,
            priority,
            preempt,
            granted: None,
            amount: 0.0,
            filter: None,
        };
        self.new_event(EventKind::Request(state))
    }

    pub(crate) fn request_state(&self, request: EventId) -> &RequestState {
        match &self.slot(request).kind {
            EventKind::Request(state) => state,
            _ => unreachable!("event is not a request"),
        }
    }

    pub(crate) fn request_state_mut(&mut self, request: EventId) -> &mut RequestState {
        match &mut self.slot_mut(request).kind {
            EventKind::Request(state) => state,
            _ => unreachable!("event is not a request"),
        }
    }

    pub(crate) fn try_request_state(&self, request: EventId) -> Option<&RequestState> {
        match &self.slot(request).kind {
            EventKind::Request(state) => Some(state),
            _ => None,
        }
    }

    /// Create a counted FIFO resource with `capacity` concurrent
    /// leases.
    pub fn create_resource(&mut self, capacity: usize) -> Result<ResourceId, SimError> {
        self.make_resource(capacity, ResourceKind::Fifo)
    }

    /// Create a resource whose queue serves lower priority values
    /// first, FIFO within one value.
    pub fn create_priority_resource(&mut self, capacity: usize) -> Result<ResourceId, SimError> {
        self.make_resource(capacity, ResourceKind::Priority)
    }

    /// Create a priority resource whose requests may preempt weaker
    /// users.
    pub fn create_preemptive_resource(&mut self, capacity: usize) -> Result<ResourceId, SimError> {
        self.make_resource(capacity, ResourceKind::Preemptive)
    }

    fn make_resource(
        &mut self,
        capacity: usize,
        kind: ResourceKind,
    ) -> Result<ResourceId, SimError> {
        if capacity == 0 {
            return Err(SimError::InvalidCapacity);
        }
        let id = self.resources.len();
        self.resources.push(ResourceState {
            capacity,
            kind,
            users: Vec::new(),
            request_queue: VecDeque::new(),
            release_queue: VecDeque::new(),
            latches: Latches::default(),
            monitors: ResourceMonitors::default(),
        });
        Ok(id)
    }

    /// Request one lease. The returned event fires when granted.
    pub fn request(&mut self, resource: ResourceId) -> Result<EventId, SimError> {
        self.request_full(resource, 0, false)
    }

    /// Request one lease with an explicit priority (priority and
    /// preemptive resources; lower value is served first).
    pub fn request_prioritized(
        &mut self,
        resource: ResourceId,
        priority: i32,
    ) -> Result<EventId, SimError> {
        self.request_full(resource, priority, false)
    }

    /// Request one lease that may preempt a strictly weaker user of a
    /// preemptive resource.
    pub fn request_preempting(
        &mut self,
        resource: ResourceId,
        priority: i32,
        preempt: bool,
    ) -> Result<EventId, SimError> {
        self.request_full(resource, priority, preempt)
    }

    fn request_full(
        &mut self,
        resource: ResourceId,
        priority: i32,
        preempt: bool,
    ) -> Result<EventId, SimError> {
        let request = self.new_request(ResourceRef::Resource(resource), priority, preempt);
        match self.resources[resource].kind {
            ResourceKind::Fifo => self.resources[resource].request_queue.push_back(request),
            ResourceKind::Priority | ResourceKind::Preemptive => {
                let position = {
                    let queue = &self.resources[resource].request_queue;
                    queue
                        .iter()
                        .position(|&queued| self.request_state(queued).priority > priority)
                        .unwrap_or(queue.len())
                };
                self.resources[resource]
                    .request_queue
                    .insert(position, request);
            }
        }
        self.trigger_resource_requests(resource)?;
        self.resource_changed(resource);
        Ok(request)
    }

    /// Return a granted request, or cancel one that is still pending.
    /// The returned release event fires once the return is accepted.
    pub fn release(&mut self, resource: ResourceId, request: EventId) -> Result<EventId, SimError> {
        self.ensure_local(request)?;
        match self.try_request_state(request) {
            Some(state) if state.target == ResourceRef::Resource(resource) => {}
            _ => return Err(SimError::UnknownRequest),
        }
        let release = self.new_event(EventKind::Release {
            target: ResourceRef::Resource(resource),
            request,
        });
        self.resources[resource].release_queue.push_back(release);
        self.trigger_resource_releases(resource)?;
        self.trigger_resource_requests(resource)?;
        self.resource_changed(resource);
        Ok(release)
    }

    /// Admission drain: serve the queue head while capacity lasts.
    fn trigger_resource_requests(&mut self, resource: ResourceId) -> Result<(), SimError> {
        loop {
            let head = match self.resources[resource].request_queue.front() {
                Some(&head) => head,
                None => break,
            };
            if !self.try_admit(resource, head)? {
                break;
            }
            self.resources[resource].request_queue.pop_front();
        }
        Ok(())
    }

    fn try_admit(&mut self, resource: ResourceId, request: EventId) -> Result<bool, SimError> {
        let full = {
            let state = &self.resources[resource];
            state.users.len() >= state.capacity
        };
        if full
            && self.resources[resource].kind == ResourceKind::Preemptive
            && self.request_state(request).preempt
        {
            self.try_preempt(resource, request)?;
        }
        let admissible = {
            let state = &self.resources[resource];
            state.users.len() < state.capacity
        };
        if !admissible {
            return Ok(false);
        }
        self.resources[resource].users.push(request);
        let now = self.now;
        self.request_state_mut(request).granted = Some(now);
        let waited = to_seconds(self.now - self.request_state(request).issued);
        add_sample(&self.resources[resource].monitors.waiting_time, waited);
        self.schedule_trigger(request, true, Payload::None);
        Ok(true)
    }

    /// Evict the least important user if the incoming request is
    /// strictly stronger. Importance orders by priority, then by
    /// acquisition order, then by the preempt flag; the weakest user
    /// is the one sorting last.
    fn try_preempt(&mut self, resource: ResourceId, incoming: EventId) -> Result<(), SimError> {
        let incoming_key = {
            let state = self.request_state(incoming);
            (state.priority, state.seq, !state.preempt)
        };
        let victim = self.resources[resource].users.iter().copied().max_by_key(|&user| {
            let state = self.request_state(user);
            (state.priority, state.seq, !state.preempt)
        });
        let victim = match victim {
            Some(victim) => victim,
            None => return Ok(()),
        };
        let victim_key = {
            let state = self.request_state(victim);
            (state.priority, state.seq, !state.preempt)
        };
        if victim_key <= incoming_key {
            return Ok(());
        }
        self.resources[resource].users.retain(|&user| user != victim);
        let (owner, claimed_at) = {
            let state = self.request_state(victim);
            (state.owner, state.granted.unwrap_or(state.issued))
        };
        let by = self.request_state(incoming).owner;
        let held = to_seconds(self.now - claimed_at);
        add_sample(&self.resources[resource].monitors.interrupt_time, held);
        debug!(target: "prosim", resource, "user preempted");
        if let Some(owner) = owner {
            self.interrupt(owner, Payload::Preempted { by, claimed_at })?;
        }
        Ok(())
    }

    fn trigger_resource_releases(&mut self, resource: ResourceId) -> Result<(), SimError> {
        while let Some(release) = self.resources[resource].release_queue.pop_front() {
            let request = match self.slot(release).kind {
                EventKind::Release { request, .. } => request,
                _ => unreachable!("event is not a release"),
            };
            if !self.slot(request).triggered {
                // never granted: cancel the pending request
                let position = self.resources[resource]
                    .request_queue
                    .iter()
                    .position(|&queued| queued == request)
                    .ok_or(SimError::UnknownRequest)?;
                self.resources[resource].request_queue.remove(position);
                let waited = to_seconds(self.now - self.request_state(request).issued);
                add_sample(&self.resources[resource].monitors.break_off_time, waited);
            } else {
                let position = self.resources[resource]
                    .users
                    .iter()
                    .position(|&user| user == request)
                    .ok_or(SimError::UnknownRequest)?;
                self.resources[resource].users.remove(position);
                let held = to_seconds(self.now - self.request_state(request).issued);
                add_sample(&self.resources[resource].monitors.lead_time, held);
            }
            self.schedule_trigger(release, true, Payload::None);
        }
        Ok(())
    }

    fn resource_changed(&mut self, resource: ResourceId) {
        let now = self.now;
        let (users, queued, remaining) = {
            let state = &self.resources[resource];
            (
                state.users.len(),
                state.request_queue.len(),
                state.capacity - state.users.len(),
            )
        };
        {
            let monitors = &self.resources[resource].monitors;
            update_series(&monitors.utilization, now, users as f64);
            update_series(&monitors.queue_length, now, queued as f64);
            update_series(&monitors.wip, now, (users + queued) as f64);
        }
        let mut fired = Vec::new();
        {
            let latches = &mut self.resources[resource].latches;
            if remaining > 0 {
                fired.append(&mut latches.when_any);
            }
            if remaining == 0 {
                fired.append(&mut latches.when_full);
            }
            if users == 0 {
                fired.append(&mut latches.when_empty);
            }
            fired.append(&mut latches.when_change);
        }
        for latch in fired {
            self.schedule_trigger(latch, true, Payload::None);
        }
    }

    /// Latch firing once a lease is available.
    pub fn when_any(&mut self, resource: ResourceId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        let satisfied = {
            let state = &self.resources[resource];
            state.users.len() < state.capacity
        };
        if satisfied {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.resources[resource].latches.when_any.push(latch);
        }
        latch
    }

    /// Latch firing once the resource is fully utilized.
    pub fn when_full(&mut self, resource: ResourceId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        let satisfied = {
            let state = &self.resources[resource];
            state.users.len() >= state.capacity
        };
        if satisfied {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.resources[resource].latches.when_full.push(latch);
        }
        latch
    }

    /// Latch firing once no user holds the resource.
    pub fn when_empty(&mut self, resource: ResourceId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if self.resources[resource].users.is_empty() {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.resources[resource].latches.when_empty.push(latch);
        }
        latch
    }

    /// Latch firing on the next users or queue delta.
    pub fn when_change(&mut self, resource: ResourceId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        self.resources[resource].latches.when_change.push(latch);
        latch
    }

    /// Number of granted leases.
    pub fn users(&self, resource: ResourceId) -> usize {
        self.resources[resource].users.len()
    }

    /// Leases still available.
    pub fn remaining(&self, resource: ResourceId) -> usize {
        let state = &self.resources[resource];
        state.capacity - state.users.len()
    }

    /// Requests waiting in the queue.
    pub fn queued(&self, resource: ResourceId) -> usize {
        self.resources[resource].request_queue.len()
    }

    /// Attach observation hooks to a resource.
    pub fn attach_resource_monitors(&mut self, resource: ResourceId, monitors: ResourceMonitors) {
        self.resources[resource].monitors = monitors;
    }

    /// Create a pool handing out the given items, insertion order
    /// preserved. At least one item is required.
    pub fn create_resource_pool(&mut self, items: Vec<Payload>) -> Result<PoolId, SimError> {
        if items.is_empty() {
            return Err(SimError::EmptyPool);
        }
        let id = self.pools.len();
        let capacity = items.len();
        self.pools.push(PoolState {
            items: items.into(),
            capacity,
            request_queue: VecDeque::new(),
            release_queue: VecDeque::new(),
            latches: Latches::default(),
            monitors: ResourceMonitors::default(),
        });
        Ok(id)
    }

    /// Request any pool item. The request fires with the granted item
    /// as its value.
    pub fn request_pool(&mut self, pool: PoolId) -> Result<EventId, SimError> {
        self.pool_request_full(pool, None)
    }

    /// Request the first pool item matching `filter`, in insertion
    /// order. A request no current member matches blocks until a
    /// matching item is released back.
    pub fn request_pool_filtered(
        &mut self,
        pool: PoolId,
        filter: Rc<dyn Fn(&Payload) -> bool>,
    ) -> Result<EventId, SimError> {
        self.pool_request_full(pool, Some(filter))
    }

    fn pool_request_full(
        &mut self,
        pool: PoolId,
        filter: Option<Rc<dyn Fn(&Payload) -> bool>>,
    ) -> Result<EventId, SimError> {
        let request = self.new_request(ResourceRef::Pool(pool), 0, false);
        self.request_state_mut(request).filter = filter;
        self.pools[pool].request_queue.push_back(request);
        self.trigger_pool_requests(pool);
        self.pool_changed(pool);
        Ok(request)
    }

    /// Return a granted item to the pool's tail, or cancel a pending
    /// request.
    pub fn release_pool(&mut self, pool: PoolId, request: EventId) -> Result<EventId, SimError> {
        self.ensure_local(request)?;
        match self.try_request_state(request) {
            Some(state) if state.target == ResourceRef::Pool(pool) => {}
            _ => return Err(SimError::UnknownRequest),
        }
        let release = self.new_event(EventKind::Release {
            target: ResourceRef::Pool(pool),
            request,
        });
        self.pools[pool].release_queue.push_back(release);
        self.trigger_pool_releases(pool)?;
        self.trigger_pool_requests(pool);
        self.pool_changed(pool);
        Ok(release)
    }

    /// Serve every request whose filter matches some item, in FIFO
    /// precedence; blocked requests are retried on the next change.
    fn trigger_pool_requests(&mut self, pool: PoolId) {
        let mut index = 0;
        while index < self.pools[pool].request_queue.len() {
            let request = self.pools[pool].request_queue[index];
            let filter = self.request_state(request).filter.clone();
            let found = self.pools[pool]
                .items
                .iter()
                .position(|item| filter.as_ref().map_or(true, |accept| accept(item)));
            match found {
                Some(position) => {
                    let item = match self.pools[pool].items.remove(position) {
                        Some(item) => item,
                        None => break,
                    };
                    self.pools[pool].request_queue.remove(index);
                    let now = self.now;
                    self.request_state_mut(request).granted = Some(now);
                    let waited = to_seconds(now - self.request_state(request).issued);
                    add_sample(&self.pools[pool].monitors.waiting_time, waited);
                    self.schedule_trigger(request, true, item);
                }
                None => index += 1,
            }
        }
    }

    fn trigger_pool_releases(&mut self, pool: PoolId) -> Result<(), SimError> {
        while let Some(release) = self.pools[pool].release_queue.pop_front() {
            let request = match self.slot(release).kind {
                EventKind::Release { request, .. } => request,
                _ => unreachable!("event is not a release"),
            };
            if !self.slot(request).triggered {
                let position = self.pools[pool]
                    .request_queue
                    .iter()
                    .position(|&queued| queued == request)
                    .ok_or(SimError::UnknownRequest)?;
                self.pools[pool].request_queue.remove(position);
                let waited = to_seconds(self.now - self.request_state(request).issued);
                add_sample(&self.pools[pool].monitors.break_off_time, waited);
            } else {
                // the same identity goes back to the tail
                let item = self.slot(request).value.clone();
                self.pools[pool].items.push_back(item);
                let held = to_seconds(self.now - self.request_state(request).issued);
                add_sample(&self.pools[pool].monitors.lead_time, held);
            }
            self.schedule_trigger(release, true, Payload::None);
        }
        Ok(())
    }

    fn pool_changed(&mut self, pool: PoolId) {
        let now = self.now;
        let (available, queued, leased) = {
            let state = &self.pools[pool];
            (
                state.items.len(),
                state.request_queue.len(),
                state.capacity - state.items.len(),
            )
        };
        {
            let monitors = &self.pools[pool].monitors;
            update_series(&monitors.utilization, now, leased as f64);
            update_series(&monitors.queue_length, now, queued as f64);
            update_series(&monitors.wip, now, (leased + queued) as f64);
        }
        let mut fired = Vec::new();
        {
            let latches = &mut self.pools[pool].latches;
            if available > 0 {
                fired.append(&mut latches.when_any);
            }
            if available == 0 {
                fired.append(&mut latches.when_full);
            }
            if leased == 0 {
                fired.append(&mut latches.when_empty);
            }
            fired.append(&mut latches.when_change);
        }
        for latch in fired {
            self.schedule_trigger(latch, true, Payload::None);
        }
    }

    /// Latch firing once some pool item is available.
    pub fn pool_when_any(&mut self, pool: PoolId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if !self.pools[pool].items.is_empty() {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.pools[pool].latches.when_any.push(latch);
        }
        latch
    }

    /// Latch firing on the next pool delta.
    pub fn pool_when_change(&mut self, pool: PoolId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        self.pools[pool].latches.when_change.push(latch);
        latch
    }

    /// Items currently available in the pool.
    pub fn pool_available(&self, pool: PoolId) -> usize {
        self.pools[pool].items.len()
    }

    /// Attach observation hooks to a pool.
    pub fn attach_pool_monitors(&mut self, pool: PoolId, monitors: ResourceMonitors) {
        self.pools[pool].monitors = monitors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessStep;
    use crate::simulation::EndCondition;
    use chrono::Duration;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn seconds(sim: &Simulation) -> i64 {
        (sim.now() - sim.start()).num_seconds()
    }

    /// Process that waits `delay`, requests one lease, holds it for
    /// `hold` and releases it, logging its completion instant.
    fn worker(
        resource: ResourceId,
        delay: i64,
        hold: i64,
        done: Rc<RefCell<Vec<i64>>>,
    ) -> Box<crate::process::SimGen> {
        let mut stage = 0;
        let mut lease = None;
        Box::new(move |sim: &mut Simulation| {
            stage += 1;
            match stage {
                1 => ProcessStep::Yielded(sim.timeout(Duration::seconds(delay)).unwrap()),
                2 => {
                    let request = sim.request(resource).unwrap();
                    lease = Some(request);
                    ProcessStep::Yielded(request)
                }
                3 => ProcessStep::Yielded(sim.timeout(Duration::seconds(hold)).unwrap()),
                4 => ProcessStep::Yielded(sim.release(resource, lease.unwrap()).unwrap()),
                _ => {
                    done.borrow_mut()
                        .push((sim.now() - sim.start()).num_seconds());
                    ProcessStep::Complete(Payload::None)
                }
            }
        })
    }

    #[test]
    fn resource() {
        let done = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let r = sim.create_resource(1).unwrap();
        // simple process that locks the resource for 7 time units
        sim.create_process(worker(r, 0, 7, Rc::clone(&done)));
        // simple process that holds the resource for 3 time units,
        // arriving after 2 t.u., when r is not available
        sim.create_process(worker(r, 2, 3, Rc::clone(&done)));
        // p2 waits for r to be free (time 7.0) plus its own 3 t.u.
        // The simulation ends at time 10.0
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(*done.borrow(), vec![7, 10]);
        assert_eq!(seconds(&sim), 10);
    }

    #[test]
    fn capacity_bounds_users() {
        let mut sim = Simulation::new();
        let r = sim.create_resource(2).unwrap();
        let mut requests = Vec::new();
        for _ in 0..5 {
            requests.push(sim.request(r).unwrap());
        }
        assert_eq!(sim.users(r), 2);
        assert_eq!(sim.queued(r), 3);
        sim.run(EndCondition::NoEvents).unwrap();
        // grants follow arrival order
        assert!(sim.is_triggered(requests[0]).unwrap());
        assert!(sim.is_triggered(requests[1]).unwrap());
        assert!(!sim.is_triggered(requests[2]).unwrap());
        sim.release(r, requests[0]).unwrap();
        assert_eq!(sim.users(r), 2);
        assert!(sim.is_triggered(requests[2]).unwrap());
    }

    #[test]
    fn releasing_a_pending_request_cancels_it() {
        let mut sim = Simulation::new();
        let r = sim.create_resource(1).unwrap();
        let first = sim.request(r).unwrap();
        let second = sim.request(r).unwrap();
        assert_eq!(sim.queued(r), 1);
        sim.release(r, second).unwrap();
        assert_eq!(sim.queued(r), 0);
        assert!(!sim.is_triggered(second).unwrap());
        // the lease of the first request is untouched
        assert_eq!(sim.users(r), 1);
        sim.release(r, first).unwrap();
        assert_eq!(sim.users(r), 0);
    }

    #[test]
    fn priority_queue_serves_lower_values_first() {
        let mut sim = Simulation::new();
        let r = sim.create_priority_resource(1).unwrap();
        let hold = sim.request_prioritized(r, 0).unwrap();
        let low = sim.request_prioritized(r, 5).unwrap();
        let high = sim.request_prioritized(r, -5).unwrap();
        let mid = sim.request_prioritized(r, 5).unwrap();
        sim.release(r, hold).unwrap();
        assert!(sim.is_triggered(high).unwrap());
        sim.release(r, high).unwrap();
        // FIFO within one priority value
        assert!(sim.is_triggered(low).unwrap());
        assert!(!sim.is_triggered(mid).unwrap());
    }

    #[test]
    fn preemption_evicts_the_weakest_user() {
        let mut sim = Simulation::new();
        let r = sim.create_preemptive_resource(1).unwrap();
        let holder = sim.create_process(Box::new({
            let mut stage = 0;
            move |sim: &mut Simulation| {
                stage += 1;
                match stage {
                    1 => ProcessStep::Yielded(sim.request_preempting(r, 5, true).unwrap()),
                    2 => ProcessStep::Yielded(sim.timeout(Duration::seconds(10)).unwrap()),
                    _ => {
                        if sim.handle_fault() {
                            // evicted before the hold ran out
                            ProcessStep::Complete(Payload::from("preempted"))
                        } else {
                            ProcessStep::Complete(Payload::from("finished"))
                        }
                    }
                }
            }
        }));
        sim.create_process(Box::new({
            let mut stage = 0;
            move |sim: &mut Simulation| {
                stage += 1;
                match stage {
                    1 => ProcessStep::Yielded(sim.timeout(Duration::seconds(3)).unwrap()),
                    2 => ProcessStep::Yielded(sim.request_preempting(r, 0, true).unwrap()),
                    _ => ProcessStep::Complete(Payload::None),
                }
            }
        }));
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(
            sim.value(sim.join(holder)).unwrap(),
            Payload::from("preempted")
        );
        assert_eq!(sim.users(r), 1);
    }

    #[test]
    fn equal_strength_does_not_preempt() {
        let mut sim = Simulation::new();
        let r = sim.create_preemptive_resource(1).unwrap();
        let first = sim.request_preempting(r, 1, true).unwrap();
        let second = sim.request_preempting(r, 1, true).unwrap();
        assert!(sim.is_triggered(first).unwrap());
        // same priority, earlier acquisition: the holder stays
        assert!(!sim.is_triggered(second).unwrap());
        assert_eq!(sim.queued(r), 1);
    }

    #[test]
    fn latches_fire_on_their_predicates() {
        let mut sim = Simulation::new();
        let r = sim.create_resource(1).unwrap();
        let any = sim.when_any(r);
        let full = sim.when_full(r);
        let req = sim.request(r).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        // free at creation: when_any fired immediately
        assert!(sim.is_processed(any).unwrap());
        assert!(sim.is_processed(full).unwrap());
        let empty = sim.when_empty(r);
        let change = sim.when_change(r);
        sim.release(r, req).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert!(sim.is_processed(empty).unwrap());
        assert!(sim.is_processed(change).unwrap());
    }

    #[test]
    fn pool_items_are_granted_in_insertion_order() {
        let mut sim = Simulation::new();
        let pool = sim
            .create_resource_pool(vec![
                Payload::from("alpha"),
                Payload::from("beta"),
                Payload::from("gamma"),
            ])
            .unwrap();
        let first = sim.request_pool(pool).unwrap();
        let second = sim.request_pool(pool).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(first).unwrap(), Payload::from("alpha"));
        assert_eq!(sim.value(second).unwrap(), Payload::from("beta"));
        assert_eq!(sim.pool_available(pool), 1);
        // releases return to the tail
        sim.release_pool(pool, first).unwrap();
        let third = sim.request_pool(pool).unwrap();
        let fourth = sim.request_pool(pool).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(third).unwrap(), Payload::from("gamma"));
        assert_eq!(sim.value(fourth).unwrap(), Payload::from("alpha"));
    }

    #[test]
    fn filtered_pool_requests_wait_for_a_matching_item() {
        let mut sim = Simulation::new();
        let pool = sim
            .create_resource_pool(vec![Payload::Number(1.0), Payload::Number(2.0)])
            .unwrap();
        let odd = sim
            .request_pool_filtered(pool, Rc::new(|item: &Payload| item.number() == Some(3.0)))
            .unwrap();
        // no current member matches: the request blocks...
        assert!(!sim.is_triggered(odd).unwrap());
        // ...without starving requests behind it
        let even = sim
            .request_pool_filtered(pool, Rc::new(|item: &Payload| item.number() == Some(2.0)))
            .unwrap();
        assert!(sim.is_triggered(even).unwrap());
        let plain = sim.request_pool(pool).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(plain).unwrap(), Payload::Number(1.0));
        assert!(!sim.is_triggered(odd).unwrap());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let mut sim = Simulation::new();
        assert_eq!(
            sim.create_resource_pool(Vec::new()).unwrap_err(),
            SimError::EmptyPool
        );
    }

    #[test]
    fn monitors_observe_the_resource() {
        use crate::monitor::{SampleMonitor, TimeSeriesMonitor};
        use chrono::{DateTime, Utc};

        #[derive(Default)]
        struct Series(Vec<f64>);
        impl TimeSeriesMonitor for Series {
            fn update_to(&mut self, _time: DateTime<Utc>, value: f64) {
                self.0.push(value);
            }
        }
        #[derive(Default)]
        struct Samples(Vec<f64>);
        impl SampleMonitor for Samples {
            fn add(&mut self, value: f64) {
                self.0.push(value);
            }
        }

        let utilization = Rc::new(RefCell::new(Series::default()));
        let waiting = Rc::new(RefCell::new(Samples::default()));
        let done = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let r = sim.create_resource(1).unwrap();
        sim.attach_resource_monitors(
            r,
            ResourceMonitors {
                utilization: Some(utilization.clone()),
                waiting_time: Some(waiting.clone()),
                ..Default::default()
            },
        );
        sim.create_process(worker(r, 0, 7, Rc::clone(&done)));
        sim.create_process(worker(r, 2, 3, Rc::clone(&done)));
        sim.run(EndCondition::NoEvents).unwrap();
        // first grant was immediate, the second waited from t=2 to t=7
        assert_eq!(waiting.borrow().0, vec![0.0, 5.0]);
        let series = &utilization.borrow().0;
        assert_eq!(series.first(), Some(&1.0));
        assert_eq!(series.last(), Some(&0.0));
        assert!(series.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut sim = Simulation::new();
        assert_eq!(
            sim.create_resource(0).unwrap_err(),
            SimError::InvalidCapacity
        );
    }
}
