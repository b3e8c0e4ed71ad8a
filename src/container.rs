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

//! Continuous reservoir.
//!
//! A container holds a level in `[0, capacity]`. A put blocks until
//! its amount fits under the capacity, a get blocks until the level
//! covers its amount. Both queues are strict FIFO: a blocked head
//! holds back later puts or gets even if those could be satisfied.
//!
//! Level latches observe thresholds: `when_at_least(l)` fires once
//! the level reaches `l`, `when_at_most(l)` once it drops to `l`. On
//! every level change all satisfied latches fire exactly once, lowest
//! threshold first for `at_least`, highest first for `at_most`.

use std::collections::VecDeque;

use crate::error::SimError;
use crate::event::{EventId, EventKind};
use crate::monitor::{update_series, ContainerMonitors};
use crate::payload::Payload;
use crate::resources::ResourceRef;
use crate::simulation::Simulation;
use crate::ContainerId;

pub(crate) struct ContainerState {
    pub(crate) capacity: f64,
    pub(crate) level: f64,
    pub(crate) put_queue: VecDeque<EventId>,
    pub(crate) get_queue: VecDeque<EventId>,
    /// Threshold latches sorted ascending by `(threshold, seq)`.
    pub(crate) at_least: Vec<(f64, u64, EventId)>,
    /// Threshold latches sorted descending by threshold, ascending seq.
    pub(crate) at_most: Vec<(f64, u64, EventId)>,
    pub(crate) when_change: Vec<EventId>,
    pub(crate) latch_seq: u64,
    pub(crate) monitors: ContainerMonitors,
}

impl Simulation {
    /// Create a container with the given capacity and initial level.
    pub fn create_container(
        &mut self,
        capacity: f64,
        initial: f64,
    ) -> Result<ContainerId, SimError> {
        if !(capacity > 0.0) {
            return Err(SimError::InvalidCapacity);
        }
        if !(0.0..=capacity).contains(&initial) {
            return Err(SimError::InvalidAmount);
        }
        let id = self.containers.len();
        self.containers.push(ContainerState {
            capacity,
            level: initial,
            put_queue: VecDeque::new(),
            get_queue: VecDeque::new(),
            at_least: Vec::new(),
            at_most: Vec::new(),
            when_change: Vec::new(),
            latch_seq: 0,
            monitors: ContainerMonitors::default(),
        });
        Ok(id)
    }

    /// Pour `amount` in. The returned event fires once the amount
    /// fits; amounts must be in `(0, capacity]`.
    pub fn container_put(
        &mut self,
        container: ContainerId,
        amount: f64,
    ) -> Result<EventId, SimError> {
        self.container_move(container, amount, true)
    }

    /// Draw `amount` out. The returned event fires once the level
    /// covers it; amounts must be in `(0, capacity]`.
    pub fn container_get(
        &mut self,
        container: ContainerId,
        amount: f64,
    ) -> Result<EventId, SimError> {
        self.container_move(container, amount, false)
    }

    fn container_move(
        &mut self,
        container: ContainerId,
        amount: f64,
        putting: bool,
    ) -> Result<EventId, SimError> {
        let capacity = self.containers[container].capacity;
        if !(amount > 0.0) || amount > capacity {
            return Err(SimError::InvalidAmount);
        }
        let target = if putting {
            ResourceRef::ContainerPut(container)
        } else {
            ResourceRef::ContainerGet(container)
        };
        let request = self.new_request(target, 0, false);
        self.request_state_mut(request).amount = amount;
        if putting {
            self.containers[container].put_queue.push_back(request);
        } else {
            self.containers[container].get_queue.push_back(request);
        }
        self.trigger_container(container);
        self.container_changed(container);
        Ok(request)
    }

    /// Drain both queues head-of-line until neither makes progress.
    fn trigger_container(&mut self, container: ContainerId) {
        loop {
            let mut progress = false;
            loop {
                let head = match self.containers[container].put_queue.front() {
                    Some(&head) => head,
                    None => break,
                };
                let amount = self.request_state(head).amount;
                let state = &self.containers[container];
                if state.level + amount > state.capacity {
                    break;
                }
                self.containers[container].level += amount;
                self.containers[container].put_queue.pop_front();
                let now = self.now;
                self.request_state_mut(head).granted = Some(now);
                self.schedule_trigger(head, true, Payload::None);
                progress = true;
            }
            loop {
                let head = match self.containers[container].get_queue.front() {
                    Some(&head) => head,
                    None => break,
                };
                let amount = self.request_state(head).amount;
                if self.containers[container].level < amount {
                    break;
                }
                self.containers[container].level -= amount;
                self.containers[container].get_queue.pop_front();
                let now = self.now;
                self.request_state_mut(head).granted = Some(now);
                self.schedule_trigger(head, true, Payload::None);
                progress = true;
            }
            if !progress {
                break;
            }
        }
    }

    fn container_changed(&mut self, container: ContainerId) {
        let now = self.now;
        let level = self.containers[container].level;
        update_series(&self.containers[container].monitors.level, now, level);
        let mut fired = Vec::new();
        {
            let state = &mut self.containers[container];
            // ascending thresholds: drain the satisfied prefix
            while state
                .at_least
                .first()
                .map_or(false, |&(threshold, _, _)| level >= threshold)
            {
                fired.push(state.at_least.remove(0).2);
            }
            // descending thresholds: same, from the other end
            while state
                .at_most
                .first()
                .map_or(false, |&(threshold, _, _)| level <= threshold)
            {
                fired.push(state.at_most.remove(0).2);
            }
            fired.extend(state.when_change.drain(..));
        }
        for latch in fired {
            self.schedule_trigger(latch, true, Payload::None);
        }
    }

    /// Latch firing once the level reaches `threshold`.
    pub fn when_at_least(&mut self, container: ContainerId, threshold: f64) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if self.containers[container].level >= threshold {
            self.schedule_trigger(latch, true, Payload::None);
            return latch;
        }
        let state = &mut self.containers[container];
        let seq = state.latch_seq;
        state.latch_seq += 1;
        let position = state
            .at_least
            .iter()
            .position(|&(t, s, _)| (t, s) > (threshold, seq))
            .unwrap_or(state.at_least.len());
        state.at_least.insert(position, (threshold, seq, latch));
        latch
    }

    /// Latch firing once the level drops to `threshold`.
    pub fn when_at_most(&mut self, container: ContainerId, threshold: f64) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if self.containers[container].level <= threshold {
            self.schedule_trigger(latch, true, Payload::None);
            return latch;
        }
        let state = &mut self.containers[container];
        let seq = state.latch_seq;
        state.latch_seq += 1;
        let position = state
            .at_most
            .iter()
            .position(|&(t, s, _)| t < threshold || (t == threshold && s > seq))
            .unwrap_or(state.at_most.len());
        state.at_most.insert(position, (threshold, seq, latch));
        latch
    }

    /// Latch firing on the next level change.
    pub fn container_when_change(&mut self, container: ContainerId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        self.containers[container].when_change.push(latch);
        latch
    }

    /// Current fill level.
    pub fn level(&self, container: ContainerId) -> f64 {
        self.containers[container].level
    }

    /// Configured capacity.
    pub fn container_capacity(&self, container: ContainerId) -> f64 {
        self.containers[container].capacity
    }

    /// Attach observation hooks to a container.
    pub fn attach_container_monitors(
        &mut self,
        container: ContainerId,
        monitors: ContainerMonitors,
    ) {
        self.containers[container].monitors = monitors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_moves_within_bounds() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(10.0, 5.0).unwrap();
        let put = sim.container_put(tank, 3.0).unwrap();
        assert!(sim.is_triggered(put).unwrap());
        assert_eq!(sim.level(tank), 8.0);
        let get = sim.container_get(tank, 8.0).unwrap();
        assert!(sim.is_triggered(get).unwrap());
        assert_eq!(sim.level(tank), 0.0);
    }

    #[test]
    fn an_oversized_put_blocks_until_room_is_made() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(10.0, 8.0).unwrap();
        let put = sim.container_put(tank, 5.0).unwrap();
        assert!(!sim.is_triggered(put).unwrap());
        sim.container_get(tank, 4.0).unwrap();
        // 8 - 4 + 5 = 9
        assert!(sim.is_triggered(put).unwrap());
        assert_eq!(sim.level(tank), 9.0);
    }

    #[test]
    fn the_head_blocks_the_line() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(10.0, 1.0).unwrap();
        let big = sim.container_get(tank, 5.0).unwrap();
        let small = sim.container_get(tank, 1.0).unwrap();
        // the small get could be satisfied, but the big head blocks it
        assert!(!sim.is_triggered(big).unwrap());
        assert!(!sim.is_triggered(small).unwrap());
        sim.container_put(tank, 4.0).unwrap();
        assert!(sim.is_triggered(big).unwrap());
        assert!(!sim.is_triggered(small).unwrap());
    }

    #[test]
    fn amounts_are_validated() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(5.0, 0.0).unwrap();
        assert_eq!(
            sim.container_put(tank, 0.0).unwrap_err(),
            SimError::InvalidAmount
        );
        assert_eq!(
            sim.container_put(tank, -1.0).unwrap_err(),
            SimError::InvalidAmount
        );
        assert_eq!(
            sim.container_get(tank, 6.0).unwrap_err(),
            SimError::InvalidAmount
        );
        assert_eq!(
            sim.create_container(0.0, 0.0).unwrap_err(),
            SimError::InvalidCapacity
        );
        assert_eq!(
            sim.create_container(5.0, 7.0).unwrap_err(),
            SimError::InvalidAmount
        );
    }

    #[test]
    fn threshold_latches_fire_in_priority_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let tank = sim.create_container(100.0, 0.0).unwrap();
        for &threshold in &[30.0, 10.0, 20.0] {
            let latch = sim.when_at_least(tank, threshold);
            let order = Rc::clone(&order);
            sim.add_callback(
                latch,
                Box::new(move |_, _| order.borrow_mut().push(threshold)),
            )
            .unwrap();
        }
        sim.container_put(tank, 50.0).unwrap();
        sim.run(crate::simulation::EndCondition::NoEvents).unwrap();
        // all satisfied at once: lowest threshold first
        assert_eq!(*order.borrow(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn at_most_latches_watch_the_level_falling() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(10.0, 9.0).unwrap();
        let low = sim.when_at_most(tank, 2.0);
        let lower = sim.when_at_most(tank, 1.0);
        sim.container_get(tank, 7.0).unwrap();
        assert!(sim.is_triggered(low).unwrap());
        assert!(!sim.is_triggered(lower).unwrap());
        sim.container_get(tank, 1.5).unwrap();
        assert!(sim.is_triggered(lower).unwrap());
    }

    #[test]
    fn satisfied_thresholds_fire_at_registration() {
        let mut sim = Simulation::new();
        let tank = sim.create_container(10.0, 5.0).unwrap();
        let reached = sim.when_at_least(tank, 5.0);
        let below = sim.when_at_most(tank, 5.0);
        assert!(sim.is_triggered(reached).unwrap());
        assert!(sim.is_triggered(below).unwrap());
    }
}
