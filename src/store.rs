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

//! Item-oriented buffers.
//!
//! A `Store` is a bounded FIFO of items: a put blocks while the store
//! is at capacity, a get blocks while it is empty. A `FilterStore`
//! serves each get with the first item matching its predicate,
//! re-scanning every blocked get whenever something changes, so a get
//! whose item has not arrived yet never starves the gets behind it. A
//! `PriorityStore` orders its items by an explicit put priority, lower
//! value first, FIFO within one value.

use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::SimError;
use crate::event::{EventId, EventKind};
use crate::monitor::{add_sample, update_series, StoreMonitors};
use crate::payload::Payload;
use crate::resources::{Latches, ResourceRef};
use crate::simulation::{to_seconds, Simulation};
use crate::StoreId;

pub(crate) struct StoreItem {
    pub(crate) admitted: DateTime<Utc>,
    pub(crate) priority: i32,
    pub(crate) seq: u64,
    pub(crate) value: Payload,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreKind {
    Fifo,
    Filter,
    Priority,
}

pub(crate) struct StoreState {
    pub(crate) capacity: usize,
    pub(crate) kind: StoreKind,
    pub(crate) items: VecDeque<StoreItem>,
    pub(crate) put_queue: VecDeque<EventId>,
    pub(crate) get_queue: VecDeque<EventId>,
    pub(crate) latches: Latches,
    pub(crate) monitors: StoreMonitors,
}

impl Simulation {
    /// Create a bounded FIFO store.
    pub fn create_store(&mut self, capacity: usize) -> Result<StoreId, SimError> {
        self.make_store(capacity, StoreKind::Fifo)
    }

    /// Create a store serving gets by item predicate.
    pub fn create_filter_store(&mut self, capacity: usize) -> Result<StoreId, SimError> {
        self.make_store(capacity, StoreKind::Filter)
    }

    /// Create a store whose items are ordered by put priority.
    pub fn create_priority_store(&mut self, capacity: usize) -> Result<StoreId, SimError> {
        self.make_store(capacity, StoreKind::Priority)
    }

    fn make_store(&mut self, capacity: usize, kind: StoreKind) -> Result<StoreId, SimError> {
        if capacity == 0 {
            return Err(SimError::InvalidCapacity);
        }
        let id = self.stores.len();
        self.stores.push(StoreState {
            capacity,
            kind,
            items: VecDeque::new(),
            put_queue: VecDeque::new(),
            get_queue: VecDeque::new(),
            latches: Latches::default(),
            monitors: StoreMonitors::default(),
        });
        Ok(id)
    }

    /// Offer an item. The returned event fires when the item has been
    /// admitted; puts block head-of-line while the store is full.
    pub fn put(&mut self, store: StoreId, item: Payload) -> Result<EventId, SimError> {
        self.put_full(store, item, 0)
    }

    /// [`put`](Simulation::put) with an explicit item priority, only
    /// meaningful for a priority store.
    pub fn put_prioritized(
        &mut self,
        store: StoreId,
        item: Payload,
        priority: i32,
    ) -> Result<EventId, SimError> {
        self.put_full(store, item, priority)
    }

    fn put_full(
        &mut self,
        store: StoreId,
        item: Payload,
        priority: i32,
    ) -> Result<EventId, SimError> {
        if item.is_none() {
            return Err(SimError::NullValue);
        }
        let put = self.new_request(ResourceRef::StorePut(store), priority, false);
        self.slot_mut(put).value = item;
        self.stores[store].put_queue.push_back(put);
        self.trigger_store_puts(store);
        self.trigger_store_gets(store);
        self.store_changed(store);
        Ok(put)
    }

    /// Take the next item. The returned event fires with the item as
    /// its value; gets block while the store is empty.
    pub fn get(&mut self, store: StoreId) -> Result<EventId, SimError> {
        self.get_full(store, None)
    }

    /// Take the first item matching `filter`, scanning in FIFO order.
    /// Non-matching items stay; the get blocks until a matching item
    /// arrives.
    pub fn get_filtered(
        &mut self,
        store: StoreId,
        filter: Rc<dyn Fn(&Payload) -> bool>,
    ) -> Result<EventId, SimError> {
        if self.stores[store].kind != StoreKind::Filter {
            return Err(SimError::FilterUnsupported);
        }
        self.get_full(store, Some(filter))
    }

    fn get_full(
        &mut self,
        store: StoreId,
        filter: Option<Rc<dyn Fn(&Payload) -> bool>>,
    ) -> Result<EventId, SimError> {
        let get = self.new_request(ResourceRef::StoreGet(store), 0, false);
        self.request_state_mut(get).filter = filter;
        self.stores[store].get_queue.push_back(get);
        self.trigger_store_gets(store);
        // a served get frees room for a blocked put
        self.trigger_store_puts(store);
        self.store_changed(store);
        Ok(get)
    }

    /// Head-of-line put drain.
    fn trigger_store_puts(&mut self, store: StoreId) {
        loop {
            let head = match self.stores[store].put_queue.front() {
                Some(&head) => head,
                None => break,
            };
            let admissible = {
                let state = &self.stores[store];
                state.items.len() < state.capacity
            };
            if !admissible {
                break;
            }
            self.stores[store].put_queue.pop_front();
            let (priority, seq) = {
                let state = self.request_state(head);
                (state.priority, state.seq)
            };
            let value = self.slot(head).value.clone();
            let item = StoreItem {
                admitted: self.now,
                priority,
                seq,
                value: value.clone(),
            };
            match self.stores[store].kind {
                StoreKind::Priority => {
                    let count = self.stores[store].items.len();
                    let position = self.stores[store]
                        .items
                        .iter()
                        .position(|held| (held.priority, held.seq) > (priority, seq))
                        .unwrap_or(count);
                    self.stores[store].items.insert(position, item);
                }
                _ => self.stores[store].items.push_back(item),
            }
            let fresh = std::mem::take(&mut self.stores[store].latches.when_new);
            for latch in fresh {
                self.schedule_trigger(latch, true, Payload::None);
            }
            self.schedule_trigger(head, true, value);
        }
    }

    fn trigger_store_gets(&mut self, store: StoreId) {
        match self.stores[store].kind {
            StoreKind::Fifo | StoreKind::Priority => loop {
                let head = match self.stores[store].get_queue.front() {
                    Some(&head) => head,
                    None => break,
                };
                let item = match self.stores[store].items.pop_front() {
                    Some(item) => item,
                    None => break,
                };
                self.stores[store].get_queue.pop_front();
                self.grant_get(store, head, item);
            },
            StoreKind::Filter => {
                // serve any satisfiable get, FIFO precedence; blocked
                // gets are retried on the next change
                let mut index = 0;
                while index < self.stores[store].get_queue.len() {
                    let get = self.stores[store].get_queue[index];
                    let filter = self.request_state(get).filter.clone();
                    let found = self.stores[store]
                        .items
                        .iter()
                        .position(|item| filter.as_ref().map_or(true, |accept| accept(&item.value)));
                    match found {
                        Some(position) => {
                            let item = match self.stores[store].items.remove(position) {
                                Some(item) => item,
                                None => break,
                            };
                            self.stores[store].get_queue.remove(index);
                            self.grant_get(store, get, item);
                        }
                        None => index += 1,
                    }
                }
            }
        }
    }

    fn grant_get(&mut self, store: StoreId, get: EventId, item: StoreItem) {
        let now = self.now;
        self.request_state_mut(get).granted = Some(now);
        let stayed = to_seconds(self.now - item.admitted);
        add_sample(&self.stores[store].monitors.lead_time, stayed);
        self.schedule_trigger(get, true, item.value);
    }

    fn store_changed(&mut self, store: StoreId) {
        let now = self.now;
        let (count, capacity, waiting) = {
            let state = &self.stores[store];
            (state.items.len(), state.capacity, state.get_queue.len())
        };
        {
            let monitors = &self.stores[store].monitors;
            update_series(&monitors.wip, now, count as f64);
            update_series(&monitors.queue_length, now, waiting as f64);
        }
        let mut fired = Vec::new();
        {
            let latches = &mut self.stores[store].latches;
            if count > 0 {
                fired.append(&mut latches.when_any);
            }
            if count == capacity {
                fired.append(&mut latches.when_full);
            }
            if count == 0 {
                fired.append(&mut latches.when_empty);
            }
            fired.append(&mut latches.when_change);
        }
        for latch in fired {
            self.schedule_trigger(latch, true, Payload::None);
        }
    }

    /// Latch firing on the next successful put.
    pub fn when_new(&mut self, store: StoreId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        self.stores[store].latches.when_new.push(latch);
        latch
    }

    /// Latch firing once the store holds an item.
    pub fn store_when_any(&mut self, store: StoreId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if !self.stores[store].items.is_empty() {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.stores[store].latches.when_any.push(latch);
        }
        latch
    }

    /// Latch firing once the store is at capacity.
    pub fn store_when_full(&mut self, store: StoreId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        let satisfied = {
            let state = &self.stores[store];
            state.items.len() == state.capacity
        };
        if satisfied {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.stores[store].latches.when_full.push(latch);
        }
        latch
    }

    /// Latch firing once the store is empty.
    pub fn store_when_empty(&mut self, store: StoreId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        if self.stores[store].items.is_empty() {
            self.schedule_trigger(latch, true, Payload::None);
        } else {
            self.stores[store].latches.when_empty.push(latch);
        }
        latch
    }

    /// Latch firing on the next item or queue delta.
    pub fn store_when_change(&mut self, store: StoreId) -> EventId {
        let latch = self.new_event(EventKind::Generic);
        self.stores[store].latches.when_change.push(latch);
        latch
    }

    /// Items currently held.
    pub fn store_count(&self, store: StoreId) -> usize {
        self.stores[store].items.len()
    }

    /// Attach observation hooks to a store.
    pub fn attach_store_monitors(&mut self, store: StoreId, monitors: StoreMonitors) {
        self.stores[store].monitors = monitors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::EndCondition;

    #[test]
    fn puts_and_gets_pair_up_fifo() {
        let mut sim = Simulation::new();
        let store = sim.create_store(10).unwrap();
        let waiting = sim.get(store).unwrap();
        assert!(!sim.is_triggered(waiting).unwrap());
        sim.put(store, Payload::Number(1.0)).unwrap();
        assert!(sim.is_triggered(waiting).unwrap());
        sim.put(store, Payload::Number(2.0)).unwrap();
        sim.put(store, Payload::Number(3.0)).unwrap();
        let first = sim.get(store).unwrap();
        let second = sim.get(store).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(waiting).unwrap(), Payload::Number(1.0));
        assert_eq!(sim.value(first).unwrap(), Payload::Number(2.0));
        assert_eq!(sim.value(second).unwrap(), Payload::Number(3.0));
        assert_eq!(sim.store_count(store), 0);
    }

    #[test]
    fn a_full_store_blocks_puts_head_of_line() {
        let mut sim = Simulation::new();
        let store = sim.create_store(1).unwrap();
        sim.put(store, Payload::Number(1.0)).unwrap();
        let blocked = sim.put(store, Payload::Number(2.0)).unwrap();
        let behind = sim.put(store, Payload::Number(3.0)).unwrap();
        assert!(!sim.is_triggered(blocked).unwrap());
        assert!(!sim.is_triggered(behind).unwrap());
        // taking one item admits exactly the next blocked put
        sim.get(store).unwrap();
        assert!(sim.is_triggered(blocked).unwrap());
        assert!(!sim.is_triggered(behind).unwrap());
        assert_eq!(sim.store_count(store), 1);
    }

    #[test]
    fn null_values_are_rejected() {
        let mut sim = Simulation::new();
        let store = sim.create_store(1).unwrap();
        assert_eq!(
            sim.put(store, Payload::None).unwrap_err(),
            SimError::NullValue
        );
    }

    #[test]
    fn filter_store_leaves_non_matching_items_in_place() {
        let mut sim = Simulation::new();
        let store = sim.create_filter_store(10).unwrap();
        sim.put(store, Payload::from("red")).unwrap();
        sim.put(store, Payload::from("green")).unwrap();
        sim.put(store, Payload::from("blue")).unwrap();
        let green = sim
            .get_filtered(store, Rc::new(|v: &Payload| v.text() == Some("green")))
            .unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(green).unwrap(), Payload::from("green"));
        // the earlier non-matching item stayed put
        assert_eq!(sim.store_count(store), 2);
        let red = sim.get(store).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(red).unwrap(), Payload::from("red"));
    }

    #[test]
    fn blocked_filtered_get_is_served_by_a_later_put() {
        let mut sim = Simulation::new();
        let store = sim.create_filter_store(10).unwrap();
        let want_b = sim
            .get_filtered(store, Rc::new(|v: &Payload| v.text() == Some("b")))
            .unwrap();
        let want_a = sim
            .get_filtered(store, Rc::new(|v: &Payload| v.text() == Some("a")))
            .unwrap();
        // the blocked head does not starve the get behind it
        sim.put(store, Payload::from("a")).unwrap();
        assert!(!sim.is_triggered(want_b).unwrap());
        assert!(sim.is_triggered(want_a).unwrap());
        sim.put(store, Payload::from("b")).unwrap();
        assert!(sim.is_triggered(want_b).unwrap());
    }

    #[test]
    fn filtered_gets_require_a_filter_store() {
        let mut sim = Simulation::new();
        let store = sim.create_store(1).unwrap();
        assert_eq!(
            sim.get_filtered(store, Rc::new(|_: &Payload| true))
                .unwrap_err(),
            SimError::FilterUnsupported
        );
    }

    #[test]
    fn priority_store_hands_out_the_best_item() {
        let mut sim = Simulation::new();
        let store = sim.create_priority_store(10).unwrap();
        sim.put_prioritized(store, Payload::from("later"), 5).unwrap();
        sim.put_prioritized(store, Payload::from("sooner"), -5).unwrap();
        sim.put_prioritized(store, Payload::from("middle"), 0).unwrap();
        let first = sim.get(store).unwrap();
        let second = sim.get(store).unwrap();
        let third = sim.get(store).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        assert_eq!(sim.value(first).unwrap(), Payload::from("sooner"));
        assert_eq!(sim.value(second).unwrap(), Payload::from("middle"));
        assert_eq!(sim.value(third).unwrap(), Payload::from("later"));
    }

    #[test]
    fn when_new_fires_on_every_put() {
        let mut sim = Simulation::new();
        let store = sim.create_store(5).unwrap();
        let fresh = sim.when_new(store);
        assert!(!sim.is_triggered(fresh).unwrap());
        sim.put(store, Payload::Number(1.0)).unwrap();
        assert!(sim.is_triggered(fresh).unwrap());
        // one-shot: a new latch is needed for the next put
        let again = sim.when_new(store);
        assert!(!sim.is_triggered(again).unwrap());
        sim.put(store, Payload::Number(2.0)).unwrap();
        assert!(sim.is_triggered(again).unwrap());
    }

    #[test]
    fn store_latches_follow_the_fill_level() {
        let mut sim = Simulation::new();
        let store = sim.create_store(2).unwrap();
        let any = sim.store_when_any(store);
        let full = sim.store_when_full(store);
        assert!(!sim.is_triggered(any).unwrap());
        sim.put(store, Payload::Number(1.0)).unwrap();
        assert!(sim.is_triggered(any).unwrap());
        assert!(!sim.is_triggered(full).unwrap());
        sim.put(store, Payload::Number(2.0)).unwrap();
        assert!(sim.is_triggered(full).unwrap());
        let empty = sim.store_when_empty(store);
        sim.get(store).unwrap();
        sim.get(store).unwrap();
        assert!(sim.is_triggered(empty).unwrap());
    }
}
