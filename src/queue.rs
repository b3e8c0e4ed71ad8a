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

//! Time-ordered queue of scheduled events.
//!
//! A binary min-heap keyed by `(time, priority, seq)`, lowest first.
//! `seq` is a monotonically increasing insertion index assigned when a
//! node is enqueued; it breaks every remaining tie, so the pop order is
//! totally deterministic. A back-index from event to heap position
//! makes `contains`, `remove` and `update` possible without scanning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::event::EventId;

/// Secondary priority that beats every regular scheduling priority.
pub(crate) const URGENT: i32 = i32::MIN;

const INITIAL_CAPACITY: usize = 1024;

/// One scheduled entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScheduleNode {
    pub(crate) time: DateTime<Utc>,
    pub(crate) priority: i32,
    pub(crate) seq: i64,
    pub(crate) event: EventId,
}

impl ScheduleNode {
    fn key(&self) -> (DateTime<Utc>, i32, i64) {
        (self.time, self.priority, self.seq)
    }
}

pub(crate) struct EventQueue {
    heap: Vec<ScheduleNode>,
    positions: HashMap<EventId, usize>,
    next_seq: i64,
}

impl EventQueue {
    pub(crate) fn new() -> EventQueue {
        EventQueue {
            heap: Vec::with_capacity(INITIAL_CAPACITY),
            positions: HashMap::with_capacity(INITIAL_CAPACITY),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Push an event due at `time`. Ties are broken by `priority`
    /// (lower first), then by insertion order.
    pub(crate) fn enqueue(&mut self, time: DateTime<Utc>, priority: i32, event: EventId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.push_node(ScheduleNode {
            time,
            priority,
            seq,
            event,
        });
    }

    /// Push a stop sentinel due at `time`. It carries the urgent
    /// priority and insertion index -1, so it is popped before any
    /// natural event due at the same instant.
    pub(crate) fn enqueue_first(&mut self, time: DateTime<Utc>, event: EventId) {
        self.push_node(ScheduleNode {
            time,
            priority: URGENT,
            seq: -1,
            event,
        });
    }

    fn push_node(&mut self, node: ScheduleNode) {
        let index = self.heap.len();
        self.positions.insert(node.event, index);
        self.heap.push(node);
        self.sift_up(index);
    }

    pub(crate) fn peek(&self) -> Option<&ScheduleNode> {
        self.heap.first()
    }

    pub(crate) fn dequeue(&mut self) -> Option<ScheduleNode> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let node = self.heap.pop().map(|n| {
            self.positions.remove(&n.event);
            n
        });
        if !self.heap.is_empty() {
            self.positions.insert(self.heap[0].event, 0);
            self.sift_down(0);
        }
        node
    }

    pub(crate) fn contains(&self, event: EventId) -> bool {
        self.positions.contains_key(&event)
    }

    /// Best-effort removal of a scheduled event.
    pub(crate) fn remove(&mut self, event: EventId) -> Option<ScheduleNode> {
        let index = self.positions.remove(&event)?;
        let last = self.heap.len() - 1;
        self.heap.swap(index, last);
        let node = self.heap.pop();
        if index < self.heap.len() {
            self.positions.insert(self.heap[index].event, index);
            // the replacement may violate the heap property in either direction
            self.sift_up(index);
            self.sift_down(index);
        }
        node
    }

    /// Re-key a scheduled event, moving it up or down as needed.
    pub(crate) fn update(&mut self, event: EventId, time: DateTime<Utc>, priority: i32) {
        if let Some(&index) = self.positions.get(&event) {
            self.heap[index].time = time;
            self.heap[index].priority = priority;
            self.sift_up(index);
            self.sift_down(index);
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].key() < self.heap[parent].key() {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < self.heap.len() && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < self.heap.len() && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].event, a);
        self.positions.insert(self.heap[b].event, b);
    }

    /// Invariant check for tests: every non-root node respects the
    /// heap property against its parent, and the back-index agrees
    /// with the heap layout.
    pub(crate) fn is_valid_queue(&self) -> bool {
        for index in 1..self.heap.len() {
            let parent = (index - 1) / 2;
            if self.heap[index].key() < self.heap[parent].key() {
                return false;
            }
        }
        self.heap
            .iter()
            .enumerate()
            .all(|(i, n)| self.positions.get(&n.event) == Some(&i))
    }
}
