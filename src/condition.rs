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

//! Composite events over sets of sub-events.
//!
//! `all_of` fires once every sub-event has fired OK; `any_of` fires
//! as soon as one has, or immediately when given no sub-events. A
//! failing sub-event fails the condition with the same cause. On
//! success the condition's value is an ordered sub-event → value
//! mapping, with nested conditions flattened into their leaf events.

use crate::error::SimError;
use crate::event::{Callback, EventId, EventKind};
use crate::payload::Payload;
use crate::simulation::Simulation;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConditionOp {
    All,
    Any,
}

pub(crate) struct ConditionState {
    pub(crate) op: ConditionOp,
    pub(crate) subs: Vec<EventId>,
    /// Sub-events that have fired OK so far.
    pub(crate) fired: usize,
}

impl Simulation {
    /// Condition firing once every sub-event has fired OK. With no
    /// sub-events it fires immediately with an empty mapping.
    pub fn all_of(&mut self, subs: &[EventId]) -> Result<EventId, SimError> {
        self.condition(ConditionOp::All, subs)
    }

    /// Condition firing once at least one sub-event has fired OK, or
    /// immediately when given no sub-events.
    pub fn any_of(&mut self, subs: &[EventId]) -> Result<EventId, SimError> {
        self.condition(ConditionOp::Any, subs)
    }

    fn condition(&mut self, op: ConditionOp, subs: &[EventId]) -> Result<EventId, SimError> {
        for &sub in subs {
            self.ensure_local(sub)?;
        }
        let condition = self.new_event(EventKind::Condition(ConditionState {
            op,
            subs: subs.to_vec(),
            fired: 0,
        }));
        for &sub in subs {
            if self.slot(sub).processed {
                self.check_condition(condition, sub)?;
            } else {
                self.slot_mut(sub).callbacks.push(Callback::Check(condition));
            }
        }
        // empty sub-event lists evaluate to true right away
        if !self.slot(condition).triggered && self.evaluate(condition) {
            let entries = self.condition_value(condition);
            self.schedule_trigger(condition, true, Payload::Map(entries));
        }
        Ok(condition)
    }

    /// Re-evaluate a condition because `sub` has been processed.
    pub(crate) fn check_condition(
        &mut self,
        condition: EventId,
        sub: EventId,
    ) -> Result<(), SimError> {
        let sub_ok = self.slot(sub).ok;
        if self.slot(condition).triggered {
            if !sub_ok {
                // nobody can handle this failure anymore
                return Err(SimError::LateConditionFault);
            }
            return Ok(());
        }
        if !sub_ok {
            let cause = self.slot(sub).value.clone();
            self.schedule_trigger(condition, false, cause);
            return Ok(());
        }
        if let EventKind::Condition(state) = &mut self.slot_mut(condition).kind {
            state.fired += 1;
        }
        if self.evaluate(condition) {
            let entries = self.condition_value(condition);
            self.schedule_trigger(condition, true, Payload::Map(entries));
        }
        Ok(())
    }

    fn evaluate(&self, condition: EventId) -> bool {
        match &self.slot(condition).kind {
            EventKind::Condition(state) => match state.op {
                ConditionOp::All => state.fired >= state.subs.len(),
                ConditionOp::Any => state.subs.is_empty() || state.fired >= 1,
            },
            _ => false,
        }
    }

    fn condition_value(&self, condition: EventId) -> Vec<(EventId, Payload)> {
        let mut entries = Vec::new();
        self.collect_fired(condition, &mut entries);
        entries
    }

    fn collect_fired(&self, condition: EventId, entries: &mut Vec<(EventId, Payload)>) {
        if let EventKind::Condition(state) = &self.slot(condition).kind {
            for &sub in &state.subs {
                let slot = self.slot(sub);
                if slot.processed && slot.ok {
                    if matches!(slot.kind, EventKind::Condition(_)) {
                        self.collect_fired(sub, entries);
                    } else {
                        entries.push((sub, slot.value.clone()));
                    }
                }
            }
        }
    }
}
