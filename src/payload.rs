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

//! The dynamic value carried by events.
//!
//! Every event holds a [`Payload`]: the value it fired with on success,
//! or the fault cause on failure. The kernel treats it as opaque; the
//! variants only matter to model code.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};

use crate::event::EventId;
use crate::ProcessId;

/// Opaque value attached to an event, also used as a fault cause.
#[derive(Clone)]
pub enum Payload {
    /// No value. Putting this into a store is rejected.
    None,
    /// A plain number.
    Number(f64),
    /// A text value.
    Text(String),
    /// A time span.
    Span(Duration),
    /// Interrupt cause injected when a preemptive resource evicts a user.
    Preempted {
        /// Process owning the request that caused the eviction, if any.
        by: Option<ProcessId>,
        /// Instant at which the evicted user had claimed the resource.
        claimed_at: DateTime<Utc>,
    },
    /// Ordered sub-event → value mapping produced by a fired condition.
    Map(Vec<(EventId, Payload)>),
    /// Arbitrary user data, shared by reference identity.
    Shared(Rc<dyn Any>),
}

impl Payload {
    /// Wrap a user value.
    pub fn shared<T: Any>(value: T) -> Payload {
        Payload::Shared(Rc::new(value))
    }

    /// The number carried by this payload, if it is one.
    pub fn number(&self) -> Option<f64> {
        match self {
            Payload::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text carried by this payload, if it is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The time span carried by this payload, if it is one.
    pub fn span(&self) -> Option<Duration> {
        match self {
            Payload::Span(s) => Some(*s),
            _ => None,
        }
    }

    /// The condition mapping carried by this payload, if it is one.
    pub fn map(&self) -> Option<&[(EventId, Payload)]> {
        match self {
            Payload::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Downcast a shared user value.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Payload::Shared(rc) => Rc::clone(rc).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Whether this is the empty payload.
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::None
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Payload) -> bool {
        use Payload::*;
        match (self, other) {
            (None, None) => true,
            (Number(a), Number(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Span(a), Span(b)) => a == b,
            (
                Preempted {
                    by: a,
                    claimed_at: at,
                },
                Preempted {
                    by: b,
                    claimed_at: bt,
                },
            ) => a == b && at == bt,
            (Map(a), Map(b)) => a == b,
            // shared values compare by identity
            (Shared(a), Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Number(n) => write!(f, "Number({})", n),
            Payload::Text(t) => write!(f, "Text({:?})", t),
            Payload::Span(s) => write!(f, "Span({})", s),
            Payload::Preempted { by, claimed_at } => f
                .debug_struct("Preempted")
                .field("by", by)
                .field("claimed_at", claimed_at)
                .finish(),
            Payload::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Payload::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

impl From<f64> for Payload {
    fn from(n: f64) -> Payload {
        Payload::Number(n)
    }
}

impl From<&str> for Payload {
    fn from(t: &str) -> Payload {
        Payload::Text(t.to_owned())
    }
}

impl From<String> for Payload {
    fn from(t: String) -> Payload {
        Payload::Text(t)
    }
}

impl From<Duration> for Payload {
    fn from(s: Duration) -> Payload {
        Payload::Span(s)
    }
}

#[cfg(test)]
mod tests {
    use super::Payload;
    use std::rc::Rc;

    #[test]
    fn shared_values_compare_by_identity() {
        let a = Payload::shared(42u32);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(Payload::shared(42u32), Payload::shared(42u32));
    }

    #[test]
    fn downcast_shared() {
        let p = Payload::Shared(Rc::new("job".to_string()));
        assert_eq!(*p.downcast::<String>().unwrap(), "job");
        assert!(p.downcast::<u32>().is_none());
    }

    #[test]
    fn accessors() {
        assert_eq!(Payload::Number(1.5).number(), Some(1.5));
        assert_eq!(Payload::from("x").text(), Some("x"));
        assert!(Payload::None.is_none());
    }
}
