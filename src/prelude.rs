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

//! The prosim prelude.
//!
//! The prelude is a list of things that you can import into your
//! program with a single `use`. It includes the types which are used
//! in almost every simulation program.
//!
//! To use the prelude in your simulation simply add in your source
//! ```rust
//! use prosim::prelude::*;
//! ```
//!
//! You can find this used in the example programs in the `demos`
//! directory of the prosim repository.

pub use crate::ContainerId;
pub use crate::EndCondition;
pub use crate::EventId;
pub use crate::Payload;
pub use crate::PoolId;
pub use crate::ProcessId;
pub use crate::ProcessStep;
pub use crate::ResourceId;
pub use crate::SimConfig;
pub use crate::SimError;
pub use crate::SimGen;
pub use crate::Simulation;
pub use crate::StoreId;
