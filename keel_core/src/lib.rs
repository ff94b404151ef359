//! Foundation containers and reflection for the keel runtime.
//!
//! The containers ([`Array`], [`SList`], [`HashMap`], [`VariantArray`])
//! are the data-structure bedrock; [`Datum`] is the engine's polymorphic
//! value type with its external-storage mode; the [`registry`] and
//! [`Attributed`] implement the reflection-driven attribute layer that
//! higher-level object systems build on.

pub mod array;
pub mod attributed;
pub mod datum;
pub mod error;
pub mod hashmap;
pub mod math;
pub mod queue;
pub mod registry;
pub mod reserve;
pub mod rtti;
pub mod slist;
pub mod stack;
pub mod strings;
pub mod variant;

pub use crate::array::Array;
pub use crate::attributed::{Attributed, AttributedData, AttributeSlot};
pub use crate::datum::Datum;
pub use crate::error::{Error, Result};
pub use crate::hashmap::HashMap;
pub use crate::queue::Queue;
pub use crate::registry::{AttributeDescriptor, Factory, Registry, RegistryEntry};
pub use crate::reserve::{DefaultReserve, PrimeReserve, ReserveStrategy};
pub use crate::rtti::{Rtti, SharedRtti, TypeKey};
pub use crate::slist::SList;
pub use crate::stack::Stack;
pub use crate::variant::{DatumType, DatumValue, ValueMut, ValueRef, VariantArray};
