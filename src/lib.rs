//! keel — a game engine runtime core.
//!
//! Foundation subsystems for building gameplay code on: typed dynamic
//! containers, the polymorphic [`Datum`] value container, a
//! reflection-driven attributed-object layer, and a cooperative task
//! [`Scheduler`]. The containers and reflection live in `keel-core`; the
//! scheduler and event channels live in `keel-tasks`.

pub use keel_core::attributed;
pub use keel_core::{
    array, datum, error, hashmap, math, queue, registry, reserve, rtti, slist, stack, strings,
    variant,
};
pub use keel_core::{
    Array, AttributeDescriptor, AttributeSlot, Attributed, AttributedData, Datum, DatumType,
    DatumValue, DefaultReserve, Error, Factory, HashMap, PrimeReserve, Queue, Registry,
    RegistryEntry, ReserveStrategy, Result, Rtti, SList, SharedRtti, Stack, TypeKey, ValueMut,
    ValueRef, VariantArray,
};
pub use keel_tasks::{clock, events, scheduler};
pub use keel_tasks::{
    AggregateError, Clock, EventChannel, EventSender, ManualClock, MonotonicClock, Scheduler,
    SchedulerHandle, Step, TaskError, TaskKey, TaskResult,
};

pub mod prelude {
    pub use keel_core::attributed;
    pub use keel_core::{
        Array, Attributed, Datum, DatumType, DatumValue, Error, HashMap, Queue, Result, Rtti,
        SList, SharedRtti, Stack, TypeKey, VariantArray,
    };
    pub use keel_tasks::{EventChannel, Scheduler, SchedulerHandle, Step};
}
