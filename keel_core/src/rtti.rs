//! Polymorphic object root for the reflection layer.
//!
//! Reflected engine objects hang off `dyn Rtti`; the Datum's shared-ref
//! alternative stores [`SharedRtti`] handles and the registry's factories
//! produce them.

use downcast_rs::{impl_downcast, Downcast};
use std::any::TypeId;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Identity of a reflectable runtime type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeKey(TypeId);

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        TypeKey(TypeId::of::<T>())
    }
}

/// Base trait of every polymorphic engine object.
pub trait Rtti: Downcast + Debug {
    /// The most-derived type's key.
    fn type_key(&self) -> TypeKey;

    /// Object equality. The default is identity; types with value semantics
    /// override.
    fn rtti_eq(&self, other: &dyn Rtti) -> bool {
        std::ptr::eq(
            (self as *const Self).cast::<u8>(),
            (other as *const dyn Rtti).cast::<u8>(),
        )
    }
}

impl_downcast!(Rtti);

/// Shared handle to a polymorphic object. This is the element type of the
/// Datum's object alternative; clones share the referent.
#[derive(Clone)]
pub struct SharedRtti(Arc<dyn Rtti>);

impl SharedRtti {
    pub fn new<T: Rtti>(value: T) -> Self {
        SharedRtti(Arc::new(value))
    }

    pub fn from_arc(arc: Arc<dyn Rtti>) -> Self {
        SharedRtti(arc)
    }

    pub fn as_dyn(&self) -> &dyn Rtti {
        self.0.as_ref()
    }

    pub fn is<T: Rtti>(&self) -> bool {
        self.0.as_ref().is::<T>()
    }

    pub fn downcast_ref<T: Rtti>(&self) -> Option<&T> {
        self.0.as_ref().downcast_ref::<T>()
    }

    pub fn type_key(&self) -> TypeKey {
        self.0.type_key()
    }

    pub fn ptr_eq(&self, other: &SharedRtti) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0).cast::<u8>(),
            Arc::as_ptr(&other.0).cast::<u8>(),
        )
    }
}

impl PartialEq for SharedRtti {
    fn eq(&self, other: &Self) -> bool {
        self.0.rtti_eq(other.as_dyn())
    }
}

impl Debug for SharedRtti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SharedRtti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl<T: Rtti> From<T> for SharedRtti {
    fn from(value: T) -> Self {
        SharedRtti::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget {
        id: u32,
    }

    impl Rtti for Widget {
        fn type_key(&self) -> TypeKey {
            TypeKey::of::<Widget>()
        }
    }

    #[test]
    fn identity_equality_by_default() {
        let a = SharedRtti::new(Widget { id: 1 });
        let b = a.clone();
        let c = SharedRtti::new(Widget { id: 1 });

        assert_eq!(a, b);
        assert!(a.ptr_eq(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn downcasting() {
        let a = SharedRtti::new(Widget { id: 7 });
        assert!(a.is::<Widget>());
        assert_eq!(7, a.downcast_ref::<Widget>().unwrap().id);
        assert_eq!(TypeKey::of::<Widget>(), a.type_key());
    }
}
