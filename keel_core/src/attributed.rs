//! Reflection-backed attributed objects.
//!
//! An attributed object exposes its prescribed, registry-declared fields as
//! a uniform name to [`Datum`] map. Attributes backed by a data member are
//! external-mode Datums aliasing that member inside the owning object;
//! memberless prescribed attributes are empty internal Datums with their
//! element type preset. Auxiliary attributes can be added and removed at
//! runtime.
//!
//! Rust has no move constructor to fix the member aliases up on
//! relocation, so binding is lazy: [`AttributedData`] remembers the owner
//! address it last bound to and re-walks the registry whenever an access
//! observes a different one. The rebind mutates behind interior
//! mutability, which is sound because a changed owner address proves the
//! object was moved, and a move proves no borrows of the old location
//! exist. `AttributedData` is neither `Send` nor `Sync`; attributed
//! objects are single-threaded per instance.

use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::hashmap::{self, HashMap};
use crate::registry;
use crate::rtti::{Rtti, TypeKey};
use crate::strings;
use crate::variant::DatumValue;
use smallvec::SmallVec;
use std::cell::{Cell, UnsafeCell};
use std::fmt::{self, Debug};
use std::ptr;

/// Field shape accepted by the `attributed!` macro: a bare element type or
/// a fixed-size array of one.
pub trait AttributeSlot {
    type Elem: DatumValue;
    const COUNT: usize;
}

impl<T: DatumValue> AttributeSlot for T {
    type Elem = T;
    const COUNT: usize = 1;
}

impl<T: DatumValue, const N: usize> AttributeSlot for [T; N] {
    type Elem = T;
    const COUNT: usize = N;
}

/// The attribute map and binding state embedded in every attributed object.
pub struct AttributedData {
    map: UnsafeCell<HashMap<String, Datum>>,
    /// Owner address the prescribed attributes are currently bound to.
    bound: Cell<*const u8>,
    key: TypeKey,
}

impl AttributedData {
    /// Materializes the prescribed attribute set of `key` by walking the
    /// registry from the most-derived entry up the base chain. A recurring
    /// name keeps the most-derived definition.
    pub fn new(key: TypeKey) -> Self {
        let mut map = HashMap::new();
        registry::with(|registry| {
            registry.walk_prescribed(key, |_, descriptor| {
                let datum = if descriptor.count > 0 {
                    Datum::external_placeholder(descriptor.datum_type, descriptor.count)
                } else {
                    let mut datum = Datum::new();
                    datum.set_type_dyn(descriptor.datum_type).unwrap();
                    datum
                };
                map.insert(descriptor.name.to_string(), datum);
            });
        });
        AttributedData {
            map: UnsafeCell::new(map),
            bound: Cell::new(ptr::null()),
            key,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Re-aliases every prescribed member-backed Datum onto `owner`. No-op
    /// when already bound there.
    pub(crate) fn bind(&self, owner: *const u8) {
        if self.bound.get() == owner {
            return;
        }
        // The owner moved (or was just constructed/cloned), so no borrow of
        // the previous location can be alive; rewriting the view pointers
        // behind the cell is not observable by any outstanding reference.
        let map = unsafe { &mut *self.map.get() };
        let mut seen: SmallVec<[&'static str; 16]> = SmallVec::new();
        registry::with(|registry| {
            registry.walk_prescribed(self.key, |base_offset, descriptor| {
                if descriptor.count == 0 || seen.contains(&descriptor.name) {
                    return;
                }
                seen.push(descriptor.name);
                if let Some(datum) = map.get_mut(descriptor.name) {
                    if datum.is_external() {
                        let member = base_offset + descriptor.offset;
                        unsafe { datum.rebind_external_raw(owner.add(member) as *mut u8) };
                    }
                }
            });
        });
        self.bound.set(owner);
    }

    pub(crate) fn map(&self) -> &HashMap<String, Datum> {
        unsafe { &*self.map.get() }
    }

    pub(crate) fn map_mut(&mut self) -> &mut HashMap<String, Datum> {
        self.map.get_mut()
    }
}

impl Clone for AttributedData {
    fn clone(&self) -> Self {
        // External datums still alias the source; the null binding forces a
        // rebind onto the clone's own members at first access.
        AttributedData {
            map: UnsafeCell::new(self.map().clone()),
            bound: Cell::new(ptr::null()),
            key: self.key,
        }
    }
}

impl Debug for AttributedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // names only: element pointers may be unbound here
        f.debug_set().entries(self.map().keys()).finish()
    }
}

/// The attributed-object mixin. Implemented by the `attributed!` macro;
/// the provided methods are the public surface.
pub trait Attributed: Rtti {
    #[doc(hidden)]
    fn attributed_data(&self) -> &AttributedData;
    #[doc(hidden)]
    fn attributed_data_mut(&mut self) -> &mut AttributedData;

    #[doc(hidden)]
    fn bound_data(&self) -> &AttributedData
    where
        Self: Sized,
    {
        let data = self.attributed_data();
        data.bind((self as *const Self).cast::<u8>());
        data
    }

    fn num_attributes(&self) -> usize
    where
        Self: Sized,
    {
        self.bound_data().map().len()
    }

    fn has_attributes(&self) -> bool
    where
        Self: Sized,
    {
        self.num_attributes() > 0
    }

    fn has_attribute(&self, name: &str) -> bool
    where
        Self: Sized,
    {
        self.bound_data().map().contains_key(name)
    }

    fn attribute(&self, name: &str) -> Result<&Datum>
    where
        Self: Sized,
    {
        self.bound_data().map().at(name)
    }

    fn find(&self, name: &str) -> Option<&Datum>
    where
        Self: Sized,
    {
        self.bound_data().map().get(name)
    }

    fn attribute_mut(&mut self, name: &str) -> Result<&mut Datum>
    where
        Self: Sized,
    {
        let owner = (self as *const Self).cast::<u8>();
        let data = self.attributed_data_mut();
        data.bind(owner);
        data.map_mut().at_mut(name)
    }

    /// The mutable-indexing contract: missing names get a fresh internal
    /// Datum appended.
    fn attribute_or_default(&mut self, name: &str) -> Result<&mut Datum>
    where
        Self: Sized,
    {
        if strings::is_empty_or_whitespace(name) {
            return Err(Error::InvalidName(name.to_string()));
        }
        let owner = (self as *const Self).cast::<u8>();
        let data = self.attributed_data_mut();
        data.bind(owner);
        Ok(data.map_mut().get_or_insert_default(name.to_string()))
    }

    /// Adds an auxiliary internal attribute. Existing attributes are not
    /// overwritten.
    fn add_attribute(&mut self, name: impl Into<String>, datum: Datum) -> Result<&mut Datum>
    where
        Self: Sized,
    {
        let name = name.into();
        if strings::is_empty_or_whitespace(&name) {
            return Err(Error::InvalidName(name));
        }
        let owner = (self as *const Self).cast::<u8>();
        let data = self.attributed_data_mut();
        data.bind(owner);
        Ok(data.map_mut().insert(name, datum).0)
    }

    /// Removes an attribute by name. Removing a prescribed attribute is not
    /// meaningful and leaves later behavior unspecified.
    fn remove_attribute(&mut self, name: &str) -> bool
    where
        Self: Sized,
    {
        let owner = (self as *const Self).cast::<u8>();
        let data = self.attributed_data_mut();
        data.bind(owner);
        data.map_mut().remove(name).is_some()
    }

    fn attributes(&self) -> hashmap::Iter<'_, String, Datum>
    where
        Self: Sized,
    {
        self.bound_data().map().iter()
    }

    /// Element-wise equality of the attribute maps.
    fn attributes_eq(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.bound_data().map() == other.bound_data().map()
    }
}

/// Declares a reflected type: the struct itself, its registry entry and
/// factory, and the `Rtti`/`Attributed`/`Clone`/`Default`/`PartialEq`/
/// `Index` machinery.
///
/// Every listed field becomes a prescribed attribute aliased onto the
/// member (`[T; N]` fields alias `N` elements). A `prescribed` block adds
/// memberless attributes with a preset element type. `extends` embeds the
/// base type as a `base` field and chains the registry entries.
///
/// The struct must derive or implement `Debug`. Call `register()` once at
/// startup before constructing instances.
///
/// ```
/// use keel_core::{attributed, Attributed};
///
/// attributed! {
///     #[derive(Debug)]
///     pub struct Health {
///         pub current: i32 = 100,
///         pub maximum: i32 = 100,
///     }
/// }
///
/// Health::register();
/// let mut health = Health::new();
/// health.attribute_mut("current").unwrap().set(0, 55i32).unwrap();
/// assert_eq!(55, health.current);
/// ```
#[macro_export]
macro_rules! attributed {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident extends $base:ty {
            $( $fvis:vis $field:ident : $fty:ty = $default:expr ),* $(,)?
        }
        $( prescribed { $( $pname:literal : $ptype:ident ),* $(,)? } )?
    ) => {
        $crate::attributed! {
            @imp [ $(#[$meta])* ] [$vis] [$name] [ base $base ]
            [ $( ($fvis $field : $fty = $default) )* ]
            [ $( $( ($pname : $ptype) )* )? ]
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $fvis:vis $field:ident : $fty:ty = $default:expr ),* $(,)?
        }
        $( prescribed { $( $pname:literal : $ptype:ident ),* $(,)? } )?
    ) => {
        $crate::attributed! {
            @imp [ $(#[$meta])* ] [$vis] [$name] [ ]
            [ $( ($fvis $field : $fty = $default) )* ]
            [ $( $( ($pname : $ptype) )* )? ]
        }
    };
    (
        @imp [ $(#[$meta:meta])* ] [$vis:vis] [$name:ident] [ $( base $base:ty )? ]
        [ $( ($fvis:vis $field:ident : $fty:ty = $default:expr) )* ]
        [ $( ($pname:literal : $ptype:ident) )* ]
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( pub base: $base, )?
            $( $fvis $field: $fty, )*
            #[doc(hidden)]
            __attributes: $crate::AttributedData,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    $( base: <$base as ::std::default::Default>::default(), )?
                    $( $field: $default, )*
                    __attributes: $crate::AttributedData::new(
                        $crate::TypeKey::of::<$name>(),
                    ),
                }
            }

            /// Installs this type's registry entry and factory (and its
            /// base's, recursively). Call once at startup.
            pub fn register() {
                const ATTRIBUTES: &[$crate::AttributeDescriptor] = &[
                    $(
                        $crate::AttributeDescriptor {
                            name: stringify!($field),
                            ctor_key: <<$fty as $crate::AttributeSlot>::Elem
                                as $crate::DatumValue>::CTOR_KEY,
                            count: <$fty as $crate::AttributeSlot>::COUNT,
                            offset: ::std::mem::offset_of!($name, $field),
                            datum_type: <<$fty as $crate::AttributeSlot>::Elem
                                as $crate::DatumValue>::TYPE,
                        },
                    )*
                    $(
                        $crate::AttributeDescriptor {
                            name: $pname,
                            ctor_key: "",
                            count: 0,
                            offset: 0,
                            datum_type: $crate::DatumType::$ptype,
                        },
                    )*
                ];
                $( <$base>::register(); )?
                $crate::registry::register_type(
                    $crate::TypeKey::of::<$name>(),
                    $crate::RegistryEntry {
                        base: $crate::attributed!(@base_key $name $(, $base)?),
                        base_offset: $crate::attributed!(@base_offset $name $(, $base)?),
                        type_name: stringify!($name),
                        attributes: ATTRIBUTES,
                    },
                );
                $crate::registry::register_factory(stringify!($name), || {
                    $crate::SharedRtti::new(<$name>::new())
                });
            }
        }

        impl $crate::Rtti for $name {
            fn type_key(&self) -> $crate::TypeKey {
                $crate::TypeKey::of::<$name>()
            }
        }

        impl $crate::Attributed for $name {
            fn attributed_data(&self) -> &$crate::AttributedData {
                &self.__attributes
            }

            fn attributed_data_mut(&mut self) -> &mut $crate::AttributedData {
                &mut self.__attributes
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::clone::Clone for $name {
            fn clone(&self) -> Self {
                Self {
                    $( base: <$base as ::std::clone::Clone>::clone(&self.base), )?
                    $( $field: self.$field.clone(), )*
                    __attributes: self.__attributes.clone(),
                }
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                $crate::Attributed::attributes_eq(self, other)
            }
        }

        impl ::std::ops::Index<&str> for $name {
            type Output = $crate::Datum;

            fn index(&self, name: &str) -> &$crate::Datum {
                $crate::Attributed::attribute(self, name)
                    .unwrap_or_else(|e| panic!("{}", e))
            }
        }

        impl ::std::ops::IndexMut<&str> for $name {
            fn index_mut(&mut self, name: &str) -> &mut $crate::Datum {
                $crate::Attributed::attribute_or_default(self, name)
                    .unwrap_or_else(|e| panic!("{}", e))
            }
        }
    };
    (@base_key $name:ident) => {
        $crate::TypeKey::of::<$name>()
    };
    (@base_key $name:ident, $base:ty) => {
        $crate::TypeKey::of::<$base>()
    };
    (@base_offset $name:ident) => {
        0usize
    };
    (@base_offset $name:ident, $base:ty) => {
        ::std::mem::offset_of!($name, base)
    };
}
