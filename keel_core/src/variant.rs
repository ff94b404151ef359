//! Homogeneous sequence over a fixed alternative set, chosen sticky on
//! first use.
//!
//! The alternative set is the engine's value universe: `bool`, `i32`,
//! `f32`, `String` and [`SharedRtti`]. The active alternative is picked by
//! the first typed operation and only changes while the container is empty;
//! typed access against the wrong alternative is an [`Error::InvalidType`].
//! [`Datum`](crate::Datum) layers external-storage semantics on top.

use crate::array::Array;
use crate::error::{Error, Result};
use crate::rtti::SharedRtti;
use crate::strings;
use itertools::Itertools;
use std::fmt::{self, Debug, Display};
use std::iter::FromIterator;
use std::str::FromStr;

/// The one-based alternative tag; `None` marks a container that has never
/// held a value.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatumType {
    None = 0,
    Bool,
    Int,
    Float,
    String,
    Rtti,
}

impl DatumType {
    pub const BEGIN: DatumType = DatumType::Bool;
    pub const END: DatumType = DatumType::Rtti;

    /// The value alternatives, `Begin..=End`.
    pub fn variants() -> impl Iterator<Item = DatumType> {
        [
            DatumType::Bool,
            DatumType::Int,
            DatumType::Float,
            DatumType::String,
            DatumType::Rtti,
        ]
        .iter()
        .copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatumType::None => "None",
            DatumType::Bool => "Bool",
            DatumType::Int => "Int",
            DatumType::Float => "Float",
            DatumType::String => "String",
            DatumType::Rtti => "RTTI",
        }
    }
}

impl Display for DatumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forgiving parse: case-insensitive, whitespace-stripping; anything
/// unrecognized yields [`DatumType::None`].
impl FromStr for DatumType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match strings::fold_for_parse(s).as_str() {
            "bool" => DatumType::Bool,
            "int" => DatumType::Int,
            "float" => DatumType::Float,
            "string" => DatumType::String,
            "rtti" => DatumType::Rtti,
            _ => DatumType::None,
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// An element type storable in a [`VariantArray`]. Sealed: the alternative
/// set is fixed.
pub trait DatumValue: sealed::Sealed + Clone + Debug + Display + PartialEq + 'static {
    const TYPE: DatumType;
    /// Registry constructor key for elements of this type.
    const CTOR_KEY: &'static str;

    /// Numeric view for the arithmetic alternatives; the cross-type
    /// comparisons of the reference wrapper go through this.
    fn as_number(&self) -> Option<f64> {
        None
    }

    #[doc(hidden)]
    fn from_storage(variant: &VariantArray) -> Option<&Array<Self>>;
    #[doc(hidden)]
    fn from_storage_mut(variant: &mut VariantArray) -> Option<&mut Array<Self>>;
    #[doc(hidden)]
    fn fresh_storage() -> Alternatives;
}

#[derive(Clone, Debug)]
#[doc(hidden)]
pub enum Alternatives {
    None,
    Bool(Array<bool>),
    Int(Array<i32>),
    Float(Array<f32>),
    String(Array<String>),
    Rtti(Array<SharedRtti>),
}

macro_rules! datum_value {
    ($ty:ty, $variant:ident, $key:literal $(, $as_number:expr)?) => {
        impl sealed::Sealed for $ty {}

        impl DatumValue for $ty {
            const TYPE: DatumType = DatumType::$variant;
            const CTOR_KEY: &'static str = $key;

            $(
                fn as_number(&self) -> Option<f64> {
                    let convert = $as_number;
                    Some(convert(self))
                }
            )?

            fn from_storage(variant: &VariantArray) -> Option<&Array<Self>> {
                match &variant.storage {
                    Alternatives::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn from_storage_mut(variant: &mut VariantArray) -> Option<&mut Array<Self>> {
                match &mut variant.storage {
                    Alternatives::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn fresh_storage() -> Alternatives {
                Alternatives::$variant(Array::new())
            }
        }
    };
}

datum_value!(bool, Bool, "bool", |v: &bool| if *v { 1.0 } else { 0.0 });
datum_value!(i32, Int, "int", |v: &i32| f64::from(*v));
datum_value!(f32, Float, "float", |v: &f32| f64::from(*v));
datum_value!(String, String, "string");
datum_value!(SharedRtti, Rtti, "rtti");

/// Dispatches a body over the concrete element type named by a runtime
/// [`DatumType`]. `$none` handles `DatumType::None`.
macro_rules! dispatch_datum_type {
    ($datum_type:expr, $T:ident => $body:expr, $none:expr) => {
        match $datum_type {
            $crate::variant::DatumType::None => $none,
            $crate::variant::DatumType::Bool => {
                type $T = bool;
                $body
            }
            $crate::variant::DatumType::Int => {
                type $T = i32;
                $body
            }
            $crate::variant::DatumType::Float => {
                type $T = f32;
                $body
            }
            $crate::variant::DatumType::String => {
                type $T = ::std::string::String;
                $body
            }
            $crate::variant::DatumType::Rtti => {
                type $T = $crate::rtti::SharedRtti;
                $body
            }
        }
    };
}

pub(crate) use dispatch_datum_type;

/// Applies `$body` to the active alternative's backing array.
macro_rules! with_active {
    ($variant:expr, $array:ident => $body:expr, $none:expr) => {
        match &$variant.storage {
            Alternatives::None => $none,
            Alternatives::Bool($array) => $body,
            Alternatives::Int($array) => $body,
            Alternatives::Float($array) => $body,
            Alternatives::String($array) => $body,
            Alternatives::Rtti($array) => $body,
        }
    };
}

macro_rules! with_active_mut {
    ($variant:expr, $array:ident => $body:expr, $none:expr) => {
        match &mut $variant.storage {
            Alternatives::None => $none,
            Alternatives::Bool($array) => $body,
            Alternatives::Int($array) => $body,
            Alternatives::Float($array) => $body,
            Alternatives::String($array) => $body,
            Alternatives::Rtti($array) => $body,
        }
    };
}

/// Holds one of `Array<bool>`, `Array<i32>`, `Array<f32>`, `Array<String>`
/// or `Array<SharedRtti>`, chosen sticky on first use.
#[derive(Clone, Debug)]
pub struct VariantArray {
    storage: Alternatives,
}

impl VariantArray {
    pub fn new() -> Self {
        VariantArray {
            storage: Alternatives::None,
        }
    }

    /// An empty container with the alternative preset and `capacity` reserved.
    pub fn of<T: DatumValue>(capacity: usize) -> Self {
        let mut variant = Self::new();
        variant.reserve_for::<T>(capacity).unwrap();
        variant
    }

    /// `count` copies of `prototype`.
    pub fn filled<T: DatumValue>(count: usize, prototype: &T) -> Self {
        let mut variant = Self::of::<T>(count);
        for _ in 0..count {
            variant.push_back(prototype.clone()).unwrap();
        }
        variant
    }

    pub fn datum_type(&self) -> DatumType {
        match self.storage {
            Alternatives::None => DatumType::None,
            Alternatives::Bool(_) => DatumType::Bool,
            Alternatives::Int(_) => DatumType::Int,
            Alternatives::Float(_) => DatumType::Float,
            Alternatives::String(_) => DatumType::String,
            Alternatives::Rtti(_) => DatumType::Rtti,
        }
    }

    pub fn is_type<T: DatumValue>(&self) -> bool {
        self.datum_type() == T::TYPE
    }

    pub fn len(&self) -> usize {
        with_active!(self, array => array.len(), 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        with_active!(self, array => array.capacity(), 0)
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Selects the active alternative. Errors when the container is
    /// non-empty and already of a different alternative.
    pub fn set_type<T: DatumValue>(&mut self) -> Result<()> {
        if self.is_type::<T>() {
            return Ok(());
        }
        if self.is_empty() {
            self.storage = T::fresh_storage();
            Ok(())
        } else {
            Err(Error::InvalidType {
                requested: T::TYPE,
                actual: self.datum_type(),
            })
        }
    }

    /// [`VariantArray::set_type`] driven by a runtime tag. Setting
    /// `DatumType::None` resets an empty container.
    pub fn set_type_dyn(&mut self, datum_type: DatumType) -> Result<()> {
        dispatch_datum_type!(datum_type, T => self.set_type::<T>(), {
            if self.is_empty() {
                self.storage = Alternatives::None;
                Ok(())
            } else {
                Err(Error::InvalidType {
                    requested: DatumType::None,
                    actual: self.datum_type(),
                })
            }
        })
    }

    /// Drops every element. Alternative and capacity are retained.
    pub fn clear(&mut self) {
        with_active_mut!(self, array => array.clear(), ());
    }

    /// Releases all storage and forgets the alternative.
    pub fn reset(&mut self) {
        self.storage = Alternatives::None;
    }

    /// Presets the alternative to `T` and reserves capacity.
    pub fn reserve_for<T: DatumValue>(&mut self, capacity: usize) -> Result<()> {
        self.set_type::<T>()?;
        T::from_storage_mut(self).unwrap().reserve(capacity);
        Ok(())
    }

    /// Reserves on the active alternative; a no-op when none is set.
    pub fn reserve(&mut self, capacity: usize) {
        with_active_mut!(self, array => array.reserve(capacity), ());
    }

    pub fn shrink_to_fit(&mut self) {
        with_active_mut!(self, array => array.shrink_to_fit(), ());
    }

    pub fn resize<T: DatumValue>(&mut self, size: usize, prototype: &T) -> Result<()> {
        self.writable_array::<T>()?.resize(size, prototype);
        Ok(())
    }

    pub fn push_back<T: DatumValue>(&mut self, value: T) -> Result<()> {
        self.writable_array()?.push_back(value);
        Ok(())
    }

    pub fn push_front<T: DatumValue>(&mut self, value: T) -> Result<()> {
        self.writable_array()?.push_front(value);
        Ok(())
    }

    pub fn insert<T: DatumValue>(&mut self, index: usize, value: T) -> Result<()> {
        self.writable_array()?.insert(index, value)
    }

    /// Drops the last element, whatever the alternative. No-op when empty.
    pub fn pop_back(&mut self) -> bool {
        with_active_mut!(self, array => array.pop_back().is_some(), false)
    }

    /// Drops the first element. No-op when empty.
    pub fn pop_front(&mut self) -> bool {
        with_active_mut!(self, array => array.pop_front().is_some(), false)
    }

    /// Drops the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        let size = self.len();
        with_active_mut!(
            self,
            array => array.remove_at(index).map(|_| ()),
            Err(Error::out_of_range(index, size))
        )
    }

    /// Erases the first element equal to `value`.
    pub fn remove<T: DatumValue>(&mut self, value: &T) -> Result<bool> {
        Ok(self.typed_array_mut::<T>()?.remove(value))
    }

    /// Erases every element equal to `value`.
    pub fn remove_all<T: DatumValue>(&mut self, value: &T) -> Result<usize> {
        Ok(self.typed_array_mut::<T>()?.remove_all(value))
    }

    pub fn get<T: DatumValue>(&self, index: usize) -> Result<&T> {
        self.typed_array()?.at(index)
    }

    pub fn get_mut<T: DatumValue>(&mut self, index: usize) -> Result<&mut T> {
        self.typed_array_mut()?.at_mut(index)
    }

    /// Overwrites the element at `index`.
    pub fn set<T: DatumValue>(&mut self, index: usize, value: T) -> Result<()> {
        *self.typed_array_mut()?.at_mut(index)? = value;
        Ok(())
    }

    pub fn front<T: DatumValue>(&self) -> Result<&T> {
        self.typed_array()?.front()
    }

    pub fn front_mut<T: DatumValue>(&mut self) -> Result<&mut T> {
        self.typed_array_mut()?.front_mut()
    }

    pub fn back<T: DatumValue>(&self) -> Result<&T> {
        self.typed_array()?.back()
    }

    pub fn back_mut<T: DatumValue>(&mut self) -> Result<&mut T> {
        self.typed_array_mut()?.back_mut()
    }

    pub fn as_slice<T: DatumValue>(&self) -> Result<&[T]> {
        Ok(self.typed_array()?.as_slice())
    }

    /// Reference wrapper over the element at `index`.
    pub fn value(&self, index: usize) -> Result<ValueRef<'_>> {
        if index >= self.len() {
            return Err(Error::out_of_range(index, self.len()));
        }
        Ok(ValueRef { owner: self, index })
    }

    /// Mutable reference wrapper over the element at `index`.
    pub fn value_mut(&mut self, index: usize) -> Result<ValueMut<'_>> {
        if index >= self.len() {
            return Err(Error::out_of_range(index, self.len()));
        }
        Ok(ValueMut { owner: self, index })
    }

    pub fn iter(&self) -> Values<'_> {
        Values {
            owner: self,
            index: 0,
            len: self.len(),
        }
    }

    fn typed_array<T: DatumValue>(&self) -> Result<&Array<T>> {
        T::from_storage(self).ok_or(Error::InvalidType {
            requested: T::TYPE,
            actual: self.datum_type(),
        })
    }

    fn typed_array_mut<T: DatumValue>(&mut self) -> Result<&mut Array<T>> {
        let actual = self.datum_type();
        T::from_storage_mut(self).ok_or(Error::InvalidType {
            requested: T::TYPE,
            actual,
        })
    }

    /// The write-path tag rule: accept a matching alternative, silently
    /// adopt one when the container is empty, otherwise type error.
    fn writable_array<T: DatumValue>(&mut self) -> Result<&mut Array<T>> {
        if T::from_storage(self).is_none() {
            if !self.is_empty() {
                return Err(Error::InvalidType {
                    requested: T::TYPE,
                    actual: self.datum_type(),
                });
            }
            self.storage = T::fresh_storage();
        }
        Ok(T::from_storage_mut(self).unwrap())
    }

    pub(crate) fn forget_all_storage(&mut self) {
        with_active_mut!(self, array => array.forget_storage(), ());
    }
}

impl Default for VariantArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for VariantArray {
    fn eq(&self, other: &Self) -> bool {
        match (&self.storage, &other.storage) {
            (Alternatives::None, Alternatives::None) => true,
            (Alternatives::Bool(a), Alternatives::Bool(b)) => a == b,
            (Alternatives::Int(a), Alternatives::Int(b)) => a == b,
            (Alternatives::Float(a), Alternatives::Float(b)) => a == b,
            (Alternatives::String(a), Alternatives::String(b)) => a == b,
            (Alternatives::Rtti(a), Alternatives::Rtti(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for VariantArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().map(|value| value.to_string()).join(", "))
    }
}

impl<T: DatumValue> FromIterator<T> for VariantArray {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut variant = VariantArray::new();
        for value in iter {
            variant.push_back(value).unwrap();
        }
        variant
    }
}

impl<T: DatumValue> From<T> for VariantArray {
    fn from(value: T) -> Self {
        std::iter::once(value).collect()
    }
}

/// Reference wrapper carrying `(owner, index)`. Coerces (checked) to the
/// active alternative and compares across the arithmetic alternatives.
#[derive(Copy, Clone)]
pub struct ValueRef<'a> {
    owner: &'a VariantArray,
    index: usize,
}

impl<'a> ValueRef<'a> {
    pub fn datum_type(&self) -> DatumType {
        self.owner.datum_type()
    }

    pub fn is<T: DatumValue>(&self) -> bool {
        self.owner.is_type::<T>()
    }

    /// Checked coercion to the active alternative.
    pub fn get<T: DatumValue>(&self) -> Result<&'a T> {
        self.owner.get(self.index)
    }

    /// Numeric view when the element is a `bool`, `i32` or `f32`.
    pub fn as_number(&self) -> Option<f64> {
        dispatch_datum_type!(
            self.datum_type(),
            T => self.get::<T>().ok().and_then(DatumValue::as_number),
            None
        )
    }

    fn eq_value<T: DatumValue>(&self, other: &T) -> bool {
        if let Ok(value) = self.get::<T>() {
            return value == other;
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch_datum_type!(
            self.datum_type(),
            T => Debug::fmt(self.get::<T>().unwrap(), f),
            f.write_str("None")
        )
    }
}

/// Output dispatched on the active alternative.
impl Display for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch_datum_type!(
            self.datum_type(),
            T => Display::fmt(self.get::<T>().unwrap(), f),
            f.write_str("None")
        )
    }
}

impl<T: DatumValue> PartialEq<T> for ValueRef<'_> {
    fn eq(&self, other: &T) -> bool {
        self.eq_value(other)
    }
}

impl PartialEq for ValueRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        if self.datum_type() == other.datum_type() {
            return dispatch_datum_type!(
                self.datum_type(),
                T => self.get::<T>().unwrap() == other.get::<T>().unwrap(),
                true
            );
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Ordering exists only between arithmetic values (of the same or
/// convertible alternatives); everything else is incomparable.
impl PartialOrd for ValueRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

/// Mutable reference wrapper; assignment is checked against the active
/// alternative.
pub struct ValueMut<'a> {
    owner: &'a mut VariantArray,
    index: usize,
}

impl<'a> ValueMut<'a> {
    pub fn as_ref(&self) -> ValueRef<'_> {
        ValueRef {
            owner: &*self.owner,
            index: self.index,
        }
    }

    pub fn datum_type(&self) -> DatumType {
        self.owner.datum_type()
    }

    pub fn get<T: DatumValue>(&self) -> Result<&T> {
        self.owner.get(self.index)
    }

    pub fn get_mut<T: DatumValue>(&mut self) -> Result<&mut T> {
        self.owner.get_mut(self.index)
    }

    /// Assigns through the wrapper. Errors when `T` is not the active
    /// alternative.
    pub fn set<T: DatumValue>(&mut self, value: T) -> Result<()> {
        self.owner.set(self.index, value)
    }
}

impl<T: DatumValue> PartialEq<T> for ValueMut<'_> {
    fn eq(&self, other: &T) -> bool {
        self.as_ref().eq_value(other)
    }
}

impl Display for ValueMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.as_ref(), f)
    }
}

pub struct Values<'a> {
    owner: &'a VariantArray,
    index: usize,
    len: usize,
}

impl<'a> Iterator for Values<'a> {
    type Item = ValueRef<'a>;

    fn next(&mut self) -> Option<ValueRef<'a>> {
        if self.index >= self.len {
            return None;
        }
        let value = ValueRef {
            owner: self.owner,
            index: self.index,
        };
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}
