//! The engine's polymorphic value container.
//!
//! A `Datum` is a [`VariantArray`] plus an external-storage flag. In
//! external mode the underlying buffer is a non-owning view over memory
//! supplied by the caller: any operation that would reallocate or free it
//! fails with [`Error::ExternalStorage`], and destruction leaves the
//! aliased memory untouched. The reflection layer builds on this to alias
//! Datums directly onto object data members.

use crate::error::{Error, Result};
use crate::variant::{dispatch_datum_type, DatumType, DatumValue, ValueMut, ValueRef, VariantArray};
use std::fmt::{self, Debug, Display};
use std::iter::FromIterator;

pub struct Datum {
    variant: VariantArray,
    external: bool,
}

impl Datum {
    pub fn new() -> Self {
        Datum {
            variant: VariantArray::new(),
            external: false,
        }
    }

    /// An empty internal Datum with the alternative preset and `capacity`
    /// reserved.
    pub fn of<T: DatumValue>(capacity: usize) -> Self {
        Datum {
            variant: VariantArray::of::<T>(capacity),
            external: false,
        }
    }

    /// An external Datum viewing `capacity` elements at `ptr`, of which
    /// `size` are live. The view never grows and is never freed by the
    /// Datum.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `capacity` initialized elements that outlive the
    /// Datum and every Datum cloned from it. If elements are removed
    /// through the Datum, the caller must treat the vacated slots as moved
    /// out.
    pub unsafe fn from_raw_parts<T: DatumValue>(ptr: *mut T, size: usize, capacity: usize) -> Self {
        let mut datum = Datum::new();
        datum.set_storage(ptr, size, capacity);
        datum
    }

    /// Points this Datum at external storage, abandoning its previous
    /// contents (owned storage is freed; a previous external view is
    /// forgotten).
    ///
    /// # Safety
    ///
    /// Same contract as [`Datum::from_raw_parts`].
    pub unsafe fn set_storage<T: DatumValue>(&mut self, ptr: *mut T, size: usize, capacity: usize) {
        debug_assert!(size <= capacity);
        if self.external {
            self.variant.forget_all_storage();
        }
        self.variant.reset();
        self.variant.set_type::<T>().unwrap();
        T::from_storage_mut(&mut self.variant)
            .unwrap()
            .set_data(ptr, size, capacity);
        self.external = true;
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn is_internal(&self) -> bool {
        !self.external
    }

    pub fn datum_type(&self) -> DatumType {
        self.variant.datum_type()
    }

    pub fn is_type<T: DatumValue>(&self) -> bool {
        self.variant.is_type::<T>()
    }

    pub fn len(&self) -> usize {
        self.variant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.variant.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.variant.is_full()
    }

    /// Read-only view of the underlying variant container.
    pub fn as_variant(&self) -> &VariantArray {
        &self.variant
    }

    /// Selects the active alternative (empty containers only).
    pub fn set_type<T: DatumValue>(&mut self) -> Result<()> {
        self.ensure_internal("set_type")?;
        self.variant.set_type::<T>()
    }

    pub fn set_type_dyn(&mut self, datum_type: DatumType) -> Result<()> {
        self.ensure_internal("set_type")?;
        self.variant.set_type_dyn(datum_type)
    }

    pub fn push_back<T: DatumValue>(&mut self, value: T) -> Result<()> {
        self.ensure_room("push_back")?;
        self.variant.push_back(value)
    }

    pub fn push_front<T: DatumValue>(&mut self, value: T) -> Result<()> {
        self.ensure_room("push_front")?;
        self.variant.push_front(value)
    }

    pub fn insert<T: DatumValue>(&mut self, index: usize, value: T) -> Result<()> {
        self.ensure_room("insert")?;
        self.variant.insert(index, value)
    }

    pub fn pop_back(&mut self) -> bool {
        self.variant.pop_back()
    }

    pub fn pop_front(&mut self) -> bool {
        self.variant.pop_front()
    }

    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        self.variant.remove_at(index)
    }

    pub fn remove<T: DatumValue>(&mut self, value: &T) -> Result<bool> {
        self.variant.remove(value)
    }

    pub fn remove_all<T: DatumValue>(&mut self, value: &T) -> Result<usize> {
        self.variant.remove_all(value)
    }

    pub fn get<T: DatumValue>(&self, index: usize) -> Result<&T> {
        self.variant.get(index)
    }

    pub fn get_mut<T: DatumValue>(&mut self, index: usize) -> Result<&mut T> {
        self.variant.get_mut(index)
    }

    pub fn set<T: DatumValue>(&mut self, index: usize, value: T) -> Result<()> {
        self.variant.set(index, value)
    }

    pub fn front<T: DatumValue>(&self) -> Result<&T> {
        self.variant.front()
    }

    pub fn back<T: DatumValue>(&self) -> Result<&T> {
        self.variant.back()
    }

    pub fn as_slice<T: DatumValue>(&self) -> Result<&[T]> {
        self.variant.as_slice()
    }

    pub fn value(&self, index: usize) -> Result<ValueRef<'_>> {
        self.variant.value(index)
    }

    pub fn value_mut(&mut self, index: usize) -> Result<ValueMut<'_>> {
        self.variant.value_mut(index)
    }

    pub fn iter(&self) -> crate::variant::Values<'_> {
        self.variant.iter()
    }

    /// Drops every element, keeping the alternative and capacity.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_internal("clear")?;
        self.variant.clear();
        Ok(())
    }

    /// Releases all storage and forgets the alternative.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_internal("reset")?;
        self.variant.reset();
        Ok(())
    }

    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        self.ensure_internal("reserve")?;
        self.variant.reserve(capacity);
        Ok(())
    }

    pub fn reserve_for<T: DatumValue>(&mut self, capacity: usize) -> Result<()> {
        self.ensure_internal("reserve")?;
        self.variant.reserve_for::<T>(capacity)
    }

    pub fn resize<T: DatumValue>(&mut self, size: usize, prototype: &T) -> Result<()> {
        self.ensure_internal("resize")?;
        self.variant.resize(size, prototype)
    }

    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.ensure_internal("shrink_to_fit")?;
        self.variant.shrink_to_fit();
        Ok(())
    }

    /// An empty external view with the alternative preset; the pointer is
    /// installed later by [`Datum::rebind_external_raw`]. Used by the
    /// reflection layer, which binds prescribed attributes lazily.
    pub(crate) fn external_placeholder(datum_type: DatumType, count: usize) -> Datum {
        let mut datum = Datum::new();
        dispatch_datum_type!(
            datum_type,
            T => unsafe {
                datum.set_storage::<T>(std::ptr::NonNull::dangling().as_ptr(), count, count)
            },
            ()
        );
        datum
    }

    /// Repoints an external view at `ptr`, keeping size and capacity.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `capacity()` initialized elements of the active
    /// alternative that outlive this Datum.
    pub(crate) unsafe fn rebind_external_raw(&mut self, ptr: *mut u8) {
        debug_assert!(self.external);
        let size = self.len();
        let capacity = self.capacity();
        dispatch_datum_type!(
            self.datum_type(),
            T => {
                let array = T::from_storage_mut(&mut self.variant).unwrap();
                array.forget_storage();
                array.set_data(ptr as *mut T, size, capacity);
            },
            ()
        );
    }

    /// A second external view over the same memory.
    fn alias_variant(&self) -> VariantArray {
        debug_assert!(self.external);
        dispatch_datum_type!(
            self.datum_type(),
            T => {
                let source = T::from_storage(&self.variant).unwrap();
                let mut variant = VariantArray::new();
                variant.set_type::<T>().unwrap();
                unsafe {
                    T::from_storage_mut(&mut variant).unwrap().set_data(
                        source.as_ptr() as *mut T,
                        source.len(),
                        source.capacity(),
                    );
                }
                variant
            },
            VariantArray::new()
        )
    }

    fn ensure_internal(&self, operation: &'static str) -> Result<()> {
        if self.external {
            Err(Error::ExternalStorage(operation))
        } else {
            Ok(())
        }
    }

    /// External storage may be written through up to its capacity; only
    /// growth past it is refused.
    fn ensure_room(&self, operation: &'static str) -> Result<()> {
        if self.external && self.is_full() {
            Err(Error::ExternalStorage(operation))
        } else {
            Ok(())
        }
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Datum {
    fn drop(&mut self) {
        if self.external {
            // leave the aliased memory untouched
            self.variant.forget_all_storage();
        }
    }
}

impl Clone for Datum {
    /// Copying an external Datum produces another view of the same memory;
    /// copying an internal Datum deep-copies.
    fn clone(&self) -> Self {
        if self.external {
            Datum {
                variant: self.alias_variant(),
                external: true,
            }
        } else {
            Datum {
                variant: self.variant.clone(),
                external: false,
            }
        }
    }

    /// Assignment matrix: an external source turns the destination into a
    /// view of the same memory; an internal source deep-copies and reverts
    /// the destination to internal.
    fn clone_from(&mut self, source: &Self) {
        if self.external {
            self.variant.forget_all_storage();
        }
        if source.external {
            self.variant.reset();
            self.variant = source.alias_variant();
            self.external = true;
        } else {
            self.variant = source.variant.clone();
            self.external = false;
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant
    }
}

impl Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datum")
            .field("type", &self.datum_type())
            .field("external", &self.external)
            .field("values", &self.variant)
            .finish()
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.variant, f)
    }
}

impl From<VariantArray> for Datum {
    fn from(variant: VariantArray) -> Self {
        Datum {
            variant,
            external: false,
        }
    }
}

impl<T: DatumValue> From<T> for Datum {
    fn from(value: T) -> Self {
        Datum::from(VariantArray::from(value))
    }
}

impl<T: DatumValue> FromIterator<T> for Datum {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Datum::from(iter.into_iter().collect::<VariantArray>())
    }
}
