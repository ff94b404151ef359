//! Process-wide table of reflectable types.
//!
//! The registry is written during engine startup (each reflected type's
//! generated `register()` adds its entry) and treated as read-only
//! afterwards; it may be read from any thread. An entry names the type's
//! base and its prescribed attributes; walking the base chain from the
//! most-derived entry yields the full attribute set of an instance.
//! The registry's second service is construction by name through
//! registered factory functions.

use crate::hashmap::HashMap;
use crate::rtti::{SharedRtti, TypeKey};
use crate::variant::DatumType;
use parking_lot::RwLock;
use std::sync::OnceLock;
use tracing::info;

/// One prescribed attribute of a reflected type.
///
/// `count == 0` describes a prescribed attribute with no backing data
/// member (the Datum starts empty and internal); `count > 0` describes an
/// attribute aliased onto `count` consecutive elements at `offset` bytes
/// into the instance.
#[derive(Copy, Clone, Debug)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub ctor_key: &'static str,
    pub count: usize,
    pub offset: usize,
    pub datum_type: DatumType,
}

/// Registry entry for one reflected type. The root of a hierarchy lists
/// itself as `base`.
#[derive(Copy, Clone, Debug)]
pub struct RegistryEntry {
    pub base: TypeKey,
    /// Byte offset of the base subobject within this type.
    pub base_offset: usize,
    pub type_name: &'static str,
    pub attributes: &'static [AttributeDescriptor],
}

/// Produces a default-initialized instance of a reflected type.
pub type Factory = fn() -> SharedRtti;

pub struct Registry {
    entries: HashMap<TypeKey, RegistryEntry>,
    factories: HashMap<&'static str, Factory>,
}

impl Registry {
    fn empty() -> Self {
        Registry {
            entries: HashMap::new(),
            factories: HashMap::new(),
        }
    }

    pub fn entry(&self, key: TypeKey) -> Option<&RegistryEntry> {
        self.entries.get(&key)
    }

    pub fn is_registered(&self, key: TypeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visits every prescribed attribute of `key`, most-derived first, in
    /// declaration order within each level. The offset handed to `visit` is
    /// the cumulative base-subobject offset of the declaring level; add the
    /// descriptor's own offset to locate the member within the instance.
    pub fn walk_prescribed(
        &self,
        key: TypeKey,
        mut visit: impl FnMut(usize, &AttributeDescriptor),
    ) {
        let mut current = key;
        let mut offset = 0usize;
        loop {
            let entry = match self.entries.get(&current) {
                Some(entry) => entry,
                None => break,
            };
            for descriptor in entry.attributes {
                visit(offset, descriptor);
            }
            if entry.base == current {
                break;
            }
            offset += entry.base_offset;
            current = entry.base;
        }
    }
}

fn global() -> &'static RwLock<Registry> {
    static GLOBAL: OnceLock<RwLock<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Registry::empty()))
}

/// Installs (or replaces) the entry for a reflected type. Startup only.
pub fn register_type(key: TypeKey, entry: RegistryEntry) {
    info!(type_name = entry.type_name, "registering reflected type");
    global().write().entries.replace(key, entry);
}

/// Installs a construct-by-name factory. Startup only.
pub fn register_factory(name: &'static str, factory: Factory) {
    global().write().factories.replace(name, factory);
}

/// Runs `f` against the registry under a read lock.
pub fn with<T>(f: impl FnOnce(&Registry) -> T) -> T {
    f(&global().read())
}

/// Constructs a default-initialized instance of the type registered under
/// `name`.
pub fn create(name: &str) -> Option<SharedRtti> {
    let factory = *global().read().factories.get(name)?;
    Some(factory())
}
