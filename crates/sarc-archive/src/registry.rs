//! # Type Registry
//!
//! The allow-list consulted by the decoder. Each entry maps an archived
//! type name to a factory producing a default instance of the Rust type
//! that handles it. A name missing from the registry is never instantiated.
//!
//! A registry is immutable once built. Decoding borrows it, so one registry
//! can back any number of concurrent decodes. [`standard_registry`] is the
//! shared process-wide instance holding the built-in Foundation types.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::object::Archivable;
use crate::types::{NsArray, NsDate, NsDictionary, NsMutableData, NsMutableString, NsSet, NsUrl};

/// Produces a default-constructed instance ready to be populated.
pub type Factory = Arc<dyn Fn() -> Box<dyn Archivable> + Send + Sync>;

/// Allow-list of archived type names.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl TypeRegistry {
    /// A registry that admits nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Registry holding the built-in collection and value types.
    pub fn standard() -> Self {
        Self::builder()
            .register::<NsArray>("NSArray")
            .register_factory("NSMutableArray", || Box::new(NsArray::mutable()))
            .register::<NsDictionary>("NSDictionary")
            .register_factory("NSMutableDictionary", || Box::new(NsDictionary::mutable()))
            .register::<NsSet>("NSSet")
            .register_factory("NSMutableSet", || Box::new(NsSet::mutable()))
            .register::<NsDate>("NSDate")
            .register::<NsUrl>("NSURL")
            .register::<NsMutableString>("NSMutableString")
            .register::<NsMutableData>("NSMutableData")
            .build()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&Factory> {
        self.factories.get(name)
    }

    /// Fresh default instance for `name`, or `None` if it is not allowed.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Archivable>> {
        self.lookup(name).map(|factory| factory())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Copy of this registry keeping only the listed names. Names that are
    /// not registered here are ignored.
    pub fn restricted_to<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let factories = names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.factories
                    .get(name)
                    .map(|factory| (name.to_string(), Arc::clone(factory)))
            })
            .collect();
        Self { factories }
    }

    /// Builder seeded with this registry's entries.
    pub fn to_builder(&self) -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            factories: self.factories.clone(),
        }
    }
}

/// Accumulates registrations. Registering a name twice keeps the later
/// factory.
#[derive(Default)]
pub struct TypeRegistryBuilder {
    factories: HashMap<String, Factory>,
}

impl TypeRegistryBuilder {
    /// Register `T`, instantiated through its `Default` impl.
    pub fn register<T>(self, name: impl Into<String>) -> Self
    where
        T: Archivable + Default,
    {
        self.register_factory(name, || Box::new(T::default()))
    }

    pub fn register_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Archivable> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::trace!(type_name = %name, "registering archivable type");
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.factories.remove(name);
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            factories: self.factories,
        }
    }
}

/// Shared registry of the built-in types, built on first use.
pub fn standard_registry() -> &'static TypeRegistry {
    static STANDARD: OnceLock<TypeRegistry> = OnceLock::new();
    STANDARD.get_or_init(TypeRegistry::standard)
}
