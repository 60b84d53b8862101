//! Type-erased product collections.

use crate::error::ModelError;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

/// A single type-erased product value.
///
/// The value is stored behind an `Arc` so that stores can be shared
/// immutably across in-flight messages, and carries a type label used to
/// build the mismatch diagnostic when a read asks for the wrong type.
#[derive(Clone)]
pub struct ProductValue {
    value: Arc<dyn Any + Send + Sync>,
    type_label: &'static str,
}

impl ProductValue {
    /// Wrap a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_label: type_name::<T>(),
        }
    }

    /// The label of the stored type.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        self.type_label
    }

    fn downcast_ref<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    fn downcast_shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for ProductValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductValue")
            .field("type", &self.type_label)
            .finish_non_exhaustive()
    }
}

/// A mapping from product name to type-erased value.
///
/// At most one product exists per name; inserting an existing name
/// replaces the previous entry. Insertion order is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct Products {
    entries: HashMap<String, ProductValue>,
}

impl Products {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed product.
    pub fn add<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), ProductValue::new(value));
    }

    /// Insert an already-erased product value.
    pub fn add_value(&mut self, name: impl Into<String>, value: ProductValue) {
        self.entries.insert(name.into(), value);
    }

    /// Check whether a product with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Read a product by name, failing if it is absent or the type differs.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<&T, ModelError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ModelError::MissingProduct {
                name: name.to_string(),
            })?;
        entry
            .downcast_ref::<T>()
            .ok_or_else(|| ModelError::ProductTypeMismatch {
                name: name.to_string(),
                requested: type_name::<T>(),
                stored: entry.type_label,
            })
    }

    /// Read a product as a shared handle to the underlying value.
    pub fn get_shared<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ModelError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ModelError::MissingProduct {
                name: name.to_string(),
            })?;
        entry
            .downcast_shared::<T>()
            .ok_or_else(|| ModelError::ProductTypeMismatch {
                name: name.to_string(),
                requested: type_name::<T>(),
                stored: entry.type_label,
            })
    }

    /// Iterate over product names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over name/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProductValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge another collection into this one; colliding names are replaced.
    pub fn extend(&mut self, other: Products) {
        self.entries.extend(other.entries);
    }

    /// The number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
