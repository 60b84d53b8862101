//! The product-store tree.

use crate::error::ModelError;
use crate::level_id::LevelId;
use crate::products::Products;
use std::ops::Deref;
use std::sync::Arc;

/// The processing stage a store is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// An ordinary data store.
    Process,
    /// A marker signalling closure of a level instance.
    Flush,
}

/// Source label attached to flush stores generated by the framework.
const FLUSH_SOURCE: &str = "[inserted]";

/// One node of the hierarchical state tree.
///
/// A store owns a level ID, a local products map, a source label naming
/// its origin, and a strong link to its parent store (the root has none).
/// Stores are immutable once published to the graph; refinement happens by
/// creating continuations ([`ProductStore::make_continuation`]) rather
/// than by mutation.
///
/// Product reads resolve through *lexical inheritance*: [`ProductStore::get`]
/// walks the parent chain, starting at the store itself, to the first
/// store containing the requested name.
#[derive(Debug)]
pub struct ProductStore {
    parent: Option<Arc<ProductStore>>,
    id: Arc<LevelId>,
    products: Products,
    source: String,
    stage: Stage,
}

impl ProductStore {
    /// Create the root ("job") store with no products.
    ///
    /// The store is mutable until it is wrapped in an `Arc` and handed to
    /// the framework; use [`ProductStore::add_product`] to populate it.
    #[must_use]
    pub fn base() -> Self {
        Self {
            parent: None,
            id: LevelId::root(),
            products: Products::new(),
            source: "driver".to_string(),
            stage: Stage::Process,
        }
    }

    /// Add a product to a not-yet-published store.
    pub fn add_product<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.products.add(name, value);
    }

    /// The level ID of this store.
    #[must_use]
    pub fn id(&self) -> &Arc<LevelId> {
        &self.id
    }

    /// The level name of this store's ID.
    #[must_use]
    pub fn level_name(&self) -> &str {
        self.id.level_name()
    }

    /// The origin label of this store.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The processing stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Check whether this is a flush marker.
    #[must_use]
    pub fn is_flush(&self) -> bool {
        self.stage == Stage::Flush
    }

    /// The products local to this store.
    #[must_use]
    pub fn products(&self) -> &Products {
        &self.products
    }

    /// The immediate parent store, if any.
    #[must_use]
    pub fn parent_store(&self) -> Option<&Arc<ProductStore>> {
        self.parent.as_ref()
    }

    /// Walk the parent chain to the first ancestor named `level_name`.
    #[must_use]
    pub fn parent(&self, level_name: &str) -> Option<&Arc<ProductStore>> {
        let mut store = self.parent.as_ref();
        while let Some(s) = store {
            if s.level_name() == level_name {
                return Some(s);
            }
            store = s.parent.as_ref();
        }
        None
    }

    /// Check whether this store locally contains the named product.
    #[must_use]
    pub fn contains_product(&self, name: &str) -> bool {
        self.products.contains(name)
    }

    /// Walk the chain (including self) to the first store containing `name`.
    #[must_use]
    pub fn store_for_product(self: &Arc<Self>, name: &str) -> Option<Arc<ProductStore>> {
        if self.contains_product(name) {
            return Some(Arc::clone(self));
        }
        let mut store = self.parent.as_ref();
        while let Some(s) = store {
            if s.contains_product(name) {
                return Some(Arc::clone(s));
            }
            store = s.parent.as_ref();
        }
        None
    }

    /// Read a product through lexical inheritance.
    ///
    /// Returns the value set by the nearest store in the chain (including
    /// self) that defines `name`; fails with *missing-product* if none
    /// does, or *product-type-mismatch* if the stored type differs.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<&T, ModelError> {
        let mut store = Some(self);
        while let Some(s) = store {
            if s.contains_product(name) {
                return s.products.get::<T>(name);
            }
            store = s.parent.as_deref();
        }
        Err(ModelError::MissingProduct {
            name: name.to_string(),
        })
    }

    /// Read a product as a [`Handle`] exposing the value and its origin store.
    pub fn handle<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Handle<T>, ModelError> {
        let store = self
            .store_for_product(name)
            .ok_or_else(|| ModelError::MissingProduct {
                name: name.to_string(),
            })?;
        let value = store.products.get_shared::<T>(name)?;
        Ok(Handle { value, store })
    }

    /// Construct a child store whose ID extends this store's ID by one level.
    #[must_use]
    pub fn make_child(
        self: &Arc<Self>,
        level_number: usize,
        level_name: &str,
        source: impl Into<String>,
        products: Products,
    ) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: Some(Arc::clone(self)),
            id: self.id.make_child(level_number, level_name),
            products,
            source: source.into(),
            stage: Stage::Process,
        })
    }

    /// Construct a sibling store with the same ID and parent but new products.
    #[must_use]
    pub fn make_continuation(
        self: &Arc<Self>,
        source: impl Into<String>,
        products: Products,
    ) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: self.parent.clone(),
            id: Arc::clone(&self.id),
            products,
            source: source.into(),
            stage: Stage::Process,
        })
    }

    /// Construct the flush marker for this store's level instance.
    ///
    /// The flush store has the same ID and parent, empty products, and
    /// stage [`Stage::Flush`].
    #[must_use]
    pub fn make_flush(self: &Arc<Self>) -> Arc<ProductStore> {
        Arc::new(ProductStore {
            parent: self.parent.clone(),
            id: Arc::clone(&self.id),
            products: Products::new(),
            source: FLUSH_SOURCE.to_string(),
            stage: Stage::Flush,
        })
    }
}

/// A shared accessor for one product, exposing the store that carries it.
///
/// `Handle<T>` dereferences to `T` and interoperates with plain-value
/// bindings on the same product.
#[derive(Debug, Clone)]
pub struct Handle<T> {
    value: Arc<T>,
    store: Arc<ProductStore>,
}

impl<T> Handle<T> {
    /// The underlying value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The store the product was resolved from.
    #[must_use]
    pub fn store(&self) -> &Arc<ProductStore> {
        &self.store
    }

    /// The level ID of the store the product was resolved from.
    #[must_use]
    pub fn level_id(&self) -> &Arc<LevelId> {
        self.store.id()
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_with(products: &[(&str, i32)]) -> Arc<ProductStore> {
        let mut store = ProductStore::base();
        for (name, value) in products {
            store.add_product(*name, *value);
        }
        Arc::new(store)
    }

    #[test]
    fn child_depth_increases_by_one() {
        let job = base_with(&[]);
        let run = job.make_child(1, "run", "test", Products::new());
        let event = run.make_child(3, "event", "test", Products::new());

        assert_eq!(job.id().depth(), 0);
        assert_eq!(run.id().depth(), 1);
        assert_eq!(event.id().depth(), 2);
        assert_eq!(event.level_name(), "event");
    }

    #[test]
    fn lexical_inheritance_resolves_to_nearest_ancestor() {
        let job = base_with(&[("number", 3)]);
        let event = job.make_child(1, "event", "test", Products::new());

        assert_eq!(*event.get::<i32>("number").unwrap(), 3);

        // Shadowing: the event-level value wins.
        let mut shadowed = Products::new();
        shadowed.add("number", 7_i32);
        let event2 = job.make_child(2, "event", "test", shadowed);
        assert_eq!(*event2.get::<i32>("number").unwrap(), 7);
    }

    #[test]
    fn store_for_product_walks_chain() {
        let job = base_with(&[("x", 1)]);
        let event = job.make_child(1, "event", "test", Products::new());

        let found = event.store_for_product("x").unwrap();
        assert!(Arc::ptr_eq(&found, &job));
        assert!(event.store_for_product("absent").is_none());
    }

    #[test]
    fn parent_by_level_name() {
        let job = base_with(&[]);
        let run = job.make_child(1, "run", "test", Products::new());
        let event = run.make_child(2, "event", "test", Products::new());

        assert!(Arc::ptr_eq(event.parent("job").unwrap(), &job));
        assert!(Arc::ptr_eq(event.parent("run").unwrap(), &run));
        assert!(event.parent("subrun").is_none());
    }

    #[test]
    fn continuation_keeps_id_and_parent() {
        let job = base_with(&[]);
        let event = job.make_child(1, "event", "test", Products::new());

        let mut refined = Products::new();
        refined.add("b", 2_i32);
        let cont = event.make_continuation("refiner", refined);

        assert_eq!(cont.id(), event.id());
        assert!(Arc::ptr_eq(cont.parent_store().unwrap(), &job));
        assert_eq!(*cont.get::<i32>("b").unwrap(), 2);
    }

    #[test]
    fn flush_store_is_empty_marker() {
        let job = base_with(&[("x", 1)]);
        let event = job.make_child(1, "event", "test", Products::new());
        let flush = event.make_flush();

        assert!(flush.is_flush());
        assert!(flush.products().is_empty());
        assert_eq!(flush.id(), event.id());
        assert_eq!(flush.source(), "[inserted]");
    }

    #[test]
    fn handle_exposes_value_and_origin() {
        let job = base_with(&[("number", 3)]);
        let event = job.make_child(1, "event", "test", Products::new());

        let handle = event.handle::<i32>("number").unwrap();
        assert_eq!(*handle, 3);
        assert!(Arc::ptr_eq(handle.store(), &job));
        assert_eq!(handle.level_id().level_name(), "job");
    }

    #[test]
    fn read_errors_are_structured() {
        let job = base_with(&[("x", 1)]);

        assert!(matches!(
            job.get::<i32>("absent"),
            Err(ModelError::MissingProduct { .. })
        ));
        assert!(matches!(
            job.get::<f64>("x"),
            Err(ModelError::ProductTypeMismatch { .. })
        ));
    }
}
