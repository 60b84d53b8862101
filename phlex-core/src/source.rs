//! Source registration: the store sequence driving the graph.
//!
//! A source produces a lazy, finite sequence of stores. Stores must be
//! emitted in hierarchical order: a parent before any of its children,
//! and each subtree contiguous, so the scheduler can detect level closure
//! by comparing consecutive IDs. In addition to the store sequence, a
//! source may attach per-product *providers* — closures evaluated against
//! the level ID of each emitted store at a matching layer.

use crate::graph::FrameworkGraph;
use phlex_model::{LevelId, ProductLabel, ProductStore, ProductValue};
use std::sync::Arc;

/// The erased store sequence.
pub(crate) type StoreIter = Box<dyn Iterator<Item = Arc<ProductStore>> + Send>;

/// The erased sequence constructor, invoked with the refined root store.
pub(crate) type SourceInit = Box<dyn FnOnce(Arc<ProductStore>) -> StoreIter + Send>;

/// A per-product provider evaluated for each emitted store at its layer.
pub(crate) struct Provider {
    pub(crate) label: ProductLabel,
    pub(crate) make: Box<dyn Fn(&LevelId) -> ProductValue + Send + Sync>,
}

/// A registered source.
pub(crate) struct SourceRegistration {
    pub(crate) name: String,
    pub(crate) products: Vec<ProductLabel>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) init: Option<SourceInit>,
}

/// Builder for a source registration.
///
/// # Example
///
/// ```ignore
/// graph
///     .source("events")
///     .products(["a"])
///     .emit(|job| (1..=10).map(move |n| {
///         let mut products = Products::new();
///         products.add("a", n as i32);
///         job.make_child(n, "event", "events", products)
///     }));
/// ```
pub struct SourceBuilder<'g> {
    graph: &'g mut FrameworkGraph,
    name: String,
    products: Vec<ProductLabel>,
    providers: Vec<Provider>,
}

impl<'g> SourceBuilder<'g> {
    pub(crate) fn new(graph: &'g mut FrameworkGraph, name: String) -> Self {
        Self {
            graph,
            name,
            products: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Declare the products carried by the emitted stores themselves.
    #[must_use]
    pub fn products<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        self.products.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Attach a provider computing a product from each emitted level ID.
    ///
    /// The provider fires for stores whose level name matches the label's
    /// layer; an unqualified label defaults to the root layer (`"job"`).
    #[must_use]
    pub fn provide<T, F>(mut self, label: impl Into<ProductLabel>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&LevelId) -> T + Send + Sync + 'static,
    {
        let mut label = label.into();
        if label.layer.is_none() {
            label.layer = Some(LevelId::ROOT_NAME.to_string());
        }
        self.providers.push(Provider {
            label,
            make: Box::new(move |id| ProductValue::new(f(id))),
        });
        self
    }

    /// Register the store sequence and finish the source registration.
    ///
    /// The closure receives the root store (refined by any root-level
    /// processing) and returns the iterator of stores to drive through
    /// the graph. Stores must come in hierarchical order: a parent
    /// before its children, each subtree contiguous. A provider-only
    /// source uses [`SourceBuilder::finish`] instead.
    pub fn emit<F, I>(self, f: F)
    where
        F: FnOnce(Arc<ProductStore>) -> I + Send + 'static,
        I: Iterator<Item = Arc<ProductStore>> + Send + 'static,
    {
        let registration = SourceRegistration {
            name: self.name,
            products: self.products,
            providers: self.providers,
            init: Some(Box::new(move |root| Box::new(f(root)))),
        };
        self.graph.register_source(registration);
    }

    /// Finish a provider-only source with no store sequence of its own.
    pub fn finish(self) {
        let registration = SourceRegistration {
            name: self.name,
            products: self.products,
            providers: self.providers,
            init: None,
        };
        self.graph.register_source(registration);
    }
}
