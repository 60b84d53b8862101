//! Level-closure detection.
//!
//! The scheduler tracks the path of currently open level instances as a
//! stack. Each store emitted by the source is compared against that path:
//! every open instance deeper than the common prefix has closed and is
//! handed off for flushing, deepest first. At end-of-stream the entire
//! path closes, root last. Sources must therefore emit stores in
//! hierarchical order — a parent before its children, each subtree
//! contiguous.

use phlex_model::{LevelId, ProductStore};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The processing wave of one level instance.
pub(crate) enum WaveState {
    /// The wave task is still running.
    Running(JoinHandle<Arc<ProductStore>>),
    /// The wave completed with this refined store.
    Done(Arc<ProductStore>),
}

/// Bookkeeping for one open level instance.
pub(crate) struct OpenInstance {
    /// The instance's level ID.
    pub(crate) id: Arc<LevelId>,
    /// The store the wave was seeded with.
    pub(crate) seed: Arc<ProductStore>,
    /// The instance's own processing wave.
    pub(crate) wave: WaveState,
    /// Closure tasks of already-closed child instances.
    pub(crate) closures: Vec<JoinHandle<()>>,
    /// IDs of closed children, to reject re-emission after closure.
    /// Held only while this instance is open.
    pub(crate) closed_children: std::collections::HashSet<LevelId>,
}

impl OpenInstance {
    /// Wait for the instance's wave and return its refined store.
    pub(crate) async fn refined(&mut self) -> Arc<ProductStore> {
        match &mut self.wave {
            WaveState::Done(store) => Arc::clone(store),
            WaveState::Running(handle) => {
                let store = match handle.await {
                    Ok(store) => store,
                    Err(join_error) => {
                        // Wave tasks catch user panics themselves; reaching
                        // this arm means the engine task itself died.
                        tracing::error!(
                            level = %self.id,
                            error = %join_error,
                            "wave task failed; falling back to its seed store"
                        );
                        Arc::clone(&self.seed)
                    }
                };
                self.wave = WaveState::Done(Arc::clone(&store));
                store
            }
        }
    }
}

/// The stack of open level instances, root first.
///
/// Invariant: entry `i` holds an ID of `i + 1` segments, and each entry's
/// ID is an ancestor of the next — together they spell the full path of
/// the most recently emitted store.
pub(crate) struct LevelTracker {
    stack: Vec<OpenInstance>,
}

impl LevelTracker {
    pub(crate) fn new(root: OpenInstance) -> Self {
        Self { stack: vec![root] }
    }

    /// The number of open instances.
    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut OpenInstance> {
        self.stack.last_mut()
    }

    /// Pop the deepest open instance.
    pub(crate) fn pop(&mut self) -> Option<OpenInstance> {
        self.stack.pop()
    }

    /// Open a new instance under the current top.
    pub(crate) fn push(&mut self, instance: OpenInstance) {
        self.stack.push(instance);
    }

    /// The number of leading path segments `id` shares with the open path.
    ///
    /// Open instances deeper than this count have closed.
    pub(crate) fn common_segments(&self, id: &LevelId) -> usize {
        match self.stack.last() {
            Some(top) => id.common_prefix_len(&top.id),
            None => 0,
        }
    }
}

/// Rebase a source-emitted store onto the refined store of its parent
/// instance, so child waves see ancestor products added by processing.
pub(crate) fn reparent(
    store: &Arc<ProductStore>,
    refined_parent: &Arc<ProductStore>,
) -> Arc<ProductStore> {
    match store.parent_store() {
        Some(parent) if Arc::ptr_eq(parent, refined_parent) => Arc::clone(store),
        _ => refined_parent.make_child(
            store.id().number(),
            store.id().level_name(),
            store.source().to_string(),
            store.products().clone(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phlex_model::Products;

    fn instance(id: Arc<LevelId>, seed: Arc<ProductStore>) -> OpenInstance {
        OpenInstance {
            id,
            wave: WaveState::Done(Arc::clone(&seed)),
            seed,
            closures: Vec::new(),
            closed_children: Default::default(),
        }
    }

    #[test]
    fn common_segments_against_open_path() {
        let root = Arc::new(ProductStore::base());
        let run = root.make_child(1, "run", "test", Products::new());
        let event = run.make_child(1, "event", "test", Products::new());

        let mut tracker = LevelTracker::new(instance(root.id().clone(), Arc::clone(&root)));
        tracker.push(instance(run.id().clone(), Arc::clone(&run)));
        tracker.push(instance(event.id().clone(), Arc::clone(&event)));

        // A sibling event closes only the event level.
        let sibling = run.make_child(2, "event", "test", Products::new());
        assert_eq!(tracker.common_segments(sibling.id()), 2);

        // A new run closes the event and the old run.
        let next_run = root.make_child(2, "run", "test", Products::new());
        assert_eq!(tracker.common_segments(next_run.id()), 1);
    }

    #[test]
    fn reparent_rebuilds_only_when_needed() {
        let root = Arc::new(ProductStore::base());
        let child = root.make_child(1, "event", "test", Products::new());

        // Same parent pointer: no rebuild.
        let same = reparent(&child, &root);
        assert!(Arc::ptr_eq(&same, &child));

        // Refined parent: rebuilt with identical identity.
        let mut refined_products = Products::new();
        refined_products.add("calib", 7_i32);
        let refined = root.make_continuation("refiner", refined_products);
        let rebased = reparent(&child, &refined);
        assert!(!Arc::ptr_eq(&rebased, &child));
        assert_eq!(rebased.id(), child.id());
        assert_eq!(*rebased.get::<i32>("calib").unwrap(), 7);
    }
}
