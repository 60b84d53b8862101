//! The scheduler's message envelope.

use crate::store::ProductStore;
use std::sync::Arc;

/// An envelope carrying a store plus routing metadata through the graph.
///
/// Messages are totally ordered per node by `number` and identify their
/// origin so the scheduler can deduplicate and key joins.
#[derive(Debug, Clone)]
pub struct Message {
    /// The store being routed.
    pub store: Arc<ProductStore>,
    /// The name of the node or source that emitted the store.
    pub originator: String,
    /// Sequence number in emission order.
    pub number: u64,
}

impl Message {
    /// Create a message.
    pub fn new(store: Arc<ProductStore>, originator: impl Into<String>, number: u64) -> Self {
        Self {
            store,
            originator: originator.into(),
            number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_identity() {
        let store = Arc::new(ProductStore::base());
        let msg = Message::new(Arc::clone(&store), "source", 7);
        assert_eq!(msg.number, 7);
        assert_eq!(msg.originator, "source");
        assert!(Arc::ptr_eq(&msg.store, &store));
    }
}
