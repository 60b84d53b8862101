//! Convenience re-exports for registering and running graphs.

pub use crate::binding::{FromSlot, InputSlots, IntoProducts};
pub use crate::concurrency::Concurrency;
pub use crate::config::Configuration;
pub use crate::error::{Error, Result};
pub use crate::graph::{FrameworkGraph, WiredGraph};
pub use phlex_model::{Handle, LevelId, Message, ProductLabel, ProductStore, Products, Stage};
