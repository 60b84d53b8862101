//! Phlex Core
//!
//! This crate provides the framework graph, algorithm registration, and
//! the hierarchical, layered, parallel scheduler of the Phlex
//! orchestrator.
//!
//! # Overview
//!
//! User algorithms are registered on a [`FrameworkGraph`] as one of five
//! kinds — source, transform, observe, reduce, output — wired together by
//! product name. Finalizing the graph validates the topology (unbound
//! inputs, duplicate outputs, cycles, layer mismatches) and produces a
//! [`WiredGraph`] that [`WiredGraph::execute`] drives to completion:
//! stores emitted by the source flow through the graph as concurrent
//! waves, levels are flushed as they close, and reducers commit exactly
//! once per level instance.
//!
//! # Example
//!
//! ```ignore
//! use phlex_core::prelude::*;
//!
//! let mut graph = FrameworkGraph::new();
//! graph
//!     .source("events")
//!     .products(["a"])
//!     .emit(|job| (1..=10).map(move |n| {
//!         let mut products = Products::new();
//!         products.add("a", n as i32);
//!         job.make_child(n, "event", "events", products)
//!     }));
//! graph
//!     .with("plus_one", |a: i32| a + 1, Concurrency::Unlimited)
//!     .transform(["a"])
//!     .to(["b"]);
//!
//! graph.finalize()?.execute().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod concurrency;
pub mod config;
pub mod dot;
pub mod error;
pub mod graph;
pub mod node;
pub mod prelude;
pub mod registrar;
mod scheduler;
pub mod source;

pub use concurrency::Concurrency;
pub use config::{Configuration, NodeOptions};
pub use error::{Error, Result};
pub use graph::{FrameworkGraph, WiredGraph};
pub use node::AlgorithmNode;
