//! Phlex Data Model
//!
//! This crate provides the hierarchical data model shared by the Phlex
//! orchestrator: level identifiers, type-erased products, and the
//! product-store tree that carries state through the framework graph.
//!
//! # Overview
//!
//! Data processed by Phlex is organized in a hierarchy of nesting levels
//! (e.g. job ⊃ run ⊃ event). Each position in that hierarchy is named by a
//! [`LevelId`]; the state attached to one position is a [`ProductStore`]
//! holding named, typed [`Products`]. Stores form a parent-linked tree and
//! resolve product reads through *lexical inheritance*: a store sees its
//! ancestors' products unless it shadows them.
//!
//! # Example
//!
//! ```
//! use phlex_model::{ProductStore, Products};
//! use std::sync::Arc;
//!
//! let mut job = ProductStore::base();
//! job.add_product("number", 3_i32);
//! let job = Arc::new(job);
//!
//! let event = job.make_child(1, "event", "demo", Products::new());
//! // "number" is inherited from the job store.
//! assert_eq!(*event.get::<i32>("number").unwrap(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod label;
pub mod level_id;
pub mod message;
pub mod products;
pub mod store;

pub use error::ModelError;
pub use label::ProductLabel;
pub use level_id::LevelId;
pub use message::Message;
pub use products::{ProductValue, Products};
pub use store::{Handle, ProductStore, Stage};
