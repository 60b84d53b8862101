//! The common node contract shared by all algorithm kinds.

use crate::binding::InputSlots;
use crate::concurrency::Concurrency;
use crate::config::NodeOptions;
use crate::error::{Error, Result};
use phlex_model::{ProductLabel, ProductStore, Products};
use std::any::Any;

/// Erased transform invocation: resolved inputs plus output names in,
/// products out.
pub(crate) type TransformCall =
    Box<dyn Fn(&InputSlots, &[String]) -> Result<Products> + Send + Sync>;

/// Erased observer invocation.
pub(crate) type ObserveCall = Box<dyn Fn(&InputSlots) -> Result<()> + Send + Sync>;

/// Erased output invocation: receives the store being consumed.
pub(crate) type OutputCall = Box<dyn Fn(&ProductStore) -> Result<()> + Send + Sync>;

/// Erased accumulator constructor.
pub(crate) type InitCall = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Erased reducer update invocation.
pub(crate) type UpdateCall =
    Box<dyn Fn(&mut (dyn Any + Send), &InputSlots) -> Result<()> + Send + Sync>;

/// Erased reducer commit invocation: consumes the accumulator, produces
/// the committed products under the given output names.
pub(crate) type CommitCall =
    Box<dyn Fn(Box<dyn Any + Send>, &[String]) -> Result<Products> + Send + Sync>;

/// The kind-specific behavior of a node.
pub(crate) enum NodeBody {
    /// Produces continuation products from inputs.
    Transform(TransformCall),
    /// Consumes products for side effects only.
    Observe(ObserveCall),
    /// Terminal consumer of stores.
    Output(OutputCall),
    /// Folds over descendant stores of a level instance.
    Reduce {
        /// The level name the fold is partitioned by.
        partition: String,
        /// Constructs a fresh accumulator for a new level instance.
        init: InitCall,
        /// Folds one child's products into the accumulator.
        update: UpdateCall,
        /// Finalizes the accumulator into the committed products.
        commit: CommitCall,
    },
}

impl NodeBody {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::Observe(_) => "observe",
            Self::Output(_) => "output",
            Self::Reduce { .. } => "reduce",
        }
    }
}

/// One algorithm node of the framework graph.
///
/// Every node declares a unique algorithm name, a concurrency level, and
/// zero or more predicate products that must evaluate true for the node
/// to fire on a given store. The framework holds no per-node mutable
/// state beyond scheduler bookkeeping.
pub struct AlgorithmNode {
    pub(crate) name: String,
    pub(crate) concurrency: Concurrency,
    pub(crate) predicates: Vec<String>,
    pub(crate) inputs: Vec<ProductLabel>,
    pub(crate) outputs: Vec<ProductLabel>,
    pub(crate) body: NodeBody,
}

impl AlgorithmNode {
    /// The algorithm name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared concurrency level.
    #[must_use]
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// The predicate products gating this node.
    #[must_use]
    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    /// The declared input products.
    #[must_use]
    pub fn inputs(&self) -> &[ProductLabel] {
        &self.inputs
    }

    /// The declared output products.
    #[must_use]
    pub fn outputs(&self) -> &[ProductLabel] {
        &self.outputs
    }

    /// The node kind as a display string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.body.kind_name()
    }

    /// The output names, after any configured rename.
    pub(crate) fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|l| l.name.clone()).collect()
    }

    /// Apply configured per-node options.
    pub(crate) fn apply_options(&mut self, options: NodeOptions, registered: &str) -> Result<()> {
        if let Some(name) = options.name {
            self.name = name;
        }
        if let Some(concurrency) = options.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(predicates) = options.predicates {
            self.predicates.extend(predicates);
        }
        if let Some(rename) = options.produces {
            if self.outputs.len() != 1 {
                return Err(Error::Configuration {
                    key: format!("nodes.{registered}.produces"),
                    cause: format!(
                        "rename requires exactly one output product, node has {}",
                        self.outputs.len()
                    ),
                });
            }
            self.outputs[0].name = rename;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AlgorithmNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmNode")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("concurrency", &self.concurrency)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("predicates", &self.predicates)
            .finish()
    }
}
