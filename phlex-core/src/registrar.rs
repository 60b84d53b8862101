//! Algorithm registration builders.
//!
//! Registration is deferred: each builder records a *creator* that is
//! invoked with the resolved per-node options once the graph is
//! finalized, because options such as concurrency overrides and renames
//! are only available after all registrations are collected. Mistakes at
//! a registration site (arity mismatch, missing builder step) are
//! likewise reported when the graph is finalized, before any message
//! flows.

use crate::binding::{IntoProducts, ObserveFn, ReduceFn, TransformFn};
use crate::concurrency::Concurrency;
use crate::config::NodeOptions;
use crate::error::{Error, Result};
use crate::graph::FrameworkGraph;
use crate::node::{AlgorithmNode, NodeBody};
use crate::source::SourceBuilder;
use phlex_model::{ProductLabel, ProductStore};
use std::any::Any;

/// A deferred node creator, invoked at finalize time with the node's
/// resolved options.
pub(crate) struct DeferredNode {
    /// The registration name, used to look up the option block.
    pub(crate) registered_name: String,
    pub(crate) create: Box<dyn FnOnce(NodeOptions) -> Result<AlgorithmNode> + Send>,
}

fn deferred(
    graph: &mut FrameworkGraph,
    registered_name: String,
    create: impl FnOnce(NodeOptions) -> Result<AlgorithmNode> + Send + 'static,
) {
    graph.register_node(DeferredNode {
        registered_name,
        create: Box::new(create),
    });
}

fn collect_labels<I, L>(labels: I) -> Vec<ProductLabel>
where
    I: IntoIterator<Item = L>,
    L: Into<ProductLabel>,
{
    labels.into_iter().map(Into::into).collect()
}

fn check_arity(name: &str, what: &str, declared: usize, expected: usize) -> Result<()> {
    if declared == expected {
        return Ok(());
    }
    Err(Error::Configuration {
        key: format!("nodes.{name}"),
        cause: format!(
            "{what} declares {declared} product(s), but the callable takes {expected}"
        ),
    })
}

impl FrameworkGraph {
    /// Begin registering a transform.
    ///
    /// ```ignore
    /// graph.with("plus_one", |a: i32| a + 1, Concurrency::Unlimited)
    ///     .transform(["a"])
    ///     .to(["b"]);
    /// ```
    pub fn with<F, Args>(
        &mut self,
        name: impl Into<String>,
        f: F,
        concurrency: Concurrency,
    ) -> TransformBuilder<'_>
    where
        F: TransformFn<Args>,
        Args: 'static,
    {
        TransformBuilder {
            graph: self,
            name: name.into(),
            concurrency,
            predicates: Vec::new(),
            inputs: None,
            arity: F::ARITY,
            out_arity: <F::Out as IntoProducts>::ARITY,
            call: Box::new(move |slots, names| Ok(f.call(slots)?.into_products(names))),
        }
    }

    /// Begin registering an observer.
    pub fn observe<F, Args>(
        &mut self,
        name: impl Into<String>,
        f: F,
        concurrency: Concurrency,
    ) -> ObserveBuilder<'_>
    where
        F: ObserveFn<Args>,
        Args: 'static,
    {
        ObserveBuilder {
            graph: self,
            name: name.into(),
            concurrency,
            predicates: Vec::new(),
            arity: F::ARITY,
            call: Box::new(move |slots| f.call(slots)),
        }
    }

    /// Begin registering an output: a terminal consumer invoked with the
    /// store carrying its input products. The scheduler also delivers the
    /// flush marker of each closing level; those are dropped here, so the
    /// user function only ever sees process-stage stores.
    pub fn output<F>(
        &mut self,
        name: impl Into<String>,
        f: F,
        concurrency: Concurrency,
    ) -> OutputBuilder<'_>
    where
        F: Fn(&ProductStore) + Send + Sync + 'static,
    {
        OutputBuilder {
            graph: self,
            name: name.into(),
            concurrency,
            predicates: Vec::new(),
            call: Box::new(move |store| {
                if !store.is_flush() {
                    f(store);
                }
                Ok(())
            }),
        }
    }

    /// Begin registering a reducer folding over the descendants of a
    /// level instance.
    ///
    /// `update` folds one store's products into the accumulator; `commit`
    /// finalizes the accumulator into the output product(s) when the
    /// partition level's flush arrives. The accumulator starts from
    /// `Acc::default()` for each level instance.
    ///
    /// ```ignore
    /// graph.reduce(
    ///         "sum_x",
    ///         |acc: &mut i64, x: i32| *acc += i64::from(x),
    ///         |acc: i64| acc,
    ///         Concurrency::Unlimited,
    ///     )
    ///     .for_each("job")
    ///     .input_family(["x"])
    ///     .output(["total"]);
    /// ```
    pub fn reduce<U, C, Acc, Args, O>(
        &mut self,
        name: impl Into<String>,
        update: U,
        commit: C,
        concurrency: Concurrency,
    ) -> ReduceBuilder<'_>
    where
        U: ReduceFn<Acc, Args>,
        C: Fn(Acc) -> O + Send + Sync + 'static,
        Acc: Default + Send + 'static,
        Args: 'static,
        O: IntoProducts + 'static,
    {
        ReduceBuilder {
            graph: self,
            name: name.into(),
            concurrency,
            predicates: Vec::new(),
            partition: None,
            inputs: None,
            arity: U::ARITY,
            out_arity: O::ARITY,
            init: Box::new(|| Box::new(Acc::default()) as Box<dyn Any + Send>),
            update: Box::new(move |acc, slots| {
                let acc = acc
                    .downcast_mut::<Acc>()
                    .expect("accumulator type is fixed per node");
                update.call(acc, slots)
            }),
            commit: Box::new(move |acc, names| {
                let acc = acc
                    .downcast::<Acc>()
                    .expect("accumulator type is fixed per node");
                Ok(commit(*acc).into_products(names))
            }),
        }
    }

    /// Begin registering the source driving the graph.
    pub fn source(&mut self, name: impl Into<String>) -> SourceBuilder<'_> {
        SourceBuilder::new(self, name.into())
    }
}

/// Builder returned by [`FrameworkGraph::with`].
pub struct TransformBuilder<'g> {
    graph: &'g mut FrameworkGraph,
    name: String,
    concurrency: Concurrency,
    predicates: Vec<String>,
    inputs: Option<Vec<ProductLabel>>,
    arity: usize,
    out_arity: usize,
    call: crate::node::TransformCall,
}

impl TransformBuilder<'_> {
    /// Declare the input products.
    #[must_use]
    pub fn transform<I, L>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        self.inputs = Some(collect_labels(inputs));
        self
    }

    /// Attach predicate gating.
    #[must_use]
    pub fn when<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates.extend(predicates.into_iter().map(Into::into));
        self
    }

    /// Declare the output products and finish the registration.
    pub fn to<I, L>(self, outputs: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        let outputs = collect_labels(outputs);
        let Self {
            graph,
            name,
            concurrency,
            predicates,
            inputs,
            arity,
            out_arity,
            call,
        } = self;

        deferred(graph, name.clone(), move |options| {
            let inputs = inputs.ok_or_else(|| Error::Configuration {
                key: format!("nodes.{name}"),
                cause: "transform() was not called before to()".to_string(),
            })?;
            check_arity(&name, "transform", inputs.len(), arity)?;
            check_arity(&name, "to", outputs.len(), out_arity)?;

            let mut node = AlgorithmNode {
                name,
                concurrency,
                predicates,
                inputs,
                outputs,
                body: NodeBody::Transform(call),
            };
            let registered = node.name.clone();
            node.apply_options(options, &registered)?;
            Ok(node)
        });
    }
}

/// Builder returned by [`FrameworkGraph::observe`].
pub struct ObserveBuilder<'g> {
    graph: &'g mut FrameworkGraph,
    name: String,
    concurrency: Concurrency,
    predicates: Vec<String>,
    arity: usize,
    call: crate::node::ObserveCall,
}

impl ObserveBuilder<'_> {
    /// Attach predicate gating.
    #[must_use]
    pub fn when<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates.extend(predicates.into_iter().map(Into::into));
        self
    }

    /// Declare the input products and finish the registration.
    pub fn input_family<I, L>(self, inputs: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        let inputs = collect_labels(inputs);
        let Self {
            graph,
            name,
            concurrency,
            predicates,
            arity,
            call,
        } = self;

        deferred(graph, name.clone(), move |options| {
            check_arity(&name, "input_family", inputs.len(), arity)?;
            let mut node = AlgorithmNode {
                name,
                concurrency,
                predicates,
                inputs,
                outputs: Vec::new(),
                body: NodeBody::Observe(call),
            };
            let registered = node.name.clone();
            node.apply_options(options, &registered)?;
            Ok(node)
        });
    }
}

/// Builder returned by [`FrameworkGraph::output`].
pub struct OutputBuilder<'g> {
    graph: &'g mut FrameworkGraph,
    name: String,
    concurrency: Concurrency,
    predicates: Vec<String>,
    call: crate::node::OutputCall,
}

impl OutputBuilder<'_> {
    /// Attach predicate gating.
    #[must_use]
    pub fn when<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates.extend(predicates.into_iter().map(Into::into));
        self
    }

    /// Declare the input products and finish the registration.
    pub fn input_family<I, L>(self, inputs: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        let inputs = collect_labels(inputs);
        let Self {
            graph,
            name,
            concurrency,
            predicates,
            call,
        } = self;

        deferred(graph, name.clone(), move |options| {
            let mut node = AlgorithmNode {
                name,
                concurrency,
                predicates,
                inputs,
                outputs: Vec::new(),
                body: NodeBody::Output(call),
            };
            let registered = node.name.clone();
            node.apply_options(options, &registered)?;
            Ok(node)
        });
    }
}

/// Builder returned by [`FrameworkGraph::reduce`].
pub struct ReduceBuilder<'g> {
    graph: &'g mut FrameworkGraph,
    name: String,
    concurrency: Concurrency,
    predicates: Vec<String>,
    partition: Option<String>,
    inputs: Option<Vec<ProductLabel>>,
    arity: usize,
    out_arity: usize,
    init: crate::node::InitCall,
    update: crate::node::UpdateCall,
    commit: crate::node::CommitCall,
}

impl ReduceBuilder<'_> {
    /// Name the level the fold is partitioned by.
    ///
    /// The accumulator is keyed per instance of this level; `commit` runs
    /// when that instance's flush arrives, and the committed products are
    /// attached at its scope.
    #[must_use]
    pub fn for_each(mut self, level: impl Into<String>) -> Self {
        self.partition = Some(level.into());
        self
    }

    /// Declare the products folded by each update.
    #[must_use]
    pub fn input_family<I, L>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        self.inputs = Some(collect_labels(inputs));
        self
    }

    /// Attach predicate gating.
    #[must_use]
    pub fn when<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates.extend(predicates.into_iter().map(Into::into));
        self
    }

    /// Declare the committed output products and finish the registration.
    pub fn output<I, L>(self, outputs: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<ProductLabel>,
    {
        let outputs = collect_labels(outputs);
        let Self {
            graph,
            name,
            concurrency,
            predicates,
            partition,
            inputs,
            arity,
            out_arity,
            init,
            update,
            commit,
        } = self;

        deferred(graph, name.clone(), move |options| {
            let partition = partition.ok_or_else(|| Error::Configuration {
                key: format!("nodes.{name}"),
                cause: "for_each() was not called before output()".to_string(),
            })?;
            let inputs = inputs.ok_or_else(|| Error::Configuration {
                key: format!("nodes.{name}"),
                cause: "input_family() was not called before output()".to_string(),
            })?;
            check_arity(&name, "input_family", inputs.len(), arity)?;
            check_arity(&name, "output", outputs.len(), out_arity)?;

            // Committed products live at the partition level's scope.
            let outputs = outputs
                .into_iter()
                .map(|mut label| {
                    if label.layer.is_none() {
                        label.layer = Some(partition.clone());
                    }
                    label
                })
                .collect();

            let mut node = AlgorithmNode {
                name,
                concurrency,
                predicates,
                inputs,
                outputs,
                body: NodeBody::Reduce {
                    partition,
                    init,
                    update,
                    commit,
                },
            };
            let registered = node.name.clone();
            node.apply_options(options, &registered)?;
            Ok(node)
        });
    }
}
