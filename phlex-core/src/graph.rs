//! Framework graph assembly and wiring.
//!
//! Construction proceeds in two phases. During *registration*, algorithm
//! builders record deferred creators on a [`FrameworkGraph`]. At
//! *wiring* time ([`FrameworkGraph::finalize`]) the creators are invoked
//! with their resolved options and every input product is bound to
//! exactly one producer, rejecting unbound inputs, duplicate outputs,
//! cycles, and layer mismatches before any message flows.

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::node::AlgorithmNode;
use crate::registrar::DeferredNode;
use crate::scheduler::EngineSettings;
use crate::source::SourceRegistration;
use phlex_model::ProductStore;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// The producer of a product, resolved at wiring time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Producer {
    /// A product carried by the base (root) store handed to the graph.
    Driver,
    /// A product emitted or provided by the registered source.
    Source,
    /// A product declared by the node at this index.
    Node(usize),
}

/// A framework graph under construction.
///
/// Collects registrations and the base store; [`FrameworkGraph::finalize`]
/// wires it into an executable [`WiredGraph`].
pub struct FrameworkGraph {
    pub(crate) base: Arc<ProductStore>,
    pub(crate) config: Configuration,
    deferred: Vec<DeferredNode>,
    pub(crate) source_registration: Option<SourceRegistration>,
    registration_errors: Vec<Error>,
}

impl FrameworkGraph {
    /// Create a graph with an empty root store and empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(ProductStore::base())
    }

    /// Create a graph seeded with the given root store.
    #[must_use]
    pub fn with_base(base: ProductStore) -> Self {
        Self {
            base: Arc::new(base),
            config: Configuration::empty(),
            deferred: Vec::new(),
            source_registration: None,
            registration_errors: Vec::new(),
        }
    }

    /// Bind the configuration consulted for per-node options and engine
    /// settings.
    #[must_use]
    pub fn configured(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn register_node(&mut self, node: DeferredNode) {
        self.deferred.push(node);
    }

    pub(crate) fn register_source(&mut self, registration: SourceRegistration) {
        if let Some(existing) = &self.source_registration {
            self.registration_errors.push(Error::Configuration {
                key: format!("source.{}", registration.name),
                cause: format!("a source ('{}') is already registered", existing.name),
            });
            return;
        }
        self.source_registration = Some(registration);
    }

    /// Instantiate all registered nodes and wire the graph.
    ///
    /// Fails with a configuration or wiring error; on success the result
    /// is ready to [`WiredGraph::execute`].
    pub fn finalize(mut self) -> Result<WiredGraph> {
        if let Some(err) = self.registration_errors.drain(..).next() {
            return Err(err);
        }

        let settings = EngineSettings::from_configuration(&self.config)?;

        let mut nodes = Vec::with_capacity(self.deferred.len());
        for deferred in self.deferred {
            let options = self.config.node_options(&deferred.registered_name)?;
            nodes.push((deferred.create)(options)?);
        }

        // Algorithm names must be unique for options and diagnostics to
        // address them.
        let mut seen = HashMap::new();
        for node in &nodes {
            if seen.insert(node.name.clone(), ()).is_some() {
                return Err(Error::Configuration {
                    key: format!("nodes.{}", node.name),
                    cause: "duplicate algorithm name".to_string(),
                });
            }
        }

        for node in &nodes {
            if node.inputs.is_empty() {
                return Err(Error::Configuration {
                    key: format!("nodes.{}", node.name),
                    cause: "node declares no input products".to_string(),
                });
            }
        }

        let producers = Self::resolve_producers(
            &nodes,
            self.base.as_ref(),
            self.source_registration.as_ref(),
        )?;
        Self::check_unbound(&nodes, &producers)?;
        Self::check_layers(&nodes, &producers, self.source_registration.as_ref())?;
        Self::check_acyclic(&nodes, &producers)?;

        Ok(WiredGraph {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            base: self.base,
            source: self.source_registration,
            producers,
            settings,
        })
    }

    fn resolve_producers(
        nodes: &[AlgorithmNode],
        base: &ProductStore,
        source: Option<&SourceRegistration>,
    ) -> Result<HashMap<String, Producer>> {
        let mut producers: HashMap<String, Producer> = HashMap::new();
        let producer_name = |producer: &Producer| -> String {
            match producer {
                Producer::Driver => "driver".to_string(),
                Producer::Source => source.map_or_else(String::new, |s| s.name.clone()),
                Producer::Node(idx) => nodes[*idx].name.clone(),
            }
        };

        let mut declare = |name: &str, producer: Producer| -> Result<()> {
            if let Some(existing) = producers.get(name) {
                return Err(Error::DuplicateOutput {
                    product: name.to_string(),
                    first: producer_name(existing),
                    second: producer_name(&producer),
                });
            }
            producers.insert(name.to_string(), producer);
            Ok(())
        };

        for name in base.products().names() {
            declare(name, Producer::Driver)?;
        }
        if let Some(source) = source {
            for label in &source.products {
                declare(&label.name, Producer::Source)?;
            }
            for provider in &source.providers {
                declare(&provider.label.name, Producer::Source)?;
            }
        }
        for (idx, node) in nodes.iter().enumerate() {
            for label in &node.outputs {
                declare(&label.name, Producer::Node(idx))?;
            }
        }
        Ok(producers)
    }

    fn check_unbound(nodes: &[AlgorithmNode], producers: &HashMap<String, Producer>) -> Result<()> {
        for node in nodes {
            for label in &node.inputs {
                if !producers.contains_key(&label.name) {
                    return Err(Error::UnboundInput {
                        node: node.name.clone(),
                        product: label.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Layer names participate in identity at wiring time only: an input
    /// requested at an explicit layer must match the producer's explicit
    /// layer, when the producer declares one.
    fn check_layers(
        nodes: &[AlgorithmNode],
        producers: &HashMap<String, Producer>,
        source: Option<&SourceRegistration>,
    ) -> Result<()> {
        let produced_layer = |producer: &Producer, product: &str| -> Option<String> {
            match producer {
                Producer::Driver => Some(phlex_model::LevelId::ROOT_NAME.to_string()),
                Producer::Source => source.and_then(|s| {
                    s.products
                        .iter()
                        .chain(s.providers.iter().map(|p| &p.label))
                        .find(|l| l.name == product)
                        .and_then(|l| l.layer.clone())
                }),
                Producer::Node(idx) => nodes[*idx]
                    .outputs
                    .iter()
                    .find(|l| l.name == product)
                    .and_then(|l| l.layer.clone()),
            }
        };

        for node in nodes {
            for label in &node.inputs {
                let Some(requested) = &label.layer else {
                    continue;
                };
                let producer = &producers[&label.name];
                if let Some(produced) = produced_layer(producer, &label.name) {
                    if *requested != produced {
                        return Err(Error::LevelMismatch {
                            node: node.name.clone(),
                            product: label.name.clone(),
                            requested: requested.clone(),
                            produced,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over producer→consumer edges; flush edges do not
    /// appear here, so reductions do not register as cycles.
    fn check_acyclic(nodes: &[AlgorithmNode], producers: &HashMap<String, Producer>) -> Result<()> {
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut in_degree: Vec<usize> = vec![0; nodes.len()];

        for (consumer, node) in nodes.iter().enumerate() {
            for label in &node.inputs {
                if let Some(Producer::Node(producer)) = producers.get(&label.name) {
                    successors[*producer].push(consumer);
                    in_degree[consumer] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, degree)| *degree == 0)
            .map(|(idx, _)| idx)
            .collect();

        let mut visited = 0;
        while let Some(idx) = queue.pop_front() {
            visited += 1;
            for &next in &successors[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if visited != nodes.len() {
            let mut cyclic: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, degree)| *degree > 0)
                .map(|(idx, _)| nodes[idx].name.clone())
                .collect();
            cyclic.sort();
            return Err(Error::Cycle { nodes: cyclic });
        }
        Ok(())
    }
}

impl Default for FrameworkGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully wired, executable graph.
pub struct WiredGraph {
    pub(crate) nodes: Vec<Arc<AlgorithmNode>>,
    pub(crate) base: Arc<ProductStore>,
    pub(crate) source: Option<SourceRegistration>,
    pub(crate) producers: HashMap<String, Producer>,
    pub(crate) settings: EngineSettings,
}

impl std::fmt::Debug for WiredGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiredGraph")
            .field("nodes", &self.nodes.len())
            .field("base", &self.base)
            .field("source", &self.source.as_ref().map(|s| &s.name))
            .field("producers", &self.producers.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl WiredGraph {
    /// The wired nodes.
    #[must_use]
    pub fn nodes(&self) -> impl Iterator<Item = &AlgorithmNode> {
        self.nodes.iter().map(AsRef::as_ref)
    }

    /// The name of the producer of a product, if wired.
    #[must_use]
    pub fn producer_of(&self, product: &str) -> Option<&str> {
        match self.producers.get(product)? {
            Producer::Driver => Some("driver"),
            Producer::Source => self.source.as_ref().map(|s| s.name.as_str()),
            Producer::Node(idx) => Some(self.nodes[*idx].name()),
        }
    }
}
