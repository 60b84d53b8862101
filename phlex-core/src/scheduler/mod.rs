//! The parallel task engine.
//!
//! The scheduler drives stores through the wired graph with
//! **concurrent wave execution**. Each store emitted by the source is
//! dispatched as a *wave*: a ready-node loop that fires every node whose
//! inputs resolve on the store chain and at least one of whose inputs is
//! fresh in this wave, spawning node invocations as concurrent tasks up
//! to each node's own concurrency gate.
//!
//! ## Architecture
//!
//! 1. The pump pulls stores from the source, in hierarchical order.
//! 2. A wave task runs per store; sibling waves run concurrently up to
//!    `max_in_flight_stores`, while a child wave starts only after its
//!    parent instance's wave has completed.
//! 3. Level closure is detected by diffing each emitted ID against the
//!    open path; a closed instance flushes once its whole subtree has
//!    drained, releasing reducer commits exactly once per instance.
//!
//! ## Concurrency control
//!
//! - Per-node semaphores enforce serial / bounded / unlimited
//!   concurrency across all in-flight waves.
//! - A wave-level semaphore bounds the number of stores in flight.
//! - On the first error the engine transitions to draining: no new
//!   admissions, in-flight tasks run to completion, and the first
//!   captured error is surfaced from `execute`.

mod flush;

use crate::binding::{catch_algorithm, InputSlots};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::graph::WiredGraph;
use crate::node::{AlgorithmNode, NodeBody};
use crate::source::SourceRegistration;
use dashmap::DashMap;
use flush::{reparent, LevelTracker, OpenInstance, WaveState};
use parking_lot::Mutex;
use phlex_model::{LevelId, Message, ProductStore, Products};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

/// Engine settings read from configuration.
#[derive(Debug, Clone)]
pub(crate) struct EngineSettings {
    /// Maximum number of store waves in flight at once.
    pub(crate) max_in_flight_stores: usize,
}

impl EngineSettings {
    pub(crate) fn from_configuration(config: &Configuration) -> Result<Self> {
        let max_in_flight_stores = config.get_or("scheduler.max_in_flight_stores", 16_usize)?;
        if max_in_flight_stores == 0 {
            return Err(Error::Configuration {
                key: "scheduler.max_in_flight_stores".to_string(),
                cause: "must be a positive integer".to_string(),
            });
        }
        Ok(Self {
            max_in_flight_stores,
        })
    }
}

/// Accumulator key: (reducer node index, partition level instance).
type AccumulatorKey = (usize, LevelId);

/// State shared by the pump, waves, and closure tasks.
struct Inner {
    nodes: Vec<Arc<AlgorithmNode>>,
    gates: Vec<Option<Arc<Semaphore>>>,
    wave_permits: Arc<Semaphore>,
    accumulators: DashMap<AccumulatorKey, Mutex<Box<dyn Any + Send>>>,
    open: DashMap<LevelId, ()>,
    first_error: Mutex<Option<Error>>,
    draining: AtomicBool,
    sequence: AtomicU64,
}

impl Inner {
    fn record_error(&self, error: Error) {
        tracing::error!(code = error.code(), error = %error, "engine entering draining mode");
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.draining.store(true, Ordering::SeqCst);
    }

    fn draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    fn next_number(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

/// The admission decision for a node against the current wave state.
enum Admission {
    /// Fire with these resolved input slots.
    Fire(Vec<(String, Arc<ProductStore>)>),
    /// A predicate evaluated false: the node is skipped for this store.
    Skip,
    /// Inputs not (or not yet) resolvable in this wave.
    NotReady,
    /// Inputs ready, but this predicate product is not yet resolvable.
    Defer(String),
}

/// One store's journey through the graph.
struct Wave {
    inner: Arc<Inner>,
    message: Message,
    /// Product name → store carrying it, for products of this wave.
    produced: HashMap<String, Arc<ProductStore>>,
    /// Every product added during this wave.
    wave_products: Products,
    /// Names that count as "new at this level" for admission.
    fresh: HashSet<String>,
    fired: Vec<bool>,
    running: JoinSet<(usize, Result<Products>)>,
}

impl Wave {
    fn new(inner: Arc<Inner>, message: Message, seed_is_fresh: bool) -> Self {
        let fresh = if seed_is_fresh {
            message.store.products().names().map(String::from).collect()
        } else {
            HashSet::new()
        };
        let fired = vec![false; inner.nodes.len()];
        Self {
            inner,
            message,
            produced: HashMap::new(),
            wave_products: Products::new(),
            fresh,
            fired,
            running: JoinSet::new(),
        }
    }

    fn seed(&self) -> &Arc<ProductStore> {
        &self.message.store
    }

    /// Introduce products into the wave as fresh, attached to a
    /// continuation of the seed store.
    fn inject(&mut self, origin: &str, products: Products) {
        if products.is_empty() {
            return;
        }
        let carrier = self.seed().make_continuation(origin, products.clone());
        for name in products.names() {
            self.produced.insert(name.to_string(), Arc::clone(&carrier));
            self.fresh.insert(name.to_string());
        }
        self.wave_products.extend(products);
    }

    /// Resolve a product to the store carrying it: this wave's products
    /// first, then the seed chain via lexical inheritance.
    fn resolve(&self, name: &str) -> Option<Arc<ProductStore>> {
        self.produced
            .get(name)
            .cloned()
            .or_else(|| self.seed().store_for_product(name))
    }

    fn admit(&self, node: &AlgorithmNode) -> Result<Admission> {
        // A reducer participates only under an instance of its partition
        // level.
        if let NodeBody::Reduce { partition, .. } = &node.body {
            if self.seed().id().at_level(partition).is_none() {
                return Ok(Admission::NotReady);
            }
        }

        let mut slots = Vec::with_capacity(node.inputs.len());
        let mut any_fresh = false;
        for label in &node.inputs {
            let Some(store) = self.resolve(&label.name) else {
                return Ok(Admission::NotReady);
            };
            any_fresh |= self.fresh.contains(&label.name);
            slots.push((label.name.clone(), store));
        }
        if !any_fresh {
            return Ok(Admission::NotReady);
        }

        for predicate in &node.predicates {
            match self.resolve(predicate) {
                Some(store) => match store.get::<bool>(predicate) {
                    Ok(true) => {}
                    Ok(false) => return Ok(Admission::Skip),
                    Err(err) => return Err(err.into()),
                },
                None => return Ok(Admission::Defer(predicate.clone())),
            }
        }

        Ok(Admission::Fire(slots))
    }

    /// The wave's view of the store, including everything produced so far.
    fn view_store(&self, origin: &str) -> Arc<ProductStore> {
        if self.wave_products.is_empty() {
            return Arc::clone(self.seed());
        }
        let mut merged = self.seed().products().clone();
        merged.extend(self.wave_products.clone());
        self.seed().make_continuation(origin, merged)
    }

    fn spawn_ready(&mut self) {
        for idx in 0..self.inner.nodes.len() {
            if self.fired[idx] {
                continue;
            }
            let node = Arc::clone(&self.inner.nodes[idx]);
            match self.admit(&node) {
                Ok(Admission::Fire(slots)) => {
                    self.fired[idx] = true;
                    self.spawn_node(idx, node, slots);
                }
                Ok(Admission::Skip) => {
                    self.fired[idx] = true;
                    tracing::debug!(
                        node = node.name(),
                        level = %self.seed().id(),
                        "skipped by predicate"
                    );
                }
                Ok(Admission::NotReady | Admission::Defer(_)) => {}
                Err(err) => {
                    self.fired[idx] = true;
                    self.inner.record_error(err);
                }
            }
        }
    }

    fn spawn_node(&mut self, idx: usize, node: Arc<AlgorithmNode>, slots: Vec<(String, Arc<ProductStore>)>) {
        let inner = Arc::clone(&self.inner);
        let gate = self.inner.gates[idx].clone();
        let names = node.output_names();
        let view = match &node.body {
            NodeBody::Output(_) => Some(self.view_store(node.name())),
            _ => None,
        };
        let partition_key = match &node.body {
            NodeBody::Reduce { partition, .. } => self
                .seed()
                .id()
                .at_level(partition)
                .map(|instance| (idx, instance)),
            _ => None,
        };
        let slots = InputSlots::new(slots);

        tracing::debug!(node = node.name(), level = %self.seed().id(), "dispatching");

        self.running.spawn(async move {
            let _permit = match gate {
                Some(gate) => Some(
                    gate.acquire_owned()
                        .await
                        .expect("node gate should not be closed"),
                ),
                None => None,
            };

            let result = match &node.body {
                NodeBody::Transform(call) => {
                    catch_algorithm(node.name(), || call(&slots, &names))
                }
                NodeBody::Observe(call) => {
                    catch_algorithm(node.name(), || call(&slots)).map(|()| Products::new())
                }
                NodeBody::Output(call) => {
                    let view = view.expect("output nodes capture a view store");
                    catch_algorithm(node.name(), || call(&view)).map(|()| Products::new())
                }
                NodeBody::Reduce { init, update, .. } => {
                    let key = partition_key.expect("admission checked the partition level");
                    let entry = inner
                        .accumulators
                        .entry(key)
                        .or_insert_with(|| Mutex::new(init()));
                    let mut accumulator = entry.lock();
                    catch_algorithm(node.name(), || update(accumulator.as_mut(), &slots))
                        .map(|()| Products::new())
                }
            };

            (idx, result)
        });
    }

    /// Run the ready-node loop to completion.
    async fn drain(&mut self) {
        loop {
            if !self.inner.draining() {
                self.spawn_ready();
            }
            if self.running.is_empty() {
                break;
            }
            let Some(joined) = self.running.join_next().await else {
                break;
            };
            match joined {
                Ok((idx, Ok(products))) => {
                    let origin = self.inner.nodes[idx].name().to_string();
                    self.inject(&origin, products);
                }
                Ok((_, Err(err))) => self.inner.record_error(err),
                Err(join_error) => {
                    self.inner.record_error(Error::Algorithm {
                        node: "<engine>".to_string(),
                        cause: format!("node task failed: {join_error}"),
                    });
                }
            }
        }
    }

    /// Nodes whose inputs were ready but whose predicate never became
    /// resolvable have a missing predicate, not a pending one. Called
    /// once per wave, after its final drain.
    fn check_deferred_predicates(&self) {
        if self.inner.draining() {
            return;
        }
        for idx in 0..self.inner.nodes.len() {
            if self.fired[idx] {
                continue;
            }
            let node = Arc::clone(&self.inner.nodes[idx]);
            if let Ok(Admission::Defer(predicate)) = self.admit(&node) {
                self.inner.record_error(Error::MissingPredicate {
                    node: node.name().to_string(),
                    predicate,
                });
            }
        }
    }

    /// The refined store carrying the seed's products plus everything
    /// produced during the wave.
    fn refined(&self) -> Arc<ProductStore> {
        if self.wave_products.is_empty() {
            return Arc::clone(self.seed());
        }
        let mut merged = self.seed().products().clone();
        merged.extend(self.wave_products.clone());
        self.seed().make_continuation("[refined]", merged)
    }
}

/// Dispatch one store's processing wave as a task.
fn spawn_wave(
    inner: Arc<Inner>,
    message: Message,
    injected: Products,
    origin: String,
) -> JoinHandle<Arc<ProductStore>> {
    tokio::spawn(async move {
        let _permit = inner
            .wave_permits
            .clone()
            .acquire_owned()
            .await
            .expect("wave permits should not be closed");

        tracing::debug!(
            level = %message.store.id(),
            number = message.number,
            originator = message.originator,
            "processing store"
        );

        let mut wave = Wave::new(inner, message, true);
        wave.inject(&origin, injected);
        wave.drain().await;
        wave.check_deferred_predicates();
        wave.refined()
    })
}

/// Close one level instance: generate its flush marker, run reducer
/// commits exactly once, drive committed products to downstream
/// consumers, and finally hand the marker to terminal outputs (which
/// drop it).
///
/// Commits chain: a commit whose products feed another reducer at the
/// same partition level triggers a further commit round, until no
/// reducer has anything left to commit.
async fn run_flush(inner: &Arc<Inner>, id: &Arc<LevelId>, refined: Arc<ProductStore>) {
    if inner.draining() {
        return;
    }

    // Every descendant instance must have closed before this flush.
    for entry in inner.open.iter() {
        if id.is_ancestor_of(entry.key()) {
            inner.record_error(Error::FlushOrderingViolation {
                level: id.to_string(),
            });
            return;
        }
    }

    let flush_message = Message::new(refined.make_flush(), "[flush]", inner.next_number());
    tracing::debug!(
        level = %flush_message.store.id(),
        source = flush_message.store.source(),
        number = flush_message.number,
        "closing level instance"
    );

    let mut wave = Wave::new(
        Arc::clone(inner),
        Message::new(refined, "[flush]", inner.next_number()),
        false,
    );

    // Reducers partitioned by this level, committed in dependency order:
    // a reducer fed by an uncommitted peer's output waits for that peer,
    // so its updates from the peer's commit land before its own commit.
    let mut pending: Vec<usize> = inner
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| {
            matches!(
                &node.body,
                NodeBody::Reduce { partition, .. } if partition.as_str() == id.level_name()
            )
        })
        .map(|(idx, _)| idx)
        .collect();

    while !pending.is_empty() && !inner.draining() {
        let free: Vec<usize> = pending
            .iter()
            .copied()
            .filter(|&idx| {
                inner.nodes[idx].inputs.iter().all(|input| {
                    !pending.iter().any(|&peer| {
                        peer != idx
                            && inner.nodes[peer]
                                .outputs
                                .iter()
                                .any(|output| output.name == input.name)
                    })
                })
            })
            .collect();
        if free.is_empty() {
            // Remaining peers feed each other; wiring would have rejected
            // a true cycle, so this cannot happen.
            break;
        }

        let mut commits: Vec<(usize, Products)> = Vec::new();
        for idx in free {
            pending.retain(|&peer| peer != idx);
            let node = &inner.nodes[idx];
            let NodeBody::Reduce { commit, .. } = &node.body else {
                continue;
            };
            let Some((_, accumulator)) = inner.accumulators.remove(&(idx, (**id).clone())) else {
                continue;
            };
            // Block further updates to this reducer within the flush wave.
            wave.fired[idx] = true;

            let _permit = match &inner.gates[idx] {
                Some(gate) => Some(
                    Arc::clone(gate)
                        .acquire_owned()
                        .await
                        .expect("node gate should not be closed"),
                ),
                None => None,
            };
            let names = node.output_names();
            match catch_algorithm(node.name(), || commit(accumulator.into_inner(), &names)) {
                Ok(products) => {
                    tracing::debug!(node = node.name(), level = %id, "reducer committed");
                    commits.push((idx, products));
                }
                Err(err) => inner.record_error(err),
            }
        }

        if inner.draining() {
            break;
        }
        if !commits.is_empty() {
            for (idx, products) in commits {
                let origin = inner.nodes[idx].name().to_string();
                wave.inject(&origin, products);
            }
            wave.drain().await;
        }
    }

    wave.check_deferred_predicates();

    // The flush marker reaches terminal consumers only after every
    // ordinary message for this instance has been processed; outputs
    // drop it without invoking the user function.
    if !inner.draining() {
        for (idx, node) in inner.nodes.iter().enumerate() {
            let NodeBody::Output(call) = &node.body else {
                continue;
            };
            let _permit = match &inner.gates[idx] {
                Some(gate) => Some(
                    Arc::clone(gate)
                        .acquire_owned()
                        .await
                        .expect("node gate should not be closed"),
                ),
                None => None,
            };
            if let Err(err) = catch_algorithm(node.name(), || call(&flush_message.store)) {
                inner.record_error(err);
            }
        }
    }
}

/// Spawn the closure task for an instance: wait for its wave and its
/// children's closures, then flush.
fn spawn_closure(inner: &Arc<Inner>, mut instance: OpenInstance) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let refined = instance.refined().await;
        for closure in instance.closures.drain(..) {
            let _ = closure.await;
        }
        run_flush(&inner, &instance.id, refined).await;
        inner.open.remove(instance.id.as_ref());
    })
}

/// Compute provider products for a store at its layer.
fn provider_products(
    source: Option<&SourceRegistration>,
    id: &LevelId,
) -> Result<Products> {
    let mut products = Products::new();
    let Some(source) = source else {
        return Ok(products);
    };
    for provider in &source.providers {
        if provider.label.layer.as_deref() != Some(id.level_name()) {
            continue;
        }
        let value = catch_algorithm(&source.name, || Ok((provider.make)(id)))?;
        products.add_value(provider.label.name.clone(), value);
    }
    Ok(products)
}

/// The engine driving a wired graph to completion.
pub(crate) struct Scheduler {
    inner: Arc<Inner>,
    base: Arc<ProductStore>,
    source: Option<SourceRegistration>,
}

impl Scheduler {
    pub(crate) fn new(graph: WiredGraph) -> Self {
        let gates = graph
            .nodes
            .iter()
            .map(|node| {
                node.concurrency()
                    .permits()
                    .map(|permits| Arc::new(Semaphore::new(permits)))
            })
            .collect();

        let inner = Arc::new(Inner {
            nodes: graph.nodes,
            gates,
            wave_permits: Arc::new(Semaphore::new(graph.settings.max_in_flight_stores)),
            accumulators: DashMap::new(),
            open: DashMap::new(),
            first_error: Mutex::new(None),
            draining: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        });

        Self {
            inner,
            base: graph.base,
            source: graph.source,
        }
    }

    /// Drive the graph: root wave, source stores, then closure of every
    /// open level, root last. Returns the first captured error.
    pub(crate) async fn run(mut self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let source_name = self
            .source
            .as_ref()
            .map_or_else(|| "driver".to_string(), |s| s.name.clone());

        let root_id = Arc::clone(self.base.id());
        inner.open.insert((*root_id).clone(), ());

        let root_providers = match provider_products(self.source.as_ref(), &root_id) {
            Ok(products) => products,
            Err(err) => {
                inner.record_error(err);
                Products::new()
            }
        };
        let root_message = Message::new(
            Arc::clone(&self.base),
            source_name.clone(),
            inner.next_number(),
        );
        let root_wave = spawn_wave(
            Arc::clone(&inner),
            root_message,
            root_providers,
            source_name.clone(),
        );

        let mut tracker = LevelTracker::new(OpenInstance {
            id: root_id,
            seed: Arc::clone(&self.base),
            wave: WaveState::Running(root_wave),
            closures: Vec::new(),
            closed_children: Default::default(),
        });
        let mut root_closure: Option<JoinHandle<()>> = None;

        let init = self.source.as_mut().and_then(|s| s.init.take());
        if let Some(init) = init {
            let refined_root = tracker
                .top_mut()
                .expect("root instance is open")
                .refined()
                .await;
            let stores = init(refined_root);

            for store in stores {
                if inner.draining() {
                    break;
                }
                if store.is_flush() {
                    inner.record_error(Error::Algorithm {
                        node: source_name.clone(),
                        cause: "sources must not emit flush stores".to_string(),
                    });
                    break;
                }

                let id = Arc::clone(store.id());

                // Close every open instance the new ID has diverged from.
                let keep = tracker.common_segments(&id);
                while tracker.len() > keep {
                    let closed = tracker.pop().expect("tracker is non-empty");
                    let closed_id = (*closed.id).clone();
                    let handle = spawn_closure(&inner, closed);
                    match tracker.top_mut() {
                        Some(parent) => {
                            parent.closures.push(handle);
                            parent.closed_children.insert(closed_id);
                        }
                        None => root_closure = Some(handle),
                    }
                }

                let Some(top) = tracker.top_mut() else {
                    // The root itself was closed: the ID did not share the
                    // root segment, which make_child-derived IDs always do.
                    inner.record_error(Error::Algorithm {
                        node: source_name.clone(),
                        cause: format!("store {id} does not descend from the root"),
                    });
                    break;
                };

                if *top.id == *id {
                    // Equal IDs deduplicate: the instance is already open.
                    tracing::warn!(level = %id, "duplicate store emission ignored");
                    continue;
                }
                if top.closed_children.contains(id.as_ref()) {
                    inner.record_error(Error::Algorithm {
                        node: source_name.clone(),
                        cause: format!("store {id} re-emitted after its level instance closed"),
                    });
                    break;
                }
                if keep != id.depth() {
                    inner.record_error(Error::Algorithm {
                        node: source_name.clone(),
                        cause: format!("store {id} emitted before its parent"),
                    });
                    break;
                }

                let refined_parent = top.refined().await;
                let seed = reparent(&store, &refined_parent);
                let injected = match provider_products(self.source.as_ref(), &id) {
                    Ok(products) => products,
                    Err(err) => {
                        inner.record_error(err);
                        break;
                    }
                };

                inner.open.insert((*id).clone(), ());
                let message = Message::new(Arc::clone(&seed), source_name.clone(), inner.next_number());
                let handle = spawn_wave(
                    Arc::clone(&inner),
                    message,
                    injected,
                    source_name.clone(),
                );
                tracker.push(OpenInstance {
                    id,
                    seed,
                    wave: WaveState::Running(handle),
                    closures: Vec::new(),
                    closed_children: Default::default(),
                });
            }
        }

        // End of stream: close everything still open, root last.
        while let Some(closed) = tracker.pop() {
            let handle = spawn_closure(&inner, closed);
            match tracker.top_mut() {
                Some(parent) => parent.closures.push(handle),
                None => root_closure = Some(handle),
            }
        }
        if let Some(handle) = root_closure {
            let _ = handle.await;
        }

        let result = match inner.first_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        };
        result
    }
}

impl WiredGraph {
    /// Execute the graph to completion.
    ///
    /// Terminates when the source ends, every flush has propagated, and
    /// no node has queued or in-flight work. The first error captured
    /// during the run is returned; configuration and wiring errors are
    /// reported by [`crate::FrameworkGraph::finalize`] before this point.
    pub async fn execute(self) -> Result<()> {
        Scheduler::new(self).run().await
    }
}
