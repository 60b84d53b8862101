//! Concurrency-gate tests.
//!
//! Tests verify that per-node concurrency levels bound how many
//! invocations run at once across concurrently processed stores.

use phlex_core::{Concurrency, FrameworkGraph};
use phlex_model::{ProductStore, Products};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observe how many invocations of a node overlap.
struct OverlapProbe {
    current: Arc<AtomicUsize>,
    max_observed: Arc<AtomicUsize>,
}

impl OverlapProbe {
    fn new() -> Self {
        Self {
            current: Arc::new(AtomicUsize::new(0)),
            max_observed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn probe(&self, hold: Duration) -> impl Fn(i32) + Send + Sync + 'static {
        let current = Arc::clone(&self.current);
        let max_observed = Arc::clone(&self.max_observed);
        move |_a: i32| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(hold);
            current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn max(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }
}

fn event_source(graph: &mut FrameworkGraph, count: usize) {
    graph
        .source("events")
        .products(["a"])
        .emit(move |job: Arc<ProductStore>| {
            (1..=count).map(move |n| {
                let mut products = Products::new();
                products.add("a", n as i32);
                job.make_child(n, "event", "events", products)
            })
        });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn serial_nodes_never_overlap() {
    let probe = OverlapProbe::new();

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 8);
    graph
        .observe("serial_probe", probe.probe(Duration::from_millis(5)), Concurrency::Serial)
        .input_family(["a"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(probe.max(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn bounded_nodes_respect_their_limit() {
    let probe = OverlapProbe::new();

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 12);
    graph
        .observe(
            "bounded_probe",
            probe.probe(Duration::from_millis(5)),
            Concurrency::Bounded(3),
        )
        .input_family(["a"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert!(probe.max() <= 3, "observed {} overlapping invocations", probe.max());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn all_events_are_processed_under_any_gate() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_serial = Arc::clone(&fired);
    let unlimited = Arc::new(AtomicUsize::new(0));
    let fired_unlimited = Arc::clone(&unlimited);

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 20);
    graph
        .observe(
            "serial_counter",
            move |_a: i32| {
                fired_serial.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Serial,
        )
        .input_family(["a"]);
    graph
        .observe(
            "unlimited_counter",
            move |_a: i32| {
                fired_unlimited.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["a"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 20);
    assert_eq!(unlimited.load(Ordering::SeqCst), 20);
}
