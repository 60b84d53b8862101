//! End-to-end execution tests for the framework graph.
//!
//! Tests verify that:
//! - Stores flow through transforms to observers with correct values
//! - Products resolve across levels via lexical inheritance
//! - Boundary cases (empty source, job-only graph) complete cleanly
//! - Wiring and type errors surface with the right error kinds

use phlex_core::{Concurrency, Error, FrameworkGraph};
use phlex_model::{Handle, ModelError, ProductStore, Products};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

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

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn plus_one_fires_observer_for_every_event() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 10);
    graph
        .with("plus_one", |a: i32| a + 1, Concurrency::Unlimited)
        .transform(["a"])
        .to(["b"]);
    graph
        .observe(
            "verify",
            move |a: i32, b: i32| {
                assert_eq!(b, a + 1);
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["a", "b"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn complementary_event_products_sum_to_one() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    graph
        .source("gen")
        .provide("i@event", |id| (id.number() % 2) as i32)
        .provide("j@event", |id| 1 - (id.number() % 2) as i32)
        .emit(|job: Arc<ProductStore>| {
            (1..=10).map(move |n| job.make_child(n, "event", "gen", Products::new()))
        });
    graph
        .with("add", |i: i32, j: i32| i + j, Concurrency::Unlimited)
        .transform(["i", "j"])
        .to(["sum"]);
    graph
        .observe(
            "verify_sum",
            move |sum: i32| {
                assert_eq!(sum, 1);
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["sum"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn empty_source_completes_without_firing() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    graph
        .source("empty")
        .products(["a"])
        .emit(|_job| std::iter::empty());
    graph
        .with("plus_one", |a: i32| a + 1, Concurrency::Unlimited)
        .transform(["a"])
        .to(["b"]);
    graph
        .observe(
            "verify",
            move |_b: i32| {
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["b"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn job_only_graph_processes_base_store() {
    let observed = Arc::new(AtomicUsize::new(0));
    let observed_clone = Arc::clone(&observed);

    let mut base = ProductStore::base();
    base.add_product("number", 3_i32);
    base.add_product("temperature", 98.5_f64);
    base.add_product("name", "John".to_string());

    let mut graph = FrameworkGraph::with_base(base);
    graph
        .observe(
            "verify_results",
            move |number: i32, temperature: f64, name: String| {
                assert_eq!((number, temperature, name.as_str()), (3, 98.5, "John"));
                observed_clone.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["number", "temperature", "name"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ancestor_products_resolve_at_event_level() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut base = ProductStore::base();
    base.add_product("offset", 100_i32);

    let mut graph = FrameworkGraph::with_base(base);
    event_source(&mut graph, 5);
    // "offset" lives on the job store; "a" is event-local.
    graph
        .with(
            "shift",
            |a: i32, offset: i32| a + offset,
            Concurrency::Unlimited,
        )
        .transform(["a", "offset"])
        .to(["shifted"]);
    graph
        .observe(
            "verify_shift",
            move |a: i32, shifted: i32| {
                assert_eq!(shifted, a + 100);
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["a", "shifted"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn handle_and_value_bindings_interoperate() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 3);
    graph
        .with(
            "tag",
            |a: Handle<i32>| format!("{}@{}", *a, a.level_id().level_name()),
            Concurrency::Unlimited,
        )
        .transform(["a"])
        .to(["tagged"]);
    graph
        .observe(
            "verify_tag",
            move |a: i32, tagged: String| {
                assert_eq!(tagged, format!("{a}@event"));
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["a", "tagged"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn identity_transform_round_trips_products() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_observer = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 4);
    graph
        .with("identity", |a: i32| a, Concurrency::Unlimited)
        .transform(["a"])
        .to(["a_copy"]);
    graph
        .observe(
            "verify_equal",
            move |a: i32, a_copy: i32| {
                assert_eq!(a, a_copy);
                fired_in_observer.fetch_add(1, Ordering::SeqCst);
            },
            Concurrency::Unlimited,
        )
        .input_family(["a", "a_copy"]);

    graph.finalize().unwrap().execute().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn wiring_cycle_fails_before_any_message() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_transform = Arc::clone(&fired);

    let mut graph = FrameworkGraph::new();
    graph
        .with(
            "a_node",
            move |x: i32| {
                fired_in_transform.fetch_add(1, Ordering::SeqCst);
                x
            },
            Concurrency::Unlimited,
        )
        .transform(["x"])
        .to(["y"]);
    graph
        .with("b_node", |y: i32| y, Concurrency::Unlimited)
        .transform(["y"])
        .to(["x"]);

    let err = graph.finalize().unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }));
    assert!(err.is_wiring_error());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_product_type_is_a_runtime_mismatch() {
    let mut base = ProductStore::base();
    base.add_product("x", 1_i32);

    let mut graph = FrameworkGraph::with_base(base);
    graph
        .observe("read_as_double", |_x: f64| {}, Concurrency::Unlimited)
        .input_family(["x"]);

    let err = graph.finalize().unwrap().execute().await.unwrap_err();
    match &err {
        Error::Model(ModelError::ProductTypeMismatch {
            name,
            requested,
            stored,
        }) => {
            assert_eq!(name, "x");
            assert_eq!(*requested, "f64");
            assert_eq!(*stored, "i32");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_runtime_error());
}

#[tokio::test]
async fn failing_algorithm_drains_and_reports() {
    let mut graph = FrameworkGraph::new();
    event_source(&mut graph, 10);
    graph
        .with(
            "explode",
            |a: i32| {
                if a == 5 {
                    panic!("boom at 5");
                }
                a
            },
            Concurrency::Unlimited,
        )
        .transform(["a"])
        .to(["b"]);

    let err = graph.finalize().unwrap().execute().await.unwrap_err();
    match err {
        Error::Algorithm { node, cause } => {
            assert_eq!(node, "explode");
            assert!(cause.contains("boom at 5"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
