//! Built-in demo algorithms addressable from job documents.
//!
//! The catalog is intentionally small: enough to run the programming
//! model end-to-end from a YAML file. Products are `i64` throughout.

use crate::job::{AlgorithmSpec, SourceSpec, ValueKeyword, ValueSpec};
use phlex_core::{Concurrency, FrameworkGraph};
use phlex_model::{ProductStore, Products};
use std::sync::Arc;

/// Register the job document's source on the graph.
pub fn register_source(graph: &mut FrameworkGraph, spec: &SourceSpec) {
    let mut builder = graph.source(spec.name.as_str());

    for provide in &spec.provide {
        builder = match provide.value {
            ValueSpec::Keyword(ValueKeyword::Index) => {
                builder.provide(provide.product.as_str(), |id| id.number() as i64)
            }
            ValueSpec::Keyword(ValueKeyword::Parity) => {
                builder.provide(provide.product.as_str(), |id| id.number() % 2 == 0)
            }
            ValueSpec::Constant(value) => {
                builder.provide(provide.product.as_str(), move |_id| value)
            }
        };
    }

    if spec.events == 0 {
        builder.finish();
        return;
    }

    let events = spec.events;
    let name = spec.name.clone();
    builder.emit(move |job: Arc<ProductStore>| {
        (1..=events).map(move |n| job.make_child(n, "event", name.clone(), Products::new()))
    });
}

/// Register one catalog algorithm under the given node name.
pub fn register(graph: &mut FrameworkGraph, name: &str, spec: &AlgorithmSpec) {
    match spec {
        AlgorithmSpec::PlusOne { input, output, offset } => {
            let offset = *offset;
            graph
                .with(name, move |a: i64| a + offset, Concurrency::Unlimited)
                .transform([input.as_str()])
                .to([output.as_str()]);
        }
        AlgorithmSpec::Add { inputs, output } => {
            graph
                .with(name, |i: i64, j: i64| i + j, Concurrency::Unlimited)
                .transform([inputs[0].as_str(), inputs[1].as_str()])
                .to([output.as_str()]);
        }
        AlgorithmSpec::Sum { input, output, over } => {
            graph
                .reduce(
                    name,
                    |acc: &mut i64, x: i64| *acc += x,
                    |acc: i64| acc,
                    Concurrency::Unlimited,
                )
                .for_each(over.as_str())
                .input_family([input.as_str()])
                .output([output.as_str()]);
        }
        AlgorithmSpec::Print { input } => {
            let product = input.clone();
            graph
                .observe(
                    name,
                    move |value: i64| println!("{product} = {value}"),
                    Concurrency::Serial,
                )
                .input_family([input.as_str()]);
        }
        AlgorithmSpec::Sink { inputs } => {
            graph
                .output(
                    name,
                    |store: &ProductStore| {
                        let mut names: Vec<&str> = store.products().names().collect();
                        names.sort_unstable();
                        println!("{} carries [{}]", store.id(), names.join(", "));
                    },
                    Concurrency::Serial,
                )
                .input_family(inputs.iter().map(String::as_str));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ProvideSpec;

    #[test]
    fn source_with_providers_wires_products() {
        let mut graph = FrameworkGraph::new();
        register_source(
            &mut graph,
            &SourceSpec {
                name: "gen".to_string(),
                events: 3,
                provide: vec![ProvideSpec {
                    product: "a@event".to_string(),
                    value: ValueSpec::Keyword(ValueKeyword::Index),
                }],
            },
        );
        register(
            &mut graph,
            "double",
            &AlgorithmSpec::PlusOne {
                input: "a".to_string(),
                output: "b".to_string(),
                offset: 1,
            },
        );

        let wired = graph.finalize().unwrap();
        assert_eq!(wired.producer_of("a"), Some("gen"));
        assert_eq!(wired.producer_of("b"), Some("double"));
    }
}
