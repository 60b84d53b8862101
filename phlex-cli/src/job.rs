//! The YAML job document.
//!
//! A job document names a source, a set of catalog algorithms, and the
//! standard per-node option blocks consumed by the registrar:
//!
//! ```yaml
//! source:
//!   name: gen
//!   events: 10
//!   provide:
//!     - product: a@event
//!       value: index
//!
//! algorithms:
//!   plus_one:
//!     kind: plus_one
//!     input: a
//!     output: b
//!   show:
//!     kind: print
//!     input: b
//!
//! nodes:
//!   plus_one:
//!     concurrency: 4
//!
//! scheduler:
//!   max_in_flight_stores: 8
//! ```

use crate::builtins;
use phlex_core::{Configuration, Error, FrameworkGraph, WiredGraph};
use phlex_model::ProductLabel;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The parsed job document.
#[derive(Debug, Deserialize)]
pub struct JobSpec {
    /// The source driving the graph.
    #[serde(default)]
    pub source: SourceSpec,
    /// Catalog algorithms, keyed by node name.
    #[serde(default)]
    pub algorithms: BTreeMap<String, AlgorithmSpec>,
}

/// The source block of a job document.
#[derive(Debug, Deserialize)]
pub struct SourceSpec {
    /// The source's algorithm name.
    #[serde(default = "default_source_name")]
    pub name: String,
    /// Number of event stores to emit under the job.
    #[serde(default)]
    pub events: usize,
    /// Per-product providers evaluated against each emitted level ID.
    #[serde(default)]
    pub provide: Vec<ProvideSpec>,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            events: 0,
            provide: Vec::new(),
        }
    }
}

fn default_source_name() -> String {
    "generator".to_string()
}

/// One provider: a product label plus the value it yields per level ID.
#[derive(Debug, Deserialize)]
pub struct ProvideSpec {
    /// The provided product, optionally layer-qualified (`a@event`).
    pub product: String,
    /// How the value is derived from the level ID.
    pub value: ValueSpec,
}

/// Provider value rules.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    /// A keyword rule (`index` or `parity`).
    Keyword(ValueKeyword),
    /// A constant integer.
    Constant(i64),
}

/// Keyword provider rules.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKeyword {
    /// The level number, as an integer.
    Index,
    /// True for even level numbers.
    Parity,
}

/// One catalog algorithm instance.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlgorithmSpec {
    /// `output = input + offset` (offset defaults to 1).
    PlusOne {
        /// Input product name.
        input: String,
        /// Output product name.
        output: String,
        /// Added constant.
        #[serde(default = "default_offset")]
        offset: i64,
    },
    /// `output = inputs[0] + inputs[1]`.
    Add {
        /// The two input product names.
        inputs: [String; 2],
        /// Output product name.
        output: String,
    },
    /// Sum the input over descendants of a level instance.
    Sum {
        /// Input product name.
        input: String,
        /// Committed output product name.
        output: String,
        /// Partition level (defaults to `job`).
        #[serde(default = "default_over")]
        over: String,
    },
    /// Print each value of a product.
    Print {
        /// Input product name.
        input: String,
    },
    /// Terminal consumer printing the carrying store.
    Sink {
        /// Input product names.
        inputs: Vec<String>,
    },
}

fn default_offset() -> i64 {
    1
}

fn default_over() -> String {
    "job".to_string()
}

/// Parse a job document and assemble the wired graph.
pub fn load_str(text: &str) -> Result<WiredGraph, Error> {
    let config = Configuration::from_yaml(text)?;
    let spec: JobSpec = serde_yaml::from_str(text).map_err(|e| Error::Configuration {
        key: "<document>".to_string(),
        cause: e.to_string(),
    })?;

    for provide in &spec.source.provide {
        provide
            .product
            .parse::<ProductLabel>()
            .map_err(|e| Error::Configuration {
                key: format!("source.provide.{}", provide.product),
                cause: e.to_string(),
            })?;
    }

    let mut graph = FrameworkGraph::new().configured(config);
    builtins::register_source(&mut graph, &spec.source);
    for (name, algorithm) in &spec.algorithms {
        builtins::register(&mut graph, name, algorithm);
    }
    graph.finalize()
}

/// Parse a job document from a file and assemble the wired graph.
pub fn load_file(path: &Path) -> Result<WiredGraph, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
        key: path.display().to_string(),
        cause: e.to_string(),
    })?;
    load_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"
source:
  name: gen
  events: 10
  provide:
    - product: a@event
      value: index

algorithms:
  plus_one:
    kind: plus_one
    input: a
    output: b
  total:
    kind: sum
    input: b
    output: b_total
  show:
    kind: print
    input: b_total

nodes:
  plus_one:
    concurrency: 4
"#;

    #[test]
    fn demo_document_wires() {
        let wired = load_str(DEMO).unwrap();
        assert_eq!(wired.producer_of("a"), Some("gen"));
        assert_eq!(wired.producer_of("b"), Some("plus_one"));
        assert_eq!(wired.producer_of("b_total"), Some("total"));
    }

    #[test]
    fn node_options_reach_the_registrar() {
        let wired = load_str(DEMO).unwrap();
        let plus_one = wired.nodes().find(|n| n.name() == "plus_one").unwrap();
        assert_eq!(
            plus_one.concurrency(),
            phlex_core::Concurrency::Bounded(4)
        );
    }

    #[test]
    fn unknown_algorithm_kind_is_rejected() {
        let doc = r#"
algorithms:
  mystery:
    kind: teleport
    input: a
"#;
        let err = load_str(doc).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn unbound_input_fails_at_load() {
        let doc = r#"
algorithms:
  plus_one:
    kind: plus_one
    input: a
    output: b
"#;
        let err = load_str(doc).unwrap_err();
        assert!(matches!(err, Error::UnboundInput { .. }));
    }

    #[test]
    fn constant_and_parity_providers_parse() {
        let doc = r#"
source:
  events: 2
  provide:
    - product: x@event
      value: 7
    - product: keep@event
      value: parity

algorithms:
  show:
    kind: print
    input: x
"#;
        assert!(load_str(doc).is_ok());
    }

    #[test]
    fn malformed_provider_label_is_rejected() {
        let doc = r#"
source:
  events: 1
  provide:
    - product: "x@"
      value: index
"#;
        assert!(matches!(load_str(doc), Err(Error::Configuration { .. })));
    }

    #[test]
    fn load_file_reads_documents() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEMO.as_bytes()).unwrap();
        assert!(load_file(file.path()).is_ok());
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = load_file(Path::new("/nonexistent/job.yaml")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
