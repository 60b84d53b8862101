//! Hierarchical configuration.
//!
//! A [`Configuration`] wraps a YAML document and exposes typed access by
//! dotted key path. Per-node option blocks live under `nodes.<name>` and
//! are applied by the registrar when the graph is finalized.

use crate::concurrency::Concurrency;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;

/// A hierarchical key→value configuration.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    root: Value,
}

impl Configuration {
    /// Create an empty configuration.
    #[must_use]
    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let root = serde_yaml::from_str(text).map_err(|e| Error::Configuration {
            key: "<document>".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// Wrap an already-parsed YAML value.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut current = &self.root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Read a typed value, or `None` if the key is absent.
    ///
    /// Fails with a configuration error if the value cannot be
    /// deserialized as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.lookup(key) {
            None => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::Configuration {
                    key: key.to_string(),
                    cause: e.to_string(),
                }),
        }
    }

    /// Read a typed value, falling back to `default` if the key is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Extract a subtree as its own configuration.
    #[must_use]
    pub fn section(&self, key: &str) -> Configuration {
        Configuration {
            root: self.lookup(key).cloned().unwrap_or(Value::Null),
        }
    }

    /// Read the option block for a node, keyed by its registration name.
    pub fn node_options(&self, node_name: &str) -> Result<NodeOptions> {
        let key = format!("nodes.{node_name}");
        match self.lookup(&key) {
            None => Ok(NodeOptions::default()),
            Some(value) => {
                serde_yaml::from_value(value.clone()).map_err(|e| Error::Configuration {
                    key,
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// Per-node options recognized in configuration.
///
/// Unknown option keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeOptions {
    /// Override the node's concurrency level.
    #[serde(default)]
    pub concurrency: Option<Concurrency>,
    /// Additional predicate products gating the node.
    #[serde(default)]
    pub predicates: Option<Vec<String>>,
    /// Rename the node's (single) output product.
    #[serde(default)]
    pub produces: Option<String>,
    /// Override the algorithm name.
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
scheduler:
  max_in_flight_stores: 4
nodes:
  plus_one:
    concurrency: unlimited
    predicates: [keep]
  sum:
    concurrency: 2
    produces: total
"#;

    #[test]
    fn dotted_lookup() {
        let cfg = Configuration::from_yaml(DOC).unwrap();
        assert!(cfg.has("scheduler.max_in_flight_stores"));
        assert!(!cfg.has("scheduler.absent"));
        assert_eq!(
            cfg.get::<usize>("scheduler.max_in_flight_stores").unwrap(),
            Some(4)
        );
        assert_eq!(cfg.get_or::<usize>("scheduler.queue_depth", 7).unwrap(), 7);
    }

    #[test]
    fn typed_get_rejects_wrong_types() {
        let cfg = Configuration::from_yaml(DOC).unwrap();
        let err = cfg.get::<Vec<String>>("scheduler.max_in_flight_stores");
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }

    #[test]
    fn node_options_parse() {
        let cfg = Configuration::from_yaml(DOC).unwrap();

        let opts = cfg.node_options("plus_one").unwrap();
        assert_eq!(opts.concurrency, Some(Concurrency::Unlimited));
        assert_eq!(opts.predicates.as_deref(), Some(&["keep".to_string()][..]));

        let opts = cfg.node_options("sum").unwrap();
        assert_eq!(opts.concurrency, Some(Concurrency::Bounded(2)));
        assert_eq!(opts.produces.as_deref(), Some("total"));

        let opts = cfg.node_options("unconfigured").unwrap();
        assert!(opts.concurrency.is_none());
    }

    #[test]
    fn unknown_node_option_is_rejected() {
        let cfg = Configuration::from_yaml("nodes:\n  x:\n    paralellism: 3\n").unwrap();
        assert!(matches!(
            cfg.node_options("x"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn section_extraction() {
        let cfg = Configuration::from_yaml(DOC).unwrap();
        let section = cfg.section("scheduler");
        assert_eq!(
            section.get::<usize>("max_in_flight_stores").unwrap(),
            Some(4)
        );
    }
}
