//! Error types for graph assembly and execution.
//!
//! Errors carry enough context to name the offending node, product, or
//! level. Configuration and wiring errors are fatal before any message
//! flows; runtime errors put the engine into draining mode, and the first
//! captured error is surfaced from `execute`.

use phlex_model::ModelError;
use thiserror::Error;

/// The main error type for Phlex operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration errors (E1xx)
    // =========================================================================
    /// Unknown option or type mismatch in configuration.
    #[error("E101: invalid configuration '{key}': {cause}")]
    Configuration {
        /// The configuration key at fault.
        key: String,
        /// Why the value was rejected.
        cause: String,
    },

    // =========================================================================
    // Wiring errors (E2xx)
    // =========================================================================
    /// An input product has no producer.
    #[error("E201: input product '{product}' of node '{node}' has no producer")]
    UnboundInput {
        /// The consuming node.
        node: String,
        /// The unresolvable product name.
        product: String,
    },

    /// Two producers declare the same output product.
    #[error("E202: output product '{product}' is declared by both '{first}' and '{second}'")]
    DuplicateOutput {
        /// The contested product name.
        product: String,
        /// The producer registered first.
        first: String,
        /// The producer registered second.
        second: String,
    },

    /// The producer graph is not a DAG.
    #[error("E203: product dependencies form a cycle involving nodes: {nodes:?}")]
    Cycle {
        /// The nodes involved in the cycle.
        nodes: Vec<String>,
    },

    /// An input is requested at a layer inconsistent with its producer.
    #[error(
        "E204: node '{node}' requests product '{product}' at layer '{requested}', \
         but it is produced at layer '{produced}'"
    )]
    LevelMismatch {
        /// The consuming node.
        node: String,
        /// The product name.
        product: String,
        /// The layer the consumer asked for.
        requested: String,
        /// The layer the producer emits at.
        produced: String,
    },

    // =========================================================================
    // Runtime errors (E3xx)
    // =========================================================================
    /// A product read failed (missing product or wrong type).
    #[error("E301: {0}")]
    Model(#[from] ModelError),

    /// A predicate product required by a node could not be resolved.
    #[error("E302: predicate '{predicate}' required by node '{node}' could not be resolved")]
    MissingPredicate {
        /// The gated node.
        node: String,
        /// The unresolvable predicate product.
        predicate: String,
    },

    /// A user algorithm failed.
    #[error("E303: algorithm '{node}' failed: {cause}")]
    Algorithm {
        /// The node whose algorithm failed.
        node: String,
        /// The failure description.
        cause: String,
    },

    // =========================================================================
    // Internal errors (E4xx)
    // =========================================================================
    /// A flush was released while descendant work was outstanding.
    ///
    /// This is a scheduler invariant violation, not a user error.
    #[error("E401: flush for level '{level}' released with outstanding descendant work")]
    FlushOrderingViolation {
        /// The level instance whose flush misfired.
        level: String,
    },
}

impl Error {
    /// Get the error code (e.g., "E201").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "E101",
            Self::UnboundInput { .. } => "E201",
            Self::DuplicateOutput { .. } => "E202",
            Self::Cycle { .. } => "E203",
            Self::LevelMismatch { .. } => "E204",
            Self::Model(_) => "E301",
            Self::MissingPredicate { .. } => "E302",
            Self::Algorithm { .. } => "E303",
            Self::FlushOrderingViolation { .. } => "E401",
        }
    }

    /// Check whether this error is a configuration or wiring error.
    ///
    /// Such errors are reported synchronously before any message flows.
    #[must_use]
    pub fn is_wiring_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::UnboundInput { .. }
                | Self::DuplicateOutput { .. }
                | Self::Cycle { .. }
                | Self::LevelMismatch { .. }
        )
    }

    /// Check whether this error was raised while messages were in flight.
    #[must_use]
    pub fn is_runtime_error(&self) -> bool {
        !self.is_wiring_error()
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_classification() {
        let err = Error::UnboundInput {
            node: "plus_one".to_string(),
            product: "a".to_string(),
        };
        assert_eq!(err.code(), "E201");
        assert!(err.is_wiring_error());
        assert!(!err.is_runtime_error());

        let err = Error::Algorithm {
            node: "plus_one".to_string(),
            cause: "boom".to_string(),
        };
        assert_eq!(err.code(), "E303");
        assert!(err.is_runtime_error());
    }

    #[test]
    fn model_errors_convert() {
        let err: Error = ModelError::MissingProduct {
            name: "a".to_string(),
        }
        .into();
        assert_eq!(err.code(), "E301");
        assert!(err.is_runtime_error());
    }

    #[test]
    fn display_names_participants() {
        let err = Error::DuplicateOutput {
            product: "b".to_string(),
            first: "plus_one".to_string(),
            second: "plus_two".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("'b'"));
        assert!(msg.contains("'plus_one'"));
        assert!(msg.contains("'plus_two'"));
    }
}
