//! Error types for the data model.

use thiserror::Error;

/// Errors raised when reading products from a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No product with the requested name exists on the store or any ancestor.
    #[error("cannot get product '{name}': no product with that name is available")]
    MissingProduct {
        /// The requested product name.
        name: String,
    },

    /// A product exists under the requested name but holds a different type.
    #[error("cannot get product '{name}' with type '{requested}' -- must specify type '{stored}'")]
    ProductTypeMismatch {
        /// The requested product name.
        name: String,
        /// The type the caller asked for.
        requested: &'static str,
        /// The type actually stored under the name.
        stored: &'static str,
    },
}

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_both_types() {
        let err = ModelError::ProductTypeMismatch {
            name: "energy".to_string(),
            requested: "f64",
            stored: "i32",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("'energy'"));
        assert!(msg.contains("'f64'"));
        assert!(msg.contains("'i32'"));
    }
}
