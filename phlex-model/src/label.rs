//! Product labels used to address inputs and outputs.

use std::fmt;
use std::str::FromStr;

/// A product name with an optional layer qualifier.
///
/// Labels are written `"name"` or `"name@layer"`, where the layer refers
/// to a canonical level name such as `"job"` or `"event"`. The layer
/// participates in wiring checks only; at read time, resolution is purely
/// by name through lexical inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductLabel {
    /// The product name.
    pub name: String,
    /// The layer the product is associated with, if specified.
    pub layer: Option<String>,
}

impl ProductLabel {
    /// Create an unqualified label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer: None,
        }
    }

    /// Attach a layer qualifier.
    #[must_use]
    pub fn in_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }
}

impl fmt::Display for ProductLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{}@{}", self.name, layer),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for ProductLabel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((name, layer)) => {
                if name.is_empty() {
                    return Err("product name cannot be empty");
                }
                if layer.is_empty() {
                    return Err("layer name cannot be empty");
                }
                Ok(Self::new(name).in_layer(layer))
            }
            None => {
                if s.is_empty() {
                    return Err("product name cannot be empty");
                }
                Ok(Self::new(s))
            }
        }
    }
}

impl From<&str> for ProductLabel {
    /// Parse a label, panicking on an empty name.
    ///
    /// Registration builders accept `&str` for ergonomics; an empty label
    /// is a programming error at the registration site.
    fn from(s: &str) -> Self {
        s.parse().expect("invalid product label")
    }
}

impl From<String> for ProductLabel {
    fn from(s: String) -> Self {
        s.as_str().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unqualified() {
        let label = ProductLabel::from_str("sum").unwrap();
        assert_eq!(label.name, "sum");
        assert_eq!(label.layer, None);
    }

    #[test]
    fn parse_with_layer() {
        let label = ProductLabel::from_str("i@job").unwrap();
        assert_eq!(label.name, "i");
        assert_eq!(label.layer.as_deref(), Some("job"));
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!(ProductLabel::from_str("").is_err());
        assert!(ProductLabel::from_str("@job").is_err());
        assert!(ProductLabel::from_str("x@").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for text in ["sum", "i@job", "total@event"] {
            let label = ProductLabel::from_str(text).unwrap();
            assert_eq!(label.to_string(), text);
        }
    }
}
