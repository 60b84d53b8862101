//! Per-node concurrency levels.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// How many invocations of a node may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One invocation at a time.
    Serial,
    /// No framework-imposed limit.
    Unlimited,
    /// At most `n` invocations in flight.
    Bounded(usize),
}

impl Concurrency {
    /// The number of permits to gate with, or `None` for unlimited.
    #[must_use]
    pub fn permits(&self) -> Option<usize> {
        match self {
            Self::Serial => Some(1),
            Self::Unlimited => None,
            Self::Bounded(n) => Some(*n),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Unlimited => write!(f, "unlimited"),
            Self::Bounded(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for Concurrency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Serial => serializer.serialize_str("serial"),
            Self::Unlimited => serializer.serialize_str("unlimited"),
            Self::Bounded(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Concurrency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(0) => Err(de::Error::custom("concurrency must be a positive integer")),
            Raw::Count(n) => Ok(Self::Bounded(n as usize)),
            Raw::Word(w) => match w.as_str() {
                "serial" => Ok(Self::Serial),
                "unlimited" => Ok(Self::Unlimited),
                other => Err(de::Error::custom(format!(
                    "unknown concurrency '{other}': expected 'serial', 'unlimited', or a positive integer"
                ))),
            },
        }
    }
}
