//! Hierarchical level identifiers.

use std::fmt;
use std::sync::Arc;

/// One segment of a level path: the level name plus an instance number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Segment {
    name: String,
    number: usize,
}

/// An immutable path identifying one position in the nesting hierarchy.
///
/// A level ID is an ordered list of (level-name, level-number) segments.
/// The root is depth 0 and named `"job"` by convention. IDs are never
/// mutated after construction; [`LevelId::make_child`] returns a new ID
/// extending the receiver by one segment. Two IDs compare equal iff every
/// segment matches, so repeated `make_child` calls with identical
/// arguments yield equal IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelId {
    segments: Vec<Segment>,
}

impl LevelId {
    /// The level name of the root segment.
    pub const ROOT_NAME: &'static str = "job";

    /// Create the root ID (`"job"`, depth 0).
    #[must_use]
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            segments: vec![Segment {
                name: Self::ROOT_NAME.to_string(),
                number: 0,
            }],
        })
    }

    /// Create a child ID by appending a `(name, number)` segment.
    ///
    /// The receiver is not modified.
    #[must_use]
    pub fn make_child(&self, number: usize, name: impl Into<String>) -> Arc<Self> {
        let mut segments = self.segments.clone();
        segments.push(Segment {
            name: name.into(),
            number,
        });
        Arc::new(Self { segments })
    }

    /// The depth of this ID; the root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// The level name of the last segment.
    #[must_use]
    pub fn level_name(&self) -> &str {
        &self.segments[self.segments.len() - 1].name
    }

    /// The level number of the last segment.
    #[must_use]
    pub fn number(&self) -> usize {
        self.segments[self.segments.len() - 1].number
    }

    /// The ID of the enclosing level, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<LevelId> {
        if self.segments.len() == 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Check whether this ID is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &LevelId) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// The number of segments shared with `other`, counting from the root.
    #[must_use]
    pub fn common_prefix_len(&self, other: &LevelId) -> usize {
        self.segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// The prefix of this ID ending at the nearest segment named `level_name`,
    /// searching from the innermost segment outward.
    #[must_use]
    pub fn at_level(&self, level_name: &str) -> Option<LevelId> {
        let idx = self.segments.iter().rposition(|s| s.name == level_name)?;
        Some(Self {
            segments: self.segments[..=idx].to_vec(),
        })
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments[0].name)?;
        for segment in &self.segments[1..] {
            write!(f, "/{}:{}", segment.name, segment.number)?;
        }
        Ok(())
    }
}
