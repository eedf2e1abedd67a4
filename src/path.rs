//! Dotted-path addressing into nested JSON payloads.
//!
//! A path such as `response.items.0.status` walks mappings by key and
//! sequences by numeric segment. Resolution never fails loudly: any segment
//! that does not apply to the value at hand yields `None`.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Represents a path to a field in structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// An all-digit segment: indexes sequences, or keys mappings
    Numeric(String),
}

impl PathSegment {
    fn parse(segment: &str) -> Self {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            PathSegment::Numeric(segment.to_string())
        } else {
            PathSegment::Field(segment.to_string())
        }
    }

    fn key(&self) -> &str {
        match self {
            PathSegment::Field(name) | PathSegment::Numeric(name) => name,
        }
    }

    /// Step from `current` into the child this segment names
    fn step<'a>(&self, current: &'a Value) -> Option<&'a Value> {
        match (self, current) {
            (PathSegment::Numeric(digits), Value::Array(items)) => {
                digits.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (_, Value::Object(map)) => map.get(self.key()),
            _ => None,
        }
    }
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use telepipe::FieldPath;
    ///
    /// let path = FieldPath::parse("user.address.city", ".");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path.split(delimiter).map(PathSegment::parse).collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a dotted string (common format)
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    /// Walk `container` along this path.
    ///
    /// Traversal is bounded by the number of segments.
    pub fn resolve<'a>(&self, container: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(container, |current, segment| segment.step(current))
    }

    /// Resolve against a top-level ordered map (record metadata, for instance)
    pub fn resolve_in<'a>(&self, map: &'a IndexMap<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let root = map.get(first.key())?;
        rest.iter()
            .try_fold(root, |current, segment| segment.step(current))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Resolve a dotted path against a JSON container in one call
pub fn resolve<'a>(container: &'a Value, dotted_path: &str) -> Option<&'a Value> {
    FieldPath::from_dotted(dotted_path).resolve(container)
}
