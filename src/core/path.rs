//! Field paths for ledgerql documents
//!
//! This module defines the FieldPath structure, which addresses a field
//! inside a stored document using dot notation (e.g. "categoryInfo.name"
//! or "items.0.price").

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use serde_json::{Map, Value};

/// Errors that can occur when working with field paths
#[derive(Error, Debug, PartialEq)]
pub enum PathError {
    #[error("Invalid field path: {0}")]
    InvalidFormat(String),
    #[error("Empty field path")]
    EmptyPath,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment(String);

impl PathSegment {
    /// Create a new path segment
    pub fn new<S: Into<String>>(segment: S) -> Self {
        PathSegment(segment.into())
    }

    /// Get the segment as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the array index if this segment is numeric
    pub fn as_index(&self) -> Option<usize> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }

    /// Step into a value by this segment
    fn step<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match value {
            Value::Object(map) => map.get(&self.0),
            Value::Array(items) => self.as_index().and_then(|idx| items.get(idx)),
            _ => None,
        }
    }
}

/// A dotted path to a field inside a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Get the number of segments in the path
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the path is empty
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get all segments in the path
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Get a specific segment by index
    pub fn segment(&self, index: usize) -> Option<&PathSegment> {
        self.segments.get(index)
    }

    /// Check if this path starts with the given prefix path
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        prefix.len() <= self.len() && self.segments[..prefix.len()] == prefix.segments[..]
    }

    /// Follow the path strictly: numeric segments index arrays, nothing fans out
    pub fn get<'a>(&self, document: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = document.get(first.as_str())?;
        for segment in rest {
            current = segment.step(current)?;
        }
        Some(current)
    }

    /// Follow the path, fanning out over arrays of sub-documents.
    ///
    /// `items.price` on `{"items": [{"price": 1}, {"price": 2}]}` yields both
    /// prices. Missing fields yield nothing.
    pub fn lookup<'a>(&self, document: &'a Map<String, Value>) -> Vec<&'a Value> {
        let Some((first, rest)) = self.segments.split_first() else {
            return Vec::new();
        };
        let Some(start) = document.get(first.as_str()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        collect_values(start, rest, &mut out);
        out
    }

    /// Resolve the path the way aggregation expressions do: fanned-out
    /// values come back as an array, a single hit as itself.
    pub fn resolve(&self, document: &Map<String, Value>) -> Option<Value> {
        if let Some(value) = self.get(document) {
            return Some(value.clone());
        }
        let found = self.lookup(document);
        if found.is_empty() {
            None
        } else {
            Some(Value::Array(found.into_iter().cloned().collect()))
        }
    }

    /// Set a value at this path, creating intermediate objects as needed
    pub fn set(&self, document: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };

        let mut current = document;
        for segment in parents {
            let entry = current
                .entry(segment.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.as_str().to_string(), value);
    }

    /// Remove the value at this path, returning it if present
    pub fn remove(&self, document: &mut Map<String, Value>) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;

        let mut current = document;
        for segment in parents {
            current = match current.get_mut(segment.as_str()) {
                Some(Value::Object(map)) => map,
                _ => return None,
            };
        }
        current.remove(last.as_str())
    }
}

fn collect_values<'a>(value: &'a Value, rest: &[PathSegment], out: &mut Vec<&'a Value>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(_) => {
            if let Some(next) = segment.step(value) {
                collect_values(next, tail, out);
            }
        }
        Value::Array(items) => {
            if let Some(next) = segment.step(value) {
                collect_values(next, tail, out);
            } else {
                for item in items {
                    if item.is_object() {
                        collect_values(item, rest, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Parse a string into a FieldPath
impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let segments: Vec<PathSegment> = s.split('.').map(PathSegment::new).collect();
        if segments.iter().any(|seg| seg.as_str().is_empty()) {
            return Err(PathError::InvalidFormat(s.to_string()));
        }

        Ok(FieldPath { segments })
    }
}

/// Format a FieldPath as a string with dot separators
impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path_str = self.segments
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(".");

        write!(f, "{}", path_str)
    }
}
