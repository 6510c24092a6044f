//! Structured query descriptions
//!
//! This module defines the typed form of an oracle-generated query. The
//! only way to build one from untrusted text is [`crate::ql::parser`],
//! which enforces the read-only allow-list.

use crate::core::document::Document;
use crate::core::store::SortKey;

/// A validated read request against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescription {
    /// The target collection
    pub collection: String,
    /// What to do with it
    pub operation: Operation,
}

/// The two allowed read operations
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A filtered read
    Find(FindSpec),
    /// An aggregation pipeline, passed to the store verbatim
    Aggregate {
        /// Ordered stages, each a single-key mapping
        pipeline: Vec<Document>,
    },
}

impl Operation {
    /// The operation name as it appears in query documents
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Find(_) => "find",
            Operation::Aggregate { .. } => "aggregate",
        }
    }
}

/// Parameters of a `find` operation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindSpec {
    /// Filter document; empty matches everything
    pub filter: Document,
    /// Projection document; empty keeps every field
    pub projection: Document,
    /// Sort keys in priority order
    pub sort: Vec<SortKey>,
    /// Maximum number of results
    pub limit: Option<u64>,
}
