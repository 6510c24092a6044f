//! Query layer for ledgerql
//!
//! This module turns oracle-generated query text into validated read
//! requests and runs them: parsing and validation, the in-process query
//! evaluator and aggregation pipeline, and the gateway that ties them to a
//! store connection.

pub mod ast;
pub mod evaluator;
pub mod gateway;
pub mod parser;
pub mod pipeline;

pub use ast::{FindSpec, Operation, QueryDescription};
pub use gateway::QueryGateway;
pub use parser::{parse_query, unwrap_fence};
