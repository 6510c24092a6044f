//! ledgerql: read-only query gateway for oracle-generated business queries
//!
//! A language model (the oracle) proposes a structured query description
//! for a question about a small business's inventory, sales, expenses and
//! ledgers. This crate resolves the symbolic dates in that description,
//! validates that it is a `find` or `aggregate` read, runs it against a
//! document store and returns the records or a one-line error.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledgerql::{MemoryStore, QueryGateway};
//!
//! let store = MemoryStore::from_fixture_file("demos/fixtures/shop.json")?;
//! let gateway = QueryGateway::new(Arc::new(store));
//! println!("{}", gateway.run(r#"{"collection": "Inventory", "operation": "find"}"#));
//! # Ok::<(), ledgerql::StoreError>(())
//! ```

pub mod core;
pub mod oracle;
pub mod placeholder;
pub mod ql;
pub mod storage;

pub use crate::core::config::{OracleSettings, Settings, StoreUri, UnresolvedPolicy};
pub use crate::core::document::Document;
pub use crate::core::errors::{
    ConfigError, ErrorCategory, GatewayError, GatewayResult, OracleError, PlaceholderError, Result, StoreError,
};
pub use crate::core::store::{Connection, Connector};
pub use oracle::{Assistant, ChatOracle, Oracle, PromptBundle};
pub use placeholder::Resolver;
pub use ql::{QueryDescription, QueryGateway};
pub use storage::{open_store, MemoryStore, PersistentStore};
#[cfg(feature = "mongodb")]
pub use storage::RemoteStore;
