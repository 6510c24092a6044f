pub mod config;
pub mod document;
pub mod errors;
pub mod path;
pub mod store;


pub use config::{Settings, StoreUri, UnresolvedPolicy};
pub use document::Document;
pub use errors::{GatewayError, PlaceholderError, Result, StoreError};
pub use path::FieldPath;
pub use store::{Connection, Connector, Cursor, FindRequest, Lease, SortDirection, SortKey};
