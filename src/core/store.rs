//! Store boundary
//!
//! The gateway talks to a document store through two traits: a
//! [`Connector`] hands out connections, a [`Connection`] runs reads.
//! A [`Lease`] owns one connection for the duration of a single call and
//! closes it when dropped.

use std::fmt;

use serde_json::Value;

use crate::core::document::Document;
use crate::core::errors::Result;

/// Direction of one sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Read a `1` / `-1` direction value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_f64() {
            Some(d) if d == 1.0 => Some(SortDirection::Ascending),
            Some(d) if d == -1.0 => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

/// One (field, direction) pair of a multi-key sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new<S: Into<String>>(field: S, direction: SortDirection) -> Self {
        SortKey { field: field.into(), direction }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{} asc", self.field),
            SortDirection::Descending => write!(f, "{} desc", self.field),
        }
    }
}

/// A filtered read with everything the cursor accumulated before materialization
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub collection: String,
    pub filter: Document,
    pub projection: Document,
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
}

/// A live connection to a document store
pub trait Connection: Send {
    /// Run an aggregation pipeline over a collection
    fn aggregate(&mut self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>>;

    /// Materialize a filtered read
    fn fetch(&mut self, request: &FindRequest) -> Result<Vec<Document>>;

    /// Release the connection. Called exactly once, by the owning [`Lease`].
    fn close(&mut self) {}
}

/// Trait defining how a store hands out connections
pub trait Connector: Send + Sync {
    /// Acquire a connection for one call
    fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Short human-readable description, safe to log
    fn describe(&self) -> String;
}

/// A connection scoped to a single call
pub struct Lease {
    connection: Box<dyn Connection>,
}

impl Lease {
    /// Acquire a connection from the connector
    pub fn acquire(connector: &dyn Connector) -> Result<Self> {
        let connection = connector.connect()?;
        Ok(Lease { connection })
    }

    /// Run an aggregation pipeline, materializing every result
    pub fn aggregate(&mut self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        self.connection.aggregate(collection, pipeline)
    }

    /// Start a filtered read; sort and limit may be chained before `to_vec`
    pub fn find(&mut self, collection: &str, filter: Document, projection: Document) -> Cursor<'_> {
        Cursor {
            connection: &mut self.connection,
            request: FindRequest {
                collection: collection.to_string(),
                filter,
                projection,
                sort: Vec::new(),
                limit: None,
            },
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// A pending filtered read
pub struct Cursor<'a> {
    connection: &'a mut Box<dyn Connection>,
    request: FindRequest,
}

impl<'a> Cursor<'a> {
    /// Order results by the given keys, first key highest priority
    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.request.sort = keys;
        self
    }

    /// Cap the number of results
    pub fn limit(mut self, limit: u64) -> Self {
        self.request.limit = Some(limit);
        self
    }

    /// The request as it stands
    pub fn request(&self) -> &FindRequest {
        &self.request
    }

    /// Materialize the results. The cursor is consumed.
    pub fn to_vec(self) -> Result<Vec<Document>> {
        self.connection.fetch(&self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        closed: Arc<AtomicUsize>,
        seen: Arc<std::sync::Mutex<Option<FindRequest>>>,
    }

    impl Connection for Recorder {
        fn aggregate(&mut self, _collection: &str, _pipeline: &[Document]) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }

        fn fetch(&mut self, request: &FindRequest) -> Result<Vec<Document>> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(Vec::new())
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingConnector {
        closed: Arc<AtomicUsize>,
        seen: Arc<std::sync::Mutex<Option<FindRequest>>>,
    }

    impl Connector for RecordingConnector {
        fn connect(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(Recorder { closed: self.closed.clone(), seen: self.seen.clone() }))
        }

        fn describe(&self) -> String {
            "recorder".to_string()
        }
    }

    #[test]
    fn test_sort_direction_from_value() {
        assert_eq!(SortDirection::from_value(&json!(1)), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_value(&json!(-1)), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_value(&json!(-1.0)), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_value(&json!("desc")), None);
        assert_eq!(SortDirection::from_value(&json!(2)), None);
    }

    #[test]
    fn test_cursor_carries_sort_and_limit() {
        let closed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(std::sync::Mutex::new(None));
        let connector = RecordingConnector { closed: closed.clone(), seen: seen.clone() };

        {
            let mut lease = Lease::acquire(&connector).unwrap();
            lease
                .find("Inventory", Document::new(), Document::new())
                .sort(vec![SortKey::new("price", SortDirection::Descending)])
                .limit(3)
                .to_vec()
                .unwrap();
            assert_eq!(closed.load(Ordering::SeqCst), 0);
        }

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.collection, "Inventory");
        assert_eq!(request.sort, vec![SortKey::new("price", SortDirection::Descending)]);
        assert_eq!(request.limit, Some(3));
    }
}
