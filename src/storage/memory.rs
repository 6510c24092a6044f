//! In-memory store for ledgerql
//!
//! This module provides a document store held entirely in memory, keyed
//! by collection name. It can be seeded from a JSON fixture of the form
//! `{"Collection": [documents...]}`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::debug;
use serde_json::Value;

use crate::core::document::Document;
use crate::core::errors::{Result, StoreError};
use crate::core::store::{Connection, Connector, FindRequest};
use crate::ql::evaluator;
use crate::ql::pipeline::{loader_from, run_pipeline};

type Collections = HashMap<String, Vec<Document>>;

/// An in-memory document store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Build a store from a fixture value
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fixture) = value else {
            return Err(StoreError::Serialization(
                "fixture must be an object mapping collection names to arrays".to_string(),
            ));
        };

        let store = MemoryStore::new();
        for (collection, documents) in fixture {
            store.insert_many(&collection, to_documents(&collection, documents)?)?;
        }
        Ok(store)
    }

    /// Build a store from a fixture file
    pub fn from_fixture_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Connection(format!("cannot read fixture {}: {}", path.display(), e)))?;
        let store = Self::from_value(serde_json::from_str(&text)?)?;
        debug!("Loaded fixture {} ({} collections)", path.display(), store.collections()?.len());
        Ok(store)
    }

    /// Append documents to a collection, creating it if needed
    pub fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))?;
        let count = documents.len();
        collections.entry(collection.to_string()).or_default().extend(documents);
        Ok(count)
    }

    /// Names of all collections, sorted
    pub fn collections(&self) -> Result<Vec<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Check that a fixture entry is an array of objects
pub(crate) fn to_documents(collection: &str, documents: Value) -> Result<Vec<Document>> {
    let Value::Array(items) = documents else {
        return Err(StoreError::Serialization(format!(
            "collection '{}' must be an array of documents",
            collection
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(document) => Ok(document),
            other => Err(StoreError::Serialization(format!(
                "collection '{}' contains a non-document value: {}",
                collection, other
            ))),
        })
        .collect()
}

impl Connector for MemoryStore {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MemoryConnection {
            collections: Some(Arc::clone(&self.collections)),
        }))
    }

    fn describe(&self) -> String {
        "memory store".to_string()
    }
}

/// A read connection to a [`MemoryStore`]
struct MemoryConnection {
    collections: Option<Arc<RwLock<Collections>>>,
}

impl MemoryConnection {
    fn read<T>(&self, f: impl FnOnce(&Collections) -> Result<T>) -> Result<T> {
        let collections = self
            .collections
            .as_ref()
            .ok_or_else(|| StoreError::Connection("connection is closed".to_string()))?;
        let guard = collections
            .read()
            .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))?;
        f(&*guard)
    }
}

impl Connection for MemoryConnection {
    fn aggregate(&mut self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        self.read(|collections| {
            let documents = collections.get(collection).cloned().unwrap_or_default();
            let mut load = loader_from(collections);
            run_pipeline(documents, pipeline, &mut load)
        })
    }

    fn fetch(&mut self, request: &FindRequest) -> Result<Vec<Document>> {
        self.read(|collections| {
            let documents = collections.get(&request.collection).cloned().unwrap_or_default();
            evaluator::find(documents, request)
        })
    }

    fn close(&mut self) {
        self.collections = None;
    }
}
