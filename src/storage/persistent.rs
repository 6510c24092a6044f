// src/storage/persistent.rs

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use sled::Db;

use crate::core::document::Document;
use crate::core::errors::{Result, StoreError};
use crate::core::store::{Connection, Connector, FindRequest};
use crate::ql::evaluator;
use crate::ql::pipeline::run_pipeline;

/// A persistent document store using sled.
///
/// Each collection is a sled tree. Keys are ids from `generate_id`,
/// big-endian so iteration follows insertion order; values are documents
/// encoded as JSON.
#[derive(Clone)]
pub struct PersistentStore {
    db: Arc<Db>,
    path: PathBuf,
}

impl PersistentStore {
    /// Open a persistent store at the given path
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let db = sled::open(&path)
            .map_err(|e| StoreError::Connection(format!("Failed to open database {}: {}", path.display(), e)))?;
        debug!("Opened sled store at {}", path.display());
        Ok(PersistentStore { db: Arc::new(db), path })
    }

    /// Append documents to a collection. This is the only write path and is
    /// not reachable through the query gateway.
    pub fn import(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        if collection.is_empty() {
            return Err(StoreError::InvalidOperation("Collection name must not be empty".to_string()));
        }

        let tree = self.db.open_tree(collection)?;
        let mut batch = sled::Batch::default();
        let count = documents.len();
        for document in &documents {
            let id = self.db.generate_id()?;
            batch.insert(id.to_be_bytes().to_vec(), serde_json::to_vec(document)?);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;

        info!("Imported {} documents into '{}'", count, collection);
        Ok(count)
    }

    /// Names of all collections, sorted
    pub fn collections(&self) -> Result<Vec<String>> {
        let default = self.db.name();
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter(|name| *name != default)
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Read every document of a collection in insertion order. Unknown
    /// collections read as empty and are not created.
    pub fn load(&self, collection: &str) -> Result<Vec<Document>> {
        if !self.contains(collection) {
            return Ok(Vec::new());
        }

        let tree = self.db.open_tree(collection)?;
        let mut documents = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_, bytes) = item?;
            documents.push(serde_json::from_slice(&bytes)?);
        }
        Ok(documents)
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        if !self.contains(collection) {
            return Ok(0);
        }
        Ok(self.db.open_tree(collection)?.len())
    }

    fn contains(&self, collection: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|name| {
                let bytes: &[u8] = name;
                bytes == collection.as_bytes()
            })
    }
}

impl Connector for PersistentStore {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(PersistentConnection { store: Some(self.clone()) }))
    }

    fn describe(&self) -> String {
        format!("sled store at {}", self.path.display())
    }
}

/// A read-only connection to a [`PersistentStore`]
struct PersistentConnection {
    store: Option<PersistentStore>,
}

impl PersistentConnection {
    fn store(&self) -> Result<&PersistentStore> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Connection("connection is closed".to_string()))
    }
}

impl Connection for PersistentConnection {
    fn aggregate(&mut self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        let store = self.store()?;
        let documents = store.load(collection)?;
        let mut load = |name: &str| store.load(name);
        run_pipeline(documents, pipeline, &mut load)
    }

    fn fetch(&mut self, request: &FindRequest) -> Result<Vec<Document>> {
        let store = self.store()?;
        evaluator::find(store.load(&request.collection)?, request)
    }

    fn close(&mut self) {
        self.store = None;
    }
}
