// src/storage/remote.rs

use log::{debug, info};
use mongodb::bson::{self, Bson, Document as BsonDocument};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Database};
use serde_json::Value;

use crate::core::config::StoreUri;
use crate::core::document::Document;
use crate::core::errors::{Result, StoreError};
use crate::core::store::{Connection, Connector, FindRequest, SortDirection, SortKey};

/// A MongoDB server reached through the driver's synchronous client.
///
/// The database is the one named in the URI path. Pipelines and filters are
/// handed to the server as written; nothing is evaluated locally.
pub struct RemoteStore {
    client: Client,
    database: String,
    redacted: String,
}

impl RemoteStore {
    /// Build a client for a `mongodb://` or `mongodb+srv://` URI. The driver
    /// connects lazily, so an unreachable server surfaces on the first read.
    pub fn open(uri: &str) -> Result<Self> {
        let redacted = StoreUri::Remote(uri.to_string()).redacted();
        let client = Client::with_uri_str(uri)
            .map_err(|e| StoreError::Connection(format!("Invalid remote URI {}: {}", redacted, e.kind)))?;
        let database = client
            .default_database()
            .map(|db| db.name().to_string())
            .ok_or_else(|| StoreError::Connection(format!("No database named in {}", redacted)))?;

        info!("Remote store {} using database '{}'", redacted, database);
        Ok(RemoteStore { client, database, redacted })
    }
}

impl Connector for RemoteStore {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(RemoteConnection { database: Some(self.client.database(&self.database)) }))
    }

    fn describe(&self) -> String {
        format!("remote store at {}", self.redacted)
    }
}

/// One call's handle on the remote database. The driver pools sockets, so
/// closing only forgets the handle.
struct RemoteConnection {
    database: Option<Database>,
}

impl RemoteConnection {
    fn database(&self) -> Result<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| StoreError::Connection("connection is closed".to_string()))
    }
}

impl Connection for RemoteConnection {
    fn aggregate(&mut self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        let stages = pipeline.iter().map(to_bson).collect::<Result<Vec<_>>>()?;
        debug!("Remote aggregate on '{}' with {} stages", collection, stages.len());

        let cursor = self
            .database()?
            .collection::<BsonDocument>(collection)
            .aggregate(stages, None)?;
        cursor.map(|item| item.map_err(StoreError::from).and_then(from_bson)).collect()
    }

    fn fetch(&mut self, request: &FindRequest) -> Result<Vec<Document>> {
        let filter = to_bson(&request.filter)?;
        let options = find_options(request)?;
        debug!("Remote find on '{}'", request.collection);

        let cursor = self
            .database()?
            .collection::<BsonDocument>(&request.collection)
            .find(filter, options)?;
        cursor.map(|item| item.map_err(StoreError::from).and_then(from_bson)).collect()
    }

    fn close(&mut self) {
        self.database = None;
    }
}

/// Driver options for a find: projection when non-empty, sort keys in order,
/// and the limit unless it is absent or zero
fn find_options(request: &FindRequest) -> Result<FindOptions> {
    let mut options = FindOptions::default();
    if !request.projection.is_empty() {
        options.projection = Some(to_bson(&request.projection)?);
    }
    if !request.sort.is_empty() {
        options.sort = Some(sort_document(&request.sort));
    }
    options.limit = match request.limit {
        None | Some(0) => None,
        Some(n) => Some(i64::try_from(n).map_err(|_| StoreError::InvalidOperation(format!("limit {} is too large", n)))?),
    };
    Ok(options)
}

fn sort_document(keys: &[SortKey]) -> BsonDocument {
    let mut sort = BsonDocument::new();
    for key in keys {
        let direction = match key.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        sort.insert(key.field.clone(), Bson::Int32(direction));
    }
    sort
}

fn to_bson(document: &Document) -> Result<BsonDocument> {
    bson::to_document(document).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Server documents come back as relaxed extended JSON, so an ObjectId
/// reads as `{"$oid": ...}` and a date as `{"$date": ...}`
fn from_bson(document: BsonDocument) -> Result<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!("expected a document, got {}", other))),
    }
}
