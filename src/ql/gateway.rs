//! Query execution gateway
//!
//! The gateway takes raw oracle text and returns either the materialized
//! records or a categorized error. Each call leases one store connection,
//! which is released on every exit path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::core::config::{Settings, UnresolvedPolicy};
use crate::core::document::Document;
use crate::core::errors::{GatewayError, GatewayResult, StoreError};
use crate::core::store::{Connector, Lease};
use crate::placeholder::Resolver;
use crate::ql::ast::{Operation, QueryDescription};
use crate::ql::parser::parse_query;
use crate::storage::open_store;

/// Executes oracle-generated read queries against a store
#[derive(Clone)]
pub struct QueryGateway {
    connector: Arc<dyn Connector>,
    policy: UnresolvedPolicy,
}

impl QueryGateway {
    /// A gateway over the given store, passing unknown placeholders through
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        QueryGateway {
            connector,
            policy: UnresolvedPolicy::default(),
        }
    }

    /// Open the configured store and apply the configured placeholder policy
    pub fn from_settings(settings: &Settings) -> GatewayResult<Self> {
        let connector = open_store(&settings.store)?;
        Ok(Self::new(connector).with_policy(settings.placeholder_policy))
    }

    /// Change what happens to unrecognized date placeholders
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    /// Execute raw query text, resolving placeholders against the current time
    pub fn execute(&self, raw: &str) -> GatewayResult<Vec<Document>> {
        self.execute_at(raw, Utc::now())
    }

    /// Execute raw query text, resolving placeholders against `now`
    pub fn execute_at(&self, raw: &str, now: DateTime<Utc>) -> GatewayResult<Vec<Document>> {
        let mut lease = Lease::acquire(self.connector.as_ref())?;

        let resolver = Resolver::new(now).with_policy(self.policy);
        let description = parse_query(raw, &resolver).map_err(|e| {
            warn!("Rejected query: {}", e);
            e
        })?;

        info!(
            "Executing {} on '{}' via {}",
            description.operation.name(),
            description.collection,
            self.connector.describe()
        );
        let records = dispatch(&mut lease, &description).map_err(|e| {
            warn!("Store call on '{}' failed: {}", description.collection, e);
            e
        })?;
        debug!("Query returned {} records", records.len());
        Ok(records)
    }

    /// Execute raw query text on a blocking worker thread
    pub async fn execute_async(&self, raw: String) -> GatewayResult<Vec<Document>> {
        let gateway = self.clone();
        tokio::task::spawn_blocking(move || gateway.execute(&raw))
            .await
            .map_err(|e| GatewayError::Store(StoreError::Internal(format!("query task failed: {}", e))))?
    }

    /// Execute raw query text and render the outcome as text: a JSON array of
    /// records, or a single error line prefixed with its category.
    pub fn run(&self, raw: &str) -> String {
        self.run_at(raw, Utc::now())
    }

    /// As [`QueryGateway::run`], resolving placeholders against `now`
    pub fn run_at(&self, raw: &str, now: DateTime<Utc>) -> String {
        let rendered = self.execute_at(raw, now).and_then(|records| {
            serde_json::to_string(&records).map_err(|e| GatewayError::Store(StoreError::from(e)))
        });
        match rendered {
            Ok(text) => text,
            Err(e) => e.report(),
        }
    }
}

/// Run a validated description over a leased connection
fn dispatch(lease: &mut Lease, description: &QueryDescription) -> GatewayResult<Vec<Document>> {
    let records = match &description.operation {
        Operation::Find(spec) => {
            let mut cursor = lease.find(
                &description.collection,
                spec.filter.clone(),
                spec.projection.clone(),
            );
            if !spec.sort.is_empty() {
                cursor = cursor.sort(spec.sort.clone());
            }
            if let Some(limit) = spec.limit {
                cursor = cursor.limit(limit);
            }
            cursor.to_vec()?
        }
        Operation::Aggregate { pipeline } => lease.aggregate(&description.collection, pipeline)?,
    };
    Ok(records)
}
