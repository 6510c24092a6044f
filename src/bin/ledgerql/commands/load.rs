use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use ledgerql::{Document, PersistentStore, StoreUri};

use crate::context::Context;
use crate::utils::error::CliError;

/// Import a JSON array of documents into the configured sled store
pub fn execute(context: &Context, collection: &str, file: &Path) -> Result<ExitCode> {
    let path = match &context.settings().store {
        StoreUri::Sled(path) => path.clone(),
        other => {
            return Err(CliError::WrongStore {
                expected: "sled://",
                actual: other.redacted(),
            }
            .into())
        }
    };

    let text = fs::read_to_string(file).map_err(CliError::from)?;
    let documents: Vec<Document> = serde_json::from_str(&text).map_err(CliError::from)?;

    let store = PersistentStore::open(path).map_err(CliError::from)?;
    let imported = store.import(collection, documents).map_err(CliError::from)?;

    println!(
        "{}",
        context
            .formatter()
            .format_success(&format!("Imported {} documents into {}", imported, collection))
    );
    Ok(ExitCode::SUCCESS)
}
