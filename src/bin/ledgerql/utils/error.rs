use thiserror::Error;

use ledgerql::StoreError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Command needs a {expected} store, got {actual}")]
    WrongStore { expected: &'static str, actual: String },
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        CliError::Input(error.to_string())
    }
}
