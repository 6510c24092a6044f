use anyhow::Result;
use ledgerql::Document;

/// Output formatter
pub trait Formatter {
    /// Format query results
    fn format_records(&self, records: &[Document]) -> Result<String>;

    /// Format an arbitrary JSON value
    fn format_json(&self, json: &serde_json::Value) -> Result<String>;

    /// Format an error message
    fn format_error(&self, error: &str) -> String;

    /// Format an informational message
    fn format_info(&self, info: &str) -> String;

    /// Format a success message
    fn format_success(&self, success: &str) -> String;
}
