pub mod formatter;
pub mod json;
pub mod table;
pub mod text;

pub use formatter::Formatter;
use clap::ValueEnum;

/// Available output formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,

    /// Pretty-printed JSON
    Json,

    /// One table row per record
    Table,
}

/// Render a scalar for a single-line cell, summarizing nested values
pub fn cell_text(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => truncate(s, 50),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(_) => "{object}".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
