use anyhow::Result;
use serde_json::json;

use ledgerql::Document;

use crate::formatters::Formatter;

/// JSON output
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter { pretty: true }
    }

    fn render(&self, value: &serde_json::Value) -> Result<String> {
        if self.pretty {
            Ok(serde_json::to_string_pretty(value)?)
        } else {
            Ok(serde_json::to_string(value)?)
        }
    }

    fn message(&self, key: &str, text: &str) -> String {
        self.render(&json!({ key: text }))
            .unwrap_or_else(|_| format!("{{\"{}\":{:?}}}", key, text))
    }
}

impl Formatter for JsonFormatter {
    fn format_records(&self, records: &[Document]) -> Result<String> {
        let array = serde_json::Value::Array(records.iter().cloned().map(serde_json::Value::Object).collect());
        self.render(&array)
    }

    fn format_json(&self, json: &serde_json::Value) -> Result<String> {
        self.render(json)
    }

    fn format_error(&self, error: &str) -> String {
        self.message("error", error)
    }

    fn format_info(&self, info: &str) -> String {
        self.message("info", info)
    }

    fn format_success(&self, success: &str) -> String {
        self.message("success", success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_a_pretty_array() {
        let record = json!({ "name": "Laptop", "price": 1200 });
        let records = vec![record.as_object().unwrap().clone()];

        let out = JsonFormatter::new().format_records(&records).unwrap();
        assert_eq!(out, "[\n  {\n    \"name\": \"Laptop\",\n    \"price\": 1200\n  }\n]");
        assert_eq!(JsonFormatter::new().format_records(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_error_is_an_object() {
        let out = JsonFormatter::new().format_error("Parse error: malformed query document: EOF");
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({ "error": "Parse error: malformed query document: EOF" }));
    }
}
