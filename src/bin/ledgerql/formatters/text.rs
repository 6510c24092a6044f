use anyhow::Result;
use colored::*;

use ledgerql::Document;

use crate::formatters::Formatter;

/// Plain text output, colored when the terminal allows it
pub struct TextFormatter {
    colored: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        TextFormatter { colored: true }
    }

    #[cfg(test)]
    pub fn without_colors() -> Self {
        TextFormatter { colored: false }
    }

    fn scalar(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Formatter for TextFormatter {
    fn format_records(&self, records: &[Document]) -> Result<String> {
        if records.is_empty() {
            return Ok(self.format_info("No records"));
        }

        let mut out = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let header = format!("#{}", i + 1);
            out.push(if self.colored { header.bold().to_string() } else { header });
            for (key, value) in record {
                let key = if self.colored { key.cyan().to_string() } else { key.clone() };
                out.push(format!("  {}: {}", key, Self::scalar(value)));
            }
        }
        out.push(String::new());
        out.push(self.format_info(&format!("{} record(s)", records.len())));
        Ok(out.join("\n"))
    }

    fn format_json(&self, json: &serde_json::Value) -> Result<String> {
        match json {
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Ok(serde_json::to_string_pretty(json)?),
            other => Ok(Self::scalar(other)),
        }
    }

    fn format_error(&self, error: &str) -> String {
        if self.colored {
            format!("{}", error.red().bold())
        } else {
            error.to_string()
        }
    }

    fn format_info(&self, info: &str) -> String {
        if self.colored {
            format!("{}", info.blue())
        } else {
            info.to_string()
        }
    }

    fn format_success(&self, success: &str) -> String {
        if self.colored {
            format!("{}", success.green().bold())
        } else {
            success.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_are_numbered() {
        let records = vec![
            json!({ "name": "Laptop", "tags": ["a"] }).as_object().unwrap().clone(),
            json!({ "name": "Desk" }).as_object().unwrap().clone(),
        ];

        let out = TextFormatter::without_colors().format_records(&records).unwrap();
        assert_eq!(out, "#1\n  name: Laptop\n  tags: [\"a\"]\n#2\n  name: Desk\n\n2 record(s)");
    }

    #[test]
    fn test_no_records() {
        let out = TextFormatter::without_colors().format_records(&[]).unwrap();
        assert_eq!(out, "No records");
    }
}
