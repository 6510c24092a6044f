use anyhow::Result;
use colored::*;
use prettytable::{Cell, Row, Table};

use ledgerql::Document;

use crate::formatters::{cell_text, Formatter};

/// Tabular output: one column per field, one row per record
pub struct TableFormatter {
    colored: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        TableFormatter { colored: true }
    }

    #[cfg(test)]
    pub fn without_colors() -> Self {
        TableFormatter { colored: false }
    }
}

/// Field names in order of first appearance across all records
fn columns(records: &[Document]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

impl Formatter for TableFormatter {
    fn format_records(&self, records: &[Document]) -> Result<String> {
        let columns = columns(records);
        let mut table = Table::new();

        table.add_row(Row::new(columns.iter().map(|c| Cell::new(c)).collect()));
        for record in records {
            let cells = columns
                .iter()
                .map(|c| match record.get(c) {
                    Some(value) => Cell::new(&cell_text(value)),
                    None => Cell::new(""),
                })
                .collect();
            table.add_row(Row::new(cells));
        }

        Ok(table.to_string())
    }

    fn format_json(&self, json: &serde_json::Value) -> Result<String> {
        let mut table = Table::new();
        table.add_row(Row::new(vec![Cell::new("Key"), Cell::new("Value")]));

        match json {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    table.add_row(Row::new(vec![Cell::new(key), Cell::new(&cell_text(value))]));
                }
            }
            serde_json::Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    table.add_row(Row::new(vec![Cell::new(&i.to_string()), Cell::new(&cell_text(item))]));
                }
            }
            scalar => {
                table.add_row(Row::new(vec![Cell::new("value"), Cell::new(&cell_text(scalar))]));
            }
        }

        Ok(table.to_string())
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
