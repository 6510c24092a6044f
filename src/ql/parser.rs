//! Parser for oracle-generated query text
//!
//! Turns raw text into a [`QueryDescription`]: strip an optional code
//! fence, parse JSON, resolve date placeholders, then validate the shape.
//! Operation dispatch is decided here and nowhere else.

use log::debug;
use serde_json::Value;

use crate::core::document::Document;
use crate::core::errors::{GatewayError, GatewayResult};
use crate::core::store::{SortDirection, SortKey};
use crate::placeholder::Resolver;
use crate::ql::ast::{FindSpec, Operation, QueryDescription};

/// Aggregation stages that write to the database
const WRITE_STAGES: [&str; 2] = ["$out", "$merge"];

/// Parse, resolve and validate raw query text
pub fn parse_query(raw: &str, resolver: &Resolver) -> GatewayResult<QueryDescription> {
    let document = parse_document(raw)?;
    let resolved = resolver.resolve(Value::Object(document))?;
    match resolved {
        Value::Object(document) => parse_description(document),
        _ => Err(GatewayError::MalformedOutput("expected a JSON object".to_string())),
    }
}

/// Strip a surrounding Markdown code fence, if any
pub fn unwrap_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string (`json`, `javascript`, ...)
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse raw text into a JSON object
pub fn parse_document(raw: &str) -> GatewayResult<Document> {
    let text = unwrap_fence(raw);
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GatewayError::MalformedOutput(e.to_string()))?;

    match value {
        Value::Object(document) => Ok(document),
        other => Err(GatewayError::MalformedOutput(format!(
            "expected a JSON object, found {}",
            json_type(&other)
        ))),
    }
}

/// Validate a parsed document and build the typed description
pub fn parse_description(mut document: Document) -> GatewayResult<QueryDescription> {
    if let Some(refusal) = oracle_refusal(&document) {
        return Err(GatewayError::OracleRefusal(refusal));
    }

    let operation = match document.get("operation") {
        Some(Value::String(op)) => op.clone(),
        Some(other) => {
            return Err(GatewayError::InvalidQuery(format!(
                "'operation' must be a string, found {}",
                json_type(other)
            )))
        }
        None => return Err(GatewayError::InvalidQuery("missing 'operation'".to_string())),
    };

    if operation != "find" && operation != "aggregate" {
        return Err(GatewayError::UnsupportedOperation(operation));
    }

    let collection = match document.remove("collection") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        Some(Value::String(_)) => {
            return Err(GatewayError::InvalidQuery("'collection' must not be empty".to_string()))
        }
        Some(other) => {
            return Err(GatewayError::InvalidQuery(format!(
                "'collection' must be a string, found {}",
                json_type(&other)
            )))
        }
        None => return Err(GatewayError::InvalidQuery("missing 'collection'".to_string())),
    };

    let operation = if operation == "find" {
        Operation::Find(parse_find(&mut document)?)
    } else {
        Operation::Aggregate {
            pipeline: parse_pipeline(document.remove("pipeline"))?,
        }
    };

    debug!("Parsed {} on collection '{}'", operation.name(), collection);
    Ok(QueryDescription { collection, operation })
}

/// The oracle answers off-topic questions with `{"error": ..., "available_schema": ...}`
fn oracle_refusal(document: &Document) -> Option<String> {
    if document.contains_key("operation") || document.contains_key("collection") {
        return None;
    }
    match document.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_find(document: &mut Document) -> GatewayResult<FindSpec> {
    Ok(FindSpec {
        filter: optional_object(document.remove("query"), "query")?,
        projection: optional_object(document.remove("projection"), "projection")?,
        sort: parse_sort(document.remove("sort"))?,
        limit: parse_limit(document.remove("limit"))?,
    })
}

fn optional_object(value: Option<Value>, key: &str) -> GatewayResult<Document> {
    match value {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(GatewayError::InvalidQuery(format!(
            "'{}' must be an object, found {}",
            key,
            json_type(&other)
        ))),
    }
}

fn parse_sort(value: Option<Value>) -> GatewayResult<Vec<SortKey>> {
    optional_object(value, "sort")?
        .into_iter()
        .map(|(field, direction)| {
            SortDirection::from_value(&direction)
                .map(|direction| SortKey::new(field.clone(), direction))
                .ok_or_else(|| {
                    GatewayError::InvalidQuery(format!(
                        "sort direction for '{}' must be 1 or -1, found {}",
                        field, direction
                    ))
                })
        })
        .collect()
}

fn parse_limit(value: Option<Value>) -> GatewayResult<Option<u64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(limit) = n.as_u64() {
                return Ok(Some(limit));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(Some(f as u64)),
                _ => Err(GatewayError::InvalidQuery(format!(
                    "'limit' must be a non-negative integer, found {}",
                    n
                ))),
            }
        }
        Some(other) => Err(GatewayError::InvalidQuery(format!(
            "'limit' must be a number, found {}",
            json_type(&other)
        ))),
    }
}

fn parse_pipeline(value: Option<Value>) -> GatewayResult<Vec<Document>> {
    let stages = match value {
        Some(Value::Array(stages)) => stages,
        Some(other) => {
            return Err(GatewayError::InvalidQuery(format!(
                "'pipeline' must be an array, found {}",
                json_type(&other)
            )))
        }
        None => return Err(GatewayError::InvalidQuery("missing 'pipeline'".to_string())),
    };

    let mut pipeline = Vec::with_capacity(stages.len());
    for (idx, stage) in stages.into_iter().enumerate() {
        if let Some(stage_name) = find_write_stage(&stage) {
            return Err(GatewayError::UnsupportedOperation(format!(
                "aggregate with write stage {}",
                stage_name
            )));
        }

        match stage {
            Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with('$')) => {
                pipeline.push(map)
            }
            other => {
                return Err(GatewayError::InvalidQuery(format!(
                    "pipeline stage {} must be an object with a single $-prefixed key, found {}",
                    idx, other
                )))
            }
        }
    }
    Ok(pipeline)
}

/// Look for a write stage anywhere in a stage, including nested sub-pipelines
fn find_write_stage(value: &Value) -> Option<&'static str> {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if let Some(stage) = WRITE_STAGES.iter().find(|s| **s == key.as_str()) {
                    return Some(stage);
                }
                if let Some(stage) = find_write_stage(inner) {
                    return Some(stage);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_write_stage),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
