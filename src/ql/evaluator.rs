//! Query evaluator for the in-process stores
//!
//! This module evaluates the MongoDB query dialect the oracle produces:
//! query documents, aggregation expressions, projections and sorts.
//! Unknown operators are rejected rather than ignored.

use std::cmp::Ordering;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::core::document::{
    as_f64, comparable, compare_values, is_truthy, number_value, values_equal, Document,
};
use crate::core::errors::{Result, StoreError};
use crate::core::path::{FieldPath, PathSegment};
use crate::core::store::{FindRequest, SortDirection, SortKey};

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(StoreError::InvalidOperation(message.into()))
}

fn field_path(field: &str) -> Result<FieldPath> {
    Ok(FieldPath::from_str(field)?)
}

/// Run a filtered read over a collection: filter, sort, limit, then project
pub fn find<I>(documents: I, request: &FindRequest) -> Result<Vec<Document>>
where
    I: IntoIterator<Item = Document>,
{
    let mut selected = Vec::new();
    for document in documents {
        if matches(&document, &request.filter)? {
            selected.push(document);
        }
    }

    sort_documents(&mut selected, &request.sort)?;

    // A limit of zero means no limit
    if let Some(limit) = request.limit.filter(|l| *l > 0) {
        selected.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    selected
        .iter()
        .map(|document| project(document, &request.projection))
        .collect()
}

// Filters

/// Whether a document satisfies a query document
pub fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        if !matches_clause(document, key, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_clause(document: &Document, key: &str, condition: &Value) -> Result<bool> {
    match key {
        "$and" => {
            for clause in clauses(condition, key)? {
                if !matches(document, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$or" => {
            for clause in clauses(condition, key)? {
                if matches(document, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "$nor" => {
            for clause in clauses(condition, key)? {
                if matches(document, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$expr" => Ok(is_truthy(&evaluate(condition, document)?)),
        "$comment" => Ok(true),
        other if other.starts_with('$') => invalid(format!("unknown query operator {}", other)),
        field => matches_field(document, &field_path(field)?, condition),
    }
}

fn clauses<'a>(value: &'a Value, operator: &str) -> Result<Vec<&'a Document>> {
    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => return invalid(format!("{} expects a non-empty array", operator)),
    };
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::InvalidOperation(format!("{} entries must be objects", operator)))
        })
        .collect()
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

/// Values a field condition is tested against: every value at the path,
/// plus the elements of any array found there
fn candidates<'a>(document: &'a Document, path: &FieldPath) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for value in path.lookup(document) {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn matches_field(document: &Document, path: &FieldPath, condition: &Value) -> Result<bool> {
    match condition {
        Value::Object(operators) if is_operator_object(operators) => {
            for (operator, operand) in operators {
                if !apply_operator(document, path, operator, operand, operators)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        target => Ok(equals_any(document, path, target)),
    }
}

fn equals_any(document: &Document, path: &FieldPath, target: &Value) -> bool {
    let found = candidates(document, path);
    if target.is_null() {
        return found.is_empty() || found.iter().any(|v| v.is_null());
    }
    found.iter().any(|v| values_equal(v, target))
}

fn apply_operator(
    document: &Document,
    path: &FieldPath,
    operator: &str,
    operand: &Value,
    siblings: &Map<String, Value>,
) -> Result<bool> {
    match operator {
        "$eq" => Ok(equals_any(document, path, operand)),
        "$ne" => Ok(!equals_any(document, path, operand)),
        "$gt" | "$gte" | "$lt" | "$lte" => Ok(candidates(document, path)
            .iter()
            .any(|v| comparable(v, operand) && ordered(operator, compare_values(v, operand)))),
        "$in" => Ok(in_list(document, path, operand, operator)?),
        "$nin" => Ok(!in_list(document, path, operand, operator)?),
        "$exists" => Ok(path.lookup(document).is_empty() != is_truthy(operand)),
        "$regex" => {
            let options = siblings.get("$options").and_then(Value::as_str).unwrap_or("");
            let pattern = build_regex(operand, options)?;
            Ok(matches_regex(document, path, &pattern))
        }
        "$options" if siblings.contains_key("$regex") => Ok(true),
        "$options" => invalid("$options requires $regex"),
        "$not" => match operand {
            Value::Object(inner) if is_operator_object(inner) => {
                Ok(!matches_field(document, path, operand)?)
            }
            Value::String(_) => Ok(!matches_regex(document, path, &build_regex(operand, "")?)),
            _ => invalid("$not expects an operator object or a pattern"),
        },
        "$size" => {
            let Some(size) = operand.as_u64() else {
                return invalid("$size expects a non-negative integer");
            };
            Ok(path
                .lookup(document)
                .iter()
                .any(|v| v.as_array().map_or(false, |items| items.len() as u64 == size)))
        }
        "$all" => {
            let Value::Array(required) = operand else {
                return invalid("$all expects an array");
            };
            Ok(!required.is_empty() && required.iter().all(|item| equals_any(document, path, item)))
        }
        "$elemMatch" => {
            let Value::Object(criteria) = operand else {
                return invalid("$elemMatch expects an object");
            };
            for value in path.lookup(document) {
                let Value::Array(items) = value else { continue };
                for item in items {
                    if element_matches(item, criteria)? {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        other => invalid(format!("unknown query operator {}", other)),
    }
}

fn element_matches(item: &Value, criteria: &Map<String, Value>) -> Result<bool> {
    if is_operator_object(criteria) {
        let mut wrapped = Document::new();
        wrapped.insert("value".to_string(), item.clone());
        return matches_field(&wrapped, &field_path("value")?, &Value::Object(criteria.clone()));
    }
    match item {
        Value::Object(sub) => matches(sub, criteria),
        _ => Ok(false),
    }
}

fn in_list(document: &Document, path: &FieldPath, operand: &Value, operator: &str) -> Result<bool> {
    let Value::Array(items) = operand else {
        return invalid(format!("{} expects an array", operator));
    };
    Ok(items.iter().any(|item| equals_any(document, path, item)))
}

fn ordered(operator: &str, ordering: Ordering) -> bool {
    match operator {
        "$gt" => ordering == Ordering::Greater,
        "$gte" => ordering != Ordering::Less,
        "$lt" => ordering == Ordering::Less,
        "$lte" => ordering != Ordering::Greater,
        _ => false,
    }
}

fn build_regex(pattern: &Value, options: &str) -> Result<Regex> {
    let Value::String(pattern) = pattern else {
        return invalid("$regex expects a string pattern");
    };
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| StoreError::InvalidOperation(format!("invalid $regex: {}", e)))
}

fn matches_regex(document: &Document, path: &FieldPath, pattern: &Regex) -> bool {
    candidates(document, path)
        .iter()
        .any(|v| v.as_str().map_or(false, |s| pattern.is_match(s)))
}

// Expressions

/// Evaluate an aggregation expression against a document
pub fn evaluate(expression: &Value, document: &Document) -> Result<Value> {
    match expression {
        Value::String(s) if s.starts_with("$$") => variable(&s[2..], document),
        Value::String(s) if s.len() > 1 && s.starts_with('$') => {
            Ok(field_path(&s[1..])?.resolve(document).unwrap_or(Value::Null))
        }
        Value::Object(map) => match single_operator(map) {
            Some((operator, args)) => apply_expression(operator, args, document),
            None => map
                .iter()
                .map(|(key, inner)| Ok((key.clone(), evaluate(inner, document)?)))
                .collect::<Result<Map<String, Value>>>()
                .map(Value::Object),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate(item, document))
            .collect::<Result<Vec<Value>>>()
            .map(Value::Array),
        literal => Ok(literal.clone()),
    }
}

/// The operator and argument of a `{"$op": args}` object
pub fn single_operator(map: &Map<String, Value>) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    key.starts_with('$').then_some((key.as_str(), value))
}

fn variable(name: &str, document: &Document) -> Result<Value> {
    let (root, rest) = match name.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (name, None),
    };
    if root != "ROOT" && root != "CURRENT" {
        return invalid(format!("unknown variable $${}", root));
    }
    match rest {
        Some(rest) => Ok(field_path(rest)?.resolve(document).unwrap_or(Value::Null)),
        None => Ok(Value::Object(document.clone())),
    }
}

fn arguments(args: &Value, document: &Document) -> Result<Vec<Value>> {
    match args {
        Value::Array(items) => items.iter().map(|item| evaluate(item, document)).collect(),
        single => Ok(vec![evaluate(single, document)?]),
    }
}

fn exactly<const N: usize>(operator: &str, args: Vec<Value>) -> Result<[Value; N]> {
    args.try_into().map_err(|args: Vec<Value>| {
        StoreError::InvalidOperation(format!(
            "{} expects {} arguments, got {}",
            operator,
            N,
            args.len()
        ))
    })
}

fn apply_expression(operator: &str, args: &Value, document: &Document) -> Result<Value> {
    match operator {
        "$literal" => Ok(args.clone()),
        "$cond" => conditional(args, document),
        "$ifNull" => {
            let Value::Array(items) = args else {
                return invalid("$ifNull expects an array");
            };
            for item in items {
                let value = evaluate(item, document)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        "$and" => {
            for value in arguments(args, document)? {
                if !is_truthy(&value) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "$or" => {
            for value in arguments(args, document)? {
                if is_truthy(&value) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "$not" => {
            let [value] = exactly::<1>(operator, arguments(args, document)?)?;
            Ok(Value::Bool(!is_truthy(&value)))
        }
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$cmp" => {
            let [left, right] = exactly::<2>(operator, arguments(args, document)?)?;
            let ordering = compare_values(&left, &right);
            Ok(match operator {
                "$eq" => Value::Bool(ordering == Ordering::Equal),
                "$ne" => Value::Bool(ordering != Ordering::Equal),
                "$cmp" => Value::from(ordering as i8),
                _ => Value::Bool(ordered(operator, ordering)),
            })
        }
        "$add" | "$multiply" => {
            let Some((numbers, integral)) = numbers(operator, &arguments(args, document)?)? else {
                return Ok(Value::Null);
            };
            let result = if operator == "$add" {
                numbers.iter().sum()
            } else {
                numbers.iter().product()
            };
            Ok(number_value(result, integral))
        }
        "$subtract" | "$divide" | "$mod" => {
            let values = exactly::<2>(operator, arguments(args, document)?)?;
            let Some((numbers, integral)) = numbers(operator, &values)? else {
                return Ok(Value::Null);
            };
            let (left, right) = (numbers[0], numbers[1]);
            match operator {
                "$subtract" => Ok(number_value(left - right, integral)),
                _ if right == 0.0 => invalid(format!("{} by zero", operator)),
                "$divide" => Ok(number_value(left / right, false)),
                _ => Ok(number_value(left % right, integral)),
            }
        }
        "$abs" => {
            let values = exactly::<1>(operator, arguments(args, document)?)?;
            match numbers(operator, &values)? {
                Some((numbers, integral)) => Ok(number_value(numbers[0].abs(), integral)),
                None => Ok(Value::Null),
            }
        }
        "$round" => {
            let values = arguments(args, document)?;
            let places = match values.get(1) {
                Some(v) => v.as_i64().ok_or_else(|| {
                    StoreError::InvalidOperation("$round places must be an integer".to_string())
                })?,
                None => 0,
            };
            match numbers(operator, &values[..values.len().min(1)])? {
                Some((numbers, integral)) if !numbers.is_empty() => {
                    let factor = 10f64.powi(places as i32);
                    Ok(number_value((numbers[0] * factor).round() / factor, integral || places <= 0))
                }
                Some(_) => invalid("$round expects a number"),
                None => Ok(Value::Null),
            }
        }
        "$sum" | "$avg" | "$min" | "$max" => {
            let mut values = arguments(args, document)?;
            if let [Value::Array(items)] = values.as_mut_slice() {
                values = std::mem::take(items);
            }
            Ok(accumulate(operator, &values))
        }
        "$concat" => {
            let mut out = String::new();
            for value in arguments(args, document)? {
                match value {
                    Value::String(s) => out.push_str(&s),
                    Value::Null => return Ok(Value::Null),
                    other => return invalid(format!("$concat only supports strings, found {}", other)),
                }
            }
            Ok(Value::String(out))
        }
        "$toLower" | "$toUpper" => {
            let [value] = exactly::<1>(operator, arguments(args, document)?)?;
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            Ok(Value::String(if operator == "$toLower" {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            }))
        }
        "$size" => {
            let [value] = exactly::<1>(operator, arguments(args, document)?)?;
            match value {
                Value::Array(items) => Ok(Value::from(items.len())),
                other => invalid(format!("$size expects an array, found {}", other)),
            }
        }
        "$in" => {
            let [needle, haystack] = exactly::<2>(operator, arguments(args, document)?)?;
            match haystack {
                Value::Array(items) => Ok(Value::Bool(items.iter().any(|i| values_equal(i, &needle)))),
                other => invalid(format!("$in expects an array, found {}", other)),
            }
        }
        other => invalid(format!("unknown expression operator {}", other)),
    }
}

fn conditional(args: &Value, document: &Document) -> Result<Value> {
    let (condition, then, otherwise) = match args {
        Value::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
        Value::Object(map) => match (map.get("if"), map.get("then"), map.get("else")) {
            (Some(c), Some(t), Some(e)) => (c, t, e),
            _ => return invalid("$cond requires if, then and else"),
        },
        _ => return invalid("$cond expects [if, then, else] or an object"),
    };

    if is_truthy(&evaluate(condition, document)?) {
        evaluate(then, document)
    } else {
        evaluate(otherwise, document)
    }
}

/// Numeric arguments and whether they are all integers; `None` if any is null
fn numbers(operator: &str, args: &[Value]) -> Result<Option<(Vec<f64>, bool)>> {
    let mut out = Vec::with_capacity(args.len());
    let mut integral = true;
    for arg in args {
        match arg {
            Value::Null => return Ok(None),
            Value::Number(n) => {
                integral &= !n.is_f64();
                out.push(n.as_f64().unwrap_or(f64::NAN));
            }
            other => {
                return invalid(format!("{} only supports numeric arguments, found {}", operator, other))
            }
        }
    }
    Ok(Some((out, integral)))
}

/// Fold values with `$sum`, `$avg`, `$min` or `$max`. Non-numeric values
/// are skipped by `$sum` and `$avg`, nulls by `$min` and `$max`.
pub fn accumulate(operator: &str, values: &[Value]) -> Value {
    match operator {
        "$sum" => {
            let integral = values.iter().all(|v| !matches!(v, Value::Number(n) if n.is_f64()));
            number_value(values.iter().filter_map(as_f64).sum(), integral)
        }
        "$avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                number_value(numbers.iter().sum::<f64>() / numbers.len() as f64, false)
            }
        }
        "$min" | "$max" => {
            let present = values.iter().filter(|v| !v.is_null());
            let best = if operator == "$min" {
                present.min_by(|a, b| compare_values(a, b))
            } else {
                present.max_by(|a, b| compare_values(a, b))
            };
            best.cloned().unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

// Projection

fn projection_flag(spec: &Value) -> Option<bool> {
    match spec {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => Some(n.as_f64().map_or(false, |f| f != 0.0)),
        _ => None,
    }
}

/// Apply a projection document: inclusion or exclusion mode, with
/// computed fields allowed in inclusion mode. `_id` is kept unless
/// excluded explicitly.
pub fn project(document: &Document, projection: &Document) -> Result<Document> {
    if projection.is_empty() {
        return Ok(document.clone());
    }

    let mut id_flag = None;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut computed = Vec::new();

    for (field, spec) in projection {
        let path = field_path(field)?;
        match (field.as_str(), projection_flag(spec)) {
            ("_id", Some(flag)) => id_flag = Some(flag),
            (_, Some(true)) => included.push(path),
            (_, Some(false)) => excluded.push(path),
            (_, None) => computed.push((path, spec)),
        }
    }

    if !excluded.is_empty() && (!included.is_empty() || !computed.is_empty()) {
        return invalid("cannot mix inclusion and exclusion in a projection");
    }

    let inclusion = !included.is_empty() || !computed.is_empty() || id_flag == Some(true);
    if !inclusion {
        let mut out = document.clone();
        for path in &excluded {
            path.remove(&mut out);
        }
        if id_flag == Some(false) {
            out.remove("_id");
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if id_flag != Some(false) {
        if let Some(id) = document.get("_id") {
            out.insert("_id".to_string(), id.clone());
        }
    }
    for path in &included {
        include_into(&mut out, document, path.segments());
    }
    for (path, expression) in computed {
        let value = evaluate(expression, document)?;
        path.set(&mut out, value);
    }
    Ok(out)
}

fn include_into(target: &mut Document, source: &Document, segments: &[PathSegment]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = source.get(head.as_str()) else {
        return;
    };
    if rest.is_empty() {
        target.insert(head.as_str().to_string(), value.clone());
        return;
    }

    match value {
        Value::Object(inner) => {
            let slot = target
                .entry(head.as_str())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(slot) = slot {
                include_into(slot, inner, rest);
            }
        }
        Value::Array(items) => {
            let objects: Vec<&Document> = items.iter().filter_map(Value::as_object).collect();
            let slot = target
                .entry(head.as_str())
                .or_insert_with(|| Value::Array(vec![Value::Object(Map::new()); objects.len()]));
            if let Value::Array(slots) = slot {
                for (slot, item) in slots.iter_mut().zip(objects) {
                    if let Value::Object(slot) = slot {
                        include_into(slot, item, rest);
                    }
                }
            }
        }
        _ => {}
    }
}

// Sorting

/// Stable multi-key sort. Missing fields sort as null.
pub fn sort_documents(documents: &mut [Document], keys: &[SortKey]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let paths = keys
        .iter()
        .map(|key| Ok((field_path(&key.field)?, key.direction)))
        .collect::<Result<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        for (path, direction) in &paths {
            let left = path.resolve(a).unwrap_or(Value::Null);
            let right = path.resolve(b).unwrap_or(Value::Null);
            let ordering = match direction {
                SortDirection::Ascending => compare_values(&left, &right),
                SortDirection::Descending => compare_values(&right, &left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn filter(value: Value) -> Document {
        doc(value)
    }

    fn inventory() -> Vec<Document> {
        vec![
            doc(json!({ "_id": 1, "name": "Laptop", "price": 1200.0, "quantity": 3, "threshold": 5, "tags": ["tech", "office"] })),
            doc(json!({ "_id": 2, "name": "Desk", "price": 300, "quantity": 12, "threshold": 4, "tags": ["office"] })),
            doc(json!({ "_id": 3, "name": "Mouse", "price": 25.5, "quantity": 40, "threshold": 10, "tags": [] })),
            doc(json!({ "_id": 4, "name": "Monitor", "price": 300, "quantity": 1, "threshold": 2 })),
            doc(json!({ "_id": 5, "name": "cable", "price": null, "quantity": 0, "threshold": 0 })),
        ]
    }

    fn names(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d["name"].as_str().unwrap()).collect()
    }

    fn select(query: Value) -> Vec<String> {
        inventory()
            .into_iter()
            .filter(|d| matches(d, &filter(query.clone())).unwrap())
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(select(json!({ "price": { "$gte": 300, "$lt": 1000 } })), vec!["Desk", "Monitor"]);
        assert_eq!(select(json!({ "quantity": { "$lt": 5 } })), vec!["Laptop", "Monitor", "cable"]);
        assert_eq!(select(json!({ "price": { "$gt": "100" } })), Vec::<String>::new());
        assert_eq!(select(json!({ "name": { "$ne": "Desk" }, "quantity": { "$gt": 10 } })), vec!["Mouse"]);
    }

    #[test]
    fn test_equality_and_arrays() {
        assert_eq!(select(json!({ "price": 300.0 })), vec!["Desk", "Monitor"]);
        assert_eq!(select(json!({ "tags": "office" })), vec!["Laptop", "Desk"]);
        assert_eq!(select(json!({ "tags": ["office"] })), vec!["Desk"]);
        assert_eq!(select(json!({ "price": null })), vec!["cable"]);
        assert_eq!(select(json!({ "tags": { "$exists": false } })), vec!["Monitor", "cable"]);
        assert_eq!(select(json!({ "tags": { "$size": 0 } })), vec!["Mouse"]);
        assert_eq!(select(json!({ "tags": { "$all": ["tech", "office"] } })), vec!["Laptop"]);
    }

    #[test]
    fn test_set_and_logical_operators() {
        assert_eq!(select(json!({ "_id": { "$in": [2, 4, 9] } })), vec!["Desk", "Monitor"]);
        assert_eq!(select(json!({ "_id": { "$nin": [1, 2, 3] } })), vec!["Monitor", "cable"]);
        assert_eq!(
            select(json!({ "$or": [{ "name": "Mouse" }, { "quantity": { "$gt": 10 } }] })),
            vec!["Desk", "Mouse"]
        );
        assert_eq!(
            select(json!({ "$and": [{ "price": 300 }, { "quantity": { "$lt": 5 } }] })),
            vec!["Monitor"]
        );
        assert_eq!(select(json!({ "$nor": [{ "price": 300 }, { "price": null }] })), vec!["Laptop", "Mouse"]);
        assert_eq!(select(json!({ "quantity": { "$not": { "$gt": 3 } } })), vec!["Laptop", "Monitor", "cable"]);
    }

    #[test]
    fn test_regex() {
        assert_eq!(select(json!({ "name": { "$regex": "^m" } })), Vec::<String>::new());
        assert_eq!(select(json!({ "name": { "$regex": "^m", "$options": "i" } })), vec!["Mouse", "Monitor"]);
        assert!(matches(&inventory()[0], &filter(json!({ "name": { "$regex": "(" } }))).is_err());
    }

    #[test]
    fn test_expr_compares_fields() {
        assert_eq!(
            select(json!({ "$expr": { "$lt": ["$quantity", "$threshold"] } })),
            vec!["Laptop", "Monitor"]
        );
    }

    #[test]
    fn test_unknown_operators_are_rejected() {
        let document = &inventory()[0];
        assert!(matches(document, &filter(json!({ "price": { "$near": 1 } }))).is_err());
        assert!(matches(document, &filter(json!({ "$where": "this.price > 1" }))).is_err());
        assert!(evaluate(&json!({ "$function": {} }), document).is_err());
    }

    #[test]
    fn test_dotted_paths_into_arrays() {
        let order = doc(json!({ "items": [{ "sku": "A", "qty": 2 }, { "sku": "B", "qty": 5 }] }));
        assert!(matches(&order, &filter(json!({ "items.sku": "B" }))).unwrap());
        assert!(matches(&order, &filter(json!({ "items.qty": { "$gt": 4 } }))).unwrap());
        assert!(!matches(&order, &filter(json!({ "items.sku": "C" }))).unwrap());
        assert!(matches(&order, &filter(json!({ "items": { "$elemMatch": { "sku": "A", "qty": 2 } } }))).unwrap());
        assert!(!matches(&order, &filter(json!({ "items": { "$elemMatch": { "sku": "A", "qty": 5 } } }))).unwrap());
    }

    #[test]
    fn test_expressions() {
        let sale = doc(json!({ "quantitySold": 3, "priceSold": 2.5, "vendor": null, "name": "Desk" }));
        assert_eq!(evaluate(&json!({ "$multiply": ["$quantitySold", "$priceSold"] }), &sale).unwrap(), json!(7.5));
        assert_eq!(evaluate(&json!({ "$add": [1, 2, "$quantitySold"] }), &sale).unwrap(), json!(6));
        assert_eq!(evaluate(&json!({ "$subtract": ["$quantitySold", 1] }), &sale).unwrap(), json!(2));
        assert_eq!(evaluate(&json!({ "$divide": [9, "$quantitySold"] }), &sale).unwrap(), json!(3.0));
        assert!(evaluate(&json!({ "$divide": [1, 0] }), &sale).is_err());
        assert_eq!(evaluate(&json!({ "$ifNull": ["$vendor", "walk-in"] }), &sale).unwrap(), json!("walk-in"));
        assert_eq!(evaluate(&json!({ "$concat": ["$name", "-", "x"] }), &sale).unwrap(), json!("Desk-x"));
        assert_eq!(evaluate(&json!({ "$toUpper": "$name" }), &sale).unwrap(), json!("DESK"));
        assert_eq!(
            evaluate(&json!({ "$cond": { "if": { "$gt": ["$quantitySold", 2] }, "then": "bulk", "else": "single" } }), &sale)
                .unwrap(),
            json!("bulk")
        );
        assert_eq!(evaluate(&json!({ "$literal": "$name" }), &sale).unwrap(), json!("$name"));
        assert_eq!(evaluate(&json!("$missing"), &sale).unwrap(), Value::Null);
        assert_eq!(evaluate(&json!({ "$round": [2.346, 2] }), &sale).unwrap(), json!(2.35));
    }

    #[test]
    fn test_accumulate() {
        let values = vec![json!(3), json!(1.5), json!("n/a"), json!(null)];
        assert_eq!(accumulate("$sum", &values), json!(4.5));
        assert_eq!(accumulate("$sum", &[json!(1), json!(2)]), json!(3));
        assert_eq!(accumulate("$avg", &[json!(1), json!(2)]), json!(1.5));
        assert_eq!(accumulate("$avg", &[json!("x")]), Value::Null);
        assert_eq!(accumulate("$min", &values), json!(1.5));
        assert_eq!(accumulate("$max", &[json!(1), json!(null)]), json!(1));
    }

    #[test]
    fn test_projection_modes() {
        let document = doc(json!({ "_id": 7, "name": "Desk", "price": 300, "meta": { "a": 1, "b": 2 } }));

        let inclusion = project(&document, &doc(json!({ "name": 1, "meta.b": 1 }))).unwrap();
        assert_eq!(Value::Object(inclusion), json!({ "_id": 7, "name": "Desk", "meta": { "b": 2 } }));

        let no_id = project(&document, &doc(json!({ "_id": 0, "price": 1 }))).unwrap();
        assert_eq!(Value::Object(no_id), json!({ "price": 300 }));

        let exclusion = project(&document, &doc(json!({ "meta": 0, "_id": 0 }))).unwrap();
        assert_eq!(Value::Object(exclusion), json!({ "name": "Desk", "price": 300 }));

        let only_id = project(&document, &doc(json!({ "_id": 1 }))).unwrap();
        assert_eq!(Value::Object(only_id), json!({ "_id": 7 }));

        let computed = project(&document, &doc(json!({ "_id": 0, "label": { "$toLower": "$name" } }))).unwrap();
        assert_eq!(Value::Object(computed), json!({ "label": "desk" }));

        assert!(project(&document, &doc(json!({ "name": 1, "price": 0 }))).is_err());
    }

    #[test]
    fn test_projection_into_arrays() {
        let order = doc(json!({ "_id": 1, "items": [{ "sku": "A", "qty": 2 }, { "sku": "B", "qty": 5 }] }));
        let projected = project(&order, &doc(json!({ "_id": 0, "items.sku": 1 }))).unwrap();
        assert_eq!(Value::Object(projected), json!({ "items": [{ "sku": "A" }, { "sku": "B" }] }));
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut documents = inventory();
        sort_documents(
            &mut documents,
            &[
                SortKey::new("price", SortDirection::Descending),
                SortKey::new("quantity", SortDirection::Ascending),
            ],
        )
        .unwrap();
        assert_eq!(names(&documents), vec!["Laptop", "Monitor", "Desk", "Mouse", "cable"]);

        let mut documents = inventory();
        sort_documents(&mut documents, &[SortKey::new("price", SortDirection::Ascending)]).unwrap();
        assert_eq!(names(&documents), vec!["cable", "Mouse", "Desk", "Monitor", "Laptop"]);
    }

    #[test]
    fn test_find_applies_limit_after_sort() {
        let request = FindRequest {
            collection: "Inventory".to_string(),
            filter: filter(json!({ "price": { "$gt": 0 } })),
            projection: doc(json!({ "_id": 0, "name": 1, "price": 1 })),
            sort: vec![SortKey::new("price", SortDirection::Descending)],
            limit: Some(2),
        };
        let found = find(inventory(), &request).unwrap();
        assert_eq!(
            found.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({ "name": "Laptop", "price": 1200.0 }), json!({ "name": "Desk", "price": 300 })]
        );

        let unlimited = FindRequest { limit: Some(0), ..request };
        assert_eq!(find(inventory(), &unlimited).unwrap().len(), 4);
    }
}
