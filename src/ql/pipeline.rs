//! Aggregation pipeline for the in-process stores
//!
//! Stages run in order over a materialized collection. `$lookup` pulls
//! other collections through the `load` callback supplied by the store.

use std::collections::HashMap;
use std::str::FromStr;

use log::trace;
use serde_json::Value;

use crate::core::document::{group_key, values_equal, Document};
use crate::core::errors::{Result, StoreError};
use crate::core::path::FieldPath;
use crate::core::store::{SortDirection, SortKey};
use crate::ql::evaluator::{accumulate, evaluate, matches, project, single_operator, sort_documents};

/// Loads a whole collection by name, for `$lookup`
pub type Loader<'a> = dyn FnMut(&str) -> Result<Vec<Document>> + 'a;

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(StoreError::InvalidOperation(message.into()))
}

fn field_path(field: &str) -> Result<FieldPath> {
    Ok(FieldPath::from_str(field)?)
}

/// `"$field"` to the field's path
fn field_reference(value: &Value, stage: &str) -> Result<FieldPath> {
    match value.as_str().and_then(|s| s.strip_prefix('$')) {
        Some(field) if !field.starts_with('$') => field_path(field),
        _ => invalid(format!("{} expects a \"$field\" reference, found {}", stage, value)),
    }
}

/// Run every stage of a pipeline over the given documents
pub fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    load: &mut Loader<'_>,
) -> Result<Vec<Document>> {
    for stage in pipeline {
        let Some((name, spec)) = single_operator(stage) else {
            return invalid("each pipeline stage must be a single $-prefixed key");
        };
        trace!("Running stage {} over {} documents", name, documents.len());
        documents = run_stage(name, spec, documents, load)?;
    }
    Ok(documents)
}

fn run_stage(
    name: &str,
    spec: &Value,
    documents: Vec<Document>,
    load: &mut Loader<'_>,
) -> Result<Vec<Document>> {
    match name {
        "$match" => {
            let Value::Object(filter) = spec else {
                return invalid("$match expects an object");
            };
            let mut kept = Vec::new();
            for document in documents {
                if matches(&document, filter)? {
                    kept.push(document);
                }
            }
            Ok(kept)
        }
        "$project" => {
            let Value::Object(projection) = spec else {
                return invalid("$project expects an object");
            };
            if projection.is_empty() {
                return invalid("$project requires at least one field");
            }
            documents.iter().map(|d| project(d, projection)).collect()
        }
        "$addFields" | "$set" => add_fields(spec, documents, name),
        "$unset" => unset(spec, documents),
        "$replaceRoot" => replace_root(spec, documents),
        "$group" => group(spec, documents),
        "$sort" => sort(spec, documents),
        "$limit" => {
            let limit = match spec.as_u64() {
                Some(limit) if limit > 0 => limit,
                _ => return invalid("$limit expects a positive integer"),
            };
            Ok(documents.into_iter().take(usize::try_from(limit).unwrap_or(usize::MAX)).collect())
        }
        "$skip" => {
            let Some(skip) = spec.as_u64() else {
                return invalid("$skip expects a non-negative integer");
            };
            Ok(documents.into_iter().skip(usize::try_from(skip).unwrap_or(usize::MAX)).collect())
        }
        "$count" => {
            let field = match spec.as_str() {
                Some(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => field,
                _ => return invalid("$count expects a non-empty field name"),
            };
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut out = Document::new();
            out.insert(field.to_string(), Value::from(documents.len()));
            Ok(vec![out])
        }
        "$unwind" => unwind(spec, documents),
        "$lookup" => lookup(spec, documents, load),
        other => invalid(format!("unsupported pipeline stage {}", other)),
    }
}

fn add_fields(spec: &Value, documents: Vec<Document>, stage: &str) -> Result<Vec<Document>> {
    let Value::Object(fields) = spec else {
        return invalid(format!("{} expects an object", stage));
    };
    let fields = fields
        .iter()
        .map(|(field, expression)| Ok((field_path(field)?, expression)))
        .collect::<Result<Vec<_>>>()?;

    documents
        .into_iter()
        .map(|mut document| {
            for (path, expression) in &fields {
                let value = evaluate(expression, &document)?;
                path.set(&mut document, value);
            }
            Ok(document)
        })
        .collect()
}

fn unset(spec: &Value, documents: Vec<Document>) -> Result<Vec<Document>> {
    let fields = match spec {
        Value::String(field) => vec![field_path(field)?],
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(field) => field_path(field),
                None => invalid("$unset expects field names"),
            })
            .collect::<Result<Vec<_>>>()?,
        _ => return invalid("$unset expects a field name or an array of field names"),
    };

    Ok(documents
        .into_iter()
        .map(|mut document| {
            for path in &fields {
                path.remove(&mut document);
            }
            document
        })
        .collect())
}

fn replace_root(spec: &Value, documents: Vec<Document>) -> Result<Vec<Document>> {
    let Some(new_root) = spec.get("newRoot") else {
        return invalid("$replaceRoot requires newRoot");
    };
    documents
        .iter()
        .map(|document| match evaluate(new_root, document)? {
            Value::Object(root) => Ok(root),
            other => invalid(format!("$replaceRoot newRoot must be an object, found {}", other)),
        })
        .collect()
}

fn sort(spec: &Value, mut documents: Vec<Document>) -> Result<Vec<Document>> {
    let keys = match spec {
        Value::Object(keys) if !keys.is_empty() => keys,
        _ => return invalid("$sort expects a non-empty object"),
    };
    let keys = keys
        .iter()
        .map(|(field, direction)| match SortDirection::from_value(direction) {
            Some(direction) => Ok(SortKey::new(field.clone(), direction)),
            None => invalid(format!("$sort direction for '{}' must be 1 or -1", field)),
        })
        .collect::<Result<Vec<_>>>()?;

    sort_documents(&mut documents, &keys)?;
    Ok(documents)
}

/// Group accumulators and their inputs
enum Accumulator {
    Fold(String),
    First,
    Last,
    Push,
    AddToSet,
    Count,
}

impl Accumulator {
    fn parse(operator: &str) -> Result<Self> {
        match operator {
            "$sum" | "$avg" | "$min" | "$max" => Ok(Accumulator::Fold(operator.to_string())),
            "$first" => Ok(Accumulator::First),
            "$last" => Ok(Accumulator::Last),
            "$push" => Ok(Accumulator::Push),
            "$addToSet" => Ok(Accumulator::AddToSet),
            "$count" => Ok(Accumulator::Count),
            other => invalid(format!("unsupported accumulator {}", other)),
        }
    }

    fn finish(&self, values: Vec<Value>) -> Value {
        match self {
            Accumulator::Fold(operator) => accumulate(operator, &values),
            Accumulator::First => values.into_iter().next().unwrap_or(Value::Null),
            Accumulator::Last => values.into_iter().last().unwrap_or(Value::Null),
            Accumulator::Push => Value::Array(values),
            Accumulator::AddToSet => {
                let mut seen = Vec::new();
                let mut unique = Vec::new();
                for value in values {
                    let key = group_key(&value);
                    if !seen.contains(&key) {
                        seen.push(key);
                        unique.push(value);
                    }
                }
                Value::Array(unique)
            }
            Accumulator::Count => Value::from(values.len()),
        }
    }
}

struct Group {
    id: Value,
    inputs: Vec<Vec<Value>>,
}

fn group(spec: &Value, documents: Vec<Document>) -> Result<Vec<Document>> {
    let Value::Object(spec) = spec else {
        return invalid("$group expects an object");
    };
    let Some(id_expression) = spec.get("_id") else {
        return invalid("$group requires an _id");
    };

    let mut fields = Vec::new();
    for (field, definition) in spec.iter().filter(|(field, _)| field.as_str() != "_id") {
        let Some((operator, argument)) = definition.as_object().and_then(single_operator) else {
            return invalid(format!("$group field '{}' must be a single accumulator", field));
        };
        fields.push((field.clone(), Accumulator::parse(operator)?, argument));
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for document in &documents {
        let id = evaluate(id_expression, document)?;
        let slot = *index.entry(group_key(&id)).or_insert_with(|| {
            groups.push(Group { id, inputs: vec![Vec::new(); fields.len()] });
            groups.len() - 1
        });

        for (position, (_, accumulator, argument)) in fields.iter().enumerate() {
            let value = match accumulator {
                Accumulator::Count => Value::Null,
                _ => evaluate(argument, document)?,
            };
            groups[slot].inputs[position].push(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut out = Document::new();
            out.insert("_id".to_string(), group.id);
            for ((field, accumulator, _), values) in fields.iter().zip(group.inputs) {
                out.insert(field.clone(), accumulator.finish(values));
            }
            out
        })
        .collect())
}

fn unwind(spec: &Value, documents: Vec<Document>) -> Result<Vec<Document>> {
    let (path, preserve, index_field) = match spec {
        Value::String(_) => (field_reference(spec, "$unwind")?, false, None),
        Value::Object(options) => {
            let Some(path) = options.get("path") else {
                return invalid("$unwind requires a path");
            };
            let preserve = options
                .get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let index_field = match options.get("includeArrayIndex") {
                Some(Value::String(field)) => Some(field_path(field)?),
                Some(_) => return invalid("includeArrayIndex expects a field name"),
                None => None,
            };
            (field_reference(path, "$unwind")?, preserve, index_field)
        }
        _ => return invalid("$unwind expects a \"$field\" reference or an object"),
    };

    let mut out = Vec::new();
    for document in documents {
        match path.get(&document).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for (position, item) in items.into_iter().enumerate() {
                    let mut copy = document.clone();
                    path.set(&mut copy, item);
                    if let Some(index_field) = &index_field {
                        index_field.set(&mut copy, Value::from(position));
                    }
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    let mut copy = document;
                    if let Some(Value::Array(_)) = path.get(&copy) {
                        path.remove(&mut copy);
                    }
                    if let Some(index_field) = &index_field {
                        index_field.set(&mut copy, Value::Null);
                    }
                    out.push(copy);
                }
            }
            Some(_) => {
                let mut copy = document;
                if let Some(index_field) = &index_field {
                    index_field.set(&mut copy, Value::Null);
                }
                out.push(copy);
            }
        }
    }
    Ok(out)
}

/// Values a join key takes in a document; a missing key joins as null
fn join_values(document: &Document, path: &FieldPath) -> Vec<Value> {
    let mut values = Vec::new();
    for value in path.lookup(document) {
        match value {
            Value::Array(items) => values.extend(items.iter().cloned()),
            other => values.push(other.clone()),
        }
    }
    if values.is_empty() {
        values.push(Value::Null);
    }
    values
}

fn lookup(spec: &Value, documents: Vec<Document>, load: &mut Loader<'_>) -> Result<Vec<Document>> {
    let Value::Object(options) = spec else {
        return invalid("$lookup expects an object");
    };
    let Some(from) = options.get("from").and_then(Value::as_str) else {
        return invalid("$lookup requires 'from'");
    };
    let Some(target) = options.get("as").and_then(Value::as_str) else {
        return invalid("$lookup requires 'as'");
    };
    if options.contains_key("let") {
        return invalid("$lookup with 'let' variables is not supported");
    }

    let keys = match (options.get("localField"), options.get("foreignField")) {
        (Some(Value::String(local)), Some(Value::String(foreign))) => {
            Some((field_path(local)?, field_path(foreign)?))
        }
        (None, None) => None,
        _ => return invalid("$lookup requires both localField and foreignField"),
    };
    let sub_pipeline = match options.get("pipeline") {
        Some(Value::Array(stages)) => Some(
            stages
                .iter()
                .map(|stage| match stage {
                    Value::Object(stage) => Ok(stage.clone()),
                    _ => invalid("$lookup pipeline stages must be objects"),
                })
                .collect::<Result<Vec<Document>>>()?,
        ),
        Some(_) => return invalid("$lookup pipeline must be an array"),
        None => None,
    };
    if keys.is_none() && sub_pipeline.is_none() {
        return invalid("$lookup requires localField/foreignField or a pipeline");
    }

    let target = field_path(target)?;
    let foreign = load(from)?;

    let mut out = Vec::with_capacity(documents.len());
    for mut document in documents {
        let mut joined: Vec<Document> = match &keys {
            Some((local, foreign_field)) => {
                let wanted = join_values(&document, local);
                foreign
                    .iter()
                    .filter(|candidate| {
                        join_values(candidate, foreign_field)
                            .iter()
                            .any(|value| wanted.iter().any(|w| values_equal(w, value)))
                    })
                    .cloned()
                    .collect()
            }
            None => foreign.clone(),
        };

        if let Some(stages) = &sub_pipeline {
            joined = run_pipeline(joined, stages, load)?;
        }

        target.set(&mut document, Value::Array(joined.into_iter().map(Value::Object).collect()));
        out.push(document);
    }
    Ok(out)
}

/// Build a loader over a fixed set of collections
pub fn loader_from(collections: &HashMap<String, Vec<Document>>) -> impl FnMut(&str) -> Result<Vec<Document>> + '_ {
    move |name: &str| Ok(collections.get(name).cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(value: Value) -> Vec<Document> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item.as_object().cloned().unwrap())
            .collect()
    }

    fn stages(value: Value) -> Vec<Document> {
        docs(value)
    }

    fn shop() -> HashMap<String, Vec<Document>> {
        let mut collections = HashMap::new();
        collections.insert(
            "Inventory".to_string(),
            docs(json!([
                { "_id": 1, "name": "Laptop", "price": 1200, "categoryId": "c1" },
                { "_id": 2, "name": "Phone", "price": 800, "categoryId": "c1" },
                { "_id": 3, "name": "Chair", "price": 150, "categoryId": "c2" },
                { "_id": 4, "name": "Lamp", "price": 40 }
            ])),
        );
        collections.insert(
            "Category".to_string(),
            docs(json!([
                { "_id": 10, "id": "c1", "name": "Electronics" },
                { "_id": 11, "id": "c2", "name": "Furniture" }
            ])),
        );
        collections.insert(
            "Expenses".to_string(),
            docs(json!([
                { "category": "rent", "amount": 1000 },
                { "category": "food", "amount": 45.5 },
                { "category": "rent", "amount": 1000 },
                { "category": "food", "amount": 20 }
            ])),
        );
        collections
    }

    fn run(collection: &str, pipeline: Value) -> Result<Vec<Value>> {
        let collections = shop();
        let mut load = loader_from(&collections);
        let documents = collections.get(collection).cloned().unwrap_or_default();
        run_pipeline(documents, &stages(pipeline), &mut load)
            .map(|out| out.into_iter().map(Value::Object).collect())
    }

    #[test]
    fn test_lookup_unwind_match_project() {
        let out = run(
            "Inventory",
            json!([
                { "$lookup": { "from": "Category", "localField": "categoryId", "foreignField": "id", "as": "categoryInfo" } },
                { "$unwind": "$categoryInfo" },
                { "$match": { "categoryInfo.name": "Electronics" } },
                { "$project": { "_id": 0, "name": 1, "price": 1 } }
            ]),
        )
        .unwrap();

        assert_eq!(out, vec![json!({ "name": "Laptop", "price": 1200 }), json!({ "name": "Phone", "price": 800 })]);
    }

    #[test]
    fn test_group_accumulators() {
        let out = run(
            "Expenses",
            json!([
                { "$group": {
                    "_id": "$category",
                    "total": { "$sum": "$amount" },
                    "average": { "$avg": "$amount" },
                    "largest": { "$max": "$amount" },
                    "entries": { "$sum": 1 },
                    "amounts": { "$addToSet": "$amount" }
                } },
                { "$sort": { "total": -1 } }
            ]),
        )
        .unwrap();

        assert_eq!(
            out,
            vec![
                json!({ "_id": "rent", "total": 2000, "average": 1000.0, "largest": 1000, "entries": 2, "amounts": [1000] }),
                json!({ "_id": "food", "total": 65.5, "average": 32.75, "largest": 45.5, "entries": 2, "amounts": [45.5, 20] }),
            ]
        );
    }

    #[test]
    fn test_group_everything_then_project() {
        let out = run(
            "Expenses",
            json!([
                { "$group": { "_id": null, "total": { "$sum": "$amount" }, "n": { "$count": {} } } },
                { "$project": { "_id": 0, "total": 1, "n": 1 } }
            ]),
        )
        .unwrap();
        assert_eq!(out, vec![json!({ "total": 2065.5, "n": 4 })]);
    }

    #[test]
    fn test_count_sort_skip_limit() {
        let out = run("Inventory", json!([{ "$match": { "price": { "$gt": 100 } } }, { "$count": "expensive" }])).unwrap();
        assert_eq!(out, vec![json!({ "expensive": 3 })]);

        let empty = run("Inventory", json!([{ "$match": { "price": { "$gt": 1e9 } } }, { "$count": "n" }])).unwrap();
        assert!(empty.is_empty());

        let page = run(
            "Inventory",
            json!([{ "$sort": { "price": 1 } }, { "$skip": 1 }, { "$limit": 2 }, { "$project": { "_id": 0, "name": 1 } }]),
        )
        .unwrap();
        assert_eq!(page, vec![json!({ "name": "Chair" }), json!({ "name": "Phone" })]);
    }

    #[test]
    fn test_group_keeps_large_integral_floats_apart() {
        let collections = HashMap::new();
        let mut load = loader_from(&collections);
        let documents = docs(json!([{ "k": 1e20 }, { "k": 5e20 }, { "k": 1e20 }]));

        let grouped = run_pipeline(
            documents.clone(),
            &stages(json!([{ "$group": { "_id": "$k", "n": { "$sum": 1 } } }])),
            &mut load,
        )
        .unwrap();
        let grouped: Vec<Value> = grouped.into_iter().map(Value::Object).collect();
        assert_eq!(grouped, vec![json!({ "_id": 1e20, "n": 2 }), json!({ "_id": 5e20, "n": 1 })]);

        let set = run_pipeline(
            documents,
            &stages(json!([{ "$group": { "_id": null, "ks": { "$addToSet": "$k" } } }])),
            &mut load,
        )
        .unwrap();
        assert_eq!(set[0]["ks"], json!([1e20, 5e20]));
    }

    #[test]
    fn test_unwind_options() {
        let collections = HashMap::new();
        let mut load = loader_from(&collections);
        let documents = docs(json!([
            { "k": 1, "tags": ["a", "b"] },
            { "k": 2, "tags": [] },
            { "k": 3 },
            { "k": 4, "tags": "solo" }
        ]));

        let plain = run_pipeline(documents.clone(), &stages(json!([{ "$unwind": "$tags" }])), &mut load).unwrap();
        assert_eq!(plain.len(), 3);

        let preserved = run_pipeline(
            documents,
            &stages(json!([{ "$unwind": { "path": "$tags", "preserveNullAndEmptyArrays": true, "includeArrayIndex": "i" } }])),
            &mut load,
        )
        .unwrap();
        let preserved: Vec<Value> = preserved.into_iter().map(Value::Object).collect();
        assert_eq!(
            preserved,
            vec![
                json!({ "k": 1, "tags": "a", "i": 0 }),
                json!({ "k": 1, "tags": "b", "i": 1 }),
                json!({ "k": 2, "i": null }),
                json!({ "k": 3, "i": null }),
                json!({ "k": 4, "tags": "solo", "i": null }),
            ]
        );
    }

    #[test]
    fn test_add_fields_and_unset() {
        let out = run(
            "Inventory",
            json!([
                { "$match": { "_id": 3 } },
                { "$addFields": { "priceWithTax": { "$multiply": ["$price", 2] } } },
                { "$unset": ["categoryId", "_id"] }
            ]),
        )
        .unwrap();
        assert_eq!(out, vec![json!({ "name": "Chair", "price": 150, "priceWithTax": 300 })]);
    }

    #[test]
    fn test_lookup_with_sub_pipeline() {
        let out = run(
            "Category",
            json!([
                { "$lookup": {
                    "from": "Inventory",
                    "localField": "id",
                    "foreignField": "categoryId",
                    "pipeline": [{ "$count": "n" }],
                    "as": "stock"
                } },
                { "$project": { "_id": 0, "name": 1, "stock": 1 } }
            ]),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                json!({ "name": "Electronics", "stock": [{ "n": 2 }] }),
                json!({ "name": "Furniture", "stock": [{ "n": 1 }] }),
            ]
        );
    }

    #[test]
    fn test_invalid_stages() {
        assert!(run("Inventory", json!([{ "$bucketAuto": {} }])).is_err());
        assert!(run("Inventory", json!([{ "$limit": 0 }])).is_err());
        assert!(run("Inventory", json!([{ "$group": { "total": { "$sum": 1 } } }])).is_err());
        assert!(run("Inventory", json!([{ "$group": { "_id": null, "x": { "$median": "$price" } } }])).is_err());
        assert!(run("Inventory", json!([{ "$sort": { "price": "up" } }])).is_err());
    }
}
