//! Criteria evaluation over stored JSON bodies.
//!
//! Identifiers are stored in their string form, so criteria values are
//! lowered through [`Value::to_json`] before comparison.

use std::cmp::Ordering;

use serde_json::{Map, Value as Json};

use crate::{
    error::Error,
    query::{NATURAL, QueryOptions},
    value::{Document, Value},
};

use super::Record;

pub fn matches(body: &Map<String, Json>, criteria: &Document) -> Result<bool, Error> {
    for (path, condition) in criteria {
        if !matches_field(lookup(body, path), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolves `a.b.0.c` style paths.
pub fn lookup<'a>(body: &'a Map<String, Json>, path: &str) -> Option<&'a Json> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Json::Object(map) => map.get(segment)?,
            Json::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn matches_field(actual: Option<&Json>, condition: &Value) -> Result<bool, Error> {
    match condition {
        Value::Document(clause) if condition.is_operator_document() => {
            for (op, operand) in clause {
                if !apply_operator(actual, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::Document(nested) if has_operator_inside(nested) => match actual {
            Some(Json::Object(map)) => matches(map, nested),
            _ => Ok(false),
        },
        other => Ok(equals(actual, &other.to_json())),
    }
}

fn has_operator_inside(doc: &Document) -> bool {
    doc.values().any(|value| match value {
        Value::Document(inner) => value.is_operator_document() || has_operator_inside(inner),
        _ => false,
    })
}

/// Equality with array containment: `{"tags": "a"}` matches `["a", "b"]`.
fn equals(actual: Option<&Json>, expected: &Json) -> bool {
    match (actual, expected) {
        (None, Json::Null) => true,
        (None, _) => false,
        (Some(Json::Array(items)), expected) if !expected.is_array() => {
            items.iter().any(|item| same(item, expected))
        }
        (Some(actual), expected) => same(actual, expected),
    }
}

fn same(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Ordering used by sorts: missing and null values come first.
fn sort_order(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

fn compare_with(actual: Option<&Json>, operand: &Json, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Json::Array(items)) => items
            .iter()
            .any(|item| compare(item, operand).is_some_and(accept)),
        Some(actual) => compare(actual, operand).is_some_and(accept),
        None => false,
    }
}

fn apply_operator(actual: Option<&Json>, op: &str, operand: &Value) -> Result<bool, Error> {
    let json = operand.to_json();
    let matched = match op {
        "$eq" => equals(actual, &json),
        "$ne" => !equals(actual, &json),
        "$gt" => compare_with(actual, &json, Ordering::is_gt),
        "$gte" => compare_with(actual, &json, Ordering::is_ge),
        "$lt" => compare_with(actual, &json, Ordering::is_lt),
        "$lte" => compare_with(actual, &json, Ordering::is_le),
        "$in" => operand_list(op, &json)?
            .iter()
            .any(|candidate| equals(actual, candidate)),
        "$nin" => !operand_list(op, &json)?
            .iter()
            .any(|candidate| equals(actual, candidate)),
        "$all" => {
            let wanted = operand_list(op, &json)?;
            match actual {
                Some(Json::Array(items)) => wanted
                    .iter()
                    .all(|want| items.iter().any(|item| same(item, want))),
                _ => false,
            }
        }
        "$exists" => {
            let flag = !matches!(operand, Value::Bool(false) | Value::Int(0) | Value::Null);
            actual.is_some() == flag
        }
        "$size" => match (actual, operand.as_int()) {
            (Some(Json::Array(items)), Some(size)) => items.len() as i64 == size,
            _ => false,
        },
        "$mod" => match (actual.and_then(Json::as_i64), json.as_array().map(Vec::as_slice)) {
            (Some(value), Some([divisor, remainder])) => {
                match (divisor.as_i64(), remainder.as_i64()) {
                    (Some(0), _) | (None, _) | (_, None) => {
                        return Err(Error::Storage("$mod needs [divisor, remainder]".into()));
                    }
                    (Some(divisor), Some(remainder)) => value % divisor == remainder,
                }
            }
            (None, _) => false,
            _ => return Err(Error::Storage("$mod needs [divisor, remainder]".into())),
        },
        "$where" => {
            return Err(Error::Storage(
                "$where is not supported by the memory adapter".into(),
            ));
        }
        other => return Err(Error::Storage(format!("unsupported operator {}", other))),
    };
    Ok(matched)
}

fn operand_list<'a>(op: &str, operand: &'a Json) -> Result<&'a Vec<Json>, Error> {
    operand
        .as_array()
        .ok_or_else(|| Error::Storage(format!("{} expects an array operand", op)))
}

/// Applies sort, skip, limit and projection to records already filtered.
///
/// `records` must be in insertion order, which is the `$natural` order.
pub fn shape(records: Vec<Record>, options: &QueryOptions) -> Vec<Record> {
    let mut indexed: Vec<(usize, Record)> = records.into_iter().enumerate().collect();

    if let Some(sort) = &options.sort {
        let directives = sort.directives();
        indexed.sort_by(|(ia, a), (ib, b)| {
            for directive in &directives {
                let ordering = if directive.field == NATURAL {
                    ia.cmp(ib)
                } else {
                    sort_order(lookup(&a.data, &directive.field), lookup(&b.data, &directive.field))
                };
                let ordering = match directive.direction.as_i32() {
                    -1 => ordering.reverse(),
                    _ => ordering,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
    let limit = match options.limit {
        0 => usize::MAX,
        n => usize::try_from(n).unwrap_or(usize::MAX),
    };

    indexed
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|(_, record)| match &options.fields {
            Some(fields) => project(record, fields),
            None => record,
        })
        .collect()
}

/// Keeps `_id` plus the named fields; dotted names keep their root field.
fn project(record: Record, fields: &[String]) -> Record {
    let Record { id, data } = record;
    let data = data
        .into_iter()
        .filter(|(key, _)| {
            key == "_id"
                || fields
                    .iter()
                    .any(|field| field.split('.').next() == Some(key.as_str()))
        })
        .collect();
    Record::new(id, data)
}

/// Applies a `{"$set": {..}, "$unset": {..}}` modifier in place.
pub fn apply_update(body: &mut Map<String, Json>, update: &Document) -> Result<(), Error> {
    for (modifier, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            Error::Storage(format!("{} expects a mapping of fields", modifier))
        })?;
        match modifier.as_str() {
            "$set" => {
                for (field, value) in fields {
                    body.insert(field.clone(), value.to_json());
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    body.remove(field);
                }
            }
            other => {
                return Err(Error::Storage(format!("unsupported update modifier {}", other)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::query::{OrderDirective, Sort};
    use uuid::Uuid;

    fn body(json: Json) -> Map<String, Json> {
        match json {
            Json::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_equality_and_containment() {
        let data = body(serde_json::json!({ "name": "a", "tags": ["x", "y"] }));
        assert!(matches(&data, &doc! { "name" => "a" }).unwrap());
        assert!(matches(&data, &doc! { "tags" => "y" }).unwrap());
        assert!(!matches(&data, &doc! { "tags" => "z" }).unwrap());
        assert!(matches(&data, &doc! { "missing" => Value::Null }).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        let data = body(serde_json::json!({ "age": 30, "address": { "city": "Oslo" } }));
        assert!(matches(&data, &doc! { "age" => doc! { "$gt" => 20, "$lte" => 30 } }).unwrap());
        assert!(!matches(&data, &doc! { "age" => doc! { "$lt" => 30 } }).unwrap());
        assert!(matches(&data, &doc! { "age" => doc! { "$in" => vec![1, 30] } }).unwrap());
        assert!(matches(&data, &doc! { "age" => doc! { "$mod" => vec![7, 2] } }).unwrap());
        assert!(matches(&data, &doc! { "address.city" => "Oslo" }).unwrap());
        assert!(matches(&data, &doc! { "nick" => doc! { "$exists" => false } }).unwrap());
    }

    #[test]
    fn test_ids_compare_by_text() {
        let id = Uuid::now_v7();
        let data = body(serde_json::json!({ "room_id": id.to_string() }));
        assert!(matches(&data, &doc! { "room_id" => id }).unwrap());
    }

    #[test]
    fn test_where_is_rejected() {
        let data = body(serde_json::json!({ "age": 1 }));
        let criteria = doc! { "age" => doc! { "$where" => "this.age > 0" } };
        assert!(matches!(matches(&data, &criteria), Err(Error::Storage(_))));
    }

    #[test]
    fn test_shape_sorts_and_pages() {
        let records: Vec<Record> = [3, 1, 2]
            .into_iter()
            .map(|n| Record::new(Uuid::now_v7(), body(serde_json::json!({ "n": n }))))
            .collect();
        let options = QueryOptions {
            sort: Some(Sort::Directives(vec![OrderDirective::desc("n")])),
            skip: 1,
            limit: 1,
            fields: None,
        };
        let shaped = shape(records, &options);
        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0].get("n"), Some(&Json::from(2)));
    }

    #[test]
    fn test_unset_update() {
        let mut data = body(serde_json::json!({ "project_id": "x", "name": "a" }));
        apply_update(&mut data, &doc! { "$unset" => doc! { "project_id" => 1 } }).unwrap();
        assert!(data.get("project_id").is_none());
        assert_eq!(data.get("name"), Some(&Json::from("a")));
    }
}
