use std::fmt;
use std::ops::Deref;

use tracing::debug;

use super::{
    coerce::coerce,
    operator::{Clause, expand_arrays, is_operator_map, translate},
    order::{self, Sort},
};
use crate::{
    error::Error,
    object::ModelMeta,
    value::{Document, Value},
};

/// Keys that configure the query rather than filter it.
pub const OPTION_KEYS: [&str; 8] = [
    "sort",
    "order",
    "skip",
    "offset",
    "limit",
    "fields",
    "select",
    "conditions",
];

/// Filter half of a compiled query: field path -> literal or operator clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria(Document);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Document {
        self.0
    }

    /// Key-union AND: entries of `other` replace identical keys.
    pub fn merge(&mut self, other: &Criteria) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }
}

impl Deref for Criteria {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Document> for Criteria {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

impl PartialEq<Document> for Criteria {
    fn eq(&self, other: &Document) -> bool {
        &self.0 == other
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        write!(f, "{}", serde_json::Value::Object(json))
    }
}

/// Paging, sorting and projection half of a compiled query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOptions {
    pub sort: Option<Sort>,
    pub skip: u64,
    /// `0` means unbounded.
    pub limit: u64,
    pub fields: Option<Vec<String>>,
}

impl QueryOptions {
    /// Overlays `other`: a present sort or projection wins, as does a
    /// non-zero skip or limit.
    pub fn merge(&mut self, other: &QueryOptions) {
        if other.sort.is_some() {
            self.sort = other.sort.clone();
        }
        if other.fields.is_some() {
            self.fields = other.fields.clone();
        }
        if other.skip != 0 {
            self.skip = other.skip;
        }
        if other.limit != 0 {
            self.limit = other.limit;
        }
    }
}

/// The immutable `(criteria, options)` pair produced from raw finder options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FinderOptions {
    criteria: Criteria,
    options: QueryOptions,
}

impl FinderOptions {
    pub fn new(meta: &ModelMeta, raw: impl Into<Value>) -> Result<Self, Error> {
        compile(meta, &raw.into())
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn into_parts(self) -> (Criteria, QueryOptions) {
        (self.criteria, self.options)
    }
}

/// Compiles a raw option mapping for the model described by `meta`.
pub fn compile(meta: &ModelMeta, raw: &Value) -> Result<FinderOptions, Error> {
    compile_with(meta, raw, true)
}

/// Compiles options layered over an existing scope. The discriminator is
/// already part of the base criteria, so it is not injected again.
pub(crate) fn compile_refinement(meta: &ModelMeta, raw: &Value) -> Result<FinderOptions, Error> {
    compile_with(meta, raw, false)
}

fn compile_with(
    meta: &ModelMeta,
    raw: &Value,
    inject_discriminator: bool,
) -> Result<FinderOptions, Error> {
    let raw = raw
        .as_document()
        .ok_or(Error::InvalidOptionsType(raw.type_name()))?;

    let mut directives = Document::new();
    let mut conditions = Vec::new();
    let mut candidates = Vec::new();

    for (key, value) in raw {
        let key = normalize_key(key);
        match option_key(key) {
            Some("conditions") => match value {
                Value::Document(nested) => conditions.extend(
                    nested
                        .iter()
                        .map(|(key, value)| (normalize_key(key).to_string(), value.clone())),
                ),
                Value::Null => {}
                other => {
                    return Err(Error::invalid_option(
                        "conditions",
                        format!("expected a mapping, got {}", other.type_name()),
                    ));
                }
            },
            Some(option) => {
                directives.insert(option.to_string(), value.clone());
            }
            None => candidates.push((key.to_string(), value.clone())),
        }
    }

    // Spliced conditions first so explicit top-level keys win.
    let mut criteria = build_criteria(meta, conditions.into_iter().chain(candidates))?;
    if inject_discriminator {
        if let Some((field, value)) = meta.discriminator() {
            criteria
                .0
                .entry(field.to_string())
                .or_insert_with(|| Value::String(value.to_string()));
        }
    }
    let options = resolve_options(&directives)?;

    debug!(
        model = meta.name(),
        criteria = %criteria,
        skip = options.skip,
        limit = options.limit,
        "compiled finder options"
    );

    Ok(FinderOptions { criteria, options })
}

fn normalize_key(key: &str) -> &str {
    key.trim()
}

fn option_key(key: &str) -> Option<&'static str> {
    OPTION_KEYS
        .into_iter()
        .find(|option| option.eq_ignore_ascii_case(key))
}

fn build_criteria(
    meta: &ModelMeta,
    pairs: impl Iterator<Item = (String, Value)>,
) -> Result<Criteria, Error> {
    let mut criteria = Document::new();

    for (key, value) in pairs {
        let Clause { field, value } = translate(&key, value);
        let value = coerce(&field, value, meta.is_id_field(&field))?;
        insert_clause(&mut criteria, field, expand_arrays(value));
    }

    Ok(Criteria(criteria))
}

/// `age.gt` and `age.lt` land in the same `{"$gt": .., "$lt": ..}` clause.
fn insert_clause(criteria: &mut Document, field: String, value: Value) {
    if let (Some(Value::Document(existing)), Value::Document(clause)) =
        (criteria.get_mut(&field), &value)
    {
        if is_operator_map(existing) && is_operator_map(clause) {
            existing.extend(clause.clone());
            return;
        }
    }
    criteria.insert(field, value);
}

fn resolve_options(directives: &Document) -> Result<QueryOptions, Error> {
    let sort = match (directives.get("sort"), directives.get("order")) {
        (Some(sort), _) if !sort.is_null() => Some(Sort::from_value(sort)?),
        (_, Some(order)) => Some(Sort::Directives(order::parse(order)?)),
        _ => None,
    };

    let fields = match directives.get("fields").or_else(|| directives.get("select")) {
        Some(value) => parse_fields(value)?,
        None => None,
    };

    let skip = match directives.get("skip").or_else(|| directives.get("offset")) {
        Some(value) => to_count("skip", value)?,
        None => 0,
    };

    let limit = match directives.get("limit") {
        Some(value) => to_count("limit", value)?,
        None => 0,
    };

    Ok(QueryOptions {
        sort: sort.filter(|sort| !sort.is_empty()),
        skip,
        limit,
        fields,
    })
}

/// Blank projections resolve to `None`, never to an empty list.
fn parse_fields(value: &Value) -> Result<Option<Vec<String>>, Error> {
    let fields = match value {
        Value::Null => Vec::new(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(field) => Ok(field.trim().to_string()),
                other => Err(Error::invalid_option(
                    "fields",
                    format!("expected field names, got {}", other.type_name()),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Document(doc) => doc
            .iter()
            .filter(|(_, flag)| !matches!(flag, Value::Int(0) | Value::Bool(false)))
            .map(|(field, _)| field.clone())
            .collect(),
        other => {
            return Err(Error::invalid_option(
                "fields",
                format!("cannot project a {}", other.type_name()),
            ));
        }
    };

    Ok((!fields.is_empty()).then_some(fields))
}

fn to_count(key: &str, value: &Value) -> Result<u64, Error> {
    match value {
        Value::Null => Ok(0),
        Value::Int(n) => u64::try_from(*n)
            .map_err(|_| Error::invalid_option(key, format!("{} is negative", n))),
        Value::String(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::invalid_option(key, format!("{:?} is not a count", text))),
        other => Err(Error::invalid_option(
            key,
            format!("expected an integer, got {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_to_count() {
        assert_eq!(to_count("skip", &Value::from("2")).unwrap(), 2);
        assert_eq!(to_count("skip", &Value::from(" 7 ")).unwrap(), 7);
        assert_eq!(to_count("limit", &Value::Null).unwrap(), 0);
        assert!(to_count("limit", &Value::from(-1)).is_err());
        assert!(to_count("limit", &Value::from("ten")).is_err());
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(parse_fields(&Value::from("")).unwrap(), None);
        assert_eq!(parse_fields(&Value::from(Vec::<String>::new())).unwrap(), None);
        assert_eq!(
            parse_fields(&Value::from("a, b")).unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_fields(&Value::from(doc! { "a" => 1, "b" => 0 })).unwrap(),
            Some(vec!["a".to_string()])
        );
    }

    #[test]
    fn test_operators_on_one_field_merge() {
        let meta = ModelMeta::new("Room");
        let finder = FinderOptions::new(&meta, doc! { "age.gt" => 1, "age.lt" => 9 }).unwrap();
        assert_eq!(
            finder.criteria(),
            &doc! { "age" => doc! { "$gt" => 1, "$lt" => 9 } }
        );
    }

    #[test]
    fn test_option_keys_are_case_insensitive() {
        let meta = ModelMeta::new("Room");
        let finder = FinderOptions::new(&meta, doc! { "LIMIT" => 3, " skip " => 1 }).unwrap();
        assert!(finder.criteria().is_empty());
        assert_eq!(finder.options().limit, 3);
        assert_eq!(finder.options().skip, 1);
    }

    #[test]
    fn test_query_options_merge() {
        let mut base = QueryOptions {
            skip: 5,
            limit: 10,
            ..Default::default()
        };
        base.merge(&QueryOptions {
            limit: 2,
            fields: Some(vec!["name".into()]),
            ..Default::default()
        });
        assert_eq!(base.skip, 5);
        assert_eq!(base.limit, 2);
        assert_eq!(base.fields, Some(vec!["name".to_string()]));
    }
}
