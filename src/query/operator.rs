use std::fmt;

use crate::value::{Document, Value};

/// Comparison operators that may be attached to a criteria key as a suffix,
/// e.g. `"age.gt"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    In,
    Nin,
    Mod,
    Size,
    Exists,
    /// Raw passthrough to the store's `$where`.
    Where,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Ne,
        Operator::In,
        Operator::Nin,
        Operator::Mod,
        Operator::Size,
        Operator::Exists,
        Operator::Where,
    ];

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.suffix() == suffix)
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Mod => "mod",
            Operator::Size => "size",
            Operator::Exists => "exists",
            Operator::Where => "where",
        }
    }

    /// Store-level operator key, e.g. `$gt`.
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Ne => "$ne",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Mod => "$mod",
            Operator::Size => "$size",
            Operator::Exists => "$exists",
            Operator::Where => "$where",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single field's contribution to the criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub value: Value,
}

/// Splits `"age.gt"` into `("age", Some(Operator::Gt))`.
///
/// Keys whose last segment is not a known operator are plain field paths
/// (`"address.city"`) and come back whole.
pub fn split_key(key: &str) -> (&str, Option<Operator>) {
    match key.rsplit_once('.') {
        Some((field, suffix)) if !field.is_empty() => match Operator::from_suffix(suffix) {
            Some(op) => (field, Some(op)),
            None => (key, None),
        },
        _ => (key, None),
    }
}

/// Turns a raw criteria key and its value into a clause. `id` is renamed to
/// `_id`; a key without an operator suffix is kept as a plain criterion.
pub fn translate(key: &str, value: Value) -> Clause {
    let (field, op) = split_key(key);
    let field = if field == "id" { "_id" } else { field };
    Clause {
        field: field.to_string(),
        value: match op {
            Some(op) => operator_clause(op, value),
            None => value,
        },
    }
}

pub fn operator_clause(op: Operator, value: Value) -> Value {
    let mut clause = Document::new();
    clause.insert(op.key().to_string(), value);
    Value::Document(clause)
}

/// Rewrites plain array values as `{"$in": [..]}`, descending through nested
/// mappings. Operator mappings are left alone so they are never wrapped twice.
pub fn expand_arrays(value: Value) -> Value {
    match value {
        Value::Array(values) => operator_clause(Operator::In, Value::Array(values)),
        Value::Document(doc) if !is_operator_map(&doc) => Value::Document(
            doc.into_iter()
                .map(|(key, value)| (key, expand_arrays(value)))
                .collect(),
        ),
        other => other,
    }
}

pub(crate) fn is_operator_map(doc: &Document) -> bool {
    doc.keys().any(|key| key.starts_with('$'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("age.gt"), ("age", Some(Operator::Gt)));
        assert_eq!(split_key("id.ne"), ("id", Some(Operator::Ne)));
        assert_eq!(split_key("address.city"), ("address.city", None));
        assert_eq!(split_key("name"), ("name", None));
        assert_eq!(split_key(".gt"), (".gt", None));
    }

    #[test]
    fn test_every_suffix_translates() {
        for op in Operator::ALL {
            let clause = translate(&format!("age.{}", op.suffix()), Value::from(21));
            assert_eq!(clause.field, "age");
            assert_eq!(clause.value, Value::from(doc! { op.key() => 21 }));
        }
    }

    #[test]
    fn test_unknown_suffix_is_plain_criterion() {
        let clause = translate("address.city", Value::from("Paris"));
        assert_eq!(clause.field, "address.city");
        assert_eq!(clause.value, Value::from("Paris"));
    }

    #[test]
    fn test_id_key_is_renamed() {
        assert_eq!(translate("id", Value::from(1)).field, "_id");
        let clause = translate("id.nin", Value::from(vec![1]));
        assert_eq!(clause.field, "_id");
        assert_eq!(clause.value, Value::from(doc! { "$nin" => vec![1] }));
        assert_eq!(translate("room_id", Value::from(1)).field, "room_id");
    }

    #[test]
    fn test_expand_arrays_recurses_without_double_wrap() {
        let value = Value::from(doc! {
            "bar" => vec![1, 2, 3],
            "baz" => doc! { "$any" => vec![1, 2, 3] },
        });
        assert_eq!(
            expand_arrays(value),
            Value::from(doc! {
                "bar" => doc! { "$in" => vec![1, 2, 3] },
                "baz" => doc! { "$any" => vec![1, 2, 3] },
            })
        );
    }
}
