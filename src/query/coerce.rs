use uuid::Uuid;

use crate::{error::Error, value::Value};

/// Operators whose operands are compared against the field value itself,
/// and therefore must be identifiers on identifier fields.
const ID_OPERANDS: [&str; 9] = [
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$all",
];

/// Normalizes a criterion value for `field` into the internal identifier type.
///
/// Non-identifier fields pass through untouched; this is not general type
/// casting. Arrays and operator clauses are walked so that `{"$in": [..]}`
/// and `{"$ne": ".."}` on an identifier field coerce their operands too.
pub fn coerce(field: &str, value: Value, is_id_typed: bool) -> Result<Value, Error> {
    if !is_id_typed {
        return Ok(value);
    }

    match value {
        Value::String(text) => parse_id(field, &text).map(Value::Id),
        Value::Array(values) => values
            .into_iter()
            .map(|value| coerce(field, value, true))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Document(doc) if doc.keys().any(|key| key.starts_with('$')) => {
            let mut coerced = doc.clone();
            for (op, operand) in doc {
                if ID_OPERANDS.contains(&op.as_str()) {
                    coerced.insert(op, coerce(field, operand, true)?);
                }
            }
            Ok(Value::Document(coerced))
        }
        other => Ok(other),
    }
}

pub fn parse_id(field: &str, text: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(text.trim()).map_err(|_| Error::InvalidIdentifier {
        field: field.to_string(),
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_string_becomes_id() {
        let id = Uuid::now_v7();
        let coerced = coerce("_id", Value::from(id.to_string()), true).unwrap();
        assert_eq!(coerced, Value::Id(id));
    }

    #[test]
    fn test_id_passes_through() {
        let id = Uuid::now_v7();
        assert_eq!(coerce("_id", Value::Id(id), true).unwrap(), Value::Id(id));
    }

    #[test]
    fn test_non_id_field_untouched() {
        let value = Value::from("not-an-id");
        assert_eq!(coerce("name", value.clone(), false).unwrap(), value);
    }

    #[test]
    fn test_invalid_identifier() {
        let err = coerce("room_id", Value::from("nope"), true).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidIdentifier { ref field, ref value } if field == "room_id" && value == "nope"
        ));
    }

    #[test]
    fn test_operator_operands_coerced() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let value = Value::from(doc! {
            "$in" => vec![a.to_string(), b.to_string()],
            "$exists" => true,
        });
        let coerced = coerce("_id", value, true).unwrap();
        assert_eq!(
            coerced,
            Value::from(doc! {
                "$in" => vec![Value::Id(a), Value::Id(b)],
                "$exists" => true,
            })
        );
    }
}
