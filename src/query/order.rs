use std::fmt;

use crate::{
    error::Error,
    value::{Document, Value},
};

/// Marker for store-native ordering; kept verbatim as a field token.
pub const NATURAL: &str = "$natural";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `1` for ascending, `-1` for descending.
    pub fn as_i32(&self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    /// Case-insensitive `asc`/`desc`.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if token.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(1) => Some(Direction::Asc),
            Value::Int(-1) => Some(Direction::Desc),
            Value::String(token) => Direction::parse(token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderDirective {
    pub field: String,
    pub direction: Direction,
}

impl OrderDirective {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Desc)
    }

    pub fn reverse(&self) -> Self {
        Self::new(self.field.clone(), self.direction.reverse())
    }
}

impl fmt::Display for OrderDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{} asc", self.field),
            Direction::Desc => write!(f, "{} desc", self.field),
        }
    }
}

/// Directives travel through raw options as `[field, 1 | -1]` pairs.
impl From<OrderDirective> for Value {
    fn from(directive: OrderDirective) -> Self {
        Value::Array(vec![
            Value::String(directive.field),
            Value::Int(directive.direction.as_i32() as i64),
        ])
    }
}

/// Resolved sort option.
#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    Directives(Vec<OrderDirective>),
    /// A sort mapping handed straight to the store, e.g. `{"$natural": -1}`.
    Document(Document),
}

impl Sort {
    pub fn is_empty(&self) -> bool {
        match self {
            Sort::Directives(directives) => directives.is_empty(),
            Sort::Document(doc) => doc.is_empty(),
        }
    }

    /// Direction applied to `field`, if the sort mentions it.
    pub fn direction_of(&self, field: &str) -> Option<Direction> {
        match self {
            Sort::Directives(directives) => directives
                .iter()
                .find(|directive| directive.field == field)
                .map(|directive| directive.direction),
            Sort::Document(doc) => doc.get(field).and_then(Direction::from_value),
        }
    }

    /// Ordered `(field, direction)` pairs regardless of representation.
    pub fn directives(&self) -> Vec<OrderDirective> {
        match self {
            Sort::Directives(directives) => directives.clone(),
            Sort::Document(doc) => doc
                .iter()
                .filter_map(|(field, value)| {
                    Direction::from_value(value).map(|dir| OrderDirective::new(field.clone(), dir))
                })
                .collect(),
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Sort::Directives(directives) => {
                Sort::Directives(directives.iter().map(OrderDirective::reverse).collect())
            }
            Sort::Document(doc) => Sort::Document(
                doc.iter()
                    .map(|(field, value)| {
                        let flipped = match Direction::from_value(value) {
                            Some(dir) => Value::Int(dir.reverse().as_i32() as i64),
                            None => value.clone(),
                        };
                        (field.clone(), flipped)
                    })
                    .collect(),
            ),
        }
    }

    /// Interprets a raw `sort` option. Mappings stay raw; everything else is
    /// parsed into directives.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Document(doc) => Ok(Sort::Document(doc.clone())),
            other => parse(other).map(Sort::Directives),
        }
    }
}

/// Parses an ordering expression into `(field, direction)` pairs.
///
/// Accepts `"foo desc, bar"` strings, sequences of such strings,
/// `[field, 1 | -1]` pairs or directive values, and `{field: dir}` mappings.
pub fn parse(order: &Value) -> Result<Vec<OrderDirective>, Error> {
    match order {
        Value::String(text) => parse_str(text),
        Value::Array(items) => {
            let mut directives = Vec::with_capacity(items.len());
            for item in items {
                directives.extend(parse_item(item)?);
            }
            Ok(directives)
        }
        Value::Document(doc) => doc
            .iter()
            .map(|(field, value)| {
                Direction::from_value(value)
                    .map(|dir| OrderDirective::new(field.clone(), dir))
                    .ok_or_else(|| invalid(format!("bad direction {} for {}", value, field)))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(invalid(format!("cannot order by a {}", other.type_name()))),
    }
}

pub fn parse_str(text: &str) -> Result<Vec<OrderDirective>, Error> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(parse_token)
        .collect()
}

fn parse_token(token: &str) -> Result<OrderDirective, Error> {
    let mut parts = token.split_whitespace();
    let field = parts
        .next()
        .ok_or_else(|| invalid("empty order token"))?;
    let direction = match parts.next() {
        Some(dir) => Direction::parse(dir)
            .ok_or_else(|| invalid(format!("unknown direction `{}`", dir)))?,
        None => Direction::Asc,
    };
    if let Some(extra) = parts.next() {
        return Err(invalid(format!("unexpected `{}` in `{}`", extra, token)));
    }
    Ok(OrderDirective::new(field, direction))
}

fn parse_item(item: &Value) -> Result<Vec<OrderDirective>, Error> {
    match item {
        Value::String(text) => parse_str(text),
        Value::Array(pair) => match pair.as_slice() {
            [Value::String(field), dir] => Direction::from_value(dir)
                .map(|dir| vec![OrderDirective::new(field.clone(), dir)])
                .ok_or_else(|| invalid(format!("bad direction {} for {}", dir, field))),
            [Value::String(field)] => Ok(vec![OrderDirective::asc(field.clone())]),
            _ => Err(invalid(format!("malformed order pair {}", item))),
        },
        Value::Document(_) => parse(item),
        other => Err(invalid(format!("cannot order by a {}", other.type_name()))),
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::invalid_option("order", reason)
}
