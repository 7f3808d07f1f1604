use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Model, error::Error, value::Document};

/// Stored form of a document: its identifier plus the serialized body.
///
/// The body always carries `_id` as well so criteria on `_id` match it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn new(id: Uuid, mut data: serde_json::Map<String, serde_json::Value>) -> Self {
        data.insert("_id".to_string(), serde_json::Value::String(id.to_string()));
        Self { id, data }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }

    /// Rebuilds a model from its stored form and marks it persisted.
    pub fn to_model<T: Model>(self) -> Result<T, Error> {
        let mut val = serde_json::from_value::<T>(serde_json::Value::Object(self.data))
            .map_err(|e| Error::Deserialize(e.to_string()))?;
        let meta = val.meta_mut();
        if meta.id != self.id {
            return Err(Error::TypeMismatch);
        }
        meta.mark_persisted();
        Ok(val)
    }

    pub fn from_model<T: Model>(model: &T) -> Result<Self, Error> {
        match serde_json::to_value(model).map_err(|e| Error::Serialize(e.to_string()))? {
            serde_json::Value::Object(data) => Ok(Self::new(model.meta().id, data)),
            _ => Err(Error::Serialize(format!(
                "{} does not serialize to a mapping",
                T::model_meta().name()
            ))),
        }
    }
}

/// Writes `attributes` onto `model` through its serialized form.
///
/// Identity and the persisted flag survive the round trip.
pub(crate) fn assign_attributes<T: Model>(model: &mut T, attributes: &Document) -> Result<(), Error> {
    if attributes.is_empty() {
        return Ok(());
    }

    let meta = model.meta().clone();
    let mut data = match serde_json::to_value(&*model).map_err(|e| Error::Serialize(e.to_string()))? {
        serde_json::Value::Object(data) => data,
        _ => return Err(Error::TypeMismatch),
    };
    for (field, value) in attributes {
        if field == "_id" || field == "id" {
            continue;
        }
        data.insert(field.clone(), value.to_json());
    }

    let mut updated = serde_json::from_value::<T>(serde_json::Value::Object(data))
        .map_err(|e| Error::Deserialize(e.to_string()))?;
    *updated.meta_mut() = meta;
    *model = updated;
    Ok(())
}

/// Serialized body of a model without its identity, used to detect edits.
pub(crate) fn body_of<T: Model>(model: &T) -> Result<serde_json::Value, Error> {
    let mut data = serde_json::to_value(model).map_err(|e| Error::Serialize(e.to_string()))?;
    if let serde_json::Value::Object(map) = &mut data {
        map.remove("created_at");
        map.remove("updated_at");
    }
    Ok(data)
}
