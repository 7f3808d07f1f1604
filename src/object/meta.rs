use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DISCRIMINATOR_FIELD, demodulize_snake};

/// Per-document identity, flattened into every model.
///
/// Two metas are equal when they carry the same id; timestamps and the
/// persisted flag do not take part in document identity.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Meta {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub(crate) persisted: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            persisted: false,
        }
    }
}

impl PartialEq for Meta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Meta {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }
}

/// Static description of a model, computed once at registration.
///
/// ```rust
/// use docscope::ModelMeta;
///
/// let meta = ModelMeta::new("Enter")
///     .collection("messages")
///     .id_field("room_id")
///     .single_collection_inherited();
///
/// assert!(meta.requires_discriminator());
/// assert!(meta.is_id_field("room_id"));
/// ```
#[derive(Debug, Clone)]
pub struct ModelMeta {
    name: String,
    collection: String,
    id_fields: BTreeSet<String>,
    inherited: bool,
    discriminator_field: String,
}

impl ModelMeta {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: demodulize_snake(&name),
            name,
            id_fields: BTreeSet::new(),
            inherited: false,
            discriminator_field: DISCRIMINATOR_FIELD.to_string(),
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Declares a field holding identifiers; criteria on it get coerced.
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_fields.insert(field.into());
        self
    }

    /// Marks the model as a non-root type stored in its ancestor's collection.
    pub fn single_collection_inherited(mut self) -> Self {
        self.inherited = true;
        self
    }

    pub fn discriminator_field(mut self, field: impl Into<String>) -> Self {
        self.discriminator_field = field.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn is_id_field(&self, field: &str) -> bool {
        field == "_id" || self.id_fields.contains(field)
    }

    pub fn requires_discriminator(&self) -> bool {
        self.inherited
    }

    /// `(field, value)` to inject into criteria, when the model needs one.
    pub fn discriminator(&self) -> Option<(&str, &str)> {
        self.inherited
            .then(|| (self.discriminator_field.as_str(), self.name.as_str()))
    }
}
