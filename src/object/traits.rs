use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::association::AssociationRegistry;
use crate::object::meta::{Meta, ModelMeta};
use crate::query::ScopeRegistry;

///
/// A document type managed by the mapper.
///
/// Implementors flatten a [`Meta`] into their serialized form so the
/// identifier is stored as `_id`:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
/// #[serde(default)]
/// struct Status {
///     #[serde(flatten)]
///     meta: Meta,
///     project_id: Option<Uuid>,
///     name: Option<String>,
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    fn model_meta() -> &'static ModelMeta;

    fn meta(&self) -> &Meta;

    fn meta_mut(&mut self) -> &mut Meta;

    /// Validation rules run before every save through an association.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Class-level query builders that may be chained under a restricted scope.
    fn declare_scopes(_scopes: &mut ScopeRegistry<Self>) {}

    /// `has many` associations this model owns. Each one gets its dependent
    /// policy applied by [`crate::Engine::destroy_with_dependents`].
    fn declare_associations(_associations: &mut AssociationRegistry<Self>) {}
}

pub trait ModelIdentity {
    fn id(&self) -> Uuid;
    fn is_new(&self) -> bool;
    fn collection(&self) -> &'static str;
}

impl<T> ModelIdentity for T
where
    T: Model,
{
    fn id(&self) -> Uuid {
        self.meta().id()
    }

    fn is_new(&self) -> bool {
        self.meta().is_new()
    }

    fn collection(&self) -> &'static str {
        T::model_meta().collection_name()
    }
}

/// Field-level validation failures collected for one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationError {
    errors: Vec<(String, String)>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push((field.into(), message.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[(String, String)] {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self
            .errors
            .iter()
            .map(|(field, message)| format!("{} {}", field, message))
            .collect::<Vec<_>>();
        write!(f, "{}", messages.join(", "))
    }
}

impl std::error::Error for ValidationError {}
