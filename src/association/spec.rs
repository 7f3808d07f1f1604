use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    Model,
    object::foreign_key_for,
    query::ScopeRegistry,
    value::{Document, Value},
};

/// What happens to a member once it is unlinked from its owner, or the
/// owner is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dependent {
    /// Leave the member untouched.
    None,
    /// Run the full destroy path, hooks included.
    Destroy,
    /// Remove the member directly from the store, skipping hooks.
    DeleteAll,
    /// Clear the foreign key and save.
    #[default]
    Nullify,
}

/// Declaration of a one-to-many association from some owner to `T`.
///
/// Built once per owner type and shared by every proxy:
///
/// ```rust,ignore
/// static STATUSES: Lazy<Arc<AssociationSpec<Status>>> = Lazy::new(|| {
///     Arc::new(
///         AssociationSpec::many::<Project>("statuses")
///             .dependent(Dependent::Destroy)
///             .order("position"),
///     )
/// });
/// ```
pub struct AssociationSpec<T: Model> {
    name: String,
    owner: String,
    foreign_key: String,
    dependent: Dependent,
    conditions: Document,
    ordering: Option<Value>,
    scopes: Arc<ScopeRegistry<T>>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Model> AssociationSpec<T> {
    /// `has many` from `O`; the foreign key defaults to `<owner>_id`.
    pub fn many<O: Model>(name: impl Into<String>) -> Self {
        let owner = O::model_meta().name().to_string();
        Self {
            name: name.into(),
            foreign_key: foreign_key_for(&owner),
            owner,
            dependent: Dependent::default(),
            conditions: Document::new(),
            ordering: None,
            scopes: Arc::new(ScopeRegistry::for_model()),
            _target: PhantomData,
        }
    }

    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = field.into();
        self
    }

    pub fn dependent(mut self, policy: Dependent) -> Self {
        self.dependent = policy;
        self
    }

    /// Extra criteria every member must satisfy.
    pub fn conditions(mut self, conditions: Document) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn order(mut self, ordering: impl Into<Value>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_name(&self) -> &str {
        &self.owner
    }

    pub fn foreign_key_field(&self) -> &str {
        &self.foreign_key
    }

    pub fn dependent_policy(&self) -> Dependent {
        self.dependent
    }

    pub fn extra_conditions(&self) -> &Document {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<&Value> {
        self.ordering.as_ref()
    }

    pub(crate) fn scopes(&self) -> Arc<ScopeRegistry<T>> {
        Arc::clone(&self.scopes)
    }

    /// Raw finder options selecting the members of `owner`.
    pub(crate) fn base_options(&self, owner: uuid::Uuid) -> Document {
        let mut raw = self.conditions.clone();
        raw.insert(self.foreign_key.clone(), Value::Id(owner));
        if let Some(ordering) = &self.ordering {
            raw.insert("order".to_string(), ordering.clone());
        }
        raw
    }
}

impl<T: Model> fmt::Debug for AssociationSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationSpec")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("target", &T::model_meta().name())
            .field("foreign_key", &self.foreign_key)
            .field("dependent", &self.dependent)
            .field("conditions", &self.conditions)
            .field("ordering", &self.ordering)
            .finish()
    }
}
