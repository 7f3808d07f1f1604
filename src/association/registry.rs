use std::fmt;
use std::sync::Arc;

use super::{dependent::Cascade, spec::AssociationSpec};
use crate::{Engine, Model};

pub type CascadeFactory<O> = Arc<dyn Fn(&Engine, &O) -> Box<dyn Cascade> + Send + Sync>;

/// The `has many` associations a model owns, as declared in
/// [`Model::declare_associations`]. Owner destroys walk this list so no
/// declared association can be skipped.
pub struct AssociationRegistry<O: Model> {
    names: Vec<String>,
    factories: Vec<CascadeFactory<O>>,
}

impl<O: Model> AssociationRegistry<O> {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            factories: Vec::new(),
        }
    }

    /// Registry populated from [`Model::declare_associations`].
    pub fn for_model() -> Self {
        let mut registry = Self::new();
        O::declare_associations(&mut registry);
        registry
    }

    pub fn has_many<T: Model>(&mut self, spec: &Arc<AssociationSpec<T>>) -> &mut Self {
        let spec = Arc::clone(spec);
        self.names.push(spec.name().to_string());
        self.factories.push(Arc::new(move |engine: &Engine, owner: &O| {
            Box::new(engine.many(owner, &spec)) as Box<dyn Cascade>
        }));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// A fresh proxy for every declared association of `owner`.
    pub fn cascades(&self, engine: &Engine, owner: &O) -> Vec<Box<dyn Cascade>> {
        self.factories
            .iter()
            .map(|factory| factory(engine, owner))
            .collect()
    }
}

impl<O: Model> Default for AssociationRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Model> fmt::Debug for AssociationRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}
