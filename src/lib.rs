//! # Docscope
//!
//! Docscope is the query layer of a document mapper. It turns loosely typed
//! finder options into precise queries, and keeps `has many` associations
//! between documents consistent with the store.
//!
//! ## Finder options
//!
//! Conditions and query directives travel together in one mapping. The
//! compiler separates them, expands operator keys, coerces identifiers and
//! rewrites arrays into `$in` clauses:
//!
//! ```rust,ignore
//! let finder = FinderOptions::new(
//!     Status::model_meta(),
//!     doc! {
//!         "position.gte" => 2,
//!         "tags" => vec!["open", "urgent"],
//!         "order" => "position desc",
//!         "limit" => "10",
//!     },
//! )?;
//! // criteria: {"position": {"$gte": 2}, "tags": {"$in": ["open", "urgent"]}}
//! // options:  sort [position desc], limit 10
//! ```
//!
//! ## Deferred scopes
//!
//! A [`QueryScope`] accumulates criteria and options and only touches the
//! store when materialized:
//!
//! ```rust,ignore
//! let open = engine
//!     .query::<Status>()
//!     .filter(doc! { "name" => "open" })?
//!     .sort("position")?;
//!
//! let page = open.paginate(1, 20).await?;
//! let newest = open.last().await?;
//! ```
//!
//! ## Associations
//!
//! An [`AssociationProxy`] is a cached, foreign-key scoped view of the
//! documents belonging to one owner:
//!
//! ```rust,ignore
//! let mut statuses = engine.many(&project, &STATUSES);
//! statuses.create(doc! { "name" => "Todo" }).await?;
//! statuses.build(doc! { "name" => "Draft" })?;
//!
//! assert_eq!(statuses.size().await?, 2);
//! assert_eq!(statuses.count().await?, 1);
//!
//! statuses.replace(vec![Member::Attrs(doc! { "name" => "Done" })]).await?;
//! ```
//!
//! Members unlinked by `replace`, or orphaned when the owner goes away
//! through [`Engine::destroy_with_dependents`], are handled according to
//! the association's [`Dependent`] policy. Owners list their associations
//! in [`Model::declare_associations`].

pub mod adapters;
pub mod association;
pub mod error;
pub mod object;
pub mod query;
pub mod value;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::histogram;
use tracing::debug;
use uuid::Uuid;

pub use crate::adapters::{Adapter, Persistence, QueryExecutor, Record};
pub use crate::association::{
    AssociationProxy, AssociationRegistry, AssociationSpec, Cascade, Dependent, DependentResolver,
    Member, Resolution,
};
pub use crate::error::Error;
pub use crate::object::*;
pub use crate::query::{
    Criteria, Direction, FinderOptions, OrderDirective, Pagination, QueryOptions, QueryScope,
    ScopeRegistry, Sort,
};
pub use crate::value::{Document, Value};
/// For the per-model statics holding [`ModelMeta`] and association specs.
pub use once_cell::sync::Lazy;

#[cfg(feature = "memory")]
pub use crate::adapters::memory::{AdapterStats, MemoryAdapter};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size used by `paginate` when the caller passes `0`.
    pub default_per_page: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_per_page: 25,
        }
    }
}

/// Entry point for queries, single-document persistence and associations.
///
/// Cloning is cheap; clones share the same store handle.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Docscope>,
}

pub struct Docscope {
    adapter: Box<dyn Adapter>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        Self::with_config(adapter, EngineConfig::default())
    }

    pub fn with_config(adapter: Box<dyn Adapter>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Docscope { adapter, config }),
        }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.inner.adapter.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ==================== Queries ====================

    /// Compiles raw finder options for `T`.
    pub fn compile<T: Model>(&self, raw: impl Into<Value>) -> Result<FinderOptions, Error> {
        FinderOptions::new(T::model_meta(), raw)
    }

    /// Unrestricted scope over every document of `T`.
    pub fn query<T: Model>(&self) -> QueryScope<T> {
        let mut criteria = Criteria::new();
        if let Some((field, value)) = T::model_meta().discriminator() {
            criteria = criteria.with(field, value);
        }
        QueryScope::new(
            self.clone(),
            criteria,
            QueryOptions::default(),
            Arc::new(ScopeRegistry::for_model()),
        )
    }

    /// Scope over the documents of `T` matching `raw` finder options.
    pub fn find<T: Model>(&self, raw: impl Into<Value>) -> Result<QueryScope<T>, Error> {
        let (criteria, options) = self.compile::<T>(raw)?.into_parts();
        Ok(QueryScope::new(
            self.clone(),
            criteria,
            options,
            Arc::new(ScopeRegistry::for_model()),
        ))
    }

    /// Fetch a document by id
    pub async fn fetch<T: Model>(&self, id: Uuid) -> Result<Option<T>, Error> {
        let start = Instant::now();
        let collection = T::model_meta().collection_name();
        let criteria = Criteria::new().with("_id", id);
        let options = QueryOptions {
            limit: 1,
            ..Default::default()
        };
        let records = self
            .inner
            .adapter
            .find(collection, &criteria, &options)
            .await?;
        histogram!("docscope.query.duration_ms",
            "collection" => collection
        )
        .record(start.elapsed().as_millis() as f64);
        records.into_iter().next().map(Record::to_model).transpose()
    }

    // ==================== Persistence ====================

    /// Validates and writes `doc`, marking it persisted.
    pub async fn save<T: Model>(&self, doc: &mut T) -> Result<(), Error> {
        doc.validate().map_err(Error::DocumentInvalid)?;
        self.save_unchecked(doc).await
    }

    pub(crate) async fn save_unchecked<T: Model>(&self, doc: &mut T) -> Result<(), Error> {
        doc.meta_mut().updated_at = Utc::now();
        let record = Record::from_model(&*doc)?;
        self.inner
            .adapter
            .save(T::model_meta().collection_name(), record)
            .await?;
        doc.meta_mut().mark_persisted();
        debug!(model = T::model_meta().name(), id = %doc.id(), "saved document");
        Ok(())
    }

    /// Removes `doc` through the store's destroy path, running its hooks.
    pub async fn destroy<T: Model>(&self, doc: &T) -> Result<(), Error> {
        self.inner
            .adapter
            .destroy(T::model_meta().collection_name(), doc.id())
            .await
    }

    /// Removes `doc` directly, bypassing hooks.
    pub async fn delete<T: Model>(&self, doc: &T) -> Result<(), Error> {
        self.inner
            .adapter
            .delete(T::model_meta().collection_name(), doc.id())
            .await
    }

    // ==================== Associations ====================

    /// Proxy over the members of `owner` described by `spec`.
    pub fn many<O: Model, T: Model>(
        &self,
        owner: &O,
        spec: &Arc<AssociationSpec<T>>,
    ) -> AssociationProxy<T> {
        AssociationProxy::new(self.clone(), Arc::clone(spec), owner)
    }

    /// Applies the dependent policy of every association `O` declares, then
    /// destroys `owner`.
    pub async fn destroy_with_dependents<O: Model>(&self, owner: &O) -> Result<(), Error> {
        let registry = AssociationRegistry::<O>::for_model();
        let mut cascades = registry.cascades(self, owner);
        let mut associations: Vec<&mut dyn Cascade> = cascades
            .iter_mut()
            .map(|cascade| cascade.as_mut() as &mut dyn Cascade)
            .collect();
        self.destroy_with(owner, &mut associations).await
    }

    /// Applies the dependent policy of each given association, then
    /// destroys `owner`.
    pub async fn destroy_with<O: Model>(
        &self,
        owner: &O,
        associations: &mut [&mut dyn Cascade],
    ) -> Result<(), Error> {
        for association in associations.iter_mut() {
            let affected = association.cascade_owner_destroy().await?;
            debug!(
                owner = %owner.id(),
                association = association.association_name(),
                affected,
                "cascaded owner destroy"
            );
        }
        self.destroy(owner).await
    }
}
