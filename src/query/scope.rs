use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::debug;

use super::{
    finder::{Criteria, QueryOptions, compile_refinement},
    order::{self, Sort},
};
use crate::{Engine, Model, adapters::Record, error::Error, value::Value};

pub type ScopeFn<T> =
    Arc<dyn Fn(QueryScope<T>, &[Value]) -> Result<QueryScope<T>, Error> + Send + Sync>;

/// Dispatch table of the class-level query builders a model declares
/// composable. Anything not in the table cannot be chained under a
/// restricted scope.
pub struct ScopeRegistry<T: Model> {
    scopes: HashMap<String, ScopeFn<T>>,
}

impl<T: Model> ScopeRegistry<T> {
    pub fn new() -> Self {
        Self {
            scopes: HashMap::new(),
        }
    }

    /// Registry populated from [`Model::declare_scopes`].
    pub fn for_model() -> Self {
        let mut registry = Self::new();
        T::declare_scopes(&mut registry);
        registry
    }

    pub fn scope<F>(&mut self, name: impl Into<String>, scope: F) -> &mut Self
    where
        F: Fn(QueryScope<T>, &[Value]) -> Result<QueryScope<T>, Error> + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Option<&ScopeFn<T>> {
        self.scopes.get(name)
    }
}

impl<T: Model> Default for ScopeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> fmt::Debug for ScopeRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.scopes.keys()).finish()
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone)]
pub struct Pagination<T> {
    pub items: Vec<T>,
    pub total_entries: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub per_page: u64,
}

impl<T> Pagination<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// -----------------------------
/// Deferred query
/// -----------------------------

/// Criteria and options accumulated for `T`, executed only on `all`,
/// `count`, `first`, `last` or `paginate`.
///
/// Every builder returns a new scope; the receiver is never mutated, so a
/// scope can be shared freely.
pub struct QueryScope<T: Model> {
    engine: Engine,
    criteria: Criteria,
    options: QueryOptions,
    scopes: Arc<ScopeRegistry<T>>,
}

impl<T: Model> Clone for QueryScope<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            criteria: self.criteria.clone(),
            options: self.options.clone(),
            scopes: Arc::clone(&self.scopes),
        }
    }
}

impl<T: Model> fmt::Debug for QueryScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryScope")
            .field("model", &T::model_meta().name())
            .field("criteria", &self.criteria)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: Model> QueryScope<T> {
    pub(crate) fn new(
        engine: Engine,
        criteria: Criteria,
        options: QueryOptions,
        scopes: Arc<ScopeRegistry<T>>,
    ) -> Self {
        Self {
            engine,
            criteria,
            options,
            scopes,
        }
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn merged(&self, criteria: &Criteria, options: &QueryOptions) -> Self {
        let mut scope = self.clone();
        scope.criteria.merge(criteria);
        scope.options.merge(options);
        scope
    }

    fn with_options(&self, update: impl FnOnce(&mut QueryOptions)) -> Self {
        let mut scope = self.clone();
        update(&mut scope.options);
        scope
    }

    /// Compiles `raw` finder options and layers them over this scope.
    pub fn refine(&self, raw: impl Into<Value>) -> Result<Self, Error> {
        let (criteria, options) = compile_refinement(T::model_meta(), &raw.into())?.into_parts();
        Ok(self.merged(&criteria, &options))
    }

    /// `where` clause; accepts the same mappings as [`QueryScope::refine`].
    pub fn filter(&self, criteria: impl Into<Value>) -> Result<Self, Error> {
        self.refine(criteria)
    }

    pub fn sort(&self, order: impl Into<Value>) -> Result<Self, Error> {
        let directives = order::parse(&order.into())?;
        Ok(self.with_options(|options| {
            options.sort = (!directives.is_empty()).then_some(Sort::Directives(directives));
        }))
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.with_options(|options| options.limit = limit)
    }

    pub fn skip(&self, skip: u64) -> Self {
        self.with_options(|options| options.skip = skip)
    }

    pub fn fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.with_options(|options| {
            options.fields = (!fields.is_empty()).then_some(fields);
        })
    }

    /// Chains a declared composable scope by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Self, Error> {
        let scope = self
            .scopes
            .get(name)
            .ok_or_else(|| Error::NotComposable(name.to_string()))?;
        scope(self.clone(), args)
    }

    pub fn is_composable(&self, name: &str) -> bool {
        self.scopes.contains(name)
    }

    async fn fetch(&self, options: &QueryOptions) -> Result<Vec<T>, Error> {
        let collection = T::model_meta().collection_name();
        let start = Instant::now();
        let records = self
            .engine
            .adapter()
            .find(collection, &self.criteria, options)
            .await?;
        histogram!("docscope.query.duration_ms",
            "collection" => collection
        )
        .record(start.elapsed().as_millis() as f64);
        debug!(
            collection,
            criteria = %self.criteria,
            found = records.len(),
            "materialized scope"
        );
        records.into_iter().map(Record::to_model).collect()
    }

    /// Runs the query. Each call goes to the store; nothing is cached here.
    pub async fn all(&self) -> Result<Vec<T>, Error> {
        self.fetch(&self.options).await
    }

    pub async fn count(&self) -> Result<u64, Error> {
        let collection = T::model_meta().collection_name();
        let start = Instant::now();
        let count = self
            .engine
            .adapter()
            .count(collection, &self.criteria)
            .await?;
        histogram!("docscope.count.duration_ms",
            "collection" => collection
        )
        .record(start.elapsed().as_millis() as f64);
        Ok(count)
    }

    pub async fn exists(&self) -> Result<bool, Error> {
        Ok(self.count().await? > 0)
    }

    pub async fn first(&self) -> Result<Option<T>, Error> {
        let mut options = self.options.clone();
        options.limit = 1;
        Ok(self.fetch(&options).await?.into_iter().next())
    }

    /// First document under the reversed sort. The scope's skip is not
    /// applied from the other end.
    pub async fn last(&self) -> Result<Option<T>, Error> {
        let sort = match &self.options.sort {
            Some(sort) if !sort.is_empty() => sort.reverse(),
            _ => return Err(Error::AmbiguousOrdering),
        };
        let mut options = self.options.clone();
        options.sort = Some(sort);
        options.skip = 0;
        options.limit = 1;
        Ok(self.fetch(&options).await?.into_iter().next())
    }

    /// `page` is 1-based; a `per_page` of 0 uses the engine default.
    pub async fn paginate(&self, page: u64, per_page: u64) -> Result<Pagination<T>, Error> {
        let per_page = match per_page {
            0 => self.engine.config().default_per_page.max(1),
            n => n,
        };
        let current_page = page.max(1);
        let total_entries = self.count().await?;

        let mut options = self.options.clone();
        options.skip = (current_page - 1).saturating_mul(per_page);
        options.limit = per_page;
        let items = self.fetch(&options).await?;

        Ok(Pagination {
            items,
            total_entries,
            total_pages: total_entries.div_ceil(per_page),
            current_page,
            per_page,
        })
    }
}
