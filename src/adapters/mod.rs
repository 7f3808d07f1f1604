#[cfg(feature = "memory")]
pub mod matcher;
#[cfg(feature = "memory")]
pub mod memory;

pub mod record;

use async_trait::async_trait;
pub use record::*;
use uuid::Uuid;

use crate::{
    error::Error,
    query::{Criteria, QueryOptions},
    value::Document,
};

/// -----------------------------
/// Store contract
/// -----------------------------

/// Executes compiled queries against one collection of the store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        criteria: &Criteria,
        options: &QueryOptions,
    ) -> Result<Vec<Record>, Error>;

    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64, Error>;

    async fn delete_many(&self, collection: &str, criteria: &Criteria) -> Result<u64, Error>;

    /// `update` is a modifier document such as `{"$unset": {"owner_id": 1}}`.
    async fn update_many(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Document,
    ) -> Result<u64, Error>;
}

/// Single-document persistence.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert or replace the record with the same id.
    async fn save(&self, collection: &str, record: Record) -> Result<(), Error>;

    /// Remove the document, running its destroy hooks.
    async fn destroy(&self, collection: &str, id: Uuid) -> Result<(), Error>;

    /// Remove the document directly, bypassing hooks.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), Error>;
}

pub trait Adapter: QueryExecutor + Persistence + Send + Sync + 'static {}

impl<T> Adapter for T where T: QueryExecutor + Persistence + Send + Sync + 'static {}
