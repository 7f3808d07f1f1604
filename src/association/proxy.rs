use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    dependent::{Cascade, DependentResolver, Resolution},
    spec::AssociationSpec,
};
use crate::{
    Engine, Model, ModelIdentity,
    adapters::{assign_attributes, body_of},
    error::Error,
    query::{Pagination, QueryScope},
    value::{Document, Value},
};

/// Something that can join an association: a built document or the
/// attributes to build one from.
#[derive(Debug, Clone)]
pub enum Member<T> {
    Doc(T),
    Attrs(Document),
}

impl<T: Model> From<T> for Member<T> {
    fn from(doc: T) -> Self {
        Member::Doc(doc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    id: Uuid,
    persisted: bool,
}

/// -----------------------------
/// Association proxy
/// -----------------------------

/// The members of one owner's `has many` association.
///
/// Persisted members are cached after the first load; members built while
/// the owner is unsaved wait in a pending list until [`AssociationProxy::flush`].
/// Every operation that touches the cache takes `&mut self`, so a proxy is
/// never mutated from two places at once.
pub struct AssociationProxy<T: Model> {
    engine: Engine,
    spec: Arc<AssociationSpec<T>>,
    owner: Owner,
    loaded: Option<Vec<T>>,
    pending: Vec<T>,
}

impl<T: Model> fmt::Debug for AssociationProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationProxy")
            .field("association", &self.spec.name())
            .field("owner", &self.owner.id)
            .field("loaded", &self.loaded.as_ref().map(Vec::len))
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<T: Model> AssociationProxy<T> {
    pub(crate) fn new<O: Model>(engine: Engine, spec: Arc<AssociationSpec<T>>, owner: &O) -> Self {
        Self {
            engine,
            spec,
            owner: Owner {
                id: owner.id(),
                persisted: !owner.is_new(),
            },
            loaded: None,
            pending: Vec::new(),
        }
    }

    pub fn spec(&self) -> &AssociationSpec<T> {
        &self.spec
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner.id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Members waiting for the owner to be saved.
    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    /// Query restricted to this owner's members, with the association's
    /// extra conditions and ordering applied.
    pub fn scope(&self) -> Result<QueryScope<T>, Error> {
        let finder = self
            .engine
            .compile::<T>(self.spec.base_options(self.owner.id))?;
        let (criteria, options) = finder.into_parts();
        Ok(QueryScope::new(
            self.engine.clone(),
            criteria,
            options,
            self.spec.scopes(),
        ))
    }

    fn refined(&self, conditions: Option<Document>) -> Result<QueryScope<T>, Error> {
        match conditions {
            Some(conditions) => self.scope()?.refine(conditions),
            None => self.scope(),
        }
    }

    /// -----------------------------
    /// Cache
    /// -----------------------------

    /// Persisted members, loading them on first use.
    pub async fn load(&mut self) -> Result<&[T], Error> {
        if self.loaded.is_none() {
            let members = if self.owner.persisted {
                self.scope()?.all().await?
            } else {
                Vec::new()
            };
            debug!(
                association = self.spec.name(),
                owner = %self.owner.id,
                loaded = members.len(),
                "loaded association"
            );
            self.loaded = Some(members);
        }
        Ok(self.loaded.as_deref().unwrap_or_default())
    }

    /// Forgets every cached and pending member.
    pub fn reset(&mut self) {
        self.loaded = None;
        self.pending.clear();
    }

    pub async fn reload(&mut self) -> Result<&[T], Error> {
        self.reset();
        self.load().await
    }

    /// Points the proxy at `owner`'s current state. A different id resets
    /// the cache; the same id only picks up whether the owner is saved.
    pub fn rebind<O: Model>(&mut self, owner: &O) {
        if owner.id() != self.owner.id {
            debug!(
                association = self.spec.name(),
                from = %self.owner.id,
                to = %owner.id(),
                "owner changed, resetting association"
            );
            self.reset();
            self.owner.id = owner.id();
        }
        self.owner.persisted = !owner.is_new();
    }

    /// Cached persisted members followed by pending ones.
    pub async fn members(&mut self) -> Result<Vec<T>, Error> {
        let mut members = self.load().await?.to_vec();
        members.extend(self.pending.iter().cloned());
        Ok(members)
    }

    pub async fn size(&mut self) -> Result<usize, Error> {
        let loaded = self.load().await?.len();
        Ok(loaded + self.pending.len())
    }

    pub async fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.size().await? == 0)
    }

    /// Persisted members only, counted in the store.
    pub async fn count(&self) -> Result<u64, Error> {
        self.scope()?.count().await
    }

    pub async fn count_where(&self, conditions: Document) -> Result<u64, Error> {
        self.scope()?.refine(conditions)?.count().await
    }

    pub async fn contains(&mut self, doc: &T) -> Result<bool, Error> {
        let id = doc.id();
        let cached = self.load().await?.iter().any(|member| member.id() == id);
        Ok(cached || self.pending.iter().any(|member| member.id() == id))
    }

    fn link(&self, doc: &mut T) -> Result<(), Error> {
        let mut key = Document::new();
        key.insert(
            self.spec.foreign_key_field().to_string(),
            Value::Id(self.owner.id),
        );
        assign_attributes(doc, &key)
    }

    fn instantiate(&self, member: Member<T>) -> Result<T, Error> {
        let mut doc = match member {
            Member::Doc(doc) => doc,
            Member::Attrs(attrs) => {
                let mut doc = T::default();
                assign_attributes(&mut doc, &attrs)?;
                doc
            }
        };
        self.link(&mut doc)?;
        Ok(doc)
    }

    fn cache_persisted(&mut self, doc: T) {
        if let Some(loaded) = self.loaded.as_mut() {
            upsert(loaded, doc);
        }
    }

    /// -----------------------------
    /// Building and appending
    /// -----------------------------

    /// New member linked to the owner; nothing is written to the store.
    pub fn build(&mut self, attrs: Document) -> Result<&mut T, Error> {
        self.build_with(attrs, |_| {})
    }

    pub fn build_with<F>(&mut self, attrs: Document, customize: F) -> Result<&mut T, Error>
    where
        F: FnOnce(&mut T),
    {
        let mut doc = self.instantiate(Member::Attrs(attrs))?;
        customize(&mut doc);
        let index = self.pending.len();
        self.pending.push(doc);
        Ok(&mut self.pending[index])
    }

    /// Builds and saves a member. A validation failure is not an error here:
    /// the unsaved document is returned and the cache is left as it was.
    pub async fn create(&mut self, attrs: Document) -> Result<T, Error> {
        self.create_with(attrs, |_| {}).await
    }

    /// [`AssociationProxy::create`] with a chance to adjust the document
    /// before it is validated and saved.
    pub async fn create_with<F>(
        &mut self,
        attrs: Document,
        customize: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&mut T) + Send,
    {
        let mut doc = self.instantiate(Member::Attrs(attrs))?;
        customize(&mut doc);

        let outcome = if self.owner.persisted {
            self.engine.save(&mut doc).await
        } else {
            doc.validate().map_err(Error::DocumentInvalid)
        };
        match outcome {
            Ok(()) if self.owner.persisted => self.cache_persisted(doc.clone()),
            Ok(()) => self.pending.push(doc.clone()),
            Err(Error::DocumentInvalid(errors)) => {
                warn!(
                    association = self.spec.name(),
                    %errors,
                    "created member failed validation"
                );
            }
            Err(err) => return Err(err),
        }
        Ok(doc)
    }

    /// Like [`AssociationProxy::create`] but fails with
    /// [`Error::DocumentInvalid`], leaving the cache untouched.
    pub async fn create_or_err(&mut self, attrs: Document) -> Result<T, Error> {
        self.create_or_err_with(attrs, |_| {}).await
    }

    pub async fn create_or_err_with<F>(
        &mut self,
        attrs: Document,
        customize: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&mut T) + Send,
    {
        let mut doc = self.instantiate(Member::Attrs(attrs))?;
        customize(&mut doc);
        if !self.owner.persisted {
            doc.validate().map_err(Error::DocumentInvalid)?;
            self.pending.push(doc.clone());
            return Ok(doc);
        }

        self.engine.save(&mut doc).await?;
        self.cache_persisted(doc.clone());
        Ok(doc)
    }

    pub async fn push(&mut self, member: impl Into<Member<T>>) -> Result<(), Error> {
        self.concat([member.into()]).await
    }

    /// Links every member to the owner, saving them when the owner is
    /// persisted. The cache only changes once every save succeeded.
    pub async fn concat<I>(&mut self, members: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Member<T>>,
    {
        let mut docs = members
            .into_iter()
            .map(|member| self.instantiate(member))
            .collect::<Result<Vec<_>, _>>()?;
        self.load().await?;

        if self.owner.persisted {
            for doc in docs.iter_mut() {
                self.engine.save(doc).await?;
            }
            for doc in docs {
                self.cache_persisted(doc);
            }
        } else {
            for doc in docs {
                upsert(&mut self.pending, doc);
            }
        }
        Ok(())
    }

    /// Makes the association hold exactly `members`.
    ///
    /// New members are validated before anything else happens. Previous
    /// members missing from the new set go through the dependent policy;
    /// retained members are not touched unless they changed.
    pub async fn replace<I>(&mut self, members: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Member<T>>,
    {
        let mut incoming = Vec::new();
        for member in members {
            upsert(&mut incoming, self.instantiate(member)?);
        }

        let mut previous = self.load().await?.to_vec();
        previous.extend(self.pending.iter().cloned());

        for doc in &incoming {
            doc.validate().map_err(Error::DocumentInvalid)?;
        }

        let kept: HashSet<Uuid> = incoming.iter().map(|doc| doc.id()).collect();
        let resolver = DependentResolver::new(&self.engine, self.spec.foreign_key_field());
        let policy = self.spec.dependent_policy();
        let mut removed = 0;
        for member in previous.iter_mut().filter(|member| !kept.contains(&member.id())) {
            if resolver.resolve(policy, member).await? != Resolution::Untouched {
                removed += 1;
            }
        }

        let mut loaded = Vec::with_capacity(incoming.len());
        let mut pending = Vec::new();
        for mut doc in incoming.drain(..) {
            let unchanged = match previous.iter().find(|member| member.id() == doc.id()) {
                Some(member) => !doc.is_new() && body_of(member)? == body_of(&doc)?,
                None => false,
            };

            if unchanged {
                upsert(&mut loaded, doc);
            } else if self.owner.persisted {
                self.engine.save(&mut doc).await?;
                upsert(&mut loaded, doc);
            } else {
                upsert(&mut pending, doc);
            }
        }

        debug!(
            association = self.spec.name(),
            owner = %self.owner.id,
            removed,
            loaded = loaded.len(),
            pending = pending.len(),
            "replaced association members"
        );
        self.loaded = Some(loaded);
        self.pending = pending;
        Ok(())
    }

    /// Saves every pending member once the owner is persisted. Returns how
    /// many were written.
    pub async fn flush(&mut self) -> Result<usize, Error> {
        if !self.owner.persisted || self.pending.is_empty() {
            return Ok(0);
        }
        for doc in &self.pending {
            doc.validate().map_err(Error::DocumentInvalid)?;
        }

        let mut staged = std::mem::take(&mut self.pending);
        let mut written = 0;
        let mut failure = None;
        for doc in staged.iter_mut() {
            if let Err(err) = self.engine.save(doc).await {
                failure = Some(err);
                break;
            }
            written += 1;
        }

        // Whatever was not written stays pending.
        self.pending = staged.split_off(written);
        for doc in staged {
            self.cache_persisted(doc);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// -----------------------------
    /// Bulk removal
    /// -----------------------------

    /// Destroys every matching member one by one, running destroy hooks.
    pub async fn destroy_all(&mut self, conditions: Option<Document>) -> Result<u64, Error> {
        let members = self.refined(conditions)?.all().await?;
        for member in &members {
            self.engine.destroy(member).await?;
        }
        self.reset();
        Ok(members.len() as u64)
    }

    /// Removes every matching member in one store call, without hooks.
    pub async fn delete_all(&mut self, conditions: Option<Document>) -> Result<u64, Error> {
        let scope = self.refined(conditions)?;
        let deleted = self
            .engine
            .adapter()
            .delete_many(T::model_meta().collection_name(), scope.criteria())
            .await?;
        self.reset();
        Ok(deleted)
    }

    /// Unsets the foreign key on every matching member without removing them.
    pub async fn nullify(&mut self, conditions: Option<Document>) -> Result<u64, Error> {
        let scope = self.refined(conditions)?;
        let mut fields = Document::new();
        fields.insert(self.spec.foreign_key_field().to_string(), Value::Int(1));
        let mut update = Document::new();
        update.insert("$unset".to_string(), Value::Document(fields));

        let updated = self
            .engine
            .adapter()
            .update_many(T::model_meta().collection_name(), scope.criteria(), &update)
            .await?;
        self.reset();
        Ok(updated)
    }

    /// -----------------------------
    /// Finders
    /// -----------------------------

    pub async fn find_by(&self, conditions: Document) -> Result<Option<T>, Error> {
        self.scope()?.refine(conditions)?.first().await
    }

    pub async fn find_by_or_err(&self, conditions: Document) -> Result<T, Error> {
        let scope = self.scope()?.refine(conditions)?;
        scope.first().await?.ok_or_else(|| not_found::<T>(&scope))
    }

    pub async fn find_or_create_by(&mut self, conditions: Document) -> Result<T, Error> {
        match self.find_by(conditions.clone()).await? {
            Some(doc) => Ok(doc),
            None => self.create(conditions).await,
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<T>, Error> {
        self.find_by(id_criteria(Value::Id(id))).await
    }

    /// Members among `ids`; missing ids are skipped.
    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<T>, Error> {
        let ids: Vec<Value> = ids.iter().copied().map(Value::Id).collect();
        self.scope()?
            .refine(id_criteria(Value::Array(ids)))?
            .all()
            .await
    }

    pub async fn find_or_err(&self, id: Uuid) -> Result<T, Error> {
        self.find_by_or_err(id_criteria(Value::Id(id))).await
    }

    /// Fails unless every id in `ids` is a member.
    pub async fn find_many_or_err(&self, ids: &[Uuid]) -> Result<Vec<T>, Error> {
        let found = self.find_many(ids).await?;
        let found_ids: HashSet<Uuid> = found.iter().map(|doc| doc.id()).collect();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found_ids.contains(*id))
            .map(Uuid::to_string)
            .collect();
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(Error::DocumentNotFound {
                collection: T::model_meta().collection_name().to_string(),
                criteria: format!("_id in [{}]", missing.join(", ")),
            })
        }
    }

    /// -----------------------------
    /// Scope delegation
    /// -----------------------------

    pub async fn all(&self) -> Result<Vec<T>, Error> {
        self.scope()?.all().await
    }

    pub async fn first(&self) -> Result<Option<T>, Error> {
        self.scope()?.first().await
    }

    pub async fn last(&self) -> Result<Option<T>, Error> {
        self.scope()?.last().await
    }

    pub async fn paginate(&self, page: u64, per_page: u64) -> Result<Pagination<T>, Error> {
        self.scope()?.paginate(page, per_page).await
    }

    pub fn filter(&self, criteria: impl Into<Value>) -> Result<QueryScope<T>, Error> {
        self.scope()?.filter(criteria)
    }

    pub fn sort(&self, order: impl Into<Value>) -> Result<QueryScope<T>, Error> {
        self.scope()?.sort(order)
    }

    pub fn limit(&self, limit: u64) -> Result<QueryScope<T>, Error> {
        Ok(self.scope()?.limit(limit))
    }

    pub fn skip(&self, skip: u64) -> Result<QueryScope<T>, Error> {
        Ok(self.scope()?.skip(skip))
    }

    pub fn fields<I, S>(&self, fields: I) -> Result<QueryScope<T>, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.scope()?.fields(fields))
    }

    /// Chains a composable scope declared on `T` under this association.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<QueryScope<T>, Error> {
        self.scope()?.call(name, args)
    }
}

#[async_trait]
impl<T: Model> Cascade for AssociationProxy<T> {
    fn association_name(&self) -> &str {
        self.spec.name()
    }

    async fn cascade_owner_destroy(&mut self) -> Result<u64, Error> {
        let mut members = self.members().await?;
        let resolver = DependentResolver::new(&self.engine, self.spec.foreign_key_field());
        let policy = self.spec.dependent_policy();

        let mut affected = 0;
        for member in members.iter_mut() {
            if resolver.resolve(policy, member).await? != Resolution::Untouched {
                affected += 1;
            }
        }
        self.reset();
        Ok(affected)
    }
}

fn upsert<T: Model>(members: &mut Vec<T>, doc: T) {
    match members.iter_mut().find(|member| member.id() == doc.id()) {
        Some(member) => *member = doc,
        None => members.push(doc),
    }
}

fn id_criteria(value: Value) -> Document {
    let mut criteria = Document::new();
    criteria.insert("_id".to_string(), value);
    criteria
}

fn not_found<T: Model>(scope: &QueryScope<T>) -> Error {
    Error::DocumentNotFound {
        collection: T::model_meta().collection_name().to_string(),
        criteria: scope.criteria().to_string(),
    }
}
