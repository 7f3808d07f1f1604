use async_trait::async_trait;
use tracing::debug;

use super::spec::Dependent;
use crate::{
    Engine, Model, ModelIdentity,
    adapters::assign_attributes,
    error::Error,
    value::{Document, Value},
};

/// Outcome of applying a dependent policy to one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Destroyed,
    Deleted,
    Nullified,
    Untouched,
}

/// Applies an association's dependent policy to members unlinked from their
/// owner, either by `replace` or by the owner being destroyed.
pub struct DependentResolver<'a> {
    engine: &'a Engine,
    foreign_key: &'a str,
}

impl<'a> DependentResolver<'a> {
    pub fn new(engine: &'a Engine, foreign_key: &'a str) -> Self {
        Self {
            engine,
            foreign_key,
        }
    }

    /// Members never saved only have their foreign key cleared locally; there
    /// is nothing in the store to remove.
    pub async fn resolve<T: Model>(
        &self,
        policy: Dependent,
        member: &mut T,
    ) -> Result<Resolution, Error> {
        let persisted = !member.is_new();
        let resolution = match policy {
            Dependent::None => Resolution::Untouched,
            Dependent::Destroy => {
                if persisted {
                    self.engine.destroy(&*member).await?;
                }
                Resolution::Destroyed
            }
            Dependent::DeleteAll => {
                if persisted {
                    self.engine.delete(&*member).await?;
                }
                Resolution::Deleted
            }
            Dependent::Nullify => {
                let mut cleared = Document::new();
                cleared.insert(self.foreign_key.to_string(), Value::Null);
                assign_attributes(member, &cleared)?;
                if persisted {
                    self.engine.save_unchecked(member).await?;
                }
                Resolution::Nullified
            }
        };

        debug!(
            model = T::model_meta().name(),
            id = %member.id(),
            ?policy,
            ?resolution,
            "resolved dependent"
        );
        Ok(resolution)
    }
}

/// An association that reacts to its owner being destroyed.
///
/// Implemented by every association proxy so owners can hand a
/// heterogeneous list of them to [`Engine::destroy_with`].
#[async_trait]
pub trait Cascade: Send {
    fn association_name(&self) -> &str;

    /// Applies the dependent policy to every current member. Returns how
    /// many members were affected.
    async fn cascade_owner_destroy(&mut self) -> Result<u64, Error>;
}
