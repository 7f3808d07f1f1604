#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docscope::{
    AssociationRegistry, AssociationSpec, Dependent, Engine, Lazy, MemoryAdapter, Meta, Model,
    ModelMeta, QueryScope, ScopeRegistry, ValidationError, Value, doc,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== Models ====================

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Project {
    #[serde(flatten)]
    pub meta: Meta,
    pub name: Option<String>,
}

static PROJECT: Lazy<ModelMeta> = Lazy::new(|| ModelMeta::new("Project").collection("projects"));

impl Model for Project {
    fn model_meta() -> &'static ModelMeta {
        &PROJECT
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Status {
    #[serde(flatten)]
    pub meta: Meta,
    pub project_id: Option<Uuid>,
    pub name: Option<String>,
    pub position: Option<i64>,
}

static STATUS: Lazy<ModelMeta> = Lazy::new(|| {
    ModelMeta::new("Status")
        .collection("statuses")
        .id_field("project_id")
});

impl Model for Status {
    fn model_meta() -> &'static ModelMeta {
        &STATUS
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        if self.name.as_deref().is_none_or(str::is_empty) {
            errors = errors.add("name", "can't be blank");
        }
        errors.into_result()
    }

    fn declare_scopes(scopes: &mut ScopeRegistry<Self>) {
        scopes
            .scope("named", |scope: QueryScope<Self>, args: &[Value]| {
                let name = args.first().cloned().unwrap_or_default();
                scope.filter(doc! { "name" => name })
            })
            .scope("from_position", |scope: QueryScope<Self>, args: &[Value]| {
                let position = args.first().cloned().unwrap_or_default();
                scope.filter(doc! { "position.gte" => position })
            });
    }
}

impl Status {
    pub fn named(name: &str, position: i64) -> Self {
        Self {
            name: Some(name.to_string()),
            position: Some(position),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Room {
    #[serde(flatten)]
    pub meta: Meta,
    pub name: Option<String>,
}

static ROOM: Lazy<ModelMeta> = Lazy::new(|| ModelMeta::new("Room").collection("rooms"));

impl Model for Room {
    fn model_meta() -> &'static ModelMeta {
        &ROOM
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn declare_associations(associations: &mut AssociationRegistry<Self>) {
        associations
            .has_many(&*ROOM_MESSAGES)
            .has_many(&*ROOM_TOPICS);
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Topic {
    #[serde(flatten)]
    pub meta: Meta,
    pub room_id: Option<Uuid>,
    pub title: Option<String>,
}

static TOPIC: Lazy<ModelMeta> = Lazy::new(|| {
    ModelMeta::new("Topic")
        .collection("topics")
        .id_field("room_id")
});

impl Model for Topic {
    fn model_meta() -> &'static ModelMeta {
        &TOPIC
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

/// Root of the `messages` collection.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Message {
    #[serde(flatten)]
    pub meta: Meta,
    pub room_id: Option<Uuid>,
    pub body: Option<String>,
    pub position: Option<i64>,
}

static MESSAGE: Lazy<ModelMeta> = Lazy::new(|| {
    ModelMeta::new("Message")
        .collection("messages")
        .id_field("room_id")
});

impl Model for Message {
    fn model_meta() -> &'static ModelMeta {
        &MESSAGE
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

/// Stored alongside [`Message`], told apart by `_type`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Enter {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(rename = "_type")]
    pub kind: String,
    pub room_id: Option<Uuid>,
    pub body: Option<String>,
    pub position: Option<i64>,
}

impl Default for Enter {
    fn default() -> Self {
        Self {
            meta: Meta::default(),
            kind: "Enter".to_string(),
            room_id: None,
            body: None,
            position: None,
        }
    }
}

static ENTER: Lazy<ModelMeta> = Lazy::new(|| {
    ModelMeta::new("Enter")
        .collection("messages")
        .id_field("room_id")
        .single_collection_inherited()
});

impl Model for Enter {
    fn model_meta() -> &'static ModelMeta {
        &ENTER
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

/// Model name with a module path; collection and foreign key use the last
/// segment only.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Paper {
    #[serde(flatten)]
    pub meta: Meta,
    pub title: Option<String>,
}

static PAPER: Lazy<ModelMeta> = Lazy::new(|| ModelMeta::new("News::Paper"));

impl Model for Paper {
    fn model_meta() -> &'static ModelMeta {
        &PAPER
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

// ==================== Associations ====================

pub fn statuses(dependent: Dependent) -> Arc<AssociationSpec<Status>> {
    Arc::new(
        AssociationSpec::<Status>::many::<Project>("statuses")
            .dependent(dependent)
            .order("position"),
    )
}

pub static ROOM_MESSAGES: Lazy<Arc<AssociationSpec<Message>>> = Lazy::new(|| {
    Arc::new(
        AssociationSpec::<Message>::many::<Room>("messages")
            .order("position")
            .dependent(Dependent::DeleteAll),
    )
});

pub static ROOM_TOPICS: Lazy<Arc<AssociationSpec<Topic>>> = Lazy::new(|| {
    Arc::new(AssociationSpec::<Topic>::many::<Room>("topics").dependent(Dependent::Nullify))
});

// ==================== Setup ====================

pub struct Harness {
    pub engine: Engine,
    pub adapter: MemoryAdapter,
    pub destroy_hooks: Arc<AtomicUsize>,
}

impl Harness {
    pub fn hook_calls(&self) -> usize {
        self.destroy_hooks.load(Ordering::SeqCst)
    }
}

pub fn setup() -> Harness {
    let adapter = MemoryAdapter::new();
    let destroy_hooks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroy_hooks);
    adapter
        .on_destroy(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    Harness {
        engine: Engine::new(Box::new(adapter.clone())),
        adapter,
        destroy_hooks,
    }
}

pub async fn saved_project(engine: &Engine, name: &str) -> Project {
    let mut project = Project {
        name: Some(name.to_string()),
        ..Default::default()
    };
    engine.save(&mut project).await.unwrap();
    project
}
