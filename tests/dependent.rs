mod common;

use common::{
    Message, Project, ROOM_MESSAGES, ROOM_TOPICS, Room, Status, Topic, saved_project, setup,
    statuses,
};
use docscope::{
    AssociationRegistry, Cascade, Dependent, DependentResolver, ModelIdentity, Resolution, doc,
};

#[tokio::test]
async fn test_owner_destroy_with_delete_all_skips_hooks() {
    let h = setup();
    let mut room = Room {
        name: Some("lobby".into()),
        ..Default::default()
    };
    h.engine.save(&mut room).await.unwrap();

    let mut messages = h.engine.many(&room, &*ROOM_MESSAGES);
    for position in 1..=3 {
        messages
            .create(doc! { "body" => "hi", "position" => position })
            .await
            .unwrap();
    }
    assert_eq!(messages.count().await.unwrap(), 3);
    let deletes_before = h.adapter.stats().deletes;

    h.engine
        .destroy_with(&room, &mut [&mut messages])
        .await
        .unwrap();

    assert_eq!(h.engine.query::<Message>().count().await.unwrap(), 0);
    assert_eq!(h.adapter.stats().deletes - deletes_before, 3);
    // Only the room itself went through the destroy path.
    assert_eq!(h.hook_calls(), 1);
    assert!(h.engine.fetch::<Room>(room.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_destroy_with_destroy_runs_hooks() {
    let h = setup();
    let project = saved_project(&h.engine, "Docs").await;
    let mut proxy = h.engine.many(&project, &statuses(Dependent::Destroy));
    for name in ["Todo", "Doing"] {
        proxy.create(doc! { "name" => name }).await.unwrap();
    }

    h.engine
        .destroy_with(&project, &mut [&mut proxy])
        .await
        .unwrap();

    assert_eq!(h.hook_calls(), 3);
    assert_eq!(h.engine.query::<Status>().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_owner_destroy_with_nullify_keeps_members() {
    let h = setup();
    let project = saved_project(&h.engine, "Docs").await;
    let mut proxy = h.engine.many(&project, &statuses(Dependent::Nullify));
    let status = proxy.create(doc! { "name" => "Todo" }).await.unwrap();

    h.engine
        .destroy_with(&project, &mut [&mut proxy])
        .await
        .unwrap();

    let stored = h.engine.fetch::<Status>(status.id()).await.unwrap().unwrap();
    assert_eq!(stored.project_id, None);
    assert!(h.engine.fetch::<Project>(project.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_several_associations_cascade() {
    let h = setup();
    let project = saved_project(&h.engine, "Docs").await;
    let live_spec = std::sync::Arc::new(
        docscope::AssociationSpec::<Status>::many::<Project>("live_statuses")
            .conditions(doc! { "position.lt" => 99 })
            .dependent(Dependent::Destroy),
    );
    let archived_spec = std::sync::Arc::new(
        docscope::AssociationSpec::<Status>::many::<Project>("archived_statuses")
            .conditions(doc! { "position" => 99 })
            .dependent(Dependent::None),
    );

    let mut live = h.engine.many(&project, &live_spec);
    live.create(doc! { "name" => "Todo", "position" => 1 })
        .await
        .unwrap();
    let mut archived = h.engine.many(&project, &archived_spec);
    let old = archived
        .create(doc! { "name" => "Old", "position" => 99 })
        .await
        .unwrap();

    assert_eq!(live.association_name(), "live_statuses");
    assert_eq!(live.cascade_owner_destroy().await.unwrap(), 1);
    assert_eq!(archived.cascade_owner_destroy().await.unwrap(), 0);

    let remaining = h.engine.query::<Status>().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), old.id());
    assert_eq!(remaining[0].project_id, Some(project.id()));
}

#[tokio::test]
async fn test_resolver_on_unsaved_member_touches_nothing() {
    let h = setup();
    let project = saved_project(&h.engine, "Docs").await;
    let mut status = Status::named("Draft", 1);
    status.project_id = Some(project.id());

    let resolver = DependentResolver::new(&h.engine, "project_id");
    let resolution = resolver
        .resolve(Dependent::Nullify, &mut status)
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Nullified);
    assert_eq!(status.project_id, None);

    let resolution = resolver
        .resolve(Dependent::Destroy, &mut status)
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Destroyed);

    let stats = h.adapter.stats();
    assert_eq!((stats.destroys, stats.deletes), (0, 0));
}

#[tokio::test]
async fn test_owner_destroy_walks_declared_associations() {
    let h = setup();
    let mut room = Room {
        name: Some("lobby".into()),
        ..Default::default()
    };
    h.engine.save(&mut room).await.unwrap();

    let registry = AssociationRegistry::<Room>::for_model();
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["messages", "topics"]);

    let mut messages = h.engine.many(&room, &*ROOM_MESSAGES);
    for position in 1..=2 {
        messages
            .create(doc! { "body" => "hi", "position" => position })
            .await
            .unwrap();
    }
    let mut topics = h.engine.many(&room, &*ROOM_TOPICS);
    let topic = topics.create(doc! { "title" => "Rust" }).await.unwrap();

    h.engine.destroy_with_dependents(&room).await.unwrap();

    // Messages are deleted without hooks; the topic loses its room.
    assert_eq!(h.engine.query::<Message>().count().await.unwrap(), 0);
    assert_eq!(h.hook_calls(), 1);
    let stored = h.engine.fetch::<Topic>(topic.id()).await.unwrap().unwrap();
    assert_eq!(stored.room_id, None);
    assert!(h.engine.fetch::<Room>(room.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_without_declared_associations_is_destroyed() {
    let h = setup();
    let project = saved_project(&h.engine, "Docs").await;
    assert!(AssociationRegistry::<Project>::for_model().is_empty());

    h.engine.destroy_with_dependents(&project).await.unwrap();
    assert!(h.engine.fetch::<Project>(project.id()).await.unwrap().is_none());
    assert_eq!(h.hook_calls(), 1);
}
