//! Session integration tests against a mocked server connection

mod common;

use common::{MockConnection, into_document};
use pype_ops::operations::CreateOperation;
use pype_ops::prelude::*;
use pype_ops::{Operation, RestResponse};
use serde_json::{Value, json};
use std::sync::Arc;

const PROJECT: &str = "demo";

async fn demo_connection() -> MockConnection {
    let con = MockConnection::new();
    con.with_project(json!({
        "name": PROJECT,
        "code": "dm",
        "folderTypes": [{"name": "Asset"}, {"name": "Shot"}],
        "taskTypes": [{"name": "Modeling"}, {"name": "Animation"}],
    }))
    .await;
    con.with_attributes("folder", &["fps", "frameStart"]).await;
    con.with_attributes("subset", &[]).await;
    con.with_attributes("version", &["comment", "fps"]).await;
    con
}

fn wire_operations(call: &common::Call) -> Vec<Value> {
    call.body.as_ref().unwrap()["operations"]
        .as_array()
        .unwrap()
        .clone()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_project_and_hero_version_create_unsupported() {
    let con = MockConnection::new();
    let session = OperationsSession::new(con.shared());

    for kind in [EntityKind::Project, EntityKind::HeroVersion] {
        let err = CreateOperation::prepare(&session, PROJECT, kind, Document::new())
            .await
            .unwrap_err();
        assert!(err.is_unsupported(), "{kind} should be unsupported");
    }

    let err = session
        .create_entity(PROJECT, EntityKind::Project, Document::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_unsupported());

    assert!(con.get_call_history().await.is_empty());
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn test_hero_version_create_is_ignored() {
    let con = MockConnection::new();
    let session = OperationsSession::new(con.shared());

    let handle = session
        .create_entity(PROJECT, EntityKind::HeroVersion, Document::new(), None)
        .await
        .unwrap();
    assert!(handle.is_none());
    assert_eq!(session.pending_len(), 0);
    assert!(con.get_call_history().await.is_empty());
}

#[tokio::test]
async fn test_asset_with_tasks_creates_folder_then_tasks() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    // Unrelated operation registered before the folder
    let unrelated = session
        .delete_entity(PROJECT, EntityKind::Subset, &new_id().to_string(), None)
        .unwrap();

    let asset = new_asset_document(
        "sh010",
        "project-id",
        None,
        Vec::new(),
        Some(into_document(json!({
            "fps": 25,
            "tasks": {
                "model": {"type": "Modeling"},
                "anim": {"type": "Animation"}
            }
        }))),
        None,
    )
    .unwrap();
    let folder = session
        .create_entity(PROJECT, EntityKind::Asset, asset, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(folder.entity_kind, EntityKind::Folder);

    let pending = session.pending_operations();
    assert_eq!(pending.len(), 4);
    assert_eq!(pending[0].id(), &unrelated.operation_id);
    assert_eq!(pending[1].id(), &folder.operation_id);
    assert_eq!(session.nested_len(), 0);

    let folder_wire = pending[1].to_wire_operation().unwrap();
    let folder_data = folder_wire.data.unwrap();
    assert!(folder_data.get("data").is_none_or(|d| d.get("tasks").is_none()));
    assert_eq!(folder_data["attrib"], json!({"fps": 25}));

    let mut task_names = Vec::new();
    for task in &pending[2..] {
        let wire = task.to_wire_operation().unwrap();
        assert_eq!(wire.entity_type, EntityKind::Task);
        let data = wire.data.unwrap();
        assert_eq!(data["folderId"], json!(folder.entity_id.as_str()));
        task_names.push(data["name"].as_str().unwrap().to_string());
        let expected_type = match data["name"].as_str().unwrap() {
            "model" => "Modeling",
            _ => "Animation",
        };
        assert_eq!(data["taskType"], json!(expected_type));
    }
    assert_eq!(task_names, vec!["model", "anim"]);
}

#[tokio::test]
async fn test_nested_of_waits_for_parent() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    let subset = new_subset_document("modelMain", "model", new_id().as_str(), None, None).unwrap();
    let parent = CreateOperation::prepare(&session, PROJECT, EntityKind::Subset, subset)
        .await
        .unwrap()
        .operation;
    let parent_op_id = parent.id().clone();

    let version = new_version_document(1, parent.entity_id().as_str(), None, None).unwrap();
    let child = session
        .create_entity(PROJECT, EntityKind::Version, version, Some(&parent_op_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.pending_len(), 0);
    assert_eq!(session.nested_len(), 1);

    // Nothing is sent while the child waits for its parent
    session.commit().await.unwrap();
    assert!(con.calls_to("POST").await.is_empty());
    assert_eq!(session.nested_len(), 1);

    let unrelated = session
        .delete_entity(PROJECT, EntityKind::Representation, new_id().as_str(), None)
        .unwrap();
    let handle = session.add_operation(Operation::Create(parent), None);
    assert_eq!(handle.operation_id, parent_op_id);
    assert_eq!(session.nested_len(), 0);

    let order: Vec<_> = session
        .pending_operations()
        .iter()
        .map(|op| op.id().clone())
        .collect();
    assert_eq!(
        order,
        vec![unrelated.operation_id, parent_op_id, child.operation_id]
    );
}

#[tokio::test]
async fn test_object_id_in_payload_fails_at_construction() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    let mut subset = new_subset_document("modelMain", "model", new_id().as_str(), None, None)
        .unwrap();
    subset.insert(
        "data".into(),
        json!({"family": "model", "source": {"$oid": "5f1a2b3c4d5e6f7a8b9c0d1e"}}),
    );
    let err = session
        .create_entity(PROJECT, EntityKind::Subset, subset, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::NonSerializablePayload { .. }));
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn test_prepared_folder_keeps_its_tasks() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    let asset = new_asset_document(
        "sh020",
        "project-id",
        None,
        Vec::new(),
        Some(into_document(json!({"tasks": {"model": {"type": "Modeling"}}}))),
        None,
    )
    .unwrap();
    let prepared = CreateOperation::prepare(&session, PROJECT, EntityKind::Asset, asset)
        .await
        .unwrap();
    assert_eq!(prepared.nested_tasks.len(), 1);
    let folder_op_id = prepared.operation.id().clone();

    let handle = session.add_prepared_create(prepared, None).await.unwrap();
    assert_eq!(handle.operation_id, folder_op_id);

    let pending = session.pending_operations();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id(), &folder_op_id);
    assert_eq!(pending[1].entity_kind(), EntityKind::Task);
    let task = pending[1].to_wire_operation().unwrap().data.unwrap();
    assert_eq!(task["name"], "model");
    assert_eq!(task["folderId"], json!(handle.entity_id.as_str()));
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_object_id_in_update_fails_at_construction() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let mut changes = DiffMap::new();
    changes.insert(
        "data".into(),
        FieldValue::Set(json!({"source": {"$oid": "5f1a2b3c4d5e6f7a8b9c0d1e"}})),
    );

    let err = session
        .update_entity(PROJECT, EntityKind::Version, new_id().as_str(), changes, None)
        .await
        .unwrap_err();
    match err {
        OpsError::NonSerializablePayload { path, .. } => assert_eq!(path, "$.data.source"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.pending_len(), 0);
    assert!(con.get_call_history().await.is_empty());
}

#[tokio::test]
async fn test_update_asset_not_implemented() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let mut changes = DiffMap::new();
    changes.insert("name".into(), FieldValue::Set(json!("sh020")));

    let err = session
        .update_entity(PROJECT, EntityKind::Asset, new_id().as_str(), changes.clone(), None)
        .await
        .unwrap_err();
    assert!(err.is_not_implemented());

    let err = session
        .update_entity(PROJECT, EntityKind::Project, new_id().as_str(), changes, None)
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn test_update_version_data_uses_current_entity() {
    let con = demo_connection().await;
    let version_id = new_id();
    con.with_entity(
        PROJECT,
        EntityKind::Version,
        json!({
            "id": version_id.as_str(),
            "version": 3,
            "author": "jane",
            "attrib": {"comment": "first pass", "fps": 25},
            "data": {"machine": "ws01"}
        }),
    )
    .await;
    let session = OperationsSession::new(con.shared());

    let old = into_document(json!({"name": 3, "data": {"comment": "first pass", "fps": 25, "author": "jane"}}));
    let new = into_document(json!({"name": 4, "data": {"fps": 24, "source": "scene.ma"}}));
    let changes = diff(&old, &new, true);

    session
        .update_entity(PROJECT, EntityKind::Version, version_id.as_str(), changes, None)
        .await
        .unwrap();
    session.commit().await.unwrap();

    let posts = con.calls_to("POST").await;
    assert_eq!(posts.len(), 1);
    let operations = wire_operations(&posts[0]);
    assert_eq!(operations.len(), 1);
    let op = &operations[0];
    assert_eq!(op["type"], "update");
    assert_eq!(op["entityType"], "version");
    assert_eq!(op["entityId"], json!(version_id.as_str()));
    assert_eq!(op["data"]["version"], 4);
    assert_eq!(op["data"]["author"], Value::Null);
    assert_eq!(op["data"]["attrib"], json!({"fps": 24, "comment": null}));
    assert_eq!(op["data"]["data"], json!({"source": "scene.ma", "machine": null}));
}

#[tokio::test]
async fn test_update_missing_entity() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let mut changes = DiffMap::new();
    changes.insert("data".into(), FieldValue::Set(json!({"comment": "x"})));

    let err = session
        .update_entity(PROJECT, EntityKind::Version, new_id().as_str(), changes, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::EntityNotFound { .. }));
}

#[tokio::test]
async fn test_empty_update_is_not_sent() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let doc = into_document(json!({"name": "modelMain", "data": {"family": "model"}}));

    session
        .update_entity(
            PROJECT,
            EntityKind::Subset,
            new_id().as_str(),
            diff(&doc, &doc, true),
            None,
        )
        .await
        .unwrap();
    assert_eq!(session.pending_len(), 1);

    session.commit().await.unwrap();
    assert!(con.calls_to("POST").await.is_empty());
    assert_eq!(session.pending_len(), 0);
}

// ============================================================================
// Commit
// ============================================================================

#[tokio::test]
async fn test_empty_commit_makes_no_calls() {
    let con = MockConnection::new();
    let session = OperationsSession::new(con.shared());
    session.commit().await.unwrap();
    assert!(con.get_call_history().await.is_empty());
}

#[tokio::test]
async fn test_commit_groups_by_project() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    let first = session
        .delete_entity("alpha", EntityKind::Asset, new_id().as_str(), None)
        .unwrap();
    let second = session
        .delete_entity("beta", EntityKind::Version, new_id().as_str(), None)
        .unwrap();
    let third = session
        .delete_entity("alpha", EntityKind::Subset, new_id().as_str(), None)
        .unwrap();

    session.commit().await.unwrap();
    assert_eq!(session.pending_len(), 0);

    let posts = con.calls_to("POST").await;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].path, "projects/alpha/operations");
    assert_eq!(posts[1].path, "projects/beta/operations");
    assert_eq!(posts[0].body.as_ref().unwrap()["canFail"], json!(false));

    let alpha = wire_operations(&posts[0]);
    assert_eq!(alpha.len(), 2);
    assert_eq!(alpha[0]["id"], json!(first.operation_id.as_str()));
    assert_eq!(alpha[0]["entityType"], "folder");
    assert!(alpha[0].get("data").is_none());
    assert_eq!(alpha[1]["id"], json!(third.operation_id.as_str()));

    let beta = wire_operations(&posts[1]);
    assert_eq!(beta[0]["id"], json!(second.operation_id.as_str()));
    assert_eq!(beta[0]["type"], "delete");
}

#[tokio::test]
async fn test_commit_reports_first_failed_operation() {
    for order in [["X", "Y"], ["Y", "X"]] {
        let con = demo_connection().await;
        let results: Vec<Value> = order
            .iter()
            .map(|id| match *id {
                "X" => json!({"id": "X", "success": false, "error": "boom"}),
                _ => json!({"id": "Y", "success": true}),
            })
            .collect();
        con.expect_post(RestResponse::new(
            200,
            Some(json!({"success": false, "operations": results})),
        ))
        .await;

        let session = OperationsSession::new(con.shared());
        session
            .delete_entity(PROJECT, EntityKind::Subset, new_id().as_str(), None)
            .unwrap();
        session
            .delete_entity(PROJECT, EntityKind::Version, new_id().as_str(), None)
            .unwrap();

        let err = session.commit().await.unwrap_err();
        assert!(err.is_failed_operations());
        assert_eq!(err.failed_operation_id(), Some("X"));
        let message = err.to_string();
        assert!(message.contains("\"X\""));
        assert!(message.contains("boom"));
        assert_eq!(session.pending_len(), 0);
    }
}

#[tokio::test]
async fn test_commit_names_payload_of_failed_operation() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let entity_id = new_id();
    let handle = session
        .delete_entity(PROJECT, EntityKind::Version, entity_id.as_str(), None)
        .unwrap();
    con.expect_post(RestResponse::new(
        200,
        Some(json!({
            "success": false,
            "operations": [{
                "id": handle.operation_id.as_str(),
                "success": false,
                "error": "Version is locked"
            }]
        })),
    ))
    .await;

    let err = session.commit().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains(entity_id.as_str()));
    assert!(message.contains("Version is locked"));
}

#[tokio::test]
async fn test_commit_sends_every_project_before_failing() {
    let con = demo_connection().await;
    con.expect_post(RestResponse::new(400, Some(json!({"success": false, "detail": "bad"}))))
        .await;
    let session = OperationsSession::new(con.shared());
    session
        .delete_entity("alpha", EntityKind::Subset, new_id().as_str(), None)
        .unwrap();
    session
        .delete_entity("beta", EntityKind::Subset, new_id().as_str(), None)
        .unwrap();

    let err = session.commit().await.unwrap_err();
    assert!(err.is_failed_operations());
    assert_eq!(err.failed_operation_id(), None);
    assert!(err.to_string().contains("Operation failed. Content"));
    assert_eq!(con.calls_to("POST").await.len(), 2);
}

#[tokio::test]
async fn test_create_payload_on_wire() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    let folder_id = new_id();

    let subset = new_subset_document(
        "modelMain",
        "model",
        folder_id.as_str(),
        Some(into_document(json!({"families": ["model", "review"]}))),
        None,
    )
    .unwrap();
    let handle = session
        .create_entity(PROJECT, EntityKind::Subset, subset, None)
        .await
        .unwrap()
        .unwrap();
    session.commit().await.unwrap();

    let posts = con.calls_to("POST").await;
    let op = &wire_operations(&posts[0])[0];
    assert_eq!(op["type"], "create");
    assert_eq!(op["entityType"], "subset");
    assert_eq!(op["entityId"], json!(handle.entity_id.as_str()));
    assert_eq!(op["data"]["id"], json!(handle.entity_id.as_str()));
    assert_eq!(op["data"]["name"], "modelMain");
    assert_eq!(op["data"]["family"], "model");
    assert_eq!(op["data"]["folderId"], json!(folder_id.as_str()));
}

#[tokio::test]
async fn test_project_lookup_is_cached() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());

    let mut project = session.get_project(PROJECT).await.unwrap().unwrap();
    project.insert("code".into(), json!("changed"));
    let again = session.get_project(PROJECT).await.unwrap().unwrap();
    assert_eq!(again["code"], "dm");
    assert!(session.get_project("missing").await.unwrap().is_none());
    assert!(session.get_project("missing").await.unwrap().is_none());

    let lookups = con.calls_to("GET").await;
    assert_eq!(lookups.len(), 2);
}

#[tokio::test]
async fn test_pending_operations_are_clones() {
    let con = demo_connection().await;
    let session = OperationsSession::new(con.shared());
    session
        .delete_entity(PROJECT, EntityKind::Representation, new_id().as_str(), None)
        .unwrap();
    let pending = session.pending_operations();
    assert!(matches!(pending[0], Operation::Delete(_)));
    assert_eq!(session.pending_len(), 1);
}

#[tokio::test]
async fn test_operations_registered_during_commit_go_to_next_commit() {
    let con = demo_connection().await;
    let gate = con.gate_posts().await;
    let session = Arc::new(OperationsSession::new(con.shared()));
    let sent = session
        .delete_entity(PROJECT, EntityKind::Subset, new_id().as_str(), None)
        .unwrap();

    let committing = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.commit().await }
    });
    gate.reached.notified().await;

    // The batch is in flight; this registration must not join it
    let late = session
        .delete_entity(PROJECT, EntityKind::Version, new_id().as_str(), None)
        .unwrap();
    gate.release.notify_one();
    committing.await.unwrap().unwrap();

    let posts = con.calls_to("POST").await;
    assert_eq!(posts.len(), 1);
    let operations = wire_operations(&posts[0]);
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["id"], json!(sent.operation_id.as_str()));

    assert_eq!(session.pending_len(), 1);
    assert_eq!(session.pending_operations()[0].id(), &late.operation_id);
}
