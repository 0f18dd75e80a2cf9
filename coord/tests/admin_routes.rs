use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::schemas::{
    DownloadRequest, FileCreatedRequest, NewFileInfo, RegisterRequest, ReplyStatus,
    Request as NodeRequest, ResourceSpec, TransferCompleteRequest, TransferType,
};
use coord::core::config::CoordConfig;
use coord::core::debug::PlacementResponse;
use coord::core::routes::admin_router;
use coord::core::state::CoordinatorState;

fn test_app() -> (Router, CoordinatorState) {
    let state = CoordinatorState::new(CoordConfig::default(), 4, Duration::from_secs(5));
    (admin_router(state.clone()), state)
}

fn register(state: &CoordinatorState, node_id: &str, storage_gb: u64, bandwidth_mbps: u32) {
    let reply = state.handle(NodeRequest::Register(RegisterRequest {
        node_id: node_id.into(),
        host: "localhost".into(),
        port: 6000,
        resources: ResourceSpec {
            cpu_cores: Some(4),
            memory_gb: Some(8),
            storage_gb: Some(storage_gb),
            bandwidth_mbps: Some(bandwidth_mbps),
        },
    }));
    assert_eq!(reply.status, ReplyStatus::Ok);
}

fn create(state: &CoordinatorState, owner: &str, file_id: &str, file_size: u64) {
    let reply = state.handle(NodeRequest::FileCreated(FileCreatedRequest {
        node_id: owner.into(),
        file_info: NewFileInfo {
            file_id: file_id.into(),
            file_name: format!("{file_id}.dat"),
            file_size,
            owner_node: owner.into(),
            chunk_size: None,
            file_path: None,
        },
    }));
    assert_eq!(reply.status, ReplyStatus::Ack, "{reply:?}");
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn nodes_report_storage_usage() {
    let (app, state) = test_app();
    register(&state, "nodeA", 1, 100);
    create(&state, "nodeA", "f1", 268_435_456);

    let (status, body) = get_json(&app, "/admin/nodes").await;
    assert_eq!(status, StatusCode::OK);
    let nodes = body.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["node_id"], "nodeA");
    assert_eq!(nodes[0]["status"], "ACTIVE");
    assert_eq!(nodes[0]["used_storage_bytes"], 268_435_456);
    assert_eq!(nodes[0]["storage_usage_percent"], 25.0);
}

#[tokio::test]
async fn files_list_online_replicas() {
    let (app, state) = test_app();
    register(&state, "nodeA", 10, 100);
    register(&state, "nodeB", 10, 100);
    create(&state, "nodeA", "f1", 1_000_000);

    let (status, body) = get_json(&app, "/admin/files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["file_id"], "f1");
    assert_eq!(body[0]["total_chunks"], 1);
    assert_eq!(body[0]["online_replicas"], serde_json::json!(["nodeA", "nodeB"]));
}

#[tokio::test]
async fn placement_debug_ranks_candidates() {
    let (app, state) = test_app();
    register(&state, "nodeA", 10, 100);
    create(&state, "nodeA", "f1", 1_000_000);
    register(&state, "nodeB", 10, 100);
    register(&state, "nodeC", 100, 1000);

    let (status, body) = get_json(&app, "/debug/placement/f1").await;
    assert_eq!(status, StatusCode::OK);
    let placement: PlacementResponse = serde_json::from_value(body).unwrap();
    assert_eq!(placement.file_id, "f1");
    assert_eq!(placement.replicas, vec!["nodeA".to_string()]);
    let order: Vec<_> = placement.candidates.iter().map(|c| c.node_id.as_str()).collect();
    assert_eq!(order, vec!["nodeC", "nodeB"]);
    assert!(placement.candidates[0].score > placement.candidates[1].score);

    let (status, body) = get_json(&app, "/debug/placement/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn performance_reflects_completed_transfers() {
    let (app, state) = test_app();
    register(&state, "nodeA", 10, 100);
    create(&state, "nodeA", "f1", 10 * 1024 * 1024);
    register(&state, "nodeB", 10, 100);

    let plan = state.handle(NodeRequest::DownloadRequest(DownloadRequest {
        node_id: "nodeB".into(),
        file_id: "f1".into(),
    }));
    assert_eq!(plan.source_node.as_deref(), Some("nodeA"));

    state.handle(NodeRequest::TransferComplete(TransferCompleteRequest {
        node_id: "nodeB".into(),
        file_id: Some("f1".into()),
        transfer_type: TransferType::Download,
        success: true,
        duration_secs: Some(2.0),
    }));

    let (status, body) = get_json(&app, "/admin/performance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_transfers"], 1);
    assert_eq!(body["nodes"]["nodeA"]["success_rate"], 1.0);
    // 10 MiB in 2 s
    assert_eq!(body["nodes"]["nodeA"]["avg_speed_mbps"], 5.0);
    assert_eq!(body["recent"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn repair_on_empty_catalog_checks_nothing() {
    let (app, _state) = test_app();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/repair")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["checked"], 0);
    assert_eq!(body["files"], serde_json::json!([]));
}
