mod common;

use std::net::SocketAddr;
use std::time::Duration;

use ::common::error::ErrorKind;
use ::common::schemas::{TransferCompleteRequest, TransferType};
use coord::core::config::CoordConfig;
use node::agent::{NodeAgent, NodeConfig};
use node::client::ClientError;

use crate::common::{TestCoordinator, new_file, register, resources};

fn roomy_config() -> CoordConfig {
    CoordConfig {
        liveness_timeout: Duration::from_secs(30),
        ..CoordConfig::default()
    }
}

fn agent_config(node_id: &str, coordinator: SocketAddr, bandwidth_mbps: u32) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        host: "localhost".to_string(),
        port: 6000,
        resources: resources(10, bandwidth_mbps),
        coordinator,
        request_timeout: Duration::from_secs(5),
        time_scale: 0.001,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_is_planned_at_the_slower_bandwidth() -> anyhow::Result<()> {
    let coord = TestCoordinator::with_config(roomy_config()).await?;
    let client = coord.client();
    register(&client, "nodeA", 10, 1000).await?;
    client
        .file_created("nodeA", new_file("f1", "nodeA", 10_000_000))
        .await?;
    register(&client, "nodeC", 10, 50).await?;

    let plan = client.download_request("nodeC", "f1").await?;
    assert_eq!(plan.source_node, "nodeA");
    assert_eq!(plan.source_host, "localhost");
    assert_eq!(plan.file_info.file_size, 10_000_000);
    assert_eq!(plan.params.bandwidth_mbps, 50);
    // 10 MB at 50 Mbps (6.25 MB/s)
    assert!((plan.params.estimated_time - 1.6).abs() < 1e-9);

    let busy = coord.state.with(|c| {
        (
            c.registry().get("nodeA").map(|n| n.active_transfers),
            c.transfers().in_flight_count(),
        )
    })?;
    assert_eq!(busy, (Some(1), 1));

    client
        .transfer_complete(TransferCompleteRequest {
            node_id: "nodeC".into(),
            file_id: Some("f1".into()),
            transfer_type: TransferType::Download,
            success: true,
            duration_secs: Some(2.0),
        })
        .await?;

    let files = client.list_files("nodeC").await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].replica_count, 2);

    let (load, record) = coord.state.with(|c| {
        (
            c.registry().get("nodeA").map(|n| n.active_transfers),
            c.performance().record_for("nodeA").cloned(),
        )
    })?;
    assert_eq!(load, Some(0));
    let record = record.expect("transfer recorded against the source");
    assert_eq!(record.total_transfers, 1);
    assert_eq!(record.successful_transfers, 1);

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_download_adds_no_replica() -> anyhow::Result<()> {
    let coord = TestCoordinator::with_config(roomy_config()).await?;
    let client = coord.client();
    register(&client, "nodeA", 10, 100).await?;
    client
        .file_created("nodeA", new_file("f1", "nodeA", 1_000_000))
        .await?;
    register(&client, "nodeB", 10, 100).await?;
    client
        .file_created("nodeB", new_file("f2", "nodeB", 1_000_000))
        .await?;
    register(&client, "nodeC", 10, 100).await?;

    client.download_request("nodeC", "f1").await?;
    client
        .transfer_complete(TransferCompleteRequest {
            node_id: "nodeC".into(),
            file_id: Some("f1".into()),
            transfer_type: TransferType::Download,
            success: false,
            duration_secs: Some(1.0),
        })
        .await?;

    let f1 = coord
        .state
        .with(|c| c.catalog().get("f1").cloned())?
        .expect("f1 exists");
    assert!(!f1.replica_nodes.contains("nodeC"));
    assert_eq!(coord.state.with(|c| c.transfers().in_flight_count())?, 0);

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_of_unknown_file_is_not_found() -> anyhow::Result<()> {
    let coord = TestCoordinator::with_config(roomy_config()).await?;
    let client = coord.client();
    register(&client, "nodeA", 10, 100).await?;

    let err = client.download_request("nodeA", "nope").await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotFound));

    let err = client
        .transfer_complete(TransferCompleteRequest {
            node_id: "nodeA".into(),
            file_id: Some("nope".into()),
            transfer_type: TransferType::Download,
            success: true,
            duration_secs: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected { kind: Some(ErrorKind::NotFound), .. }));

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_replica_keeps_serving_when_it_is_the_only_one() -> anyhow::Result<()> {
    let coord = TestCoordinator::with_config(roomy_config()).await?;
    let client = coord.client();
    register(&client, "nodeA", 10, 100).await?;
    client
        .file_created("nodeA", new_file("f1", "nodeA", 1_000_000))
        .await?;

    for requester in ["r1", "r2", "r3", "r4"] {
        register(&client, requester, 10, 100).await?;
        let plan = client.download_request(requester, "f1").await?;
        assert_eq!(plan.source_node, "nodeA");
    }

    let load = coord
        .state
        .with(|c| c.registry().get("nodeA").map(|n| n.active_transfers))?;
    assert_eq!(load, Some(4));

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn agents_create_and_download_end_to_end() -> anyhow::Result<()> {
    let coord = TestCoordinator::with_config(roomy_config()).await?;

    let owner = NodeAgent::new(agent_config("nodeA", coord.protocol_addr, 1000));
    owner.register().await?;
    let info = owner.create_file("report.csv", 2_000_000).await?;
    assert_eq!(info.owner_node, "nodeA");
    assert_eq!(info.chunk_size, Some(512 * 1024));
    assert_eq!(info.file_path.as_deref(), Some("node_storage_nodeA/report.csv"));
    assert_eq!(owner.used_storage(), 2_000_000);

    let reader = NodeAgent::new(agent_config("nodeB", coord.protocol_addr, 100));
    reader.register().await?;
    let report = reader.download(&info.file_id).await?;
    assert_eq!(report.source_node, "nodeA");
    assert_eq!(report.bytes, 2_000_000);
    assert_eq!(report.chunks, 4);
    assert_eq!(reader.used_storage(), 2_000_000);

    let files = reader.list_files().await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].replica_count, 2);

    let summary = coord.state.with(|c| c.performance().summary())?;
    assert_eq!(summary.total_transfers, 1);

    coord.shutdown().await
}
