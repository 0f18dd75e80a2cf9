#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum_server::Server;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::schemas::{NewFileInfo, NodeResources};
use coord::core::config::CoordConfig;
use coord::core::health::liveness_monitor;
use coord::core::routes::admin_router;
use coord::core::server::serve_protocol;
use coord::core::state::CoordinatorState;
use node::client::CoordinatorClient;

/// A coordinator with both listeners on ephemeral ports and a fast liveness
/// monitor.
pub struct TestCoordinator {
    pub state: CoordinatorState,
    pub protocol_addr: SocketAddr,
    pub admin_url: String,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl TestCoordinator {
    pub async fn new() -> Result<Self> {
        Self::with_config(fast_config(Duration::from_millis(600))).await
    }

    pub async fn with_config(config: CoordConfig) -> Result<Self> {
        Self::with_limits(config, 15, Duration::from_secs(5)).await
    }

    pub async fn with_limits(
        config: CoordConfig,
        max_connections: usize,
        io_timeout: Duration,
    ) -> Result<Self> {
        let scan_interval = config.scan_interval;
        let state = CoordinatorState::new(config, max_connections, io_timeout);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let protocol = TcpListener::bind("127.0.0.1:0").await?;
        let protocol_addr = protocol.local_addr()?;
        let protocol_handle = tokio::spawn(serve_protocol(
            protocol,
            state.clone(),
            shutdown_rx.clone(),
        ));

        let monitor_handle = tokio::spawn(liveness_monitor(
            state.clone(),
            scan_interval,
            shutdown_rx.clone(),
        ));

        let admin = TcpListener::bind("127.0.0.1:0").await?;
        let admin_url = format!("http://{}", admin.local_addr()?);
        let app = admin_router(state.clone());
        let mut admin_shutdown = shutdown_rx;
        let admin_handle = tokio::spawn(async move {
            let server = Server::from_tcp(admin.into_std()?).serve(app.into_make_service());
            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = admin_shutdown.changed() => Ok(()),
            }
        });

        Ok(Self {
            state,
            protocol_addr,
            admin_url,
            shutdown_tx,
            handles: vec![protocol_handle, monitor_handle, admin_handle],
        })
    }

    pub fn client(&self) -> CoordinatorClient {
        CoordinatorClient::new(self.protocol_addr, Duration::from_secs(5))
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            handle.abort();
            let _ = handle.await;
        }
        Ok(())
    }
}

pub fn fast_config(liveness_timeout: Duration) -> CoordConfig {
    CoordConfig {
        liveness_timeout,
        scan_interval: Duration::from_millis(100),
        ..CoordConfig::default()
    }
}

pub fn resources(storage_gb: u64, bandwidth_mbps: u32) -> NodeResources {
    NodeResources {
        cpu_cores: 4,
        memory_gb: 8,
        storage_gb,
        bandwidth_mbps,
    }
}

pub fn new_file(file_id: &str, owner: &str, file_size: u64) -> NewFileInfo {
    NewFileInfo {
        file_id: file_id.to_string(),
        file_name: format!("{file_id}.bin"),
        file_size,
        owner_node: owner.to_string(),
        chunk_size: None,
        file_path: None,
    }
}

pub async fn register(
    client: &CoordinatorClient,
    node_id: &str,
    storage_gb: u64,
    bandwidth_mbps: u32,
) -> Result<()> {
    client
        .register(node_id, "localhost", 6000, resources(storage_gb, bandwidth_mbps))
        .await?;
    Ok(())
}

pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
