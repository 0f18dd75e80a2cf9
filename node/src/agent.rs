use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use common::constants::BYTES_PER_GB;
use common::schemas::{FileListing, NewFileInfo, NodeResources, TransferCompleteRequest, TransferType};

use crate::client::{ClientError, CoordinatorClient};
use crate::transfer::{ChunkSchedule, adaptive_chunk_size, simulate};

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("insufficient storage: {required} bytes required, {available} available")]
    InsufficientStorage { required: u64, available: u64 },
    #[error("transfer simulation failed: {0}")]
    Transfer(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub resources: NodeResources,
    pub coordinator: SocketAddr,
    pub request_timeout: Duration,
    /// Multiplier applied to simulated transfer delays.
    pub time_scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub file_id: String,
    pub file_name: String,
    pub source_node: String,
    pub bytes: u64,
    pub chunks: u64,
    pub elapsed: Duration,
}

/// A storage node as seen from its own side.
#[derive(Debug)]
pub struct NodeAgent {
    config: NodeConfig,
    client: CoordinatorClient,
    used_storage: AtomicU64,
}

impl NodeAgent {
    pub fn new(config: NodeConfig) -> Self {
        let client = CoordinatorClient::new(config.coordinator, config.request_timeout);
        Self {
            config,
            client,
            used_storage: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn client(&self) -> &CoordinatorClient {
        &self.client
    }

    pub fn used_storage(&self) -> u64 {
        self.used_storage.load(Ordering::Relaxed)
    }

    fn total_storage(&self) -> u64 {
        self.config.resources.storage_gb.saturating_mul(BYTES_PER_GB)
    }

    pub async fn register(&self) -> Result<(), ClientError> {
        let reply = self
            .client
            .register(
                &self.config.node_id,
                &self.config.host,
                self.config.port,
                self.config.resources,
            )
            .await?;
        info!(
            node_id = %self.config.node_id,
            coordinator = %self.client.addr(),
            message = reply.message.as_deref().unwrap_or(""),
            "registered"
        );
        Ok(())
    }

    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        self.client.heartbeat(&self.config.node_id).await
    }

    /// Reserves local space for a new file and announces it.
    pub async fn create_file(&self, file_name: &str, file_size: u64) -> Result<NewFileInfo, NodeError> {
        let available = self.total_storage().saturating_sub(self.used_storage());
        if file_size > available {
            return Err(NodeError::InsufficientStorage {
                required: file_size,
                available,
            });
        }

        let info = NewFileInfo {
            file_id: Uuid::new_v4().simple().to_string(),
            file_name: file_name.to_string(),
            file_size,
            owner_node: self.config.node_id.clone(),
            chunk_size: Some(adaptive_chunk_size(file_size, self.config.resources.cpu_cores)),
            file_path: Some(format!("node_storage_{}/{}", self.config.node_id, file_name)),
        };

        self.client
            .file_created(&self.config.node_id, info.clone())
            .await?;
        self.used_storage.fetch_add(file_size, Ordering::Relaxed);

        info!(file_id = %info.file_id, file_name, file_size, "file created");
        Ok(info)
    }

    pub async fn list_files(&self) -> Result<Vec<FileListing>, ClientError> {
        self.client.list_files(&self.config.node_id).await
    }

    /// Plans a download with the coordinator, plays out the chunk timings and
    /// reports the result back.
    pub async fn download(&self, file_id: &str) -> Result<DownloadReport, NodeError> {
        let plan = self
            .client
            .download_request(&self.config.node_id, file_id)
            .await?;

        let schedule = ChunkSchedule::new(
            plan.file_info.file_size,
            plan.file_info.chunk_size,
            plan.params.bandwidth_mbps,
            self.config.resources.cpu_cores,
            self.config.time_scale,
        );
        info!(
            file_id,
            source = %plan.source_node,
            chunks = schedule.total_chunks,
            workers = schedule.workers,
            estimated = plan.params.estimated_time,
            "download started"
        );

        let outcome = simulate(&schedule).await;
        let success = outcome.is_ok();
        let elapsed = outcome.as_ref().copied().unwrap_or_default();

        let complete = TransferCompleteRequest {
            node_id: self.config.node_id.clone(),
            file_id: Some(file_id.to_string()),
            transfer_type: TransferType::Download,
            success,
            duration_secs: Some(elapsed.as_secs_f64()),
        };
        if let Err(e) = self.client.transfer_complete(complete).await {
            warn!(file_id, "failed to report transfer completion: {e}");
        }

        outcome.map_err(NodeError::Transfer)?;
        self.used_storage
            .fetch_add(plan.file_info.file_size, Ordering::Relaxed);

        info!(file_id, ?elapsed, "download finished");

        Ok(DownloadReport {
            file_id: file_id.to_string(),
            file_name: plan.file_info.file_name,
            source_node: plan.source_node,
            bytes: plan.file_info.file_size,
            chunks: schedule.total_chunks,
            elapsed,
        })
    }
}
