use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use common::error::ApiError;
use common::schemas::{
    DownloadRequest, FileCreatedRequest, HeartbeatRequest, ListFilesRequest, RegisterRequest,
    Reply, Request, TransferCompleteRequest, TransferParams, UploadRequest,
};

use crate::core::catalog::{FileCatalog, FileRecord};
use crate::core::config::CoordConfig;
use crate::core::node::{NodeInfo, NodeRegistry, Registration};
use crate::core::perf::{PerformanceRecord, PerformanceSummary, PerformanceTracker, TransferSample};
use crate::core::placement::{ReplicaPlacer, ScoredNode};
use crate::core::recovery::{FileRecovery, RecoveryManager};
use crate::core::transfer::TransferCoordinator;

const RECENT_SAMPLES: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    #[serde(flatten)]
    pub info: NodeInfo,
    pub free_storage_bytes: u64,
    pub storage_usage_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    #[serde(flatten)]
    pub record: FileRecord,
    pub online_replicas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodePerformance {
    #[serde(flatten)]
    pub record: PerformanceRecord,
    pub success_rate: f64,
    pub avg_speed_mbps: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub nodes: BTreeMap<String, NodePerformance>,
    pub summary: PerformanceSummary,
    pub recent: Vec<TransferSample>,
}

/// Nodes demoted by one liveness sweep and what recovery did about each.
#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node_id: String,
    pub files: Vec<FileRecovery>,
}

/// All coordinator state. Every operation runs to completion under the
/// caller's lock and never blocks.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordConfig,
    registry: NodeRegistry,
    catalog: FileCatalog,
    perf: PerformanceTracker,
    placer: ReplicaPlacer,
    transfers: TransferCoordinator,
    recovery: RecoveryManager,
}

impl Coordinator {
    pub fn new(config: CoordConfig) -> Self {
        let scoring = config.scoring;
        Self {
            registry: NodeRegistry::new(),
            catalog: FileCatalog::new(),
            perf: PerformanceTracker::new(config.history_capacity, &scoring),
            placer: ReplicaPlacer::new(&scoring, config.max_concurrent_transfers),
            transfers: TransferCoordinator::new(&scoring, config.max_concurrent_transfers),
            recovery: RecoveryManager::new(config.replication_factor),
            config,
        }
    }

    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.perf
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    /// Handles one request; failures become ERROR replies.
    pub fn handle(&mut self, req: Request) -> Reply {
        self.handle_at(req, Instant::now())
    }

    pub fn handle_at(&mut self, req: Request, now: Instant) -> Reply {
        let action = req.action();
        match self.dispatch(req, now) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(action, kind = ?e.kind(), "request failed: {e}");
                Reply::from_error(&e)
            }
        }
    }

    pub fn dispatch(&mut self, req: Request, now: Instant) -> Result<Reply, ApiError> {
        match req {
            Request::Register(r) => self.register(r, now),
            Request::Heartbeat(r) => self.heartbeat(r, now),
            Request::FileCreated(r) => self.file_created(r),
            Request::ListFiles(r) => Ok(self.list_files(r)),
            Request::DownloadRequest(r) => self.download_request(r, now),
            Request::UploadRequest(r) => Ok(self.upload_request(r)),
            Request::TransferComplete(r) => self.transfer_complete(r, now),
        }
    }

    fn register(&mut self, req: RegisterRequest, now: Instant) -> Result<Reply, ApiError> {
        let registration =
            self.registry
                .register(&req.node_id, &req.host, req.port, &req.resources, now)?;

        if registration == Registration::Reactivated {
            self.resume_recovery(&req.node_id);
        }

        Ok(Reply::ok(format!(
            "Node {} registered successfully",
            req.node_id
        )))
    }

    fn heartbeat(&mut self, req: HeartbeatRequest, now: Instant) -> Result<Reply, ApiError> {
        if self.registry.heartbeat(&req.node_id, now)? {
            self.resume_recovery(&req.node_id);
        }
        Ok(Reply::ack())
    }

    /// A returning node may be the only source for files that were stuck.
    fn resume_recovery(&mut self, node_id: &str) {
        let files = self.catalog.files_with_replica(node_id);
        if files.is_empty() {
            return;
        }
        let outcomes = self.recovery.repair(
            &files,
            &mut self.catalog,
            &mut self.registry,
            &self.placer,
            &self.perf,
        );
        info!(node_id, checked = outcomes.len(), "re-checked files after reactivation");
    }

    fn file_created(&mut self, req: FileCreatedRequest) -> Result<Reply, ApiError> {
        let info = req.file_info;

        let owner = self
            .registry
            .get(&info.owner_node)
            .ok_or_else(|| ApiError::NotFound("Owner node not registered".into()))?;
        if owner.free_storage_bytes() < info.file_size {
            return Err(ApiError::Capacity(format!(
                "node {} lacks free storage for {} bytes",
                info.owner_node, info.file_size
            )));
        }

        let record = self.catalog.create(&info)?;
        let file_id = record.file_id.clone();
        self.registry
            .add_used_storage(&info.owner_node, info.file_size);

        info!(
            file_id = %file_id,
            file_name = %info.file_name,
            file_size = info.file_size,
            owner = %info.owner_node,
            reporter = %req.node_id,
            "file created"
        );

        if self.registry.len() >= self.config.min_nodes_for_replication {
            self.ensure_replication(&file_id)?;
        }

        Ok(Reply::ack_with(format!("File {} registered", info.file_name)))
    }

    fn list_files(&self, req: ListFilesRequest) -> Reply {
        let files = self.catalog.list(&self.registry);
        tracing::debug!(node_id = %req.node_id, count = files.len(), "listing files");
        Reply::files(files)
    }

    fn download_request(&mut self, req: DownloadRequest, now: Instant) -> Result<Reply, ApiError> {
        let file = self
            .catalog
            .get(&req.file_id)
            .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

        let plan =
            self.transfers
                .plan_download(&mut self.registry, &self.perf, file, &req.node_id, now)?;

        Ok(Reply {
            source_node: Some(plan.source_node.clone()),
            source_host: Some(plan.source_host.clone()),
            file_info: Some(file.to_transfer_info()),
            transfer_params: Some(TransferParams {
                bandwidth_mbps: plan.bandwidth_mbps,
                estimated_time: plan.estimated_seconds,
            }),
            ..Reply::default()
        })
    }

    fn upload_request(&mut self, req: UploadRequest) -> Reply {
        info!(node_id = %req.node_id, file_id = ?req.file_id, "upload requested");
        Reply::ok("Upload coordinated")
    }

    fn transfer_complete(
        &mut self,
        req: TransferCompleteRequest,
        now: Instant,
    ) -> Result<Reply, ApiError> {
        let completion = self.transfers.complete_transfer(
            &mut self.registry,
            &mut self.catalog,
            &mut self.perf,
            &req,
            now,
        )?;

        info!(
            node_id = %req.node_id,
            file_id = ?req.file_id,
            transfer_type = ?req.transfer_type,
            success = req.success,
            released = completion.released,
            new_replica = completion.new_replica,
            "transfer complete"
        );

        Ok(Reply::ok("Transfer recorded"))
    }

    /// Tops `file_id` up to the replication factor.
    pub fn ensure_replication(&mut self, file_id: &str) -> Result<FileRecovery, ApiError> {
        if self.catalog.get(file_id).is_none() {
            return Err(ApiError::NotFound("File not found".into()));
        }
        self.recovery
            .repair(
                &[file_id.to_string()],
                &mut self.catalog,
                &mut self.registry,
                &self.placer,
                &self.perf,
            )
            .pop()
            .ok_or_else(|| ApiError::NotFound("File not found".into()))
    }

    /// One liveness pass: demote silent nodes and recover their files.
    pub fn sweep(&mut self, now: Instant) -> Vec<NodeFailure> {
        let offline = self
            .registry
            .sweep_stale(now, self.config.liveness_timeout);

        let released = self.transfers.release_stale(&mut self.registry);
        if !released.is_empty() {
            info!(count = released.len(), "released transfers with an offline end");
        }

        offline
            .into_iter()
            .map(|node_id| {
                let files = self.recovery.handle_failure(
                    &node_id,
                    &mut self.catalog,
                    &mut self.registry,
                    &self.placer,
                    &self.perf,
                );
                NodeFailure { node_id, files }
            })
            .collect()
    }

    pub fn repair_all(&mut self) -> Vec<FileRecovery> {
        let ids = self.catalog.ids();
        self.recovery.repair(
            &ids,
            &mut self.catalog,
            &mut self.registry,
            &self.placer,
            &self.perf,
        )
    }

    pub fn rank_placement(&self, file_id: &str) -> Result<Vec<ScoredNode>, ApiError> {
        let file = self
            .catalog
            .get(file_id)
            .ok_or_else(|| ApiError::NotFound("File not found".into()))?;
        Ok(self
            .placer
            .rank(&self.registry, &self.perf, file.file_size, &file.replica_nodes))
    }

    pub fn node_snapshots(&self) -> Vec<NodeSnapshot> {
        self.registry
            .list()
            .into_iter()
            .map(|n| NodeSnapshot {
                info: n.clone(),
                free_storage_bytes: n.free_storage_bytes(),
                storage_usage_percent: n.storage_usage_percent(),
            })
            .collect()
    }

    pub fn file_snapshots(&self) -> Vec<FileSnapshot> {
        self.catalog
            .all()
            .map(|f| FileSnapshot {
                online_replicas: f.online_replicas(&self.registry),
                record: f.clone(),
            })
            .collect()
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let nodes = self
            .perf
            .records()
            .iter()
            .map(|(id, r)| {
                (
                    id.clone(),
                    NodePerformance {
                        record: r.clone(),
                        success_rate: r.success_rate(),
                        avg_speed_mbps: r.avg_speed_mbps(),
                        score: self.perf.score(id),
                    },
                )
            })
            .collect();

        PerformanceReport {
            nodes,
            summary: self.perf.summary(),
            recent: self.perf.recent(RECENT_SAMPLES),
        }
    }
}
