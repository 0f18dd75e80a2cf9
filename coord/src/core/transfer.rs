use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

use common::constants::{BYTES_PER_MBIT, DEFAULT_REQUESTER_BANDWIDTH_MBPS};
use common::error::ApiError;
use common::schemas::{TransferCompleteRequest, TransferType};

use crate::core::catalog::{FileCatalog, FileRecord};
use crate::core::config::{ScoringConfig, SourceWeights};
use crate::core::node::{NodeInfo, NodeRegistry};
use crate::core::perf::PerformanceTracker;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TransferPlan {
    pub requesting_node: String,
    pub source_node: String,
    pub source_host: String,
    pub file_id: String,
    pub bandwidth_mbps: u32,
    pub estimated_seconds: f64,
}

#[derive(Clone, Debug)]
pub struct InFlightTransfer {
    pub requester: String,
    pub source: String,
    pub file_id: String,
    pub file_size: u64,
    pub started: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// A planned transfer matched and its slots were released.
    pub released: bool,
    /// The reporting node became a new replica of the file.
    pub new_replica: bool,
}

/// Picks download sources and keeps the books on transfers it planned.
#[derive(Debug)]
pub struct TransferCoordinator {
    weights: SourceWeights,
    max_concurrent_transfers: u32,
    reference_bandwidth_mbps: f64,
    proximity: f64,
    in_flight: BTreeMap<(String, String), InFlightTransfer>,
}

impl TransferCoordinator {
    pub fn new(scoring: &ScoringConfig, max_concurrent_transfers: u32) -> Self {
        Self {
            weights: scoring.source,
            max_concurrent_transfers,
            reference_bandwidth_mbps: scoring.reference_bandwidth_mbps,
            proximity: scoring.proximity,
            in_flight: BTreeMap::new(),
        }
    }

    fn source_score(&self, node: &NodeInfo, perf: &PerformanceTracker) -> f64 {
        let max = self.max_concurrent_transfers as f64;
        let load = (max - node.active_transfers as f64) / max;
        let bandwidth =
            (node.resources.bandwidth_mbps as f64 / self.reference_bandwidth_mbps).min(1.0);
        self.weights.load * load
            + self.weights.bandwidth * bandwidth
            + self.weights.performance * perf.score(&node.node_id)
            + self.weights.proximity * self.proximity
    }

    /// Chooses the online replica a requester should pull `file` from.
    /// Never returns an INACTIVE node.
    pub fn choose_source<'a>(
        &self,
        registry: &'a NodeRegistry,
        perf: &PerformanceTracker,
        file: &FileRecord,
        requester: &str,
    ) -> Result<&'a NodeInfo, ApiError> {
        let mut online: Vec<&NodeInfo> = file
            .online_replicas(registry)
            .iter()
            .filter_map(|id| registry.get(id))
            .collect();

        if online.is_empty() {
            return Err(ApiError::Availability(format!(
                "no online replicas for file {}",
                file.file_id
            )));
        }
        if online.len() > 1 {
            online.retain(|n| n.node_id != requester);
        }

        let candidates: Vec<&NodeInfo> = online
            .iter()
            .copied()
            .filter(|n| n.active_transfers < self.max_concurrent_transfers)
            .collect();

        if candidates.is_empty() {
            // Every replica is saturated; queue on the least loaded one.
            return online
                .into_iter()
                .min_by(|a, b| {
                    a.active_transfers
                        .cmp(&b.active_transfers)
                        .then_with(|| a.node_id.cmp(&b.node_id))
                })
                .ok_or_else(|| ApiError::Availability("no online replicas".into()));
        }

        let mut best: Option<(f64, &NodeInfo)> = None;
        for node in candidates {
            let score = self.source_score(node, perf);
            debug!(node_id = %node.node_id, score, "source candidate");
            // candidates are in id order, so strict > keeps the lowest id on ties
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, node));
            }
        }

        best.map(|(_, n)| n)
            .ok_or_else(|| ApiError::Availability("no online replicas".into()))
    }

    /// Plans a download and charges a transfer slot on both ends.
    pub fn plan_download(
        &mut self,
        registry: &mut NodeRegistry,
        perf: &PerformanceTracker,
        file: &FileRecord,
        requester: &str,
        now: Instant,
    ) -> Result<TransferPlan, ApiError> {
        let key = (requester.to_string(), file.file_id.clone());
        if let Some(previous) = self.in_flight.remove(&key) {
            // a re-request supersedes the earlier plan
            registry.end_transfer(&previous.source);
            if previous.source != previous.requester {
                registry.end_transfer(&previous.requester);
            }
        }

        let source = self.choose_source(registry, perf, file, requester)?;

        let requester_bw = registry
            .get(requester)
            .map(|n| n.resources.bandwidth_mbps)
            .unwrap_or(DEFAULT_REQUESTER_BANDWIDTH_MBPS);
        let bandwidth_mbps = source.resources.bandwidth_mbps.min(requester_bw);
        let estimated_seconds = if bandwidth_mbps == 0 {
            0.0
        } else {
            file.file_size as f64 / (bandwidth_mbps as f64 * BYTES_PER_MBIT)
        };

        let plan = TransferPlan {
            requesting_node: requester.to_string(),
            source_node: source.node_id.clone(),
            source_host: source.host.clone(),
            file_id: file.file_id.clone(),
            bandwidth_mbps,
            estimated_seconds,
        };

        registry.begin_transfer(&plan.source_node);
        if plan.source_node != requester {
            registry.begin_transfer(requester);
        }

        self.in_flight.insert(
            key,
            InFlightTransfer {
                requester: requester.to_string(),
                source: plan.source_node.clone(),
                file_id: file.file_id.clone(),
                file_size: file.file_size,
                started: now,
            },
        );

        info!(
            file_id = %plan.file_id,
            requester,
            source = %plan.source_node,
            bandwidth_mbps,
            estimated_seconds,
            "download planned"
        );

        Ok(plan)
    }

    pub fn complete_transfer(
        &mut self,
        registry: &mut NodeRegistry,
        catalog: &mut FileCatalog,
        perf: &mut PerformanceTracker,
        req: &TransferCompleteRequest,
        now: Instant,
    ) -> Result<Completion, ApiError> {
        let file_size = match req.file_id.as_deref().map(|id| catalog.get(id)) {
            Some(Some(file)) => Some(file.file_size),
            Some(None) if req.transfer_type == TransferType::Download => {
                return Err(ApiError::NotFound("File not found".into()));
            }
            _ => None,
        };

        let mut completion = Completion::default();

        let in_flight = req
            .file_id
            .as_ref()
            .and_then(|fid| self.in_flight.remove(&(req.node_id.clone(), fid.clone())));

        match in_flight {
            Some(t) => {
                registry.end_transfer(&t.source);
                if t.source != t.requester {
                    registry.end_transfer(&t.requester);
                }
                let duration = req
                    .duration_secs
                    .unwrap_or_else(|| now.saturating_duration_since(t.started).as_secs_f64());
                perf.record(&t.source, t.file_size, duration, req.success);
                completion.released = true;
            }
            None => registry.end_transfer(&req.node_id),
        }

        // only registered nodes can hold replicas
        if req.success
            && req.transfer_type == TransferType::Download
            && registry.get(&req.node_id).is_some()
            && let (Some(file_id), Some(size)) = (req.file_id.as_deref(), file_size)
        {
            let added = catalog.add_replicas(file_id, [req.node_id.as_str()])?;
            if !added.is_empty() {
                registry.add_used_storage(&req.node_id, size);
                completion.new_replica = true;
                info!(file_id, node_id = %req.node_id, "download added a replica");
            }
        }

        Ok(completion)
    }

    /// Drops planned transfers whose requester or source is no longer ACTIVE
    /// (unregistered requesters included) and gives back their slots.
    pub fn release_stale(&mut self, registry: &mut NodeRegistry) -> Vec<InFlightTransfer> {
        let stale: Vec<(String, String)> = self
            .in_flight
            .iter()
            .filter(|(_, t)| !registry.is_active(&t.requester) || !registry.is_active(&t.source))
            .map(|(key, _)| key.clone())
            .collect();

        let mut released = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(t) = self.in_flight.remove(&key) {
                registry.end_transfer(&t.source);
                if t.source != t.requester {
                    registry.end_transfer(&t.requester);
                }
                debug!(file_id = %t.file_id, requester = %t.requester, source = %t.source, "released stale transfer");
                released.push(t);
            }
        }
        released
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
