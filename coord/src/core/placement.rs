use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::core::config::{PlacementWeights, ScoringConfig};
use crate::core::node::{NodeInfo, NodeRegistry};
use crate::core::perf::PerformanceTracker;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ScoredNode {
    pub node_id: String,
    pub score: f64,
    pub free_storage_bytes: u64,
    pub active_transfers: u32,
}

/// Ranks ACTIVE nodes as homes for a new replica.
#[derive(Clone, Debug)]
pub struct ReplicaPlacer {
    weights: PlacementWeights,
    max_concurrent_transfers: u32,
    reference_bandwidth_mbps: f64,
}

impl ReplicaPlacer {
    pub fn new(scoring: &ScoringConfig, max_concurrent_transfers: u32) -> Self {
        Self {
            weights: scoring.placement,
            max_concurrent_transfers,
            reference_bandwidth_mbps: scoring.reference_bandwidth_mbps,
        }
    }

    fn eligible(&self, node: &NodeInfo, file_size: u64, excluded: &BTreeSet<String>) -> bool {
        let free = node.free_storage_bytes();
        node.is_active()
            && !excluded.contains(&node.node_id)
            && free > 0
            && free >= file_size
            && node.active_transfers < self.max_concurrent_transfers
    }

    /// Every eligible candidate, best first. Ties break on ascending node id.
    pub fn rank(
        &self,
        registry: &NodeRegistry,
        perf: &PerformanceTracker,
        file_size: u64,
        excluded: &BTreeSet<String>,
    ) -> Vec<ScoredNode> {
        let candidates: Vec<&NodeInfo> = registry
            .list_active()
            .into_iter()
            .filter(|n| self.eligible(n, file_size, excluded))
            .collect();

        let max_free = candidates
            .iter()
            .map(|n| n.free_storage_bytes())
            .max()
            .unwrap_or(0);
        if max_free == 0 {
            return Vec::new();
        }

        let max_slots = self.max_concurrent_transfers as f64;
        let mut scored: Vec<ScoredNode> = candidates
            .into_iter()
            .map(|n| {
                let free = n.free_storage_bytes();
                let storage = free as f64 / max_free as f64;
                let slots = (max_slots - n.active_transfers as f64) / max_slots;
                let bandwidth =
                    (n.resources.bandwidth_mbps as f64 / self.reference_bandwidth_mbps).min(1.0);
                let score = self.weights.free_storage * storage
                    + self.weights.spare_slots * slots
                    + self.weights.performance * perf.score(&n.node_id)
                    + self.weights.bandwidth * bandwidth;

                ScoredNode {
                    node_id: n.node_id.clone(),
                    score,
                    free_storage_bytes: free,
                    active_transfers: n.active_transfers,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        debug!(file_size, candidates = scored.len(), "ranked placement candidates");

        scored
    }

    /// Top `desired` node ids. Returns fewer when there are not enough candidates.
    pub fn select_replicas(
        &self,
        registry: &NodeRegistry,
        perf: &PerformanceTracker,
        file_size: u64,
        desired: usize,
        excluded: &BTreeSet<String>,
    ) -> Vec<String> {
        if desired == 0 {
            return Vec::new();
        }
        self.rank(registry, perf, file_size, excluded)
            .into_iter()
            .take(desired)
            .map(|n| n.node_id)
            .collect()
    }
}
