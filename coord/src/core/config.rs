use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weights for ranking replica placement candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlacementWeights {
    pub free_storage: f64,
    pub spare_slots: f64,
    pub performance: f64,
    pub bandwidth: f64,
}

impl Default for PlacementWeights {
    fn default() -> Self {
        Self {
            free_storage: 0.3,
            spare_slots: 0.3,
            performance: 0.2,
            bandwidth: 0.2,
        }
    }
}

/// Weights for picking the source of a download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SourceWeights {
    pub load: f64,
    pub bandwidth: f64,
    pub performance: f64,
    pub proximity: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            load: 0.4,
            bandwidth: 0.3,
            performance: 0.2,
            proximity: 0.1,
        }
    }
}

/// Weights for folding transfer history into a single performance score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PerformanceWeights {
    pub success_rate: f64,
    pub speed: f64,
    /// Score of a node without any recorded transfer.
    pub neutral: f64,
}

impl Default for PerformanceWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.7,
            speed: 0.3,
            neutral: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    pub placement: PlacementWeights,
    pub source: SourceWeights,
    pub performance: PerformanceWeights,
    /// Bandwidth and speed are normalized against this value (Mbps).
    pub reference_bandwidth_mbps: f64,
    /// Placeholder until the coordinator knows anything about topology.
    pub proximity: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            placement: PlacementWeights::default(),
            source: SourceWeights::default(),
            performance: PerformanceWeights::default(),
            reference_bandwidth_mbps: 1000.0,
            proximity: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordConfig {
    pub replication_factor: usize,
    /// Initial replication is skipped until this many nodes have registered.
    pub min_nodes_for_replication: usize,
    pub max_concurrent_transfers: u32,
    pub liveness_timeout: Duration,
    pub scan_interval: Duration,
    pub history_capacity: usize,
    pub scoring: ScoringConfig,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            replication_factor: 2,
            min_nodes_for_replication: 2,
            max_concurrent_transfers: 3,
            liveness_timeout: Duration::from_secs(30),
            scan_interval: Duration::from_secs(10),
            history_capacity: 100,
            scoring: ScoringConfig::default(),
        }
    }
}

impl CoordConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.replication_factor == 0 {
            anyhow::bail!("replication factor must be at least 1");
        }
        if self.max_concurrent_transfers == 0 {
            anyhow::bail!("max concurrent transfers must be at least 1");
        }
        if self.scan_interval.is_zero() {
            anyhow::bail!("scan interval must be positive");
        }
        if self.scoring.reference_bandwidth_mbps <= 0.0 {
            anyhow::bail!("reference bandwidth must be positive");
        }
        Ok(())
    }
}
