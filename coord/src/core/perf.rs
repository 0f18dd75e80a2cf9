use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use common::constants::BYTES_PER_MB;
use common::time_utils::utc_now_secs_f64;

use crate::core::config::{PerformanceWeights, ScoringConfig};

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct PerformanceRecord {
    pub total_transfers: u64,
    pub successful_transfers: u64,
    /// Sum of the speeds (MB/s) of every successful transfer.
    pub total_speed_accum: f64,
}

impl PerformanceRecord {
    pub fn success_rate(&self) -> f64 {
        if self.total_transfers == 0 {
            return 0.0;
        }
        self.successful_transfers as f64 / self.total_transfers as f64
    }

    pub fn avg_speed_mbps(&self) -> f64 {
        if self.successful_transfers == 0 {
            return 0.0;
        }
        self.total_speed_accum / self.successful_transfers as f64
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TransferSample {
    pub timestamp: f64,
    pub node_id: String,
    pub file_size: u64,
    pub duration_secs: f64,
    pub speed_mbps: f64,
    pub success: bool,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct PerformanceSummary {
    pub nodes_tracked: usize,
    pub total_transfers: u64,
    pub successful_transfers: u64,
    pub success_rate: f64,
}

#[derive(Debug)]
pub struct PerformanceTracker {
    records: BTreeMap<String, PerformanceRecord>,
    history: VecDeque<TransferSample>,
    capacity: usize,
    weights: PerformanceWeights,
    reference_bandwidth_mbps: f64,
}

impl PerformanceTracker {
    pub fn new(capacity: usize, scoring: &ScoringConfig) -> Self {
        Self {
            records: BTreeMap::new(),
            history: VecDeque::with_capacity(capacity),
            capacity,
            weights: scoring.performance,
            reference_bandwidth_mbps: scoring.reference_bandwidth_mbps,
        }
    }

    pub fn record(&mut self, node_id: &str, file_size: u64, duration_secs: f64, success: bool) {
        let speed_mbps = if success && duration_secs > 0.0 {
            (file_size as f64 / BYTES_PER_MB as f64) / duration_secs
        } else {
            0.0
        };

        let record = self.records.entry(node_id.to_string()).or_default();
        record.total_transfers += 1;
        if success {
            record.successful_transfers += 1;
            record.total_speed_accum += speed_mbps;
        }

        if self.capacity > 0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(TransferSample {
                timestamp: utc_now_secs_f64(),
                node_id: node_id.to_string(),
                file_size,
                duration_secs,
                speed_mbps,
                success,
            });
        }
    }

    /// Score in [0, 1]; nodes without history get the neutral score.
    pub fn score(&self, node_id: &str) -> f64 {
        let Some(record) = self.records.get(node_id) else {
            return self.weights.neutral;
        };
        if record.total_transfers == 0 {
            return self.weights.neutral;
        }
        let speed = (record.avg_speed_mbps() / self.reference_bandwidth_mbps).min(1.0);
        self.weights.success_rate * record.success_rate() + self.weights.speed * speed
    }

    pub fn record_for(&self, node_id: &str) -> Option<&PerformanceRecord> {
        self.records.get(node_id)
    }

    pub fn records(&self) -> &BTreeMap<String, PerformanceRecord> {
        &self.records
    }

    /// Newest-last slice of at most `n` samples.
    pub fn recent(&self, n: usize) -> Vec<TransferSample> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn summary(&self) -> PerformanceSummary {
        let total: u64 = self.records.values().map(|r| r.total_transfers).sum();
        let ok: u64 = self.records.values().map(|r| r.successful_transfers).sum();
        PerformanceSummary {
            nodes_tracked: self.records.len(),
            total_transfers: total,
            successful_transfers: ok,
            success_rate: if total == 0 { 0.0 } else { ok as f64 / total as f64 },
        }
    }
}
