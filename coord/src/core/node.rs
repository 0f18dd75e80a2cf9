use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use common::constants::BYTES_PER_GB;
use common::error::ApiError;
use common::schemas::{NodeResources, ResourceSpec};
use common::time_utils::utc_now_ms;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Liveness {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub resources: NodeResources,
    pub used_storage_bytes: u64,
    pub active_transfers: u32,
    pub last_heartbeat_ms: i128, // wall-clock, for display only
    pub status: Liveness,
}

impl NodeInfo {
    pub fn total_storage_bytes(&self) -> u64 {
        self.resources.storage_gb.saturating_mul(BYTES_PER_GB)
    }

    pub fn free_storage_bytes(&self) -> u64 {
        self.total_storage_bytes()
            .saturating_sub(self.used_storage_bytes)
    }

    pub fn storage_usage_percent(&self) -> f64 {
        let total = self.total_storage_bytes();
        if total == 0 {
            return 0.0;
        }
        self.used_storage_bytes as f64 / total as f64 * 100.0
    }

    pub fn is_active(&self) -> bool {
        self.status == Liveness::Active
    }
}

#[derive(Clone, Debug)]
pub struct NodeRuntime {
    pub info: NodeInfo,
    pub last_seen: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    New,
    Refreshed,
    /// The node was INACTIVE before this registration.
    Reactivated,
}

/// Every node the coordinator has ever heard from, keyed and iterated by id.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeRuntime>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or refreshes a node.
    ///
    /// Re-registration replaces host, port and declared resources but keeps
    /// the usage counters, which other records (replica sets, in-flight
    /// transfers) still account for.
    pub fn register(
        &mut self,
        node_id: &str,
        host: &str,
        port: u16,
        spec: &ResourceSpec,
        now: Instant,
    ) -> Result<Registration, ApiError> {
        if node_id.trim().is_empty() {
            return Err(ApiError::Validation("node_id cannot be empty".into()));
        }
        let resources = spec.validate()?;

        let registration = match self.nodes.get_mut(node_id) {
            Some(existing) => {
                let was_inactive = !existing.info.is_active();
                existing.info.host = host.to_string();
                existing.info.port = port;
                existing.info.resources = resources;
                existing.info.status = Liveness::Active;
                existing.info.last_heartbeat_ms = utc_now_ms();
                existing.last_seen = now;
                if was_inactive {
                    Registration::Reactivated
                } else {
                    Registration::Refreshed
                }
            }
            None => {
                let info = NodeInfo {
                    node_id: node_id.to_string(),
                    host: host.to_string(),
                    port,
                    resources,
                    used_storage_bytes: 0,
                    active_transfers: 0,
                    last_heartbeat_ms: utc_now_ms(),
                    status: Liveness::Active,
                };
                self.nodes.insert(
                    node_id.to_string(),
                    NodeRuntime {
                        info,
                        last_seen: now,
                    },
                );
                Registration::New
            }
        };

        info!(
            node_id,
            cpu_cores = resources.cpu_cores,
            memory_gb = resources.memory_gb,
            storage_gb = resources.storage_gb,
            bandwidth_mbps = resources.bandwidth_mbps,
            ?registration,
            "node online"
        );

        Ok(registration)
    }

    /// Refreshes a known node. Returns `true` when the node was INACTIVE.
    pub fn heartbeat(&mut self, node_id: &str, now: Instant) -> Result<bool, ApiError> {
        let entry = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ApiError::NotFound("Node not registered".into()))?;

        let was_inactive = !entry.info.is_active();
        entry.info.status = Liveness::Active;
        entry.info.last_heartbeat_ms = utc_now_ms();
        entry.last_seen = now;

        if was_inactive {
            info!(node_id, "node back online");
        }

        Ok(was_inactive)
    }

    /// Demotes ACTIVE nodes silent for longer than `timeout` and returns
    /// their ids. Nodes that are already INACTIVE are not reported again.
    pub fn sweep_stale(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut offline = Vec::new();

        for (node_id, node) in self.nodes.iter_mut() {
            if !node.info.is_active() {
                continue;
            }
            let elapsed = now.saturating_duration_since(node.last_seen);
            if elapsed > timeout {
                node.info.status = Liveness::Inactive;
                warn!(node_id = %node_id, ?elapsed, "node went offline");
                offline.push(node_id.clone());
            }
        }

        offline
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeInfo> {
        self.nodes.get(node_id).map(|n| &n.info)
    }

    pub fn is_active(&self, node_id: &str) -> bool {
        self.get(node_id).is_some_and(NodeInfo::is_active)
    }

    /// Active nodes in id order.
    pub fn list_active(&self) -> Vec<&NodeInfo> {
        self.nodes
            .values()
            .map(|n| &n.info)
            .filter(|n| n.is_active())
            .collect()
    }

    pub fn list(&self) -> Vec<&NodeInfo> {
        self.nodes.values().map(|n| &n.info).collect()
    }

    pub fn storage_usage_percent(&self, node_id: &str) -> Option<f64> {
        self.get(node_id).map(NodeInfo::storage_usage_percent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn begin_transfer(&mut self, node_id: &str) {
        if let Some(n) = self.nodes.get_mut(node_id) {
            n.info.active_transfers = n.info.active_transfers.saturating_add(1);
        }
    }

    pub fn end_transfer(&mut self, node_id: &str) {
        if let Some(n) = self.nodes.get_mut(node_id) {
            n.info.active_transfers = n.info.active_transfers.saturating_sub(1);
        }
    }

    pub fn add_used_storage(&mut self, node_id: &str, bytes: u64) {
        if let Some(n) = self.nodes.get_mut(node_id) {
            n.info.used_storage_bytes = n.info.used_storage_bytes.saturating_add(bytes);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn resources(storage_gb: u64, bandwidth_mbps: u32) -> ResourceSpec {
        NodeResources {
            cpu_cores: 4,
            memory_gb: 16,
            storage_gb,
            bandwidth_mbps,
        }
        .into()
    }

    #[test]
    fn register_requires_every_resource() {
        let mut reg = NodeRegistry::new();
        let spec = ResourceSpec {
            cpu_cores: Some(4),
            memory_gb: Some(16),
            storage_gb: None,
            bandwidth_mbps: Some(100),
        };
        let err = reg
            .register("node1", "localhost", 0, &spec, Instant::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(reg.is_empty());

        assert!(matches!(
            reg.register("", "localhost", 0, &resources(10, 100), Instant::now()),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn heartbeat_unknown_node_is_not_found() {
        let mut reg = NodeRegistry::new();
        assert!(matches!(
            reg.heartbeat("ghost", Instant::now()),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn reregistration_keeps_usage_and_updates_resources() {
        let mut reg = NodeRegistry::new();
        let t0 = Instant::now();
        assert_eq!(
            reg.register("node1", "localhost", 0, &resources(100, 100), t0)
                .unwrap(),
            Registration::New
        );
        reg.add_used_storage("node1", 5 * BYTES_PER_GB);
        reg.begin_transfer("node1");

        let outcome = reg
            .register("node1", "10.0.0.7", 7000, &resources(500, 1000), t0)
            .unwrap();
        assert_eq!(outcome, Registration::Refreshed);

        let node = reg.get("node1").unwrap();
        assert_eq!(node.host, "10.0.0.7");
        assert_eq!(node.port, 7000);
        assert_eq!(node.resources.storage_gb, 500);
        assert_eq!(node.resources.bandwidth_mbps, 1000);
        assert_eq!(node.used_storage_bytes, 5 * BYTES_PER_GB);
        assert_eq!(node.active_transfers, 1);
        assert_eq!(reg.storage_usage_percent("node1"), Some(1.0));
    }

    #[test]
    fn stale_node_goes_inactive_exactly_once() {
        let mut reg = NodeRegistry::new();
        let t0 = Instant::now();
        let timeout = Duration::from_secs(30);
        reg.register("node1", "localhost", 0, &resources(10, 100), t0)
            .unwrap();
        reg.register("node2", "localhost", 0, &resources(10, 100), t0)
            .unwrap();

        assert!(reg.sweep_stale(t0 + Duration::from_secs(30), timeout).is_empty());

        reg.heartbeat("node2", t0 + Duration::from_secs(20)).unwrap();
        let offline = reg.sweep_stale(t0 + Duration::from_secs(31), timeout);
        assert_eq!(offline, vec!["node1".to_string()]);
        assert!(!reg.is_active("node1"));
        assert!(reg.is_active("node2"));

        assert!(reg.sweep_stale(t0 + Duration::from_secs(45), timeout).is_empty());

        let reactivated = reg.heartbeat("node1", t0 + Duration::from_secs(46)).unwrap();
        assert!(reactivated);
        assert!(reg.is_active("node1"));

        let offline = reg.sweep_stale(t0 + Duration::from_secs(100), timeout);
        assert_eq!(offline, vec!["node1".to_string(), "node2".to_string()]);
    }

    #[test]
    fn reregistration_reactivates() {
        let mut reg = NodeRegistry::new();
        let t0 = Instant::now();
        reg.register("node1", "localhost", 0, &resources(10, 100), t0)
            .unwrap();
        reg.sweep_stale(t0 + Duration::from_secs(60), Duration::from_secs(30));
        assert!(reg.list_active().is_empty());

        let outcome = reg
            .register("node1", "localhost", 0, &resources(10, 100), t0 + Duration::from_secs(61))
            .unwrap();
        assert_eq!(outcome, Registration::Reactivated);
        assert_eq!(reg.list_active().len(), 1);
    }

    #[test]
    fn transfer_counter_floors_at_zero() {
        let mut reg = NodeRegistry::new();
        reg.register("node1", "localhost", 0, &resources(10, 100), Instant::now())
            .unwrap();
        reg.end_transfer("node1");
        reg.end_transfer("node1");
        assert_eq!(reg.get("node1").unwrap().active_transfers, 0);
        reg.begin_transfer("node1");
        assert_eq!(reg.get("node1").unwrap().active_transfers, 1);
    }
}
