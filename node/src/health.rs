use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use common::error::ErrorKind;

use crate::agent::NodeAgent;
use crate::client::ClientError;

/// Heartbeat spacing: `base` while healthy, one `step` longer per consecutive
/// failure, never more than `max`.
#[derive(Debug, Clone)]
pub struct HeartbeatBackoff {
    base: Duration,
    step: Duration,
    max: Duration,
    failures: u32,
}

impl Default for HeartbeatBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
    }
}

impl HeartbeatBackoff {
    pub fn new(base: Duration, step: Duration, max: Duration) -> Self {
        Self {
            base,
            step,
            max: max.max(base),
            failures: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        (self.base + self.step.saturating_mul(self.failures)).min(self.max)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }
}

pub async fn heartbeat_loop(
    agent: Arc<NodeAgent>,
    mut backoff: HeartbeatBackoff,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(backoff.delay()) => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        match agent.heartbeat().await {
            Ok(()) => {
                if backoff.failures() > 0 {
                    info!(node_id = %agent.node_id(), "heartbeat restored");
                }
                backoff.record_success();
            }
            Err(ClientError::Rejected {
                kind: Some(ErrorKind::NotFound),
                ..
            }) => {
                // coordinator lost our registration, most likely a restart
                warn!(node_id = %agent.node_id(), "coordinator forgot this node, re-registering");
                match agent.register().await {
                    Ok(()) => backoff.record_success(),
                    Err(e) => {
                        warn!("re-registration failed: {e}");
                        backoff.record_failure();
                    }
                }
            }
            Err(e) => {
                backoff.record_failure();
                warn!(
                    failures = backoff.failures(),
                    next = ?backoff.delay(),
                    "heartbeat failed: {e}"
                );
            }
        }
    }

    info!("heartbeat loop stopped");

    Ok(())
}
