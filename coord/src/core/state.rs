use anyhow::anyhow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use common::error::ApiError;
use common::schemas::{Reply, Request};

use crate::core::config::CoordConfig;
use crate::core::coordinator::Coordinator;

pub const DEFAULT_MAX_CONNECTIONS: usize = 15;
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct CoordinatorState {
    pub coordinator: Arc<Mutex<Coordinator>>,
    /// Caps concurrently served protocol connections.
    pub connections: Arc<Semaphore>,
    pub io_timeout: Duration,
    pub scan_interval: Duration,
}

impl CoordinatorState {
    pub fn new(config: CoordConfig, max_connections: usize, io_timeout: Duration) -> Self {
        Self {
            scan_interval: config.scan_interval,
            coordinator: Arc::new(Mutex::new(Coordinator::new(config))),
            connections: Arc::new(Semaphore::new(max_connections)),
            io_timeout,
        }
    }

    /// Runs `f` with exclusive access to the coordinator.
    pub fn with<R>(&self, f: impl FnOnce(&mut Coordinator) -> R) -> Result<R, ApiError> {
        let mut guard = self
            .coordinator
            .lock()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire coordinator lock: {}", e)))?;
        Ok(f(&mut guard))
    }

    pub fn handle(&self, req: Request) -> Reply {
        match self.with(|c| c.handle(req)) {
            Ok(reply) => reply,
            Err(e) => Reply::from_error(&e),
        }
    }
}
