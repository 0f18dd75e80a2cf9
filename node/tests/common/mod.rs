#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::schemas::{NodeResources, Reply, Request};
use common::wire::{read_message, write_message};
use node::agent::NodeConfig;

type Responder = dyn Fn(&Request, &[Request]) -> Reply + Send + Sync;

/// Scripted stand-in for the coordinator. Every request is recorded; the
/// responder sees the request plus everything received before it.
pub struct FakeCoordinator {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Request>>>,
    handle: JoinHandle<()>,
}

impl FakeCoordinator {
    pub async fn start<F>(responder: F) -> Result<Self>
    where
        F: Fn(&Request, &[Request]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let log = received.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let Ok(req) = read_message::<Request, _>(&mut stream).await else {
                    continue;
                };
                let reply = {
                    let mut log = log.lock().unwrap();
                    let reply = responder(&req, &log);
                    log.push(req);
                    reply
                };
                let _ = write_message(&mut stream, &reply).await;
            }
        });

        Ok(Self {
            addr,
            received,
            handle,
        })
    }

    pub fn received(&self) -> Vec<Request> {
        self.received.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.received().iter().map(Request::action).collect()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

pub fn node_config(node_id: &str, coordinator: SocketAddr) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        host: "localhost".to_string(),
        port: 6000,
        resources: NodeResources {
            cpu_cores: 4,
            memory_gb: 8,
            storage_gb: 1,
            bandwidth_mbps: 100,
        },
        coordinator,
        request_timeout: Duration::from_secs(2),
        time_scale: 0.001,
    }
}

pub async fn wait_until<F>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn() {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
