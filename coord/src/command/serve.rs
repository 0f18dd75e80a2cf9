use axum_server::Server;
use clap::Parser;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use common::constants::{DEFAULT_ADMIN_ADDR, DEFAULT_COORDINATOR_ADDR};
use common::url_utils::parse_socket_addr;

use crate::core::config::CoordConfig;
use crate::core::health::liveness_monitor;
use crate::core::routes::admin_router;
use crate::core::server::serve_protocol;
use crate::core::state::{CoordinatorState, DEFAULT_IO_TIMEOUT, DEFAULT_MAX_CONNECTIONS};

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address for the node protocol (one JSON message per TCP connection)
    #[arg(long, default_value = DEFAULT_COORDINATOR_ADDR)]
    listen: String,

    /// Address for the HTTP admin surface
    #[arg(long, default_value = DEFAULT_ADMIN_ADDR)]
    admin_listen: String,

    /// Target number of online replicas per file
    #[arg(long, default_value_t = 2)]
    replication_factor: usize,

    /// Registered nodes required before new files are replicated
    #[arg(long, default_value_t = 2)]
    min_nodes_for_replication: usize,

    /// Concurrent transfers a node may serve before it is deprioritized
    #[arg(long, default_value_t = 3)]
    max_concurrent_transfers: u32,

    /// Silence after which a node is considered offline
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    liveness_timeout: Duration,

    /// How often the liveness monitor runs
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    scan_interval: Duration,

    /// Transfer samples kept for the performance report
    #[arg(long, default_value_t = 100)]
    history_capacity: usize,

    /// Max concurrently served protocol connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Per-connection read/reply deadline
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    io_timeout: Duration,
}

impl ServeArgs {
    pub fn config(&self) -> CoordConfig {
        CoordConfig {
            replication_factor: self.replication_factor,
            min_nodes_for_replication: self.min_nodes_for_replication,
            max_concurrent_transfers: self.max_concurrent_transfers,
            liveness_timeout: self.liveness_timeout,
            scan_interval: self.scan_interval,
            history_capacity: self.history_capacity,
            ..CoordConfig::default()
        }
    }
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_args.config();
    config.validate()?;

    let io_timeout = if serve_args.io_timeout.is_zero() {
        DEFAULT_IO_TIMEOUT
    } else {
        serve_args.io_timeout
    };
    let state = CoordinatorState::new(config, serve_args.max_connections.max(1), io_timeout);

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);

    let monitor_handle = tokio::spawn(liveness_monitor(
        state.clone(),
        state.scan_interval,
        shutdown_rx.clone(),
    ));

    let listener = TcpListener::bind(parse_socket_addr(&serve_args.listen)?).await?;
    let protocol_handle = tokio::spawn(serve_protocol(listener, state.clone(), shutdown_rx));

    let app = admin_router(state.clone());
    let admin_addr = parse_socket_addr(&serve_args.admin_listen)?;
    let admin = Server::bind(admin_addr).serve(app.into_make_service());

    info!(
        protocol = %serve_args.listen,
        admin = %serve_args.admin_listen,
        replication_factor = serve_args.replication_factor,
        "coordinator started"
    );

    tokio::select! {
        res = admin => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    let _ = protocol_handle.await;

    info!("coordinator stopped");

    Ok(())
}
