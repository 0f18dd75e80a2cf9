use clap::{Args as ClapArgs, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::constants::DEFAULT_COORDINATOR_ADDR;
use common::schemas::NodeResources;
use common::telemetry::init_telemetry;
use common::url_utils::parse_socket_addr;

use node::agent::{NodeAgent, NodeConfig};
use node::health::{HeartbeatBackoff, heartbeat_loop};
use node::transfer::mib_to_bytes;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    node: NodeArgs,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(ClapArgs, Debug, Clone)]
struct NodeArgs {
    #[arg(long, default_value = "node1")]
    node_id: String,

    /// Host other nodes use to reach this one
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 6000)]
    port: u16,

    #[arg(long, default_value_t = 4)]
    cpu_cores: u32,

    #[arg(long, default_value_t = 8)]
    memory_gb: u32,

    #[arg(long, default_value_t = 100)]
    storage_gb: u64,

    #[arg(long, default_value_t = 1000)]
    bandwidth_mbps: u32,

    #[arg(long, default_value = DEFAULT_COORDINATOR_ADDR)]
    coordinator: String,

    /// Deadline for one request/reply exchange
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Multiplier on simulated transfer time (0.01 = 100x faster)
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Register and keep heartbeating until interrupted
    Run {
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        heartbeat_interval: Duration,
    },
    /// Announce a new file owned by this node
    Create {
        name: String,
        /// Size in MiB
        #[arg(long, default_value_t = 10)]
        size_mb: u64,
    },
    /// List every file the coordinator knows about
    List {
        #[arg(long)]
        json: bool,
    },
    /// Pull a file from the best available replica
    Download { file_id: String },
}

impl NodeArgs {
    fn config(&self) -> anyhow::Result<NodeConfig> {
        Ok(NodeConfig {
            node_id: self.node_id.clone(),
            host: self.host.clone(),
            port: self.port,
            resources: NodeResources {
                cpu_cores: self.cpu_cores,
                memory_gb: self.memory_gb,
                storage_gb: self.storage_gb,
                bandwidth_mbps: self.bandwidth_mbps,
            },
            coordinator: parse_socket_addr(&self.coordinator)?,
            request_timeout: self.timeout,
            time_scale: self.time_scale,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("node");

    let args = Args::parse();
    let agent = Arc::new(NodeAgent::new(args.node.config()?));

    match args.cmd {
        Cmd::Run { heartbeat_interval } => {
            agent.register().await?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let backoff = HeartbeatBackoff::new(
                heartbeat_interval,
                Duration::from_secs(1),
                heartbeat_interval.max(Duration::from_secs(10)),
            );
            let heartbeats = tokio::spawn(heartbeat_loop(agent.clone(), backoff, shutdown_rx));

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            let _ = shutdown_tx.send(true);
            heartbeats.await??;
        }
        Cmd::Create { name, size_mb } => {
            let file_size = mib_to_bytes(size_mb)
                .ok_or_else(|| anyhow::anyhow!("file size of {size_mb} MiB is too large"))?;
            agent.register().await?;
            let info = agent.create_file(&name, file_size).await?;
            println!("{}", info.file_id);
        }
        Cmd::List { json } => {
            let files = agent.list_files().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for f in &files {
                    println!(
                        "{}  {:<24} {:>12} B  owner={} replicas={}",
                        f.file_id, f.file_name, f.file_size, f.owner_node, f.replica_count
                    );
                }
                println!("{} file(s)", files.len());
            }
        }
        Cmd::Download { file_id } => {
            agent.register().await?;
            let report = agent.download(&file_id).await?;
            println!(
                "downloaded {} ({} bytes, {} chunks) from {} in {:?}",
                report.file_name, report.bytes, report.chunks, report.source_node, report.elapsed
            );
        }
    }

    Ok(())
}
