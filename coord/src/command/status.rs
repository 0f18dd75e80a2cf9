use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use common::schemas::NodeResources;

use crate::core::node::Liveness;

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    /// Base URL of the coordinator admin surface
    #[arg(long, default_value = "http://127.0.0.1:5080")]
    pub admin_url: String,

    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    node_id: String,
    status: Liveness,
    resources: NodeResources,
    active_transfers: u32,
    storage_usage_percent: f64,
}

#[derive(Debug, Deserialize)]
struct FileRow {
    file_id: String,
    file_name: String,
    file_size: u64,
    replica_nodes: Vec<String>,
    online_replicas: Vec<String>,
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let http = Client::builder().timeout(args.timeout).build()?;
    let base = args.admin_url.trim_end_matches('/');

    let nodes: Vec<NodeRow> = http
        .get(format!("{base}/admin/nodes"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let files: Vec<FileRow> = http
        .get(format!("{base}/admin/files"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let active = nodes.iter().filter(|n| n.status == Liveness::Active).count();
    println!("Nodes: {} ({} active)", nodes.len(), active);
    for n in &nodes {
        println!(
            "  {:<16} {:<8} cpu={:<3} ram={}GB storage={}GB ({:.1}% used) bw={}Mbps transfers={}",
            n.node_id,
            format!("{:?}", n.status).to_uppercase(),
            n.resources.cpu_cores,
            n.resources.memory_gb,
            n.resources.storage_gb,
            n.storage_usage_percent,
            n.resources.bandwidth_mbps,
            n.active_transfers,
        );
    }

    println!("Files: {}", files.len());
    for f in &files {
        println!(
            "  {:<36} {:<24} {:>12}B replicas={}/{} [{}]",
            f.file_id,
            f.file_name,
            f.file_size,
            f.online_replicas.len(),
            f.replica_nodes.len(),
            f.replica_nodes.join(","),
        );
    }

    Ok(())
}
