use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Parser, Debug, Clone)]
pub struct RepairArgs {
    /// Base URL of the coordinator admin surface
    #[arg(long, default_value = "http://127.0.0.1:5080")]
    pub admin_url: String,

    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RepairEntry {
    file_id: String,
    outcome: String,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    missing: usize,
}

#[derive(Debug, Deserialize)]
struct RepairBody {
    files: Vec<RepairEntry>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub checked: usize,
    pub healthy: usize,
    pub replicated: usize,
    pub degraded: usize,
    pub unavailable: usize,
    pub replicas_added: usize,
}

impl std::fmt::Display for RepairReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Repair report:")?;
        writeln!(f, "  Checked        = {}", self.checked)?;
        writeln!(f, "  Healthy        = {}", self.healthy)?;
        writeln!(f, "  Replicated     = {}", self.replicated)?;
        writeln!(f, "  Degraded       = {}", self.degraded)?;
        writeln!(f, "  Unavailable    = {}", self.unavailable)?;
        writeln!(f, "  Replicas added = {}", self.replicas_added)?;
        Ok(())
    }
}

fn summarize(entries: &[RepairEntry]) -> RepairReport {
    let mut report = RepairReport {
        checked: entries.len(),
        ..Default::default()
    };
    for e in entries {
        report.replicas_added += e.added.len();
        match e.outcome.as_str() {
            "HEALTHY" => report.healthy += 1,
            "REPLICATED" => report.replicated += 1,
            "DEGRADED" => {
                report.degraded += 1;
                warn!(file_id = %e.file_id, missing = e.missing, "file still under-replicated");
            }
            "UNAVAILABLE" => {
                report.unavailable += 1;
                warn!(file_id = %e.file_id, "file unavailable");
            }
            other => warn!(file_id = %e.file_id, "unexpected outcome {other}"),
        }
    }
    report
}

/// Asks a running coordinator to top every file up to its replication factor.
pub async fn repair(args: RepairArgs) -> Result<RepairReport> {
    let http = Client::builder().timeout(args.timeout).build()?;
    let url = format!("{}/admin/repair", args.admin_url.trim_end_matches('/'));

    let body: RepairBody = http
        .post(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let report = summarize(&body.files);
    println!("{report}");
    Ok(report)
}
