use clap::{Parser, Subcommand};

use common::telemetry::init_telemetry;

use coord::command::repair::{RepairArgs, repair};
use coord::command::serve::{ServeArgs, serve};
use coord::command::status::{StatusArgs, status};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Run the coordinator (node protocol + admin HTTP)
    Serve(ServeArgs),
    /// Print nodes and files known to a running coordinator
    Status(StatusArgs),
    /// Bring every file back up to the replication factor
    Repair(RepairArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("coord");

    let args = Args::parse();

    match args.cmd {
        Cmd::Serve(serve_args) => serve(serve_args).await?,
        Cmd::Status(status_args) => status(status_args).await?,
        Cmd::Repair(repair_args) => {
            repair(repair_args).await?;
        }
    }

    Ok(())
}
