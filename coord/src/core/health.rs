use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::core::recovery::RecoveryOutcome;
use crate::core::state::CoordinatorState;

/// Periodically demotes nodes that stopped heartbeating and hands them to
/// recovery.
pub async fn liveness_monitor(
    state: CoordinatorState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let failures = match state.with(|c| c.sweep(Instant::now())) {
            Ok(failures) => failures,
            Err(e) => {
                error!("liveness sweep failed: {}", e);
                continue;
            }
        };

        for failure in failures {
            let unavailable = failure
                .files
                .iter()
                .filter(|f| f.outcome == RecoveryOutcome::Unavailable)
                .count();
            if unavailable > 0 {
                warn!(
                    node_id = %failure.node_id,
                    affected = failure.files.len(),
                    unavailable,
                    "node failure left files unavailable"
                );
            } else {
                info!(
                    node_id = %failure.node_id,
                    affected = failure.files.len(),
                    "node failure handled"
                );
            }
        }
    }

    info!("liveness monitor stopped");

    Ok(())
}
