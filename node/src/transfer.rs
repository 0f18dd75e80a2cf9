//! Simulated chunked transfers. No bytes move; each chunk costs the time it
//! would take at the planned bandwidth.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::debug;

use common::constants::{BYTES_PER_MB, BYTES_PER_MBIT, MIN_CHUNK_SIZE};

const SMALL_FILE: u64 = 10 * BYTES_PER_MB;
const MEDIUM_FILE: u64 = 100 * BYTES_PER_MB;
const MAX_CHUNK: u64 = 5 * BYTES_PER_MB;
const MAX_WORKERS: u32 = 4;

/// Chunk size a node announces for a file it created.
pub fn adaptive_chunk_size(file_size: u64, cpu_cores: u32) -> u64 {
    if file_size < SMALL_FILE {
        512 * 1024
    } else if file_size < MEDIUM_FILE {
        BYTES_PER_MB
    } else {
        let per_core = file_size / (u64::from(cpu_cores.max(1)) * 2);
        per_core.clamp(MIN_CHUNK_SIZE, MAX_CHUNK)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSchedule {
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    /// Time for one full chunk, already scaled.
    pub per_chunk: Duration,
    pub workers: usize,
}

impl ChunkSchedule {
    /// `time_scale` shrinks (or stretches) every simulated delay; 1.0 is real time.
    pub fn new(
        file_size: u64,
        chunk_size: u64,
        bandwidth_mbps: u32,
        cpu_cores: u32,
        time_scale: f64,
    ) -> Self {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        let total_chunks = file_size.div_ceil(chunk_size);
        let bytes_per_sec = f64::from(bandwidth_mbps.max(1)) * BYTES_PER_MBIT;
        let secs = chunk_size as f64 / bytes_per_sec * time_scale.max(0.0);
        let workers = if total_chunks > 4 && cpu_cores > 2 {
            cpu_cores.min(MAX_WORKERS) as usize
        } else {
            1
        };

        Self {
            file_size,
            chunk_size,
            total_chunks,
            per_chunk: Duration::from_secs_f64(secs),
            workers,
        }
    }

    fn chunk_delay(&self, index: u64) -> Duration {
        let start = index * self.chunk_size;
        let len = self.chunk_size.min(self.file_size.saturating_sub(start));
        self.per_chunk.mul_f64(len as f64 / self.chunk_size as f64)
    }

    /// Wall time the simulation should take with all workers busy.
    pub fn expected(&self) -> Duration {
        let rounds = self.total_chunks.div_ceil(self.workers.max(1) as u64);
        self.per_chunk.saturating_mul(rounds as u32)
    }
}

/// Converts a size given in MiB to bytes, or `None` on overflow.
pub fn mib_to_bytes(size_mb: u64) -> Option<u64> {
    size_mb.checked_mul(BYTES_PER_MB)
}

/// Runs the schedule and returns the elapsed time. A fixed pool of workers
/// pulls chunk indices from a shared cursor.
pub async fn simulate(schedule: &ChunkSchedule) -> anyhow::Result<Duration> {
    let started = Instant::now();
    let schedule = Arc::new(schedule.clone());
    let cursor = Arc::new(AtomicU64::new(0));
    let mut workers = JoinSet::new();

    for worker in 0..schedule.workers.max(1) {
        let schedule = schedule.clone();
        let cursor = cursor.clone();
        workers.spawn(async move {
            let mut done = 0u64;
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                if index >= schedule.total_chunks {
                    break;
                }
                let delay = schedule.chunk_delay(index);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                done += 1;
                debug!(worker, chunk = index, total = schedule.total_chunks, "chunk received");
            }
            done
        });
    }

    let mut received = 0u64;
    while let Some(res) = workers.join_next().await {
        received += res?;
    }
    anyhow::ensure!(
        received == schedule.total_chunks,
        "received {received} of {} chunks",
        schedule.total_chunks
    );

    Ok(started.elapsed())
}
