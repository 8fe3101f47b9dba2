// This module contains the k-way merge used to combine worker results.
pub mod merge;

// Re-exports.
pub use merge::merge_sorted;

use crate::config::Config;
use crate::protocol::ErrorReply;
use crate::registry::{WorkerRecord, WorkerRegistry};
use crate::run::rw::{Connection, FrameError};
use crate::run::task;
use crate::stats::SortStats;
use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

/// What one partition task resolved to. Failures never propagate out of the
/// task; the dispatcher decides based on the tag.
#[derive(Debug)]
enum PartitionOutcome {
    Sorted { data: Vec<i64> },
    Failed { worker: String, reason: String },
}

/// Fans a sort job out over the active fleet: partition, parallel round
/// trips, k-way merge, framed reply to the client.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    stats: Arc<SortStats>,
    config: Config,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        stats: Arc<SortStats>,
        config: Config,
    ) -> Self {
        Self {
            registry,
            stats,
            config,
        }
    }

    /// Runs one job end to end and reports the outcome to the client.
    /// Returns whether a sorted result was produced and sent.
    pub async fn dispatch<S>(
        &self,
        numbers: Vec<i64>,
        conn: &mut Connection<S>,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.try_dispatch(numbers, conn).await {
            Ok(produced) => produced,
            Err(e) => {
                error!("sort job failed: {}", e);
                self.stats.record_error();
                let reply = ErrorReply::new(e.to_string());
                let _ = conn.send_unframed(&reply).await;
                false
            }
        }
    }

    async fn try_dispatch<S>(
        &self,
        numbers: Vec<i64>,
        conn: &mut Connection<S>,
    ) -> Result<bool, FrameError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.registry.probe_all().await;
        let workers = self.registry.active_snapshot();
        if workers.is_empty() {
            conn.send_unframed(&ErrorReply::new(
                "no workers available for distributed processing",
            ))
            .await?;
            return Ok(false);
        }

        self.stats.add_numbers(numbers.len() as u64);

        // nothing to distribute
        if numbers.is_empty() {
            conn.send(&Vec::<i64>::new()).await?;
            return Ok(true);
        }

        info!(
            "distributing {} numbers across {} workers",
            numbers.len(),
            workers.len()
        );
        let partitions = partition(&numbers, workers.len());

        // one task per non-empty partition; trailing workers may get nothing
        // when there are fewer numbers than workers
        let mut names = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());
        for (worker, chunk) in workers.into_iter().zip(partitions) {
            if chunk.is_empty() {
                continue;
            }
            names.push(worker.name.clone());
            handles.push(tokio::spawn(sort_on_worker(
                self.registry.clone(),
                self.stats.clone(),
                self.config,
                worker,
                chunk,
            )));
        }

        // join barrier: the merge starts only once every partition task has
        // terminated, one way or the other
        let outcomes = futures::future::join_all(handles).await;

        let mut sorted_runs = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for (name, joined) in names.into_iter().zip(outcomes) {
            match joined {
                Ok(PartitionOutcome::Sorted { data }) => sorted_runs.push(data),
                Ok(PartitionOutcome::Failed { worker, reason }) => {
                    warn!("worker {} failed its partition: {}", worker, reason);
                    self.stats.record_error();
                    failed.push(worker);
                }
                Err(e) => {
                    error!("partition task for worker {} died: {}", name, e);
                    self.stats.record_error();
                    failed.push(name);
                }
            }
        }

        if sorted_runs.is_empty() {
            conn.send_unframed(&ErrorReply::new(format!(
                "all workers failed: {}",
                failed.join(", ")
            )))
            .await?;
            return Ok(false);
        }
        if !failed.is_empty() {
            // the failed partitions are dropped from the result
            warn!("proceeding without failed workers: {}", failed.join(", "));
        }

        info!("merging {} sorted partitions", sorted_runs.len());
        let started = Instant::now();
        let merged = merge_sorted(sorted_runs);
        info!(
            "merge of {} numbers completed in {:?}",
            merged.len(),
            started.elapsed()
        );

        conn.send(&merged).await?;
        Ok(true)
    }
}

/// Splits the input into one contiguous chunk per worker. The remainder lands
/// on the last worker; with fewer numbers than workers the trailing chunks
/// are empty.
fn partition(numbers: &[i64], workers: usize) -> Vec<Vec<i64>> {
    debug_assert!(workers > 0);
    let chunk = cmp::max(1, numbers.len() / workers);
    (0..workers)
        .map(|i| {
            let start = cmp::min(i * chunk, numbers.len());
            let end = if i == workers - 1 {
                numbers.len()
            } else {
                cmp::min(start + chunk, numbers.len())
            };
            numbers[start..end].to_vec()
        })
        .collect()
}

/// One worker round trip. Updates the registry on both outcomes and never
/// returns an error: the dispatcher consumes the tagged result.
async fn sort_on_worker(
    registry: Arc<WorkerRegistry>,
    stats: Arc<SortStats>,
    config: Config,
    worker: WorkerRecord,
    chunk: Vec<i64>,
) -> PartitionOutcome {
    info!("sending {} numbers to worker {}", chunk.len(), worker.name);
    let started = Instant::now();
    match round_trip(&config, &worker, &chunk).await {
        Ok(sorted) => {
            let elapsed = started.elapsed();
            if sorted.len() != chunk.len() {
                registry.mark_inactive(&worker.ip, worker.port);
                return PartitionOutcome::Failed {
                    worker: worker.name,
                    reason: format!(
                        "returned {} numbers for a partition of {}",
                        sorted.len(),
                        chunk.len()
                    ),
                };
            }
            info!(
                "worker {} returned {} numbers in {:?}",
                worker.name,
                sorted.len(),
                elapsed
            );
            registry.record_success(
                &worker.ip,
                worker.port,
                elapsed,
                chunk.len() as u64,
            );
            stats.record_response_time(elapsed);
            PartitionOutcome::Sorted { data: sorted }
        }
        Err(e) => {
            registry.mark_inactive(&worker.ip, worker.port);
            PartitionOutcome::Failed {
                worker: worker.name,
                reason: e.to_string(),
            }
        }
    }
}

async fn round_trip(
    config: &Config,
    worker: &WorkerRecord,
    chunk: &[i64],
) -> Result<Vec<i64>, FrameError> {
    let stream = task::connect(
        &worker.ip,
        worker.port,
        config.worker_connect_timeout(),
    )
    .await?;
    let mut conn = Connection::new(stream, config.max_frame_len());
    conn.send(&chunk).await?;
    conn.recv_timeout(config.transfer_timeout()).await
}
