//! Decoding pipeline: turns scanned files into published snapshots and
//! observations.

use std::fs;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use fusion::{IngestSummary, ObservationStore};
use grib2_parser::{decode_snapshot, Grib2Tables};
use grid_processor::{PublishOutcome, SnapshotStore};
use metar_parser::{decode_feed, ObservationSource, StationCatalogue};
use wx_common::ValidTime;

use crate::scanner::DecodeJob;

/// What a finished job contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Snapshot { product: String, valid: ValidTime },
    /// Decoded, but its cycle is older than every retained one
    Superseded { product: String, valid: ValidTime },
    Observations(IngestSummary),
}

/// Time of the latest tick. Decoders resolve report times against it and
/// maintenance evicts by it, so a replayed track runs on its own clock.
/// Falls back to the wall clock until the first tick.
#[derive(Debug, Default)]
pub struct TickClock {
    last: RwLock<Option<DateTime<Utc>>>,
}

impl TickClock {
    pub fn set(&self, time: DateTime<Utc>) {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(time);
    }

    pub fn now(&self) -> DateTime<Utc> {
        let last = *self.last.read().unwrap_or_else(PoisonError::into_inner);
        last.unwrap_or_else(Utc::now)
    }
}

/// Shared decoding context. Decoding is CPU-bound and runs on the blocking
/// pool; the stores swap their state atomically so ticks never wait on it.
pub struct Pipeline {
    snapshots: Arc<SnapshotStore>,
    observations: Arc<ObservationStore>,
    catalogue: Arc<StationCatalogue>,
    tables: Arc<Grib2Tables>,
    source: ObservationSource,
    clock: TickClock,
}

impl Pipeline {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        observations: Arc<ObservationStore>,
        catalogue: StationCatalogue,
        source: ObservationSource,
    ) -> Self {
        Self {
            snapshots,
            observations,
            catalogue: Arc::new(catalogue),
            tables: Arc::new(Grib2Tables::standard()),
            source,
            clock: TickClock::default(),
        }
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Decode one file and publish its content.
    #[instrument(skip(self, job), fields(path = %job.path().display()))]
    pub fn process(&self, job: &DecodeJob, now: DateTime<Utc>) -> Result<JobOutcome> {
        match job {
            DecodeJob::Grid { path, product } => {
                let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
                let snapshot = decode_snapshot(
                    Bytes::from(data),
                    &product.name,
                    &product.fields.request(),
                    Arc::clone(&self.tables),
                )?;
                let valid = snapshot.valid;
                let product = product.name.clone();

                match self.snapshots.publish(snapshot)? {
                    PublishOutcome::Published { .. } => {
                        info!(product = %product, valid = %valid, "Published grid snapshot");
                        Ok(JobOutcome::Snapshot { product, valid })
                    }
                    PublishOutcome::Superseded => Ok(JobOutcome::Superseded { product, valid }),
                }
            }
            DecodeJob::Observations { path } => {
                let body = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
                let batch = decode_feed(self.source, &body, now, &self.catalogue)?;
                let summary = self.observations.ingest_batch(batch);

                info!(
                    accepted = summary.accepted,
                    outdated = summary.outdated,
                    filtered = summary.filtered,
                    "Ingested observations"
                );
                Ok(JobOutcome::Observations(summary))
            }
        }
    }

    /// Run `jobs` with at most `workers` in flight and wait for all of them.
    /// Grid jobs finish before observation jobs are started.
    pub async fn process_all(self: &Arc<Self>, jobs: Vec<DecodeJob>, workers: usize) -> Vec<Result<JobOutcome>> {
        let (grids, feeds): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .partition(|job| matches!(job, DecodeJob::Grid { .. }));

        let mut outcomes = self.run_batch(grids, workers).await;
        outcomes.extend(self.run_batch(feeds, workers).await);
        outcomes
    }

    async fn run_batch(self: &Arc<Self>, jobs: Vec<DecodeJob>, workers: usize) -> Vec<Result<JobOutcome>> {
        stream::iter(jobs)
            .map(|job| {
                let pipeline = Arc::clone(self);
                async move {
                    tokio::task::spawn_blocking(move || pipeline.process(&job, pipeline.clock.now()))
                        .await
                        .context("decode task panicked")
                        .and_then(|outcome| outcome)
                }
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await
    }

    /// Consume jobs from `queue` until it closes, decoding up to `workers`
    /// files at a time.
    pub fn spawn_workers(self: Arc<Self>, mut queue: mpsc::Receiver<DecodeJob>, workers: usize) -> JoinHandle<()> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));

        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let pipeline = Arc::clone(&self);

                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    match pipeline.process(&job, pipeline.clock.now()) {
                        Ok(outcome) => debug!(?outcome, "Job finished"),
                        Err(e) => {
                            metrics::counter!("wx_decode_failures_total").increment(1);
                            error!(path = %job.path().display(), error = %e, "Decode failed");
                        }
                    }
                });
            }
            debug!("Job queue closed");
        })
    }
}
