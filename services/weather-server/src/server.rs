//! The host loop: scan for inputs, decode them off the tick path, and tick
//! the fusion engine at a fixed rate.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use fusion::{FusedWeatherState, FusionEngine, FusionError, ObservationStore};
use grid_processor::{InterpolationEngine, SnapshotStore};
use metar_parser::{parse_station_table, StationCatalogue};

use crate::config::ServerConfig;
use crate::output::StateWriter;
use crate::pipeline::Pipeline;
use crate::position::PositionFeed;
use crate::scanner::Scanner;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

pub struct WeatherServer {
    config: ServerConfig,
    snapshots: Arc<SnapshotStore>,
    observations: Arc<ObservationStore>,
    engine: Arc<FusionEngine>,
    pipeline: Arc<Pipeline>,
    scanner: Scanner,
    last_legacy_write: Option<DateTime<Utc>>,
}

impl WeatherServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let catalogue = match &config.station_table {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read station table {}", path.display()))?;
                let catalogue = parse_station_table(&text);
                info!(stations = catalogue.len(), "Loaded station table");
                catalogue
            }
            None => StationCatalogue::new(),
        };

        let snapshots = Arc::new(SnapshotStore::new(&config.interpolation));
        let observations = Arc::new(ObservationStore::new(&config.fusion));
        let interpolation = Arc::new(InterpolationEngine::new(
            Arc::clone(&snapshots),
            config.interpolation.clone(),
        )?);
        let engine = Arc::new(FusionEngine::new(
            interpolation,
            Arc::clone(&observations),
            config.fusion.clone(),
        )?);
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&snapshots),
            Arc::clone(&observations),
            catalogue,
            config.fusion.observation_source,
        ));
        let scanner = Scanner::new(&config);

        Ok(Self {
            config,
            snapshots,
            observations,
            engine,
            pipeline,
            scanner,
            last_legacy_write: None,
        })
    }

    pub fn engine(&self) -> &Arc<FusionEngine> {
        &self.engine
    }

    /// Decode every input currently on disk, then tick once.
    pub async fn run_once(&mut self, feed: &mut PositionFeed) -> Result<Arc<FusedWeatherState>> {
        let (position, time) = feed.advance();
        self.pipeline.clock().set(time);

        let jobs = self.scanner.scan();
        info!(jobs = jobs.len(), "Decoding inputs");

        let outcomes = self.pipeline.process_all(jobs, self.config.decode_workers).await;
        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        for e in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            error!(error = %e, "Decode failed");
        }
        info!(
            decoded = outcomes.len() - failed,
            failed,
            snapshots = self.snapshots.current().len(),
            stations = self.observations.current().len(),
            "Inputs decoded"
        );

        let state = self.engine.tick(&position, time)?;
        self.maintain().await;
        Ok(state)
    }

    /// Tick until interrupted, writing every published state to `writer`.
    pub async fn run(mut self, mut feed: PositionFeed, writer: StateWriter) -> Result<()> {
        let (queue, jobs) = mpsc::channel(self.config.queue_depth);
        let workers = Arc::clone(&self.pipeline).spawn_workers(jobs, self.config.decode_workers);
        let output = writer.spawn(self.engine.subscribe());

        let mut tick = interval(Duration::from_millis(self.config.tick_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut scan = interval(Duration::from_secs(self.config.scan_interval_secs));
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maintenance = interval(MAINTENANCE_INTERVAL);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_ms = self.config.tick_interval_ms,
            scan_secs = self.config.scan_interval_secs,
            "Starting weather server"
        );

        self.pipeline.clock().set(feed.peek_time());
        let mut waiting_for_data = false;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let (position, time) = feed.advance();
                    self.pipeline.clock().set(time);
                    match self.engine.tick(&position, time) {
                        Ok(_) => waiting_for_data = false,
                        Err(FusionError::NoState(e)) => {
                            if !waiting_for_data {
                                info!(reason = %e, "No weather available yet");
                                waiting_for_data = true;
                            }
                        }
                        Err(e) => error!(error = %e, "Tick failed"),
                    }
                }
                _ = scan.tick() => {
                    for job in self.scanner.scan() {
                        match queue.try_send(job) {
                            Ok(()) => {}
                            Err(TrySendError::Full(job)) => {
                                warn!(path = %job.path().display(), "Decode queue full, deferring file");
                                self.scanner.forget(job.path());
                            }
                            Err(TrySendError::Closed(_)) => {
                                error!("Decode workers stopped");
                                break;
                            }
                        }
                    }
                }
                _ = maintenance.tick() => {
                    self.maintain().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        drop(queue);
        if let Err(e) = workers.await {
            warn!(error = %e, "Worker task ended abnormally");
        }
        drop(self);
        match output.await {
            Ok(writer) => info!(states = writer.written(), "Weather server stopped"),
            Err(e) => warn!(error = %e, "Output task ended abnormally"),
        }
        Ok(())
    }

    /// Drop data expired at the latest tick time and refresh the legacy
    /// report file when due.
    pub async fn maintain(&mut self) {
        let now = self.pipeline.clock().now();
        let snapshots = self.snapshots.evict_stale(now);
        let reports = self.observations.evict_stale(now);
        if snapshots + reports > 0 {
            debug!(snapshots, reports, "Evicted stale data");
        }

        let legacy = &self.config.fusion.legacy_record;
        if !legacy.enabled {
            return;
        }
        let due = self.last_legacy_write.map_or(true, |last| {
            now - last >= chrono::Duration::minutes(i64::from(legacy.interval_minutes))
        });
        if !due {
            return;
        }

        let observations = Arc::clone(&self.observations);
        let path = legacy.path.clone();
        match tokio::task::spawn_blocking(move || observations.write_legacy(&path)).await {
            Ok(Ok(count)) => {
                debug!(reports = count, "Wrote legacy report file");
                self.last_legacy_write = Some(now);
            }
            Ok(Err(e)) => warn!(error = %e, "Failed to write legacy report file"),
            Err(e) => warn!(error = %e, "Legacy writer task failed"),
        }
    }
}
