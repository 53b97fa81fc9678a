// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Periodic fetch-and-classify cycles
//!
//! Each cycle processes every enabled source concurrently. Live sources are
//! fetched and then classified on a blocking worker; synthetic sources get a
//! generated reading. Once every source has settled, the successful results
//! are cached and broadcast, a status message goes out, and the scheduler
//! sleeps until the next cycle. Cycles never overlap.
//!
//! A failure for one source only costs that source its result for the cycle.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::{self, synthetic};
use crate::broadcast::Broadcaster;
use crate::config::FetchConfig;
use crate::error::SourceFailure;
use crate::fetcher::SourceFetcher;
use crate::models::{AnalysisResult, Source};

/// Source of result timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between cycles (or not started)
    Idle,
    /// A cycle is in flight
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Per-fetch timeout
    pub fetch_timeout: Duration,
    /// How long an in-flight cycle may keep running after cancellation
    pub shutdown_grace: Duration,
}

impl From<&FetchConfig> for SchedulerConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            fetch_timeout: Duration::from_secs(config.timeout_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

/// Outcome of one cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub attempted: usize,
    pub published: usize,
    pub failures: Vec<(String, SourceFailure)>,
}

pub struct Scheduler {
    sources: Arc<[Source]>,
    fetcher: Arc<dyn SourceFetcher>,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    /// Build a scheduler over the enabled subset of `sources`
    pub fn new(
        sources: &[Source],
        fetcher: Arc<dyn SourceFetcher>,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let sources: Arc<[Source]> = sources.iter().filter(|s| s.enabled).cloned().collect();
        let (state, _) = watch::channel(SchedulerState::Idle);

        Self { sources, fetcher, broadcaster, clock, config, state }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Spawn the scheduling loop. The first cycle starts immediately.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run(cancel.clone()));

        SchedulerHandle { cancel, state, task }
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Cancellation during the sleep returns at once. Cancellation during a
    /// cycle gives it `shutdown_grace` to finish; anything still outstanding
    /// after that is aborted.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Scheduler started: {} sources, {:?} interval",
            self.sources.len(),
            self.config.interval
        );
        self.broadcaster
            .broadcast_status("started", &format!("Monitoring {} sources", self.sources.len()))
            .await;

        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            self.state.send_replace(SchedulerState::Running);

            let pass = self.run_cycle(cycle);
            tokio::pin!(pass);

            let report = tokio::select! {
                report = &mut pass => Some(report),
                _ = cancel.cancelled() => {
                    info!(
                        "Shutdown requested during cycle {}, allowing {:?} for in-flight work",
                        cycle, self.config.shutdown_grace
                    );
                    match tokio::time::timeout(self.config.shutdown_grace, &mut pass).await {
                        Ok(report) => info!(
                            "Cycle {} settled during shutdown: {} of {} sources published",
                            report.cycle, report.published, report.attempted
                        ),
                        Err(_) => warn!("Cycle {} did not settle within the grace period, aborting it", cycle),
                    }
                    None
                }
            };

            self.state.send_replace(SchedulerState::Idle);

            let Some(report) = report else { break };
            info!(
                "Cycle {} complete: {} of {} sources published",
                report.cycle, report.published, report.attempted
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("Scheduler stopped after {} cycles", cycle);
    }

    /// Run a single cycle and publish its results
    pub async fn run_cycle(&self, cycle: u64) -> CycleReport {
        info!("Starting fetch cycle {}", cycle);

        let mut tasks = JoinSet::new();
        for source in self.sources.iter().cloned() {
            let fetcher = Arc::clone(&self.fetcher);
            let clock = Arc::clone(&self.clock);
            let timeout = self.config.fetch_timeout;

            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(process_source(&source, fetcher.as_ref(), clock.as_ref(), timeout))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(SourceFailure::Worker(panic_message(panic.as_ref()))));
                (source.id, outcome)
            });
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source_id, Ok(result))) => {
                    info!(
                        "Processed {}: sun={:.2}, wetness={:.2}",
                        source_id, result.sun_exposure, result.wetness_score
                    );
                    results.push(result);
                }
                Ok((source_id, Err(failure))) => {
                    warn!("No result for {} this cycle: {}", source_id, failure);
                    failures.push((source_id, failure));
                }
                Err(e) => error!("Source task failed: {}", e),
            }
        }

        let published = results.len();
        for result in results {
            self.broadcaster.broadcast(result).await;
        }

        self.broadcaster
            .broadcast_status(
                "cycle_complete",
                &format!("Processed {} of {} sources", published, self.sources.len()),
            )
            .await;

        CycleReport {
            cycle,
            attempted: self.sources.len(),
            published,
            failures,
        }
    }
}

/// Running scheduler
pub struct SchedulerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SchedulerState>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Cancel the loop and wait for it to wind down
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

async fn process_source(
    source: &Source,
    fetcher: &dyn SourceFetcher,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<AnalysisResult, SourceFailure> {
    if source.is_synthetic() {
        return Ok(synthesize(source, clock));
    }

    let bytes = fetcher.fetch(source, timeout).await?;
    let timestamp = clock.now();
    let source_id = source.id.clone();

    let mut result = tokio::task::spawn_blocking(move || analysis::classify(&bytes, &source_id, timestamp))
        .await
        .map_err(|e| SourceFailure::Worker(e.to_string()))??;

    result.image_url = Some(source.url.clone());
    Ok(result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn synthesize(source: &Source, clock: &dyn Clock) -> AnalysisResult {
    let mut rng = rand::thread_rng();
    synthetic::generate(source, &mut rng, clock.now())
}
