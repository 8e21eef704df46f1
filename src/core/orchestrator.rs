use crate::config::toml_config::BatchConfig;
use crate::domain::model::{
    AmenityCandidate, InvalidOrigin, LonLat, OriginEntity, OriginOutcome, Progress, ProximityResult,
    TravelMode,
};
use crate::domain::ports::{AmenityDiscovery, ProgressObserver, ProximityResolver};
use crate::utils::error::{ProximityError, Result};
use crate::utils::monitor::RunMonitor;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cooperative cancellation shared between the caller and a running orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Bookkeeping for one run; rebuilt every time [`BatchOrchestrator::run`] starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRun {
    pub processed: usize,
    pub total: usize,
    pub current_batch_size: usize,
    pub cancelled: bool,
}

impl BatchRun {
    fn start(total: usize, initial_batch_size: usize) -> Self {
        Self {
            processed: 0,
            total,
            current_batch_size: initial_batch_size,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoResultReason {
    NoCandidates,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoResultOrigin {
    pub origin_id: String,
    pub reason: NoResultReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub state: RunState,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub invalid: usize,
    pub no_result: usize,
}

/// Everything a run produced, including partial results of cancelled or failed runs.
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub results: Vec<ProximityResult>,
    pub invalid: Vec<InvalidOrigin>,
    pub no_result: Vec<NoResultOrigin>,
    pub processed: usize,
    pub total: usize,
    pub error: Option<ProximityError>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            total: self.total,
            processed: self.processed,
            succeeded: self.results.len(),
            invalid: self.invalid.len(),
            no_result: self.no_result.len(),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "🏁 Run {:?}: {}/{} processed, {} resolved, {} without result, {} invalid ({:?})",
            summary.state,
            summary.processed,
            summary.total,
            summary.succeeded,
            summary.no_result,
            summary.invalid,
            self.elapsed
        );
        if let Some(error) = &self.error {
            tracing::error!("❌ Run halted: {}", error);
        }
    }
}

/// Grows the batch after a fast batch and shrinks it after a slow one, within bounds.
pub fn next_batch_size(current: usize, elapsed: Duration, config: &BatchConfig) -> usize {
    let (min_size, max_size) = config.size_bounds();
    let next = if elapsed < config.fast_threshold() && current < max_size {
        current + 1
    } else if elapsed > config.slow_threshold() && current > min_size {
        current - 1
    } else {
        current
    };
    next.clamp(min_size, max_size)
}

/// Splits origins into usable `(origin, (lon, lat))` pairs and rejected ones.
pub fn partition_origins(origins: &[OriginEntity]) -> (Vec<(&OriginEntity, LonLat)>, Vec<InvalidOrigin>) {
    let mut valid = Vec::with_capacity(origins.len());
    let mut invalid = Vec::new();
    for origin in origins {
        match origin.checked_location() {
            Ok(location) => valid.push((origin, location)),
            Err(reason) => {
                tracing::warn!("Skipping origin {} ({}): {}", origin.id, origin.display_name, reason);
                invalid.push(InvalidOrigin {
                    origin_id: origin.id.clone(),
                    reason,
                });
            }
        }
    }
    (valid, invalid)
}

/// Drives discovery then resolution over many origins in adaptively sized batches.
pub struct BatchOrchestrator<D: AmenityDiscovery, R: ProximityResolver> {
    discovery: D,
    resolver: R,
    config: BatchConfig,
    radius_tiers: Vec<u32>,
    cancel: CancellationFlag,
    observer: Option<Arc<dyn ProgressObserver>>,
    monitor: RunMonitor,
    state: Mutex<RunState>,
}

impl<D: AmenityDiscovery, R: ProximityResolver> BatchOrchestrator<D, R> {
    pub fn new(discovery: D, resolver: R, config: BatchConfig, radius_tiers: Vec<u32>) -> Self {
        Self {
            discovery,
            resolver,
            config,
            radius_tiers,
            cancel: CancellationFlag::new(),
            observer: None,
            monitor: RunMonitor::default(),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Enables per-batch timing and process stats in the logs.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = RunMonitor::new(enabled);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the current run at its next check point.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    async fn discover_with_escalation(&self, location: LonLat, category: &str) -> Option<Vec<AmenityCandidate>> {
        let (lon, lat) = location;
        for &radius in &self.radius_tiers {
            if self.cancel.is_cancelled() {
                return None;
            }
            let candidates = self.discovery.discover((lat, lon), category, radius).await;
            if self.cancel.is_cancelled() {
                return None;
            }
            if !candidates.is_empty() {
                return Some(candidates);
            }
            tracing::debug!("No '{}' within {}m of {:?}", category, radius, location);
        }
        Some(Vec::new())
    }

    async fn process_origin(
        &self,
        origin: &OriginEntity,
        location: LonLat,
        category: &str,
        mode: TravelMode,
    ) -> Result<OriginOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(OriginOutcome::Cancelled);
        }

        let Some(candidates) = self.discover_with_escalation(location, category).await else {
            return Ok(OriginOutcome::Cancelled);
        };
        if candidates.is_empty() {
            tracing::info!("🔍 No '{}' found near {} ({})", category, origin.display_name, origin.id);
            return Ok(OriginOutcome::NoCandidates);
        }

        if self.cancel.is_cancelled() {
            return Ok(OriginOutcome::Cancelled);
        }

        match self.resolver.resolve(origin, &candidates, mode).await? {
            Some(result) => Ok(OriginOutcome::Resolved(result)),
            None => {
                tracing::info!(
                    "🔍 None of {} candidates reachable from {} ({})",
                    candidates.len(),
                    origin.display_name,
                    origin.id
                );
                Ok(OriginOutcome::Unreachable)
            }
        }
    }

    fn notify(&self, progress: Progress) {
        if let Some(observer) = &self.observer {
            observer.on_progress(progress);
        }
    }

    /// Runs the whole origin set. Never fails: cancellation and systemic
    /// errors are reported through [`RunReport::state`] with partial results kept.
    ///
    /// The cancellation flag is never cleared here; a flag cancelled before
    /// the run starts skips every origin. Use a fresh flag per run.
    pub async fn run(&self, origins: &[OriginEntity], category: &str, mode: TravelMode) -> RunReport {
        let started = Instant::now();
        self.set_state(RunState::Running);

        let (valid, invalid) = partition_origins(origins);
        let (min_size, max_size) = self.config.size_bounds();
        let mut run = BatchRun::start(valid.len(), self.config.initial_size.clamp(min_size, max_size));
        tracing::info!(
            "🚀 Resolving nearest '{}' ({}) for {} origins ({} invalid skipped)",
            category,
            mode,
            run.total,
            invalid.len()
        );

        let mut results = Vec::new();
        let mut no_result = Vec::new();
        let mut failure: Option<ProximityError> = None;
        let processed = AtomicUsize::new(0);
        let mut cursor = 0;
        let mut batch_index = 0;

        while cursor < valid.len() {
            if self.cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }

            let end = (cursor + run.current_batch_size).min(valid.len());
            let batch = &valid[cursor..end];
            let batch_started = Instant::now();
            let total = run.total;
            let processed = &processed;

            let outcomes = join_all(batch.iter().map(|&(origin, location)| async move {
                let outcome = self.process_origin(origin, location, category, mode).await;
                if matches!(
                    outcome,
                    Ok(OriginOutcome::Resolved(_) | OriginOutcome::NoCandidates | OriginOutcome::Unreachable)
                ) {
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.notify(Progress { processed: done, total });
                }
                (origin, outcome)
            }))
            .await;
            let elapsed = batch_started.elapsed();

            for (origin, outcome) in outcomes {
                match outcome {
                    Ok(OriginOutcome::Resolved(result)) => results.push(result),
                    Ok(OriginOutcome::NoCandidates) => no_result.push(NoResultOrigin {
                        origin_id: origin.id.clone(),
                        reason: NoResultReason::NoCandidates,
                    }),
                    Ok(OriginOutcome::Unreachable) => no_result.push(NoResultOrigin {
                        origin_id: origin.id.clone(),
                        reason: NoResultReason::Unreachable,
                    }),
                    Ok(OriginOutcome::Cancelled) => run.cancelled = true,
                    Err(e) => {
                        tracing::error!("❌ Origin {} failed: {}", origin.id, e);
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
            run.processed = processed.load(Ordering::SeqCst);
            cursor = end;

            if failure.is_some() || run.cancelled {
                break;
            }

            let next_size = next_batch_size(run.current_batch_size, elapsed, &self.config);
            self.monitor.log_batch(batch_index, batch.len(), elapsed, next_size);
            tracing::debug!(
                "Batch {} done in {:?}: {}/{} processed, next size {}",
                batch_index + 1,
                elapsed,
                run.processed,
                run.total,
                next_size
            );
            run.current_batch_size = next_size;
            batch_index += 1;

            if cursor < valid.len() {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
        }

        let state = if failure.is_some() {
            RunState::Failed
        } else if run.cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        self.set_state(state);
        self.monitor.log_final_stats();

        let report = RunReport {
            state,
            results,
            invalid,
            no_result,
            processed: run.processed,
            total: run.total,
            error: failure,
            elapsed: started.elapsed(),
        };
        report.log_summary();
        report
    }
}
