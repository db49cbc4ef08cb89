//! Drives refresh cycles once or on a fixed interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::CycleError;
use crate::pipeline::{CycleReport, RefreshPipeline};

/// Loop bookkeeping carried from one cycle to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub cycles_run: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct Scheduler {
    pipeline: RefreshPipeline,
    interval: Duration,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(pipeline: RefreshPipeline, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            state: SchedulerState::default(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run exactly one cycle.
    pub async fn run_once(&mut self) -> Result<CycleReport, CycleError> {
        self.cycle().await
    }

    /// Run a cycle now, then one per interval until `cancel` fires.
    ///
    /// A failed cycle is recorded and the loop waits for the next interval.
    /// Cancellation is observed between cycles and during the wait.
    pub async fn run_continuous(&mut self, cancel: CancellationToken) -> SchedulerState {
        info!(
            source = %self.pipeline.source().describe(),
            output = %self.pipeline.config().output_path.display(),
            interval_secs = self.interval.as_secs_f64(),
            "starting periodic refresh"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Errors are already logged and recorded in state.
            let _ = self.cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            cycles = self.state.cycles_run,
            successes = self.state.successes,
            failures = self.state.failures,
            "periodic refresh stopped"
        );
        self.state.clone()
    }

    async fn cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.state.cycles_run += 1;
        let cycle = self.state.cycles_run;
        info!(cycle, "refresh cycle started");

        let result = self.pipeline.run_cycle(cycle).await;
        match &result {
            Ok(report) => {
                self.state.successes += 1;
                self.state.consecutive_failures = 0;
                self.state.last_success = Some(report.finished_at);
                self.state.last_error = None;
                info!(
                    cycle,
                    path = %report.published_path.display(),
                    rows_kept = report.stats.rows_kept,
                    total_rows = report.stats.total_rows_seen,
                    digest = %report.digest,
                    elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
                    "refresh cycle succeeded"
                );
            }
            Err(err) => {
                self.state.failures += 1;
                self.state.consecutive_failures += 1;
                self.state.last_error = Some(err.to_string());
                error!(
                    cycle,
                    stage = %err.stage(),
                    consecutive_failures = self.state.consecutive_failures,
                    error = %err,
                    "refresh cycle failed; published dataset left unchanged"
                );
            }
        }
        result
    }
}
