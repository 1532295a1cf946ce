//! Execution of a single load test.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::dispatcher::Dispatcher;
use crate::error::RunError;
use crate::selector::TrafficSelector;
use crate::stats::RunStats;
use crate::types::{RunId, RunStatus, ScheduleRequest};

/// How a run that did not fault came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Killed,
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Killed => RunStatus::Killed,
        }
    }
}

/// One accepted load test.
///
/// The cancellation token belongs to the run; the scheduler only ever
/// cancels the token of the run it is currently executing.
#[derive(Debug)]
pub struct Run {
    id: RunId,
    request: ScheduleRequest,
    cancel: CancellationToken,
    stats: Arc<RunStats>,
    status: watch::Sender<RunStatus>,
}

impl Run {
    pub fn new(id: RunId, request: ScheduleRequest) -> Self {
        let (status, _) = watch::channel(RunStatus::Queued);
        Self {
            id,
            request,
            cancel: CancellationToken::new(),
            stats: Arc::new(RunStats::new()),
            status,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn request(&self) -> &ScheduleRequest {
        &self.request
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Ask the run to stop. Takes effect at the next emission decision.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute the run on its own task and return its terminal status.
    ///
    /// Errors and panics inside the run become [`RunStatus::Failed`]; they
    /// never reach the caller.
    pub async fn supervise(self: Arc<Self>, dispatcher: Arc<Dispatcher>) -> RunStatus {
        self.status.send_replace(RunStatus::Running);
        let run = Arc::clone(&self);
        let status = supervised(self.id, async move { run.execute(&dispatcher).await }).await;
        self.status.send_replace(status);
        status
    }

    /// Walk every segment, emitting at the instants the rate curve dictates.
    #[instrument(skip_all, fields(run_id = self.id, endpoint = %self.request.endpoint))]
    pub async fn execute(&self, dispatcher: &Dispatcher) -> Result<RunOutcome, RunError> {
        let mut selector = TrafficSelector::new(&self.request.traffic_patterns)?;
        let endpoint: Arc<str> = Arc::from(self.request.endpoint.as_str());

        info!(
            segments = self.request.load_patterns.len(),
            expected_requests = self.request.expected_requests().round() as u64,
            duration_ms = self.request.total_duration().as_millis() as u64,
            "Run started"
        );

        // Segments share one clock: each starts exactly where the previous
        // one was scheduled to end.
        let mut segment_start = Instant::now();

        for (index, segment) in self.request.load_patterns.iter().enumerate() {
            if let Err(message) = segment.shape.validate() {
                return Err(RunError::InvalidSegment { index, message });
            }
            if segment.duration.is_zero() {
                debug!(segment = index, "Skipping zero-length segment");
                continue;
            }

            debug!(
                segment = index,
                shape = ?segment.shape,
                duration_ms = segment.duration.as_millis() as u64,
                "Segment started"
            );

            for offset in segment.emissions() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Ok(self.killed()),
                    _ = sleep_until(segment_start + offset) => {}
                }

                let payload = selector.select();
                dispatcher.dispatch(Arc::clone(&endpoint), payload, self.stats());
            }

            let segment_end = segment_start + segment.duration;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(self.killed()),
                _ = sleep_until(segment_end) => {}
            }
            segment_start = segment_end;
        }

        let stats = self.stats.snapshot();
        info!(
            emitted = stats.emitted,
            dropped = stats.dropped,
            "Run completed"
        );
        Ok(RunOutcome::Completed)
    }

    fn killed(&self) -> RunOutcome {
        let stats = self.stats.snapshot();
        info!(
            emitted = stats.emitted,
            in_flight = stats.in_flight(),
            "Run killed"
        );
        RunOutcome::Killed
    }
}

/// Drive `fut` on a separate task, converting errors and panics into
/// [`RunStatus::Failed`].
pub async fn supervised<F>(run_id: RunId, fut: F) -> RunStatus
where
    F: Future<Output = Result<RunOutcome, RunError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(outcome)) => outcome.into(),
        Ok(Err(e)) => {
            error!(run_id, error = %e, "Run failed");
            RunStatus::Failed
        }
        Err(e) if e.is_panic() => {
            error!(run_id, "Run panicked");
            RunStatus::Failed
        }
        Err(e) => {
            error!(run_id, error = %e, "Run task was aborted");
            RunStatus::Failed
        }
    }
}
