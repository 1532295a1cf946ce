//! Run admission and the single-worker execution queue.
//!
//! Submissions are validated and admitted into a bounded FIFO. One worker
//! task drains it, executing runs strictly one at a time. Only the active run
//! can be killed; queued runs are inert until the worker reaches them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{ScheduleError, ScheduleResult};
use crate::run::Run;
use crate::stats::RunStatsSnapshot;
use crate::types::{RunId, RunStatus, ScheduleRequest};

/// Capacity of the run event channel. Slow subscribers lag, they never block
/// the worker.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle notifications broadcast by the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        id: RunId,
    },
    Finished {
        id: RunId,
        status: RunStatus,
        stats: RunStatsSnapshot,
    },
}

/// Snapshot of the scheduler for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub active: Option<ActiveRun>,
    /// Ids of queued runs, head first.
    pub queued: Vec<RunId>,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub id: RunId,
    pub endpoint: String,
    pub stats: RunStatsSnapshot,
}

/// Everything guarded by the scheduler lock.
struct QueueState {
    next_id: RunId,
    queue: VecDeque<Arc<Run>>,
    active: Option<Arc<Run>>,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    max_queue: usize,
    wake: Notify,
    events: broadcast::Sender<RunEvent>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    worker_started: AtomicBool,
}

/// Handle to the scheduler. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler whose queue holds at most `max_queue` pending runs.
    ///
    /// Nothing executes until [`Scheduler::start`] spawns the worker.
    pub fn new(max_queue: usize, dispatcher: Arc<Dispatcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    next_id: 1,
                    queue: VecDeque::with_capacity(max_queue),
                    active: None,
                    shutting_down: false,
                }),
                max_queue,
                wake: Notify::new(),
                events,
                dispatcher,
                shutdown: CancellationToken::new(),
                worker_started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the queue-draining worker.
    ///
    /// Returns `None` if a worker is already running for this scheduler.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.shared.worker_started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler worker already started");
            return None;
        }
        let shared = Arc::clone(&self.shared);
        Some(tokio::spawn(drain(shared)))
    }

    /// Admit a run. Returns its id immediately; execution is asynchronous.
    ///
    /// Rejected submissions create no run and consume no id.
    pub async fn submit(&self, request: ScheduleRequest) -> ScheduleResult<RunId> {
        if let Err(e) = request.validate() {
            counter!("ddosy_runs_rejected_total", "reason" => e.kind()).increment(1);
            return Err(e);
        }

        let mut state = self.shared.state.lock().await;
        if state.shutting_down {
            return Err(ScheduleError::ShuttingDown);
        }
        if state.queue.len() >= self.shared.max_queue {
            let err = ScheduleError::Backpressure {
                capacity: self.shared.max_queue,
            };
            counter!("ddosy_runs_rejected_total", "reason" => err.kind()).increment(1);
            warn!(queued = state.queue.len(), "Run rejected, queue full");
            return Err(err);
        }

        let id = state.next_id;
        state.next_id += 1;
        let endpoint = request.endpoint.clone();
        state.queue.push_back(Arc::new(Run::new(id, request)));
        let depth = state.queue.len();
        drop(state);

        counter!("ddosy_runs_submitted_total").increment(1);
        gauge!("ddosy_queue_depth").set(depth as f64);
        info!(run_id = id, endpoint = %endpoint, queued = depth, "Run queued");

        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Cancel the active run and return its id.
    ///
    /// With nothing running this is [`ScheduleError::NoActiveRun`] and the
    /// scheduler is left untouched. A run that already reached a terminal
    /// status but has not been released by the worker counts as not running.
    pub async fn kill(&self) -> ScheduleResult<RunId> {
        let state = self.shared.state.lock().await;
        match &state.active {
            Some(run) if !run.status().is_terminal() => {
                run.cancel();
                info!(run_id = run.id(), "Kill requested");
                Ok(run.id())
            }
            _ => Err(ScheduleError::NoActiveRun),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.shared.state.lock().await;
        SchedulerStatus {
            active: state.active.as_ref().map(|run| ActiveRun {
                id: run.id(),
                endpoint: run.request().endpoint.clone(),
                stats: run.stats().snapshot(),
            }),
            queued: state.queue.iter().map(|run| run.id()).collect(),
            capacity: self.shared.max_queue,
        }
    }

    /// Subscribe to run start/finish events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    /// Stop accepting runs, drop the queue and kill the active run.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        state.shutting_down = true;
        let discarded = state.queue.len();
        state.queue.clear();
        if let Some(run) = &state.active {
            run.cancel();
        }
        drop(state);

        gauge!("ddosy_queue_depth").set(0.0);
        self.shared.shutdown.cancel();
        info!(discarded, "Scheduler shutting down");
    }

    #[cfg(test)]
    async fn enqueue_unchecked(&self, run: Run) {
        self.shared.state.lock().await.queue.push_back(Arc::new(run));
        self.shared.wake.notify_one();
    }

    #[cfg(test)]
    async fn set_active(&self, run: Arc<Run>) {
        self.shared.state.lock().await.active = Some(run);
    }
}

/// Worker loop: pop the head run, execute it to a terminal state, repeat.
async fn drain(shared: Arc<Shared>) {
    info!(max_queue = shared.max_queue, "Scheduler worker started");
    loop {
        let next = {
            let mut state = shared.state.lock().await;
            if state.shutting_down {
                break;
            }
            let next = state.queue.pop_front();
            if let Some(run) = &next {
                state.active = Some(Arc::clone(run));
                gauge!("ddosy_queue_depth").set(state.queue.len() as f64);
            }
            next
        };

        let run = match next {
            Some(run) => run,
            None => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = shared.shutdown.cancelled() => break,
                }
                continue;
            }
        };

        let id = run.id();
        let _ = shared.events.send(RunEvent::Started { id });

        let status = Arc::clone(&run)
            .supervise(Arc::clone(&shared.dispatcher))
            .await;

        shared.state.lock().await.active = None;

        let stats = run.stats().snapshot();
        counter!("ddosy_runs_finished_total", "status" => status.as_str()).increment(1);
        info!(
            run_id = id,
            status = %status,
            emitted = stats.emitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            dropped = stats.dropped,
            "Run finished"
        );
        let _ = shared.events.send(RunEvent::Finished { id, status, stats });
    }
    info!("Scheduler worker stopped");
}
