//! Scheduling and traffic generation engine for the ddosy load-testing server.
//!
//! This crate provides:
//! - Bounded admission of load test runs with backpressure
//! - Sequential, single-worker execution of queued runs
//! - Rate control that follows an arbitrary rate curve per segment
//! - Weighted payload selection
//! - Non-blocking, bounded dispatch of generated traffic
//! - Cooperative cancellation of the active run

pub mod dispatcher;
pub mod error;
pub mod rate;
pub mod run;
pub mod scheduler;
pub mod selector;
pub mod stats;
pub mod transport;
pub mod types;

pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{DispatchError, RunError, ScheduleError, ScheduleResult};
pub use rate::{EmissionSchedule, LoadPattern, RateShape};
pub use run::{Run, RunOutcome};
pub use scheduler::{ActiveRun, RunEvent, Scheduler, SchedulerStatus};
pub use selector::TrafficSelector;
pub use stats::{RunStats, RunStatsSnapshot};
pub use transport::{HttpTransport, Transport};
pub use types::{RunId, RunStatus, ScheduleRequest, TrafficPattern};
