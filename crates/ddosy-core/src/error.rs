//! Error types for the load generation engine.

use thiserror::Error;

/// Result type alias using ScheduleError.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors returned synchronously by submit and kill.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid schedule request: {0}")]
    Validation(String),

    #[error("Run queue is full (capacity {capacity})")]
    Backpressure { capacity: usize },

    #[error("No run is currently active")]
    NoActiveRun,

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl ScheduleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Backpressure { .. } => "backpressure",
            Self::NoActiveRun => "no_active_run",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Failure of a single emission. Counted, never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Target responded with HTTP {0}")]
    Status(u16),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Timeout => "timeout",
            Self::Status(_) => "status",
        }
    }
}

/// Internal faults inside a run. These turn the run into `Failed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("Run has no selectable traffic patterns")]
    NoTrafficPatterns,

    #[error("Traffic pattern {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("Load pattern {index} is invalid: {message}")]
    InvalidSegment { index: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_messages() {
        let err = ScheduleError::Backpressure { capacity: 5 };
        assert_eq!(err.to_string(), "Run queue is full (capacity 5)");
        assert_eq!(err.kind(), "backpressure");

        let err = ScheduleError::validation("endpoint is required");
        assert_eq!(
            err.to_string(),
            "Invalid schedule request: endpoint is required"
        );
    }

    #[test]
    fn test_dispatch_error_kind() {
        assert_eq!(DispatchError::Timeout.kind(), "timeout");
        assert_eq!(DispatchError::Status(503).to_string(), "Target responded with HTTP 503");
    }
}
