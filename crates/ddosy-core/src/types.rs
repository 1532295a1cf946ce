//! Schedule request and run lifecycle types.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;
use serde::Serialize;

use crate::error::{ScheduleError, ScheduleResult};
use crate::rate::LoadPattern;

/// Run identifier. Assigned on admission, starting at 1, never reused.
pub type RunId = u64;

/// A weighted payload candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficPattern {
    pub weight: f64,
    pub payload: Bytes,
}

impl TrafficPattern {
    pub fn new(weight: f64, payload: impl Into<Bytes>) -> Self {
        Self {
            weight,
            payload: payload.into(),
        }
    }
}

/// Everything needed to run one load test.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    /// Target URL every emission is sent to.
    pub endpoint: String,
    pub traffic_patterns: Vec<TrafficPattern>,
    /// Rate segments, executed back to back in order.
    pub load_patterns: Vec<LoadPattern>,
}

impl ScheduleRequest {
    pub fn new(
        endpoint: impl Into<String>,
        traffic_patterns: Vec<TrafficPattern>,
        load_patterns: Vec<LoadPattern>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            traffic_patterns,
            load_patterns,
        }
    }

    /// Check the request before admission. A failure here creates no run.
    pub fn validate(&self) -> ScheduleResult<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ScheduleError::validation("endpoint is required"));
        }
        let url = Url::parse(endpoint).map_err(|e| {
            ScheduleError::validation(format!("endpoint '{}' is not a valid URL: {}", endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScheduleError::validation(format!(
                "endpoint scheme '{}' is not supported, use http or https",
                url.scheme()
            )));
        }

        if self.traffic_patterns.is_empty() {
            return Err(ScheduleError::validation(
                "at least one traffic pattern is required",
            ));
        }
        for (index, pattern) in self.traffic_patterns.iter().enumerate() {
            if !pattern.weight.is_finite() || pattern.weight < 0.0 {
                return Err(ScheduleError::validation(format!(
                    "traffic pattern {} has invalid weight {}",
                    index, pattern.weight
                )));
            }
        }
        let total: f64 = self.traffic_patterns.iter().map(|p| p.weight).sum();
        if total <= 0.0 {
            return Err(ScheduleError::validation(
                "traffic pattern weights must sum to more than zero",
            ));
        }
        if !total.is_finite() {
            return Err(ScheduleError::validation(
                "traffic pattern weights must sum to a finite value",
            ));
        }

        if self.load_patterns.is_empty() {
            return Err(ScheduleError::validation(
                "at least one load pattern is required",
            ));
        }
        for (index, pattern) in self.load_patterns.iter().enumerate() {
            pattern.shape.validate().map_err(|message| {
                ScheduleError::validation(format!("load pattern {}: {}", index, message))
            })?;
        }

        Ok(())
    }

    /// Wall-clock length of the run if it is not killed.
    pub fn total_duration(&self) -> Duration {
        self.load_patterns.iter().map(|p| p.duration).sum()
    }

    /// Requests the rate curve asks for over the whole run.
    pub fn expected_requests(&self) -> f64 {
        self.load_patterns
            .iter()
            .map(LoadPattern::expected_requests)
            .sum()
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Killed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Killed => "killed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Killed | RunStatus::Failed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
