//! JSON request and response bodies for the HTTP API.
//!
//! Wire types stay separate from the engine types so that field naming and
//! duration strings are a transport concern only.

use std::time::Duration;

use ddosy_core::{LoadPattern, RateShape, RunId, ScheduleError, ScheduleRequest, TrafficPattern};
use serde::{Deserialize, Serialize};

/// Body of `POST /run`.
///
/// Missing fields deserialize to empty values so that they are reported by
/// request validation rather than by the JSON extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequestBody {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub traffic_patterns: Vec<TrafficPatternBody>,
    #[serde(default)]
    pub load_patterns: Vec<LoadPatternBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficPatternBody {
    pub weight: f64,
    #[serde(default)]
    pub payload: String,
}

/// One rate segment. Exactly one of the shape keys must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadPatternBody {
    /// Human readable, e.g. `"10s"`, `"500ms"` or `"1m 30s"`.
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sinusoidal: Option<SinusoidalBody>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearBody {
    pub start_rate: f64,
    pub end_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinusoidalBody {
    pub base_rate: f64,
    pub amplitude: f64,
    pub period: String,
}

/// Body returned by `POST /run` and `POST /kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdResponse {
    pub id: RunId,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl TryFrom<ScheduleRequestBody> for ScheduleRequest {
    type Error = ScheduleError;

    fn try_from(body: ScheduleRequestBody) -> Result<Self, Self::Error> {
        let traffic_patterns = body
            .traffic_patterns
            .into_iter()
            .map(|p| TrafficPattern::new(p.weight, p.payload))
            .collect();

        let load_patterns = body
            .load_patterns
            .into_iter()
            .enumerate()
            .map(|(index, p)| p.into_load_pattern(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScheduleRequest::new(
            body.endpoint,
            traffic_patterns,
            load_patterns,
        ))
    }
}

impl LoadPatternBody {
    fn into_load_pattern(self, index: usize) -> Result<LoadPattern, ScheduleError> {
        let duration = parse_duration(&self.duration, index, "duration")?;

        let shape = match (self.linear, self.sinusoidal) {
            (Some(linear), None) => RateShape::Linear {
                start_rate: linear.start_rate,
                end_rate: linear.end_rate,
            },
            (None, Some(sine)) => RateShape::Sinusoidal {
                base_rate: sine.base_rate,
                amplitude: sine.amplitude,
                period: parse_duration(&sine.period, index, "period")?,
            },
            (None, None) => {
                return Err(ScheduleError::validation(format!(
                    "load pattern {} has no rate shape",
                    index
                )))
            }
            (Some(_), Some(_)) => {
                return Err(ScheduleError::validation(format!(
                    "load pattern {} has more than one rate shape",
                    index
                )))
            }
        };

        Ok(LoadPattern::new(duration, shape))
    }
}

fn parse_duration(value: &str, index: usize, field: &str) -> Result<Duration, ScheduleError> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        ScheduleError::validation(format!(
            "load pattern {} has invalid {} '{}': {}",
            index, field, value, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> ScheduleRequestBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_linear_body_converts() {
        let request = ScheduleRequest::try_from(body(json!({
            "endpoint": "http://localhost:9000",
            "trafficPatterns": [{ "weight": 1, "payload": "test" }],
            "loadPatterns": [{ "duration": "1s", "linear": { "startRate": 5, "endRate": 10 } }]
        })))
        .unwrap();

        assert_eq!(request.endpoint, "http://localhost:9000");
        assert_eq!(request.traffic_patterns[0].payload.as_ref(), b"test");
        assert_eq!(
            request.load_patterns,
            vec![LoadPattern::linear(Duration::from_secs(1), 5.0, 10.0)]
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_sinusoidal_body_converts() {
        let request = ScheduleRequest::try_from(body(json!({
            "endpoint": "http://localhost:9000",
            "trafficPatterns": [{ "weight": 1, "payload": "x" }],
            "loadPatterns": [{
                "duration": "1m 30s",
                "sinusoidal": { "baseRate": 20, "amplitude": 5, "period": "10s" }
            }]
        })))
        .unwrap();

        let pattern = &request.load_patterns[0];
        assert_eq!(pattern.duration, Duration::from_secs(90));
        assert_eq!(
            pattern.shape,
            RateShape::Sinusoidal {
                base_rate: 20.0,
                amplitude: 5.0,
                period: Duration::from_secs(10),
            }
        );
    }

    #[test]
    fn test_shape_tag_required_exactly_once() {
        let none = ScheduleRequest::try_from(body(json!({
            "endpoint": "http://localhost:9000",
            "loadPatterns": [{ "duration": "1s" }]
        })));
        assert!(matches!(none, Err(ScheduleError::Validation(msg)) if msg.contains("no rate shape")));

        let both = ScheduleRequest::try_from(body(json!({
            "endpoint": "http://localhost:9000",
            "loadPatterns": [{
                "duration": "1s",
                "linear": { "startRate": 1, "endRate": 1 },
                "sinusoidal": { "baseRate": 1, "amplitude": 0, "period": "1s" }
            }]
        })));
        assert!(matches!(both, Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_bad_duration_is_validation_error() {
        let result = ScheduleRequest::try_from(body(json!({
            "endpoint": "http://localhost:9000",
            "loadPatterns": [{ "duration": "-1s", "linear": { "startRate": 1, "endRate": 1 } }]
        })));
        assert!(matches!(result, Err(ScheduleError::Validation(msg)) if msg.contains("duration")));
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let parsed = body(json!({}));
        assert!(parsed.endpoint.is_empty());

        let request = ScheduleRequest::try_from(parsed).unwrap();
        assert!(matches!(request.validate(), Err(ScheduleError::Validation(_))));
    }
}
