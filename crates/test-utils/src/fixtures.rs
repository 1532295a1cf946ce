//! JSON request body fixtures for the HTTP API.

use serde_json::{json, Value};

/// `POST /run` body with a single payload at a constant rate.
pub fn constant_rate_body(endpoint: &str, rate: f64, duration: &str) -> Value {
    json!({
        "endpoint": endpoint,
        "trafficPatterns": [{ "weight": 1, "payload": "test" }],
        "loadPatterns": [{
            "duration": duration,
            "linear": { "startRate": rate, "endRate": rate }
        }]
    })
}

/// `POST /run` body ramping linearly from `start_rate` to `end_rate`.
pub fn ramp_body(endpoint: &str, start_rate: f64, end_rate: f64, duration: &str) -> Value {
    json!({
        "endpoint": endpoint,
        "trafficPatterns": [{ "weight": 1, "payload": "test" }],
        "loadPatterns": [{
            "duration": duration,
            "linear": { "startRate": start_rate, "endRate": end_rate }
        }]
    })
}

/// `POST /run` body with two weighted payloads, `A` and `B`.
pub fn weighted_body(endpoint: &str, weight_a: f64, weight_b: f64, rate: f64, duration: &str) -> Value {
    json!({
        "endpoint": endpoint,
        "trafficPatterns": [
            { "weight": weight_a, "payload": "A" },
            { "weight": weight_b, "payload": "B" }
        ],
        "loadPatterns": [{
            "duration": duration,
            "linear": { "startRate": rate, "endRate": rate }
        }]
    })
}
