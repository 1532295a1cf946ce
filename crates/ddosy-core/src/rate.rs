//! Rate shapes and emission timing.
//!
//! A segment's shape maps elapsed time to a target rate in requests per
//! second. Emission `n` (1-based) of a segment fires at the instant `t_n`
//! where the integral of the rate from the segment start reaches `n`, so
//! every sub-interval `[a, b]` receives `∫ rate` requests rather than the
//! segment's average. Instants are derived from the cumulative count, not by
//! summing gaps, so rounding error does not accumulate over long segments.

use std::f64::consts::PI;
use std::time::Duration;

/// Slack allowed when comparing an emission instant to the segment end.
const END_TOLERANCE_SECS: f64 = 1e-9;

/// Slack, in requests, when checking whether a segment owes request `n`.
const COUNT_SLACK: f64 = 1e-9;

/// Rounding allowance on the linear discriminant before it counts as negative.
const DISCRIMINANT_SLACK: f64 = 1e-9;

/// Bisection iterations for shapes without a closed-form inverse.
const MAX_BISECTION_STEPS: u32 = 100;

/// Target rate curve for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateShape {
    /// Rate moves linearly from `start_rate` to `end_rate` over the segment.
    Linear { start_rate: f64, end_rate: f64 },

    /// `base_rate + amplitude * sin(2πt / period)`.
    Sinusoidal {
        base_rate: f64,
        amplitude: f64,
        period: Duration,
    },
}

impl RateShape {
    /// Constant rate over the whole segment.
    pub fn constant(rate: f64) -> Self {
        Self::Linear {
            start_rate: rate,
            end_rate: rate,
        }
    }

    /// Check that the shape never produces a negative or non-finite rate.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Linear {
                start_rate,
                end_rate,
            } => {
                if !start_rate.is_finite() || start_rate < 0.0 {
                    return Err(format!("start rate must be >= 0, got {}", start_rate));
                }
                if !end_rate.is_finite() || end_rate < 0.0 {
                    return Err(format!("end rate must be >= 0, got {}", end_rate));
                }
            }
            Self::Sinusoidal {
                base_rate,
                amplitude,
                period,
            } => {
                if !base_rate.is_finite() || base_rate < 0.0 {
                    return Err(format!("base rate must be >= 0, got {}", base_rate));
                }
                if !amplitude.is_finite() || amplitude < 0.0 {
                    return Err(format!("amplitude must be >= 0, got {}", amplitude));
                }
                if amplitude > base_rate {
                    return Err(format!(
                        "amplitude {} exceeds base rate {}, rate would go negative",
                        amplitude, base_rate
                    ));
                }
                if period.is_zero() {
                    return Err("period must be greater than zero".to_string());
                }
            }
        }
        Ok(())
    }

    /// Instantaneous rate `t` seconds into a segment lasting `duration` seconds.
    pub fn rate_at(&self, t: f64, duration: f64) -> f64 {
        match *self {
            Self::Linear {
                start_rate,
                end_rate,
            } => {
                if duration <= 0.0 {
                    return start_rate;
                }
                start_rate + (end_rate - start_rate) * t / duration
            }
            Self::Sinusoidal {
                base_rate,
                amplitude,
                period,
            } => base_rate + amplitude * (2.0 * PI * t / period.as_secs_f64()).sin(),
        }
    }

    /// Number of requests owed between the segment start and `t`.
    pub fn cumulative(&self, t: f64, duration: f64) -> f64 {
        match *self {
            Self::Linear {
                start_rate,
                end_rate,
            } => {
                if duration <= 0.0 {
                    return 0.0;
                }
                let slope = (end_rate - start_rate) / duration;
                start_rate * t + 0.5 * slope * t * t
            }
            Self::Sinusoidal {
                base_rate,
                amplitude,
                period,
            } => {
                let p = period.as_secs_f64();
                base_rate * t + amplitude * p / (2.0 * PI) * (1.0 - (2.0 * PI * t / p).cos())
            }
        }
    }

    /// Seconds from the segment start at which emission `n` (1-based) is due,
    /// or `None` if the curve never accumulates `n` requests.
    ///
    /// `after` is the instant of emission `n - 1`; it bounds the search for
    /// shapes solved numerically and is ignored by closed-form ones.
    pub fn emission_time(&self, n: u64, after: f64, duration: f64) -> Option<f64> {
        if duration <= 0.0 || n == 0 {
            return None;
        }
        match *self {
            Self::Linear {
                start_rate,
                end_rate,
            } => linear_emission_time(start_rate, end_rate, n as f64, duration),
            Self::Sinusoidal { .. } => self.solve_emission_time(n as f64, after, duration),
        }
    }

    /// Invert the cumulative count by bisection on `[after, duration]`.
    fn solve_emission_time(&self, target: f64, after: f64, duration: f64) -> Option<f64> {
        if self.cumulative(duration, duration) + COUNT_SLACK < target {
            return None;
        }
        let mut lo = after.clamp(0.0, duration);
        let mut hi = duration;
        for _ in 0..MAX_BISECTION_STEPS {
            if hi - lo <= END_TOLERANCE_SECS {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if self.cumulative(mid, duration) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(hi)
    }
}

/// Solve `s·t + k·t²/2 = n` for the smallest non-negative `t`, with
/// `k = (end - start) / duration`.
///
/// Uses `2n / (s + sqrt(s² + 2kn))`, which is the usual quadratic root
/// rearranged to avoid cancellation when `k` is small.
fn linear_emission_time(start: f64, end: f64, n: f64, duration: f64) -> Option<f64> {
    let slope = (end - start) / duration;
    if slope == 0.0 {
        if start <= 0.0 {
            return None;
        }
        return Some(n / start);
    }

    let discriminant = start * start + 2.0 * slope * n;
    if discriminant < -DISCRIMINANT_SLACK {
        // Rate reaches zero before the next request is owed.
        return None;
    }
    let denominator = start + discriminant.max(0.0).sqrt();
    if denominator <= 0.0 {
        return None;
    }
    Some(2.0 * n / denominator)
}

/// A rate segment: a shape applied for a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPattern {
    pub duration: Duration,
    pub shape: RateShape,
}

impl LoadPattern {
    pub fn new(duration: Duration, shape: RateShape) -> Self {
        Self { duration, shape }
    }

    pub fn linear(duration: Duration, start_rate: f64, end_rate: f64) -> Self {
        Self::new(
            duration,
            RateShape::Linear {
                start_rate,
                end_rate,
            },
        )
    }

    /// Offsets from the segment start of every emission in this segment.
    pub fn emissions(&self) -> EmissionSchedule {
        EmissionSchedule {
            shape: self.shape,
            duration: self.duration.as_secs_f64(),
            emitted: 0,
            last: 0.0,
        }
    }

    /// Expected number of emissions over the whole segment.
    pub fn expected_requests(&self) -> f64 {
        let d = self.duration.as_secs_f64();
        self.shape.cumulative(d, d)
    }
}

/// Iterator over the emission offsets of one segment.
#[derive(Debug, Clone)]
pub struct EmissionSchedule {
    shape: RateShape,
    duration: f64,
    emitted: u64,
    last: f64,
}

impl Iterator for EmissionSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let n = self.emitted + 1;
        let t = self.shape.emission_time(n, self.last, self.duration)?;
        if !t.is_finite() || t > self.duration + END_TOLERANCE_SECS {
            return None;
        }
        let t = t.clamp(self.last, self.duration);
        self.emitted = n;
        self.last = t;
        Some(Duration::from_secs_f64(t))
    }
}
