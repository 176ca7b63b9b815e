use crate::workout::{estimate_calories, PerformanceMetrics};

const MIN_HEART_RATE: f64 = 60.0;
const MAX_HEART_RATE: f64 = 200.0;
const RESTING_HEART_RATE: f64 = 70.0;
/// Seconds until the warm-up ramp is complete.
const RAMP_SECS: f64 = 300.0;

/// Fallback metrics for one simulation tick while the relay is unreachable.
///
/// Heart rate climbs from 70 to 100 over the first five minutes with a ±10
/// wave on top; pulse follows the same curve with a smaller ramp.
pub fn generate_local_metrics(duration_secs: u64, rep_count: u32, timestamp: i64) -> PerformanceMetrics {
    PerformanceMetrics {
        heart_rate: Some(synthetic_rate(duration_secs, 30.0)),
        pulse: Some(synthetic_rate(duration_secs, 25.0)),
        rep_count: Some(rep_count),
        workout_duration: Some(duration_secs),
        calories_burned: Some(estimate_calories(duration_secs, rep_count)),
        timestamp: Some(timestamp),
    }
}

fn synthetic_rate(duration_secs: u64, ramp: f64) -> u32 {
    let d = duration_secs as f64;
    let raw = RESTING_HEART_RATE + (d / RAMP_SECS).min(1.0) * ramp + (d / 10.0).sin() * 10.0;
    raw.round().clamp(MIN_HEART_RATE, MAX_HEART_RATE) as u32
}
