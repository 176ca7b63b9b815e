use serde::{Deserialize, Serialize};

/// Metrics snapshot, either authoritative from the relay
/// (`performance_metrics`, `biometric_data`) or produced by the local
/// fallback generator. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Fallback calorie estimate: `round(duration * 0.1 + reps * 0.5)`.
pub fn estimate_calories(duration_secs: u64, reps: u32) -> u32 {
    (duration_secs as f64 * 0.1 + reps as f64 * 0.5).round() as u32
}
