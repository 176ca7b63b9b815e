use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::exercise::ExerciseType;

use super::metrics::{estimate_calories, PerformanceMetrics};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkoutEvent {
    Started,
    Stopped,
    Paused,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutStats {
    pub duration_seconds: u64,
    pub total_reps: u32,
    pub avg_heart_rate: u32,
    pub calories_burned: u32,
    pub heart_rate_readings: Vec<u32>,
    /// Last positive calorie figure supplied with a metrics snapshot.
    #[serde(skip)]
    pub reported_calories: Option<u32>,
    /// Last duration supplied with a metrics snapshot.
    #[serde(skip)]
    pub reported_duration: Option<u64>,
}

impl WorkoutStats {
    /// Recomputes the derived fields at workout end.
    pub fn finalize(&mut self) {
        if !self.heart_rate_readings.is_empty() {
            let sum: u64 = self.heart_rate_readings.iter().map(|&hr| u64::from(hr)).sum();
            let mean = sum as f64 / self.heart_rate_readings.len() as f64;
            self.avg_heart_rate = mean.round() as u32;
        }

        self.calories_burned = self
            .reported_calories
            .unwrap_or_else(|| estimate_calories(self.duration_seconds, self.total_reps));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: Option<String>,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub rep_count: u32,
    pub exercise_type: ExerciseType,
    /// Latched by the first positive rep count; gates the duration display.
    pub exercise_started: bool,
    pub exercise_started_at: Option<DateTime<Utc>>,
    pub stats: WorkoutStats,
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl Default for WorkoutSession {
    fn default() -> Self {
        Self {
            id: None,
            is_active: false,
            started_at: None,
            rep_count: 0,
            exercise_type: ExerciseType::HrOnly,
            exercise_started: false,
            exercise_started_at: None,
            stats: WorkoutStats::default(),
            running_anchor: None,
        }
    }
}

impl WorkoutSession {
    pub fn new(exercise_type: ExerciseType) -> Self {
        Self {
            exercise_type,
            ..Self::default()
        }
    }

    pub fn begin(&mut self, id: String, start_at: DateTime<Utc>, now: Instant) {
        *self = Self {
            id: Some(id),
            is_active: true,
            started_at: Some(start_at),
            running_anchor: Some(now),
            ..Self::new(self.exercise_type)
        };
    }

    pub fn end(&mut self) {
        self.stats.duration_seconds = self
            .stats
            .reported_duration
            .unwrap_or_else(|| self.elapsed_secs());
        self.stats.total_reps = self.rep_count;
        self.stats.finalize();
        self.is_active = false;
        self.running_anchor = None;
    }

    /// Whole seconds since `begin`, zero when idle.
    pub fn elapsed_secs(&self) -> u64 {
        match (self.is_active, self.running_anchor) {
            (true, Some(anchor)) => anchor.elapsed().as_secs(),
            _ => 0,
        }
    }

    /// Stores an authoritative rep count. Returns true only when it is
    /// strictly greater than the value it replaces; lower values are still
    /// stored.
    pub fn record_rep_count(&mut self, count: u32) -> bool {
        let previous = self.rep_count;
        self.rep_count = count;
        count > previous
    }

    /// Folds a metrics snapshot into the running stats.
    pub fn apply_metrics(&mut self, metrics: &PerformanceMetrics) {
        if let Some(reps) = metrics.rep_count {
            self.stats.total_reps = reps;
            if reps > 0 && !self.exercise_started {
                self.exercise_started = true;
                self.exercise_started_at = Some(Utc::now());
            }
        }

        if let Some(duration) = metrics.workout_duration {
            self.stats.duration_seconds = duration;
            self.stats.reported_duration = Some(duration);
        }

        match metrics.calories_burned.filter(|&calories| calories > 0) {
            Some(calories) => {
                self.stats.reported_calories = Some(calories);
                self.stats.calories_burned = calories;
            }
            None => {
                self.stats.calories_burned = estimate_calories(
                    metrics.workout_duration.unwrap_or(0),
                    metrics.rep_count.unwrap_or(0),
                );
            }
        }

        if let Some(heart_rate) = metrics.heart_rate.filter(|&hr| hr > 0) {
            self.stats.heart_rate_readings.push(heart_rate);
        }
    }

    /// Timer text for the HUD. Stays at "00:00" in heart-rate-only mode and
    /// until the first rep has been seen.
    pub fn display_duration(&self) -> String {
        if self.exercise_type == ExerciseType::HrOnly || !self.exercise_started {
            return "00:00".to_string();
        }
        let secs = self.stats.duration_seconds;
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}
