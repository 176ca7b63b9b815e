use log::info;

use crate::exercise::ExerciseType;
use crate::workout::{PerformanceMetrics, WorkoutEvent};

use super::connection::ConnectionStatus;
use super::messages::FeedbackSignal;

/// Callbacks the rendering/UI layer registers with the relay client.
///
/// Invoked after the client's state lock is released, in the order the
/// underlying events happened. Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    fn on_rep_counted(&self, _count: u32) {}

    fn on_metrics_update(&self, _metrics: &PerformanceMetrics) {}

    fn on_exercise_state_change(&self, _event: WorkoutEvent) {}

    /// Only `GoodForm` / `BadForm` reach observers.
    fn on_feedback(&self, _signal: &FeedbackSignal) {}

    fn on_exercise_selected(&self, _exercise: ExerciseType) {}

    fn on_connection_change(&self, _status: ConnectionStatus) {}
}

pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Writes every callback to the log; used by the headless binary.
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_rep_counted(&self, count: u32) {
        info!("Rep {count} completed!");
    }

    fn on_metrics_update(&self, metrics: &PerformanceMetrics) {
        info!(
            "Metrics: hr={:?} reps={:?} duration={:?}s calories={:?}",
            metrics.heart_rate, metrics.rep_count, metrics.workout_duration, metrics.calories_burned
        );
    }

    fn on_exercise_state_change(&self, event: WorkoutEvent) {
        info!("Workout {event:?}");
    }

    fn on_feedback(&self, signal: &FeedbackSignal) {
        info!("Form feedback: {}", signal.as_str());
    }

    fn on_exercise_selected(&self, exercise: ExerciseType) {
        info!("Exercise selected: {}", exercise.display_name());
    }

    fn on_connection_change(&self, status: ConnectionStatus) {
        info!("Relay: {}", status.text());
    }
}
