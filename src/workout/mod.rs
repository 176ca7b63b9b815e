pub mod metrics;
pub mod state;

pub use metrics::{estimate_calories, PerformanceMetrics};
pub use state::{WorkoutEvent, WorkoutSession, WorkoutStats};
