mod counter;
mod synthetic;

pub use counter::{engagement_metric, ExercisePhase, RepCounter, Thresholds};
pub use synthetic::SyntheticMotion;
