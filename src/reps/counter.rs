use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::exercise::ExerciseType;
use crate::pose::{names, PoseFrame};

/// Body-scale divisor for the height-difference metrics, in pixels.
const HEIGHT_NORMALIZER: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExercisePhase {
    #[default]
    Neutral,
    /// Curled, raised, or down depending on the exercise.
    Engaged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Above(f64),
    Below(f64),
}

impl Bound {
    fn crossed_by(&self, metric: f64) -> bool {
        match *self {
            Bound::Above(limit) => metric > limit,
            Bound::Below(limit) => metric < limit,
        }
    }
}

/// Engage/release pair for one exercise's engagement metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    engage: Bound,
    release: Bound,
}

impl Thresholds {
    pub fn for_exercise(exercise: ExerciseType) -> Option<Self> {
        match exercise {
            ExerciseType::HrOnly => None,
            ExerciseType::BicepCurls => Some(Self {
                engage: Bound::Above(0.3),
                release: Bound::Below(0.1),
            }),
            ExerciseType::LateralRaises => Some(Self {
                engage: Bound::Above(0.3),
                release: Bound::Below(-0.3),
            }),
            ExerciseType::Squats => Some(Self {
                engage: Bound::Below(-0.3),
                release: Bound::Above(0.3),
            }),
        }
    }

    pub fn engages(&self, metric: f64) -> bool {
        self.engage.crossed_by(metric)
    }

    pub fn releases(&self, metric: f64) -> bool {
        self.release.crossed_by(metric)
    }
}

/// Scalar the rep state machine runs on, or `None` when a required keypoint
/// is missing or below the confidence floor.
pub fn engagement_metric(pose: &PoseFrame, exercise: ExerciseType) -> Option<f64> {
    match exercise {
        ExerciseType::HrOnly => None,
        ExerciseType::BicepCurls => {
            let shoulder = pose.usable(names::LEFT_SHOULDER)?;
            let elbow = pose.usable(names::LEFT_ELBOW)?;
            let wrist = pose.usable(names::LEFT_WRIST)?;

            let upper_arm = (elbow.x - shoulder.x, elbow.y - shoulder.y);
            let forearm = (wrist.x - elbow.x, wrist.y - elbow.y);
            let raw = forearm.1.atan2(forearm.0) - upper_arm.1.atan2(upper_arm.0);
            // fold into [-PI, PI] so the result stays in [0, 1]
            let folded = (raw + PI).rem_euclid(TAU) - PI;
            Some(folded.abs() / PI)
        }
        ExerciseType::LateralRaises => {
            let shoulder_y = (pose.usable(names::LEFT_SHOULDER)?.y
                + pose.usable(names::RIGHT_SHOULDER)?.y)
                / 2.0;
            let wrist_y =
                (pose.usable(names::LEFT_WRIST)?.y + pose.usable(names::RIGHT_WRIST)?.y) / 2.0;
            Some((shoulder_y - wrist_y) / HEIGHT_NORMALIZER)
        }
        ExerciseType::Squats => {
            let hip_y = (pose.usable(names::LEFT_HIP)?.y + pose.usable(names::RIGHT_HIP)?.y) / 2.0;
            let knee_y =
                (pose.usable(names::LEFT_KNEE)?.y + pose.usable(names::RIGHT_KNEE)?.y) / 2.0;
            Some((knee_y - hip_y) / HEIGHT_NORMALIZER)
        }
    }
}

/// Hysteresis rep counter.
///
/// A rep is the Mealy action on the release transition:
/// `Neutral -(engage)-> Engaged -(release, count += 1)-> Neutral`.
/// Frames without the needed keypoints leave both phase and count untouched,
/// so a dropped frame never loses a rep in progress.
#[derive(Debug, Clone, Default)]
pub struct RepCounter {
    last_rep_count: u32,
    phase: ExercisePhase,
    exercise: Option<ExerciseType>,
}

impl RepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_reps(&mut self, pose: &PoseFrame, exercise: ExerciseType) -> u32 {
        if self.exercise != Some(exercise) {
            // count survives an exercise switch, the half-finished movement does not
            self.phase = ExercisePhase::Neutral;
            self.exercise = Some(exercise);
        }

        let Some(thresholds) = Thresholds::for_exercise(exercise) else {
            return self.last_rep_count;
        };
        let Some(metric) = engagement_metric(pose, exercise) else {
            return self.last_rep_count;
        };

        self.step(metric, thresholds);
        self.last_rep_count
    }

    fn step(&mut self, metric: f64, thresholds: Thresholds) {
        match self.phase {
            ExercisePhase::Neutral if thresholds.engages(metric) => {
                self.phase = ExercisePhase::Engaged;
            }
            ExercisePhase::Engaged if thresholds.releases(metric) => {
                self.last_rep_count += 1;
                self.phase = ExercisePhase::Neutral;
            }
            _ => {}
        }
    }

    pub fn last_rep_count(&self) -> u32 {
        self.last_rep_count
    }

    pub fn phase(&self) -> ExercisePhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.last_rep_count = 0;
        self.phase = ExercisePhase::Neutral;
    }
}
