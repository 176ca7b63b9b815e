use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::exercise::ExerciseType;
use crate::pose::{names, Keypoint, PoseFrame};

/// Ticks spent in each half of a synthetic repetition.
const TICKS_PER_HALF_REP: u64 = 2;
const JITTER_PX: f64 = 3.0;
const SCORE: f64 = 0.9;

/// Generates keypoint frames that move through an exercise, for driving the
/// rep counter while no camera or relay data is available.
///
/// The motion holds the released posture for two ticks, then the engaged
/// posture for two ticks, so the counter completes one rep every four ticks.
pub struct SyntheticMotion {
    tick: u64,
    rng: StdRng,
}

impl Default for SyntheticMotion {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMotion {
    pub fn new() -> Self {
        Self {
            tick: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            tick: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn restart(&mut self) {
        self.tick = 0;
    }

    pub fn next_frame(&mut self, exercise: ExerciseType) -> PoseFrame {
        let engaged = (self.tick / TICKS_PER_HALF_REP) % 2 == 1;
        self.tick += 1;

        let points: Vec<(&str, f64, f64)> = match exercise {
            ExerciseType::HrOnly => Vec::new(),
            ExerciseType::BicepCurls => {
                let (ex, ey) = (300.0, 300.0);
                let heading = if engaged { PI / 2.0 - 0.6 * PI } else { PI / 2.0 };
                vec![
                    (names::LEFT_SHOULDER, 300.0, 200.0),
                    (names::LEFT_ELBOW, ex, ey),
                    (
                        names::LEFT_WRIST,
                        ex + 100.0 * heading.cos(),
                        ey + 100.0 * heading.sin(),
                    ),
                ]
            }
            ExerciseType::LateralRaises => {
                let wrist_y = if engaged { 140.0 } else { 320.0 };
                vec![
                    (names::LEFT_SHOULDER, 250.0, 200.0),
                    (names::RIGHT_SHOULDER, 350.0, 200.0),
                    (names::LEFT_WRIST, 150.0, wrist_y),
                    (names::RIGHT_WRIST, 450.0, wrist_y),
                ]
            }
            ExerciseType::Squats => {
                let (hip_y, knee_y) = if engaged { (420.0, 360.0) } else { (300.0, 420.0) };
                vec![
                    (names::LEFT_HIP, 270.0, hip_y),
                    (names::RIGHT_HIP, 330.0, hip_y),
                    (names::LEFT_KNEE, 260.0, knee_y),
                    (names::RIGHT_KNEE, 340.0, knee_y),
                ]
            }
        };

        let mut frame = PoseFrame::new(SCORE);
        for (name, x, y) in points {
            let jx = self.rng.gen_range(-JITTER_PX..=JITTER_PX);
            let jy = self.rng.gen_range(-JITTER_PX..=JITTER_PX);
            frame = frame.with_keypoint(name, Keypoint::new(x + jx, y + jy, SCORE));
        }
        frame
    }
}
