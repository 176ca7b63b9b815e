use std::collections::{HashMap, VecDeque};

use super::{Keypoint, PoseFrame};

const DEFAULT_HISTORY: usize = 5;

/// Moving-average smoother over the most recent detection frames.
///
/// Low-confidence keypoints are dropped before they enter the history, and
/// each keypoint of the newest frame is averaged over the frames that contain
/// it. Keypoints missing from the newest frame are not resurrected.
pub struct PoseSmoother {
    history: VecDeque<PoseFrame>,
    capacity: usize,
}

impl Default for PoseSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl PoseSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: &PoseFrame) -> PoseFrame {
        let filtered = PoseFrame {
            keypoints: frame
                .keypoints
                .iter()
                .filter(|(_, kp)| kp.is_usable())
                .map(|(name, kp)| (name.clone(), *kp))
                .collect(),
            score: frame.score,
        };

        self.history.push_back(filtered);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        self.smoothed()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn smoothed(&self) -> PoseFrame {
        let Some(latest) = self.history.back() else {
            return PoseFrame::default();
        };

        let mut keypoints = HashMap::with_capacity(latest.keypoints.len());
        for name in latest.keypoints.keys() {
            let samples: Vec<&Keypoint> = self
                .history
                .iter()
                .filter_map(|frame| frame.keypoints.get(name))
                .collect();
            let n = samples.len() as f64;

            let has_depth = samples.iter().any(|kp| kp.z.is_some());
            let averaged = Keypoint {
                x: samples.iter().map(|kp| kp.x).sum::<f64>() / n,
                y: samples.iter().map(|kp| kp.y).sum::<f64>() / n,
                z: has_depth
                    .then(|| samples.iter().map(|kp| kp.z.unwrap_or(0.0)).sum::<f64>() / n),
                score: samples.iter().map(|kp| kp.score).sum::<f64>() / n,
            };
            keypoints.insert(name.clone(), averaged);
        }

        PoseFrame {
            keypoints,
            score: latest.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::names;

    fn frame_with_wrist(y: f64, score: f64) -> PoseFrame {
        PoseFrame::new(0.9).with_keypoint(names::LEFT_WRIST, Keypoint::new(10.0, y, score))
    }

    #[test]
    fn averages_over_the_window() {
        let mut smoother = PoseSmoother::new(3);
        smoother.push(&frame_with_wrist(100.0, 0.9));
        smoother.push(&frame_with_wrist(200.0, 0.9));
        let out = smoother.push(&frame_with_wrist(300.0, 0.9));
        assert_eq!(out.get(names::LEFT_WRIST).unwrap().y, 200.0);

        // oldest sample (100) falls out
        let out = smoother.push(&frame_with_wrist(400.0, 0.9));
        assert_eq!(out.get(names::LEFT_WRIST).unwrap().y, 300.0);
        assert_eq!(smoother.len(), 3);
    }

    #[test]
    fn drops_low_confidence_points() {
        let mut smoother = PoseSmoother::default();
        smoother.push(&frame_with_wrist(100.0, 0.9));
        let out = smoother.push(&frame_with_wrist(500.0, 0.1));
        assert!(out.get(names::LEFT_WRIST).is_none());
    }

    #[test]
    fn averages_only_frames_containing_the_point() {
        let mut smoother = PoseSmoother::default();
        smoother.push(&frame_with_wrist(100.0, 0.9));
        smoother.push(&PoseFrame::new(0.5));
        let out = smoother.push(&frame_with_wrist(300.0, 0.9));
        assert_eq!(out.get(names::LEFT_WRIST).unwrap().y, 200.0);
        assert_eq!(out.get(names::LEFT_WRIST).unwrap().z, None);
    }
}
