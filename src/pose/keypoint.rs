use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Keypoints scoring below this are ignored by geometric analysis.
pub const MIN_KEYPOINT_CONFIDENCE: f64 = 0.3;

/// BlazePose landmark names used by the rep counters.
pub mod names {
    pub const LEFT_SHOULDER: &str = "left_shoulder";
    pub const RIGHT_SHOULDER: &str = "right_shoulder";
    pub const LEFT_ELBOW: &str = "left_elbow";
    pub const RIGHT_ELBOW: &str = "right_elbow";
    pub const LEFT_WRIST: &str = "left_wrist";
    pub const RIGHT_WRIST: &str = "right_wrist";
    pub const LEFT_HIP: &str = "left_hip";
    pub const RIGHT_HIP: &str = "right_hip";
    pub const LEFT_KNEE: &str = "left_knee";
    pub const RIGHT_KNEE: &str = "right_knee";
}

/// A single landmark in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    pub score: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, score: f64) -> Self {
        Self { x, y, z: None, score }
    }

    pub fn is_usable(&self) -> bool {
        self.score >= MIN_KEYPOINT_CONFIDENCE
    }
}

/// One detection tick worth of keypoints. Never mutated by the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub keypoints: HashMap<String, Keypoint>,
    pub score: f64,
}

impl PoseFrame {
    pub fn new(score: f64) -> Self {
        Self {
            keypoints: HashMap::new(),
            score,
        }
    }

    pub fn with_keypoint(mut self, name: &str, keypoint: Keypoint) -> Self {
        self.keypoints.insert(name.to_string(), keypoint);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.get(name)
    }

    /// The keypoint, if present and confident enough for geometry.
    pub fn usable(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.get(name).filter(|kp| kp.is_usable())
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
