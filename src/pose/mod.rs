mod keypoint;
mod smoothing;

pub use keypoint::{names, Keypoint, PoseFrame, MIN_KEYPOINT_CONFIDENCE};
pub use smoothing::PoseSmoother;
