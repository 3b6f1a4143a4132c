//! Eye behavior: gaze tracking, blinking, face acquisition.
//!
//! The face tracker turns camera frames into a nearest-to-center face
//! position, the gaze mapper turns that position into per-axis servo
//! angles for whatever rig is active, and the blink scheduler overlays
//! transient eyelid closures on top, independent of gaze.

mod blink;
mod gaze;
mod sim;
mod tracker;

pub use blink::{BlinkConfig, BlinkPhase, BlinkScheduler, LidCommand};
pub use gaze::{GazeMapper, GazeTarget};
pub use sim::{SyntheticFaceDetector, SyntheticFrameSource};
pub use tracker::{
    FaceDetector, FaceRect, FaceTracker, Frame, FrameSource, Tracking, FACE_LOST_THRESHOLD,
};
