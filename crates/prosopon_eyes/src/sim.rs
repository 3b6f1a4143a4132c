//! Synthetic camera for servo-less operation and tests.
//!
//! Produces empty frames and a single face that orbits the frame center,
//! so the whole gaze pipeline can run end-to-end with no camera attached.

use crate::tracker::{FaceDetector, FaceRect, Frame, FrameSource};
use anyhow::Result;
use async_trait::async_trait;

/// Frame source that fabricates frames of a fixed size.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    released: bool,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            released: false,
        }
    }
}

impl Default for SyntheticFrameSource {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn grab(&mut self) -> Result<Frame> {
        if self.released {
            anyhow::bail!("synthetic camera released");
        }
        Ok(Frame {
            width: self.width,
            height: self.height,
            data: Vec::new(),
        })
    }

    async fn release(&mut self) {
        self.released = true;
    }
}

/// Detector that reports one face circling the frame center.
pub struct SyntheticFaceDetector {
    tick: u64,
    /// Orbit radius as a fraction of the smaller frame dimension.
    radius_fraction: f32,
}

impl SyntheticFaceDetector {
    pub fn new() -> Self {
        Self {
            tick: 0,
            radius_fraction: 0.3,
        }
    }
}

impl Default for SyntheticFaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceDetector for SyntheticFaceDetector {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRect>> {
        self.tick += 1;
        let theta = self.tick as f32 * 0.05;
        let radius = frame.width.min(frame.height) as f32 * self.radius_fraction;
        let cx = frame.width as f32 / 2.0 + radius * theta.cos();
        let cy = frame.height as f32 / 2.0 + radius * theta.sin();
        let size = 80u32;
        Ok(vec![FaceRect {
            x: (cx as u32).saturating_sub(size / 2),
            y: (cy as u32).saturating_sub(size / 2),
            w: size,
            h: size,
        }])
    }
}
