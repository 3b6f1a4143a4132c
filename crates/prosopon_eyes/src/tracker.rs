//! Face acquisition and selection.

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// How long a face must stay lost before callers typically recenter.
/// Informational: the tracker reports loss duration, callers decide.
pub const FACE_LOST_THRESHOLD: Duration = Duration::from_secs(2);

/// One captured camera frame. Pixel data is opaque to the tracker; only
/// the detector interprets it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FaceRect {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// Camera abstraction. The actual driver lives outside this crate; tests
/// and servo-less operation use the synthetic implementation.
#[async_trait]
pub trait FrameSource: Send {
    async fn grab(&mut self) -> Result<Frame>;
    /// Release the underlying device. Called when tracking stops.
    async fn release(&mut self);
}

/// Face-detection primitive over one frame.
#[async_trait]
pub trait FaceDetector: Send {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRect>>;
}

/// Result of one tracking call.
#[derive(Debug, Clone)]
pub enum Tracking {
    Found {
        center: (u32, u32),
        frame_width: u32,
        frame_height: u32,
        rect: FaceRect,
    },
    Lost {
        /// Where the face was last seen, if it ever was.
        last_center: Option<(u32, u32)>,
        /// Cumulative time since the face disappeared.
        lost_for: Duration,
    },
}

impl Tracking {
    /// Whether the loss has outlasted [`FACE_LOST_THRESHOLD`].
    pub fn long_lost(&self) -> bool {
        matches!(self, Tracking::Lost { lost_for, .. } if *lost_for >= FACE_LOST_THRESHOLD)
    }
}

/// Grabs frames, runs detection, and keeps the nearest-to-center face.
pub struct FaceTracker {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FaceDetector>,
    last_center: Option<(u32, u32)>,
    lost_since: Option<Instant>,
}

impl FaceTracker {
    pub fn new(source: Box<dyn FrameSource>, detector: Box<dyn FaceDetector>) -> Self {
        Self {
            source,
            detector,
            last_center: None,
            lost_since: None,
        }
    }

    /// Acquire one frame and locate the face nearest the frame center.
    pub async fn track(&mut self) -> Result<Tracking> {
        let frame = self.source.grab().await?;
        let faces = self.detector.detect(&frame).await?;

        match nearest_to_center(&faces, frame.width, frame.height) {
            Some(rect) => {
                let center = rect.center();
                self.last_center = Some(center);
                self.lost_since = None;
                Ok(Tracking::Found {
                    center,
                    frame_width: frame.width,
                    frame_height: frame.height,
                    rect,
                })
            }
            None => {
                if self.lost_since.is_none() {
                    tracing::debug!("Face lost, holding last known position");
                }
                let since = *self.lost_since.get_or_insert_with(Instant::now);
                Ok(Tracking::Lost {
                    last_center: self.last_center,
                    lost_for: since.elapsed(),
                })
            }
        }
    }

    /// Release the camera and forget tracking state.
    pub async fn release(&mut self) {
        self.source.release().await;
        self.last_center = None;
        self.lost_since = None;
        tracing::info!("Camera released");
    }
}

/// Pick the detection whose center is nearest the frame's geometric
/// center. Strict `<` keeps the first detection on ties, matching the
/// detector's return order.
fn nearest_to_center(faces: &[FaceRect], frame_width: u32, frame_height: u32) -> Option<FaceRect> {
    let cx = f64::from(frame_width) / 2.0;
    let cy = f64::from(frame_height) / 2.0;

    let mut best: Option<(FaceRect, f64)> = None;
    for face in faces {
        let (fx, fy) = face.center();
        let dx = f64::from(fx) - cx;
        let dy = f64::from(fy) - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((*face, dist)),
        }
    }
    best.map(|(rect, _)| rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFrames;

    #[async_trait]
    impl FrameSource for FixedFrames {
        async fn grab(&mut self) -> Result<Frame> {
            Ok(Frame {
                width: 640,
                height: 480,
                data: Vec::new(),
            })
        }
        async fn release(&mut self) {}
    }

    /// Returns each scripted detection list once, then empties.
    struct ScriptedDetector {
        script: Vec<Vec<FaceRect>>,
    }

    #[async_trait]
    impl FaceDetector for ScriptedDetector {
        async fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRect>> {
            if self.script.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(self.script.remove(0))
            }
        }
    }

    fn rect_centered_at(x: u32, y: u32) -> FaceRect {
        FaceRect {
            x: x.saturating_sub(20),
            y: y.saturating_sub(20),
            w: 40,
            h: 40,
        }
    }

    #[test]
    fn test_nearest_face_wins() {
        // Frame center is (320, 240): one face 10px away, one 50px away.
        let near = rect_centered_at(330, 240);
        let far = rect_centered_at(370, 240);
        let picked = nearest_to_center(&[far, near], 640, 480).unwrap();
        assert_eq!(picked, near);
    }

    #[test]
    fn test_tie_keeps_first_detection() {
        let left = rect_centered_at(310, 240);
        let right = rect_centered_at(330, 240);
        // Both 10px from center; detector order decides.
        let picked = nearest_to_center(&[left, right], 640, 480).unwrap();
        assert_eq!(picked, left);
    }

    #[test]
    fn test_no_faces_selects_none() {
        assert!(nearest_to_center(&[], 640, 480).is_none());
    }

    #[tokio::test]
    async fn test_track_reports_found_then_lost() {
        let detector = ScriptedDetector {
            script: vec![vec![rect_centered_at(300, 200)]],
        };
        let mut tracker = FaceTracker::new(Box::new(FixedFrames), Box::new(detector));

        match tracker.track().await.unwrap() {
            Tracking::Found { center, .. } => assert_eq!(center, (300, 200)),
            other => panic!("expected Found, got {:?}", other),
        }

        // Script exhausted: the face is gone, last position retained.
        match tracker.track().await.unwrap() {
            Tracking::Lost {
                last_center,
                lost_for,
            } => {
                assert_eq!(last_center, Some((300, 200)));
                assert!(lost_for < FACE_LOST_THRESHOLD);
            }
            other => panic!("expected Lost, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reacquisition_clears_loss_state() {
        let detector = ScriptedDetector {
            script: vec![
                vec![rect_centered_at(300, 200)],
                vec![],
                vec![rect_centered_at(350, 250)],
            ],
        };
        let mut tracker = FaceTracker::new(Box::new(FixedFrames), Box::new(detector));

        tracker.track().await.unwrap();
        assert!(matches!(
            tracker.track().await.unwrap(),
            Tracking::Lost { .. }
        ));

        match tracker.track().await.unwrap() {
            Tracking::Found { center, .. } => assert_eq!(center, (350, 250)),
            other => panic!("expected Found, got {:?}", other),
        }
        assert!(tracker.lost_since.is_none());
    }

    #[tokio::test]
    async fn test_release_forgets_state() {
        let detector = ScriptedDetector {
            script: vec![vec![rect_centered_at(300, 200)]],
        };
        let mut tracker = FaceTracker::new(Box::new(FixedFrames), Box::new(detector));
        tracker.track().await.unwrap();
        tracker.release().await;
        assert!(tracker.last_center.is_none());
    }
}
