//! Face-tracking lifecycle.

use prosopon_eyes::{BlinkScheduler, FaceDetector, FaceTracker, FrameSource};
use prosopon_servo::ActuatorArbiter;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Opens the camera for a given device index and pairs it with a face
/// detector. Camera drivers live outside this crate; opening may fail,
/// and the failure is surfaced to the caller, never fatal to the process.
pub type CameraFactory = Box<
    dyn Fn(u32) -> anyhow::Result<(Box<dyn FrameSource>, Box<dyn FaceDetector>)> + Send + Sync,
>;

/// Owns the face tracker and blink scheduler for the face loop, and the
/// start/stop transitions the command loop drives.
pub struct FaceTracking {
    factory: CameraFactory,
    enabled: AtomicBool,
    pub(crate) tracker: Mutex<Option<FaceTracker>>,
    pub(crate) blink: Mutex<BlinkScheduler>,
}

impl FaceTracking {
    pub fn new(factory: CameraFactory, blink: BlinkScheduler) -> Self {
        Self {
            factory,
            enabled: AtomicBool::new(false),
            tracker: Mutex::new(None),
            blink: Mutex::new(blink),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Open the camera and start tracking. On failure the camera stays
    /// closed and tracking stays disabled; the caller reports the status.
    pub async fn start(&self, camera_index: u32, arbiter: &ActuatorArbiter) -> anyhow::Result<()> {
        let mut guard = self.tracker.lock().await;
        if guard.is_some() {
            tracing::warn!("Face tracking already running");
            return Ok(());
        }
        let (source, detector) = (self.factory)(camera_index)?;
        *guard = Some(FaceTracker::new(source, detector));
        drop(guard);

        arbiter.center_axes().await;
        self.enabled.store(true, Ordering::Relaxed);
        tracing::info!("Face tracking started on camera {}", camera_index);
        Ok(())
    }

    /// Release the camera and recenter every eye and eyelid channel.
    pub async fn stop(&self, arbiter: &ActuatorArbiter) {
        self.enabled.store(false, Ordering::Relaxed);
        let mut guard = self.tracker.lock().await;
        if let Some(mut tracker) = guard.take() {
            tracker.release().await;
        }
        drop(guard);

        arbiter.center_axes().await;
        tracing::info!("Face tracking stopped");
    }

    /// Stop then start with a fresh camera. Used when the rig or camera
    /// index changes while tracking is live.
    pub async fn restart(&self, camera_index: u32, arbiter: &ActuatorArbiter) -> anyhow::Result<()> {
        self.stop(arbiter).await;
        self.start(camera_index, arbiter).await
    }
}
