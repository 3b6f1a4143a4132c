//! The actuator arbiter.

use crate::bus::{ServoBus, ServoError};
use arc_swap::ArcSwap;
use prosopon_core::event::PositionRecord;
use prosopon_rig::{Axis, RigConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// The jaw lives outside the rig's own channel numbering.
pub const JAW_CHANNEL: u8 = 8;

/// Position table key for the jaw channel.
const JAW_KEY: &str = "jaw";

/// Hard bounds for any servo on the bus.
const SERVO_MIN_DEG: f32 = 0.0;
const SERVO_MAX_DEG: f32 = 180.0;

/// Last accepted angle per actuator, keyed by actuator name.
pub type PositionTable = BTreeMap<String, PositionRecord>;

/// Jaw-channel calibration, adjustable from the UI at runtime.
#[derive(Debug, Clone, Copy)]
pub struct JawCalibration {
    /// Servo angle at 100% mouth opening.
    pub open_angle: f32,
    /// Servo angle at 0% mouth opening.
    pub close_angle: f32,
    /// Deadband: minimum angle delta before a hardware write is issued.
    pub min_change: f32,
}

impl Default for JawCalibration {
    fn default() -> Self {
        Self {
            open_angle: 100.0,
            close_angle: 0.0,
            min_change: 2.0,
        }
    }
}

impl JawCalibration {
    /// Linear interpolation from opening percent to servo angle.
    pub fn angle_for_opening(&self, percent: f32) -> f32 {
        self.close_angle + (self.open_angle - self.close_angle) * (percent / 100.0)
    }
}

struct Inner {
    positions: PositionTable,
    /// Estimated jaw angle: the last commanded value, not a read-back.
    /// Servos on this bus are write-only, so long-session drift between
    /// commanded and physical position is accepted.
    jaw_angle: f32,
}

/// Owns the authoritative actuator position table and the only path to
/// the servo bus.
///
/// One instance per process, shared by handle across every control loop.
/// All writes to one channel are linearized behind a single lock; the jaw
/// channel additionally passes a deadband filter so noise-sized
/// corrections never buzz the motor. Gaze and eyelid channels are not
/// deadbanded; tracking precision matters more there.
///
/// A write failing with a disconnection-shaped error flips the arbiter
/// into simulation mode for the rest of the process: the table keeps
/// updating, the bus is never touched again.
pub struct ActuatorArbiter {
    bus: Arc<dyn ServoBus>,
    rig: ArcSwap<RigConfig>,
    jaw_cal: ArcSwap<JawCalibration>,
    inner: Mutex<Inner>,
    hardware_ok: AtomicBool,
    snapshot_tx: watch::Sender<PositionTable>,
}

impl ActuatorArbiter {
    pub fn new(bus: Arc<dyn ServoBus>, rig: RigConfig, jaw_cal: JawCalibration) -> Self {
        let mut positions = PositionTable::new();
        for (axis, spec) in rig.axes() {
            positions.insert(axis.name().to_string(), record(spec.default));
        }
        positions.insert(JAW_KEY.to_string(), record(jaw_cal.close_angle));

        let (snapshot_tx, _) = watch::channel(positions.clone());
        Self {
            bus,
            rig: ArcSwap::from_pointee(rig),
            jaw_cal: ArcSwap::from_pointee(jaw_cal),
            inner: Mutex::new(Inner {
                positions,
                jaw_angle: jaw_cal.close_angle,
            }),
            hardware_ok: AtomicBool::new(true),
            snapshot_tx,
        }
    }

    /// Latest position table, pushed on every accepted write. Reading
    /// never blocks a control loop.
    pub fn subscribe(&self) -> watch::Receiver<PositionTable> {
        self.snapshot_tx.subscribe()
    }

    pub fn rig(&self) -> Arc<RigConfig> {
        self.rig.load_full()
    }

    /// Swap the active rig. New axes are seeded into the table at their
    /// defaults; stale entries are left for the UI to age out.
    pub async fn set_rig(&self, rig: RigConfig) {
        let mut inner = self.inner.lock().await;
        for (axis, spec) in rig.axes() {
            inner
                .positions
                .entry(axis.name().to_string())
                .or_insert_with(|| record(spec.default));
        }
        self.rig.store(Arc::new(rig));
        self.snapshot_tx.send_replace(inner.positions.clone());
    }

    pub fn jaw_calibration(&self) -> JawCalibration {
        **self.jaw_cal.load()
    }

    pub fn set_jaw_calibration(&self, cal: JawCalibration) {
        self.jaw_cal.store(Arc::new(cal));
    }

    /// False once the bus has disconnected; the process stays in
    /// simulation mode until restart.
    pub fn hardware_available(&self) -> bool {
        self.hardware_ok.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> PositionTable {
        self.inner.lock().await.positions.clone()
    }

    /// Estimated jaw angle (last commanded).
    pub async fn jaw_angle(&self) -> f32 {
        self.inner.lock().await.jaw_angle
    }

    /// Jaw write from a mouth-opening percentage. Deadband-filtered:
    /// requests whose angle delta since the last accepted jaw write stays
    /// within `min_change` are dropped entirely.
    pub async fn set_jaw_opening(&self, percent: f32) {
        let cal = self.jaw_calibration();
        let target = cal.angle_for_opening(percent.clamp(0.0, 100.0));

        let mut inner = self.inner.lock().await;
        if (target - inner.jaw_angle).abs() <= cal.min_change {
            return;
        }
        let angle = target.clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
        self.commit(&mut inner, JAW_KEY, JAW_CHANNEL, angle).await;
        inner.jaw_angle = angle;
    }

    /// Direct jaw write, no deadband. Used by the close ramps and the
    /// jaw test where every step is intentional.
    pub async fn set_jaw_angle(&self, angle: f32) {
        let angle = angle.clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
        let mut inner = self.inner.lock().await;
        self.commit(&mut inner, JAW_KEY, JAW_CHANNEL, angle).await;
        inner.jaw_angle = angle;
    }

    /// Write one gaze/lid axis, clamped to the rig's configured range.
    /// Axes the active rig does not have are ignored.
    pub async fn set_axis(&self, axis: Axis, angle: f32) {
        let rig = self.rig.load_full();
        let Some(spec) = rig.spec(axis) else {
            tracing::debug!("rig '{}' has no axis {}", rig.name(), axis.name());
            return;
        };
        let clamped = spec.clamp(angle);
        let channel = spec.channel;
        let mut inner = self.inner.lock().await;
        self.commit(&mut inner, axis.name(), channel, clamped).await;
    }

    /// Write one tracking tick's gaze batch under a single lock, so a
    /// snapshot never observes one eye updated and the other stale.
    pub async fn set_axes(&self, batch: &BTreeMap<Axis, f32>) {
        let rig = self.rig.load_full();
        let mut inner = self.inner.lock().await;
        for (&axis, &angle) in batch {
            let Some(spec) = rig.spec(axis) else {
                continue;
            };
            let clamped = spec.clamp(angle);
            self.commit(&mut inner, axis.name(), spec.channel, clamped)
                .await;
        }
    }

    /// Every eyelid to its configured closed angle. A whole, intentional
    /// state change: no deadband applies on these channels.
    pub async fn close_lids(&self) {
        let rig = self.rig.load_full();
        let mut inner = self.inner.lock().await;
        for (axis, spec) in rig.lids() {
            if let Some(closed) = spec.closed {
                self.commit(&mut inner, axis.name(), spec.channel, closed)
                    .await;
            }
        }
    }

    /// Every eyelid back to its rig default.
    pub async fn open_lids(&self) {
        let rig = self.rig.load_full();
        let mut inner = self.inner.lock().await;
        for (axis, spec) in rig.lids() {
            self.commit(&mut inner, axis.name(), spec.channel, spec.default)
                .await;
        }
    }

    /// Every rig axis to its default angle.
    pub async fn center_axes(&self) {
        let rig = self.rig.load_full();
        let mut inner = self.inner.lock().await;
        for (axis, spec) in rig.axes() {
            self.commit(&mut inner, axis.name(), spec.channel, spec.default)
                .await;
        }
    }

    /// Ramp the jaw closed: 10 interpolation steps over ~200 ms, then a
    /// final hold at the closed angle. Smooth on the mechanism where an
    /// abrupt jump would clack.
    pub async fn close_jaw_smooth(&self) {
        let cal = self.jaw_calibration();
        let start = self.jaw_angle().await;
        let steps = 10;
        for i in 1..=steps {
            let angle = start + (cal.close_angle - start) * (i as f32 / steps as f32);
            self.set_jaw_angle(angle).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.set_jaw_angle(cal.close_angle).await;
    }

    /// Repeated closed writes in rapid succession. Terminal guarantee on
    /// session stop: a servo that misses one command still gets the rest.
    pub async fn slam_jaw_closed(&self, repeats: usize) {
        let cal = self.jaw_calibration();
        for _ in 0..repeats {
            self.set_jaw_angle(cal.close_angle).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Manual close/open/close test sequence from the UI.
    pub async fn test_jaw(&self) {
        let cal = self.jaw_calibration();
        self.set_jaw_angle(cal.close_angle).await;
        tokio::time::sleep(Duration::from_millis(800)).await;
        self.set_jaw_angle(cal.open_angle).await;
        tokio::time::sleep(Duration::from_millis(800)).await;
        self.set_jaw_angle(cal.close_angle).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    /// Raw channel write for calibration. Clamped to the physical servo
    /// range only; recorded in the table when the channel maps to a rig
    /// axis, otherwise transient.
    pub async fn write_channel_raw(&self, channel: u8, angle: f32) {
        let angle = angle.clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
        let rig = self.rig.load_full();
        let name = rig
            .axes()
            .find(|(_, spec)| spec.channel == channel)
            .map(|(axis, _)| axis.name());

        let mut inner = self.inner.lock().await;
        match name {
            Some(name) => self.commit(&mut inner, name, channel, angle).await,
            None => {
                self.dispatch(channel, angle).await;
            }
        }
    }

    /// Calibration sweep: min, then 20 steps to max, then center.
    pub async fn sweep_channel(&self, channel: u8, min: f32, max: f32, center: f32) {
        self.write_channel_raw(channel, min).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let steps = 20;
        for i in 0..=steps {
            let angle = min + (max - min) * (i as f32 / steps as f32);
            self.write_channel_raw(channel, angle).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.write_channel_raw(channel, center).await;
    }

    /// Accepted write: dispatch to the bus (unless degraded), update the
    /// table, mirror the snapshot to subscribers.
    async fn commit(&self, inner: &mut Inner, name: &str, channel: u8, angle: f32) {
        self.dispatch(channel, angle).await;
        inner.positions.insert(name.to_string(), record(angle));
        self.snapshot_tx.send_replace(inner.positions.clone());
    }

    /// Fire-and-forget hardware write. Disconnection flips the
    /// process-wide simulation flag; any failure is logged, never fatal.
    async fn dispatch(&self, channel: u8, angle: f32) {
        if !self.hardware_ok.load(Ordering::Relaxed) {
            return;
        }
        match self.bus.write(channel, angle).await {
            Ok(()) => {}
            Err(ServoError::Disconnected(msg)) => {
                self.hardware_ok.store(false, Ordering::Relaxed);
                tracing::warn!(
                    "Servo bus '{}' disconnected ({}), degrading to simulation for the rest of the process",
                    self.bus.name(),
                    msg
                );
            }
            Err(e) => {
                tracing::warn!("Servo write ch{} {:.1}deg failed: {}", channel, angle, e);
            }
        }
    }
}

fn record(angle: f32) -> PositionRecord {
    PositionRecord {
        angle,
        written_at: chrono::Utc::now().timestamp_millis(),
    }
}
