//! The four control loops.

use crate::commands::CommandExecutor;
use crate::face::FaceTracking;
use crate::state::{MouthTracker, SpeechState};
use prosopon_core::{AudioChunk, ControlCommand, Speaker, TextEvent, UiEvent};
use prosopon_eyes::{GazeMapper, LidCommand, Tracking};
use prosopon_mouth::Viseme;
use prosopon_servo::ActuatorArbiter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Loop cadences and thresholds.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Face-tracking poll cadence (~30 Hz).
    pub face_interval: Duration,
    /// Speech-end watchdog cadence (~10 Hz).
    pub watchdog_interval: Duration,
    /// Command-queue drain cadence (~20 Hz).
    pub command_interval: Duration,
    /// Silence gap after which the watchdog declares speech ended.
    pub speech_end_timeout: Duration,
    /// How long a loop sleeps after a failed iteration.
    pub error_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            face_interval: Duration::from_millis(33),
            watchdog_interval: Duration::from_millis(100),
            command_interval: Duration::from_millis(50),
            speech_end_timeout: Duration::from_millis(500),
            error_backoff: Duration::from_millis(500),
        }
    }
}

/// Handles to the running loops plus their shutdown signal.
///
/// The loops are independent tasks on independent cadences; the position
/// table behind the arbiter is the only state they share. No loop ever
/// exits on a single iteration's failure.
pub struct ControlLoopSet {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ControlLoopSet {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: RuntimeConfig,
        audio_rx: mpsc::Receiver<AudioChunk>,
        text_rx: mpsc::Receiver<TextEvent>,
        command_rx: mpsc::Receiver<ControlCommand>,
        tracker: Arc<Mutex<MouthTracker>>,
        speech: Arc<SpeechState>,
        arbiter: Arc<ActuatorArbiter>,
        face: Arc<FaceTracking>,
        executor: Arc<CommandExecutor>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = vec![
            spawn_speech_loop(
                audio_rx,
                text_rx,
                tracker.clone(),
                speech.clone(),
                arbiter.clone(),
                events.clone(),
                shutdown_rx.clone(),
            ),
            spawn_face_loop(
                config.clone(),
                face,
                arbiter.clone(),
                events.clone(),
                shutdown_rx.clone(),
            ),
            spawn_watchdog_loop(
                config.clone(),
                tracker,
                speech,
                arbiter.clone(),
                events.clone(),
                shutdown_rx.clone(),
            ),
            spawn_command_loop(config, command_rx, executor, shutdown_rx.clone()),
            spawn_position_mirror(arbiter, events, shutdown_rx),
        ];

        Self {
            handles,
            shutdown_tx,
        }
    }

    /// Signal every loop to exit and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Speech/jaw loop: one iteration per audio chunk. Cadence is whatever
/// the speech client delivers, typically tens of milliseconds.
fn spawn_speech_loop(
    mut audio_rx: mpsc::Receiver<AudioChunk>,
    mut text_rx: mpsc::Receiver<TextEvent>,
    tracker: Arc<Mutex<MouthTracker>>,
    speech: Arc<SpeechState>,
    arbiter: Arc<ActuatorArbiter>,
    events: broadcast::Sender<UiEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current_text = String::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                maybe_text = text_rx.recv() => {
                    let Some(text) = maybe_text else { break };
                    match text.speaker {
                        Speaker::Assistant => {
                            tracing::info!("Assistant: {}", text.text);
                            current_text = text.text;
                        }
                        Speaker::User => tracing::info!("User: {}", text.text),
                    }
                }

                maybe_chunk = audio_rx.recv() => {
                    let Some(chunk) = maybe_chunk else { break };
                    speech.stamp_audio().await;

                    let (opening, viseme) = tracker.lock().await.process(&chunk.samples);
                    speech.set_speaking(opening > 3.0);
                    arbiter.set_jaw_opening(opening).await;

                    let _ = events.send(UiEvent::Mouth {
                        viseme: viseme.as_str().to_string(),
                        text: current_text.clone(),
                    });
                }
            }
        }
        tracing::debug!("Speech loop stopped");
    })
}

/// Face-tracking loop at a fixed polling cadence. One tick either updates
/// every gaze axis or none: the batch is computed in full before any
/// write, and a failed detection leaves the previous gaze in place.
fn spawn_face_loop(
    config: RuntimeConfig,
    face: Arc<FaceTracking>,
    arbiter: Arc<ActuatorArbiter>,
    events: broadcast::Sender<UiEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.face_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if !face.is_enabled() {
                continue;
            }

            let tracking = {
                let mut guard = face.tracker.lock().await;
                let Some(tracker) = guard.as_mut() else {
                    continue;
                };
                tracker.track().await
            };

            match tracking {
                Ok(Tracking::Found {
                    center,
                    frame_width,
                    frame_height,
                    ..
                }) => {
                    let rig = arbiter.rig();
                    let target =
                        GazeMapper::map(center.0, center.1, frame_width, frame_height, &rig);
                    arbiter.set_axes(&target).await;

                    let angles: BTreeMap<String, f32> = target
                        .iter()
                        .map(|(axis, angle)| (axis.name().to_string(), *angle))
                        .collect();
                    let _ = events.send(UiEvent::Eyes { angles });

                    let lid_command = face.blink.lock().await.poll(false);
                    match lid_command {
                        Some(LidCommand::Close) => {
                            arbiter.close_lids().await;
                            let _ = events.send(UiEvent::Blink);
                        }
                        Some(LidCommand::Reopen) => arbiter.open_lids().await,
                        None => {}
                    }
                }
                Ok(Tracking::Lost { lost_for, .. }) => {
                    // Hold the last gaze; whether to recenter after a long
                    // loss is this caller's policy, and holding reads more
                    // naturally on a physical head.
                    tracing::trace!("Face lost for {:.1}s", lost_for.as_secs_f32());
                }
                Err(e) => {
                    tracing::warn!("Face tracking iteration failed: {}", e);
                    tokio::time::sleep(config.error_backoff).await;
                }
            }
        }
        tracing::debug!("Face loop stopped");
    })
}

/// Speech-end watchdog: declares speech over when no chunk has arrived
/// within the timeout, then owns the jaw for one smooth close. It only
/// writes after clearing the speaking gate itself, so it never races the
/// speech loop for the channel.
fn spawn_watchdog_loop(
    config: RuntimeConfig,
    tracker: Arc<Mutex<MouthTracker>>,
    speech: Arc<SpeechState>,
    arbiter: Arc<ActuatorArbiter>,
    events: broadcast::Sender<UiEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.watchdog_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            if speech.is_speaking() && speech.since_last_audio().await > config.speech_end_timeout
            {
                tracing::info!(
                    "Speech ended ({}ms since last chunk), closing jaw",
                    speech.since_last_audio().await.as_millis()
                );
                speech.set_speaking(false);
                tracker.lock().await.reset();
                let _ = events.send(UiEvent::Mouth {
                    viseme: Viseme::Closed.as_str().to_string(),
                    text: String::new(),
                });
                arbiter.close_jaw_smooth().await;
            }
        }
        tracing::debug!("Watchdog loop stopped");
    })
}

/// Command loop: drains the user-command queue at a fixed cadence.
fn spawn_command_loop(
    config: RuntimeConfig,
    mut command_rx: mpsc::Receiver<ControlCommand>,
    executor: Arc<CommandExecutor>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.command_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            while let Ok(cmd) = command_rx.try_recv() {
                executor.handle(cmd).await;
            }
        }
        tracing::debug!("Command loop stopped");
    })
}

/// Mirrors accepted arbiter writes to the visualization as full position
/// snapshots. Watch semantics: a slow UI sees the latest table, never a
/// backlog.
fn spawn_position_mirror(
    arbiter: Arc<ActuatorArbiter>,
    events: broadcast::Sender<UiEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut positions = arbiter.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                changed = positions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let table = positions.borrow_and_update().clone();
                    let _ = events.send(UiEvent::Positions { table });
                }
            }
        }
        tracing::debug!("Position mirror stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::CameraFactory;
    use crate::session::{Session, SessionFactory, SessionManager};
    use prosopon_core::Settings;
    use prosopon_eyes::{
        BlinkConfig, BlinkScheduler, FaceDetector, FrameSource, SyntheticFaceDetector,
        SyntheticFrameSource,
    };
    use prosopon_mouth::EnvelopeConfig;
    use prosopon_rig::RigConfig;
    use prosopon_servo::{JawCalibration, SimulatedBus, JAW_CHANNEL};

    struct Harness {
        loops: ControlLoopSet,
        bus: Arc<SimulatedBus>,
        audio_tx: mpsc::Sender<AudioChunk>,
        command_tx: mpsc::Sender<ControlCommand>,
        events: broadcast::Sender<UiEvent>,
        face: Arc<FaceTracking>,
        arbiter: Arc<ActuatorArbiter>,
        speech: Arc<SpeechState>,
        _dir: tempfile::TempDir,
    }

    fn harness(config: RuntimeConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(SimulatedBus::new());
        let arbiter = Arc::new(ActuatorArbiter::new(
            bus.clone(),
            RigConfig::inmoov(),
            JawCalibration::default(),
        ));
        let (events, _) = broadcast::channel(256);

        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (text_tx, text_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(16);

        let speech = Arc::new(SpeechState::new());
        let tracker = Arc::new(Mutex::new(MouthTracker::plain(EnvelopeConfig::default())));

        let session_factory: SessionFactory =
            Box::new(|_a, _t| Ok(Session { tasks: Vec::new() }));
        let session = Arc::new(SessionManager::new(
            session_factory,
            audio_tx.clone(),
            text_tx.clone(),
            speech.clone(),
            tracker.clone(),
            arbiter.clone(),
            events.clone(),
        ));

        let camera_factory: CameraFactory = Box::new(|_| {
            Ok((
                Box::new(SyntheticFrameSource::default()) as Box<dyn FrameSource>,
                Box::new(SyntheticFaceDetector::new()) as Box<dyn FaceDetector>,
            ))
        });
        let face = Arc::new(FaceTracking::new(
            camera_factory,
            BlinkScheduler::new(BlinkConfig::default()),
        ));

        let executor = Arc::new(CommandExecutor::new(
            Arc::new(Mutex::new(Settings::default())),
            dir.path().join("settings.json"),
            arbiter.clone(),
            session,
            face.clone(),
            speech.clone(),
            events.clone(),
        ));

        let loops = ControlLoopSet::spawn(
            config,
            audio_rx,
            text_rx,
            command_rx,
            tracker,
            speech.clone(),
            arbiter.clone(),
            face.clone(),
            executor,
            events.clone(),
        );

        Harness {
            loops,
            bus,
            audio_tx,
            command_tx,
            events,
            face,
            arbiter,
            speech,
            _dir: dir,
        }
    }

    fn loud_chunk() -> AudioChunk {
        AudioChunk::new(vec![16_384; 1024])
    }

    fn silent_chunk() -> AudioChunk {
        AudioChunk::new(vec![0; 1024])
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[tokio::test]
    async fn test_silent_audio_never_moves_the_jaw() {
        let h = harness(RuntimeConfig::default());
        let mut events = h.events.subscribe();

        h.audio_tx.send(silent_chunk()).await.unwrap();
        settle().await;

        // Opening 0 equals the seeded jaw estimate: deadband suppresses
        // the write entirely.
        assert!(h
            .bus
            .writes()
            .iter()
            .all(|(ch, _)| *ch != JAW_CHANNEL));

        // The UI still hears about the (closed) mouth.
        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(&event, UiEvent::Mouth { viseme, .. } if viseme == "CLOSED") {
                saw_closed = true;
            }
        }
        assert!(saw_closed);
        h.loops.shutdown().await;
    }

    #[tokio::test]
    async fn test_loud_audio_opens_jaw_to_wide() {
        let h = harness(RuntimeConfig::default());
        let mut events = h.events.subscribe();

        for _ in 0..6 {
            h.audio_tx.send(loud_chunk()).await.unwrap();
        }
        settle().await;

        assert!(h.speech.is_speaking());
        let jaw_writes: Vec<f32> = h
            .bus
            .writes()
            .iter()
            .filter(|(ch, _)| *ch == JAW_CHANNEL)
            .map(|(_, angle)| *angle)
            .collect();
        assert!(!jaw_writes.is_empty());
        assert!(*jaw_writes.last().unwrap() > 70.0);

        let mut saw_wide = false;
        while let Ok(event) = events.try_recv() {
            if matches!(&event, UiEvent::Mouth { viseme, .. } if viseme == "WIDE") {
                saw_wide = true;
            }
        }
        assert!(saw_wide, "viseme never reached WIDE");
        h.loops.shutdown().await;
    }

    #[tokio::test]
    async fn test_watchdog_closes_jaw_after_silence() {
        let config = RuntimeConfig {
            watchdog_interval: Duration::from_millis(20),
            speech_end_timeout: Duration::from_millis(80),
            ..RuntimeConfig::default()
        };
        let h = harness(config);

        for _ in 0..6 {
            h.audio_tx.send(loud_chunk()).await.unwrap();
        }
        settle().await;
        assert!(h.speech.is_speaking());

        // No more audio: the watchdog declares speech over and ramps the
        // jaw closed (smooth close takes ~200ms on its own).
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!h.speech.is_speaking());
        assert_eq!(h.arbiter.jaw_angle().await, 0.0);
        h.loops.shutdown().await;
    }

    #[tokio::test]
    async fn test_face_loop_drives_gaze_batches() {
        let h = harness(RuntimeConfig::default());

        h.command_tx
            .send(ControlCommand::ToggleFaceTracking { value: true })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(h.face.is_enabled());

        // Starting tracking centers the rig (8 writes); the orbiting
        // synthetic face must keep producing gaze batches beyond that.
        let eye_writes = h
            .bus
            .writes()
            .iter()
            .filter(|(ch, _)| *ch <= 7)
            .count();
        assert!(
            eye_writes > RigConfig::inmoov().servo_count() + 8,
            "only {} eye writes observed",
            eye_writes
        );
        h.loops.shutdown().await;
    }

    #[tokio::test]
    async fn test_command_queue_drains() {
        let h = harness(RuntimeConfig::default());
        h.command_tx
            .send(ControlCommand::TestEyeServo {
                channel: 2,
                angle: 77.0,
            })
            .await
            .unwrap();
        settle().await;
        assert!(h.bus.writes().contains(&(2, 77.0)));
        h.loops.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_loops() {
        let h = harness(RuntimeConfig::default());
        h.loops.shutdown().await;
        // Loops are gone; a fresh command is simply never drained.
        h.command_tx
            .send(ControlCommand::TestEyeServo {
                channel: 0,
                angle: 90.0,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.bus.writes().contains(&(0, 90.0)));
    }
}
