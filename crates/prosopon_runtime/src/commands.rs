//! Control-command execution.

use crate::face::FaceTracking;
use crate::session::SessionManager;
use crate::state::SpeechState;
use prosopon_core::{ControlCommand, EyeServoCal, Settings, UiEvent};
use prosopon_rig::RigConfig;
use prosopon_servo::{ActuatorArbiter, JawCalibration};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Executes drained control commands against the session, the arbiter,
/// the face tracker, and the settings document. Every settings mutation
/// writes the whole document back to disk.
pub struct CommandExecutor {
    settings: Arc<Mutex<Settings>>,
    settings_path: PathBuf,
    arbiter: Arc<ActuatorArbiter>,
    session: Arc<SessionManager>,
    face: Arc<FaceTracking>,
    speech: Arc<SpeechState>,
    events: broadcast::Sender<UiEvent>,
}

impl CommandExecutor {
    pub fn new(
        settings: Arc<Mutex<Settings>>,
        settings_path: PathBuf,
        arbiter: Arc<ActuatorArbiter>,
        session: Arc<SessionManager>,
        face: Arc<FaceTracking>,
        speech: Arc<SpeechState>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            settings,
            settings_path,
            arbiter,
            session,
            face,
            speech,
            events,
        }
    }

    pub async fn handle(&self, cmd: ControlCommand) {
        tracing::info!("Control: {:?}", cmd);
        match cmd {
            ControlCommand::Start => {
                if let Err(e) = self.session.start().await {
                    tracing::error!("Failed to start speech session: {}", e);
                }
            }
            ControlCommand::Stop => self.session.stop().await,
            ControlCommand::Mute { value } => self.speech.set_muted(value),

            ControlCommand::SetVoice { value } => {
                self.update_settings(|s| s.voice_id = value).await;
            }
            ControlCommand::SetMicrophone { value } => {
                self.update_settings(|s| s.microphone_index = value).await;
            }
            ControlCommand::SetSpeaker { value } => {
                self.update_settings(|s| s.speaker_index = value).await;
            }
            ControlCommand::SetSpeechSpeed { value } => {
                self.update_settings(|s| s.speech_speed = value).await;
            }

            ControlCommand::SetJawStopAngle { value } => {
                self.update_settings(|s| s.jaw_stop_angle = value).await;
                self.sync_jaw_calibration().await;
            }
            ControlCommand::SetJawOpenAngle { value } => {
                self.update_settings(|s| s.jaw_open_angle = value).await;
                self.sync_jaw_calibration().await;
            }
            ControlCommand::SetJawCloseAngle { value } => {
                self.update_settings(|s| s.jaw_close_angle = value).await;
                self.sync_jaw_calibration().await;
            }
            ControlCommand::SetJawPulseDuration { value } => {
                self.update_settings(|s| s.jaw_pulse_duration = value).await;
            }
            ControlCommand::SetJawMinChange { value } => {
                self.update_settings(|s| s.jaw_min_change = value).await;
                self.sync_jaw_calibration().await;
            }

            ControlCommand::TestJaw => {
                // The test sequence sleeps for seconds; run it off the
                // command loop so the queue keeps draining.
                let arbiter = self.arbiter.clone();
                tokio::spawn(async move { arbiter.test_jaw().await });
            }
            ControlCommand::TestEyeServo { channel, angle } => {
                self.arbiter.write_channel_raw(channel, angle).await;
            }
            ControlCommand::SweepEyeServo {
                channel,
                min_angle,
                max_angle,
                center_angle,
            } => {
                let arbiter = self.arbiter.clone();
                tokio::spawn(async move {
                    arbiter
                        .sweep_channel(channel, min_angle, max_angle, center_angle)
                        .await;
                });
            }
            ControlCommand::CenterAllEyes => {
                let rig = self.arbiter.rig();
                let settings = self.settings.lock().await;
                for (_, spec) in rig.axes() {
                    let cal = settings.eye_servo_cal(spec.channel);
                    self.arbiter
                        .write_channel_raw(spec.channel, cal.center_angle)
                        .await;
                }
            }
            ControlCommand::SaveEyeConfig {
                channel,
                min_angle,
                max_angle,
                center_angle,
            } => {
                self.update_settings(|s| {
                    s.set_eye_servo_cal(
                        channel,
                        EyeServoCal {
                            min_angle,
                            max_angle,
                            center_angle,
                        },
                    )
                })
                .await;
            }

            ControlCommand::ToggleFaceTracking { value } => {
                if value {
                    let camera_index = self.settings.lock().await.camera_index;
                    match self.face.start(camera_index, &self.arbiter).await {
                        Ok(()) => {
                            self.update_settings(|s| s.face_tracking_enabled = true).await;
                            let _ = self.events.send(UiEvent::FaceTracking { enabled: true });
                        }
                        Err(e) => {
                            tracing::error!("Failed to start face tracking: {}", e);
                            let _ = self.events.send(UiEvent::FaceTracking { enabled: false });
                        }
                    }
                } else {
                    self.face.stop(&self.arbiter).await;
                    self.update_settings(|s| s.face_tracking_enabled = false).await;
                    let _ = self.events.send(UiEvent::FaceTracking { enabled: false });
                }
            }
            ControlCommand::SetRig { value } => {
                self.update_settings(|s| s.rig = value.clone()).await;
                self.arbiter.set_rig(RigConfig::by_name(&value)).await;
                self.restart_tracking_if_live().await;
            }
            ControlCommand::SetCameraIndex { value } => {
                self.update_settings(|s| s.camera_index = value).await;
                self.restart_tracking_if_live().await;
            }
        }
    }

    /// Mutate the settings document and persist it in full.
    async fn update_settings(&self, mutate: impl FnOnce(&mut Settings)) {
        let mut settings = self.settings.lock().await;
        mutate(&mut settings);
        if let Err(e) = settings.save(&self.settings_path) {
            tracing::warn!("Failed to save settings: {}", e);
        }
    }

    async fn sync_jaw_calibration(&self) {
        let settings = self.settings.lock().await;
        self.arbiter.set_jaw_calibration(JawCalibration {
            open_angle: settings.jaw_open_angle,
            close_angle: settings.jaw_close_angle,
            min_change: settings.jaw_min_change,
        });
    }

    async fn restart_tracking_if_live(&self) {
        if !self.face.is_enabled() {
            return;
        }
        let camera_index = self.settings.lock().await.camera_index;
        if let Err(e) = self.face.restart(camera_index, &self.arbiter).await {
            tracing::error!("Failed to restart face tracking: {}", e);
            let _ = self.events.send(UiEvent::FaceTracking { enabled: false });
        }
    }
}
