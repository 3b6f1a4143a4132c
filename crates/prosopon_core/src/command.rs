//! Typed control commands from the visualization UI.
//!
//! The wire format is a single generic `{action, value, ...}` JSON object;
//! parsing it into a closed enum lets the command loop branch on kind
//! instead of string-matching action names.

use serde::{Deserialize, Serialize};

/// A user-issued control action. Arrives over the gateway WebSocket and is
/// drained by the command loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Start a speech session.
    Start,
    /// Stop the active speech session.
    Stop,
    Mute {
        value: bool,
    },
    SetVoice {
        value: String,
    },
    SetMicrophone {
        value: Option<u32>,
    },
    SetSpeaker {
        value: Option<u32>,
    },
    SetSpeechSpeed {
        value: u32,
    },
    SetJawStopAngle {
        value: f32,
    },
    SetJawOpenAngle {
        value: f32,
    },
    SetJawCloseAngle {
        value: f32,
    },
    SetJawPulseDuration {
        value: f32,
    },
    SetJawMinChange {
        value: f32,
    },
    /// Run the close/open/close jaw test sequence.
    TestJaw,
    /// Move one eye servo to a fixed angle.
    TestEyeServo {
        channel: u8,
        angle: f32,
    },
    /// Sweep one eye servo min -> max -> center.
    SweepEyeServo {
        channel: u8,
        min_angle: f32,
        max_angle: f32,
        center_angle: f32,
    },
    /// Move every eye servo to its saved center angle.
    CenterAllEyes,
    /// Persist min/center/max calibration for one channel.
    SaveEyeConfig {
        channel: u8,
        min_angle: f32,
        max_angle: f32,
        center_angle: f32,
    },
    ToggleFaceTracking {
        value: bool,
    },
    SetRig {
        value: String,
    },
    SetCameraIndex {
        value: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_action() {
        let cmd: ControlCommand = serde_json::from_str(r#"{"action":"start"}"#).unwrap();
        assert_eq!(cmd, ControlCommand::Start);
    }

    #[test]
    fn test_parse_value_action() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"action":"set_voice","value":"amy"}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::SetVoice {
                value: "amy".to_string()
            }
        );
    }

    #[test]
    fn test_parse_eye_servo_action() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"action":"test_eye_servo","channel":4,"angle":72.5}"#)
                .unwrap();
        assert_eq!(
            cmd,
            ControlCommand::TestEyeServo {
                channel: 4,
                angle: 72.5
            }
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<ControlCommand, _> =
            serde_json::from_str(r#"{"action":"self_destruct"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip() {
        let cmd = ControlCommand::SaveEyeConfig {
            channel: 2,
            min_angle: 10.0,
            max_angle: 170.0,
            center_angle: 88.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ControlCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
