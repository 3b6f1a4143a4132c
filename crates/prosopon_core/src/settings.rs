//! Persisted settings document.
//!
//! A flat key-value document merged over built-in defaults at load and
//! written back to disk in full whenever any setting changes. Env vars
//! override the file on load.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-channel eye-servo calibration saved from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeServoCal {
    pub min_angle: f32,
    pub max_angle: f32,
    pub center_angle: f32,
}

impl Default for EyeServoCal {
    fn default() -> Self {
        Self {
            min_angle: 0.0,
            max_angle: 180.0,
            center_angle: 90.0,
        }
    }
}

/// The full settings document. Missing keys take their defaults, so old
/// settings files keep loading after new fields are added.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub voice_id: String,
    pub microphone_index: Option<u32>,
    pub speaker_index: Option<u32>,
    /// Display scroll speed for the spoken-text ticker, chars/sec.
    pub speech_speed: u32,
    /// Jaw servo rest angle while idle.
    pub jaw_stop_angle: f32,
    /// Jaw servo angle at 100% mouth opening.
    pub jaw_open_angle: f32,
    /// Jaw servo angle at 0% mouth opening.
    pub jaw_close_angle: f32,
    /// Pulse length for continuous-rotation jaw hardware, seconds.
    pub jaw_pulse_duration: f32,
    /// Minimum jaw angle delta before a hardware write is issued, degrees.
    pub jaw_min_change: f32,
    pub face_tracking_enabled: bool,
    /// Rig catalog name: "inmoov", "original", or "simple".
    pub rig: String,
    pub camera_index: u32,
    /// Saved min/center/max calibration, keyed by channel number.
    pub eye_servos: BTreeMap<String, EyeServoCal>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_id: "matthew".to_string(),
            microphone_index: None,
            speaker_index: None,
            speech_speed: 17,
            jaw_stop_angle: 0.0,
            jaw_open_angle: 100.0,
            jaw_close_angle: 0.0,
            jaw_pulse_duration: 0.08,
            jaw_min_change: 2.0,
            face_tracking_enabled: true,
            rig: "inmoov".to_string(),
            camera_index: 0,
            eye_servos: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Unknown fields are ignored and
    /// missing fields fall back to defaults. Env overrides are applied
    /// after loading.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read settings file: {}", path.as_ref().display())
        })?;
        let mut settings: Settings =
            serde_json::from_str(&content).with_context(|| "Failed to parse settings JSON")?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::info!("Settings file not found or invalid ({}), using defaults", e);
                let mut s = Self::default();
                s.apply_env_overrides();
                s
            }
        }
    }

    /// Write the whole document back to disk. Always a full rewrite, never
    /// incremental.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings dir: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content).with_context(|| {
            format!("Failed to write settings file: {}", path.as_ref().display())
        })?;
        tracing::debug!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROSOPON_RIG") {
            self.rig = v;
        }
        if let Ok(v) = std::env::var("PROSOPON_CAMERA_INDEX") {
            if let Ok(n) = v.parse() {
                self.camera_index = n;
            }
        }
        if let Ok(v) = std::env::var("PROSOPON_VOICE_ID") {
            self.voice_id = v;
        }
    }

    /// Saved calibration for a channel, defaults when never calibrated.
    pub fn eye_servo_cal(&self, channel: u8) -> EyeServoCal {
        self.eye_servos
            .get(&channel.to_string())
            .copied()
            .unwrap_or_default()
    }

    pub fn set_eye_servo_cal(&mut self, channel: u8, cal: EyeServoCal) {
        self.eye_servos.insert(channel.to_string(), cal);
    }
}
