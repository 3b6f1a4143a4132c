//! Outbound events for the visualization transport.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One actuator's last accepted position, as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub angle: f32,
    /// Unix millis of the last accepted write.
    pub written_at: i64,
}

/// Events pushed to every connected visualization client. Delivery is
/// best-effort: a slow or absent client never blocks a control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Current mouth shape plus the text being spoken.
    Mouth { viseme: String, text: String },
    /// Per-axis eye angles from one tracking tick.
    Eyes { angles: BTreeMap<String, f32> },
    /// A blink was triggered.
    Blink,
    /// Face tracking was enabled or disabled.
    FaceTracking { enabled: bool },
    /// Snapshot of the full actuator position table.
    Positions {
        table: BTreeMap<String, PositionRecord>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouth_event_wire_format() {
        let event = UiEvent::Mouth {
            viseme: "WIDE".to_string(),
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"mouth""#));
        assert!(json.contains(r#""viseme":"WIDE""#));
    }

    #[test]
    fn test_eyes_event_round_trip() {
        let mut angles = BTreeMap::new();
        angles.insert("left_eye_x".to_string(), 92.5);
        let event = UiEvent::Eyes { angles };
        let json = serde_json::to_string(&event).unwrap();
        let back: UiEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
