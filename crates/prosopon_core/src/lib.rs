//! Shared types for the Prosopon animatronic head.
//!
//! Everything the loops, the arbiter, and the gateway exchange lives here:
//! audio chunks and text events from the speech client, typed control
//! commands from the UI, outbound UI events, and the persisted settings
//! document.

pub mod command;
pub mod event;
pub mod settings;

pub use command::ControlCommand;
pub use event::UiEvent;
pub use settings::{EyeServoCal, Settings};

/// One chunk of raw speech audio from the dialogue client.
///
/// PCM16 mono at the session sample rate (default 24 kHz). Chunks arrive at
/// an irregular cadence, typically every few tens of milliseconds while the
/// assistant is speaking.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Reinterpret little-endian PCM16 bytes as samples. An odd trailing
    /// byte is dropped.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Self { samples }
    }
}

/// Who produced an utterance, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// A transcribed utterance from the speech client. Display-only: the motion
/// pipeline is driven by audio amplitude, not text.
#[derive(Debug, Clone)]
pub struct TextEvent {
    pub speaker: Speaker,
    pub text: String,
}
