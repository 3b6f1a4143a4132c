//! Shared speech state and the mouth-tracker selection.

use prosopon_mouth::{EnvelopeConfig, EnvelopeTracker, SpectralEnvelopeTracker, Viseme};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

/// The speaking gate shared between the speech loop and the watchdog.
///
/// The jaw channel has exactly one logical owner at a time: the speech
/// loop while this gate is up, the watchdog once it has taken it down.
/// The watchdog only writes after clearing the gate itself, so the two
/// never fight over the jaw in the same instant.
pub struct SpeechState {
    speaking: AtomicBool,
    muted: AtomicBool,
    last_audio: RwLock<Instant>,
}

impl SpeechState {
    pub fn new() -> Self {
        Self {
            speaking: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            last_audio: RwLock::new(Instant::now()),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub async fn stamp_audio(&self) {
        *self.last_audio.write().await = Instant::now();
    }

    pub async fn since_last_audio(&self) -> std::time::Duration {
        self.last_audio.read().await.elapsed()
    }
}

impl Default for SpeechState {
    fn default() -> Self {
        Self::new()
    }
}

/// The envelope tracker the speech loop runs: plain amplitude, or the
/// frequency-weighted variant layered on top of it.
pub enum MouthTracker {
    Plain(EnvelopeTracker),
    Spectral(SpectralEnvelopeTracker),
}

impl MouthTracker {
    pub fn plain(config: EnvelopeConfig) -> Self {
        Self::Plain(EnvelopeTracker::new(config))
    }

    pub fn spectral(config: EnvelopeConfig) -> Self {
        Self::Spectral(SpectralEnvelopeTracker::new(config))
    }

    pub fn process(&mut self, samples: &[i16]) -> (f32, Viseme) {
        match self {
            Self::Plain(tracker) => {
                let opening = tracker.process(samples);
                (opening, tracker.viseme())
            }
            Self::Spectral(tracker) => tracker.process(samples),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Plain(tracker) => tracker.reset(),
            Self::Spectral(tracker) => tracker.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_flips() {
        let state = SpeechState::new();
        assert!(!state.is_speaking());
        state.set_speaking(true);
        assert!(state.is_speaking());
        state.set_speaking(false);
        assert!(!state.is_speaking());
    }

    #[tokio::test]
    async fn test_audio_stamp_resets_elapsed() {
        let state = SpeechState::new();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        state.stamp_audio().await;
        assert!(state.since_last_audio().await < std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_both_tracker_variants_share_the_envelope() {
        let chunk = vec![16_384i16; 1024];
        let mut plain = MouthTracker::plain(EnvelopeConfig::default());
        let mut spectral = MouthTracker::spectral(EnvelopeConfig::default());
        let (a, _) = plain.process(&chunk);
        let (b, _) = spectral.process(&chunk);
        assert!(a > 0.0);
        assert!(b > 0.0);
    }
}
