//! Amplitude envelope tracking.

use crate::viseme::Viseme;
use std::collections::VecDeque;

/// Tuning for the envelope tracker.
#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
    /// Sliding-window length in chunks. Short windows respond faster.
    pub smoothing_window: usize,
    /// Normalized amplitude below which the mouth targets fully closed.
    pub min_threshold: f32,
    /// Normalized amplitude mapped to a fully open mouth.
    pub max_threshold: f32,
    /// Fraction of the gap covered per chunk while closing.
    pub close_speed: f32,
    /// Fraction of the gap covered per chunk while opening.
    pub open_speed: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            smoothing_window: 3,
            min_threshold: 0.015,
            max_threshold: 0.25,
            close_speed: 0.7,
            open_speed: 0.4,
        }
    }
}

/// Smooths instantaneous chunk amplitude into a stable mouth opening.
///
/// One instance per speech session. Call [`EnvelopeTracker::reset`] when a
/// session ends so stale easing state never bleeds into the next utterance.
#[derive(Debug)]
pub struct EnvelopeTracker {
    config: EnvelopeConfig,
    window: VecDeque<f32>,
    current_opening: f32,
    target_opening: f32,
    silence_chunks: u32,
    speaking: bool,
}

impl EnvelopeTracker {
    pub fn new(config: EnvelopeConfig) -> Self {
        let capacity = config.smoothing_window.max(1);
        Self {
            config,
            window: VecDeque::with_capacity(capacity),
            current_opening: 0.0,
            target_opening: 0.0,
            silence_chunks: 0,
            speaking: false,
        }
    }

    /// Process one PCM16 mono chunk and return the mouth opening in
    /// [0, 100].
    pub fn process(&mut self, samples: &[i16]) -> f32 {
        let rms = rms_amplitude(samples);
        // Normalize by the maximum representable 16-bit magnitude.
        let normalized = rms / 32_768.0;

        if self.window.len() == self.config.smoothing_window.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(normalized);
        let smoothed: f32 = self.window.iter().sum::<f32>() / self.window.len() as f32;

        if smoothed < self.config.min_threshold {
            self.target_opening = 0.0;
            self.silence_chunks += 1;
            self.speaking = false;
        } else {
            let span = self.config.max_threshold - self.config.min_threshold;
            let norm = ((smoothed - self.config.min_threshold) / span).clamp(0.0, 1.0);
            // Sub-linear curve: quiet speech still moves the mouth.
            self.target_opening = norm.powf(0.8) * 100.0;
            self.silence_chunks = 0;
            self.speaking = self.target_opening > 3.0;
        }

        // Asymmetric easing: closing covers more of the gap per chunk than
        // opening, so the mouth shuts crisply between syllables.
        if self.target_opening < self.current_opening {
            let step = (self.current_opening - self.target_opening) * self.config.close_speed;
            self.current_opening = (self.current_opening - step).max(self.target_opening);
        } else {
            let step = (self.target_opening - self.current_opening) * self.config.open_speed;
            self.current_opening = (self.current_opening + step).min(self.target_opening);
        }

        // Residual easing would leave the mouth ajar through a pause.
        if self.silence_chunks > 2 {
            self.current_opening = 0.0;
        }

        self.current_opening
    }

    /// Viseme for the current opening.
    pub fn viseme(&self) -> Viseme {
        Viseme::from_opening(self.current_opening)
    }

    pub fn opening(&self) -> f32 {
        self.current_opening
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Clear all state. Called whenever a speech session ends.
    pub fn reset(&mut self) {
        self.window.clear();
        self.current_opening = 0.0;
        self.target_opening = 0.0;
        self.silence_chunks = 0;
        self.speaking = false;
    }
}

impl Default for EnvelopeTracker {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}

/// Root-mean-square amplitude of a chunk. Empty chunks read as silence.
fn rms_amplitude(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s);
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loud_chunk() -> Vec<i16> {
        // RMS ~0.5 of full scale, well above max_threshold.
        vec![16_384; 1024]
    }

    fn silent_chunk() -> Vec<i16> {
        vec![0; 1024]
    }

    #[test]
    fn test_silence_stays_closed() {
        let mut tracker = EnvelopeTracker::default();
        for _ in 0..10 {
            let opening = tracker.process(&silent_chunk());
            assert_eq!(opening, 0.0);
            assert_eq!(tracker.viseme(), Viseme::Closed);
        }
        assert!(!tracker.is_speaking());
    }

    #[test]
    fn test_loud_chunks_reach_wide() {
        let mut tracker = EnvelopeTracker::default();
        let mut reached = false;
        // Opening eases at 0.4 of the gap per chunk; a dozen loud chunks
        // is far more than enough to cross the WIDE threshold.
        for _ in 0..12 {
            tracker.process(&loud_chunk());
            if tracker.viseme() == Viseme::Wide {
                reached = true;
                break;
            }
        }
        assert!(reached, "never reached WIDE, opening={}", tracker.opening());
        assert!(tracker.is_speaking());
    }

    #[test]
    fn test_third_below_threshold_chunk_forces_zero() {
        let mut tracker = EnvelopeTracker::default();
        for _ in 0..8 {
            tracker.process(&loud_chunk());
        }
        assert!(tracker.opening() > 50.0);

        // Two silent chunks flush the smoothing window; the smoothed
        // amplitude only drops below threshold once the window is empty of
        // loud samples.
        tracker.process(&silent_chunk());
        tracker.process(&silent_chunk());

        let first = tracker.process(&silent_chunk());
        assert!(first > 0.0, "easing should still be closing, got {}", first);
        let second = tracker.process(&silent_chunk());
        assert!(second > 0.0);
        let third = tracker.process(&silent_chunk());
        assert_eq!(third, 0.0, "third consecutive silent chunk must force 0");
    }

    #[test]
    fn test_closing_covers_more_gap_than_opening() {
        // Opening from rest: first loud chunk targets 100 and covers
        // open_speed of the gap.
        let mut opening_tracker = EnvelopeTracker::default();
        opening_tracker.process(&loud_chunk());
        let open_fraction = opening_tracker.opening() / 100.0;

        // Closing: raise the mouth, flush the window, then measure one
        // below-threshold chunk's coverage of the gap down to zero.
        let mut closing_tracker = EnvelopeTracker::default();
        for _ in 0..8 {
            closing_tracker.process(&loud_chunk());
        }
        closing_tracker.process(&silent_chunk());
        closing_tracker.process(&silent_chunk());
        let high = closing_tracker.opening();
        closing_tracker.process(&silent_chunk());
        let close_fraction = (high - closing_tracker.opening()) / high;

        assert!(
            close_fraction >= open_fraction,
            "close {} < open {}",
            close_fraction,
            open_fraction
        );
    }

    #[test]
    fn test_reset_then_silence_is_zero_immediately() {
        let mut tracker = EnvelopeTracker::default();
        for _ in 0..5 {
            tracker.process(&loud_chunk());
        }
        tracker.reset();
        assert_eq!(tracker.opening(), 0.0);
        let first = tracker.process(&silent_chunk());
        assert_eq!(first, 0.0);
    }

    #[test]
    fn test_empty_chunk_reads_as_silence() {
        let mut tracker = EnvelopeTracker::default();
        let opening = tracker.process(&[]);
        assert_eq!(opening, 0.0);
    }

    #[test]
    fn test_no_overshoot_on_opening() {
        let mut tracker = EnvelopeTracker::default();
        for _ in 0..50 {
            tracker.process(&loud_chunk());
            assert!(tracker.opening() <= tracker.target_opening + 1e-3);
        }
    }

    proptest! {
        #[test]
        fn prop_opening_always_in_range(chunks in prop::collection::vec(
            prop::collection::vec(any::<i16>(), 0..2048), 1..24)
        ) {
            let mut tracker = EnvelopeTracker::default();
            for chunk in &chunks {
                let opening = tracker.process(chunk);
                prop_assert!((0.0..=100.0).contains(&opening), "opening {}", opening);
            }
        }

        #[test]
        fn prop_viseme_is_pure(opening in 0.0f32..=100.0) {
            prop_assert_eq!(Viseme::from_opening(opening), Viseme::from_opening(opening));
        }
    }
}
