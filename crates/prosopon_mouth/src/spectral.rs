//! Frequency-weighted envelope tracking.
//!
//! Vowels carry their energy in the mid band and open the mouth wide;
//! consonants sit higher and barely part the lips. This tracker layers a
//! band-energy comparison over the plain amplitude envelope: when one band
//! clearly dominates, the opening is scaled up (vowels) or down
//! (consonants) before classification. Same state machine, richer signal.

use crate::envelope::{EnvelopeConfig, EnvelopeTracker};
use crate::viseme::Viseme;

/// Frequency band in Hz.
type Band = (f32, f32);

const VOWEL_BAND: Band = (250.0, 2000.0);
const CONSONANT_BAND: Band = (2000.0, 8000.0);

/// One band must exceed the other by this ratio before the opening is
/// rescaled; anything closer is treated as mixed content.
const DOMINANCE_RATIO: f32 = 1.5;

const VOWEL_BOOST: f32 = 1.2;
const CONSONANT_DAMP: f32 = 0.7;

/// Envelope tracker with spectral weighting. An enhancement layer over
/// [`EnvelopeTracker`], not a separate state machine: `reset` and the
/// speaking flag pass straight through.
#[derive(Debug)]
pub struct SpectralEnvelopeTracker {
    base: EnvelopeTracker,
}

impl SpectralEnvelopeTracker {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self {
            base: EnvelopeTracker::new(config),
        }
    }

    /// Process one chunk; returns the weighted opening and its viseme.
    pub fn process(&mut self, samples: &[i16]) -> (f32, Viseme) {
        let mut opening = self.base.process(samples);

        if !samples.is_empty() {
            let sample_rate = self.base.config().sample_rate;
            let magnitudes = fft_magnitudes(samples);
            let vowel = band_energy(&magnitudes, sample_rate, VOWEL_BAND);
            let consonant = band_energy(&magnitudes, sample_rate, CONSONANT_BAND);

            if consonant > vowel * DOMINANCE_RATIO {
                opening *= CONSONANT_DAMP;
            } else if vowel > consonant * DOMINANCE_RATIO {
                opening = (opening * VOWEL_BOOST).min(100.0);
            }
        }

        (opening, Viseme::from_opening(opening))
    }

    pub fn is_speaking(&self) -> bool {
        self.base.is_speaking()
    }

    pub fn reset(&mut self) {
        self.base.reset();
    }
}

impl Default for SpectralEnvelopeTracker {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}

/// Magnitude spectrum of a chunk, bins `0..=n/2` after zero-padding to the
/// next power of two. Iterative radix-2 Cooley-Tukey; chunk sizes are small
/// (~1024 samples) so no scratch reuse is needed.
fn fft_magnitudes(samples: &[i16]) -> Vec<f32> {
    let n = samples.len().next_power_of_two();
    let mut re: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
    re.resize(n, 0.0);
    if n < 2 {
        return re.iter().map(|v| v.abs()).collect();
    }
    let mut im = vec![0.0f32; n];

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = (i as u32).reverse_bits() >> (32 - bits);
        let j = j as usize;
        if j > i {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    // Butterfly passes.
    let mut len = 2;
    while len <= n {
        let angle = -2.0 * std::f32::consts::PI / len as f32;
        let (w_im, w_re) = angle.sin_cos();
        for start in (0..n).step_by(len) {
            let mut cur_re = 1.0f32;
            let mut cur_im = 0.0f32;
            for k in 0..len / 2 {
                let a = start + k;
                let b = a + len / 2;
                let t_re = cur_re * re[b] - cur_im * im[b];
                let t_im = cur_re * im[b] + cur_im * re[b];
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len *= 2;
    }

    (0..=n / 2)
        .map(|k| (re[k] * re[k] + im[k] * im[k]).sqrt())
        .collect()
}

/// Mean magnitude across the bins falling inside `band`. Bin spacing comes
/// from the padded length implied by the magnitude vector.
fn band_energy(magnitudes: &[f32], sample_rate: u32, band: Band) -> f32 {
    let n = (magnitudes.len() - 1) * 2;
    if n == 0 {
        return 0.0;
    }
    let bin_hz = sample_rate as f32 / n as f32;
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for (k, &mag) in magnitudes.iter().enumerate() {
        let freq = k as f32 * bin_hz;
        if freq >= band.0 && freq <= band.1 {
            sum += mag;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
