//! Audio-driven mouth animation.
//!
//! Turns raw speech audio into a perceptually stable mouth-opening
//! percentage and a discrete viseme category, the same way game characters
//! lip-sync: RMS amplitude, a short smoothing window, a sub-linear response
//! curve, and asymmetric easing so the mouth snaps shut between syllables
//! but opens smoothly.

mod envelope;
mod spectral;
mod viseme;

pub use envelope::{EnvelopeConfig, EnvelopeTracker};
pub use spectral::SpectralEnvelopeTracker;
pub use viseme::Viseme;
