//! Blink scheduling.
//!
//! A two-state machine layered over gaze: most ticks do nothing, but once
//! the refractory interval has elapsed a small per-tick random draw (or an
//! explicit force) closes the eyelids, holds them for a short dwell, and
//! reopens them.

use rand::Rng;
use std::time::{Duration, Instant};

/// Blink timing parameters.
///
/// With the default 5 s interval and 1% draw at the ~30 Hz tracking
/// cadence, the expected wait past the interval is ~3.3 s, giving a mean
/// inter-blink interval of roughly 8.3 s.
#[derive(Debug, Clone)]
pub struct BlinkConfig {
    /// Refractory period after a blink before another may trigger.
    pub interval: Duration,
    /// Per-tick trigger probability once the interval has elapsed.
    pub probability: f64,
    /// How long the lids stay closed.
    pub dwell: Duration,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            probability: 0.01,
            dwell: Duration::from_millis(150),
        }
    }
}

impl BlinkConfig {
    /// Slightly livelier timing for heads rendered on screen only.
    pub fn fast() -> Self {
        Self {
            interval: Duration::from_secs(4),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    Open,
    Blinking,
}

/// What the caller should do with the eyelid channels this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidCommand {
    /// Write every eyelid to its configured closed angle.
    Close,
    /// Write every eyelid back to its rig default.
    Reopen,
}

/// Drives blink transitions. Poll it once per tracking tick; it returns a
/// lid command only on a phase transition, so writes happen exactly once
/// per edge. Blink writes are whole, intentional state changes; they go
/// through the undamped eyelid path, never the jaw deadband.
#[derive(Debug)]
pub struct BlinkScheduler {
    config: BlinkConfig,
    phase: BlinkPhase,
    last_blink: Instant,
    closed_at: Instant,
}

impl BlinkScheduler {
    pub fn new(config: BlinkConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            phase: BlinkPhase::Open,
            last_blink: now,
            closed_at: now,
        }
    }

    /// Advance the state machine one tick. `force` skips both the
    /// interval check and the random draw.
    pub fn poll(&mut self, force: bool) -> Option<LidCommand> {
        match self.phase {
            BlinkPhase::Open => {
                let due = self.last_blink.elapsed() > self.config.interval
                    && rand::thread_rng().gen_bool(self.config.probability);
                if force || due {
                    self.phase = BlinkPhase::Blinking;
                    self.closed_at = Instant::now();
                    Some(LidCommand::Close)
                } else {
                    None
                }
            }
            BlinkPhase::Blinking => {
                if self.closed_at.elapsed() >= self.config.dwell {
                    self.phase = BlinkPhase::Open;
                    self.last_blink = Instant::now();
                    Some(LidCommand::Reopen)
                } else {
                    None
                }
            }
        }
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }
}

impl Default for BlinkScheduler {
    fn default() -> Self {
        Self::new(BlinkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_dwell() -> BlinkConfig {
        BlinkConfig {
            dwell: Duration::ZERO,
            ..BlinkConfig::default()
        }
    }

    #[test]
    fn test_idle_until_interval_elapses() {
        let mut scheduler = BlinkScheduler::default();
        // Interval is 5s; an immediate unforced poll can never trigger.
        for _ in 0..100 {
            assert_eq!(scheduler.poll(false), None);
        }
        assert_eq!(scheduler.phase(), BlinkPhase::Open);
    }

    #[test]
    fn test_force_closes_then_reopens() {
        let mut scheduler = BlinkScheduler::new(instant_dwell());
        assert_eq!(scheduler.poll(true), Some(LidCommand::Close));
        assert_eq!(scheduler.phase(), BlinkPhase::Blinking);

        // Dwell is zero, so the very next poll reopens.
        assert_eq!(scheduler.poll(false), Some(LidCommand::Reopen));
        assert_eq!(scheduler.phase(), BlinkPhase::Open);
    }

    #[test]
    fn test_dwell_holds_lids_closed() {
        let mut scheduler = BlinkScheduler::new(BlinkConfig {
            dwell: Duration::from_secs(60),
            ..BlinkConfig::default()
        });
        scheduler.poll(true);
        // Mid-dwell polls emit nothing; the lids stay closed.
        for _ in 0..10 {
            assert_eq!(scheduler.poll(false), None);
            assert_eq!(scheduler.phase(), BlinkPhase::Blinking);
        }
    }

    #[test]
    fn test_force_while_blinking_does_not_restart() {
        let mut scheduler = BlinkScheduler::new(BlinkConfig {
            dwell: Duration::from_secs(60),
            ..BlinkConfig::default()
        });
        scheduler.poll(true);
        // A force during the dwell is absorbed by the blink in flight.
        assert_eq!(scheduler.poll(true), None);
        assert_eq!(scheduler.phase(), BlinkPhase::Blinking);
    }

    #[test]
    fn test_reopen_resets_refractory() {
        let mut scheduler = BlinkScheduler::new(instant_dwell());
        scheduler.poll(true);
        scheduler.poll(false); // reopen
        // The interval restarts from the reopen; no immediate retrigger.
        assert_eq!(scheduler.poll(false), None);
    }
}
