//! The servo-bus seam.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

/// Typed outcome of a hardware write. Callers branch on kind instead of
/// string-matching driver error text.
#[derive(Debug, Error)]
pub enum ServoError {
    /// The device vanished mid-session (USB unplug, power loss).
    #[error("servo bus disconnected: {0}")]
    Disconnected(String),
    /// The channel is outside the bus's range.
    #[error("invalid servo channel {0}")]
    InvalidChannel(u8),
    /// Any other driver failure.
    #[error("servo bus write failed: {0}")]
    Bus(String),
}

/// One multi-channel servo controller. The electrical driver is an
/// external collaborator; this trait is its interface. Writes are
/// fire-and-forget: a conforming implementation never blocks on servo
/// motion, only on issuing the command.
#[async_trait]
pub trait ServoBus: Send + Sync {
    async fn write(&self, channel: u8, angle: f32) -> Result<(), ServoError>;

    fn name(&self) -> &'static str;
}

/// In-memory bus for simulation mode and tests. Records every write.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    writes: Mutex<Vec<(u8, f32)>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(channel, angle)` pair written so far, in order.
    pub fn writes(&self) -> Vec<(u8, f32)> {
        self.writes.lock().expect("bus log poisoned").clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().expect("bus log poisoned").len()
    }
}

#[async_trait]
impl ServoBus for SimulatedBus {
    async fn write(&self, channel: u8, angle: f32) -> Result<(), ServoError> {
        if channel > 15 {
            return Err(ServoError::InvalidChannel(channel));
        }
        self.writes
            .lock()
            .expect("bus log poisoned")
            .push((channel, angle));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_bus_records_in_order() {
        let bus = SimulatedBus::new();
        bus.write(0, 90.0).await.unwrap();
        bus.write(8, 45.0).await.unwrap();
        assert_eq!(bus.writes(), vec![(0, 90.0), (8, 45.0)]);
    }

    #[tokio::test]
    async fn test_simulated_bus_rejects_out_of_range_channel() {
        let bus = SimulatedBus::new();
        let err = bus.write(16, 90.0).await.unwrap_err();
        assert!(matches!(err, ServoError::InvalidChannel(16)));
    }
}
