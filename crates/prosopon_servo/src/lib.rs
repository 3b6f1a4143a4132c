//! Servo bus abstraction and actuator arbitration.
//!
//! Every angle that reaches hardware passes through the
//! [`ActuatorArbiter`]: it owns the authoritative position table, applies
//! clamping and jaw deadband filtering, serializes writes per channel, and
//! degrades to table-only simulation when the bus disappears.

mod arbiter;
mod bus;

pub use arbiter::{ActuatorArbiter, JawCalibration, PositionTable, JAW_CHANNEL};
pub use bus::{ServoBus, ServoError, SimulatedBus};
