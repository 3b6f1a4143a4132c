//! The control loops that animate the head.
//!
//! Four cooperating loops share one [`prosopon_servo::ActuatorArbiter`]:
//! the speech/jaw loop (driven by audio-chunk arrival), the face-tracking
//! loop (~30 Hz), the speech-end watchdog (~10 Hz), and the command-queue
//! drain (~20 Hz). Each loop owns its local state, touches shared actuator
//! state only through the arbiter, and logs-and-continues on transient
//! errors rather than dying.

mod commands;
mod face;
mod loops;
mod session;
mod state;

pub use commands::CommandExecutor;
pub use face::{CameraFactory, FaceTracking};
pub use loops::{ControlLoopSet, RuntimeConfig};
pub use session::{Session, SessionFactory, SessionManager};
pub use state::{MouthTracker, SpeechState};
