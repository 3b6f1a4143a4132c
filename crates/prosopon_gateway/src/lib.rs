//! Browser-facing visualization transport.
//!
//! Pushes UI events (visemes, eye angles, blinks, position snapshots) to
//! every connected WebSocket client and feeds inbound control messages
//! into the command queue. Purely an observability/control surface: a
//! slow or absent client never back-pressures a control loop.

mod server;

pub use server::GatewayServer;
