//! Replica Time - Client-side replication clock
//!
//! This crate reconstructs server time on a client and derives the two axes
//! consumers read:
//! - Replica time: smoothed, behind server time, used for interpolation
//! - Input time: smoothed, ahead of server time, when local input reaches the server
//!
//! Components:
//! - `SoftNetworkTime`: a time axis that dilates toward a target or snaps to it
//! - `PhysicsTickAligner`: maps an input frame boundary onto a physics sub-step
//! - `LatencyModel`: passive round trip and jitter estimation
//! - `ClientReplicaClock`: the per-frame driver tying them together

pub mod clock;
pub mod event;
pub mod latency;
pub mod physics;
pub mod settings;
pub mod soft;

pub use clock::*;
pub use event::*;
pub use latency::*;
pub use physics::*;
pub use settings::*;
pub use soft::*;
