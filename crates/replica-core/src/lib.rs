//! Replica Core - Fundamental types and primitives
//!
//! This crate defines the types shared by the replica clock and its session layer:
//! - Network time (frame index + normalized sub-frame fraction)
//! - Identifiers (NetworkId, ComponentType)
//! - Protocol messages exchanged with the server
//! - Server settings map and setting descriptors
//! - Error taxonomy

pub mod error;
pub mod id;
pub mod message;
pub mod settings;
pub mod time;

pub use error::*;
pub use id::*;
pub use message::*;
pub use settings::*;
pub use time::*;
