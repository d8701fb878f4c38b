//! Replica Wire - Binary encoding of replication messages
//!
//! This crate encodes the bodies of replication messages:
//! - Bounds-checked little-endian reader
//! - `WireMessage` implementations for every protocol message
//!
//! Framing, sequencing and delivery belong to the transport and are not handled here.

pub mod message;
pub mod reader;

pub use message::*;
pub use reader::*;
