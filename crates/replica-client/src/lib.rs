//! Replica Client - Per-connection replication session
//!
//! This crate drives one replicated scene on the client:
//! 1. Receive messages (clock samples, object add/remove/update)
//! 2. Hand clock samples over from the I/O thread
//! 3. Synchronize clocks once per frame
//! 4. Interpolate replicated objects at replica time
//! 5. Send owned object feedback on every new input frame

pub mod connection;
pub mod inbox;
pub mod manager;
pub mod object;

pub use connection::*;
pub use inbox::*;
pub use manager::*;
pub use object::*;
