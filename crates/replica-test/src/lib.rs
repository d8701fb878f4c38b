//! Replica Test Harness - Simulation and chaos testing for the replica clock
//!
//! This crate provides:
//! - A one-way chaos link (jitter, loss, reordering, duplication)
//! - A simulated server frame clock with drift
//! - A closed-loop clock simulator checking clock invariants every frame

pub mod chaos;
pub mod server;
pub mod time_simulator;

pub use chaos::*;
pub use server::*;
pub use time_simulator::*;
