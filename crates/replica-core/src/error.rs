//! Error types for the replica clock and its session layer

use thiserror::Error;

use crate::{ComponentType, NetworkId};

/// Invalid or missing server settings, or an unusable initial clock sample.
/// Fatal to clock creation; the owning connection is expected to drop the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {name}")]
    MissingSetting { name: &'static str },

    #[error("Setting {name} has wrong type: expected {expected}")]
    TypeMismatch {
        name: &'static str,
        expected: &'static str,
    },

    #[error("Setting {name} out of range ({value}): {reason}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Initial server frame {frame} is beyond the supported range")]
    InitialFrameOutOfRange { frame: u64 },
}

/// Replica session errors
#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Wire errors
    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Unknown message id: {0:#04x}")]
    UnknownMessage(u8),

    // Object errors
    #[error("Unknown network object: {0:?}")]
    UnknownObject(NetworkId),

    #[error("Network object {network_id:?} has type {actual:?}, expected {expected:?}")]
    ObjectTypeMismatch {
        network_id: NetworkId,
        expected: ComponentType,
        actual: ComponentType,
    },

    #[error("Network object registry is full")]
    RegistryFull,
}

/// Result type for replica operations
pub type ReplicaResult<T> = Result<T, ReplicaError>;
