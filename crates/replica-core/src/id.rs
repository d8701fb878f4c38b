//! Identity types for replicated objects
//!
//! Network ids are 32-bit for wire efficiency. The low bits address a slot in the
//! client's object registry and the high bits carry the slot version, so a stale id
//! held after its object was removed never resolves to a newer object in the same slot.

use std::fmt;

/// Number of bits used for the slot index
pub const NETWORK_ID_INDEX_BITS: u32 = 20;
/// Number of bits used for the slot version
pub const NETWORK_ID_VERSION_BITS: u32 = 32 - NETWORK_ID_INDEX_BITS;

const INDEX_MASK: u32 = (1 << NETWORK_ID_INDEX_BITS) - 1;
const VERSION_MASK: u32 = (1 << NETWORK_ID_VERSION_BITS) - 1;

/// Replicated object identity: slot index + slot version
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u32);

impl NetworkId {
    pub const INVALID: NetworkId = NetworkId(u32::MAX);

    /// Compose an id from index and version; excess bits are masked off.
    #[inline]
    pub fn new(index: u32, version: u32) -> Self {
        NetworkId((index & INDEX_MASK) | ((version & VERSION_MASK) << NETWORK_ID_INDEX_BITS))
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    #[inline]
    pub fn version(self) -> u32 {
        self.0 >> NETWORK_ID_INDEX_BITS
    }

    /// Next version for a slot, wrapping within the version bits
    #[inline]
    pub fn next_version(version: u32) -> u32 {
        version.wrapping_add(1) & VERSION_MASK
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        NetworkId(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == NetworkId::INVALID {
            write!(f, "NetworkId(invalid)")
        } else {
            write!(f, "NetworkId({}:{})", self.index(), self.version())
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.version())
    }
}

/// Hashed name of the component type backing a network object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentType(pub u32);

impl ComponentType {
    /// Hash a type name (FNV-1a, 32 bit)
    pub fn from_name(name: &str) -> Self {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in name.bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        ComponentType(hash)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({:08x})", self.0)
    }
}

/// Connection identity assigned by the server
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
