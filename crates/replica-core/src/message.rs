//! Protocol messages exchanged between the server and a replicating client
//!
//! Object state travels as opaque payloads; only the owning network object knows how
//! to interpret them.

use bytes::Bytes;

use crate::{ComponentType, NetworkId};

/// Message identifiers on the replication channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    /// Server clock sample (server → client)
    SceneClock = 0x01,
    /// Objects entering the client's scope (server → client)
    AddObjects = 0x02,
    /// Objects leaving the client's scope (server → client)
    RemoveObjects = 0x03,
    /// Reliable object deltas (server → client)
    UpdateObjectsReliable = 0x04,
    /// Unreliable object deltas (server → client)
    UpdateObjectsUnreliable = 0x05,
    /// Feedback from owned objects, tagged with the input frame (client → server)
    ObjectsFeedbackUnreliable = 0x06,
}

impl MessageId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageId::SceneClock),
            0x02 => Some(MessageId::AddObjects),
            0x03 => Some(MessageId::RemoveObjects),
            0x04 => Some(MessageId::UpdateObjectsReliable),
            0x05 => Some(MessageId::UpdateObjectsUnreliable),
            0x06 => Some(MessageId::ObjectsFeedbackUnreliable),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Delivery guarantee requested from the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reliability {
    Reliable,
    Unreliable,
}

/// Largest frame a clock sample may carry; leaves headroom for derived axes
pub const MAX_SERVER_FRAME: u64 = i64::MAX as u64 / 2;

/// Server clock sample.
/// A point measurement of server time at the moment of sending; may be lost,
/// duplicated or reordered in transit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MsgSceneClock {
    /// Latest frame started on the server
    pub frame: u64,
    /// Elapsed fraction of that frame when the message was sent, in `[0, 1)`
    pub sub_frame: f32,
    /// Round trip time to this client as measured by the server
    pub round_trip_ms: u32,
}

impl MsgSceneClock {
    pub fn new(frame: u64) -> Self {
        MsgSceneClock {
            frame,
            sub_frame: 0.0,
            round_trip_ms: 0,
        }
    }

    pub fn with_sub_frame(mut self, sub_frame: f32) -> Self {
        self.sub_frame = sub_frame;
        self
    }

    pub fn with_round_trip_ms(mut self, round_trip_ms: u32) -> Self {
        self.round_trip_ms = round_trip_ms;
        self
    }

    /// One-way latency estimate in seconds
    #[inline]
    pub fn one_way_latency(&self) -> f64 {
        self.round_trip_ms as f64 / 2000.0
    }
}

/// Full state of one object entering scope
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSnapshot {
    pub network_id: NetworkId,
    pub component_type: ComponentType,
    /// Whether the receiving connection owns (controls) this object
    pub is_owned: bool,
    pub payload: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MsgAddObjects {
    pub frame: u64,
    pub objects: Vec<ObjectSnapshot>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MsgRemoveObjects {
    pub frame: u64,
    pub network_ids: Vec<NetworkId>,
}

/// Incremental update of one object
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDelta {
    pub network_id: NetworkId,
    pub component_type: ComponentType,
    pub payload: Bytes,
}

/// Object deltas; carried by both the reliable and the unreliable update message
#[derive(Clone, Debug, PartialEq)]
pub struct MsgUpdateObjects {
    pub frame: u64,
    pub deltas: Vec<ObjectDelta>,
}

/// Feedback written by one owned object
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectFeedback {
    pub network_id: NetworkId,
    pub payload: Bytes,
}

/// Feedback of all owned objects for one input frame
#[derive(Clone, Debug, PartialEq)]
pub struct MsgObjectsFeedback {
    /// Server frame at which the feedback is meant to be applied
    pub input_frame: u64,
    pub entries: Vec<ObjectFeedback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_bytes() {
        for id in [
            MessageId::SceneClock,
            MessageId::AddObjects,
            MessageId::RemoveObjects,
            MessageId::UpdateObjectsReliable,
            MessageId::UpdateObjectsUnreliable,
            MessageId::ObjectsFeedbackUnreliable,
        ] {
            assert_eq!(MessageId::from_byte(id.to_byte()), Some(id));
        }
        assert_eq!(MessageId::from_byte(0x00), None);
        assert_eq!(MessageId::from_byte(0xFF), None);
    }

    #[test]
    fn test_scene_clock_builder() {
        let msg = MsgSceneClock::new(30)
            .with_sub_frame(0.5)
            .with_round_trip_ms(100);
        assert_eq!(msg.frame, 30);
        assert_eq!(msg.sub_frame, 0.5);
        assert!((msg.one_way_latency() - 0.05).abs() < 1e-12);
    }
}
