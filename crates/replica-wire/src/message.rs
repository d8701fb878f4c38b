//! Message body encodings
//!
//! All integers are little-endian. Lists carry a `u16` count and object payloads a
//! `u16` length prefix.
//!
//! Scene clock (16 bytes):
//! - Bytes 0-7: Frame
//! - Bytes 8-11: Sub-frame fraction (f32)
//! - Bytes 12-15: Round trip (ms)
//!
//! Object lists: frame (u64), count (u16), then per entry
//! network id (u32), component type (u32), [owned flag (u8)], payload.

use bytes::{BufMut, BytesMut};
use replica_core::{
    ComponentType, MessageId, MsgAddObjects, MsgObjectsFeedback, MsgRemoveObjects,
    MsgSceneClock, MsgUpdateObjects, NetworkId, ObjectDelta, ObjectFeedback, ObjectSnapshot,
    ReplicaError, ReplicaResult,
};

use crate::WireReader;

/// Encoded size of a scene clock message
pub const SCENE_CLOCK_SIZE: usize = 16;

/// Maximum entries in one object list
pub const MAX_LIST_LEN: usize = u16::MAX as usize;

/// Maximum size of a single object payload
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// A message body with a binary encoding
pub trait WireMessage: Sized {
    /// Message id carried next to the body by the transport
    fn message_id(&self) -> MessageId;

    /// Append the encoded body to `buf`
    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()>;

    /// Decode a complete body; trailing bytes are an error
    fn decode(buf: &[u8]) -> ReplicaResult<Self>;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> ReplicaResult<BytesMut> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

fn put_count(buf: &mut BytesMut, len: usize) -> ReplicaResult<()> {
    if len > MAX_LIST_LEN {
        return Err(ReplicaError::InvalidWireFormat(format!(
            "List too long: {} > {}",
            len, MAX_LIST_LEN
        )));
    }
    buf.put_u16_le(len as u16);
    Ok(())
}

fn put_payload(buf: &mut BytesMut, payload: &[u8]) -> ReplicaResult<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ReplicaError::InvalidWireFormat(format!(
            "Payload too large: {} > {}",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }
    buf.put_u16_le(payload.len() as u16);
    buf.put_slice(payload);
    Ok(())
}

fn read_network_id(reader: &mut WireReader<'_>) -> ReplicaResult<NetworkId> {
    Ok(NetworkId(reader.read_u32()?))
}

fn read_component_type(reader: &mut WireReader<'_>) -> ReplicaResult<ComponentType> {
    Ok(ComponentType(reader.read_u32()?))
}

impl WireMessage for MsgSceneClock {
    fn message_id(&self) -> MessageId {
        MessageId::SceneClock
    }

    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()> {
        buf.reserve(SCENE_CLOCK_SIZE);
        buf.put_u64_le(self.frame);
        buf.put_f32_le(self.sub_frame);
        buf.put_u32_le(self.round_trip_ms);
        Ok(())
    }

    fn decode(buf: &[u8]) -> ReplicaResult<Self> {
        let mut reader = WireReader::new(buf);
        let frame = reader.read_u64()?;
        let sub_frame = reader.read_f32()?;
        let round_trip_ms = reader.read_u32()?;
        reader.finish()?;

        if !(0.0..1.0).contains(&sub_frame) {
            return Err(ReplicaError::InvalidWireFormat(format!(
                "Sub-frame out of range: {}",
                sub_frame
            )));
        }

        Ok(MsgSceneClock {
            frame,
            sub_frame,
            round_trip_ms,
        })
    }
}

impl WireMessage for MsgAddObjects {
    fn message_id(&self) -> MessageId {
        MessageId::AddObjects
    }

    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()> {
        buf.put_u64_le(self.frame);
        put_count(buf, self.objects.len())?;
        for object in &self.objects {
            buf.put_u32_le(object.network_id.0);
            buf.put_u32_le(object.component_type.0);
            buf.put_u8(object.is_owned as u8);
            put_payload(buf, &object.payload)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> ReplicaResult<Self> {
        let mut reader = WireReader::new(buf);
        let frame = reader.read_u64()?;
        let count = reader.read_u16()? as usize;

        let mut objects = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            objects.push(ObjectSnapshot {
                network_id: read_network_id(&mut reader)?,
                component_type: read_component_type(&mut reader)?,
                is_owned: reader.read_bool()?,
                payload: reader.read_payload()?,
            });
        }
        reader.finish()?;

        Ok(MsgAddObjects { frame, objects })
    }
}

impl WireMessage for MsgRemoveObjects {
    fn message_id(&self) -> MessageId {
        MessageId::RemoveObjects
    }

    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()> {
        buf.put_u64_le(self.frame);
        put_count(buf, self.network_ids.len())?;
        for id in &self.network_ids {
            buf.put_u32_le(id.0);
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> ReplicaResult<Self> {
        let mut reader = WireReader::new(buf);
        let frame = reader.read_u64()?;
        let count = reader.read_u16()? as usize;

        let mut network_ids = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            network_ids.push(read_network_id(&mut reader)?);
        }
        reader.finish()?;

        Ok(MsgRemoveObjects { frame, network_ids })
    }
}

/// Object deltas share one body layout for both reliabilities.
/// `message_id` reports the unreliable flavour; use [`encode_update`] to pick one.
impl WireMessage for MsgUpdateObjects {
    fn message_id(&self) -> MessageId {
        MessageId::UpdateObjectsUnreliable
    }

    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()> {
        buf.put_u64_le(self.frame);
        put_count(buf, self.deltas.len())?;
        for delta in &self.deltas {
            buf.put_u32_le(delta.network_id.0);
            buf.put_u32_le(delta.component_type.0);
            put_payload(buf, &delta.payload)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> ReplicaResult<Self> {
        let mut reader = WireReader::new(buf);
        let frame = reader.read_u64()?;
        let count = reader.read_u16()? as usize;

        let mut deltas = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            deltas.push(ObjectDelta {
                network_id: read_network_id(&mut reader)?,
                component_type: read_component_type(&mut reader)?,
                payload: reader.read_payload()?,
            });
        }
        reader.finish()?;

        Ok(MsgUpdateObjects { frame, deltas })
    }
}

impl WireMessage for MsgObjectsFeedback {
    fn message_id(&self) -> MessageId {
        MessageId::ObjectsFeedbackUnreliable
    }

    fn encode(&self, buf: &mut BytesMut) -> ReplicaResult<()> {
        buf.put_u64_le(self.input_frame);
        put_count(buf, self.entries.len())?;
        for entry in &self.entries {
            buf.put_u32_le(entry.network_id.0);
            put_payload(buf, &entry.payload)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> ReplicaResult<Self> {
        let mut reader = WireReader::new(buf);
        let input_frame = reader.read_u64()?;
        let count = reader.read_u16()? as usize;

        let mut entries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            entries.push(ObjectFeedback {
                network_id: read_network_id(&mut reader)?,
                payload: reader.read_payload()?,
            });
        }
        reader.finish()?;

        Ok(MsgObjectsFeedback {
            input_frame,
            entries,
        })
    }
}

/// Encode object deltas as a reliable or unreliable update message
pub fn encode_update(msg: &MsgUpdateObjects, reliable: bool) -> ReplicaResult<(MessageId, BytesMut)> {
    let id = if reliable {
        MessageId::UpdateObjectsReliable
    } else {
        MessageId::UpdateObjectsUnreliable
    };
    Ok((id, msg.to_bytes()?))
}
