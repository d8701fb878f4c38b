//! Connection seam between the session and the transport

use replica_core::{ConnectionId, MessageId, Reliability, ReplicaResult};

/// Outbound side of a server connection
pub trait Connection {
    /// Id the server assigned to this connection
    fn connection_id(&self) -> ConnectionId;

    /// Send an encoded message body
    fn send_message(
        &mut self,
        message_id: MessageId,
        payload: &[u8],
        reliability: Reliability,
    ) -> ReplicaResult<()>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn connection_id(&self) -> ConnectionId {
        (**self).connection_id()
    }

    fn send_message(
        &mut self,
        message_id: MessageId,
        payload: &[u8],
        reliability: Reliability,
    ) -> ReplicaResult<()> {
        (**self).send_message(message_id, payload, reliability)
    }
}
