//! Client network manager - one replicated scene on one connection

use std::collections::HashSet;
use std::fmt::Write as _;

use replica_core::network_settings::{POSITION_EXTRAPOLATION_TIME, TRACE_DURATION};
use replica_core::{
    ConfigError, MessageId, MsgAddObjects, MsgObjectsFeedback, MsgRemoveObjects, MsgSceneClock,
    MsgUpdateObjects, NetworkId, NetworkSetting, ObjectFeedback, Reliability, ReplicaError,
    ReplicaResult, ServerSettings,
};
use replica_time::ClientReplicaClock;
use replica_wire::WireMessage;
use tracing::{debug, trace, warn};

use crate::{ClockInbox, Connection, NetworkObject, NetworkObjectFactory, NetworkObjectRegistry};

/// Session counters
#[derive(Clone, Debug, Default)]
pub struct ManagerStats {
    pub messages_processed: u64,
    pub clock_updates: u64,
    pub objects_added: u64,
    pub objects_removed: u64,
    pub deltas_applied: u64,
    pub deltas_dropped: u64,
    pub feedback_sent: u64,
}

/// Client replication session
pub struct ClientNetworkManager<C: Connection> {
    clock: ClientReplicaClock,
    connection: C,
    factory: Box<dyn NetworkObjectFactory>,
    objects: NetworkObjectRegistry,
    /// Ids of objects controlled by this client; liveness checked against `objects`
    owned_objects: HashSet<NetworkId>,
    inbox: ClockInbox,
    pending_clock_updates: Vec<MsgSceneClock>,
    stats: ManagerStats,
}

impl<C: Connection> ClientNetworkManager<C> {
    /// Start a session from the first clock sample and the server settings
    pub fn new(
        connection: C,
        factory: Box<dyn NetworkObjectFactory>,
        initial_clock: &MsgSceneClock,
        server_settings: &ServerSettings,
    ) -> Result<Self, ConfigError> {
        let clock = ClientReplicaClock::new(initial_clock, server_settings)?;
        debug!(
            connection = %connection.connection_id(),
            frame = initial_clock.frame,
            "Client replica started"
        );
        Ok(ClientNetworkManager {
            clock,
            connection,
            factory,
            objects: NetworkObjectRegistry::new(),
            owned_objects: HashSet::new(),
            inbox: ClockInbox::new(),
            pending_clock_updates: Vec::new(),
            stats: ManagerStats::default(),
        })
    }

    /// Handle a message addressed to the replica.
    ///
    /// Malformed bodies are reported to the caller; the clock is left untouched.
    pub fn process_message(&mut self, message_id: MessageId, payload: &[u8]) -> ReplicaResult<()> {
        self.stats.messages_processed += 1;
        match message_id {
            MessageId::SceneClock => {
                let msg = MsgSceneClock::decode(payload)?;
                self.inbox.push(msg);
                self.stats.clock_updates += 1;
            }
            MessageId::AddObjects => self.process_add_objects(&MsgAddObjects::decode(payload)?),
            MessageId::RemoveObjects => {
                self.process_remove_objects(&MsgRemoveObjects::decode(payload)?)
            }
            MessageId::UpdateObjectsReliable => {
                self.process_update_objects(&MsgUpdateObjects::decode(payload)?, true)
            }
            MessageId::UpdateObjectsUnreliable => {
                self.process_update_objects(&MsgUpdateObjects::decode(payload)?, false)
            }
            MessageId::ObjectsFeedbackUnreliable => {
                warn!("Ignoring client-bound objects feedback");
            }
        }
        Ok(())
    }

    /// Handle a message whose id is still a raw byte
    pub fn process_raw_message(&mut self, message_id: u8, payload: &[u8]) -> ReplicaResult<()> {
        let id = MessageId::from_byte(message_id).ok_or(ReplicaError::UnknownMessage(message_id))?;
        self.process_message(id, payload)
    }

    /// Apply queued clock samples and the elapsed time.
    /// Returns the time step the physics world should advance by.
    pub fn synchronize_clocks(&mut self, time_step: f32) -> f32 {
        self.inbox.drain_into(&mut self.pending_clock_updates);
        self.clock
            .apply_time_step(time_step, &mut self.pending_clock_updates)
    }

    /// Interpolate objects for this frame and send feedback on a new input frame
    pub fn update_replica(&mut self, time_step: f32) -> ReplicaResult<()> {
        let replica_time = self.clock.replica_time();
        let input_time = self.clock.input_time();
        let is_new_input_frame = self.clock.is_new_input_frame();

        for (_, object) in self.objects.iter_mut() {
            object.interpolate_state(time_step, replica_time, input_time, is_new_input_frame);
        }

        if is_new_input_frame {
            let input_frame = u64::try_from(input_time.frame()).unwrap_or(0);
            self.send_objects_feedback(input_frame)?;
        }
        Ok(())
    }

    /// One frame: synchronize clocks, then update the replica.
    /// Returns the physics time step.
    pub fn update(&mut self, time_step: f32) -> ReplicaResult<f32> {
        let physics_step = self.synchronize_clocks(time_step);
        self.update_replica(time_step)?;
        Ok(physics_step)
    }

    pub fn clock(&self) -> &ClientReplicaClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut ClientReplicaClock {
        &mut self.clock
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Handle for enqueueing clock samples from another thread
    pub fn clock_inbox(&self) -> ClockInbox {
        self.inbox.clone()
    }

    pub fn objects(&self) -> &NetworkObjectRegistry {
        &self.objects
    }

    pub fn object(&self, network_id: NetworkId) -> Option<&dyn NetworkObject> {
        self.objects.get(network_id)
    }

    /// Live owned objects
    pub fn owned_objects(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.owned_objects
            .iter()
            .copied()
            .filter(|id| self.objects.contains(*id))
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// Frames of history interpolated objects should keep
    pub fn trace_capacity(&self) -> u32 {
        self.setting_frames(&TRACE_DURATION)
    }

    /// Frames an object may be extrapolated past its latest sample
    pub fn position_extrapolation_frames(&self) -> u32 {
        self.setting_frames(&POSITION_EXTRAPOLATION_TIME)
    }

    pub fn debug_info(&self) -> String {
        let clock = &self.clock;
        let mut info = String::new();
        let _ = writeln!(
            info,
            "Connection {}: {} objects, {} owned",
            self.connection.connection_id(),
            self.objects.len(),
            self.owned_objects().count()
        );
        let _ = writeln!(
            info,
            "Time: server {}, replica {}, input {}",
            clock.server_time(),
            clock.replica_time(),
            clock.input_time()
        );
        let _ = writeln!(
            info,
            "Input delay: {} frames, RTT {:.1} ms, jitter {:.1} ms, state {:?}",
            clock.input_delay(),
            clock.latency().median_round_trip() * 1000.0,
            clock.latency().jitter() * 1000.0,
            clock.state()
        );
        let _ = write!(
            info,
            "Clock samples: {} queued, {} stale, {} rejected",
            self.inbox.len(),
            clock.stale_updates(),
            clock.rejected_updates()
        );
        info
    }

    fn setting_frames(&self, setting: &NetworkSetting) -> u32 {
        // Optional settings always resolve; parsing already rejected bad values
        let seconds = self.clock.setting(setting).unwrap_or(0.0).max(0.0);
        self.clock.seconds_to_frames(seconds).ceil() as u32
    }

    fn process_add_objects(&mut self, msg: &MsgAddObjects) {
        for snapshot in &msg.objects {
            let network_id = snapshot.network_id;

            let reused = match self.objects.get_mut(network_id) {
                Some(object) if object.component_type() == snapshot.component_type => {
                    Self::initialize(object, msg.frame, &snapshot.payload, snapshot.is_owned);
                    true
                }
                _ => false,
            };

            if !reused {
                let Some(mut object) = self.factory.create(network_id, snapshot.component_type)
                else {
                    warn!(
                        %network_id,
                        component_type = ?snapshot.component_type,
                        "Cannot create network object"
                    );
                    continue;
                };
                Self::initialize(object.as_mut(), msg.frame, &snapshot.payload, snapshot.is_owned);

                match self.objects.insert(network_id, object) {
                    Ok(Some((previous_id, mut previous))) => {
                        debug!(%previous_id, %network_id, "Network object replaced");
                        previous.prepare_to_remove();
                        self.owned_objects.remove(&previous_id);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%network_id, error = %err, "Cannot store network object");
                        continue;
                    }
                }
                self.stats.objects_added += 1;
            }

            if snapshot.is_owned {
                self.owned_objects.insert(network_id);
            } else {
                self.owned_objects.remove(&network_id);
            }
        }
    }

    fn initialize(object: &mut dyn NetworkObject, frame: u64, payload: &[u8], is_owned: bool) {
        if let Err(err) = object.initialize_from_snapshot(frame, payload, is_owned) {
            warn!(error = %err, "Failed to read object snapshot");
        }
    }

    fn process_remove_objects(&mut self, msg: &MsgRemoveObjects) {
        for &network_id in &msg.network_ids {
            match self.objects.remove(network_id) {
                Some(mut object) => {
                    object.prepare_to_remove();
                    self.owned_objects.remove(&network_id);
                    self.stats.objects_removed += 1;
                }
                None => warn!(%network_id, "Cannot remove unknown network object"),
            }
        }
    }

    fn process_update_objects(&mut self, msg: &MsgUpdateObjects, reliable: bool) {
        for delta in &msg.deltas {
            let result = self
                .objects
                .get_checked(delta.network_id, delta.component_type)
                .and_then(|object| {
                    if reliable {
                        object.read_reliable_delta(msg.frame, &delta.payload)
                    } else {
                        object.read_unreliable_delta(msg.frame, &delta.payload)
                    }
                });

            match result {
                Ok(()) => self.stats.deltas_applied += 1,
                Err(err) => {
                    self.stats.deltas_dropped += 1;
                    warn!(network_id = %delta.network_id, error = %err, "Dropping object delta");
                }
            }
        }
    }

    fn send_objects_feedback(&mut self, input_frame: u64) -> ReplicaResult<()> {
        // Forget owned ids whose objects are gone
        let objects = &self.objects;
        self.owned_objects.retain(|id| objects.contains(*id));

        let mut ids: Vec<_> = self.owned_objects.iter().copied().collect();
        ids.sort_unstable();

        let entries: Vec<_> = ids
            .into_iter()
            .filter_map(|network_id| {
                let object = self.objects.get_mut(network_id)?;
                let payload = object.write_unreliable_feedback(input_frame)?;
                Some(ObjectFeedback {
                    network_id,
                    payload,
                })
            })
            .collect();

        if entries.is_empty() {
            return Ok(());
        }

        let msg = MsgObjectsFeedback {
            input_frame,
            entries,
        };
        let body = msg.to_bytes()?;
        self.connection
            .send_message(msg.message_id(), &body, Reliability::Unreliable)?;
        self.stats.feedback_sent += 1;
        trace!(input_frame, entries = msg.entries.len(), "Objects feedback sent");
        Ok(())
    }
}

impl<C: Connection> Drop for ClientNetworkManager<C> {
    fn drop(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use replica_core::network_settings::*;
    use replica_core::{ComponentType, ConnectionId, NetworkTime, ObjectDelta, ObjectSnapshot};
    use std::sync::Arc;

    const STEP: f32 = 1.0 / 30.0;

    #[derive(Default)]
    struct Journal {
        snapshots: Vec<(NetworkId, u64, bool)>,
        reliable: Vec<(NetworkId, u64)>,
        unreliable: Vec<(NetworkId, u64)>,
        removed: Vec<NetworkId>,
        interpolated: Vec<(NetworkId, NetworkTime)>,
    }

    type SharedJournal = Arc<Mutex<Journal>>;

    struct TestObject {
        id: NetworkId,
        journal: SharedJournal,
    }

    fn body_type() -> ComponentType {
        ComponentType::from_name("RigidBody")
    }

    impl NetworkObject for TestObject {
        fn component_type(&self) -> ComponentType {
            body_type()
        }

        fn initialize_from_snapshot(
            &mut self,
            frame: u64,
            _payload: &[u8],
            is_owned: bool,
        ) -> ReplicaResult<()> {
            self.journal.lock().snapshots.push((self.id, frame, is_owned));
            Ok(())
        }

        fn read_reliable_delta(&mut self, frame: u64, _payload: &[u8]) -> ReplicaResult<()> {
            self.journal.lock().reliable.push((self.id, frame));
            Ok(())
        }

        fn read_unreliable_delta(&mut self, frame: u64, _payload: &[u8]) -> ReplicaResult<()> {
            self.journal.lock().unreliable.push((self.id, frame));
            Ok(())
        }

        fn prepare_to_remove(&mut self) {
            self.journal.lock().removed.push(self.id);
        }

        fn interpolate_state(&mut self, _: f32, replica_time: NetworkTime, _: NetworkTime, _: bool) {
            self.journal.lock().interpolated.push((self.id, replica_time));
        }

        fn write_unreliable_feedback(&mut self, input_frame: u64) -> Option<Bytes> {
            Some(Bytes::copy_from_slice(&input_frame.to_le_bytes()))
        }
    }

    #[derive(Default)]
    struct TestConnection {
        sent: Vec<(MessageId, Vec<u8>, Reliability)>,
    }

    impl Connection for TestConnection {
        fn connection_id(&self) -> ConnectionId {
            ConnectionId(7)
        }

        fn send_message(
            &mut self,
            message_id: MessageId,
            payload: &[u8],
            reliability: Reliability,
        ) -> ReplicaResult<()> {
            self.sent.push((message_id, payload.to_vec(), reliability));
            Ok(())
        }
    }

    fn settings() -> ServerSettings {
        ServerSettings::new()
            .with(&UPDATE_FREQUENCY, 30u32)
            .with(&TIME_SNAP_THRESHOLD, 1.0)
            .with(&TIME_ERROR_TOLERANCE, 0.05)
            .with(&MIN_TIME_DILATION, 0.9)
            .with(&MAX_TIME_DILATION, 1.1)
            .with(&TRACE_DURATION, 0.5)
    }

    fn manager() -> (ClientNetworkManager<TestConnection>, SharedJournal) {
        let journal = SharedJournal::default();
        let factory_journal = journal.clone();
        let factory = move |id: NetworkId, ty: ComponentType| -> Option<Box<dyn NetworkObject>> {
            if ty != body_type() {
                return None;
            }
            Some(Box::new(TestObject {
                id,
                journal: factory_journal.clone(),
            }))
        };
        let manager = ClientNetworkManager::new(
            TestConnection::default(),
            Box::new(factory),
            &MsgSceneClock::new(100),
            &settings(),
        )
        .unwrap();
        (manager, journal)
    }

    fn add(ids: &[(NetworkId, bool)]) -> Vec<u8> {
        MsgAddObjects {
            frame: 100,
            objects: ids
                .iter()
                .map(|&(network_id, is_owned)| ObjectSnapshot {
                    network_id,
                    component_type: body_type(),
                    is_owned,
                    payload: Bytes::from_static(b"snapshot"),
                })
                .collect(),
        }
        .to_bytes()
        .unwrap()
        .to_vec()
    }

    #[test]
    fn test_add_update_remove() {
        let (mut manager, journal) = manager();
        let a = NetworkId::new(1, 0);
        let b = NetworkId::new(2, 0);

        manager
            .process_message(MessageId::AddObjects, &add(&[(a, false), (b, true)]))
            .unwrap();
        assert_eq!(manager.objects().len(), 2);
        assert_eq!(manager.owned_objects().collect::<Vec<_>>(), vec![b]);

        let update = MsgUpdateObjects {
            frame: 101,
            deltas: vec![ObjectDelta {
                network_id: a,
                component_type: body_type(),
                payload: Bytes::from_static(b"delta"),
            }],
        };
        let (id, body) = replica_wire::encode_update(&update, true).unwrap();
        manager.process_message(id, &body).unwrap();
        let (id, body) = replica_wire::encode_update(&update, false).unwrap();
        manager.process_message(id, &body).unwrap();

        let remove = MsgRemoveObjects {
            frame: 102,
            network_ids: vec![b],
        };
        manager
            .process_message(MessageId::RemoveObjects, &remove.to_bytes().unwrap())
            .unwrap();

        let journal = journal.lock();
        assert_eq!(journal.reliable, vec![(a, 101)]);
        assert_eq!(journal.unreliable, vec![(a, 101)]);
        assert_eq!(journal.removed, vec![b]);
        assert_eq!(manager.objects().len(), 1);
        assert_eq!(manager.owned_objects().count(), 0);
    }

    #[test]
    fn test_unknown_and_mistyped_deltas_skipped() {
        let (mut manager, _journal) = manager();
        let a = NetworkId::new(1, 0);
        manager
            .process_message(MessageId::AddObjects, &add(&[(a, false)]))
            .unwrap();

        let update = MsgUpdateObjects {
            frame: 101,
            deltas: vec![
                ObjectDelta {
                    network_id: NetworkId::new(9, 0),
                    component_type: body_type(),
                    payload: Bytes::new(),
                },
                ObjectDelta {
                    network_id: a,
                    component_type: ComponentType::from_name("Light"),
                    payload: Bytes::new(),
                },
            ],
        };
        let (id, body) = replica_wire::encode_update(&update, true).unwrap();
        manager.process_message(id, &body).unwrap();
        assert_eq!(manager.stats().deltas_dropped, 2);
        assert_eq!(manager.stats().deltas_applied, 0);
    }

    #[test]
    fn test_replaced_slot_notifies_old_object() {
        let (mut manager, journal) = manager();
        let old = NetworkId::new(4, 0);
        let new = NetworkId::new(4, 1);
        manager
            .process_message(MessageId::AddObjects, &add(&[(old, true)]))
            .unwrap();
        manager
            .process_message(MessageId::AddObjects, &add(&[(new, false)]))
            .unwrap();

        assert_eq!(journal.lock().removed, vec![old]);
        assert!(manager.object(old).is_none());
        assert!(manager.object(new).is_some());
        assert_eq!(manager.owned_objects().count(), 0);
    }

    #[test]
    fn test_malformed_clock_leaves_clock_untouched() {
        let (mut manager, _journal) = manager();
        let before = manager.clock().server_time();
        assert!(manager
            .process_message(MessageId::SceneClock, &[1, 2, 3])
            .is_err());
        manager.synchronize_clocks(0.0);
        assert_eq!(manager.clock().server_time(), before);
        assert!(matches!(
            manager.process_raw_message(0xEE, &[]),
            Err(ReplicaError::UnknownMessage(0xEE))
        ));
    }

    #[test]
    fn test_clock_samples_flow_through_inbox() {
        let (mut manager, _journal) = manager();
        let inbox = manager.clock_inbox();
        inbox.push(MsgSceneClock::new(90));

        let body = MsgSceneClock::new(101).to_bytes().unwrap();
        manager.process_message(MessageId::SceneClock, &body).unwrap();

        manager.synchronize_clocks(STEP);
        assert!(manager.clock_inbox().is_empty());
        // 90 predates the initial frame and is discarded
        assert_eq!(manager.clock().latest_server_frame(), 101);
        assert_eq!(manager.clock().stale_updates(), 1);
    }

    #[test]
    fn test_out_of_range_clock_sample_ignored() {
        let (mut manager, _journal) = manager();
        let body = MsgSceneClock::new(u64::MAX).to_bytes().unwrap();
        manager.process_message(MessageId::SceneClock, &body).unwrap();
        assert_eq!(manager.clock_inbox().len(), 1);
        assert!(manager.debug_info().contains("1 queued"));

        manager.synchronize_clocks(STEP);
        let clock = manager.clock();
        assert_eq!(clock.rejected_updates(), 1);
        assert_eq!(clock.latest_server_frame(), 100);
        assert!(clock.replica_time() <= clock.server_time());
        assert!(clock.server_time() <= clock.input_time());
        assert!(manager.debug_info().contains("0 queued, 0 stale, 1 rejected"));

        let body = MsgSceneClock::new(101).to_bytes().unwrap();
        manager.process_message(MessageId::SceneClock, &body).unwrap();
        manager.synchronize_clocks(STEP);
        assert_eq!(manager.clock().latest_server_frame(), 101);
    }

    #[test]
    fn test_feedback_sent_on_new_input_frame() {
        let (mut manager, journal) = manager();
        let owned = NetworkId::new(3, 0);
        manager
            .process_message(MessageId::AddObjects, &add(&[(owned, true)]))
            .unwrap();

        let mut sent_frames = Vec::new();
        for _ in 0..10 {
            manager.update(STEP).unwrap();
            if manager.clock().is_new_input_frame() {
                sent_frames.push(manager.clock().input_time().frame() as u64);
            }
        }

        let sent = &manager.connection().sent;
        assert!(!sent.is_empty());
        assert_eq!(sent.len(), sent_frames.len());
        for ((id, body, reliability), frame) in sent.iter().zip(&sent_frames) {
            assert_eq!(*id, MessageId::ObjectsFeedbackUnreliable);
            assert_eq!(*reliability, Reliability::Unreliable);
            let msg = MsgObjectsFeedback::decode(body).unwrap();
            assert_eq!(msg.input_frame, *frame);
            assert_eq!(msg.entries.len(), 1);
            assert_eq!(msg.entries[0].network_id, owned);
        }
        assert_eq!(journal.lock().interpolated.len(), 10);
    }

    #[test]
    fn test_no_feedback_without_owned_objects() {
        let (mut manager, _journal) = manager();
        manager
            .process_message(MessageId::AddObjects, &add(&[(NetworkId::new(1, 0), false)]))
            .unwrap();
        for _ in 0..5 {
            manager.update(STEP).unwrap();
        }
        assert!(manager.connection().sent.is_empty());
    }

    #[test]
    fn test_setting_derived_frames() {
        let (manager, _journal) = manager();
        assert_eq!(manager.trace_capacity(), 15);
        // Default 0.25s at 30 Hz
        assert_eq!(manager.position_extrapolation_frames(), 8);
        assert!(manager.debug_info().contains("Connection #7"));
    }

    #[test]
    fn test_drop_notifies_objects() {
        let (mut manager, journal) = manager();
        manager
            .process_message(
                MessageId::AddObjects,
                &add(&[(NetworkId::new(1, 0), false), (NetworkId::new(2, 0), false)]),
            )
            .unwrap();
        drop(manager);
        assert_eq!(journal.lock().removed.len(), 2);
    }
}
