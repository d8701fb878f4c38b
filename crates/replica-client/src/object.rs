//! Replicated network objects and their registry
//!
//! Objects are addressed by `NetworkId` (slot index + version). The registry keeps one
//! object per slot and only resolves an id whose version matches the live object, so
//! ids held elsewhere never observe a newer object reusing the slot.

use bytes::Bytes;
use replica_core::{ComponentType, NetworkId, NetworkTime, ReplicaError, ReplicaResult};

/// Client side of a replicated object
pub trait NetworkObject {
    fn component_type(&self) -> ComponentType;

    /// Apply the full state sent when the object enters scope
    fn initialize_from_snapshot(
        &mut self,
        frame: u64,
        payload: &[u8],
        is_owned: bool,
    ) -> ReplicaResult<()>;

    fn read_reliable_delta(&mut self, frame: u64, payload: &[u8]) -> ReplicaResult<()>;

    fn read_unreliable_delta(&mut self, frame: u64, payload: &[u8]) -> ReplicaResult<()>;

    /// Called once before the object is dropped by the registry
    fn prepare_to_remove(&mut self) {}

    /// Advance presentation state for this frame
    fn interpolate_state(
        &mut self,
        _time_step: f32,
        _replica_time: NetworkTime,
        _input_time: NetworkTime,
        _is_new_input_frame: bool,
    ) {
    }

    /// Feedback for the given input frame; owned objects only
    fn write_unreliable_feedback(&mut self, _input_frame: u64) -> Option<Bytes> {
        None
    }
}

/// Creates objects for ids announced by the server
pub trait NetworkObjectFactory {
    fn create(
        &mut self,
        network_id: NetworkId,
        component_type: ComponentType,
    ) -> Option<Box<dyn NetworkObject>>;
}

impl<F> NetworkObjectFactory for F
where
    F: FnMut(NetworkId, ComponentType) -> Option<Box<dyn NetworkObject>>,
{
    fn create(
        &mut self,
        network_id: NetworkId,
        component_type: ComponentType,
    ) -> Option<Box<dyn NetworkObject>> {
        self(network_id, component_type)
    }
}

struct Slot {
    network_id: NetworkId,
    object: Box<dyn NetworkObject>,
}

/// Generational storage of live network objects
#[derive(Default)]
pub struct NetworkObjectRegistry {
    slots: Vec<Option<Slot>>,
    len: usize,
}

/// Highest slot index addressable by a `NetworkId`
const MAX_SLOTS: usize = 1 << replica_core::NETWORK_ID_INDEX_BITS;

impl NetworkObjectRegistry {
    pub fn new() -> Self {
        NetworkObjectRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `network_id` refers to the object currently in its slot
    pub fn contains(&self, network_id: NetworkId) -> bool {
        self.get(network_id).is_some()
    }

    pub fn get(&self, network_id: NetworkId) -> Option<&dyn NetworkObject> {
        match self.slots.get(network_id.index() as usize) {
            Some(Some(slot)) if slot.network_id == network_id => Some(slot.object.as_ref()),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, network_id: NetworkId) -> Option<&mut (dyn NetworkObject + 'static)> {
        match self.slots.get_mut(network_id.index() as usize) {
            Some(Some(slot)) if slot.network_id == network_id => Some(slot.object.as_mut()),
            _ => None,
        }
    }

    /// Live object whose component type matches
    pub fn get_checked(
        &mut self,
        network_id: NetworkId,
        component_type: ComponentType,
    ) -> ReplicaResult<&mut (dyn NetworkObject + 'static)> {
        let object = self
            .get_mut(network_id)
            .ok_or(ReplicaError::UnknownObject(network_id))?;
        let actual = object.component_type();
        if actual != component_type {
            return Err(ReplicaError::ObjectTypeMismatch {
                network_id,
                expected: component_type,
                actual,
            });
        }
        Ok(object)
    }

    /// Store an object, returning whatever occupied its slot before
    pub fn insert(
        &mut self,
        network_id: NetworkId,
        object: Box<dyn NetworkObject>,
    ) -> ReplicaResult<Option<(NetworkId, Box<dyn NetworkObject>)>> {
        if network_id == NetworkId::INVALID {
            return Err(ReplicaError::UnknownObject(network_id));
        }
        let index = network_id.index() as usize;
        if index >= MAX_SLOTS {
            return Err(ReplicaError::RegistryFull);
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }

        let previous = self.slots[index].replace(Slot { network_id, object });
        match previous {
            Some(slot) => Ok(Some((slot.network_id, slot.object))),
            None => {
                self.len += 1;
                Ok(None)
            }
        }
    }

    /// Take an object out of the registry if the id is still live
    pub fn remove(&mut self, network_id: NetworkId) -> Option<Box<dyn NetworkObject>> {
        let index = network_id.index() as usize;
        let entry = self.slots.get_mut(index)?;
        if !matches!(entry, Some(slot) if slot.network_id == network_id) {
            return None;
        }
        let slot = entry.take()?;
        self.len -= 1;
        Some(slot.object)
    }

    pub fn ids(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.slots.iter().flatten().map(|slot| slot.network_id)
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (NetworkId, &mut (dyn NetworkObject + 'static))> + '_ {
        self.slots
            .iter_mut()
            .flatten()
            .map(|slot| (slot.network_id, slot.object.as_mut()))
    }

    /// Remove every object, notifying each
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().filter_map(Option::take) {
            let mut object = slot.object;
            object.prepare_to_remove();
        }
        self.len = 0;
    }
}

impl std::fmt::Debug for NetworkObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkObjectRegistry")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}
