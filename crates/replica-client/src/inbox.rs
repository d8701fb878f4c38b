//! Clock sample handoff from the receiving thread to the owning thread

use std::sync::Arc;

use parking_lot::Mutex;
use replica_core::MsgSceneClock;

/// Shared queue of clock samples.
/// Clones refer to the same queue; samples are drained in push order.
#[derive(Clone, Debug, Default)]
pub struct ClockInbox {
    queue: Arc<Mutex<Vec<MsgSceneClock>>>,
}

impl ClockInbox {
    pub fn new() -> Self {
        ClockInbox::default()
    }

    pub fn push(&self, msg: MsgSceneClock) {
        self.queue.lock().push(msg);
    }

    /// Move every queued sample to the end of `out`
    pub fn drain_into(&self, out: &mut Vec<MsgSceneClock>) {
        out.append(&mut self.queue.lock());
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
