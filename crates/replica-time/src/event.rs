//! Clock events surfaced to the session layer

use std::fmt;

/// Time axis a desync was observed on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClockAxis {
    Server,
    Replica,
    Input,
}

impl fmt::Display for ClockAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockAxis::Server => write!(f, "server"),
            ClockAxis::Replica => write!(f, "replica"),
            ClockAxis::Input => write!(f, "input"),
        }
    }
}

/// Noteworthy clock transitions, drained with `ClientReplicaClock::take_events`
#[derive(Clone, Debug, PartialEq)]
pub enum ClockEvent {
    /// A clock update older than the latest one was ignored
    StaleUpdate { frame: u64, latest: u64 },
    /// An axis was off by more than the snap threshold and jumped
    Desync { axis: ClockAxis, error_seconds: f64 },
}

impl ClockEvent {
    pub fn is_desync(&self) -> bool {
        matches!(self, ClockEvent::Desync { .. })
    }
}
