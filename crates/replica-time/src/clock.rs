//! Client replica clock
//!
//! Reconstructs server time from irregular `MsgSceneClock` samples and derives:
//! - Replica time: trails server time by the interpolation delay
//! - Input time: leads server time by the input delay
//!
//! INVARIANT: `replica_time <= server_time <= input_time` after construction and after
//! every step.

use std::collections::VecDeque;

use replica_core::{
    ConfigError, MsgSceneClock, NetworkSetting, NetworkTime, ServerSettings, MAX_SERVER_FRAME,
};
use tracing::{debug, trace, warn};

use crate::{
    ClockAxis, ClockEvent, ClockSettings, LatencyModel, PhysicsTickAligner, SoftNetworkTime,
    TrackStep,
};

/// Events kept until drained; older ones are dropped first
pub const MAX_QUEUED_EVENTS: usize = 256;

/// Slack when rounding input delay up to whole frames
const FRAME_EPSILON: f64 = 1e-9;

/// Synchronization state of the last step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    /// All axes followed their targets by dilation
    Synchronized,
    /// At least one axis snapped during the last step
    Resyncing,
}

/// Per-connection clock driving replica and input time
#[derive(Debug)]
pub struct ClientReplicaClock {
    settings: ClockSettings,
    server_settings: ServerSettings,

    server_time: NetworkTime,
    /// Correction not yet blended into server time, in frames
    server_time_error: f64,
    /// Server time was snapped; tracks reset on the next step
    resync_pending: bool,
    latest_server_frame: u64,

    replica_time: SoftNetworkTime,
    input_time: SoftNetworkTime,
    input_delay: u32,
    latest_scaled_input_time: NetworkTime,
    synchronized_physics_tick: Option<u32>,

    aligner: PhysicsTickAligner,
    latency: LatencyModel,

    state: ClockState,
    stale_updates: u64,
    rejected_updates: u64,
    events: VecDeque<ClockEvent>,
}

impl ClientReplicaClock {
    /// Create a clock from the first clock sample and the server settings
    pub fn new(
        initial_clock: &MsgSceneClock,
        server_settings: &ServerSettings,
    ) -> Result<Self, ConfigError> {
        let settings = ClockSettings::from_server_settings(server_settings)?;
        if initial_clock.frame > MAX_SERVER_FRAME {
            return Err(ConfigError::InitialFrameOutOfRange {
                frame: initial_clock.frame,
            });
        }

        let mut latency = LatencyModel::new();
        latency.update(initial_clock.one_way_latency() * 2.0);

        let mut clock = ClientReplicaClock {
            server_time: NetworkTime::ZERO,
            server_time_error: 0.0,
            resync_pending: false,
            latest_server_frame: initial_clock.frame,
            replica_time: SoftNetworkTime::new(settings.update_frequency, NetworkTime::ZERO),
            input_time: SoftNetworkTime::new(settings.update_frequency, NetworkTime::ZERO),
            input_delay: 1,
            latest_scaled_input_time: NetworkTime::ZERO,
            synchronized_physics_tick: None,
            aligner: PhysicsTickAligner::new(settings.physics_frequency),
            latency,
            state: ClockState::Synchronized,
            stale_updates: 0,
            rejected_updates: 0,
            events: VecDeque::new(),
            server_settings: server_settings.clone(),
            settings,
        };

        clock.server_time = clock.project_sample(initial_clock);
        clock.input_delay = clock.target_input_delay();
        clock.replica_time.reset(clock.to_replica_time(clock.server_time));
        clock.input_time.reset(clock.to_input_time(clock.server_time));
        clock.latest_scaled_input_time = clock.input_time.get();

        debug!(
            frame = initial_clock.frame,
            server_time = %clock.server_time,
            input_delay = clock.input_delay,
            "Replica clock started"
        );
        Ok(clock)
    }

    /// Apply one server clock sample.
    ///
    /// With `skip_outdated`, samples older than the latest applied frame are discarded.
    /// Samples beyond `MAX_SERVER_FRAME` are always discarded.
    pub fn update_server_time(&mut self, msg: &MsgSceneClock, skip_outdated: bool) {
        if msg.frame > MAX_SERVER_FRAME {
            self.rejected_updates += 1;
            warn!(frame = msg.frame, "Ignoring clock update beyond frame range");
            return;
        }

        if skip_outdated && msg.frame < self.latest_server_frame {
            self.stale_updates += 1;
            debug!(
                frame = msg.frame,
                latest = self.latest_server_frame,
                "Ignoring outdated clock update"
            );
            self.push_event(ClockEvent::StaleUpdate {
                frame: msg.frame,
                latest: self.latest_server_frame,
            });
            return;
        }

        self.latest_server_frame = msg.frame;
        self.latency.update(msg.round_trip_ms as f64 / 1000.0);

        let sample = self.project_sample(msg);
        let error = sample - self.server_time;

        // A delayed packet makes server time look behind; allow for the jitter envelope
        let tolerance = if error < 0.0 {
            self.settings.time_error_tolerance + self.latency.jitter()
        } else {
            self.settings.time_error_tolerance
        };

        if error.abs() > self.seconds_to_frames(self.settings.time_snap_threshold) {
            let error_seconds = error / self.update_frequency() as f64;
            warn!(
                frame = msg.frame,
                error_seconds,
                "Server time desynchronized, snapping"
            );
            self.server_time = sample;
            self.server_time_error = 0.0;
            self.resync_pending = true;
            self.push_event(ClockEvent::Desync {
                axis: ClockAxis::Server,
                error_seconds,
            });
        } else if error.abs() <= self.seconds_to_frames(tolerance) {
            self.server_time_error = 0.0;
        } else {
            self.server_time_error = error;
        }
    }

    /// Apply the elapsed wall time and every pending clock update.
    ///
    /// Pending updates are applied oldest first and the queue is cleared. Returns the
    /// scaled time step the local simulation should advance by.
    pub fn apply_time_step(&mut self, time_step: f32, pending: &mut Vec<MsgSceneClock>) -> f32 {
        for msg in pending.drain(..) {
            self.update_server_time(&msg, true);
        }
        self.update_input_delay();

        let mut snapped = false;
        let wall_step = if time_step.is_finite() && time_step > 0.0 {
            time_step as f64
        } else {
            0.0
        };
        let track_step = wall_step as f32;

        let previous_server_time = self.server_time;
        if wall_step > 0.0 {
            self.advance_server_time(wall_step);
        }

        let replica_target = self.to_replica_time(self.server_time);
        let input_target = self.to_input_time(self.server_time);

        if self.resync_pending {
            // Restart both tracks from the snapped server time
            self.resync_pending = false;
            self.replica_time
                .reset(self.to_replica_time(previous_server_time));
            self.input_time.reset(self.to_input_time(previous_server_time));
            self.aligner.reset();
            snapped = true;
        }

        let previous_input = self.input_time.get();
        let (min, max, snap) = (
            self.settings.min_time_dilation,
            self.settings.max_time_dilation,
            self.settings.time_snap_threshold,
        );

        let replica_step = self
            .replica_time
            .update_to(replica_target, track_step, min, max, snap);
        snapped |= self.report_track_snap(ClockAxis::Replica, &replica_step);

        let input_step = self
            .input_time
            .update_to(input_target, track_step, min, max, snap);
        snapped |= self.report_track_snap(ClockAxis::Input, &input_step);

        // Rounding can leave a track a hair past server time
        if self.replica_time.get() > self.server_time {
            self.replica_time.reset(self.server_time);
        }
        if self.input_time.get() < self.server_time {
            self.input_time.reset(self.server_time);
        }

        self.synchronized_physics_tick = self.aligner.align(
            previous_input,
            self.input_time.get(),
            input_step.scaled_time_step,
        );
        self.latest_scaled_input_time = self.input_time.get();
        self.state = if snapped {
            ClockState::Resyncing
        } else {
            ClockState::Synchronized
        };

        trace!(
            server = %self.server_time,
            replica = %self.replica_time.get(),
            input = %self.input_time.get(),
            dilation = input_step.dilation,
            tick = ?self.synchronized_physics_tick,
            "Clock step"
        );

        input_step.scaled_time_step
    }

    /// Predicted exact server time
    #[inline]
    pub fn server_time(&self) -> NetworkTime {
        self.server_time
    }

    /// Interpolation time, always behind server time
    #[inline]
    pub fn replica_time(&self) -> NetworkTime {
        self.replica_time.get()
    }

    /// Time at which input gathered now is processed on the server
    #[inline]
    pub fn input_time(&self) -> NetworkTime {
        self.input_time.get()
    }

    /// Whether the last step started a new input frame
    #[inline]
    pub fn is_new_input_frame(&self) -> bool {
        self.synchronized_physics_tick.is_some()
    }

    pub fn latest_scaled_input_time(&self) -> NetworkTime {
        self.latest_scaled_input_time
    }

    /// Physics sub-step of the last frame at which the current input frame begins
    pub fn synchronized_physics_tick(&self) -> Option<u32> {
        self.synchronized_physics_tick
    }

    /// Lead of input time over server time, in frames
    pub fn input_delay(&self) -> u32 {
        self.input_delay
    }

    pub fn latest_server_frame(&self) -> u64 {
        self.latest_server_frame
    }

    pub fn update_frequency(&self) -> u32 {
        self.settings.update_frequency
    }

    #[inline]
    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        self.settings.seconds_to_frames(seconds)
    }

    /// Numeric value of any server setting, falling back to its default
    pub fn setting(&self, setting: &NetworkSetting) -> Result<f64, ConfigError> {
        self.server_settings.get(setting)
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    pub fn latency(&self) -> &LatencyModel {
        &self.latency
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Number of outdated updates discarded so far
    pub fn stale_updates(&self) -> u64 {
        self.stale_updates
    }

    /// Number of updates discarded for carrying an out-of-range frame
    pub fn rejected_updates(&self) -> u64 {
        self.rejected_updates
    }

    /// Drain queued clock events
    pub fn take_events(&mut self) -> Vec<ClockEvent> {
        self.events.drain(..).collect()
    }

    /// Server time at which a sample was taken, projected to its arrival
    fn project_sample(&self, msg: &MsgSceneClock) -> NetworkTime {
        let sub_frame = if msg.sub_frame.is_finite() {
            (msg.sub_frame as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        NetworkTime::from_server_frame(msg.frame)
            + sub_frame
            + self.seconds_to_frames(msg.one_way_latency())
    }

    fn to_replica_time(&self, server_time: NetworkTime) -> NetworkTime {
        server_time - self.seconds_to_frames(self.settings.interpolation_delay)
    }

    fn to_input_time(&self, server_time: NetworkTime) -> NetworkTime {
        server_time + self.input_delay as f64
    }

    /// Advance server time by a wall step and blend in part of the pending correction
    fn advance_server_time(&mut self, wall_step: f64) {
        let step_frames = self.seconds_to_frames(wall_step);
        let blend = 1.0 - (-wall_step / self.settings.server_time_smoothing).exp();
        let correction = (self.server_time_error * blend).clamp(
            (self.settings.min_time_dilation - 1.0) * step_frames,
            (self.settings.max_time_dilation - 1.0) * step_frames,
        );

        self.server_time += step_frames + correction;
        self.server_time_error -= correction;
    }

    fn target_input_delay(&self) -> u32 {
        let lead_seconds = self.latency.one_way_latency() + 2.0 * self.latency.jitter();
        let frames = (self.seconds_to_frames(lead_seconds) - FRAME_EPSILON)
            .ceil()
            .max(0.0) as u32;
        frames
            .saturating_add(self.settings.input_buffer_frames)
            .clamp(1, self.settings.max_input_delay_frames())
    }

    /// Grow input delay at once; shrink it one frame per step
    fn update_input_delay(&mut self) {
        let target = self.target_input_delay();
        let previous = self.input_delay;
        if target > self.input_delay {
            self.input_delay = target;
        } else if target + 1 < self.input_delay {
            self.input_delay -= 1;
        }

        if self.input_delay != previous {
            debug!(
                from = previous,
                to = self.input_delay,
                "Input delay changed"
            );
        }
    }

    fn report_track_snap(&mut self, axis: ClockAxis, step: &TrackStep) -> bool {
        if !step.snapped {
            return false;
        }
        let error_seconds = step.error / self.update_frequency() as f64;
        warn!(%axis, error_seconds, "Clock axis snapped");
        self.push_event(ClockEvent::Desync {
            axis,
            error_seconds,
        });
        true
    }

    fn push_event(&mut self, event: ClockEvent) {
        if self.events.len() >= MAX_QUEUED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}
