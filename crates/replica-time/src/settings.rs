//! Typed clock configuration parsed from the server settings map

use replica_core::network_settings::*;
use replica_core::{ConfigError, NetworkSetting, ServerSettings};

/// Validated clock settings
#[derive(Clone, Debug, PartialEq)]
pub struct ClockSettings {
    /// Network frames per second
    pub update_frequency: u32,
    /// Seconds of error above which an axis snaps
    pub time_snap_threshold: f64,
    /// Seconds of sample error ignored as noise
    pub time_error_tolerance: f64,
    pub min_time_dilation: f64,
    pub max_time_dilation: f64,
    /// Seconds replica time trails server time
    pub interpolation_delay: f64,
    pub physics_frequency: u32,
    /// Frames of input lead on top of the latency estimate
    pub input_buffer_frames: u32,
    /// Upper bound of input delay in seconds
    pub max_input_delay: f64,
    /// Time constant of the server time blend in seconds
    pub server_time_smoothing: f64,
    pub trace_duration: f64,
    pub position_extrapolation_time: f64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        ClockSettings {
            update_frequency: 30,
            time_snap_threshold: 1.0,
            time_error_tolerance: 0.05,
            min_time_dilation: 0.9,
            max_time_dilation: 1.1,
            interpolation_delay: 0.1,
            physics_frequency: 60,
            input_buffer_frames: 1,
            max_input_delay: 0.5,
            server_time_smoothing: 0.25,
            trace_duration: 1.0,
            position_extrapolation_time: 0.25,
        }
    }
}

fn out_of_range(setting: &NetworkSetting, value: f64, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        name: setting.name,
        value,
        reason,
    }
}

impl ClockSettings {
    /// Parse and validate settings, applying defaults for optional ones
    pub fn from_server_settings(settings: &ServerSettings) -> Result<Self, ConfigError> {
        let parsed = ClockSettings {
            update_frequency: settings.get_positive_int(&UPDATE_FREQUENCY)?,
            time_snap_threshold: settings.get(&TIME_SNAP_THRESHOLD)?,
            time_error_tolerance: settings.get_non_negative(&TIME_ERROR_TOLERANCE)?,
            min_time_dilation: settings.get(&MIN_TIME_DILATION)?,
            max_time_dilation: settings.get(&MAX_TIME_DILATION)?,
            interpolation_delay: settings.get_non_negative(&INTERPOLATION_DELAY)?,
            physics_frequency: settings.get_positive_int(&PHYSICS_FREQUENCY)?,
            input_buffer_frames: settings.get_positive_int(&INPUT_BUFFER_FRAMES)?,
            max_input_delay: settings.get(&MAX_INPUT_DELAY)?,
            server_time_smoothing: settings.get(&SERVER_TIME_SMOOTHING)?,
            trace_duration: settings.get_non_negative(&TRACE_DURATION)?,
            position_extrapolation_time: settings.get_non_negative(&POSITION_EXTRAPOLATION_TIME)?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_frequency == 0 {
            return Err(out_of_range(&UPDATE_FREQUENCY, 0.0, "must be a positive integer"));
        }
        if self.physics_frequency == 0 {
            return Err(out_of_range(&PHYSICS_FREQUENCY, 0.0, "must be a positive integer"));
        }
        if self.input_buffer_frames == 0 {
            return Err(out_of_range(&INPUT_BUFFER_FRAMES, 0.0, "must be a positive integer"));
        }
        if !(self.min_time_dilation > 0.0 && self.min_time_dilation <= 1.0) {
            return Err(out_of_range(
                &MIN_TIME_DILATION,
                self.min_time_dilation,
                "must be in (0, 1]",
            ));
        }
        if !(self.max_time_dilation >= 1.0) || !self.max_time_dilation.is_finite() {
            return Err(out_of_range(
                &MAX_TIME_DILATION,
                self.max_time_dilation,
                "must be at least 1",
            ));
        }
        if !(self.time_error_tolerance >= 0.0) {
            return Err(out_of_range(
                &TIME_ERROR_TOLERANCE,
                self.time_error_tolerance,
                "must not be negative",
            ));
        }
        if !(self.time_snap_threshold > self.time_error_tolerance) {
            return Err(out_of_range(
                &TIME_SNAP_THRESHOLD,
                self.time_snap_threshold,
                "must exceed timeErrorTolerance",
            ));
        }
        if !(self.interpolation_delay >= 0.0) {
            return Err(out_of_range(
                &INTERPOLATION_DELAY,
                self.interpolation_delay,
                "must not be negative",
            ));
        }
        if !(self.max_input_delay > 0.0) {
            return Err(out_of_range(
                &MAX_INPUT_DELAY,
                self.max_input_delay,
                "must be positive",
            ));
        }
        if !(self.server_time_smoothing > 0.0) {
            return Err(out_of_range(
                &SERVER_TIME_SMOOTHING,
                self.server_time_smoothing,
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Settings map describing these values
    pub fn to_server_settings(&self) -> ServerSettings {
        ServerSettings::new()
            .with(&UPDATE_FREQUENCY, self.update_frequency)
            .with(&TIME_SNAP_THRESHOLD, self.time_snap_threshold)
            .with(&TIME_ERROR_TOLERANCE, self.time_error_tolerance)
            .with(&MIN_TIME_DILATION, self.min_time_dilation)
            .with(&MAX_TIME_DILATION, self.max_time_dilation)
            .with(&INTERPOLATION_DELAY, self.interpolation_delay)
            .with(&PHYSICS_FREQUENCY, self.physics_frequency)
            .with(&INPUT_BUFFER_FRAMES, self.input_buffer_frames)
            .with(&MAX_INPUT_DELAY, self.max_input_delay)
            .with(&SERVER_TIME_SMOOTHING, self.server_time_smoothing)
            .with(&TRACE_DURATION, self.trace_duration)
            .with(&POSITION_EXTRAPOLATION_TIME, self.position_extrapolation_time)
    }

    /// Convert seconds to network frames
    #[inline]
    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds * self.update_frequency as f64
    }

    /// Upper bound of input delay in whole frames, at least one
    pub fn max_input_delay_frames(&self) -> u32 {
        (self.seconds_to_frames(self.max_input_delay).ceil() as u32).max(1)
    }
}
