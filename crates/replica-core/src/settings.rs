//! Server settings delivered to the client when a replicated scene starts
//!
//! Settings arrive as a loosely typed key/value map. Each known setting is described by
//! a [`NetworkSetting`]; settings without a default are required.

use std::collections::HashMap;
use std::fmt;

use crate::ConfigError;

/// Loosely typed setting value
#[derive(Clone, Debug, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SettingValue {
    /// Numeric view of the value; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Int(v) => Some(*v as f64),
            SettingValue::Float(v) => Some(*v),
            SettingValue::Bool(_) | SettingValue::Str(_) => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<u32> for SettingValue {
    fn from(v: u32) -> Self {
        SettingValue::Int(v as i64)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<f32> for SettingValue {
    fn from(v: f32) -> Self {
        SettingValue::Float(v as f64)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Str(v.to_owned())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{}", v),
            SettingValue::Int(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Descriptor of a numeric setting
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkSetting {
    pub name: &'static str,
    /// `None` marks a required setting
    pub default: Option<f64>,
}

impl NetworkSetting {
    pub const fn required(name: &'static str) -> Self {
        NetworkSetting {
            name,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, default: f64) -> Self {
        NetworkSetting {
            name,
            default: Some(default),
        }
    }
}

/// Settings understood by the client replica
pub mod network_settings {
    use super::NetworkSetting;

    /// Network frames per second
    pub const UPDATE_FREQUENCY: NetworkSetting = NetworkSetting::required("updateFrequency");
    /// Error in seconds above which a time axis is snapped instead of dilated
    pub const TIME_SNAP_THRESHOLD: NetworkSetting = NetworkSetting::required("timeSnapThreshold");
    /// Error in seconds below which a server time sample causes no correction
    pub const TIME_ERROR_TOLERANCE: NetworkSetting = NetworkSetting::required("timeErrorTolerance");
    pub const MIN_TIME_DILATION: NetworkSetting = NetworkSetting::required("minTimeDilation");
    pub const MAX_TIME_DILATION: NetworkSetting = NetworkSetting::required("maxTimeDilation");

    /// Seconds by which replica time trails server time
    pub const INTERPOLATION_DELAY: NetworkSetting =
        NetworkSetting::optional("interpolationDelay", 0.1);
    /// Physics steps per second of the client simulation
    pub const PHYSICS_FREQUENCY: NetworkSetting = NetworkSetting::optional("physicsFrequency", 60.0);
    /// Frames of input lead added on top of the latency estimate
    pub const INPUT_BUFFER_FRAMES: NetworkSetting =
        NetworkSetting::optional("inputBufferFrames", 1.0);
    /// Upper bound of input delay in seconds
    pub const MAX_INPUT_DELAY: NetworkSetting = NetworkSetting::optional("maxInputDelay", 0.5);
    /// Time constant in seconds of the server time blend
    pub const SERVER_TIME_SMOOTHING: NetworkSetting =
        NetworkSetting::optional("serverTimeSmoothing", 0.25);
    /// Seconds of history kept by interpolated objects
    pub const TRACE_DURATION: NetworkSetting = NetworkSetting::optional("traceDuration", 1.0);
    /// Seconds an object may be extrapolated past its latest sample
    pub const POSITION_EXTRAPOLATION_TIME: NetworkSetting =
        NetworkSetting::optional("positionExtrapolationTime", 0.25);

    pub const ALL: [NetworkSetting; 12] = [
        UPDATE_FREQUENCY,
        TIME_SNAP_THRESHOLD,
        TIME_ERROR_TOLERANCE,
        MIN_TIME_DILATION,
        MAX_TIME_DILATION,
        INTERPOLATION_DELAY,
        PHYSICS_FREQUENCY,
        INPUT_BUFFER_FRAMES,
        MAX_INPUT_DELAY,
        SERVER_TIME_SMOOTHING,
        TRACE_DURATION,
        POSITION_EXTRAPOLATION_TIME,
    ];
}

/// Key/value settings map sent by the server
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerSettings {
    values: HashMap<String, SettingValue>,
}

impl ServerSettings {
    pub fn new() -> Self {
        ServerSettings::default()
    }

    /// Builder-style insert
    pub fn with(mut self, setting: &NetworkSetting, value: impl Into<SettingValue>) -> Self {
        self.insert(setting.name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<SettingValue> {
        self.values.remove(name)
    }

    /// Raw value by name
    pub fn get_raw(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Numeric value of a setting, falling back to its default
    pub fn get(&self, setting: &NetworkSetting) -> Result<f64, ConfigError> {
        match self.values.get(setting.name) {
            Some(value) => {
                let number = value.as_f64().ok_or(ConfigError::TypeMismatch {
                    name: setting.name,
                    expected: "number",
                })?;
                if !number.is_finite() {
                    return Err(ConfigError::OutOfRange {
                        name: setting.name,
                        value: number,
                        reason: "must be finite",
                    });
                }
                Ok(number)
            }
            None => setting
                .default
                .ok_or(ConfigError::MissingSetting { name: setting.name }),
        }
    }

    /// Positive integer value of a setting
    pub fn get_positive_int(&self, setting: &NetworkSetting) -> Result<u32, ConfigError> {
        let value = self.get(setting)?;
        if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(ConfigError::OutOfRange {
                name: setting.name,
                value,
                reason: "must be a positive integer",
            });
        }
        Ok(value as u32)
    }

    /// Non-negative value of a setting
    pub fn get_non_negative(&self, setting: &NetworkSetting) -> Result<f64, ConfigError> {
        let value = self.get(setting)?;
        if value < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: setting.name,
                value,
                reason: "must not be negative",
            });
        }
        Ok(value)
    }
}

impl FromIterator<(String, SettingValue)> for ServerSettings {
    fn from_iter<I: IntoIterator<Item = (String, SettingValue)>>(iter: I) -> Self {
        ServerSettings {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::network_settings::*;
    use super::*;

    #[test]
    fn test_default_applies_when_absent() {
        let settings = ServerSettings::new();
        assert_eq!(settings.get(&INTERPOLATION_DELAY), Ok(0.1));
    }

    #[test]
    fn test_required_setting_missing() {
        let settings = ServerSettings::new();
        assert_eq!(
            settings.get(&UPDATE_FREQUENCY),
            Err(ConfigError::MissingSetting {
                name: "updateFrequency"
            })
        );
    }

    #[test]
    fn test_int_widens_to_float() {
        let settings = ServerSettings::new().with(&MAX_TIME_DILATION, 2i64);
        assert_eq!(settings.get(&MAX_TIME_DILATION), Ok(2.0));
    }

    #[test]
    fn test_type_mismatch() {
        let settings = ServerSettings::new().with(&UPDATE_FREQUENCY, "thirty");
        assert!(matches!(
            settings.get(&UPDATE_FREQUENCY),
            Err(ConfigError::TypeMismatch { .. })
        ));

        let settings = ServerSettings::new().with(&UPDATE_FREQUENCY, true);
        assert!(matches!(
            settings.get(&UPDATE_FREQUENCY),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_positive_int() {
        let settings = ServerSettings::new().with(&UPDATE_FREQUENCY, 30u32);
        assert_eq!(settings.get_positive_int(&UPDATE_FREQUENCY), Ok(30));

        let settings = ServerSettings::new().with(&UPDATE_FREQUENCY, 0u32);
        assert!(settings.get_positive_int(&UPDATE_FREQUENCY).is_err());

        let settings = ServerSettings::new().with(&UPDATE_FREQUENCY, 29.5);
        assert!(settings.get_positive_int(&UPDATE_FREQUENCY).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let settings = ServerSettings::new().with(&TIME_SNAP_THRESHOLD, f64::NAN);
        assert!(matches!(
            settings.get(&TIME_SNAP_THRESHOLD),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_all_settings_have_unique_names() {
        let mut names: Vec<_> = ALL.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
    }
}
