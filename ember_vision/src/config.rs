use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const ENV_PREFIX: &str = "EMBER_";

/// What a run does when the detector fails on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceFailurePolicy {
    /// End the run, release the source and record the partial progress.
    #[default]
    Abort,
    /// Drop the frame and keep going. The episode state is left untouched.
    Skip,
}

impl std::str::FromStr for InferenceFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(ConfigError::invalid(
                "inference_failure",
                format!("expected `abort` or `skip`, got `{other}`"),
            )),
        }
    }
}

/// Tunables for the whole decision layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmberConfig {
    /// Detections must be strictly above this confidence to count.
    pub confidence_threshold: f32,
    /// Class labels that are treated as a hazard. Matching is case-sensitive.
    pub hazard_labels: BTreeSet<String>,
    /// How long a hazard has to persist before the alarm fires.
    pub alarm_duration_secs: f64,
    /// Number of history records handed to the display layer.
    pub max_history: usize,
    /// Number of history records kept in memory before the oldest are evicted.
    pub history_retention: usize,
    pub inference_failure: InferenceFailurePolicy,
    /// A hazardous still image fires the alarm even though it can never reach `Sustained`.
    pub alarm_on_still_hazard: bool,
    /// Sound asset the alarm sink needs. `None` means the sink has no asset.
    pub alarm_sound: Option<PathBuf>,
    /// Capacity of the run event broadcast channel.
    pub event_capacity: usize,
}

impl EmberConfig {
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_ALARM_DURATION_SECS: f64 = 1.0;
    pub const DEFAULT_MAX_HISTORY: usize = 5;
    pub const DEFAULT_HISTORY_RETENTION: usize = 100;
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    /// Loads a YAML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::io("read config file", e))?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(data).map_err(|e| ConfigError::yaml("parse config file", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `EMBER_*` variables from the process environment on top of `self`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Applies `EMBER_*` overrides from an arbitrary key/value iterator.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(key) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match key {
                "CONF_THRESHOLD" => {
                    self.confidence_threshold = parse_value("confidence_threshold", value)?
                }
                "HAZARD_LABELS" => {
                    self.hazard_labels = value
                        .split(',')
                        .map(str::trim)
                        .filter(|label| !label.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "ALARM_DURATION" => {
                    self.alarm_duration_secs = parse_value("alarm_duration_secs", value)?
                }
                "MAX_HISTORY" => self.max_history = parse_value("max_history", value)?,
                "HISTORY_RETENTION" => {
                    self.history_retention = parse_value("history_retention", value)?
                }
                "INFERENCE_FAILURE" => self.inference_failure = value.parse()?,
                "ALARM_ON_STILL_HAZARD" => {
                    self.alarm_on_still_hazard = parse_value("alarm_on_still_hazard", value)?
                }
                "ALARM_SOUND" => {
                    self.alarm_sound = (!value.is_empty()).then(|| PathBuf::from(value))
                }
                "EVENT_CAPACITY" => self.event_capacity = parse_value("event_capacity", value)?,
                _ => log::debug!("ignoring unknown setting {ENV_PREFIX}{key}"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        if !self.alarm_duration_secs.is_finite() || self.alarm_duration_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "alarm_duration_secs",
                format!("{} must be a positive number of seconds", self.alarm_duration_secs),
            ));
        }
        if self.hazard_labels.is_empty() {
            return Err(ConfigError::invalid("hazard_labels", "at least one label is required"));
        }
        if self.max_history == 0 {
            return Err(ConfigError::invalid("max_history", "must be at least 1"));
        }
        if self.history_retention < self.max_history {
            return Err(ConfigError::invalid(
                "history_retention",
                format!(
                    "{} is smaller than max_history ({})",
                    self.history_retention, self.max_history
                ),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for EmberConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: Self::DEFAULT_CONFIDENCE_THRESHOLD,
            hazard_labels: ["Fire", "smoke"].into_iter().map(String::from).collect(),
            alarm_duration_secs: Self::DEFAULT_ALARM_DURATION_SECS,
            max_history: Self::DEFAULT_MAX_HISTORY,
            history_retention: Self::DEFAULT_HISTORY_RETENTION,
            inference_failure: InferenceFailurePolicy::default(),
            alarm_on_still_hazard: true,
            alarm_sound: None,
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("`{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = EmberConfig::default();
        assert_eq!(config.confidence_threshold, 0.5);
        assert!(config.hazard_labels.contains("Fire"));
        assert!(config.hazard_labels.contains("smoke"));
        assert_eq!(config.hazard_labels.len(), 2);
        assert_eq!(config.alarm_duration_secs, 1.0);
        assert_eq!(config.max_history, 5);
        assert_eq!(config.inference_failure, InferenceFailurePolicy::Abort);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EmberConfig::from_yaml(
            "confidence_threshold: 0.65\ninference_failure: skip\nhazard_labels: [fire]\n",
        )
        .expect("valid yaml");
        assert_eq!(config.confidence_threshold, 0.65);
        assert_eq!(config.inference_failure, InferenceFailurePolicy::Skip);
        assert_eq!(config.hazard_labels.len(), 1);
        assert_eq!(config.max_history, EmberConfig::DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ember.yaml");
        std::fs::write(&path, "alarm_duration_secs: 2.5\nmax_history: 3\n").expect("write");
        let config = EmberConfig::load(&path).expect("load");
        assert_eq!(config.alarm_duration_secs, 2.5);
        assert_eq!(config.max_history, 3);

        let err = EmberConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_apply_prefixed_keys_only() {
        let config = EmberConfig::default()
            .with_overrides([
                ("EMBER_CONF_THRESHOLD", "0.7"),
                ("EMBER_HAZARD_LABELS", "Fire, smoke ,flame"),
                ("EMBER_INFERENCE_FAILURE", "Skip"),
                ("EMBER_ALARM_SOUND", "siren.wav"),
                ("PATH", "/usr/bin"),
            ])
            .expect("valid overrides");
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.hazard_labels.len(), 3);
        assert!(config.hazard_labels.contains("flame"));
        assert_eq!(config.inference_failure, InferenceFailurePolicy::Skip);
        assert_eq!(config.alarm_sound, Some(PathBuf::from("siren.wav")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EmberConfig::default()
            .with_overrides([("EMBER_CONF_THRESHOLD", "1.5")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "confidence_threshold", .. }));

        let err = EmberConfig::default()
            .with_overrides([("EMBER_MAX_HISTORY", "lots")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_history", .. }));

        let err = EmberConfig::from_yaml("alarm_duration_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "alarm_duration_secs", .. }));

        let err = EmberConfig::from_yaml("max_history: 10\nhistory_retention: 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "history_retention", .. }));
    }
}
