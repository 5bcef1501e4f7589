use crate::{
    ConfigError, Threshold, ThresholdSet, DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP,
    DEFAULT_SCENARIO_DURATION,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

/// Options for a whole test run: the scenarios to execute and the thresholds that decide
/// whether the run passed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,
    #[serde(default)]
    pub thresholds: ThresholdSet,
    /// Global cap on transactions (requests) per second across all VUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rps: Option<NonZeroU32>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scenario, replacing any scenario already registered under the same name.
    pub fn scenario(mut self, scenario: ScenarioConfig) -> Self {
        self.scenarios.insert(scenario.name.clone(), scenario);
        self
    }

    pub fn threshold(mut self, metric: &str, threshold: Threshold) -> Self {
        self.thresholds.insert(metric, threshold);
        self
    }

    pub fn rps(mut self, rps: NonZeroU32) -> Self {
        self.rps = Some(rps);
        self
    }

    /// Parse k6-style JSON options. Scenario names are taken from the `scenarios` keys.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut options: Options = serde_json::from_str(json)?;
        for (name, scenario) in options.scenarios.iter_mut() {
            scenario.name = name.clone();
        }
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }
        self.scenarios.values().try_for_each(ScenarioConfig::validate)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub executor: ExecutorConfig,
    /// Offset from the start of the run before this scenario begins.
    #[serde(default, with = "duration_str")]
    pub start_time: Duration,
    /// How long in-flight iterations may run once the scenario ends.
    #[serde(default = "default_graceful_stop", with = "duration_str")]
    pub graceful_stop: Duration,
}

impl ScenarioConfig {
    pub fn new(name: &str, executor: ExecutorConfig) -> Self {
        Self {
            name: name.to_string(),
            executor,
            start_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    pub fn start_time(mut self, start_time: Duration) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Offset from the start of the run at which this scenario stops starting iterations.
    pub fn end_offset(&self) -> Duration {
        self.start_time + self.executor.duration()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyScenarioName);
        }

        match &self.executor {
            ExecutorConfig::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(ConfigError::NoVus(self.name.clone()));
                }
                if duration.is_zero() {
                    return Err(ConfigError::ZeroDuration(self.name.clone()));
                }
            }
            ExecutorConfig::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return Err(ConfigError::NoStages(self.name.clone()));
                }
                if self.executor.duration().is_zero() {
                    return Err(ConfigError::ZeroDuration(self.name.clone()));
                }
            }
        }

        Ok(())
    }
}

/// How a scenario schedules its VUs over time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ExecutorConfig {
    /// A fixed number of VUs looping for a fixed duration.
    #[serde(rename_all = "camelCase")]
    ConstantVus {
        vus: usize,
        #[serde(with = "duration_str")]
        duration: Duration,
    },
    /// A VU count that moves linearly between stage targets.
    #[serde(rename_all = "camelCase")]
    RampingVus {
        #[serde(default, rename = "startVUs")]
        start_vus: usize,
        stages: Vec<Stage>,
        #[serde(default = "default_graceful_ramp_down", with = "duration_str")]
        graceful_ramp_down: Duration,
    },
}

impl ExecutorConfig {
    pub fn constant_vus(vus: usize, duration: Duration) -> Self {
        Self::ConstantVus { vus, duration }
    }

    pub fn ramping_vus(start_vus: usize, stages: Vec<Stage>) -> Self {
        Self::RampingVus {
            start_vus,
            stages,
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
        }
    }

    /// Nominal duration, not counting any graceful stop.
    pub fn duration(&self) -> Duration {
        match self {
            Self::ConstantVus { duration, .. } => *duration,
            Self::RampingVus { stages, .. } => stages.iter().map(|s| s.duration).sum(),
        }
    }

    /// Highest number of VUs this executor will ever ask for.
    pub fn max_vus(&self) -> usize {
        match self {
            Self::ConstantVus { vus, .. } => *vus,
            Self::RampingVus {
                start_vus, stages, ..
            } => stages
                .iter()
                .map(|s| s.target)
                .fold(*start_vus, usize::max),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::constant_vus(1, DEFAULT_SCENARIO_DURATION)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_graceful_ramp_down() -> Duration {
    DEFAULT_GRACEFUL_RAMP_DOWN
}

/// Durations as humantime strings (`"30s"`, `"1m30s"`), also accepting bare seconds.
pub(crate) mod duration_str {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct V;

        impl<'de> de::Visitor<'de> for V {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration string (e.g. 30s) or integer seconds")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Duration::try_from_secs_f64(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                humantime::parse_duration(v.trim()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}
