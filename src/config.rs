//! # Configuration
//!
//! YAML configuration for the controller. Keys are camelCase and durations are
//! human-readable strings (`10s`, `1m`, `30m`).
//!
//! ```yaml
//! controller:
//!   channel:
//!     maxInflightRequests: 20
//!   createDeleteWatcherTimeout: 10m
//! job:
//!   manager:
//!     deletion:
//!       rate: 1m
//!   backoff:
//!     initial: 10s
//!     max: 10m
//!     timeMultiplier: 1.6
//!   timeout: 30m
//!   sre:
//!     enabled: true
//! endpoints:
//!   alertingmonitor: http://localhost:8080
//!   sre: http://localhost:8080
//!   mimir:
//!     ingester: http://localhost:8080
//!     compactor: http://localhost:8080
//!     pollingRate: 20s
//!     deleteVerifyMode: loose
//!   loki:
//!     write: http://localhost:3100
//!     backend: http://localhost:3100
//!     pollingRate: 20s
//!     maxPollingRate: 1m
//!     deleteVerifyMode: loose
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub endpoints: Endpoints,
    pub controller: ControllerConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    pub channel: ChannelConfig,
    #[serde(with = "humantime_serde")]
    pub create_delete_watcher_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Capacity of the controller → job manager channel.
    pub max_inflight_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub manager: ManagerConfig,
    pub backoff: BackoffConfig,
    /// Upper bound for the backend fan-out of a single attempt.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub sre: SreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    pub deletion: DeletionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionConfig {
    /// How often finished jobs are swept out of the job table.
    #[serde(with = "humantime_serde")]
    pub rate: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    pub time_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SreConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(rename = "alertingmonitor")]
    pub alerting_monitor: String,
    pub sre: String,
    pub mimir: MimirConfig,
    pub loki: LokiConfig,
}

/// How thoroughly a log/metrics store deletion is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Poll until the backend reports completion.
    Strict,
    /// Accepting the delete request is enough.
    Loose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimirConfig {
    pub ingester: String,
    pub compactor: String,
    #[serde(with = "humantime_serde")]
    pub polling_rate: Duration,
    pub delete_verify_mode: VerifyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LokiConfig {
    pub write: String,
    pub backend: String,
    #[serde(with = "humantime_serde")]
    pub polling_rate: Duration,
    #[serde(with = "humantime_serde")]
    pub max_polling_rate: Duration,
    pub delete_verify_mode: VerifyMode,
}

impl Config {
    /// Reads and validates a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.controller.channel.max_inflight_requests == 0 {
            return invalid("controller.channel.maxInflightRequests must be positive");
        }
        if self.job.manager.deletion.rate.is_zero() {
            return invalid("job.manager.deletion.rate must be positive");
        }
        if self.job.timeout.is_zero() {
            return invalid("job.timeout must be positive");
        }
        let backoff = &self.job.backoff;
        if backoff.initial.is_zero() || backoff.initial > backoff.max {
            return invalid("job.backoff.initial must be positive and not above job.backoff.max");
        }
        if backoff.time_multiplier.is_nan() || backoff.time_multiplier < 1.0 {
            return invalid("job.backoff.timeMultiplier must be at least 1");
        }
        if self.endpoints.loki.polling_rate.is_zero()
            || self.endpoints.loki.polling_rate > self.endpoints.loki.max_polling_rate
        {
            return invalid("endpoints.loki.pollingRate must be positive and not above maxPollingRate");
        }
        if self.endpoints.mimir.polling_rate.is_zero() {
            return invalid("endpoints.mimir.pollingRate must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints {
                alerting_monitor: "http://localhost:8080".into(),
                sre: "http://localhost:8080".into(),
                mimir: MimirConfig {
                    ingester: "http://localhost:8080".into(),
                    compactor: "http://localhost:8080".into(),
                    polling_rate: Duration::from_secs(20),
                    delete_verify_mode: VerifyMode::Loose,
                },
                loki: LokiConfig {
                    write: "http://localhost:3100".into(),
                    backend: "http://localhost:3100".into(),
                    polling_rate: Duration::from_secs(20),
                    max_polling_rate: Duration::from_secs(60),
                    delete_verify_mode: VerifyMode::Loose,
                },
            },
            controller: ControllerConfig {
                channel: ChannelConfig {
                    max_inflight_requests: 20,
                },
                create_delete_watcher_timeout: Duration::from_secs(600),
            },
            job: JobConfig {
                manager: ManagerConfig {
                    deletion: DeletionConfig {
                        rate: Duration::from_secs(60),
                    },
                },
                backoff: BackoffConfig {
                    initial: Duration::from_secs(10),
                    max: Duration::from_secs(600),
                    time_multiplier: 1.6,
                },
                timeout: Duration::from_secs(1800),
                sre: SreConfig { enabled: true },
            },
        }
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
