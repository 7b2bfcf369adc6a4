//! Configuration loading and validation.
//!
//! A [`Config`] is read once from a YAML or TOML file and validated into an
//! immutable [`Settings`] snapshot. Every enum-like option is checked here,
//! so a typo fails startup with a message naming the field and value
//! instead of surfacing later inside a worker.
//!
//! ```yaml
//! brokers: ["kafka-1:9092", "kafka-2:9092"]
//! topics: ["app-logs"]
//! group: kafkabeat
//! offset: oldest          # newest | oldest
//! codec: json             # json | plain
//! publish_mode: default   # default | guaranteed_send | drop_if_full
//! channel_workers: 4
//! output:
//!   type: file
//!   path: /var/log/kafkabeat/events.ndjson
//! ```

pub mod duration;

use crate::config::duration::parse_duration;
use kafkabeat_kafka::{ConsumerConfig, InitialOffset};
use kafkabeat_publisher::{PublishMode, PublisherConfig};
use kafkabeat_types::Codec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error in configuration, unknown {field}: '{value}'")]
    UnknownValue { field: &'static str, value: String },

    #[error("error in configuration, invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("error reading config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Where published events go.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    /// JSON lines on standard output
    #[default]
    Stdout,
    /// JSON lines appended to a file
    File { path: PathBuf },
}

/// Raw configuration as written in the config file.
///
/// Missing keys take the defaults from [`Config::default`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub brokers: Vec<String>,
    pub topics: Vec<String>,
    pub client_id: String,
    pub group: String,
    pub offset: String,
    pub codec: String,
    pub publish_mode: String,
    pub version: String,
    pub channel_buffer_size: usize,
    /// Values below 1 are raised to 1
    pub channel_workers: i64,
    pub commit_interval: String,
    pub session_timeout: String,
    pub queue_size: usize,
    pub bulk_max_size: usize,
    pub publish_timeout: String,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            topics: vec!["watch".to_string()],
            client_id: "beat".to_string(),
            group: "kafkabeat".to_string(),
            offset: "newest".to_string(),
            codec: "json".to_string(),
            publish_mode: "default".to_string(),
            version: "1.0.0".to_string(),
            channel_buffer_size: 256,
            channel_workers: num_cpus::get() as i64,
            commit_interval: "1s".to_string(),
            session_timeout: "10s".to_string(),
            queue_size: 4096,
            bulk_max_size: 50,
            publish_timeout: "5s".to_string(),
            output: OutputConfig::Stdout,
        }
    }
}

/// Validated, immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub consumer: ConsumerConfig,
    pub codec: Codec,
    pub publisher: PublisherConfig,
    pub workers: usize,
    pub output: OutputConfig,
}

impl Config {
    /// Load from a file; `.toml` files are parsed as TOML, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, String> {
        // An empty document means "all defaults".
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(s).map_err(|e| e.to_string())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| e.to_string())
    }

    /// Check every option and build the typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        validate_brokers(&self.brokers)?;

        if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid("topics", "at least one non-empty topic is required"));
        }
        if self.group.trim().is_empty() {
            return Err(invalid("group", "consumer group id must not be empty"));
        }

        let initial_offset: InitialOffset =
            self.offset.parse().map_err(|_| ConfigError::UnknownValue {
                field: "offset",
                value: self.offset.clone(),
            })?;
        let codec: Codec = self.codec.parse().map_err(|_| ConfigError::UnknownValue {
            field: "codec",
            value: self.codec.clone(),
        })?;
        let mode: PublishMode =
            self.publish_mode
                .parse()
                .map_err(|_| ConfigError::UnknownValue {
                    field: "publish_mode",
                    value: self.publish_mode.clone(),
                })?;

        validate_version(&self.version)?;

        if self.channel_buffer_size == 0 {
            return Err(invalid("channel_buffer_size", "must be at least 1"));
        }
        if self.queue_size == 0 {
            return Err(invalid("queue_size", "must be at least 1"));
        }
        if self.bulk_max_size == 0 {
            return Err(invalid("bulk_max_size", "must be at least 1"));
        }

        let workers = if self.channel_workers < 1 {
            warn!(
                "channel_workers = {} is below 1, using 1 worker",
                self.channel_workers
            );
            1
        } else {
            self.channel_workers as usize
        };

        if let OutputConfig::File { path } = &self.output {
            if path.as_os_str().is_empty() {
                return Err(invalid("output.path", "file output needs a path"));
            }
        }

        let consumer = ConsumerConfig {
            brokers: self.brokers.clone(),
            topics: self.topics.clone(),
            client_id: self.client_id.clone(),
            group_id: self.group.clone(),
            initial_offset,
            version: self.version.clone(),
            channel_buffer_size: self.channel_buffer_size,
            commit_interval: duration_field("commit_interval", &self.commit_interval)?,
            session_timeout: duration_field("session_timeout", &self.session_timeout)?,
            ..Default::default()
        };

        let publisher = PublisherConfig {
            mode,
            queue_size: self.queue_size,
            bulk_max_size: self.bulk_max_size,
            publish_timeout: duration_field("publish_timeout", &self.publish_timeout)?,
            ..Default::default()
        };

        Ok(Settings {
            consumer,
            codec,
            publisher,
            workers,
            output: self.output.clone(),
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|e| invalid(field, format!("'{value}': {e:#}")))
}

fn validate_brokers(brokers: &[String]) -> Result<(), ConfigError> {
    if brokers.is_empty() {
        return Err(invalid("brokers", "at least one broker is required"));
    }
    for broker in brokers {
        let valid = broker
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(invalid(
                "brokers",
                format!("'{broker}' is not of the form host:port"),
            ));
        }
    }
    Ok(())
}

/// Kafka protocol versions have two to four numeric parts ("2.8", "0.10.2.1").
fn validate_version(version: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = version.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !(2..=4).contains(&parts.len()) || !numeric {
        return Err(invalid(
            "version",
            format!("'{version}' is not a version number like 1.0.0"),
        ));
    }
    Ok(())
}
