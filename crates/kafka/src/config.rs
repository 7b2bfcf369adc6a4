use crate::error::{Error, Result};
use rdkafka::config::ClientConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where to start reading partitions that have no committed offset for the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialOffset {
    /// Only records produced after the consumer joins
    #[default]
    Newest,
    /// The earliest record still retained by the broker
    Oldest,
}

impl InitialOffset {
    /// The librdkafka `auto.offset.reset` value for this policy.
    pub fn auto_offset_reset(&self) -> &'static str {
        match self {
            InitialOffset::Newest => "latest",
            InitialOffset::Oldest => "earliest",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InitialOffset::Newest => "newest",
            InitialOffset::Oldest => "oldest",
        }
    }
}

impl fmt::Display for InitialOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitialOffset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "newest" => Ok(InitialOffset::Newest),
            "oldest" => Ok(InitialOffset::Oldest),
            other => Err(Error::InvalidConfig(format!("unknown offset: '{other}'"))),
        }
    }
}

/// Configuration for the Kafka consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers as `host:port`
    pub brokers: Vec<String>,
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Client identity advertised to the brokers
    pub client_id: String,
    /// Consumer group ID
    pub group_id: String,
    /// Start position for partitions without a committed offset
    pub initial_offset: InitialOffset,
    /// Broker protocol version to assume when version negotiation is unavailable
    pub version: String,
    /// Capacity of the internal message and error streams
    ///
    /// Also sets the minimum number of records librdkafka prefetches per partition.
    pub channel_buffer_size: usize,
    /// How often stored offsets are committed to the group coordinator
    pub commit_interval: Duration,
    /// Group session timeout
    pub session_timeout: Duration,
    /// Maximum time a fetch request waits for data on the broker
    pub max_wait_time: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            topics: vec!["watch".to_string()],
            client_id: "beat".to_string(),
            group_id: "kafkabeat".to_string(),
            initial_offset: InitialOffset::Newest,
            version: "1.0.0".to_string(),
            channel_buffer_size: 256,
            commit_interval: Duration::from_secs(1),
            session_timeout: Duration::from_secs(10),
            max_wait_time: Duration::from_millis(500),
        }
    }
}

impl ConsumerConfig {
    /// Reject settings the client library would only fail on later.
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(Error::InvalidConfig("no brokers configured".to_string()));
        }
        if self.topics.is_empty() {
            return Err(Error::InvalidConfig("no topics configured".to_string()));
        }
        if self.group_id.is_empty() {
            return Err(Error::InvalidConfig("empty consumer group".to_string()));
        }
        Ok(())
    }

    /// Build the librdkafka client properties.
    ///
    /// Offsets are stored explicitly when a message has been handled
    /// (`enable.auto.offset.store=false`) and the stored positions are
    /// committed in the background every `commit_interval`.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("group.id", &self.group_id)
            .set("client.id", &self.client_id)
            .set("auto.offset.reset", self.initial_offset.auto_offset_reset())
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.commit.interval.ms",
                self.commit_interval.as_millis().to_string(),
            )
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set("fetch.wait.max.ms", self.max_wait_time.as_millis().to_string())
            .set(
                "queued.min.messages",
                self.channel_buffer_size.max(1).to_string(),
            )
            .set("api.version.request", "true")
            .set("broker.version.fallback", &self.version)
            .set("enable.partition.eof", "false");
        config
    }
}
