use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delivery guarantee applied when handing an event to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Wait for queue space for at most the publish timeout, then drop.
    #[default]
    Default,
    /// Wait for queue space without limit; failed sink writes are retried.
    GuaranteedSend,
    /// Never wait; drop when the queue is full.
    DropIfFull,
}

/// A `publish_mode` value that names no mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown publish_mode: '{0}'")]
pub struct UnknownPublishMode(pub String);

impl PublishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishMode::Default => "default",
            PublishMode::GuaranteedSend => "guaranteed_send",
            PublishMode::DropIfFull => "drop_if_full",
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishMode {
    type Err = UnknownPublishMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PublishMode::Default),
            // "send" is the older spelling
            "guaranteed_send" | "send" => Ok(PublishMode::GuaranteedSend),
            "drop_if_full" => Ok(PublishMode::DropIfFull),
            other => Err(UnknownPublishMode(other.to_string())),
        }
    }
}
