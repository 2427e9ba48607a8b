use crate::event::Event;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection pool timeout: no connections available after {0:?}")]
    PoolTimeout(std::time::Duration),

    /// The primary record or one of its index records was still unprocessed
    /// after every write attempt. The event may be partially indexed.
    #[error("Event {event_id} is not durable: {unprocessed} item(s) unprocessed after {attempts} attempt(s)")]
    WriteNotDurable {
        event_id: Uuid,
        unprocessed: usize,
        attempts: u32,
    },

    #[error("Batch get gave up with {remaining} unprocessed key(s) after {attempts} attempt(s)")]
    UnprocessedKeys { remaining: usize, attempts: u32 },

    /// A fetch worker failed. `partial` holds whatever the other workers
    /// resolved before the fetch completed.
    #[error("Event fetch failed ({} of {requested} resolved): {source}", .partial.len())]
    FetchFailed {
        requested: usize,
        partial: Vec<Event>,
        #[source]
        source: Box<EventLogError>,
    },

    #[error("Execution error: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, EventLogError>;

impl EventLogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// `true` for errors raised before any store I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for EventLogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EventLogError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for EventLogError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EventLogError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Execution(format!("worker task failed: {}", err))
    }
}
