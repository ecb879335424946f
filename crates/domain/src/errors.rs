use thiserror::Error;

/// Errors surfaced by an exchange WS/REST ingestion adapter.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("fatal exchange error: {reason}")]
    Fatal { reason: String },

    #[error("malformed record skipped: {reason}")]
    Malformed { reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors surfaced by the in-process message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("partition {partition} of topic '{topic}' is backpressured, retry after {retry_after_secs}s")]
    Backpressure {
        topic: String,
        partition: usize,
        retry_after_secs: u64,
    },

    #[error("'{0}' is not a known topic")]
    UnknownTopic(String),

    #[error("bus is shutting down")]
    ShuttingDown,

    #[error("record for topic '{topic}' could not be JSON-encoded: {reason}")]
    Encode { topic: String, reason: String },
}

/// Errors surfaced by the LLM-backed sentiment classifier. Always recovered
/// to an empty asset-sentiment list at the call site, never propagated.
#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("llm response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors surfaced while loading a per-service `Settings` from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing or invalid environment variable {name}: {reason}")]
    InvalidVar { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_message_includes_topic_and_partition() {
        let err = BusError::Backpressure {
            topic: "trades".into(),
            partition: 3,
            retry_after_secs: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("trades"));
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }
}
