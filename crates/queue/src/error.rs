/// Errors raised by queue backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker could not be reached or rejected the command.
    #[error("Queue transport error: {0}")]
    Transport(String),

    #[error("Queue payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Transport(err.to_string())
    }
}
