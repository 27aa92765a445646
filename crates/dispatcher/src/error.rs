//! Dispatcher error types

use thiserror::Error;

/// Errors raised while wiring sinks from configuration
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink could not be opened (bad params, unwritable path)
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// `topics` param names something that is never published
    #[error("sink '{name}' subscribes to unknown topic '{topic}'")]
    UnknownTopic { name: String, topic: String },
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
