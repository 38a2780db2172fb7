use thiserror::Error;

/// Failures of the messaging core. None of them are fatal: each one degrades
/// a feature and is turned into local state, a notification or a log line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessagingError {
    /// Conversation list or message history could not be fetched
    #[error("Failed to fetch {what}: {reason}")]
    LoadFailed { what: &'static str, reason: String },

    /// The persistence call for a new message failed
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// An event was emitted while the transport was not connected
    #[error("Transport not connected, dropped '{0}' event")]
    TransportUnavailable(&'static str),

    /// The connection budget was exhausted
    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectFailed { attempts: u32, reason: String },
}
