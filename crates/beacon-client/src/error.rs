//! Client error taxonomy.

use beacon_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dial or socket failure; fatal for the connection.
    #[error("Transport error: {0}")]
    Connection(#[from] TransportError),

    /// The handshake response carried an error or no client id.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server rejected a request with a descriptive error.
    #[error("Server rejected request on {channel}: {reason}")]
    Protocol {
        /// Channel the rejected request targeted.
        channel: String,
        /// Server-supplied error string.
        reason: String,
    },

    /// Invalid application channel name.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(&'static str),

    /// An active subscription for the channel already exists.
    #[error("Already subscribed to channel: {0}")]
    AlreadySubscribed(String),

    /// No active subscription for the channel.
    #[error("Not subscribed to channel: {0}")]
    NotSubscribed(String),

    /// Operation requires a completed handshake first.
    #[error("Not connected: {0}")]
    NotConnected(&'static str),

    /// The read loop is already running.
    #[error("Already connected")]
    AlreadyConnected,
}
