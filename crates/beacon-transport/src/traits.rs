//! Transport abstraction traits for the Beacon client.
//!
//! These traits define the interface that all transport implementations must
//! provide, keeping the client core transport-agnostic.

use async_trait::async_trait;
use beacon_protocol::Message;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An operation timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Dialing the server failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Wire protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] beacon_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transport that can dial a Bayeux server.
///
/// Dialing yields the two halves of one persistent connection: a
/// [`FrameSink`] for outbound batches and a [`FrameStream`] for inbound
/// ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dial fails.
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;

    /// Get the transport name (e.g. "websocket").
    fn name(&self) -> &'static str;
}

/// The write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame batch.
    async fn send(&mut self, batch: &[Message]) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame batch.
    ///
    /// Returns `None` if the connection closed cleanly. Implementations
    /// should yield non-empty batches; the dispatch layer tolerates an
    /// empty one by ignoring it.
    async fn recv(&mut self) -> Result<Option<Vec<Message>>, TransportError>;
}
