//! WebSocket transport implementation.
//!
//! This module provides the client-side WebSocket transport using
//! tokio-tungstenite. Bayeux batches travel as text frames carrying a JSON
//! array.

use async_trait::async_trait;
use beacon_protocol::{codec, Message};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, trace, warn};

use crate::traits::{FrameSink, FrameStream, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}

/// WebSocket transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        let (ws, _response) = connect_async(url).await.map_err(|e| {
            error!(url, "WebSocket dial failed: {}", e);
            TransportError::ConnectFailed(e.to_string())
        })?;

        debug!(url, "WebSocket connection established");

        let (writer, reader) = ws.split();
        let sink = WebSocketSink { writer };
        let stream = WebSocketReader {
            reader,
            max_message_size: self.config.max_message_size,
        };
        Ok((Box::new(sink), Box::new(stream)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// The write half of a WebSocket connection.
struct WebSocketSink {
    writer: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, batch: &[Message]) -> Result<(), TransportError> {
        let payload = codec::encode_batch(batch)?;
        trace!(frames = batch.len(), bytes = payload.len(), "Sending batch");
        self.writer
            .send(WsMessage::Text(payload))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.writer.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }
}

/// The read half of a WebSocket connection.
struct WebSocketReader {
    reader: SplitStream<WsStream>,
    max_message_size: usize,
}

#[async_trait]
impl FrameStream for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Vec<Message>>, TransportError> {
        loop {
            match self.reader.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if text.len() > self.max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            text.len(),
                            self.max_message_size
                        );
                        return Err(TransportError::ReceiveFailed(
                            "message exceeds size limit".to_string(),
                        ));
                    }
                    let batch = codec::decode_batch(&text)?;
                    return Ok(Some(batch));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    // Some servers send JSON in binary frames.
                    let text = String::from_utf8(data).map_err(|_| {
                        TransportError::ReceiveFailed("non-UTF-8 binary frame".to_string())
                    })?;
                    let batch = codec::decode_batch(&text)?;
                    return Ok(Some(batch));
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    // Pong replies are queued by the protocol layer and
                    // flushed with the next outbound send.
                    trace!("Keepalive frame");
                }
                Some(Ok(WsMessage::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Ok(WsMessage::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
