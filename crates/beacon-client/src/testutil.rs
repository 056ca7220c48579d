//! In-process mock transport for unit tests.
//!
//! The mock replaces the websocket with a pair of tokio channels: frames
//! the client sends land in `ServerHandle::outbound`, and batches pushed
//! into `ServerHandle::inbound` come out of the client's read half.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use beacon_protocol::{channel, Message};
use beacon_transport::{FrameSink, FrameStream, Transport, TransportError};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::client::{Client, ClientConfig};
use crate::extension::ExtensionPipeline;

type InboundItem = Result<Vec<Message>, TransportError>;

pub(crate) struct MockTransport {
    halves: StdMutex<Option<(Box<dyn FrameSink>, Box<dyn FrameStream>)>>,
}

/// The server's side of the mock connection.
pub(crate) struct ServerHandle {
    /// Batches the client wrote.
    pub(crate) outbound: mpsc::UnboundedReceiver<Vec<Message>>,
    /// Feed for the client's read half; drop it to simulate a clean close.
    pub(crate) inbound: mpsc::UnboundedSender<InboundItem>,
}

pub(crate) fn mock_transport() -> (MockTransport, ServerHandle) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let sink = Box::new(MockSink { tx: out_tx });
    let stream = Box::new(MockStream { rx: in_rx });
    let transport = MockTransport {
        halves: StdMutex::new(Some((sink, stream))),
    };
    let server = ServerHandle {
        outbound: out_rx,
        inbound: in_tx,
    };
    (transport, server)
}

#[async_trait]
impl Transport for MockTransport {
    async fn dial(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        self.halves
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("mock already dialed".to_string()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<Vec<Message>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, batch: &[Message]) -> Result<(), TransportError> {
        self.tx
            .send(batch.to_vec())
            .map_err(|_| TransportError::SendFailed("mock peer gone".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<InboundItem>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn recv(&mut self) -> Result<Option<Vec<Message>>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// Frame constructors for server responses.

pub(crate) fn handshake_ok(client_id: &str) -> Message {
    Message {
        channel: channel::HANDSHAKE.to_string(),
        client_id: client_id.to_string(),
        successful: Some(true),
        version: "1.0".to_string(),
        supported_connection_types: vec!["mock".to_string()],
        ..Message::default()
    }
}

pub(crate) fn connect_ack(id: &str) -> Message {
    Message {
        channel: channel::CONNECT.to_string(),
        id: id.to_string(),
        successful: Some(true),
        ..Message::default()
    }
}

pub(crate) fn disconnect_ack(id: &str) -> Message {
    Message {
        channel: channel::DISCONNECT.to_string(),
        id: id.to_string(),
        successful: Some(true),
        ..Message::default()
    }
}

pub(crate) fn subscribe_ack(subscription: &str, id: &str) -> Message {
    Message {
        channel: channel::SUBSCRIBE.to_string(),
        id: id.to_string(),
        subscription: subscription.to_string(),
        successful: Some(true),
        ..Message::default()
    }
}

pub(crate) fn subscribe_nack(subscription: &str, reason: &str) -> Message {
    Message {
        channel: channel::SUBSCRIBE.to_string(),
        subscription: subscription.to_string(),
        successful: Some(false),
        error: Some(reason.to_string()),
        ..Message::default()
    }
}

pub(crate) fn delivery(channel: &str, data: Value) -> Message {
    Message {
        channel: channel.to_string(),
        data,
        ..Message::default()
    }
}

pub(crate) fn publish_ack(channel: &str, id: &str) -> Message {
    Message {
        channel: channel.to_string(),
        id: id.to_string(),
        successful: Some(true),
        ..Message::default()
    }
}

/// Dial and handshake a client against a fresh mock connection.
///
/// The handshake response is buffered before the call, so ids are
/// deterministic: the handshake frame takes id "1".
pub(crate) async fn handshaked_client_with(
    extensions: ExtensionPipeline,
) -> (Client, ServerHandle) {
    let (transport, server) = mock_transport();
    let client = Client::dial_with(&transport, "mock://server", ClientConfig::default(), extensions)
        .await
        .expect("mock dial");
    server
        .inbound
        .send(Ok(vec![handshake_ok("c1")]))
        .expect("inject handshake response");
    client.handshake().await.expect("handshake");
    (client, server)
}

/// Handshaked and connected client; the connect frame takes id "2".
pub(crate) async fn connected_client() -> (Client, ServerHandle) {
    connected_client_with(ExtensionPipeline::new()).await
}

pub(crate) async fn connected_client_with(
    extensions: ExtensionPipeline,
) -> (Client, ServerHandle) {
    let (client, server) = handshaked_client_with(extensions).await;
    server
        .inbound
        .send(Ok(vec![connect_ack("2")]))
        .expect("inject connect ack");
    client.connect().await.expect("connect");
    (client, server)
}

pub(crate) fn hello() -> Value {
    json!("hello world")
}
