//! Connection lifecycle and the client surface.
//!
//! A [`Client`] owns one persistent connection to a Bayeux server: the
//! handshake → connect → disconnect lifecycle, the connection-scoped
//! message-id counter, and the registries shared with the dispatch loop.
//! The client is cheaply cloneable; clones share the connection.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use beacon_protocol::{channel, Advice, Message, BAYEUX_VERSION};
use beacon_transport::{FrameSink, FrameStream, Transport, TransportError, WebSocketTransport};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::extension::ExtensionPipeline;
use crate::subscription::Subscription;

/// Callback invoked with a publish acknowledgment frame.
pub type PublishResponseHandler = Box<dyn Fn(&Message) + Send + Sync>;

/// Observable connection lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dialed; handshake/connect not yet complete.
    Connecting,
    /// Connect acknowledged; the dispatch loop is running.
    Connected,
    /// Stopped cleanly (disconnect or server close).
    Disconnected,
    /// The dispatch loop terminated on an error.
    Failed(String),
}

/// Client configuration.
///
/// Every timeout is optional; `None` disables it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time limit for dialing the server.
    pub dial_timeout: Option<Duration>,
    /// Time limit for the direct handshake-response read.
    pub handshake_timeout: Option<Duration>,
    /// How long `connect` waits for the server's ack. Guards against
    /// servers that do not echo the message id, which would otherwise
    /// leave the ack uncorrelatable.
    pub connect_timeout: Option<Duration>,
    /// How long `disconnect` waits for the server's ack before tearing
    /// down anyway.
    pub disconnect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Some(Duration::from_secs(30)),
            handshake_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(30)),
            disconnect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Shared connection state, owned jointly by the client handles and the
/// dispatch loop.
pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) connection_type: String,
    pub(crate) extensions: ExtensionPipeline,
    /// Write half; every send path funnels through [`Inner::send_frame`].
    pub(crate) sink: Mutex<Box<dyn FrameSink>>,
    /// Read half; present until `connect` hands it to the dispatch loop.
    pub(crate) stream: Mutex<Option<Box<dyn FrameStream>>>,
    /// Active mailboxes by channel name. Inserted by subscribers, drained
    /// and removed only by the dispatch loop.
    pub(crate) subscriptions: DashMap<String, mpsc::UnboundedSender<Message>>,
    /// At most one publish-response callback per channel.
    pub(crate) publish_callbacks: DashMap<String, PublishResponseHandler>,
    /// Correlation map for outstanding meta requests, keyed by message id.
    pub(crate) pending_acks: DashMap<String, oneshot::Sender<Message>>,
    /// Last-known server advice; overwritten on every frame carrying one.
    pub(crate) advice: StdMutex<Option<Advice>>,
    /// Identity granted by the handshake; empty until then.
    pub(crate) client_id: StdRwLock<String>,
    /// Connection-scoped message-id counter.
    pub(crate) message_id: AtomicU64,
    pub(crate) stop_tx: watch::Sender<bool>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    /// Next connection-scoped message id; strictly increasing from "1".
    pub(crate) fn next_id(&self) -> String {
        (self.message_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// The single send primitive: outbound extension pipeline, then one
    /// single-element batch on the wire.
    pub(crate) async fn send_frame(&self, mut frame: Message) -> Result<(), ClientError> {
        self.extensions.apply_outgoing(&mut frame);
        trace!(channel = %frame.channel, id = %frame.id, "Sending frame");
        let mut sink = self.sink.lock().await;
        sink.send(std::slice::from_ref(&frame)).await?;
        Ok(())
    }
}

/// A Bayeux client over one persistent streaming connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Dial `url` over WebSocket.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the dial fails or times out.
    pub async fn dial(
        url: &str,
        config: ClientConfig,
        extensions: ExtensionPipeline,
    ) -> Result<Self, ClientError> {
        Self::dial_with(&WebSocketTransport::default(), url, config, extensions).await
    }

    /// Dial `url` over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the dial fails or times out.
    pub async fn dial_with(
        transport: &dyn Transport,
        url: &str,
        config: ClientConfig,
        extensions: ExtensionPipeline,
    ) -> Result<Self, ClientError> {
        let (sink, stream) = maybe_timeout(config.dial_timeout, transport.dial(url)).await??;
        debug!(url, transport = transport.name(), "Connection open");

        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connection_type: transport.name().to_string(),
                extensions,
                sink: Mutex::new(sink),
                stream: Mutex::new(Some(stream)),
                subscriptions: DashMap::new(),
                publish_callbacks: DashMap::new(),
                pending_acks: DashMap::new(),
                advice: StdMutex::new(None),
                client_id: StdRwLock::new(String::new()),
                message_id: AtomicU64::new(0),
                stop_tx,
                state_tx,
            }),
        })
    }

    /// Perform the Bayeux handshake, storing the granted client id.
    ///
    /// The response is read directly off the socket because the dispatch
    /// loop has not started yet; it still passes through the shared inbound
    /// extension primitive.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Handshake`] if the response carries an error
    /// or no client id, or a connection error on socket failure.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let mut guard = self.inner.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or(ClientError::AlreadyConnected)?;

        let mut request = Message::handshake(
            BAYEUX_VERSION,
            vec![self.inner.connection_type.clone()],
        );
        request.id = self.inner.next_id();
        self.inner.send_frame(request).await?;

        let batch = maybe_timeout(self.inner.config.handshake_timeout, stream.recv())
            .await??
            .ok_or(TransportError::ConnectionClosed)?;
        if batch.len() > 1 {
            trace!(dropped = batch.len() - 1, "Ignoring extra handshake batch elements");
        }
        let mut response = batch.into_iter().next().ok_or(ClientError::Handshake(
            "empty handshake response batch".to_string(),
        ))?;
        self.inner.extensions.apply_incoming(&mut response);

        if let Some(reason) = response.error_message() {
            return Err(ClientError::Handshake(reason.to_string()));
        }
        if response.client_id.is_empty() {
            return Err(ClientError::Handshake(
                "response carried no clientId".to_string(),
            ));
        }

        if let Some(advice) = &response.advice {
            *self.inner.advice.lock().unwrap() = Some(advice.clone());
        }
        debug!(client_id = %response.client_id, "Handshake complete");
        *self.inner.client_id.write().unwrap() = response.client_id;
        Ok(())
    }

    /// Start the dispatch loop and send the connect frame, waiting for the
    /// server's acknowledgment.
    ///
    /// # Errors
    ///
    /// Fails if the handshake has not completed, the loop is already
    /// running, the send fails, the server rejects the connect, or no
    /// ack correlates within `connect_timeout`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let client_id = self.require_client_id()?;
        let stream = self
            .inner
            .stream
            .lock()
            .await
            .take()
            .ok_or(ClientError::AlreadyConnected)?;

        let id = self.inner.next_id();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner.pending_acks.insert(id.clone(), ack_tx);

        // The ack is registered before the loop starts, so it cannot be
        // missed however fast the server answers.
        tokio::spawn(Dispatcher::new(stream, Arc::clone(&self.inner)).run());

        let frame = Message::connect(&id, &client_id, &self.inner.connection_type);
        self.inner.send_frame(frame).await?;

        match maybe_timeout(self.inner.config.connect_timeout, ack_rx).await {
            Ok(Ok(ack)) if ack.is_failure() => Err(ClientError::Protocol {
                channel: channel::CONNECT.to_string(),
                reason: ack
                    .error_message()
                    .unwrap_or("connect rejected")
                    .to_string(),
            }),
            Ok(Ok(_)) => {
                self.inner.state_tx.send_replace(ConnectionState::Connected);
                Ok(())
            }
            // Loop exited before the ack arrived.
            Ok(Err(_)) => Err(ClientError::Connection(TransportError::ConnectionClosed)),
            // No correlatable ack; servers that omit the echoed id land
            // here rather than hanging the caller.
            Err(timeout) => {
                self.inner.pending_acks.remove(&id);
                Err(ClientError::Connection(timeout))
            }
        }
    }

    /// Send the disconnect frame, wait (bounded) for its acknowledgment,
    /// then stop the dispatch loop and close the socket.
    ///
    /// The stop signal is a watch channel, so signalling cannot block even
    /// if the loop already exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake never completed or the disconnect
    /// send fails; teardown still proceeds on send failure.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let client_id = self.require_client_id()?;

        let id = self.inner.next_id();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner.pending_acks.insert(id.clone(), ack_tx);

        let sent = self
            .inner
            .send_frame(Message::disconnect(&id, &client_id))
            .await;

        if sent.is_ok() {
            match maybe_timeout(self.inner.config.disconnect_timeout, ack_rx).await {
                Ok(Ok(ack)) => {
                    debug!(successful = ?ack.successful, "Disconnect acknowledged");
                }
                Ok(Err(_)) => debug!("Read loop exited before the disconnect ack"),
                Err(_) => {
                    warn!("Timed out waiting for the disconnect ack");
                    self.inner.pending_acks.remove(&id);
                }
            }
        }

        self.inner.stop_tx.send_replace(true);
        let mut sink = self.inner.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Close after disconnect failed: {}", e);
        }
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
        sent
    }

    /// Subscribe to `channel` and run the delivery loop, handing each
    /// frame's payload to `on_message`.
    ///
    /// Returns only when the mailbox closes; a subscribe rejection is
    /// returned as the error from this same call, and the handler is never
    /// invoked for it.
    ///
    /// # Errors
    ///
    /// Fails on invalid channel names, duplicate subscriptions, send
    /// failure, or server rejection.
    pub async fn subscribe<F>(&self, channel: &str, on_message: F) -> Result<(), ClientError>
    where
        F: FnMut(Value),
    {
        let subscription = self.subscribe_stream(channel).await?;
        subscription.on_message(on_message).await
    }

    /// Subscribe to `channel`, returning the [`Subscription`] handle.
    ///
    /// The mailbox is registered alongside the subscribe send, before any
    /// ack can arrive, so the same mailbox carries either the rejection or
    /// the first delivery.
    ///
    /// # Errors
    ///
    /// Fails on invalid channel names, duplicate subscriptions, or send
    /// failure.
    pub async fn subscribe_stream(&self, channel: &str) -> Result<Subscription, ClientError> {
        beacon_protocol::channel::validate_channel_name(channel)
            .map_err(ClientError::InvalidChannel)?;
        let client_id = self.require_client_id()?;
        if self.inner.subscriptions.contains_key(channel) {
            return Err(ClientError::AlreadySubscribed(channel.to_string()));
        }

        let id = self.inner.next_id();
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();

        // Registered before the send so the ack can never beat the mailbox;
        // the same mailbox covers the send-to-ack window and carries either
        // the rejection or the first delivery.
        self.inner
            .subscriptions
            .insert(channel.to_string(), mailbox_tx);
        if let Err(e) = self
            .inner
            .send_frame(Message::subscribe(&id, &client_id, channel))
            .await
        {
            self.inner.subscriptions.remove(channel);
            return Err(e);
        }
        debug!(channel, id = %id, "Subscription registered");

        Ok(Subscription::new(
            id,
            channel.to_string(),
            mailbox_rx,
            self.clone(),
        ))
    }

    /// Unsubscribe from `channel`.
    ///
    /// The local mailbox is removed and closed before the unsubscribe frame
    /// is sent, so local delivery stops no later than the server honors the
    /// request.
    ///
    /// # Errors
    ///
    /// Fails if no subscription is active for `channel` or the send fails.
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError> {
        let client_id = self.require_client_id()?;
        if self.inner.subscriptions.remove(channel).is_none() {
            return Err(ClientError::NotSubscribed(channel.to_string()));
        }
        debug!(channel, "Subscription removed");

        let id = self.inner.next_id();
        self.inner
            .send_frame(Message::unsubscribe(&id, &client_id, channel))
            .await
    }

    /// Publish `data` on `channel`, returning the assigned message id.
    ///
    /// There is no acknowledgment wait; a server-side rejection is only
    /// observable through a callback registered with
    /// [`on_publish_response`].
    ///
    /// [`on_publish_response`]: Client::on_publish_response
    ///
    /// # Errors
    ///
    /// Fails on invalid channel names or local send failure.
    pub async fn publish(&self, channel: &str, data: Value) -> Result<String, ClientError> {
        beacon_protocol::channel::validate_channel_name(channel)
            .map_err(ClientError::InvalidChannel)?;
        let client_id = self.require_client_id()?;

        let id = self.inner.next_id();
        self.inner
            .send_frame(Message::publish(&id, &client_id, channel, data))
            .await?;
        Ok(id)
    }

    /// Register `callback` for publish acknowledgments on `channel`,
    /// replacing any prior registration. At most one callback per channel.
    ///
    /// The dispatch loop invokes it synchronously with any frame on
    /// `channel` that is not a subscription delivery.
    pub fn on_publish_response<F>(&self, channel: &str, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner
            .publish_callbacks
            .insert(channel.to_string(), Box::new(callback));
    }

    /// The client id granted by the handshake, if it completed.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        let id = self.inner.client_id.read().unwrap().clone();
        (!id.is_empty()).then_some(id)
    }

    /// Last-known server reconnection advice. Stored, never acted upon.
    #[must_use]
    pub fn advice(&self) -> Option<Advice> {
        self.inner.advice.lock().unwrap().clone()
    }

    /// Watch the connection state, including the dispatch loop's terminal
    /// error.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    fn require_client_id(&self) -> Result<String, ClientError> {
        let id = self.inner.client_id.read().unwrap().clone();
        if id.is_empty() {
            return Err(ClientError::NotConnected("handshake not completed"));
        }
        Ok(id)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection_type", &self.inner.connection_type)
            .field("client_id", &*self.inner.client_id.read().unwrap())
            .finish_non_exhaustive()
    }
}

/// Apply `limit` to `future` if set; a `None` limit means no timeout.
async fn maybe_timeout<F, T>(limit: Option<Duration>, future: F) -> Result<T, TransportError>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| TransportError::Timeout),
        None => Ok(future.await),
    }
}
