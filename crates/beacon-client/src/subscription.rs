//! Subscription handles and the delivery loop.
//!
//! A [`Subscription`] is a live interest in one application channel. The
//! dispatch loop pushes every matching inbound frame into the
//! subscription's mailbox; the holder drains it with [`Subscription::next`]
//! or hands a closure to [`Subscription::on_message`].

use beacon_protocol::Message;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::Client;
use crate::error::ClientError;

/// A live subscription to one application channel.
///
/// Dropping the handle without calling [`unsubscribe`] leaves the server
/// subscription in place; the dispatch loop removes the dead mailbox on the
/// next delivery attempt.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    id: String,
    channel: String,
    mailbox: mpsc::UnboundedReceiver<Message>,
    client: Client,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        channel: String,
        mailbox: mpsc::UnboundedReceiver<Message>,
        client: Client,
    ) -> Self {
        Self {
            id,
            channel,
            mailbox,
            client,
        }
    }

    /// The id of the subscribe request that created this subscription.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The subscribed channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Take the next frame from the mailbox.
    ///
    /// Frames arrive in server-send order with no interleaving from other
    /// channels. Returns `None` once the mailbox is closed (unsubscribe,
    /// subscribe rejection already consumed, or connection teardown).
    pub async fn next(&mut self) -> Option<Message> {
        self.mailbox.recv().await
    }

    /// Consume the mailbox, handing each frame's payload to `on_message`.
    ///
    /// Returns only when the mailbox closes. A frame carrying an error (the
    /// subscribe rejection path) terminates delivery immediately with that
    /// error; the handler never sees it.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError::Protocol`] carrying the server-supplied
    /// error string if the subscription was rejected.
    pub async fn on_message<F>(mut self, mut on_message: F) -> Result<(), ClientError>
    where
        F: FnMut(Value),
    {
        while let Some(frame) = self.mailbox.recv().await {
            if let Some(reason) = frame.error_message() {
                return Err(ClientError::Protocol {
                    channel: self.channel.clone(),
                    reason: reason.to_string(),
                });
            }
            on_message(frame.data);
        }
        Ok(())
    }

    /// Unsubscribe from the channel, closing the mailbox immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription was already removed or the send
    /// fails.
    pub async fn unsubscribe(self) -> Result<(), ClientError> {
        self.client.unsubscribe(&self.channel).await
    }

    /// Publish `data` on this subscription's channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the local send fails.
    pub async fn publish(&self, data: Value) -> Result<String, ClientError> {
        self.client.publish(&self.channel, data).await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
