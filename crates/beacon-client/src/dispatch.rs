//! The read-dispatch loop.
//!
//! One spawned task is the sole reader of the socket and the sole writer of
//! subscription mailboxes, the advice store, and pending-ack resolution.
//! Frames are processed strictly in arrival order; a subscribe rejection is
//! therefore observed by its consumer before any delivery frame for the
//! same channel.

use std::sync::Arc;

use beacon_protocol::{channel, Message};
use beacon_transport::FrameStream;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::client::{ConnectionState, Inner};

/// Why the loop exited.
enum LoopExit {
    /// Stop signal accepted (disconnect).
    Stopped,
    /// The server closed the connection cleanly.
    Closed,
    /// Transport failure or internal consistency fault.
    Failed(String),
}

pub(crate) struct Dispatcher {
    stream: Box<dyn FrameStream>,
    inner: Arc<Inner>,
    stop_rx: watch::Receiver<bool>,
}

impl Dispatcher {
    pub(crate) fn new(stream: Box<dyn FrameStream>, inner: Arc<Inner>) -> Self {
        let stop_rx = inner.stop_tx.subscribe();
        Self {
            stream,
            inner,
            stop_rx,
        }
    }

    /// Run until the socket fails, the server closes, or the stop signal
    /// fires; then publish the terminal state and close every mailbox.
    pub(crate) async fn run(mut self) {
        let exit = self.read_loop().await;

        let state = match exit {
            LoopExit::Stopped => {
                debug!("Dispatch loop stopped");
                ConnectionState::Disconnected
            }
            LoopExit::Closed => {
                debug!("Connection closed by server");
                ConnectionState::Disconnected
            }
            LoopExit::Failed(reason) => {
                warn!(%reason, "Dispatch loop terminated");
                ConnectionState::Failed(reason)
            }
        };
        self.inner.state_tx.send_replace(state);

        // Dropping the senders ends every delivery loop; dropped pending
        // acks surface as closed oneshots to their waiters.
        self.inner.subscriptions.clear();
        self.inner.pending_acks.clear();
    }

    async fn read_loop(&mut self) -> LoopExit {
        loop {
            if *self.stop_rx.borrow() {
                return LoopExit::Stopped;
            }
            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        return LoopExit::Stopped;
                    }
                }
                received = self.stream.recv() => match received {
                    Ok(Some(batch)) => {
                        if let Err(fault) = self.dispatch(batch) {
                            return LoopExit::Failed(fault);
                        }
                    }
                    Ok(None) => return LoopExit::Closed,
                    Err(e) => return LoopExit::Failed(e.to_string()),
                },
            }
        }
    }

    /// Classify and route one inbound batch.
    ///
    /// Only the first element is processed; the server is assumed to send
    /// single-element batches, and extra elements are dropped.
    fn dispatch(&self, mut batch: Vec<Message>) -> Result<(), String> {
        if batch.len() > 1 {
            trace!(dropped = batch.len() - 1, "Ignoring extra batch elements");
        }
        let Some(mut frame) = batch.drain(..).next() else {
            trace!("Ignoring empty batch");
            return Ok(());
        };

        self.inner.extensions.apply_incoming(&mut frame);

        if let Some(advice) = &frame.advice {
            trace!(?advice, "Storing server advice");
            *self.inner.advice.lock().unwrap() = Some(advice.clone());
        }

        match frame.channel.as_str() {
            channel::SUBSCRIBE => self.handle_subscribe_ack(frame),
            meta if channel::is_meta(meta) => {
                self.resolve_pending_ack(frame);
                Ok(())
            }
            _ => {
                self.route_application_frame(frame);
                Ok(())
            }
        }
    }

    /// A subscribe ack. Failure closes the pending mailbox after delivering
    /// the error; success resolves any pending ack and is otherwise inert.
    fn handle_subscribe_ack(&self, frame: Message) -> Result<(), String> {
        if !frame.is_failure() {
            self.resolve_pending_ack(frame);
            return Ok(());
        }

        let name = frame.subscription.clone();
        let Some((_, mailbox)) = self.inner.subscriptions.remove(&name) else {
            // A rejection for a subscription we never registered is a bug,
            // not a recoverable condition; abort the connection.
            error!(subscription = %name, "Subscribe ack references an unknown subscription");
            return Err(format!(
                "subscribe ack references an unknown subscription `{name}`"
            ));
        };

        let mut nack = frame;
        let reason = nack.error_message().unwrap_or("rejected by server");
        nack.error = Some(format!("subscribe to `{name}` failed: {reason}"));
        debug!(subscription = %name, "Subscription rejected");

        // The sender drops right after this push, closing the mailbox
        // behind the error frame.
        let _ = mailbox.send(nack);
        Ok(())
    }

    /// Resolve a meta ack against the correlation map, if anyone is waiting.
    fn resolve_pending_ack(&self, frame: Message) {
        if frame.id.is_empty() {
            trace!(channel = %frame.channel, "Inert meta frame");
            return;
        }
        if let Some((_, waiter)) = self.inner.pending_acks.remove(&frame.id) {
            let _ = waiter.send(frame);
        } else {
            trace!(channel = %frame.channel, id = %frame.id, "Unclaimed meta ack");
        }
    }

    /// An application-channel frame: an event delivery if a mailbox exists,
    /// a publish acknowledgment if a callback is registered, otherwise a
    /// silent drop.
    fn route_application_frame(&self, frame: Message) {
        if let Some(mailbox) = self.inner.subscriptions.get(&frame.channel) {
            // Unbounded mailbox: a slow consumer cannot stall the reader.
            if mailbox.send(frame).is_err() {
                let name = mailbox.key().clone();
                drop(mailbox);
                debug!(channel = %name, "Removing mailbox with a dropped consumer");
                self.inner.subscriptions.remove(&name);
            }
            return;
        }

        if let Some(callback) = self.inner.publish_callbacks.get(&frame.channel) {
            trace!(channel = %frame.channel, id = %frame.id, "Publish response");
            (callback.value())(&frame);
            return;
        }

        trace!(channel = %frame.channel, "Dropping frame with no consumer");
    }
}
