//! The extension pipeline.
//!
//! Extensions are transforms applied to every frame crossing the connection
//! boundary: outbound frames immediately before serialization, inbound
//! frames as they come off the socket. An extension mutates the frame in
//! place; it cannot abort or replace it, and it runs exactly once per
//! direction per frame, in registration order.
//!
//! The handshake response is read directly by [`Client::handshake`] because
//! the dispatch loop does not exist yet at that point; it still goes through
//! the same [`ExtensionPipeline::apply_incoming`] primitive as every other
//! inbound frame.
//!
//! [`Client::handshake`]: crate::Client::handshake

use beacon_protocol::Message;

/// A registered frame transform.
pub type Extension = Box<dyn Fn(&mut Message) + Send + Sync>;

/// Ordered inbound and outbound transform lists, configured once at
/// connection setup.
#[derive(Default)]
pub struct ExtensionPipeline {
    incoming: Vec<Extension>,
    outgoing: Vec<Extension>,
}

impl ExtensionPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an inbound transform.
    #[must_use]
    pub fn with_incoming<F>(mut self, extension: F) -> Self
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        self.incoming.push(Box::new(extension));
        self
    }

    /// Append an outbound transform.
    #[must_use]
    pub fn with_outgoing<F>(mut self, extension: F) -> Self
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        self.outgoing.push(Box::new(extension));
        self
    }

    /// Run every inbound transform over `frame`, in registration order.
    pub fn apply_incoming(&self, frame: &mut Message) {
        for extension in &self.incoming {
            extension(frame);
        }
    }

    /// Run every outbound transform over `frame`, in registration order.
    pub fn apply_outgoing(&self, frame: &mut Message) {
        for extension in &self.outgoing {
            extension(frame);
        }
    }
}

impl std::fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPipeline")
            .field("incoming", &self.incoming.len())
            .field("outgoing", &self.outgoing.len())
            .finish()
    }
}
