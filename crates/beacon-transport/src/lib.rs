//! # beacon-transport
//!
//! Transport abstraction layer for the Beacon Bayeux client.
//!
//! A transport provides one persistent, message-framed, bidirectional
//! connection to a Bayeux server. The abstraction splits the connection at
//! dial time into a write half and a read half, because the client's
//! dispatch loop must own the read half exclusively while lifecycle and
//! publish calls share the write half.
//!
//! ```rust,ignore
//! use beacon_transport::{Transport, WebSocketTransport};
//!
//! let (sink, stream) = WebSocketTransport::default()
//!     .dial("ws://localhost:8000/bayeux")
//!     .await?;
//! ```

pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{FrameSink, FrameStream, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
