//! # beacon-client
//!
//! Client engine for the Bayeux publish/subscribe protocol over one
//! persistent, message-framed streaming connection.
//!
//! The engine is built around a single read-dispatch task that is the sole
//! consumer of the socket: it classifies every inbound frame (meta ack,
//! event delivery, publish acknowledgment), feeds per-channel subscription
//! mailboxes, resolves pending lifecycle acknowledgments, and stores server
//! advice. Callers drive the lifecycle and subscribe/publish operations;
//! every outbound frame funnels through one send primitive and the
//! outbound extension pipeline.
//!
//! ```rust,ignore
//! use beacon_client::{Client, ClientConfig, ExtensionPipeline};
//!
//! let client = Client::dial(
//!     "ws://localhost:8000/bayeux",
//!     ClientConfig::default(),
//!     ExtensionPipeline::new(),
//! )
//! .await?;
//! client.handshake().await?;
//! client.connect().await?;
//!
//! client
//!     .subscribe("/chat/lobby", |data| println!("{data}"))
//!     .await?;
//! ```

pub mod client;
mod dispatch;
pub mod error;
pub mod extension;
pub mod subscription;

pub use client::{Client, ClientConfig, ConnectionState, PublishResponseHandler};
pub use error::ClientError;
pub use extension::{Extension, ExtensionPipeline};
pub use subscription::Subscription;

pub use beacon_protocol::{Advice, Message, Reconnect};

#[cfg(test)]
pub(crate) mod testutil;
