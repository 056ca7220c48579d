//! # beacon-protocol
//!
//! Wire protocol definitions for the Beacon Bayeux client.
//!
//! This crate defines the JSON wire format exchanged with a Bayeux server,
//! including the message model, meta-channel classification, and the batch
//! codec.
//!
//! ## Wire format
//!
//! Every frame travels as an element of a JSON array. The client always
//! sends single-element batches; received batches may carry more elements,
//! which the dispatch layer is free to ignore.
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, Message};
//!
//! let frame = Message::handshake("1.0", vec!["websocket".to_string()]);
//! let encoded = codec::encode_batch(std::slice::from_ref(&frame)).unwrap();
//! let decoded = codec::decode_batch(&encoded).unwrap();
//! assert_eq!(decoded[0].channel, beacon_protocol::channel::HANDSHAKE);
//! ```

pub mod channel;
pub mod codec;
pub mod message;

pub use codec::{decode_batch, encode_batch, ProtocolError};
pub use message::{Advice, Message, Reconnect};

/// Protocol version negotiated during handshake.
pub const BAYEUX_VERSION: &str = "1.0";
