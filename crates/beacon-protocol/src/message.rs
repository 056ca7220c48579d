//! The Bayeux message model.
//!
//! A [`Message`] is one protocol frame. The same structure carries every
//! frame kind; which fields are populated depends on the channel it travels
//! on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel;

/// Server guidance on reconnection behavior.
///
/// Stored by the client whenever a frame carries it; the current client does
/// not act on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Advice {
    /// How the client should re-establish the connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<Reconnect>,
    /// Maximum time in milliseconds the server will hold a connect request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Delay in milliseconds before the next connect request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Reconnect policy carried inside [`Advice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reconnect {
    /// Reconnect with a connect frame.
    Retry,
    /// Re-handshake before reconnecting.
    Handshake,
    /// Do not reconnect.
    None,
}

/// One Bayeux protocol frame.
///
/// String fields use the empty string for "absent", matching the wire
/// convention of omitting them; serialization skips empty fields so an
/// outbound frame only carries what it populates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    /// Meta channel or application channel this frame travels on.
    pub channel: String,

    /// Client-assigned correlation id, unique per connection.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Connection identity granted by the handshake response.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    /// Opaque payload on publish and delivery frames.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Present on response frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,

    /// Server-supplied error description on failed responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Reconnection guidance, may ride on any response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,

    /// Channel being (un)subscribed, on subscribe/unsubscribe frames.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subscription: String,

    /// Protocol version, on handshake frames.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Transports the client can speak, on handshake frames.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_connection_types: Vec<String>,

    /// Negotiated transport, on connect frames.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub connection_type: String,

    /// Extension data; the conventional place for extension pipelines to
    /// write their fields.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub ext: serde_json::Map<String, Value>,
}

impl Message {
    /// The server-supplied error string, if this frame carries one.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Whether this response frame reports failure.
    ///
    /// Frames without a `successful` field are not failures.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.successful == Some(false)
    }

    /// Create a handshake request.
    #[must_use]
    pub fn handshake(version: impl Into<String>, supported_connection_types: Vec<String>) -> Self {
        Self {
            channel: channel::HANDSHAKE.to_string(),
            version: version.into(),
            supported_connection_types,
            ..Self::default()
        }
    }

    /// Create a connect request.
    #[must_use]
    pub fn connect(
        id: impl Into<String>,
        client_id: impl Into<String>,
        connection_type: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel::CONNECT.to_string(),
            id: id.into(),
            client_id: client_id.into(),
            connection_type: connection_type.into(),
            ..Self::default()
        }
    }

    /// Create a disconnect request.
    #[must_use]
    pub fn disconnect(id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            channel: channel::DISCONNECT.to_string(),
            id: id.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Create a subscribe request for `subscription`.
    #[must_use]
    pub fn subscribe(
        id: impl Into<String>,
        client_id: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel::SUBSCRIBE.to_string(),
            id: id.into(),
            client_id: client_id.into(),
            subscription: subscription.into(),
            ..Self::default()
        }
    }

    /// Create an unsubscribe request for `subscription`.
    #[must_use]
    pub fn unsubscribe(
        id: impl Into<String>,
        client_id: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel::UNSUBSCRIBE.to_string(),
            id: id.into(),
            client_id: client_id.into(),
            subscription: subscription.into(),
            ..Self::default()
        }
    }

    /// Create a publish frame carrying `data`.
    #[must_use]
    pub fn publish(
        id: impl Into<String>,
        client_id: impl Into<String>,
        channel: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            client_id: client_id.into(),
            data,
            ..Self::default()
        }
    }
}
