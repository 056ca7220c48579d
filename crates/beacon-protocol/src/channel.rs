//! Channel classification.
//!
//! Bayeux reserves five meta channels for connection lifecycle; everything
//! else is an application channel carrying user data.

/// Handshake meta channel.
pub const HANDSHAKE: &str = "/meta/handshake";
/// Connect meta channel.
pub const CONNECT: &str = "/meta/connect";
/// Disconnect meta channel.
pub const DISCONNECT: &str = "/meta/disconnect";
/// Subscribe meta channel.
pub const SUBSCRIBE: &str = "/meta/subscribe";
/// Unsubscribe meta channel.
pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Whether `channel` is one of the five reserved meta channels.
///
/// Pure classification; no connection state involved.
#[must_use]
pub fn is_meta(channel: &str) -> bool {
    matches!(
        channel,
        HANDSHAKE | CONNECT | DISCONNECT | SUBSCRIBE | UNSUBSCRIBE
    )
}

/// Validate an application channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid or reserved.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("channel name too long");
    }
    if !name.starts_with('/') {
        return Err("channel name must start with '/'");
    }
    if name.starts_with("/meta/") {
        return Err("'/meta/' channels are reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("channel name contains invalid characters");
    }
    Ok(())
}
