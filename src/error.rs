//! Error types for the duel client.

use thiserror::Error;

/// Errors that can occur when using the duel client.
#[derive(Debug, Error)]
pub enum DuelError {
    /// The TCP stream to the relay could not be established.
    #[error("could not connect to relay: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The server address supplied by the user is not a usable `host:port`.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// A frame body could not be decoded into a [`Message`](crate::protocol::Message).
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A frame announced a body longer than the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Length announced by the frame prefix.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream ended with {remaining} bytes of an incomplete frame")]
    Truncated {
        /// Number of buffered bytes that never formed a full frame.
        remaining: usize,
    },

    /// A buffer held more bytes than the single frame it was meant to carry.
    #[error("{count} trailing bytes after frame")]
    TrailingBytes {
        /// Number of bytes left over after the frame.
        count: usize,
    },

    /// Attempted an operation that requires an active session.
    #[error("not connected to relay")]
    NotConnected,

    /// Attempted a move while it is not this client's turn.
    #[error("not this player's turn")]
    NotYourTurn,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DuelError {
    /// Returns `true` for errors raised while turning bytes into a message.
    ///
    /// These are logged separately from plain transport failures but end the
    /// session the same way.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::FrameTooLarge { .. }
                | Self::Truncated { .. }
                | Self::TrailingBytes { .. }
        )
    }
}

/// A specialized [`Result`] type for duel client operations.
pub type Result<T> = std::result::Result<T, DuelError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_class_errors_are_flagged() {
        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(DuelError::from(json_err).is_decode_error());
        assert!(DuelError::Truncated { remaining: 3 }.is_decode_error());
        assert!(DuelError::FrameTooLarge { len: 10, max: 5 }.is_decode_error());
        assert!(DuelError::TrailingBytes { count: 2 }.is_decode_error());
        assert!(!DuelError::TransportClosed.is_decode_error());
        assert!(!DuelError::TransportReceive("reset".into()).is_decode_error());
    }

    #[test]
    fn display_mentions_limits() {
        let err = DuelError::FrameTooLarge { len: 70000, max: 65536 };
        assert_eq!(
            err.to_string(),
            "frame of 70000 bytes exceeds limit of 65536 bytes"
        );
    }
}
