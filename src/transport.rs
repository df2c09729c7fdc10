//! Transport abstraction for the duel relay protocol.
//!
//! The [`Transport`] trait is a bidirectional channel of whole [`Message`]s.
//! Implementations own the framing: each [`send`](Transport::send) writes one
//! complete frame and each [`recv`](Transport::recv) yields one complete,
//! fully decoded message or an error, never a partial one.
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait. Construct a connected
//! transport externally (for TCP see `TcpTransport::connect`) and hand it to
//! `DuelClient::start`, or let `DuelClient::connect` do both.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use duel_client::error::DuelError;
//! use duel_client::protocol::Message;
//! use duel_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: Message) -> Result<(), DuelError> {
//!         // Frame and write the message
//!         # let _ = message;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Message, DuelError>> {
//!         // Return None when the stream ends cleanly between frames
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), DuelError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DuelError;
use crate::protocol::Message;

/// A bidirectional message transport for the duel relay protocol.
///
/// The session's transport loop is the only owner of a transport, so sends
/// are never issued concurrently on one instance.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. Dropping a pending `recv` future must not lose
/// buffered bytes.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one message to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::TransportSend`] if the write fails and
    /// [`DuelError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: Message) -> Result<(), DuelError>;

    /// Receive the next message from the relay.
    ///
    /// Returns:
    /// - `Some(Ok(message))`: a complete message was decoded
    /// - `Some(Err(e))`: the stream failed or a frame could not be decoded
    /// - `None`: the relay closed the stream between frames
    ///
    /// After [`close`](Transport::close) this yields
    /// `Some(Err(DuelError::TransportClosed))`.
    async fn recv(&mut self) -> Option<Result<Message, DuelError>>;

    /// Close the transport. Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown of the underlying stream fails.
    /// Resources are released regardless.
    async fn close(&mut self) -> Result<(), DuelError>;
}
