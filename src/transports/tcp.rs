//! TCP transport implementation.
//!
//! [`TcpTransport`] is a [`FramedTransport`] over a
//! [`tokio::net::TcpStream`], the stream the relay listens on.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-tcp` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), duel_client::DuelError> {
//! use duel_client::protocol::Message;
//! use duel_client::{TcpTransport, Transport};
//!
//! let mut transport = TcpTransport::connect("127.0.0.1", 5000).await?;
//! transport.send(Message::connect("Alice")).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::net::TcpStream;

use crate::codec::MessageCodec;
use crate::error::DuelError;
use crate::transports::framed::FramedTransport;

/// A [`Transport`](crate::Transport) backed by a TCP connection.
pub type TcpTransport = FramedTransport<TcpStream>;

impl FramedTransport<TcpStream> {
    /// Open a TCP connection to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::ConnectFailed`] if the host cannot be resolved or
    /// the connection is refused.
    pub async fn connect(host: &str, port: u16) -> Result<Self, DuelError> {
        Self::connect_with_codec(host, port, MessageCodec::new()).await
    }

    /// Open a TCP connection using an explicit frame codec.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_codec(
        host: &str,
        port: u16,
        codec: MessageCodec,
    ) -> Result<Self, DuelError> {
        tracing::debug!(host = %host, port, "connecting to relay");

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(DuelError::ConnectFailed)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!("failed to disable Nagle on relay socket: {e}");
        }

        tracing::info!(host = %host, port, "relay connection established");
        Ok(Self::with_codec(stream, codec))
    }

    /// Open a TCP connection, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::Timeout`] if the deadline elapses, or any error
    /// that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        codec: MessageCodec,
        timeout: Duration,
    ) -> Result<Self, DuelError> {
        tokio::time::timeout(timeout, Self::connect_with_codec(host, port, codec))
            .await
            .map_err(|_| DuelError::Timeout)?
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self::new(stream)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{Message, MessageHeader, PlayerSign};
    use crate::transport::Transport;
    use tokio::net::TcpListener;

    /// Start a local relay stub that runs `handler` on the accepted
    /// connection and returns the port to connect to.
    async fn start_mock_relay<F, Fut>(handler: F) -> u16
    where
        F: FnOnce(TcpTransport) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            handler(TcpTransport::from_stream(tcp)).await;
        });

        port
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_port() {
        let err = TcpTransport::connect("127.0.0.1", 1).await.unwrap_err();
        assert!(matches!(err, DuelError::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable TEST-NET address.
        let result = TcpTransport::connect_with_timeout(
            "192.0.2.1",
            1,
            MessageCodec::new(),
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(
            result.unwrap_err(),
            DuelError::Timeout | DuelError::ConnectFailed(_)
        ));
    }

    #[tokio::test]
    async fn recv_receives_relay_messages() {
        let port = start_mock_relay(|mut relay| async move {
            relay
                .send(Message::builder(MessageHeader::WaitingForSecondClient).build())
                .await
                .unwrap();
            relay
                .send(
                    Message::builder(MessageHeader::StartingGame)
                        .data("X")
                        .player_sign(PlayerSign::O)
                        .build(),
                )
                .await
                .unwrap();
            relay.close().await.unwrap();
        })
        .await;

        let mut transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();
        let first = transport.recv().await.unwrap().unwrap();
        assert_eq!(first.header(), MessageHeader::WaitingForSecondClient);

        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second.player_sign(), Some(PlayerSign::O));
        assert_eq!(second.data(), Some("X"));

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_round_trip() {
        let port = start_mock_relay(|mut relay| async move {
            if let Some(Ok(msg)) = relay.recv().await {
                relay.send(msg).await.unwrap();
            }
            relay.close().await.unwrap();
        })
        .await;

        let mut transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();
        transport.send(Message::connect("Echo")).await.unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, Message::connect("Echo"));
    }
}
