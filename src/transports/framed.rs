//! Generic framed transport over any async byte stream.
//!
//! [`FramedTransport`] wraps a stream in a [`Framed`] with [`MessageCodec`],
//! translating between whole [`Message`]s and length-prefixed frames. The
//! TCP transport is this type specialised to `tokio::net::TcpStream`; tests
//! use it over `tokio::io::duplex` pipes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::MessageCodec;
use crate::error::DuelError;
use crate::protocol::Message;
use crate::transport::Transport;

/// A [`Transport`] that frames messages over an arbitrary byte stream.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: partially read frames stay in
/// the [`Framed`] read buffer until the next call.
#[derive(Debug)]
pub struct FramedTransport<S> {
    framed: Framed<S, MessageCodec>,
    closed: bool,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a connected stream with the default frame limit.
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, MessageCodec::new())
    }

    /// Wrap a connected stream with an explicit codec.
    pub fn with_codec(stream: S, codec: MessageCodec) -> Self {
        Self {
            framed: Framed::new(stream, codec),
            closed: false,
        }
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Message) -> Result<(), DuelError> {
        if self.closed {
            return Err(DuelError::TransportClosed);
        }
        self.framed.send(message).await.map_err(|e| match e {
            DuelError::Io(io) => DuelError::TransportSend(io.to_string()),
            other => other,
        })
    }

    async fn recv(&mut self) -> Option<Result<Message, DuelError>> {
        if self.closed {
            return Some(Err(DuelError::TransportClosed));
        }
        match self.framed.next().await? {
            Ok(message) => Some(Ok(message)),
            Err(DuelError::Io(io)) => Some(Err(DuelError::TransportReceive(io.to_string()))),
            Err(other) => Some(Err(other)),
        }
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("closing framed transport");
        SinkExt::<Message>::close(&mut self.framed)
            .await
            .map_err(|e| DuelError::TransportSend(e.to_string()))
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
    use crate::codec::encode_frame;
    use crate::protocol::{MessageHeader, PlayerSign};
    use tokio::io::AsyncWriteExt;

    #[test]
    fn framed_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FramedTransport<tokio::io::DuplexStream>>();
    }

    #[tokio::test]
    async fn messages_cross_a_pipe_intact() {
        let (a, b) = tokio::io::duplex(1024);
        let mut client = FramedTransport::new(a);
        let mut relay = FramedTransport::new(b);

        client
            .send(Message::player_move("c3", PlayerSign::X))
            .await
            .unwrap();
        client.send(Message::notify_on_opponent_move()).await.unwrap();

        let first = relay.recv().await.unwrap().unwrap();
        let second = relay.recv().await.unwrap().unwrap();
        assert_eq!(first, Message::player_move("c3", PlayerSign::X));
        assert_eq!(second.header(), MessageHeader::NotifyOnOpponentMove);
    }

    #[tokio::test]
    async fn frame_split_across_reads_is_reassembled() {
        let bytes = encode_frame(&Message::builder(MessageHeader::OpponentMoved).data("b2").build())
            .unwrap();
        let (head, tail) = bytes.split_at(5);
        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();

        let mut transport = FramedTransport::new(mock);
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg.header(), MessageHeader::OpponentMoved);
        assert_eq!(msg.data(), Some("b2"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn clean_close_between_frames_yields_none() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(a);
        b.write_all(&encode_frame(&Message::notify_on_second_client()).unwrap())
            .await
            .unwrap();
        drop(b);

        assert!(transport.recv().await.unwrap().is_ok());
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_mid_frame_yields_truncated() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(a);
        let bytes = encode_frame(&Message::connect("Carol")).unwrap();
        b.write_all(&bytes[..bytes.len() - 1]).await.unwrap();
        drop(b);

        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, DuelError::Truncated { .. }));
    }

    #[tokio::test]
    async fn garbage_body_yields_decode_error() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(a);
        let mut bytes = 5u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"hello");
        b.write_all(&bytes).await.unwrap();

        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, DuelError::Decode(_)));
    }

    #[tokio::test]
    async fn send_and_recv_after_close_return_transport_closed() {
        let (a, _b) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(a);
        transport.close().await.unwrap();

        let err = transport
            .send(Message::notify_on_second_client())
            .await
            .unwrap_err();
        assert!(matches!(err, DuelError::TransportClosed));
        assert!(matches!(
            transport.recv().await,
            Some(Err(DuelError::TransportClosed))
        ));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let (a, _b) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(a);
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_to_dropped_peer_is_a_send_error() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let mut transport = FramedTransport::new(a);

        let err = transport.send(Message::connect("Dave")).await.unwrap_err();
        assert!(matches!(err, DuelError::TransportSend(_)));
    }
}
