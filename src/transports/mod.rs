//! Transport implementations for the duel relay protocol.
//!
//! | Type                  | Stream                                  | Feature         |
//! |-----------------------|-----------------------------------------|-----------------|
//! | [`FramedTransport`]   | any `AsyncRead + AsyncWrite`            | always          |
//! | [`TcpTransport`]      | `tokio::net::TcpStream`                 | `transport-tcp` |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), duel_client::DuelError> {
//! use duel_client::protocol::Message;
//! use duel_client::{TcpTransport, Transport};
//!
//! let mut tcp = TcpTransport::connect("127.0.0.1", 5000).await?;
//! tcp.send(Message::connect("Alice")).await?;
//!
//! if let Some(Ok(msg)) = tcp.recv().await {
//!     println!("relay said: {:?}", msg.header());
//! }
//!
//! tcp.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod framed;
#[cfg(feature = "transport-tcp")]
pub mod tcp;

pub use framed::FramedTransport;
#[cfg(feature = "transport-tcp")]
pub use tcp::TcpTransport;
