//! # Duel Client
//!
//! Client side of a two-player, turn-based relay protocol over TCP.
//!
//! A relay server pairs two clients, assigns each a sign, and relays moves
//! until it announces a winner. This crate provides the client half: the
//! length-prefixed message framing, the session state machine that sequences
//! connection, pairing, turns and termination, and an async handle that runs
//! the receive loop in the background while the UI submits moves.
//!
//! ## Features
//!
//! - **Framed transport**: one JSON [`Message`] per length-prefixed frame,
//!   never a partial or concatenated one
//! - **Transport-agnostic**: implement the [`Transport`] trait for any stream;
//!   the default `transport-tcp` feature provides [`TcpTransport`]
//! - **Race-free turns**: input is disabled under the session lock before a
//!   move leaves the client
//! - **Ordered presentation updates**: typed [`DuelEvent`]s on one channel,
//!   applied to a [`PresentationSink`] by a single consumer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use duel_client::{ConnectionTarget, DuelClient, DuelConfig};
//!
//! let target = ConnectionTarget::parse("127.0.0.1:5000", "Alice")?;
//! let (client, mut events) = DuelClient::connect(target, DuelConfig::default());
//! duel_client::sink::drain_events(&mut events, &mut my_board).await;
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{ConnectionTarget, DuelClient, DuelConfig};
pub use codec::MessageCodec;
pub use error::DuelError;
pub use event::DuelEvent;
pub use protocol::{Message, MessageHeader, PlayerSign};
pub use session::{SessionPhase, SessionState};
pub use sink::PresentationSink;
pub use transport::Transport;
pub use transports::FramedTransport;
#[cfg(feature = "transport-tcp")]
pub use transports::TcpTransport;
