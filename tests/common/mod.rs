#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for duel client integration tests.
//!
//! Provides a channel-based loopback transport that lets a test play the
//! relay step by step, a scripted [`MockTransport`], a [`RecordingSink`],
//! and constructors for the relay's messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use duel_client::protocol::{Message, MessageHeader, PlayerSign};
use duel_client::{DuelError, PresentationSink, Transport};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Loopback transport ──────────────────────────────────────────────

/// Client half of an in-process relay connection.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Option<Result<Message, DuelError>>>,
    pub closed: Arc<AtomicBool>,
}

/// Relay half: read what the client sent and push replies.
pub struct LoopbackRelay {
    pub rx: mpsc::UnboundedReceiver<Message>,
    tx: mpsc::UnboundedSender<Option<Result<Message, DuelError>>>,
    pub closed: Arc<AtomicBool>,
}

impl LoopbackRelay {
    /// Deliver a message to the client.
    pub fn push(&self, message: Message) {
        self.tx.send(Some(Ok(message))).unwrap();
    }

    /// Deliver a receive error to the client. Ignored once the client
    /// transport is gone.
    pub fn push_error(&self, error: DuelError) {
        let _ = self.tx.send(Some(Err(error)));
    }

    /// Simulate the relay closing the stream.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Wait for the next frame the client writes.
    pub async fn expect_frame(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped")
    }

    /// Assert the client writes nothing for a short while.
    pub async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await;
        match result {
            Err(_) | Ok(None) => {}
            Ok(Some(msg)) => panic!("expected no frame, got {msg:?}"),
        }
    }
}

/// Create a connected `(transport, relay)` pair.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackRelay) {
    let (client_tx, relay_rx) = mpsc::unbounded_channel();
    let (relay_tx, client_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
            closed: Arc::clone(&closed),
        },
        LoopbackRelay {
            rx: relay_rx,
            tx: relay_tx,
            closed,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: Message) -> Result<(), DuelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DuelError::TransportClosed);
        }
        self.tx
            .send(message)
            .map_err(|e| DuelError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Message, DuelError>> {
        if self.closed.load(Ordering::Acquire) {
            return Some(Err(DuelError::TransportClosed));
        }
        // `None` from the channel means the relay half was dropped.
        self.rx.recv().await.flatten()
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── Scripted transport ──────────────────────────────────────────────

/// Replays scripted relay responses and records what the client sent.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<Message, DuelError>>>,
    pub sent: Arc<StdMutex<Vec<Message>>>,
    pub closed: Arc<AtomicBool>,
    /// When set, every `send` fails.
    pub fail_sends: bool,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<Message, DuelError>>>,
    ) -> (Self, Arc<StdMutex<Vec<Message>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            fail_sends: false,
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: Message) -> Result<(), DuelError> {
        if self.fail_sends {
            return Err(DuelError::TransportSend("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Message, DuelError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Recording sink ──────────────────────────────────────────────────

/// A sink call, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Status(String),
    Cell(String, PlayerSign),
    InputEnabled(bool),
    Visible(bool),
    Outcome(bool),
    Failure(String),
    SendFailure(String),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl PresentationSink for RecordingSink {
    fn append_status_line(&mut self, text: &str) {
        self.calls.push(SinkCall::Status(text.to_string()));
    }

    fn set_cell(&mut self, cell_id: &str, sign: PlayerSign) {
        self.calls.push(SinkCall::Cell(cell_id.to_string(), sign));
    }

    fn set_board_input_enabled(&mut self, enabled: bool) {
        self.calls.push(SinkCall::InputEnabled(enabled));
    }

    fn announce_outcome(&mut self, won: bool) {
        self.calls.push(SinkCall::Outcome(won));
    }

    fn set_board_visible(&mut self, visible: bool) {
        self.calls.push(SinkCall::Visible(visible));
    }

    fn announce_connection_failure(&mut self, reason: &str) {
        self.calls.push(SinkCall::Failure(reason.to_string()));
    }

    fn report_send_failure(&mut self, reason: &str) {
        self.calls.push(SinkCall::SendFailure(reason.to_string()));
    }
}

// ── Relay message constructors ──────────────────────────────────────

pub fn waiting() -> Message {
    Message::builder(MessageHeader::WaitingForSecondClient).build()
}

pub fn starting_game(sign: PlayerSign, starting: PlayerSign) -> Message {
    Message::builder(MessageHeader::StartingGame)
        .data(starting.to_string())
        .player_sign(sign)
        .build()
}

pub fn correct_move() -> Message {
    Message::builder(MessageHeader::CorrectMove).build()
}

pub fn opponent_moved(cell: &str) -> Message {
    Message::builder(MessageHeader::OpponentMoved)
        .data(cell)
        .build()
}

pub fn winner() -> Message {
    Message::builder(MessageHeader::Winner).build()
}

pub fn game_lost() -> Message {
    Message::builder(MessageHeader::GameLost).build()
}
