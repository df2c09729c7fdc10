//! Async client for the duel relay protocol.
//!
//! [`DuelClient`] is a thin handle over a background transport loop task. The
//! loop owns the [`Transport`], receives relay messages, runs them through the
//! [`SessionState`] transition table, writes replies, and emits
//! [`DuelEvent`]s on a bounded channel returned from [`DuelClient::start`] or
//! [`DuelClient::connect`].
//!
//! User actions (`submit_move`) take the session lock on the caller's thread,
//! so input is disabled before the `MOVE` frame is queued to the loop.
//!
//! # Example
//!
//! ```rust,ignore
//! let target = ConnectionTarget::parse("127.0.0.1:5000", "Alice")?;
//! let (client, mut events) = DuelClient::connect(target, DuelConfig::default());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DuelEvent::BoardInputEnabled(true) => client.submit_move("c1")?,
//!         DuelEvent::Outcome { won } => { println!("won: {won}"); break; }
//!         DuelEvent::ConnectionFailed { reason } => { eprintln!("{reason}"); break; }
//!         _ => {}
//!     }
//! }
//! ```

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::codec::DEFAULT_MAX_FRAME_LEN;
use crate::error::{DuelError, Result};
use crate::event::{status, DuelEvent};
use crate::protocol::PlayerSign;
use crate::session::{Effect, SessionPhase, SessionState};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`DuelClient`] session.
///
/// # Example
///
/// ```
/// use duel_client::client::DuelConfig;
/// use std::time::Duration;
///
/// let config = DuelConfig::default()
///     .with_event_channel_capacity(64)
///     .with_connect_timeout(Duration::from_secs(5));
/// assert_eq!(config.event_channel_capacity, 64);
/// assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct DuelConfig {
    /// Capacity of the bounded event channel.
    ///
    /// Events are never dropped: when the consumer falls behind, the
    /// transport loop waits for room. Defaults to **256**. Values below 1
    /// are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`DuelClient::shutdown`] waits for the loop to close the
    /// transport before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Upper bound on establishing the TCP connection in
    /// [`DuelClient::connect`]. `None` (the default) waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Largest accepted frame body in bytes. Defaults to **64 KiB**.
    pub max_frame_len: usize,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl DuelConfig {
    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bound the time spent establishing the TCP connection.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the largest accepted frame body.
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

// ── ConnectionTarget ────────────────────────────────────────────────

/// Where to connect and under which name, as collected from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Relay host name or IP address.
    pub host: String,
    /// Relay TCP port.
    pub port: u16,
    /// Display name sent in `CONNECT`.
    pub player_name: String,
}

impl ConnectionTarget {
    /// Create a target from already-validated parts.
    pub fn new(host: impl Into<String>, port: u16, player_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            player_name: player_name.into(),
        }
    }

    /// Parse a `host:port` server address typed by the user.
    ///
    /// The port is taken after the last `:`. Surrounding whitespace is
    /// trimmed from both the address and the name.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::InvalidAddress`] for a missing host or port, a
    /// port that is not a number in `1..=65535`, or an empty player name.
    ///
    /// ```
    /// use duel_client::client::ConnectionTarget;
    ///
    /// let target = ConnectionTarget::parse("localhost:5000", "Alice").unwrap();
    /// assert_eq!(target.host, "localhost");
    /// assert_eq!(target.port, 5000);
    /// assert!(ConnectionTarget::parse("localhost", "Alice").is_err());
    /// ```
    pub fn parse(server_address: &str, player_name: &str) -> Result<Self> {
        let address = server_address.trim();
        let Some((host, port)) = address.rsplit_once(':') else {
            return Err(DuelError::InvalidAddress(format!(
                "`{address}` is missing a port"
            )));
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(DuelError::InvalidAddress(format!(
                "`{address}` is missing a host"
            )));
        }
        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                return Err(DuelError::InvalidAddress(format!(
                    "`{port}` is not a valid port"
                )))
            }
        };
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(DuelError::InvalidAddress("player name is empty".into()));
        }
        Ok(Self::new(host, port, player_name))
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the transport loop.
struct Shared {
    connected: AtomicBool,
    session: Mutex<SessionState>,
}

impl Shared {
    fn new(session: SessionState) -> Self {
        Self {
            connected: AtomicBool::new(true),
            session: Mutex::new(session),
        }
    }

    /// Never hold the guard across an `.await`.
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for one game session.
///
/// Created via [`DuelClient::start`] (with a connected transport) or
/// [`DuelClient::connect`] (which opens the TCP stream in the background).
pub struct DuelClient {
    /// Effects queued for the transport loop.
    cmd_tx: mpsc::UnboundedSender<Vec<Effect>>,
    /// Session state shared with the transport loop.
    shared: Arc<Shared>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl DuelClient {
    /// Start a session over an already-connected transport.
    ///
    /// The loop sends `CONNECT{player_name}` as its first frame.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        player_name: &str,
        config: DuelConfig,
    ) -> (Self, mpsc::Receiver<DuelEvent>) {
        Self::spawn(player_name, &config, |cmd_rx, event_tx, shared, shutdown_rx| {
            transport_loop(transport, cmd_rx, event_tx, shared, shutdown_rx)
        })
    }

    /// Open a TCP connection to `target` in the background and start a
    /// session over it.
    ///
    /// If the relay cannot be reached the session moves to
    /// [`SessionPhase::ConnectionFailed`] and the event channel yields a single
    /// [`DuelEvent::ConnectionFailed`]. Retry by calling `connect` again.
    #[cfg(feature = "transport-tcp")]
    #[must_use = "the event receiver must be used to receive events"]
    pub fn connect(
        target: ConnectionTarget,
        config: DuelConfig,
    ) -> (Self, mpsc::Receiver<DuelEvent>) {
        let loop_config = config.clone();
        let player_name = target.player_name.clone();
        Self::spawn(
            &player_name,
            &config,
            move |cmd_rx, event_tx, shared, shutdown_rx| {
                connect_and_run(target, loop_config, cmd_rx, event_tx, shared, shutdown_rx)
            },
        )
    }

    fn spawn<F, Fut>(
        player_name: &str,
        config: &DuelConfig,
        run: F,
    ) -> (Self, mpsc::Receiver<DuelEvent>)
    where
        F: FnOnce(
            mpsc::UnboundedReceiver<Vec<Effect>>,
            mpsc::Sender<DuelEvent>,
            Arc<Shared>,
            oneshot::Receiver<()>,
        ) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Vec<Effect>>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<DuelEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let mut session = SessionState::new();
        // A fresh session is always Disconnected, so this cannot fail; an
        // error would only mean no CONNECT frame is queued.
        match session.begin_connect(player_name) {
            Ok(effects) => {
                let _ = cmd_tx.send(effects);
            }
            Err(e) => error!("failed to begin session: {e}"),
        }

        let shared = Arc::new(Shared::new(session));
        let task = tokio::spawn(run(cmd_rx, event_tx, Arc::clone(&shared), shutdown_rx));

        let client = Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Play `cell`.
    ///
    /// Board input is disabled and the phase moves to
    /// [`SessionPhase::OpponentTurn`] before this returns; the `MOVE` frame
    /// is written by the transport loop.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::NotYourTurn`] outside [`SessionPhase::MyTurn`]
    /// and [`DuelError::NotConnected`] once the session has ended.
    pub fn submit_move(&self, cell: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(DuelError::NotConnected);
        }
        let mut session = self.shared.session();
        if self.cmd_tx.is_closed() {
            session.close();
            return Err(DuelError::NotConnected);
        }
        let effects = session.submit_move(cell)?;
        // Still under the lock: nobody sees OpponentTurn if this fails.
        if self.cmd_tx.send(effects).is_err() {
            session.close();
            return Err(DuelError::NotConnected);
        }
        Ok(())
    }

    /// End the session, closing the transport and stopping the background
    /// task. Safe to call more than once.
    ///
    /// An active session ends in [`SessionPhase::Closed`]; a finished game
    /// keeps its outcome.
    pub async fn shutdown(&mut self) {
        debug!("DuelClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.connected.store(false, Ordering::Release);
        self.shared.session().close();
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the transport loop is running.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Current session phase.
    pub fn phase(&self) -> SessionPhase {
        self.shared.session().phase()
    }

    /// The sign assigned by the relay, once the game has started.
    pub fn player_sign(&self) -> Option<PlayerSign> {
        self.shared.session().player_sign()
    }

    /// Whether a move would currently be accepted.
    pub fn is_turn_enabled(&self) -> bool {
        self.shared.session().is_turn_enabled()
    }
}

impl std::fmt::Debug for DuelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelClient")
            .field("connected", &self.is_connected())
            .field("phase", &self.phase())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for DuelClient {
    fn drop(&mut self) {
        // Drop cannot await the graceful close; aborting drops the loop
        // future and with it the transport.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Open the TCP stream, then hand over to [`transport_loop`].
#[cfg(feature = "transport-tcp")]
async fn connect_and_run(
    target: ConnectionTarget,
    config: DuelConfig,
    cmd_rx: mpsc::UnboundedReceiver<Vec<Effect>>,
    event_tx: mpsc::Sender<DuelEvent>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    use crate::codec::MessageCodec;
    use crate::transports::TcpTransport;

    debug!(
        host = %target.host,
        port = target.port,
        player = %target.player_name,
        "connecting to relay"
    );
    let codec = MessageCodec::with_max_frame_len(config.max_frame_len);
    let connecting = async {
        match config.connect_timeout {
            Some(timeout) => {
                TcpTransport::connect_with_timeout(&target.host, target.port, codec, timeout).await
            }
            None => TcpTransport::connect_with_codec(&target.host, target.port, codec).await,
        }
    };

    let connected = tokio::select! {
        result = connecting => result,
        _ = &mut shutdown_rx => {
            debug!("shutdown requested while connecting");
            shared.connected.store(false, Ordering::Release);
            return;
        }
    };

    match connected {
        Ok(transport) => transport_loop(transport, cmd_rx, event_tx, shared, shutdown_rx).await,
        Err(e) => {
            warn!("cannot connect to relay: {e}");
            let effects = shared
                .session()
                .fail(format!("Could not connect to the server: {e}"));
            for effect in effects {
                if let Effect::Emit(event) = effect {
                    emit_event(&event_tx, event).await;
                }
            }
            shared.connected.store(false, Ordering::Release);
        }
    }
}

/// Background loop that multiplexes queued effects, shutdown and inbound
/// frames via `tokio::select!`.
///
/// Exits when:
/// - The game reaches an outcome
/// - The relay closes the stream or it fails
/// - A frame cannot be decoded
/// - The client handle is dropped or shut down
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Vec<Effect>>,
    event_tx: mpsc::Sender<DuelEvent>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    loop {
        tokio::select! {
            // Queued user effects go out before the next inbound frame is
            // interpreted.
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(effects) => {
                        if run_effects(&mut transport, effects, &event_tx).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        close_transport(&mut transport).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                close_transport(&mut transport).await;
                break;
            }

            incoming = transport.recv() => {
                let effects = match incoming {
                    Some(Ok(message)) => {
                        debug!(header = ?message.header(), "received relay message");
                        let mut session = shared.session();
                        session.receive(message)
                    }
                    Some(Err(e)) => {
                        if e.is_decode_error() {
                            error!("malformed frame from relay: {e}");
                        } else {
                            error!("transport receive error: {e}");
                        }
                        let mut effects = shared
                            .session()
                            .fail(format!("{}: {e}", status::CONNECTION_LOST));
                        effects.push(Effect::Close);
                        effects
                    }
                    None => {
                        debug!("transport closed by relay");
                        let mut effects = shared.session().fail(status::CONNECTION_LOST);
                        effects.push(Effect::Close);
                        effects
                    }
                };
                if run_effects(&mut transport, effects, &event_tx).await.is_break() {
                    break;
                }
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
    debug!("transport loop exited");
}

/// Carry out transition effects in order. Breaks once the transport has
/// been closed.
async fn run_effects(
    transport: &mut impl Transport,
    effects: Vec<Effect>,
    event_tx: &mpsc::Sender<DuelEvent>,
) -> ControlFlow<()> {
    for effect in effects {
        match effect {
            Effect::Send(message) => {
                debug!(header = ?message.header(), "sending client message");
                if let Err(e) = transport.send(message).await {
                    error!("transport send error: {e}");
                    emit_event(
                        event_tx,
                        DuelEvent::SendFailed {
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
            }
            Effect::Emit(event) => emit_event(event_tx, event).await,
            Effect::Close => {
                close_transport(transport).await;
                return ControlFlow::Break(());
            }
        }
    }
    ControlFlow::Continue(())
}

async fn close_transport(transport: &mut impl Transport) {
    if let Err(e) = transport.close().await {
        debug!("transport close failed: {e}");
    }
}

/// Deliver an event, waiting for room if the consumer is behind. Board
/// updates must not be lost or reordered.
async fn emit_event(event_tx: &mpsc::Sender<DuelEvent>, event: DuelEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{Message, MessageHeader};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<Message, DuelError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<Message>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<Message, DuelError>>>,
        ) -> (Self, Arc<StdMutex<Vec<Message>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: Message) -> std::result::Result<(), DuelError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<Message, DuelError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted messages delivered; hang so the loop stays
                // alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), DuelError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn msg(header: MessageHeader) -> Option<std::result::Result<Message, DuelError>> {
        Some(Ok(Message::builder(header).build()))
    }

    fn starting(
        sign: PlayerSign,
        first: PlayerSign,
    ) -> Option<std::result::Result<Message, DuelError>> {
        Some(Ok(Message::builder(MessageHeader::StartingGame)
            .data(first.to_string())
            .player_sign(sign)
            .build()))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_connect_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DuelClient::start(transport, "Alice", DuelConfig::default());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sent.lock().unwrap().first(), Some(&Message::connect("Alice")));
        assert_eq!(client.phase(), SessionPhase::Connecting);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn waiting_then_start_as_first_player() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            msg(MessageHeader::WaitingForSecondClient),
            starting(PlayerSign::X, PlayerSign::X),
        ]);
        let (mut client, mut events) = DuelClient::start(transport, "Alice", DuelConfig::default());

        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::status(status::WAITING_FOR_OPPONENT)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::status(status::GAME_STARTING)
        );
        assert_eq!(events.recv().await.unwrap(), DuelEvent::BoardInputEnabled(true));
        assert_eq!(events.recv().await.unwrap(), DuelEvent::status(status::YOUR_TURN));

        assert_eq!(client.phase(), SessionPhase::MyTurn);
        assert_eq!(client.player_sign(), Some(PlayerSign::X));
        assert!(client.is_turn_enabled());
        {
            let sent = sent.lock().unwrap();
            assert_eq!(
                *sent,
                vec![Message::connect("Alice"), Message::notify_on_second_client()]
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_move_in_my_turn_sends_move() {
        let (transport, sent, _closed) =
            MockTransport::new(vec![starting(PlayerSign::O, PlayerSign::O)]);
        let (mut client, mut events) = DuelClient::start(transport, "Bob", DuelConfig::default());

        while events.recv().await.unwrap() != DuelEvent::status(status::YOUR_TURN) {}
        client.submit_move("c1").unwrap();
        assert!(!client.is_turn_enabled());
        assert_eq!(client.phase(), SessionPhase::OpponentTurn);

        assert_eq!(events.recv().await.unwrap(), DuelEvent::BoardInputEnabled(false));
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::CellUpdated {
                cell: "c1".into(),
                sign: PlayerSign::O
            }
        );
        assert_eq!(events.recv().await.unwrap(), DuelEvent::status(status::OPPONENT_TURN));
        assert_eq!(
            sent.lock().unwrap().last(),
            Some(&Message::player_move("c1", PlayerSign::O))
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_move_while_waiting_is_rejected() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DuelClient::start(transport, "Carol", DuelConfig::default());

        let err = client.submit_move("c1").unwrap_err();
        assert!(matches!(err, DuelError::NotYourTurn));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sent
            .lock()
            .unwrap()
            .iter()
            .all(|m| m.header() != MessageHeader::Move));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn winner_closes_transport_and_ends_events() {
        let (transport, _sent, closed) = MockTransport::new(vec![
            starting(PlayerSign::X, PlayerSign::O),
            msg(MessageHeader::Winner),
        ]);
        let (client, mut events) = DuelClient::start(transport, "Dan", DuelConfig::default());

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(last, Some(DuelEvent::Outcome { won: true }));
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(client.phase(), SessionPhase::GameWon);
        assert!(!client.is_connected());
        assert!(matches!(
            client.submit_move("c1").unwrap_err(),
            DuelError::NotConnected
        ));
    }

    #[tokio::test]
    async fn clean_close_reports_connection_lost_once() {
        let (transport, _sent, closed) =
            MockTransport::new(vec![msg(MessageHeader::WaitingForSecondClient), None]);
        let (client, mut events) = DuelClient::start(transport, "Eve", DuelConfig::default());

        let mut failures = 0;
        while let Some(event) = events.recv().await {
            if matches!(event, DuelEvent::ConnectionFailed { .. }) {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(client.phase(), SessionPhase::ConnectionFailed);
    }

    #[tokio::test]
    async fn decode_error_is_terminal() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            starting(PlayerSign::X, PlayerSign::X),
            Some(Err(DuelError::Truncated { remaining: 3 })),
            msg(MessageHeader::Winner),
        ]);
        let (client, mut events) = DuelClient::start(transport, "Fay", DuelConfig::default());

        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        assert!(matches!(
            collected.last(),
            Some(DuelEvent::ConnectionFailed { reason }) if reason.contains("incomplete frame")
        ));
        assert!(!collected.contains(&DuelEvent::Outcome { won: true }));
        assert_eq!(client.phase(), SessionPhase::ConnectionFailed);
    }

    #[tokio::test]
    async fn unknown_header_does_not_end_session() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            msg(MessageHeader::Unknown),
            msg(MessageHeader::WaitingForSecondClient),
        ]);
        let (mut client, mut events) = DuelClient::start(transport, "Gus", DuelConfig::default());

        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::status(status::WAITING_FOR_OPPONENT)
        );
        assert_eq!(client.phase(), SessionPhase::WaitingForOpponent);
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport_without_failure_event() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = DuelClient::start(transport, "Hal", DuelConfig::default());

        client.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_in_my_turn_disables_moves() {
        let (transport, sent, _closed) = MockTransport::new(vec![starting(PlayerSign::X, PlayerSign::X)]);
        let (mut client, mut events) = DuelClient::start(transport, "Jo", DuelConfig::default());
        while events.recv().await.unwrap() != DuelEvent::status(status::YOUR_TURN) {}
        assert!(client.is_turn_enabled());

        client.shutdown().await;
        assert_eq!(client.phase(), SessionPhase::Closed);
        assert!(!client.is_turn_enabled());
        assert!(matches!(
            client.submit_move("a1"),
            Err(DuelError::NotConnected)
        ));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn move_after_loop_exit_leaves_session_closed() {
        let (transport, _sent, _closed) = MockTransport::new(vec![starting(PlayerSign::X, PlayerSign::X)]);
        let (client, mut events) = DuelClient::start(transport, "Kit", DuelConfig::default());
        while events.recv().await.unwrap() != DuelEvent::status(status::YOUR_TURN) {}

        // Stop the loop without going through `shutdown`, so the handle
        // still believes it is connected.
        client.task.as_ref().unwrap().abort();
        while !client.cmd_tx.is_closed() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            client.submit_move("a1"),
            Err(DuelError::NotConnected)
        ));
        assert_eq!(client.phase(), SessionPhase::Closed);
        assert!(!client.is_turn_enabled());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DuelClient::start(transport, "Ivy", DuelConfig::default());
        client.shutdown().await;
        client.shutdown().await;
    }

    /// A transport whose `close()` never completes.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: Message) -> std::result::Result<(), DuelError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<Message, DuelError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), DuelError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_transport_task() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = DuelConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, _events) = DuelClient::start(transport, "Jo", config);

        client.shutdown().await;
        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
    }

    #[cfg(feature = "transport-tcp")]
    #[tokio::test]
    async fn connect_to_unreachable_relay_reports_failure() {
        let target = ConnectionTarget::new("127.0.0.1", 1, "Kim");
        let (client, mut events) = DuelClient::connect(target, DuelConfig::default());

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            DuelEvent::ConnectionFailed { ref reason } if reason.starts_with("Could not connect")
        ));
        assert!(events.recv().await.is_none());
        assert_eq!(client.phase(), SessionPhase::ConnectionFailed);
        assert!(!client.is_connected());
    }

    #[test]
    fn config_defaults() {
        let config = DuelConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = DuelConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn parse_target_accepts_host_and_port() {
        let target = ConnectionTarget::parse(" 10.0.0.5:7000 ", " Alice ").unwrap();
        assert_eq!(target, ConnectionTarget::new("10.0.0.5", 7000, "Alice"));

        let target = ConnectionTarget::parse("[::1]:7000", "Bob").unwrap();
        assert_eq!(target.host, "::1");
    }

    #[test]
    fn parse_target_rejects_bad_input() {
        for (address, name) in [
            ("localhost", "A"),
            (":5000", "A"),
            ("localhost:", "A"),
            ("localhost:http", "A"),
            ("localhost:0", "A"),
            ("localhost:70000", "A"),
            ("localhost:5000", "   "),
        ] {
            assert!(
                matches!(
                    ConnectionTarget::parse(address, name),
                    Err(DuelError::InvalidAddress(_))
                ),
                "{address:?} / {name:?} should be rejected"
            );
        }
    }
}
