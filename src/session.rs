//! Session state and the client transition table.
//!
//! [`SessionState`] is a plain value with no I/O. Each input (a user action,
//! an inbound [`Message`], or a stream failure) is applied to it and yields
//! the [`Effect`]s the caller must carry out in order: frames to send,
//! presentation events to emit, and whether to close the transport. The
//! client keeps one `SessionState` behind a mutex shared by the user-facing
//! handle and the transport loop.

use tracing::{debug, info, warn};

use crate::error::{DuelError, Result};
use crate::event::{status, DuelEvent};
use crate::protocol::{Message, MessageHeader, PlayerSign};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No connection has been requested.
    #[default]
    Disconnected,
    /// `CONNECT` has been queued; waiting for the relay to pair us.
    Connecting,
    /// The relay is looking for a second player.
    WaitingForOpponent,
    /// `STARTING_GAME` arrived and turn order is being resolved.
    AwaitingTurnOutcome,
    /// Local moves are accepted.
    MyTurn,
    /// Waiting for the relay to acknowledge our move or relay the opponent's.
    OpponentTurn,
    /// The relay announced that we won.
    GameWon,
    /// The relay announced that we lost.
    GameLost,
    /// The relay could not be reached or the stream failed.
    ConnectionFailed,
    /// The local user ended the session.
    Closed,
}

impl SessionPhase {
    /// Returns `true` once the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::GameWon | Self::GameLost | Self::ConnectionFailed | Self::Closed
        )
    }

    /// Returns `true` while a stream is (or is being) established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::WaitingForOpponent
                | Self::AwaitingTurnOutcome
                | Self::MyTurn
                | Self::OpponentTurn
        )
    }
}

/// Something the owner of a [`SessionState`] must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write this frame to the relay.
    Send(Message),
    /// Push this update to the presentation layer.
    Emit(DuelEvent),
    /// Close the transport; the session is over.
    Close,
}

/// Mutable per-connection state.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: SessionPhase,
    player_sign: Option<PlayerSign>,
    turn_enabled: bool,
}

impl SessionState {
    /// A fresh, disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The sign the relay assigned to this client, once the game started.
    pub fn player_sign(&self) -> Option<PlayerSign> {
        self.player_sign
    }

    /// Whether a local move would currently be accepted.
    pub fn is_turn_enabled(&self) -> bool {
        self.turn_enabled
    }

    /// The user asked to join a game as `player_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::NotConnected`] unless the session is still
    /// [`Disconnected`](SessionPhase::Disconnected).
    pub fn begin_connect(&mut self, player_name: &str) -> Result<Vec<Effect>> {
        if self.phase != SessionPhase::Disconnected {
            warn!(phase = ?self.phase, "connect requested on a session that already started");
            return Err(DuelError::NotConnected);
        }
        self.phase = SessionPhase::Connecting;
        debug!(player_name, "state: connecting");
        Ok(vec![Effect::Send(Message::connect(player_name))])
    }

    /// The user clicked `cell`.
    ///
    /// Input is disabled before the `MOVE` frame is produced, so a second
    /// click racing the first is rejected here.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::NotYourTurn`] outside [`MyTurn`](SessionPhase::MyTurn).
    /// No frame is produced in that case.
    pub fn submit_move(&mut self, cell: &str) -> Result<Vec<Effect>> {
        let sign = match (self.phase, self.turn_enabled, self.player_sign) {
            (SessionPhase::MyTurn, true, Some(sign)) => sign,
            _ => {
                debug!(phase = ?self.phase, cell, "move rejected locally");
                return Err(DuelError::NotYourTurn);
            }
        };
        self.turn_enabled = false;
        self.phase = SessionPhase::OpponentTurn;
        debug!(cell, %sign, "state: move submitted");
        Ok(vec![
            Effect::Emit(DuelEvent::BoardInputEnabled(false)),
            Effect::Emit(DuelEvent::CellUpdated {
                cell: cell.to_string(),
                sign,
            }),
            Effect::Send(Message::player_move(cell, sign)),
            Effect::Emit(DuelEvent::status(status::OPPONENT_TURN)),
        ])
    }

    /// A message arrived from the relay.
    ///
    /// Unknown headers and headers that make no sense in the current phase
    /// are logged and dropped without a transition.
    pub fn receive(&mut self, message: Message) -> Vec<Effect> {
        use MessageHeader as H;
        use SessionPhase as P;

        match (self.phase, message.header()) {
            (P::Connecting, H::WaitingForSecondClient) => {
                self.phase = P::WaitingForOpponent;
                debug!("state: waiting for opponent");
                vec![
                    Effect::Emit(DuelEvent::status(status::WAITING_FOR_OPPONENT)),
                    Effect::Send(Message::notify_on_second_client()),
                ]
            }
            (P::Connecting | P::WaitingForOpponent, H::StartingGame) => self.start_game(&message),
            (P::OpponentTurn, H::CorrectMove) => vec![
                Effect::Send(Message::notify_on_opponent_move()),
                Effect::Emit(DuelEvent::status(status::MOVE_ACCEPTED)),
            ],
            (P::OpponentTurn, H::OpponentMoved) => self.opponent_moved(&message),
            (P::MyTurn | P::OpponentTurn, H::Winner) => self.finish(true),
            (P::MyTurn | P::OpponentTurn, H::GameLost) => self.finish(false),
            (phase, H::Unknown) => {
                warn!(?phase, data = ?message.data(), "unrecognized header from relay; dropped");
                Vec::new()
            }
            (phase, header) => {
                warn!(?phase, ?header, "header not expected in this phase; dropped");
                Vec::new()
            }
        }
    }

    /// The stream could not be opened, failed, or delivered an undecodable
    /// frame.
    ///
    /// Fires a single failure notification; later failures on a finished
    /// session produce nothing.
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<Effect> {
        if !self.phase.is_active() {
            debug!(phase = ?self.phase, "failure after session end ignored");
            return Vec::new();
        }
        let reason = reason.into();
        warn!(phase = ?self.phase, %reason, "state: connection failed");

        let mut effects = Vec::with_capacity(2);
        if self.turn_enabled {
            effects.push(Effect::Emit(DuelEvent::BoardInputEnabled(false)));
        }
        self.turn_enabled = false;
        self.phase = SessionPhase::ConnectionFailed;
        effects.push(Effect::Emit(DuelEvent::ConnectionFailed { reason }));
        effects
    }

    /// The user ended the session. An active session moves to
    /// [`SessionPhase::Closed`] without a failure notification; a finished
    /// one keeps its outcome. Either way no further move is accepted.
    pub fn close(&mut self) {
        if self.phase.is_active() {
            debug!(phase = ?self.phase, "state: closed by user");
            self.phase = SessionPhase::Closed;
        }
        self.turn_enabled = false;
    }

    fn start_game(&mut self, message: &Message) -> Vec<Effect> {
        let Some(sign) = message.player_sign() else {
            warn!("STARTING_GAME without an assigned sign; dropped");
            return Vec::new();
        };
        let Some(starting) = message.data().and_then(PlayerSign::from_payload) else {
            warn!("STARTING_GAME without a starting sign; dropped");
            return Vec::new();
        };

        self.player_sign = Some(sign);
        self.phase = SessionPhase::AwaitingTurnOutcome;
        info!(%sign, %starting, "game starting");

        let mut effects = vec![Effect::Emit(DuelEvent::status(status::GAME_STARTING))];
        if sign == starting {
            self.turn_enabled = true;
            self.phase = SessionPhase::MyTurn;
            effects.push(Effect::Emit(DuelEvent::BoardInputEnabled(true)));
            effects.push(Effect::Emit(DuelEvent::status(status::YOUR_TURN)));
        } else {
            self.phase = SessionPhase::OpponentTurn;
            effects.push(Effect::Send(Message::notify_on_opponent_move()));
            effects.push(Effect::Emit(DuelEvent::status(status::OPPONENT_TURN)));
        }
        debug!(phase = ?self.phase, "state: turn order resolved");
        effects
    }

    fn opponent_moved(&mut self, message: &Message) -> Vec<Effect> {
        let (Some(cell), Some(sign)) = (message.data(), self.player_sign) else {
            warn!("OPPONENT_MOVED without a cell; dropped");
            return Vec::new();
        };
        self.turn_enabled = true;
        self.phase = SessionPhase::MyTurn;
        debug!(cell, "state: opponent moved");
        vec![
            Effect::Emit(DuelEvent::CellUpdated {
                cell: cell.to_string(),
                sign: sign.opponent(),
            }),
            Effect::Emit(DuelEvent::BoardInputEnabled(true)),
            Effect::Emit(DuelEvent::status(status::OPPONENT_MOVED)),
        ]
    }

    fn finish(&mut self, won: bool) -> Vec<Effect> {
        self.turn_enabled = false;
        self.phase = if won {
            SessionPhase::GameWon
        } else {
            SessionPhase::GameLost
        };
        info!(won, "game over");
        vec![
            Effect::Emit(DuelEvent::BoardInputEnabled(false)),
            Effect::Emit(DuelEvent::BoardVisible(false)),
            Effect::Emit(DuelEvent::Outcome { won }),
            Effect::Close,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn starting_game(sign: PlayerSign, starting: PlayerSign) -> Message {
        Message::builder(MessageHeader::StartingGame)
            .data(starting.to_string())
            .player_sign(sign)
            .build()
    }

    fn header(h: MessageHeader) -> Message {
        Message::builder(h).build()
    }

    fn sent(effects: &[Effect]) -> Vec<&Message> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn emitted(effects: &[Effect]) -> Vec<&DuelEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    fn connected() -> SessionState {
        let mut state = SessionState::new();
        state.begin_connect("Alice").unwrap();
        state
    }

    fn in_my_turn() -> SessionState {
        let mut state = connected();
        state.receive(starting_game(PlayerSign::X, PlayerSign::X));
        assert_eq!(state.phase(), SessionPhase::MyTurn);
        state
    }

    fn in_opponent_turn() -> SessionState {
        let mut state = connected();
        state.receive(starting_game(PlayerSign::O, PlayerSign::X));
        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
        state
    }

    #[test]
    fn connect_sends_player_name() {
        let mut state = SessionState::new();
        let effects = state.begin_connect("Alice").unwrap();
        assert_eq!(effects, vec![Effect::Send(Message::connect("Alice"))]);
        assert_eq!(state.phase(), SessionPhase::Connecting);
    }

    #[test]
    fn connect_twice_is_rejected() {
        let mut state = connected();
        assert!(matches!(
            state.begin_connect("Alice"),
            Err(DuelError::NotConnected)
        ));
    }

    #[test]
    fn waiting_notice_is_acknowledged() {
        let mut state = connected();
        let effects = state.receive(header(MessageHeader::WaitingForSecondClient));
        assert_eq!(state.phase(), SessionPhase::WaitingForOpponent);
        assert_eq!(sent(&effects), vec![&Message::notify_on_second_client()]);
        assert_eq!(
            emitted(&effects),
            vec![&DuelEvent::status(status::WAITING_FOR_OPPONENT)]
        );
    }

    #[test]
    fn starting_with_own_sign_enables_input_once() {
        let mut state = connected();
        state.receive(header(MessageHeader::WaitingForSecondClient));
        let effects = state.receive(starting_game(PlayerSign::X, PlayerSign::X));

        assert_eq!(state.phase(), SessionPhase::MyTurn);
        assert_eq!(state.player_sign(), Some(PlayerSign::X));
        assert!(state.is_turn_enabled());
        assert!(sent(&effects).is_empty());
        let enables = emitted(&effects)
            .into_iter()
            .filter(|e| **e == DuelEvent::BoardInputEnabled(true))
            .count();
        assert_eq!(enables, 1);
    }

    #[test]
    fn starting_with_other_sign_acknowledges_once() {
        let mut state = connected();
        state.receive(header(MessageHeader::WaitingForSecondClient));
        let effects = state.receive(starting_game(PlayerSign::X, PlayerSign::O));

        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
        assert!(!state.is_turn_enabled());
        assert_eq!(sent(&effects), vec![&Message::notify_on_opponent_move()]);
    }

    #[test]
    fn second_client_may_start_without_waiting_notice() {
        let mut state = connected();
        state.receive(starting_game(PlayerSign::O, PlayerSign::X));
        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
        assert_eq!(state.player_sign(), Some(PlayerSign::O));
    }

    #[test]
    fn starting_game_without_sign_is_dropped() {
        let mut state = connected();
        let msg = Message::builder(MessageHeader::StartingGame).data("X").build();
        assert!(state.receive(msg).is_empty());
        assert_eq!(state.phase(), SessionPhase::Connecting);

        let msg = Message::builder(MessageHeader::StartingGame)
            .data("")
            .player_sign(PlayerSign::X)
            .build();
        assert!(state.receive(msg).is_empty());
        assert_eq!(state.player_sign(), None);
    }

    #[test]
    fn sign_is_assigned_only_once() {
        let mut state = in_my_turn();
        let effects = state.receive(starting_game(PlayerSign::O, PlayerSign::O));
        assert!(effects.is_empty());
        assert_eq!(state.player_sign(), Some(PlayerSign::X));
    }

    #[test]
    fn move_in_my_turn_disables_input_before_sending() {
        let mut state = in_my_turn();
        let effects = state.submit_move("c1").unwrap();

        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
        assert!(!state.is_turn_enabled());
        assert_eq!(
            effects[0],
            Effect::Emit(DuelEvent::BoardInputEnabled(false))
        );
        let send_at = effects
            .iter()
            .position(|e| matches!(e, Effect::Send(_)))
            .unwrap();
        assert!(send_at > 0);
        assert_eq!(
            sent(&effects),
            vec![&Message::player_move("c1", PlayerSign::X)]
        );
    }

    #[test]
    fn move_outside_my_turn_produces_nothing() {
        for mut state in [SessionState::new(), connected(), in_opponent_turn()] {
            let phase = state.phase();
            assert!(matches!(state.submit_move("c1"), Err(DuelError::NotYourTurn)));
            assert_eq!(state.phase(), phase);
        }
    }

    #[test]
    fn double_click_sends_one_move() {
        let mut state = in_my_turn();
        assert!(state.submit_move("c1").is_ok());
        assert!(matches!(state.submit_move("c2"), Err(DuelError::NotYourTurn)));
    }

    #[test]
    fn full_turn_cycle() {
        let mut state = in_my_turn();
        state.submit_move("c1").unwrap();

        let effects = state.receive(header(MessageHeader::CorrectMove));
        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
        assert_eq!(sent(&effects), vec![&Message::notify_on_opponent_move()]);

        let effects = state.receive(
            Message::builder(MessageHeader::OpponentMoved)
                .data("c2")
                .build(),
        );
        assert_eq!(state.phase(), SessionPhase::MyTurn);
        assert!(state.is_turn_enabled());
        assert!(sent(&effects).is_empty());
        assert!(emitted(&effects).contains(&&DuelEvent::CellUpdated {
            cell: "c2".into(),
            sign: PlayerSign::O,
        }));
    }

    #[test]
    fn opponent_moved_without_cell_is_dropped() {
        let mut state = in_opponent_turn();
        assert!(state.receive(header(MessageHeader::OpponentMoved)).is_empty());
        assert_eq!(state.phase(), SessionPhase::OpponentTurn);
    }

    #[test]
    fn winner_is_terminal() {
        let mut state = in_opponent_turn();
        let effects = state.receive(header(MessageHeader::Winner));
        assert_eq!(state.phase(), SessionPhase::GameWon);
        assert_eq!(
            effects,
            vec![
                Effect::Emit(DuelEvent::BoardInputEnabled(false)),
                Effect::Emit(DuelEvent::BoardVisible(false)),
                Effect::Emit(DuelEvent::Outcome { won: true }),
                Effect::Close,
            ]
        );

        // Nothing moves a finished game.
        assert!(state.receive(header(MessageHeader::CorrectMove)).is_empty());
        assert!(state.receive(header(MessageHeader::GameLost)).is_empty());
        assert!(state.fail("reset").is_empty());
        assert!(state.submit_move("c3").is_err());
        assert_eq!(state.phase(), SessionPhase::GameWon);
    }

    #[test]
    fn game_lost_is_terminal() {
        let mut state = in_my_turn();
        let effects = state.receive(header(MessageHeader::GameLost));
        assert_eq!(state.phase(), SessionPhase::GameLost);
        assert!(emitted(&effects).contains(&&DuelEvent::Outcome { won: false }));
        assert!(sent(&effects).is_empty());
        assert!(state.receive(header(MessageHeader::Winner)).is_empty());
    }

    #[test]
    fn outcome_before_game_start_is_dropped() {
        let mut state = connected();
        assert!(state.receive(header(MessageHeader::Winner)).is_empty());
        assert_eq!(state.phase(), SessionPhase::Connecting);
    }

    #[test]
    fn unknown_header_is_ignored() {
        let mut state = in_my_turn();
        assert!(state.receive(header(MessageHeader::Unknown)).is_empty());
        assert_eq!(state.phase(), SessionPhase::MyTurn);
        assert!(state.is_turn_enabled());
    }

    #[test]
    fn client_headers_from_relay_are_ignored() {
        let mut state = in_opponent_turn();
        let echoed = Message::player_move("a1", PlayerSign::X);
        assert!(state.receive(echoed).is_empty());
    }

    #[test]
    fn failure_fires_once() {
        for mut state in [connected(), in_my_turn(), in_opponent_turn()] {
            let effects = state.fail("reset by peer");
            assert_eq!(state.phase(), SessionPhase::ConnectionFailed);
            let failures = emitted(&effects)
                .into_iter()
                .filter(|e| matches!(e, DuelEvent::ConnectionFailed { .. }))
                .count();
            assert_eq!(failures, 1);
            assert!(state.fail("reset again").is_empty());
        }
    }

    #[test]
    fn failure_in_my_turn_disables_input() {
        let mut state = in_my_turn();
        let effects = state.fail("gone");
        assert_eq!(
            effects[0],
            Effect::Emit(DuelEvent::BoardInputEnabled(false))
        );
        assert!(!state.is_turn_enabled());
    }

    #[test]
    fn failure_before_connect_is_ignored() {
        let mut state = SessionState::new();
        assert!(state.fail("nothing to fail").is_empty());
        assert_eq!(state.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn close_ends_an_active_turn() {
        let mut state = in_my_turn();
        state.close();
        assert_eq!(state.phase(), SessionPhase::Closed);
        assert!(state.phase().is_terminal());
        assert!(!state.is_turn_enabled());
        assert!(matches!(state.submit_move("a1"), Err(DuelError::NotYourTurn)));
        assert!(state.fail("late reset").is_empty());
    }

    #[test]
    fn close_keeps_a_finished_outcome() {
        let mut state = in_my_turn();
        state.receive(header(MessageHeader::Winner));
        state.close();
        assert_eq!(state.phase(), SessionPhase::GameWon);
    }
}
