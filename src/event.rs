//! Presentation events emitted by the session.
//!
//! The transport loop is the only producer. Events are delivered in order on
//! a single channel, so a presentation layer that drains them on one thread
//! sees every update in the order the session made it.

use crate::protocol::PlayerSign;

/// Human-readable status lines pushed to the presentation layer.
pub mod status {
    /// The relay is waiting for a second player.
    pub const WAITING_FOR_OPPONENT: &str = "Waiting for the second player";
    /// Both players are paired.
    pub const GAME_STARTING: &str = "The game is starting";
    /// Local moves are accepted.
    pub const YOUR_TURN: &str = "Your turn";
    /// Waiting on the opponent.
    pub const OPPONENT_TURN: &str = "Opponent's turn";
    /// The relay accepted the last local move.
    pub const MOVE_ACCEPTED: &str = "Move accepted. Opponent's turn";
    /// The opponent's move arrived.
    pub const OPPONENT_MOVED: &str = "Opponent moved. Your turn";
    /// The session ended because the stream failed.
    pub const CONNECTION_LOST: &str = "Connection to the server was lost";
}

/// A single update for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuelEvent {
    /// Append a line to the status log.
    StatusLine(String),
    /// Mark `cell` with `sign`.
    CellUpdated {
        /// Opaque cell identifier, forwarded unchanged.
        cell: String,
        /// Sign to draw in the cell.
        sign: PlayerSign,
    },
    /// Enable or disable board input.
    BoardInputEnabled(bool),
    /// Show or hide the board.
    BoardVisible(bool),
    /// The relay announced the end of the game. Always the last event.
    Outcome {
        /// `true` if this client won.
        won: bool,
    },
    /// An outgoing frame could not be written. The session continues.
    SendFailed {
        /// Description of the transport failure.
        reason: String,
    },
    /// The session ended because the relay could not be reached, the stream
    /// failed, or a frame could not be decoded. Always the last event.
    ConnectionFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl DuelEvent {
    pub(crate) fn status(text: &str) -> Self {
        Self::StatusLine(text.to_string())
    }

    /// Returns `true` if no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Outcome { .. } | Self::ConnectionFailed { .. })
    }
}
