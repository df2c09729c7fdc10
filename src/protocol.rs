//! Wire-compatible protocol types for the duel relay protocol.
//!
//! Every frame on the wire carries exactly one [`Message`], serialized as a
//! JSON object with camelCase keys. Optional fields are omitted when absent:
//!
//! ```text
//! {"header":"MOVE","data":"c1","playerSign":"X"}
//! {"header":"CORRECT_MOVE"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Signs ───────────────────────────────────────────────────────────

/// The single-character identity assigned to a player for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSign(char);

impl PlayerSign {
    /// The sign conventionally given to the first player.
    pub const X: PlayerSign = PlayerSign('X');
    /// The sign conventionally given to the second player.
    pub const O: PlayerSign = PlayerSign('O');

    /// Wrap an arbitrary character as a sign.
    pub const fn new(sign: char) -> Self {
        Self(sign)
    }

    /// Returns the underlying character.
    pub const fn as_char(self) -> char {
        self.0
    }

    /// Returns the sign the other player holds on a two-sign board.
    ///
    /// Anything that is not `X` maps to `X`.
    pub fn opponent(self) -> PlayerSign {
        if self == Self::X {
            Self::O
        } else {
            Self::X
        }
    }

    /// Parse the first character of a string payload, as the relay sends the
    /// starting sign inside `data`.
    pub fn from_payload(data: &str) -> Option<PlayerSign> {
        data.chars().next().map(PlayerSign)
    }
}

impl fmt::Display for PlayerSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<char> for PlayerSign {
    fn from(sign: char) -> Self {
        Self(sign)
    }
}

// ── Headers ─────────────────────────────────────────────────────────

/// The enumerated tag identifying a message's purpose.
///
/// Headers are sent as `"SCREAMING_SNAKE_CASE"` strings. Strings outside the
/// known set decode to [`MessageHeader::Unknown`] so newer relays can add
/// headers without breaking older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageHeader {
    /// Client → server. `data`: player display name.
    Connect,
    /// Server → client. The relay is waiting for a second player.
    WaitingForSecondClient,
    /// Client → server. Acknowledges the waiting notice.
    NotifyOnSecondClient,
    /// Server → client. `data`: starting sign, `player_sign`: this client's sign.
    StartingGame,
    /// Client → server. Asks to be told about the opponent's next move.
    NotifyOnOpponentMove,
    /// Client → server. `data`: cell id, `player_sign`: mover's sign.
    Move,
    /// Server → client. The last local move was accepted.
    CorrectMove,
    /// Server → client. `data`: cell id the opponent marked.
    OpponentMoved,
    /// Server → client. This client won.
    Winner,
    /// Server → client. This client lost.
    GameLost,
    /// Any header this client does not understand.
    #[serde(other)]
    Unknown,
}

impl MessageHeader {
    /// Returns `true` for headers that only the relay sends.
    pub fn is_server_to_client(self) -> bool {
        matches!(
            self,
            Self::WaitingForSecondClient
                | Self::StartingGame
                | Self::CorrectMove
                | Self::OpponentMoved
                | Self::Winner
                | Self::GameLost
        )
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// One protocol frame.
///
/// Messages are immutable once built. Construct them with
/// [`Message::builder`] or one of the shorthand constructors; the header is
/// always required.
///
/// ```
/// use duel_client::protocol::{Message, MessageHeader, PlayerSign};
///
/// let msg = Message::builder(MessageHeader::Move)
///     .data("c1")
///     .player_sign(PlayerSign::X)
///     .build();
/// assert_eq!(msg.header(), MessageHeader::Move);
/// assert_eq!(msg.data(), Some("c1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    header: MessageHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    player_sign: Option<PlayerSign>,
}

impl Message {
    /// Start building a message with the given header.
    pub fn builder(header: MessageHeader) -> MessageBuilder {
        MessageBuilder {
            header,
            data: None,
            player_sign: None,
        }
    }

    /// `CONNECT` carrying the player's display name.
    pub fn connect(player_name: impl Into<String>) -> Self {
        Self::builder(MessageHeader::Connect)
            .data(player_name)
            .build()
    }

    /// `NOTIFY_ON_SECOND_CLIENT` acknowledgment.
    pub fn notify_on_second_client() -> Self {
        Self::builder(MessageHeader::NotifyOnSecondClient).build()
    }

    /// `NOTIFY_ON_OPPONENT_MOVE` acknowledgment.
    pub fn notify_on_opponent_move() -> Self {
        Self::builder(MessageHeader::NotifyOnOpponentMove).build()
    }

    /// `MOVE` on `cell` made by `sign`.
    pub fn player_move(cell: impl Into<String>, sign: PlayerSign) -> Self {
        Self::builder(MessageHeader::Move)
            .data(cell)
            .player_sign(sign)
            .build()
    }

    /// The message header.
    pub fn header(&self) -> MessageHeader {
        self.header
    }

    /// The optional string payload.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// The optional player sign.
    pub fn player_sign(&self) -> Option<PlayerSign> {
        self.player_sign
    }
}

/// Builder for [`Message`].
#[derive(Debug, Clone)]
#[must_use = "a builder does nothing until `build` is called"]
pub struct MessageBuilder {
    header: MessageHeader,
    data: Option<String>,
    player_sign: Option<PlayerSign>,
}

impl MessageBuilder {
    /// Set the string payload.
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the player sign.
    pub fn player_sign(mut self, sign: PlayerSign) -> Self {
        self.player_sign = Some(sign);
        self
    }

    /// Finish the message.
    pub fn build(self) -> Message {
        Message {
            header: self.header,
            data: self.data,
            player_sign: self.player_sign,
        }
    }
}
