use serde::Serialize;

use crate::state::game::{GameId, ParticipantId};

/// Audience of a [`ServerEvent`] inside a game channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Only the game's host.
    Host,
    /// A single player.
    Player(ParticipantId),
    /// Host and every player.
    Everyone,
}

#[derive(Clone, Debug)]
/// Dispatched payload carried across a game's SSE channel.
pub struct ServerEvent {
    /// Who receives the event.
    pub recipient: Recipient,
    /// SSE event name.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(recipient: Recipient, event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            recipient,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Whether the subscriber identified by `participant_id` should receive this event.
    pub fn is_addressed_to(&self, participant_id: ParticipantId, is_host: bool) -> bool {
        match self.recipient {
            Recipient::Everyone => true,
            Recipient::Host => is_host,
            Recipient::Player(id) => !is_host && id == participant_id,
        }
    }
}

#[derive(Debug, Serialize)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Game the stream belongs to.
    pub game_id: GameId,
    /// Subscriber.
    pub participant_id: ParticipantId,
    /// `host` or `player`.
    pub role: &'static str,
}
