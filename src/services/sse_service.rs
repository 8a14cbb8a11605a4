use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{Handshake, Recipient, ServerEvent},
    error::ServiceError,
    state::{
        SharedState,
        game::{GameId, ParticipantId},
    },
};

const EVENT_HANDSHAKE: &str = "handshake";

/// A participant attached to the event channel of one game.
pub struct Subscription {
    /// Game subscribed to.
    pub game_id: GameId,
    /// Subscriber.
    pub participant_id: ParticipantId,
    /// Whether the subscriber hosts the game.
    pub is_host: bool,
    /// Raw channel, filtered per subscriber when streamed.
    pub receiver: broadcast::Receiver<ServerEvent>,
}

/// Subscribe `participant_id` to the events of `game_id`.
pub async fn subscribe(
    state: &SharedState,
    game_id: GameId,
    participant_id: ParticipantId,
) -> Result<Subscription, ServiceError> {
    let game = state.load_game(game_id).await?;
    if game.status.is_terminal() {
        return Err(ServiceError::GameEnded(game.status.as_str().into()));
    }
    let is_host = game.is_host(participant_id);
    if !is_host && game.player(participant_id).is_none() {
        return Err(ServiceError::Unauthorized(format!(
            "participant {participant_id} is not part of game {game_id}"
        )));
    }

    let receiver = state.events().subscribe(game_id);
    info!(%game_id, %participant_id, is_host, "new SSE connection");
    Ok(Subscription {
        game_id,
        participant_id,
        is_host,
        receiver,
    })
}

/// Convert a subscription into an SSE response that opens with a handshake
/// and forwards only the events addressed to the subscriber.
pub fn to_sse_stream(
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let Subscription {
        game_id,
        participant_id,
        is_host,
        mut receiver,
    } = subscription;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let handshake = Handshake {
            game_id,
            participant_id,
            role: if is_host { "host" } else { "player" },
        };
        let recipient = if is_host {
            Recipient::Host
        } else {
            Recipient::Player(participant_id)
        };
        if let Ok(payload) = ServerEvent::json(recipient, Some(EVENT_HANDSHAKE.to_string()), &handshake)
        {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !payload.is_addressed_to(participant_id, is_host) {
                                continue;
                            }
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            debug!(%game_id, %participant_id, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%game_id, %participant_id, "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            game::{Game, GameMode, GameSettings, Participant, Player},
        },
    };

    #[tokio::test]
    async fn strangers_cannot_subscribe() {
        let state = AppState::in_memory(AppConfig::default());
        let host = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut game = Game::new(
            "654321".into(),
            GameMode::Classic,
            host,
            Vec::new(),
            GameSettings::default(),
            SystemTime::now(),
        );
        game.participants.push(Participant::Player(Player::new(
            player,
            "ada".into(),
            SystemTime::now(),
        )));
        let game = state.store().create_game(game).await.unwrap();

        let host_sub = subscribe(&state, game.id, host).await.unwrap();
        assert!(host_sub.is_host);
        let player_sub = subscribe(&state, game.id, player).await.unwrap();
        assert!(!player_sub.is_host);
        assert_eq!(state.events().subscriber_count(game.id), 2);

        let stranger = subscribe(&state, game.id, Uuid::new_v4()).await;
        assert!(matches!(stranger, Err(ServiceError::Unauthorized(_))));
    }
}
