use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{dto::sse::ServerEvent, state::game::GameId};

/// Per-game broadcast hubs used by the SSE services.
pub struct EventHub {
    channels: DashMap<GameId, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl EventHub {
    /// Construct an empty hub whose per-game channels hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Register a new subscriber on `game_id`, creating the channel on demand.
    pub fn subscribe(&self, game_id: GameId) -> broadcast::Receiver<ServerEvent> {
        self.channels
            .entry(game_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send an event to all current subscribers of `game_id`, ignoring delivery errors.
    pub fn broadcast(&self, game_id: GameId, event: ServerEvent) {
        if let Some(sender) = self.channels.get(&game_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop the channel of `game_id`; open streams end once drained.
    pub fn close(&self, game_id: GameId) {
        self.channels.remove(&game_id);
    }

    /// Number of games with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of live subscribers on `game_id`.
    pub fn subscriber_count(&self, game_id: GameId) -> usize {
        self.channels
            .get(&game_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dto::sse::Recipient;

    #[tokio::test]
    async fn events_stay_inside_their_game() {
        let hub = EventHub::new(8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut first_rx = hub.subscribe(first);
        let mut second_rx = hub.subscribe(second);

        hub.broadcast(first, ServerEvent::json(Recipient::Everyone, None::<String>, &"hello").unwrap());

        assert_eq!(first_rx.recv().await.unwrap().data, "\"hello\"");
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closing_ends_streams() {
        let hub = EventHub::new(8);
        let game = Uuid::new_v4();
        let mut rx = hub.subscribe(game);
        assert_eq!(hub.subscriber_count(game), 1);

        hub.close(game);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(hub.subscriber_count(game), 0);
    }
}
