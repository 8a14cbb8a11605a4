use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dao::submissions::SubmissionCounts,
    dto::{
        events::{EVENT_PLAYER_JOINED, EVENT_SUBMISSIONS_UPDATED},
        sse::{Recipient, ServerEvent},
    },
    services::projector,
    state::{
        SharedState,
        game::{Game, GameId, Player, TaskId},
        state_machine::Transition,
    },
};

/// Fan the projection of `transition` out to the game's subscribers.
pub fn publish_transition(state: &SharedState, game: &Game, transition: &Transition) {
    let Some(projection) = projector::project(game, transition) else {
        debug!(game_id = %game.id, to = ?transition.to, "transition has no projection");
        return;
    };

    send_event(
        state,
        game.id,
        Recipient::Host,
        projection.host.name(),
        &projection.host,
    );
    for (participant_id, event) in &projection.players {
        send_event(
            state,
            game.id,
            Recipient::Player(*participant_id),
            event.name(),
            event,
        );
    }
}

/// Tell the host how many eligible players have answered so far.
pub fn publish_submissions(
    state: &SharedState,
    game_id: GameId,
    task_id: TaskId,
    counts: SubmissionCounts,
) {
    let payload = projector::project_submissions(task_id, counts);
    send_event(
        state,
        game_id,
        Recipient::Host,
        EVENT_SUBMISSIONS_UPDATED,
        &payload,
    );
}

/// Announce a newly joined player to the whole room.
pub fn publish_player_joined(state: &SharedState, game: &Game, player: &Player) {
    let payload = projector::project_player_joined(game, player);
    send_event(
        state,
        game.id,
        Recipient::Everyone,
        EVENT_PLAYER_JOINED,
        &payload,
    );
}

fn send_event(
    state: &SharedState,
    game_id: GameId,
    recipient: Recipient,
    event: &str,
    payload: &impl Serialize,
) {
    match ServerEvent::json(recipient, Some(event.to_string()), payload) {
        Ok(event) => state.events().broadcast(game_id, event),
        Err(err) => warn!(%game_id, event, error = %err, "failed to serialize SSE payload"),
    }
}
