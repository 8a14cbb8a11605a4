//! Submission tracker: write-once answers per player for the open question.

use std::collections::HashSet;

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;

use crate::{
    dao::storage::StorageResult,
    state::game::{CollectedAnswer, GameId, ParticipantId, SubmittedAnswer, TaskId},
};

/// Accepted submissions versus eligible players for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionCounts {
    /// Answers accepted so far.
    pub current: u32,
    /// Players eligible to answer.
    pub total: u32,
}

impl SubmissionCounts {
    /// Every eligible player has answered.
    pub fn quorum_reached(&self) -> bool {
        self.current >= self.total
    }
}

/// Result of [`SubmissionTracker::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First answer of this player; counts after recording it.
    Accepted(SubmissionCounts),
    /// The player already answered; the stored answer is unchanged.
    Duplicate,
    /// The player was not present when the question was presented.
    NotEligible,
    /// The question is sealed or was never opened.
    Closed,
}

/// Store of per-question answer ledgers shared by every orchestrator instance.
pub trait SubmissionTracker: Send + Sync {
    /// Open the ledger of a freshly presented question. Idempotent.
    fn open(
        &self,
        game_id: GameId,
        task_id: TaskId,
        eligible: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Atomically store `answer` unless the player already answered.
    fn record(
        &self,
        game_id: GameId,
        task_id: TaskId,
        participant_id: ParticipantId,
        answer: SubmittedAnswer,
    ) -> BoxFuture<'static, StorageResult<RecordOutcome>>;
    /// Current counts, `None` when no ledger exists.
    fn counts(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionCounts>>>;
    /// Refuse further answers and return the accepted ones in arrival order.
    /// Sealing twice returns the same answers.
    fn seal(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Vec<CollectedAnswer>>>;
    /// Accept answers again after a close that failed to persist. Answers
    /// recorded before the seal are kept.
    fn unseal(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>>;
    /// Forget the ledger once the question result is persisted.
    fn discard(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>>;
}

#[derive(Debug)]
struct Ledger {
    eligible: HashSet<ParticipantId>,
    answers: IndexMap<ParticipantId, SubmittedAnswer>,
    sealed: bool,
}

impl Ledger {
    fn counts(&self) -> SubmissionCounts {
        SubmissionCounts {
            current: self.answers.len() as u32,
            total: self.eligible.len() as u32,
        }
    }
}

/// Process-local tracker. Each ledger sits behind its map shard lock, so
/// check-and-set on a player's slot is atomic.
#[derive(Default)]
pub struct InMemorySubmissionTracker {
    ledgers: DashMap<(GameId, TaskId), Ledger>,
}

impl InMemorySubmissionTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_now(
        &self,
        key: (GameId, TaskId),
        participant_id: ParticipantId,
        answer: SubmittedAnswer,
    ) -> RecordOutcome {
        let Some(mut ledger) = self.ledgers.get_mut(&key) else {
            return RecordOutcome::Closed;
        };
        if ledger.sealed {
            return RecordOutcome::Closed;
        }
        if !ledger.eligible.contains(&participant_id) {
            return RecordOutcome::NotEligible;
        }
        if ledger.answers.contains_key(&participant_id) {
            return RecordOutcome::Duplicate;
        }
        ledger.answers.insert(participant_id, answer);
        RecordOutcome::Accepted(ledger.counts())
    }

    fn seal_now(&self, key: (GameId, TaskId)) -> Vec<CollectedAnswer> {
        let Some(mut ledger) = self.ledgers.get_mut(&key) else {
            return Vec::new();
        };
        ledger.sealed = true;
        ledger
            .answers
            .iter()
            .map(|(participant_id, answer)| CollectedAnswer {
                participant_id: *participant_id,
                answer: answer.clone(),
            })
            .collect()
    }
}

impl SubmissionTracker for InMemorySubmissionTracker {
    fn open(
        &self,
        game_id: GameId,
        task_id: TaskId,
        eligible: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.ledgers.entry((game_id, task_id)).or_insert_with(|| Ledger {
            eligible: eligible.into_iter().collect(),
            answers: IndexMap::new(),
            sealed: false,
        });
        Box::pin(future::ready(Ok(())))
    }

    fn record(
        &self,
        game_id: GameId,
        task_id: TaskId,
        participant_id: ParticipantId,
        answer: SubmittedAnswer,
    ) -> BoxFuture<'static, StorageResult<RecordOutcome>> {
        let outcome = self.record_now((game_id, task_id), participant_id, answer);
        Box::pin(future::ready(Ok(outcome)))
    }

    fn counts(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionCounts>>> {
        let counts = self
            .ledgers
            .get(&(game_id, task_id))
            .map(|ledger| ledger.counts());
        Box::pin(future::ready(Ok(counts)))
    }

    fn seal(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Vec<CollectedAnswer>>> {
        Box::pin(future::ready(Ok(self.seal_now((game_id, task_id)))))
    }

    fn unseal(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut ledger) = self.ledgers.get_mut(&(game_id, task_id)) {
            ledger.sealed = false;
        }
        Box::pin(future::ready(Ok(())))
    }

    fn discard(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>> {
        self.ledgers.remove(&(game_id, task_id));
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use uuid::Uuid;

    use super::*;
    use crate::state::game::AnswerValue;

    fn answer(option: usize) -> SubmittedAnswer {
        SubmittedAnswer {
            value: AnswerValue::MultiChoice { option },
            created: SystemTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_accept_exactly_one() {
        let tracker = Arc::new(InMemorySubmissionTracker::new());
        let (game, task, player) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tracker.open(game, task, vec![player, Uuid::new_v4()]).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|option| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.record(game, task, player, answer(option)).await })
            })
            .collect();

        let mut accepted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                RecordOutcome::Accepted(_) => accepted += 1,
                RecordOutcome::Duplicate => duplicates += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(duplicates, 31);
        assert_eq!(
            tracker.counts(game, task).await.unwrap(),
            Some(SubmissionCounts {
                current: 1,
                total: 2
            })
        );
    }

    #[tokio::test]
    async fn late_joiners_are_not_eligible() {
        let tracker = InMemorySubmissionTracker::new();
        let (game, task, player) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tracker.open(game, task, vec![player]).await.unwrap();

        let outcome = tracker
            .record(game, task, Uuid::new_v4(), answer(0))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::NotEligible);

        let outcome = tracker.record(game, task, player, answer(0)).await.unwrap();
        match outcome {
            RecordOutcome::Accepted(counts) => assert!(counts.quorum_reached()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sealing_freezes_the_ledger() {
        let tracker = InMemorySubmissionTracker::new();
        let (game, task) = (Uuid::new_v4(), Uuid::new_v4());
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.open(game, task, vec![first, second]).await.unwrap();
        tracker.record(game, task, first, answer(1)).await.unwrap();

        let sealed = tracker.seal(game, task).await.unwrap();
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].participant_id, first);
        assert_eq!(
            tracker.record(game, task, second, answer(0)).await.unwrap(),
            RecordOutcome::Closed
        );
        assert_eq!(tracker.seal(game, task).await.unwrap(), sealed);

        tracker.discard(game, task).await.unwrap();
        assert_eq!(tracker.counts(game, task).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unsealing_accepts_answers_again() {
        let tracker = InMemorySubmissionTracker::new();
        let (game, task) = (Uuid::new_v4(), Uuid::new_v4());
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.open(game, task, vec![first, second]).await.unwrap();
        tracker.record(game, task, first, answer(1)).await.unwrap();
        tracker.seal(game, task).await.unwrap();

        tracker.unseal(game, task).await.unwrap();
        assert_eq!(
            tracker.record(game, task, first, answer(0)).await.unwrap(),
            RecordOutcome::Duplicate
        );
        match tracker.record(game, task, second, answer(0)).await.unwrap() {
            RecordOutcome::Accepted(counts) => assert!(counts.quorum_reached()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(tracker.seal(game, task).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reopening_keeps_recorded_answers() {
        let tracker = InMemorySubmissionTracker::new();
        let (game, task, player) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tracker.open(game, task, vec![player]).await.unwrap();
        tracker.record(game, task, player, answer(0)).await.unwrap();
        tracker.open(game, task, vec![player]).await.unwrap();
        assert_eq!(
            tracker.counts(game, task).await.unwrap().map(|counts| counts.current),
            Some(1)
        );
    }
}
