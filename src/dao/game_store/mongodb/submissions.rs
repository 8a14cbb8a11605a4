use futures::future::BoxFuture;
use mongodb::{
    Collection, Database,
    bson::doc,
    options::ReturnDocument,
};

use super::{
    error::{MongoDaoError, is_duplicate_key},
    models::{MongoLedgerDocument, StoredAnswer, doc_id},
};
use crate::{
    dao::{
        storage::StorageResult,
        submissions::{RecordOutcome, SubmissionCounts, SubmissionTracker},
    },
    state::game::{CollectedAnswer, GameId, ParticipantId, SubmittedAnswer, TaskId},
};

const LEDGER_COLLECTION_NAME: &str = "question_ledgers";

/// Ledgers stored one document per question; every write is a single-document
/// atomic update guarded by the `sealed` flag and the player's absence.
#[derive(Clone)]
pub struct MongoSubmissionTracker {
    collection: Collection<MongoLedgerDocument>,
}

fn ledger_id(game_id: GameId, task_id: TaskId) -> String {
    format!("{game_id}:{task_id}")
}

fn counts(ledger: &MongoLedgerDocument) -> SubmissionCounts {
    SubmissionCounts {
        current: ledger.answers.len() as u32,
        total: ledger.eligible.len() as u32,
    }
}

impl MongoSubmissionTracker {
    /// Tracker over the `question_ledgers` collection of `database`.
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection::<MongoLedgerDocument>(LEDGER_COLLECTION_NAME),
        }
    }

    async fn open(&self, ledger: String, eligible: Vec<ParticipantId>) -> StorageResult<()> {
        let eligible: Vec<String> = eligible.iter().map(ToString::to_string).collect();
        let result = self
            .collection
            .update_one(
                doc_id(&ledger),
                doc! {
                    "$setOnInsert": {
                        "eligible": eligible,
                        "answers": [],
                        "sealed": false,
                    },
                },
            )
            .upsert(true)
            .await;
        match result {
            Ok(_) => Ok(()),
            // concurrent open of the same ledger
            Err(err) if is_duplicate_key(&err) => Ok(()),
            Err(source) => Err(MongoDaoError::Ledger { ledger, source }.into()),
        }
    }

    async fn record(
        &self,
        ledger: String,
        participant_id: ParticipantId,
        answer: SubmittedAnswer,
    ) -> StorageResult<RecordOutcome> {
        let participant = participant_id.to_string();
        let encoded =
            serde_json::to_string(&answer).map_err(|source| MongoDaoError::EncodeAnswer { source })?;

        let updated = self
            .collection
            .find_one_and_update(
                doc! {
                    "_id": ledger.as_str(),
                    "sealed": false,
                    "eligible": participant.as_str(),
                    "answers.participant_id": { "$ne": participant.as_str() },
                },
                doc! {
                    "$push": {
                        "answers": { "participant_id": participant.as_str(), "answer": encoded },
                    },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Ledger {
                ledger: ledger.clone(),
                source,
            })?;
        if let Some(document) = updated {
            return Ok(RecordOutcome::Accepted(counts(&document)));
        }

        let current = self.find(&ledger).await?;
        Ok(match current {
            None => RecordOutcome::Closed,
            Some(document) if document.sealed => RecordOutcome::Closed,
            Some(document) if !document.eligible.contains(&participant) => {
                RecordOutcome::NotEligible
            }
            Some(_) => RecordOutcome::Duplicate,
        })
    }

    async fn find(&self, ledger: &str) -> StorageResult<Option<MongoLedgerDocument>> {
        let document = self
            .collection
            .find_one(doc_id(ledger))
            .await
            .map_err(|source| MongoDaoError::Ledger {
                ledger: ledger.to_owned(),
                source,
            })?;
        Ok(document)
    }

    async fn seal(&self, ledger: String) -> StorageResult<Vec<CollectedAnswer>> {
        let sealed = self
            .collection
            .find_one_and_update(doc_id(&ledger), doc! { "$set": { "sealed": true } })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Ledger {
                ledger: ledger.clone(),
                source,
            })?;
        let Some(document) = sealed else {
            return Ok(Vec::new());
        };

        document
            .answers
            .iter()
            .filter_map(|stored| decode(&ledger, stored).transpose())
            .collect()
    }

    async fn unseal(&self, ledger: String) -> StorageResult<()> {
        self.collection
            .update_one(doc_id(&ledger), doc! { "$set": { "sealed": false } })
            .await
            .map_err(|source| MongoDaoError::Ledger { ledger, source })?;
        Ok(())
    }

    async fn discard(&self, ledger: String) -> StorageResult<()> {
        self.collection
            .delete_one(doc_id(&ledger))
            .await
            .map_err(|source| MongoDaoError::Ledger { ledger, source })?;
        Ok(())
    }
}

fn decode(ledger: &str, stored: &StoredAnswer) -> StorageResult<Option<CollectedAnswer>> {
    let Ok(participant_id) = stored.participant_id.parse::<ParticipantId>() else {
        tracing::warn!(ledger, participant_id = %stored.participant_id, "skipping answer with malformed participant id");
        return Ok(None);
    };
    let answer: SubmittedAnswer =
        serde_json::from_str(&stored.answer).map_err(|source| MongoDaoError::DecodeAnswer {
            ledger: ledger.to_owned(),
            source,
        })?;
    Ok(Some(CollectedAnswer {
        participant_id,
        answer,
    }))
}

impl SubmissionTracker for MongoSubmissionTracker {
    fn open(
        &self,
        game_id: GameId,
        task_id: TaskId,
        eligible: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let tracker = self.clone();
        Box::pin(async move { tracker.open(ledger_id(game_id, task_id), eligible).await })
    }

    fn record(
        &self,
        game_id: GameId,
        task_id: TaskId,
        participant_id: ParticipantId,
        answer: SubmittedAnswer,
    ) -> BoxFuture<'static, StorageResult<RecordOutcome>> {
        let tracker = self.clone();
        Box::pin(async move {
            tracker
                .record(ledger_id(game_id, task_id), participant_id, answer)
                .await
        })
    }

    fn counts(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionCounts>>> {
        let tracker = self.clone();
        Box::pin(async move {
            let ledger = tracker.find(&ledger_id(game_id, task_id)).await?;
            Ok(ledger.as_ref().map(counts))
        })
    }

    fn seal(
        &self,
        game_id: GameId,
        task_id: TaskId,
    ) -> BoxFuture<'static, StorageResult<Vec<CollectedAnswer>>> {
        let tracker = self.clone();
        Box::pin(async move { tracker.seal(ledger_id(game_id, task_id)).await })
    }

    fn unseal(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>> {
        let tracker = self.clone();
        Box::pin(async move { tracker.unseal(ledger_id(game_id, task_id)).await })
    }

    fn discard(&self, game_id: GameId, task_id: TaskId) -> BoxFuture<'static, StorageResult<()>> {
        let tracker = self.clone();
        Box::pin(async move { tracker.discard(ledger_id(game_id, task_id)).await })
    }
}
