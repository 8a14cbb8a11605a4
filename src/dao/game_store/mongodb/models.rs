use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::state::game::{Game, GameStatus};

/// Stored game aggregate. The top-level fields mirror the embedded game so the
/// lifecycle queries can filter on them; they win over the embedded copy when
/// a bulk status update touched only them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub pin: String,
    pub status: String,
    pub task_type: String,
    pub version: i64,
    pub updated: DateTime,
    pub game: Game,
}

impl From<&Game> for MongoGameDocument {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id.to_string(),
            pin: game.pin.clone(),
            status: game.status.as_str().to_owned(),
            task_type: game.current_task.task_type().as_str().to_owned(),
            version: i64::try_from(game.version).unwrap_or(i64::MAX),
            updated: DateTime::from_system_time(game.updated),
            game: game.clone(),
        }
    }
}

impl MongoGameDocument {
    /// Rebuild the aggregate, applying the authoritative top-level fields.
    pub fn into_game(self) -> Result<Game, String> {
        let mut game = self.game;
        game.status = parse_status(&self.status)?;
        game.version = u64::try_from(self.version).map_err(|err| err.to_string())?;
        game.updated = game.updated.max(self.updated.to_system_time());
        Ok(game)
    }
}

/// One answer stored in a question ledger, JSON encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub participant_id: String,
    pub answer: String,
}

/// Submission ledger of a single question task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLedgerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub eligible: Vec<String>,
    #[serde(default)]
    pub answers: Vec<StoredAnswer>,
    pub sealed: bool,
}

/// Lease held on a named lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLockDocument {
    #[serde(rename = "_id")]
    pub key: String,
    pub holder: String,
    pub expires_at: DateTime,
}

pub fn parse_status(value: &str) -> Result<GameStatus, String> {
    match value {
        "active" => Ok(GameStatus::Active),
        "completed" => Ok(GameStatus::Completed),
        "expired" => Ok(GameStatus::Expired),
        other => Err(format!("unknown status `{other}`")),
    }
}

pub fn doc_id(id: impl ToString) -> Document {
    doc! { "_id": id.to_string() }
}
