//! Leaderboard calculator: folds graded questions into cumulative standings.

use std::{cmp::Ordering, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::{
    scoring::Grade,
    state::{
        game::{Participant, ParticipantId, Player},
        task::LeaderboardEntry,
    },
};

/// Ordering applied between players sharing the same cumulative score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the previous relative order, then fall back to join order.
    #[default]
    PreviousRankThenJoinOrder,
    /// Join order only.
    JoinOrder,
}

/// Tunables of the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Entries kept in intermediate leaderboard and podium snapshots.
    pub preview_size: usize,
    /// Order of players with equal scores.
    pub tie_break: TieBreak,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            preview_size: 5,
            tie_break: TieBreak::default(),
        }
    }
}

/// Grade of one eligible player on the question being folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedAnswer {
    /// Player graded.
    pub participant_id: ParticipantId,
    /// Their grade.
    pub grade: Grade,
}

/// Full, uncapped ranking row used by final results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStanding {
    /// Player ranked.
    pub participant_id: ParticipantId,
    /// Final rank, starting at 1.
    pub position: u32,
    /// Display name.
    pub nickname: String,
    /// Final score.
    pub score: u32,
    /// Best run of correct answers.
    pub longest_streak: u32,
    /// Questions answered correctly.
    pub correct_answers: u32,
    /// Questions answered incorrectly.
    pub incorrect_answers: u32,
    /// Eligible questions left unanswered.
    pub unanswered: u32,
    /// Mean response time over answered questions, `None` if the player never answered.
    pub average_response_time_ms: Option<u64>,
}

/// Add the grades of one question to the players' running totals and streaks.
///
/// Players without a grade (late joiners) are left untouched.
pub fn apply_grades(participants: &mut [Participant], grades: &[GradedAnswer], now: SystemTime) {
    for graded in grades {
        let Some(player) = participants
            .iter_mut()
            .find_map(|participant| match participant {
                Participant::Player(player) if player.id == graded.participant_id => Some(player),
                _ => None,
            })
        else {
            continue;
        };

        let grade = graded.grade;
        player.score = player.score.saturating_add(grade.score);
        player.streaks.record(grade.correct);
        match grade.response_time {
            Some(elapsed) => {
                if grade.correct {
                    player.correct_answers += 1;
                } else {
                    player.incorrect_answers += 1;
                }
                let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                player.total_response_time_ms = player.total_response_time_ms.saturating_add(millis);
            }
            None => player.unanswered += 1,
        }
        player.updated = now;
    }
}

/// Recompute every player's position, shifting the old one into `previous_rank`.
///
/// Positions are a permutation of `1..=N` over all players.
pub fn rerank(participants: &mut [Participant], tie_break: TieBreak) {
    let mut order: Vec<(usize, u32, u32)> = participants
        .iter()
        .enumerate()
        .filter_map(|(index, participant)| match participant {
            Participant::Player(player) => Some((index, player.score, player.rank)),
            Participant::Host(_) => None,
        })
        .collect();

    order.sort_by(|(left_index, left_score, left_rank), (right_index, right_score, right_rank)| {
        right_score
            .cmp(left_score)
            .then_with(|| match tie_break {
                TieBreak::PreviousRankThenJoinOrder => {
                    rank_key(*left_rank).cmp(&rank_key(*right_rank))
                }
                TieBreak::JoinOrder => Ordering::Equal,
            })
            .then_with(|| left_index.cmp(right_index))
    });

    for (position, (index, _, _)) in order.into_iter().enumerate() {
        if let Some(Participant::Player(player)) = participants.get_mut(index) {
            player.previous_rank = player.rank;
            player.rank = position as u32 + 1;
        }
    }
}

/// Position handed to a player joining after the first ranking: last place.
pub fn rank_for_newcomer(participants: &[Participant]) -> u32 {
    let ranked = participants
        .iter()
        .filter(|participant| matches!(participant, Participant::Player(player) if player.rank > 0))
        .count();
    if ranked == 0 { 0 } else { ranked as u32 + 1 }
}

/// Ranked players ordered by position.
pub fn standings(participants: &[Participant]) -> Vec<LeaderboardEntry> {
    let mut players = ranked_players(participants);
    players.sort_by_key(|player| player.rank);
    players
        .into_iter()
        .map(|player| LeaderboardEntry {
            participant_id: player.id,
            position: player.rank,
            previous_position: player.previous_rank,
            nickname: player.nickname.clone(),
            score: player.score,
            streaks: player.streaks,
        })
        .collect()
}

/// Top `size` entries of [`standings`].
pub fn preview(participants: &[Participant], size: usize) -> Vec<LeaderboardEntry> {
    let mut entries = standings(participants);
    entries.truncate(size);
    entries
}

/// Uncapped final ranking with per-player metrics.
pub fn final_standings(participants: &[Participant]) -> Vec<FinalStanding> {
    let mut players = ranked_players(participants);
    players.sort_by_key(|player| player.rank);
    players
        .into_iter()
        .map(|player| {
            let answered = u64::from(player.answered());
            FinalStanding {
                participant_id: player.id,
                position: player.rank,
                nickname: player.nickname.clone(),
                score: player.score,
                longest_streak: player.streaks.longest,
                correct_answers: player.correct_answers,
                incorrect_answers: player.incorrect_answers,
                unanswered: player.unanswered,
                average_response_time_ms: (answered > 0)
                    .then(|| player.total_response_time_ms / answered),
            }
        })
        .collect()
}

fn ranked_players(participants: &[Participant]) -> Vec<&Player> {
    participants
        .iter()
        .filter_map(|participant| match participant {
            Participant::Player(player) if player.rank > 0 => Some(player),
            _ => None,
        })
        .collect()
}

fn rank_key(rank: u32) -> u32 {
    if rank == 0 { u32::MAX } else { rank }
}
