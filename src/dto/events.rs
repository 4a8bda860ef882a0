use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{
    question::QuestionView,
    results::{FinalScore, RoundResults},
};

/// Broadcast vocabulary for a room topic.
///
/// The host is the sole sender of round-transition events (`GameStart`,
/// `Question`, `QuestionEnd`, `GameEnd`, `HostCancelled`); players only ever
/// send `PlayerAnswered` and `PlayerLeft`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    /// The host started the game; every client counts down locally.
    GameStart {
        /// Seconds of lobby countdown before the first question.
        countdown_seconds: u32,
    },
    /// A new question is open for answers.
    Question {
        /// The question, stripped of its solution.
        question: QuestionView,
        /// Seconds each client counts down before input freezes.
        time_limit_seconds: u32,
    },
    /// A player submitted an answer. Carries identity only, never the answer
    /// or its correctness, so nothing leaks before the reveal.
    PlayerAnswered {
        /// Identifier of the player who answered.
        player_id: Uuid,
        /// Display name of the player who answered.
        player_name: String,
    },
    /// The round closed; carries the authoritative per-player results.
    QuestionEnd {
        /// Aggregate results for the question that just closed.
        results: RoundResults,
    },
    /// The game is over; carries the ranked leaderboard.
    GameEnd {
        /// Final ranked scores, one entry per registered player.
        final_scores: Vec<FinalScore>,
    },
    /// A player left the room.
    PlayerLeft {
        /// Identifier of the player who left.
        player_id: Uuid,
    },
    /// The host cancelled the room. Terminal for every client.
    HostCancelled,
}

impl RoomEvent {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::GameStart { .. } => "GAME_START",
            RoomEvent::Question { .. } => "QUESTION",
            RoomEvent::PlayerAnswered { .. } => "PLAYER_ANSWERED",
            RoomEvent::QuestionEnd { .. } => "QUESTION_END",
            RoomEvent::GameEnd { .. } => "GAME_END",
            RoomEvent::PlayerLeft { .. } => "PLAYER_LEFT",
            RoomEvent::HostCancelled => "HOST_CANCELLED",
        }
    }
}
