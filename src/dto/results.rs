use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One player's line inside a round's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRoundResult {
    /// Player identifier.
    pub player_id: Uuid,
    /// Display name at the time the round closed.
    pub name: String,
    /// The submitted answer, or `None` when the player never answered.
    pub answer: Option<String>,
    /// Whether the authority scored the answer as correct.
    pub is_correct: bool,
    /// Time between the question reveal and the submission, in milliseconds.
    /// Players without an answer are charged the full round duration.
    pub response_time_ms: u64,
    /// Points awarded for this round.
    pub points_earned: u32,
    /// Total score after this round.
    pub new_total_score: u32,
}

/// Aggregate outcome of one question, broadcast exactly once per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResults {
    /// Identifier of the question these results belong to.
    pub question_id: Uuid,
    /// Ordinal of the question these results belong to.
    pub question_index: usize,
    /// Prompt of the question.
    pub question_text: String,
    /// The correct answer, revealed now that the round is closed.
    pub correct_answer: String,
    /// Optional explanation of the correct answer.
    pub explanation: Option<String>,
    /// One entry per registered player, in registration order.
    pub per_player: Vec<PlayerRoundResult>,
}

/// One leaderboard line produced when the game ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    /// Player identifier.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Final total score.
    pub total_score: u32,
    /// 1-based leaderboard position.
    pub rank: usize,
}
