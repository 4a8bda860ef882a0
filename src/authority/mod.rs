//! Answer authority RPC surface: the stateless scoring and persistence
//! service the host calls to drive round transitions. The backend alone
//! computes correctness and points.

pub mod memory;

use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dto::{question::Question, results::FinalScore};

pub use self::memory::InMemoryAuthority;

/// Result alias for authority calls.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Typed rejections returned by the answer authority.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthorityError {
    /// The caller is not the room host.
    #[error("caller is not the room host")]
    NotHost,
    /// The game has already left the lobby.
    #[error("game already started")]
    AlreadyStarted,
    /// Not enough players have joined to start.
    #[error("not enough players (need at least {minimum})")]
    NotEnoughPlayers {
        /// The minimum the authority enforces.
        minimum: usize,
    },
    /// An answer is already recorded for this player and question. Carries the
    /// original result so submit stays idempotent: callers treat this as
    /// success-with-original-result, never a second award.
    #[error("answer already recorded for this question")]
    AlreadyAnswered(SubmittedAnswer),
    /// The question is not open for answers.
    #[error("question is closed")]
    QuestionClosed,
    /// Room, player, or question does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The room is not in a state that allows the operation.
    #[error("invalid room state: {0}")]
    InvalidState(String),
}

/// Lifecycle of a room as tracked by the authority.
///
/// Transitions are one-directional: Lobby → Starting → Playing ⇄
/// ResultsDisplay → Finished, with Cancelled reachable from any pre-Finished
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Players are gathering; the game has not started.
    Lobby,
    /// The host started the game; the lobby countdown is running.
    Starting,
    /// A question is open for answers.
    Playing,
    /// The last question closed; results are on display.
    ResultsDisplay,
    /// The game ended normally.
    Finished,
    /// The host cancelled the room.
    Cancelled,
}

/// Shareable six-character room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

/// Characters used in generated room codes. Confusable glyphs (I, O, 0, 1)
/// are excluded.
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 6;

impl RoomCode {
    /// Generate a random code. Uniqueness is the registry's concern.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_CHARS[rng.random_range(0..ROOM_CODE_CHARS.len())] as char)
            .collect();
        Self(code)
    }

    /// Borrow the code as a string slice, usable as a channel topic.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Successful response to `start_game`.
#[derive(Debug, Clone)]
pub struct StartedGame {
    /// The first question, solution included; only the host sees this.
    pub first_question: Question,
    /// Seconds every round counts down from.
    pub time_per_question: u32,
}

/// Successful response to `submit_answer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAnswer {
    /// Whether the authority scored the answer as correct.
    pub is_correct: bool,
    /// Points awarded for this answer.
    pub points_earned: u32,
    /// Total score after this answer.
    pub new_total_score: u32,
    /// The correct answer, returned so the submitting client can show it
    /// once the round is revealed.
    pub correct_answer: String,
}

/// One recorded (or synthesized) answer returned when a round closes.
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    /// Player the entry belongs to.
    pub player_id: Uuid,
    /// Display name at registration time.
    pub player_name: String,
    /// Submitted value, or `None` when the player never answered.
    pub answer: Option<String>,
    /// Whether the answer was correct. `false` for missing answers.
    pub is_correct: bool,
    /// Response latency in milliseconds. Missing answers are charged the
    /// full round duration.
    pub response_time_ms: u64,
    /// Points awarded. `0` for incorrect or missing answers.
    pub points_earned: u32,
    /// Total score after this round.
    pub total_score: u32,
}

/// Everything the host needs to assemble round results, returned by
/// `close_question` exactly once per round.
#[derive(Debug, Clone)]
pub struct ClosedRound {
    /// The closed question, solution included.
    pub question: Question,
    /// One entry per registered player, in registration order.
    pub answers: Vec<RecordedAnswer>,
}

/// RPC surface consumed by the synchronization engine.
///
/// Calls are stateless from the caller's perspective; the authority owns the
/// atomicity of each operation (concurrent submissions for the same question
/// must not double-award points).
pub trait AnswerAuthority: Send + Sync {
    /// Start the game. Fails `NotHost`, `AlreadyStarted`, `NotEnoughPlayers`.
    fn start_game(
        &self,
        room_code: &RoomCode,
        caller_id: Uuid,
    ) -> BoxFuture<'static, AuthorityResult<StartedGame>>;

    /// Record one player's answer and score it. `AlreadyAnswered` carries the
    /// original result; `QuestionClosed` when the round is over.
    fn submit_answer(
        &self,
        room_code: &RoomCode,
        question_id: Uuid,
        player_id: Uuid,
        answer: String,
        response_time_ms: u64,
    ) -> BoxFuture<'static, AuthorityResult<SubmittedAnswer>>;

    /// Look up the question at `index`, or `None` past the end of the list.
    fn question_at(
        &self,
        room_code: &RoomCode,
        index: usize,
    ) -> BoxFuture<'static, AuthorityResult<Option<Question>>>;

    /// Advance the room's active question index to `index` and open that
    /// question for answers. Idempotent when the index is already current.
    fn mark_question_shown(
        &self,
        room_code: &RoomCode,
        index: usize,
    ) -> BoxFuture<'static, AuthorityResult<()>>;

    /// Close the active question and read back every recorded answer,
    /// synthesizing zero-point entries for players who never answered.
    fn close_question(
        &self,
        room_code: &RoomCode,
        question_id: Uuid,
    ) -> BoxFuture<'static, AuthorityResult<ClosedRound>>;

    /// End the game and return the ranked leaderboard.
    fn end_game(&self, room_code: &RoomCode) -> BoxFuture<'static, AuthorityResult<Vec<FinalScore>>>;

    /// Cancel the room from any pre-finished state.
    fn cancel_game(&self, room_code: &RoomCode) -> BoxFuture<'static, AuthorityResult<()>>;
}
