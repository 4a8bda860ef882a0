use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type-specific payload of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionPayload {
    /// Pick one answer out of a fixed set of options.
    MultipleChoice {
        /// Options presented to the player, in display order.
        options: Vec<String>,
    },
    /// Free-text answer typed by the player.
    TypeAnswer,
}

/// A full question as held by the answer authority, including the solution.
///
/// Immutable once created; the host reads one at a time when advancing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier of the question.
    pub id: Uuid,
    /// Ordinal position inside the room's question list.
    pub index: usize,
    /// Prompt shown to every player.
    pub text: String,
    /// Type-specific payload.
    pub payload: QuestionPayload,
    /// The answer the authority scores against. Never broadcast before reveal.
    pub correct_answer: String,
    /// Optional explanation revealed alongside the results.
    pub explanation: Option<String>,
}

impl Question {
    /// Strip the solution so the question can be broadcast to players.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            index: self.index,
            text: self.text.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// The leak-safe projection of a [`Question`] carried in QUESTION broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// Unique identifier of the question.
    pub id: Uuid,
    /// Ordinal position inside the room's question list.
    pub index: usize,
    /// Prompt shown to every player.
    pub text: String,
    /// Type-specific payload.
    pub payload: QuestionPayload,
}

/// Input used to seed a question when creating a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInput {
    /// Prompt shown to every player.
    pub text: String,
    /// Type-specific payload.
    pub payload: QuestionPayload,
    /// The answer the authority scores against.
    pub correct_answer: String,
    /// Optional explanation revealed alongside the results.
    pub explanation: Option<String>,
}
