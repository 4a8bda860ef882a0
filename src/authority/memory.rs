use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{
    authority::{
        AnswerAuthority, AuthorityError, AuthorityResult, ClosedRound, RecordedAnswer, RoomCode,
        RoomStatus, StartedGame, SubmittedAnswer,
    },
    dto::{
        question::{Question, QuestionInput},
        results::FinalScore,
    },
};

/// In-memory answer authority doubling as the room registry.
///
/// Each room sits behind its own lock, so concurrent submissions for the same
/// question serialize inside the authority and points are never awarded
/// twice.
#[derive(Clone)]
pub struct InMemoryAuthority {
    rooms: Arc<DashMap<RoomCode, Arc<Mutex<RoomRecord>>>>,
    min_players: usize,
}

struct RoomRecord {
    status: RoomStatus,
    questions: Vec<Question>,
    time_per_question: u32,
    current_question_index: Option<usize>,
    host_id: Uuid,
    players: IndexMap<Uuid, PlayerState>,
    answers: HashMap<Uuid, IndexMap<Uuid, StoredAnswer>>,
    closed_questions: HashSet<Uuid>,
    #[allow(dead_code)]
    created_at: SystemTime,
}

struct PlayerState {
    display_name: String,
    total_score: u32,
    cumulative_response_ms: u64,
}

struct StoredAnswer {
    answer: String,
    is_correct: bool,
    response_time_ms: u64,
    points_earned: u32,
    total_after: u32,
}

impl StoredAnswer {
    fn as_submitted(&self, correct_answer: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            is_correct: self.is_correct,
            points_earned: self.points_earned,
            new_total_score: self.total_after,
            correct_answer: correct_answer.to_string(),
        }
    }
}

impl RoomRecord {
    /// Enforce the one-directional status lifecycle.
    fn transition(&mut self, next: RoomStatus) -> AuthorityResult<()> {
        use RoomStatus::*;
        let allowed = matches!(
            (self.status, next),
            (Lobby, Starting)
                | (Starting, Playing)
                | (Playing, ResultsDisplay)
                | (ResultsDisplay, Playing)
                | (ResultsDisplay, Finished)
        ) || (next == Cancelled && self.status != Finished);
        if !allowed {
            return Err(AuthorityError::InvalidState(format!(
                "cannot move from {:?} to {next:?}",
                self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    fn current_question(&self) -> Option<&Question> {
        self.current_question_index
            .and_then(|index| self.questions.get(index))
    }
}

/// Score a correct answer: 500 base points plus up to 500 speed points that
/// decay linearly over the round. Incorrect and missing answers earn 0.
fn score_answer(is_correct: bool, response_time_ms: u64, time_limit_secs: u32) -> u32 {
    if !is_correct {
        return 0;
    }
    let limit_ms = u64::from(time_limit_secs) * 1000;
    if limit_ms == 0 {
        return 500;
    }
    let elapsed = response_time_ms.min(limit_ms);
    let speed = 500.0 * (1.0 - elapsed as f64 / limit_ms as f64);
    500 + speed.round() as u32
}

fn answers_match(submitted: &str, correct: &str) -> bool {
    submitted.trim().eq_ignore_ascii_case(correct.trim())
}

impl InMemoryAuthority {
    /// Create an empty registry enforcing `min_players` at game start.
    pub fn new(min_players: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            min_players,
        }
    }

    /// Create a room with the host pre-registered, returning its shareable
    /// code. Codes are regenerated until unique within the registry.
    pub fn create_room(
        &self,
        host_id: Uuid,
        host_name: impl Into<String>,
        questions: Vec<QuestionInput>,
        time_per_question: u32,
    ) -> RoomCode {
        let questions = questions
            .into_iter()
            .enumerate()
            .map(|(index, input)| Question {
                id: Uuid::new_v4(),
                index,
                text: input.text,
                payload: input.payload,
                correct_answer: input.correct_answer,
                explanation: input.explanation,
            })
            .collect();

        let mut players = IndexMap::new();
        players.insert(
            host_id,
            PlayerState {
                display_name: host_name.into(),
                total_score: 0,
                cumulative_response_ms: 0,
            },
        );

        let record = RoomRecord {
            status: RoomStatus::Lobby,
            questions,
            time_per_question,
            current_question_index: None,
            host_id,
            players,
            answers: HashMap::new(),
            closed_questions: HashSet::new(),
            created_at: SystemTime::now(),
        };

        let room = Arc::new(Mutex::new(record));
        loop {
            let code = RoomCode::generate();
            let entry = self.rooms.entry(code.clone());
            if let dashmap::Entry::Vacant(vacant) = entry {
                vacant.insert(Arc::clone(&room));
                info!(room = %code, "room created");
                return code;
            }
        }
    }

    /// Register a player into a lobby-state room.
    pub async fn register_player(
        &self,
        room_code: &RoomCode,
        player_id: Uuid,
        display_name: impl Into<String>,
    ) -> AuthorityResult<()> {
        let room = self.room(room_code)?;
        let mut record = room.lock().await;
        if record.status != RoomStatus::Lobby {
            return Err(AuthorityError::InvalidState(
                "players can only join while the room is in the lobby".into(),
            ));
        }
        record.players.insert(
            player_id,
            PlayerState {
                display_name: display_name.into(),
                total_score: 0,
                cumulative_response_ms: 0,
            },
        );
        Ok(())
    }

    /// Current status of a room, for observers.
    pub async fn room_status(&self, room_code: &RoomCode) -> AuthorityResult<RoomStatus> {
        let room = self.room(room_code)?;
        let record = room.lock().await;
        Ok(record.status)
    }

    fn room(&self, room_code: &RoomCode) -> AuthorityResult<Arc<Mutex<RoomRecord>>> {
        self.rooms
            .get(room_code)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AuthorityError::NotFound(format!("room `{room_code}`")))
    }
}

impl AnswerAuthority for InMemoryAuthority {
    fn start_game(
        &self,
        room_code: &RoomCode,
        caller_id: Uuid,
    ) -> BoxFuture<'static, AuthorityResult<StartedGame>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;
            if caller_id != record.host_id {
                return Err(AuthorityError::NotHost);
            }
            if record.status != RoomStatus::Lobby {
                return Err(AuthorityError::AlreadyStarted);
            }
            if record.players.len() < this.min_players {
                return Err(AuthorityError::NotEnoughPlayers {
                    minimum: this.min_players,
                });
            }
            let first_question = record
                .questions
                .first()
                .cloned()
                .ok_or_else(|| AuthorityError::InvalidState("room has no questions".into()))?;
            record.transition(RoomStatus::Starting)?;
            info!(room = %room_code, players = record.players.len(), "game started");
            Ok(StartedGame {
                first_question,
                time_per_question: record.time_per_question,
            })
        })
    }

    fn submit_answer(
        &self,
        room_code: &RoomCode,
        question_id: Uuid,
        player_id: Uuid,
        answer: String,
        response_time_ms: u64,
    ) -> BoxFuture<'static, AuthorityResult<SubmittedAnswer>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;

            if record.closed_questions.contains(&question_id) {
                return Err(AuthorityError::QuestionClosed);
            }
            let question = record
                .current_question()
                .filter(|question| question.id == question_id)
                .cloned();
            let Some(question) = question else {
                let known = record.questions.iter().any(|q| q.id == question_id);
                return Err(if known {
                    AuthorityError::QuestionClosed
                } else {
                    AuthorityError::NotFound(format!("question `{question_id}`"))
                });
            };
            if record.status != RoomStatus::Playing {
                return Err(AuthorityError::QuestionClosed);
            }
            if !record.players.contains_key(&player_id) {
                return Err(AuthorityError::NotFound(format!("player `{player_id}`")));
            }

            if let Some(existing) = record
                .answers
                .get(&question_id)
                .and_then(|recorded| recorded.get(&player_id))
            {
                return Err(AuthorityError::AlreadyAnswered(
                    existing.as_submitted(&question.correct_answer),
                ));
            }

            let is_correct = answers_match(&answer, &question.correct_answer);
            let points_earned =
                score_answer(is_correct, response_time_ms, record.time_per_question);
            let player = record
                .players
                .get_mut(&player_id)
                .expect("player presence checked above");
            player.total_score += points_earned;
            player.cumulative_response_ms += response_time_ms;
            let total_after = player.total_score;

            record.answers.entry(question_id).or_default().insert(
                player_id,
                StoredAnswer {
                    answer,
                    is_correct,
                    response_time_ms,
                    points_earned,
                    total_after,
                },
            );

            Ok(SubmittedAnswer {
                is_correct,
                points_earned,
                new_total_score: total_after,
                correct_answer: question.correct_answer,
            })
        })
    }

    fn question_at(
        &self,
        room_code: &RoomCode,
        index: usize,
    ) -> BoxFuture<'static, AuthorityResult<Option<Question>>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let record = room.lock().await;
            Ok(record.questions.get(index).cloned())
        })
    }

    fn mark_question_shown(
        &self,
        room_code: &RoomCode,
        index: usize,
    ) -> BoxFuture<'static, AuthorityResult<()>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;

            // Duplicate call for the question that is already active.
            if record.status == RoomStatus::Playing
                && record.current_question_index == Some(index)
            {
                return Ok(());
            }

            let expected = match record.status {
                RoomStatus::Starting => 0,
                RoomStatus::ResultsDisplay => {
                    record
                        .current_question_index
                        .ok_or_else(|| {
                            AuthorityError::InvalidState("no active question to advance from".into())
                        })?
                        + 1
                }
                other => {
                    return Err(AuthorityError::InvalidState(format!(
                        "cannot open a question while {other:?}"
                    )));
                }
            };
            if index != expected {
                return Err(AuthorityError::InvalidState(format!(
                    "expected question index {expected}, got {index}"
                )));
            }
            if index >= record.questions.len() {
                return Err(AuthorityError::NotFound(format!("question index {index}")));
            }

            record.current_question_index = Some(index);
            record.transition(RoomStatus::Playing)?;
            Ok(())
        })
    }

    fn close_question(
        &self,
        room_code: &RoomCode,
        question_id: Uuid,
    ) -> BoxFuture<'static, AuthorityResult<ClosedRound>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;

            if record.closed_questions.contains(&question_id) {
                return Err(AuthorityError::QuestionClosed);
            }
            let question = record
                .current_question()
                .filter(|question| question.id == question_id)
                .cloned()
                .ok_or_else(|| AuthorityError::NotFound(format!("question `{question_id}`")))?;
            if record.status != RoomStatus::Playing {
                return Err(AuthorityError::QuestionClosed);
            }

            let full_round_ms = u64::from(record.time_per_question) * 1000;
            let recorded = record.answers.remove(&question_id).unwrap_or_default();

            let mut answers = Vec::with_capacity(record.players.len());
            for (player_id, player) in record.players.iter_mut() {
                let entry = match recorded.get(player_id) {
                    Some(stored) => RecordedAnswer {
                        player_id: *player_id,
                        player_name: player.display_name.clone(),
                        answer: Some(stored.answer.clone()),
                        is_correct: stored.is_correct,
                        response_time_ms: stored.response_time_ms,
                        points_earned: stored.points_earned,
                        total_score: stored.total_after,
                    },
                    None => {
                        // Unanswered rounds count as the full duration for the
                        // tie-break on cumulative response time.
                        player.cumulative_response_ms += full_round_ms;
                        RecordedAnswer {
                            player_id: *player_id,
                            player_name: player.display_name.clone(),
                            answer: None,
                            is_correct: false,
                            response_time_ms: full_round_ms,
                            points_earned: 0,
                            total_score: player.total_score,
                        }
                    }
                };
                answers.push(entry);
            }

            record.closed_questions.insert(question_id);
            record.transition(RoomStatus::ResultsDisplay)?;
            Ok(ClosedRound { question, answers })
        })
    }

    fn end_game(
        &self,
        room_code: &RoomCode,
    ) -> BoxFuture<'static, AuthorityResult<Vec<FinalScore>>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;
            record.transition(RoomStatus::Finished)?;

            // Rank by score, then lower cumulative response time, then name
            // so equal scores still order deterministically.
            let mut standings: Vec<_> = record
                .players
                .iter()
                .map(|(id, player)| {
                    (
                        *id,
                        player.display_name.clone(),
                        player.total_score,
                        player.cumulative_response_ms,
                    )
                })
                .collect();
            standings.sort_by(|a, b| {
                b.2.cmp(&a.2)
                    .then_with(|| a.3.cmp(&b.3))
                    .then_with(|| a.1.cmp(&b.1))
            });

            let final_scores = standings
                .into_iter()
                .enumerate()
                .map(|(position, (player_id, name, total_score, _))| FinalScore {
                    player_id,
                    name,
                    total_score,
                    rank: position + 1,
                })
                .collect();
            info!(room = %room_code, "game finished");
            Ok(final_scores)
        })
    }

    fn cancel_game(&self, room_code: &RoomCode) -> BoxFuture<'static, AuthorityResult<()>> {
        let this = self.clone();
        let room_code = room_code.clone();
        Box::pin(async move {
            let room = this.room(&room_code)?;
            let mut record = room.lock().await;
            record.transition(RoomStatus::Cancelled)?;
            info!(room = %room_code, "room cancelled");
            Ok(())
        })
    }
}
